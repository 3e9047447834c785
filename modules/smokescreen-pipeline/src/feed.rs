// RSS/Atom feed source.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use tracing::{debug, info};

use smokescreen_common::SourceArticle;

use crate::sources::{looks_rate_limited, ArticleSource, FetchError};

const FEED_TIMEOUT: Duration = Duration::from_secs(15);
const USER_AGENT: &str = "smokescreen/0.1";

pub struct RssSource {
    url: String,
    tag: String,
    client: reqwest::Client,
}

impl RssSource {
    pub fn new(url: &str, client: reqwest::Client) -> Self {
        Self {
            url: url.to_string(),
            tag: format!("rss:{}", host_of(url)),
            client,
        }
    }

    /// One source per configured feed URL, sharing an HTTP client.
    pub fn from_urls(urls: &[String]) -> anyhow::Result<Vec<Self>> {
        let client = reqwest::Client::builder()
            .timeout(FEED_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(urls.iter().map(|u| Self::new(u, client.clone())).collect())
    }
}

fn host_of(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, r)| r);
    rest.split('/').next().unwrap_or(rest)
}

#[async_trait]
impl ArticleSource for RssSource {
    fn tag(&self) -> &str {
        &self.tag
    }

    async fn fetch(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<SourceArticle>, FetchError> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FetchError::Failed(format!("request failed: {e}")))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited { soft: false });
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| FetchError::Failed(format!("failed to read body: {e}")))?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            if looks_rate_limited(&text) {
                return Err(FetchError::RateLimited { soft: true });
            }
            return Err(FetchError::Failed(format!("HTTP {status}")));
        }

        let feed = match feed_rs::parser::parse(&body[..]) {
            Ok(feed) => feed,
            Err(e) => {
                // Some publishers answer 200 with an HTML "slow down" page.
                if looks_rate_limited(&String::from_utf8_lossy(&body)) {
                    return Err(FetchError::RateLimited { soft: true });
                }
                return Err(FetchError::Failed(format!("failed to parse feed: {e}")));
            }
        };

        let publisher = feed
            .title
            .map(|t| t.content)
            .unwrap_or_else(|| host_of(&self.url).to_string());

        let articles: Vec<SourceArticle> = feed
            .entries
            .into_iter()
            .filter_map(|entry| {
                let url = entry
                    .links
                    .first()
                    .map(|l| l.href.clone())
                    .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()))?;
                let headline = entry.title.map(|t| t.content)?;
                let published_at = entry
                    .published
                    .or(entry.updated)
                    .map(|dt| dt.with_timezone(&Utc));

                // Undated entries are kept; the dedup pass catches repeats.
                if let Some(ts) = published_at {
                    if ts < since || ts > until {
                        return None;
                    }
                }

                Some(SourceArticle {
                    url,
                    headline: headline.trim().to_string(),
                    publisher: publisher.clone(),
                    published_at,
                    source_tag: self.tag.clone(),
                })
            })
            .collect();

        debug!(feed = self.url.as_str(), "Feed parsed");
        info!(source = self.tag.as_str(), articles = articles.len(), "Feed fetched");
        Ok(articles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_uses_feed_host() {
        let source = RssSource::new("https://feeds.example.org/politics.xml", reqwest::Client::new());
        assert_eq!(source.tag(), "rss:feeds.example.org");
        assert_eq!(host_of("example.com/feed"), "example.com");
    }
}
