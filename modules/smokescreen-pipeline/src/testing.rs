// Test mocks for the pipeline.
//
// Two mocks matching the two external boundaries:
// - MockSource (ArticleSource): scripted articles, rate limits and failures
// - MockOracle (Oracle): queued raw clustering/scoring replies
//
// Plus helpers for building articles and well-formed scoring replies.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use smokescreen_common::{Article, Event, SourceArticle};

use crate::oracle::Oracle;
use crate::sources::{ArticleSource, FetchError};

// ---------------------------------------------------------------------------
// MockSource
// ---------------------------------------------------------------------------

/// Scripted article source.
/// Builder pattern: `.with_article()`, `.rate_limited_times()`, `.failing()`.
pub struct MockSource {
    tag: String,
    articles: Vec<SourceArticle>,
    rate_limits_left: AtomicU32,
    failure: Option<String>,
    calls: AtomicU32,
}

impl MockSource {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            articles: Vec::new(),
            rate_limits_left: AtomicU32::new(0),
            failure: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_article(mut self, url: &str, headline: &str) -> Self {
        self.articles.push(SourceArticle {
            url: url.to_string(),
            headline: headline.to_string(),
            publisher: format!("{} desk", self.tag),
            published_at: Some(Utc::now()),
            source_tag: self.tag.clone(),
        });
        self
    }

    /// Answer the first `n` calls with a soft rate-limit reply.
    pub fn rate_limited_times(self, n: u32) -> Self {
        self.rate_limits_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArticleSource for MockSource {
    fn tag(&self) -> &str {
        &self.tag
    }

    async fn fetch(
        &self,
        _since: DateTime<Utc>,
        _until: DateTime<Utc>,
    ) -> Result<Vec<SourceArticle>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let limited = self
            .rate_limits_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if limited {
            return Err(FetchError::RateLimited { soft: true });
        }
        if let Some(message) = &self.failure {
            return Err(FetchError::Failed(message.clone()));
        }
        Ok(self.articles.clone())
    }
}

// ---------------------------------------------------------------------------
// MockOracle
// ---------------------------------------------------------------------------

/// Oracle returning queued raw replies in call order.
///
/// An exhausted clustering queue answers `[]`. An exhausted scoring queue
/// falls back to the `.scoring_with()` default, or errors when none is set.
/// Events named with `.unparseable_for()` always get a garbage reply.
pub struct MockOracle {
    cluster_responses: Mutex<VecDeque<String>>,
    score_responses: Mutex<VecDeque<String>>,
    default_score: Option<String>,
    unparseable_titles: Vec<String>,
    cluster_calls: AtomicU32,
    score_calls: AtomicU32,
}

impl Default for MockOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl MockOracle {
    pub fn new() -> Self {
        Self {
            cluster_responses: Mutex::new(VecDeque::new()),
            score_responses: Mutex::new(VecDeque::new()),
            default_score: None,
            unparseable_titles: Vec::new(),
            cluster_calls: AtomicU32::new(0),
            score_calls: AtomicU32::new(0),
        }
    }

    pub fn with_cluster_response(self, raw: &str) -> Self {
        self.cluster_responses
            .lock()
            .unwrap()
            .push_back(raw.to_string());
        self
    }

    pub fn with_score_response(self, raw: &str) -> Self {
        self.score_responses
            .lock()
            .unwrap()
            .push_back(raw.to_string());
        self
    }

    /// Reply used for every scoring call once the queue is empty.
    pub fn scoring_with(mut self, raw: &str) -> Self {
        self.default_score = Some(raw.to_string());
        self
    }

    /// Every scoring call for the event titled `title` gets an unparseable reply.
    pub fn unparseable_for(mut self, title: &str) -> Self {
        self.unparseable_titles.push(title.to_string());
        self
    }

    pub fn cluster_calls(&self) -> u32 {
        self.cluster_calls.load(Ordering::SeqCst)
    }

    pub fn score_calls(&self) -> u32 {
        self.score_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Oracle for MockOracle {
    async fn cluster_articles(
        &self,
        _articles: &[Article],
        _existing_titles: &[String],
    ) -> Result<String> {
        self.cluster_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.cluster_responses.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| "[]".to_string()))
    }

    async fn score_event(&self, event: &Event, _articles: &[Article]) -> Result<String> {
        self.score_calls.fetch_add(1, Ordering::SeqCst);
        if self.unparseable_titles.contains(&event.title) {
            return Ok("Sorry, I can't score this one.".to_string());
        }
        let next = self.score_responses.lock().unwrap().pop_front();
        match next.or_else(|| self.default_score.clone()) {
            Some(raw) => Ok(raw),
            None => bail!("MockOracle: no score response scripted for {}", event.title),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `n` distinct unassigned articles published now.
pub fn test_articles(n: usize) -> Vec<Article> {
    (0..n)
        .map(|i| {
            let src = SourceArticle {
                url: format!("https://news.example.com/story-{i}"),
                headline: format!("Distinct headline number {i} about governance"),
                publisher: "Example News".to_string(),
                published_at: Some(Utc::now()),
                source_tag: "test".to_string(),
            };
            Article::from_source(src, format!("news.example.com/story-{i}"))
        })
        .collect()
}

/// A well-formed scoring reply with every damage driver at `damage`, every
/// hype and strategic driver at `hype`, and the given intentionality count.
pub fn score_reply(damage: f64, hype: f64, intentionality: f64) -> String {
    serde_json::json!({
        "a_drivers": {
            "institutional_capture": damage,
            "legal_authority_bypass": damage,
            "accountability_evasion": damage,
            "rights_impact": damage,
            "oversight_obstruction": damage,
            "resource_misuse": damage,
            "public_trust_erosion": damage
        },
        "hype": {
            "media_saturation": hype,
            "emotional_intensity": hype,
            "novelty_spectacle": hype,
            "social_amplification": hype
        },
        "strategic": {
            "timing_convenience": hype,
            "agenda_displacement": hype,
            "coordinated_messaging": hype,
            "official_amplification": hype
        },
        "intentionality": intentionality,
        "institutional_lever": damage >= 3.0,
        "noise_codes": []
    })
    .to_string()
}
