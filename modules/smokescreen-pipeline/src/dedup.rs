//! Article deduplication. Pure and order-preserving: the first occurrence
//! of anything wins.

use std::collections::HashSet;

use smokescreen_common::config::DedupSettings;
use smokescreen_common::SourceArticle;

use crate::similarity::token_similarity;

/// Canonical form of a URL for exact-match dedup.
///
/// Drops the scheme, a leading `www.`, the query string and fragment, and
/// trailing slashes, then lower-cases what is left.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    let rest = match url.find("://") {
        Some(i) => &url[i + 3..],
        None => url,
    };
    let rest = rest.split(['?', '#']).next().unwrap_or_default();
    let lower = rest.to_lowercase();
    let host_path = lower.strip_prefix("www.").unwrap_or(&lower);
    host_path.trim_end_matches('/').to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Already persisted by an earlier run.
    KnownUrl,
    /// Same URL appeared earlier in this batch.
    BatchUrl,
    ShortHeadline,
    /// Headline too close to one already accepted in this batch.
    SimilarHeadline,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::KnownUrl => "known_url",
            RejectReason::BatchUrl => "batch_url",
            RejectReason::ShortHeadline => "short_headline",
            RejectReason::SimilarHeadline => "similar_headline",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rejected {
    pub article: SourceArticle,
    pub reason: RejectReason,
}

/// An accepted article together with its normalized URL.
#[derive(Debug, Clone)]
pub struct Accepted {
    pub article: SourceArticle,
    pub normalized_url: String,
}

#[derive(Debug, Default)]
pub struct DedupOutcome {
    pub accepted: Vec<Accepted>,
    pub rejected: Vec<Rejected>,
}

pub struct Deduplicator {
    headline_similarity: f64,
    min_headline_chars: usize,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(&DedupSettings::default())
    }
}

impl Deduplicator {
    pub fn new(settings: &DedupSettings) -> Self {
        Self {
            headline_similarity: settings.headline_similarity,
            min_headline_chars: settings.min_headline_chars,
        }
    }

    /// Split `batch` into accepted and rejected articles.
    /// `known_urls` holds normalized URLs already persisted.
    pub fn filter(&self, batch: Vec<SourceArticle>, known_urls: &HashSet<String>) -> DedupOutcome {
        let mut outcome = DedupOutcome::default();
        let mut batch_urls: HashSet<String> = HashSet::new();

        for article in batch {
            let normalized_url = normalize_url(&article.url);

            let reason = if known_urls.contains(&normalized_url) {
                Some(RejectReason::KnownUrl)
            } else if batch_urls.contains(&normalized_url) {
                Some(RejectReason::BatchUrl)
            } else if article.headline.trim().chars().count() < self.min_headline_chars {
                Some(RejectReason::ShortHeadline)
            } else if outcome.accepted.iter().any(|a| {
                token_similarity(&a.article.headline, &article.headline)
                    >= self.headline_similarity
            }) {
                Some(RejectReason::SimilarHeadline)
            } else {
                None
            };

            match reason {
                Some(reason) => outcome.rejected.push(Rejected { article, reason }),
                None => {
                    batch_urls.insert(normalized_url.clone());
                    outcome.accepted.push(Accepted {
                        article,
                        normalized_url,
                    });
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src(url: &str, headline: &str) -> SourceArticle {
        SourceArticle {
            url: url.to_string(),
            headline: headline.to_string(),
            publisher: "Wire".to_string(),
            published_at: None,
            source_tag: "test".to_string(),
        }
    }

    #[test]
    fn normalization_strips_scheme_www_query_and_slash() {
        assert_eq!(
            normalize_url("https://www.example.com/a/?utm=1"),
            "example.com/a"
        );
        assert_eq!(normalize_url("HTTP://Example.com/Path#frag"), "example.com/path");
        assert_eq!(normalize_url("example.com/a"), "example.com/a");
    }

    #[test]
    fn known_url_is_rejected() {
        let known = HashSet::from(["example.com/a".to_string()]);
        let out = Deduplicator::default().filter(
            vec![src(
                "https://www.example.com/a/?utm=1",
                "Agency dismisses its inspector general",
            )],
            &known,
        );
        assert!(out.accepted.is_empty());
        assert_eq!(out.rejected[0].reason, RejectReason::KnownUrl);
    }

    #[test]
    fn short_headlines_are_rejected() {
        let out = Deduplicator::default().filter(
            vec![src("https://a.com/1", "Breaking"), src("https://a.com/2", "Exactly10!")],
            &HashSet::new(),
        );
        assert_eq!(out.rejected.len(), 1);
        assert_eq!(out.rejected[0].reason, RejectReason::ShortHeadline);
        assert_eq!(out.accepted.len(), 1);
    }

    #[test]
    fn near_identical_headlines_collapse_to_first() {
        let out = Deduplicator::default().filter(
            vec![
                src("https://a.com/1", "Governor signs sweeping emergency powers order"),
                src("https://b.com/2", "Governor signs sweeping emergency powers order today"),
                src("https://c.com/3", "governor signs sweeping emergency powers order"),
                src("https://d.com/4", "Flooding closes coastal highway"),
            ],
            &HashSet::new(),
        );
        let urls: Vec<&str> = out.accepted.iter().map(|a| a.article.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.com/1", "https://d.com/4"]);
        assert!(out
            .rejected
            .iter()
            .all(|r| r.reason == RejectReason::SimilarHeadline));
    }

    #[test]
    fn repeated_url_in_batch_is_rejected() {
        let out = Deduplicator::default().filter(
            vec![
                src("https://a.com/story", "Court blocks the new voting rule"),
                src("https://www.a.com/story/", "Different words entirely here now"),
            ],
            &HashSet::new(),
        );
        assert_eq!(out.accepted.len(), 1);
        assert_eq!(out.rejected[0].reason, RejectReason::BatchUrl);
    }
}
