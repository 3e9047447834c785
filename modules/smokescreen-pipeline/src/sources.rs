// Article sources and the fan-out fetch.
//
// Every source runs concurrently and fails on its own: one source timing out
// or rate-limiting never costs the others their results. Rate-limit replies,
// explicit (HTTP 429) or soft (a 200 whose body says "slow down"), retry with
// linearly increasing backoff.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use regex::Regex;
use thiserror::Error;
use tracing::{info, warn};

use smokescreen_common::config::IngestSettings;
use smokescreen_common::SourceArticle;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("rate limited (soft: {soft})")]
    RateLimited { soft: bool },

    #[error("{0}")]
    Failed(String),
}

/// A news source returning normalized article records for a time window.
/// An empty `Ok` is a legitimate "nothing new", not a failure.
#[async_trait]
pub trait ArticleSource: Send + Sync {
    fn tag(&self) -> &str;

    async fn fetch(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<SourceArticle>, FetchError>;
}

static SOFT_RATE_LIMIT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)(rate[\s_-]?limit|too many requests|slow down|quota exceeded|try again later)")
        .ok()
});

/// Whether a response body reads like a rate-limit reply.
pub fn looks_rate_limited(body: &str) -> bool {
    SOFT_RATE_LIMIT
        .as_ref()
        .is_some_and(|re| re.is_match(body))
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &IngestSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base: Duration::from_millis(settings.retry_base_ms),
        }
    }

    /// Delay before retry number `attempt` (1-based): `attempt × base`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&IngestSettings::default())
    }
}

/// Outcome of fetching one source, after retries.
#[derive(Debug)]
pub struct SourceReport {
    pub source_tag: String,
    pub attempts: u32,
    pub result: Result<Vec<SourceArticle>, FetchError>,
}

/// Fetch one source, retrying rate-limit replies. Outright failures do not retry.
pub async fn fetch_with_retry(
    source: &dyn ArticleSource,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
    policy: RetryPolicy,
) -> SourceReport {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match source.fetch(since, until).await {
            Err(FetchError::RateLimited { soft }) if attempts <= policy.max_retries => {
                let delay = policy.backoff(attempts);
                warn!(
                    source = source.tag(),
                    attempt = attempts,
                    soft,
                    backoff_ms = delay.as_millis() as u64,
                    "Source rate limited, retrying after backoff"
                );
                tokio::time::sleep(delay).await;
            }
            result => {
                return SourceReport {
                    source_tag: source.tag().to_string(),
                    attempts,
                    result,
                };
            }
        }
    }
}

/// Fetch every source concurrently. Reports come back in source order once
/// all have settled.
pub async fn fetch_all(
    sources: &[Arc<dyn ArticleSource>],
    since: DateTime<Utc>,
    until: DateTime<Utc>,
    policy: RetryPolicy,
) -> Vec<SourceReport> {
    info!(sources = sources.len(), "Fetching article sources");
    join_all(
        sources
            .iter()
            .map(|s| fetch_with_retry(s.as_ref(), since, until, policy)),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSource;

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base: Duration::from_millis(1),
        }
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        let now = Utc::now();
        (now - chrono::Duration::hours(24), now)
    }

    #[test]
    fn backoff_grows_linearly() {
        let policy = RetryPolicy {
            max_retries: 3,
            base: Duration::from_millis(2_000),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(2_000));
        assert_eq!(policy.backoff(3), Duration::from_millis(6_000));
    }

    #[test]
    fn soft_rate_limit_text_is_detected() {
        assert!(looks_rate_limited("Rate limit exceeded, please retry"));
        assert!(looks_rate_limited("<html>Too Many Requests</html>"));
        assert!(!looks_rate_limited("<rss><channel></channel></rss>"));
    }

    #[tokio::test]
    async fn rate_limited_source_recovers_within_retries() {
        let source = MockSource::new("wire")
            .rate_limited_times(2)
            .with_article("https://a.com/1", "Agency suspends public records law");
        let (since, until) = window();

        let report = fetch_with_retry(&source, since, until, fast()).await;
        assert_eq!(report.attempts, 3);
        assert_eq!(report.result.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn exhausting_retries_fails_only_that_source() {
        let stuck: Arc<dyn ArticleSource> =
            Arc::new(MockSource::new("stuck").rate_limited_times(10));
        let healthy: Arc<dyn ArticleSource> = Arc::new(
            MockSource::new("healthy").with_article("https://b.com/1", "Court halts voter purge"),
        );
        let (since, until) = window();

        let reports = fetch_all(&[stuck, healthy], since, until, fast()).await;
        assert_eq!(reports[0].attempts, 4);
        assert!(matches!(reports[0].result, Err(FetchError::RateLimited { .. })));
        assert_eq!(reports[1].result.as_ref().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn outright_failure_does_not_retry() {
        let source = MockSource::new("broken").failing("connection reset");
        let (since, until) = window();

        let report = fetch_with_retry(&source, since, until, fast()).await;
        assert_eq!(report.attempts, 1);
        assert_eq!(
            report.result.unwrap_err(),
            FetchError::Failed("connection reset".to_string())
        );
    }

    #[tokio::test]
    async fn empty_result_is_not_an_error() {
        let source = MockSource::new("quiet");
        let (since, until) = window();
        let report = fetch_with_retry(&source, since, until, fast()).await;
        assert!(report.result.unwrap().is_empty());
    }
}
