//! Ingest phase: fetch every source, dedup, persist unassigned articles.
//! Never calls the oracle.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use typed_builder::TypedBuilder;

use smokescreen_common::{Article, RunPhase, Settings, SmokescreenError};
use smokescreen_store::ScoreStore;

use crate::dedup::{normalize_url, Deduplicator};
use crate::run_log::EventKind;
use crate::runs::{self, ActiveRun};
use crate::sources::{fetch_all, ArticleSource, RetryPolicy};
use crate::stats::{IngestStats, RunReport};

#[derive(TypedBuilder)]
pub struct IngestPhase {
    store: Arc<dyn ScoreStore>,
    sources: Vec<Arc<dyn ArticleSource>>,
    #[builder(default)]
    settings: Settings,
}

impl IngestPhase {
    pub async fn run(&self) -> Result<RunReport<IngestStats>, SmokescreenError> {
        self.run_at(Utc::now()).await
    }

    pub async fn run_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<RunReport<IngestStats>, SmokescreenError> {
        let stale_cutoff = now - Duration::minutes(self.settings.process.stale_run_minutes);
        let mut active = runs::begin(self.store.as_ref(), RunPhase::Ingest, stale_cutoff).await?;

        let mut stats = IngestStats::default();
        let outcome = self.ingest(now, &mut active, &mut stats).await;
        let run = runs::finish(self.store.as_ref(), active, &stats, outcome).await;

        info!("{stats}");
        Ok(RunReport { run, stats })
    }

    async fn ingest(
        &self,
        now: DateTime<Utc>,
        active: &mut ActiveRun,
        stats: &mut IngestStats,
    ) -> Result<(), SmokescreenError> {
        let since = now - Duration::hours(self.settings.ingest.lookback_hours);
        let policy = RetryPolicy::from_settings(&self.settings.ingest);

        let mut fetched = Vec::new();
        for report in fetch_all(&self.sources, since, now, policy).await {
            match report.result {
                Ok(articles) => {
                    stats.sources_ok += 1;
                    active.log.log(EventKind::SourceFetched {
                        source_tag: report.source_tag,
                        articles: articles.len() as u32,
                        attempts: report.attempts,
                    });
                    fetched.extend(articles);
                }
                Err(e) => {
                    stats.sources_failed += 1;
                    let err = SmokescreenError::SourceFetch {
                        source_tag: report.source_tag.clone(),
                        message: e.to_string(),
                    };
                    warn!(
                        source = report.source_tag.as_str(),
                        attempts = report.attempts,
                        error = %e,
                        "Source failed"
                    );
                    active.soft_error(err.to_string());
                    active.log.log(EventKind::SourceFailed {
                        source_tag: report.source_tag,
                        error: e.to_string(),
                        attempts: report.attempts,
                    });
                }
            }
        }
        stats.articles_fetched = fetched.len() as u32;

        let candidates: Vec<String> = fetched.iter().map(|a| normalize_url(&a.url)).collect();
        let known = self.store.known_urls(&candidates).await?;

        let outcome = Deduplicator::new(&self.settings.dedup).filter(fetched, &known);
        stats.articles_rejected = outcome.rejected.len() as u32;
        for rejected in &outcome.rejected {
            active.log.log(EventKind::ArticleRejected {
                url: rejected.article.url.clone(),
                reason: rejected.reason.as_str().to_string(),
            });
        }

        let articles: Vec<Article> = outcome
            .accepted
            .into_iter()
            .map(|a| Article::from_source(a.article, a.normalized_url))
            .collect();
        let stored = self.store.insert_articles(&articles).await?;
        stats.articles_stored = stored as u32;
        active.log.log(EventKind::ArticlesStored {
            count: stored as u32,
        });

        info!(
            fetched = stats.articles_fetched,
            rejected = stats.articles_rejected,
            stored,
            "Articles ingested"
        );
        Ok(())
    }
}
