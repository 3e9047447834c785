// Persistence seam for the pipeline and the audit ledger.
//
// PgStore is the production implementation; InMemoryStore backs tests and
// dry runs. Both must honour the same atomicity rules: an event mutation and
// its audit record land together, and pair regeneration is all-or-nothing.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use smokescreen_common::{
    Article, Event, RunRecord, ScoreChange, SmokescreenPair, WeekId, WeeklySnapshot,
};

#[async_trait]
pub trait ScoreStore: Send + Sync {
    // --- Articles ---

    /// Which of these normalized URLs are already stored.
    async fn known_urls(&self, normalized_urls: &[String]) -> Result<HashSet<String>>;

    /// Insert new articles, skipping any whose normalized URL already exists.
    /// Returns how many rows were written.
    async fn insert_articles(&self, articles: &[Article]) -> Result<usize>;

    /// Unassigned articles, fewest failed clustering attempts first, then
    /// oldest first.
    async fn unassigned_articles(&self, limit: usize) -> Result<Vec<Article>>;

    /// Count a failed clustering attempt against each of these articles.
    async fn record_cluster_failure(&self, article_ids: &[Uuid]) -> Result<()>;

    async fn assign_articles(&self, event_id: Uuid, article_ids: &[Uuid]) -> Result<()>;

    async fn articles_for_event(&self, event_id: Uuid) -> Result<Vec<Article>>;

    // --- Events ---

    async fn insert_event(&self, event: &Event) -> Result<()>;

    async fn get_event(&self, id: Uuid) -> Result<Option<Event>>;

    async fn events_for_week(&self, week: WeekId) -> Result<Vec<Event>>;

    /// Events never scored, fewest failed scoring attempts first, then
    /// oldest first.
    async fn unscored_events(&self, limit: usize) -> Result<Vec<Event>>;

    async fn count_unscored_events(&self) -> Result<usize>;

    /// Count a failed scoring attempt against an event.
    async fn record_scoring_failure(&self, event_id: Uuid) -> Result<()>;

    /// Scored, unfrozen events created before `cutoff`.
    async fn events_due_for_freeze(&self, cutoff: DateTime<Utc>) -> Result<Vec<Event>>;

    /// Persist an event's new state together with the audit record describing
    /// the change. Either both are written or neither is.
    async fn apply_change(&self, event: &Event, change: &ScoreChange) -> Result<()>;

    /// Audit records for one event, newest first.
    async fn audit_trail(&self, event_id: Uuid) -> Result<Vec<ScoreChange>>;

    // --- Smokescreen pairs ---

    /// Delete every pair in `week` and insert `pairs` in their place.
    async fn replace_pairs(&self, week: WeekId, pairs: &[SmokescreenPair]) -> Result<()>;

    /// Stored pairs for a week, highest index first.
    async fn pairs_for_week(&self, week: WeekId) -> Result<Vec<SmokescreenPair>>;

    // --- Weekly snapshots ---

    async fn upsert_snapshot(&self, snapshot: &WeeklySnapshot) -> Result<()>;

    async fn get_snapshot(&self, week: WeekId) -> Result<Option<WeeklySnapshot>>;

    /// Weeks before `week` that hold events and are not yet frozen, oldest first.
    async fn unfrozen_weeks_before(&self, week: WeekId) -> Result<Vec<WeekId>>;

    /// Weeks holding an audit record newer than the week's snapshot, or no
    /// snapshot at all, oldest first.
    async fn weeks_changed_since_snapshot(&self) -> Result<Vec<WeekId>>;

    // --- Runs ---

    async fn start_run(&self, run: &RunRecord) -> Result<()>;

    async fn finish_run(&self, run: &RunRecord) -> Result<()>;

    /// Mark runs still `running` that started before `cutoff` as failed.
    /// Returns how many were swept.
    async fn sweep_stale_runs(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Most recent runs first.
    async fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>>;
}
