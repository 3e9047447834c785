use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use smokescreen_common::{
    Article, Event, RunRecord, RunStatus, ScoreChange, SmokescreenPair, WeekId, WeekStatus,
    WeeklySnapshot,
};

use crate::store::ScoreStore;

#[derive(Default)]
struct Inner {
    articles: Vec<Article>,
    events: HashMap<Uuid, Event>,
    /// Insertion order, so "oldest first" is stable when timestamps tie.
    event_order: Vec<Uuid>,
    changes: Vec<ScoreChange>,
    pairs: Vec<SmokescreenPair>,
    snapshots: HashMap<WeekId, WeeklySnapshot>,
    runs: Vec<RunRecord>,
    cluster_attempts: HashMap<Uuid, u32>,
    scoring_attempts: HashMap<Uuid, u32>,
    fail_on_change: bool,
}

/// Mutex-guarded in-memory store. Used by tests and `--dry-run`.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `apply_change` fail for every call.
    pub fn failing_changes(self) -> Self {
        self.lock().fail_on_change = true;
        self
    }

    // --- Assertion helpers ---

    pub fn article_count(&self) -> usize {
        self.lock().articles.len()
    }

    pub fn event_count(&self) -> usize {
        self.lock().events.len()
    }

    pub fn all_events(&self) -> Vec<Event> {
        let inner = self.lock();
        inner
            .event_order
            .iter()
            .filter_map(|id| inner.events.get(id).cloned())
            .collect()
    }

    pub fn all_changes(&self) -> Vec<ScoreChange> {
        self.lock().changes.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves plain data behind; keep serving it.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ScoreStore for InMemoryStore {
    async fn known_urls(&self, normalized_urls: &[String]) -> Result<HashSet<String>> {
        let inner = self.lock();
        let wanted: HashSet<&str> = normalized_urls.iter().map(String::as_str).collect();
        Ok(inner
            .articles
            .iter()
            .filter(|a| wanted.contains(a.normalized_url.as_str()))
            .map(|a| a.normalized_url.clone())
            .collect())
    }

    async fn insert_articles(&self, articles: &[Article]) -> Result<usize> {
        let mut inner = self.lock();
        let mut seen: HashSet<String> =
            inner.articles.iter().map(|a| a.normalized_url.clone()).collect();
        let mut written = 0;
        for article in articles {
            if seen.insert(article.normalized_url.clone()) {
                inner.articles.push(article.clone());
                written += 1;
            }
        }
        Ok(written)
    }

    async fn unassigned_articles(&self, limit: usize) -> Result<Vec<Article>> {
        let inner = self.lock();
        let mut unassigned: Vec<Article> = inner
            .articles
            .iter()
            .filter(|a| a.event_id.is_none())
            .cloned()
            .collect();
        unassigned.sort_by_key(|a| {
            let attempts = inner.cluster_attempts.get(&a.id).copied().unwrap_or(0);
            (attempts, a.ingested_at)
        });
        unassigned.truncate(limit);
        Ok(unassigned)
    }

    async fn record_cluster_failure(&self, article_ids: &[Uuid]) -> Result<()> {
        let mut inner = self.lock();
        for id in article_ids {
            *inner.cluster_attempts.entry(*id).or_default() += 1;
        }
        Ok(())
    }

    async fn assign_articles(&self, event_id: Uuid, article_ids: &[Uuid]) -> Result<()> {
        let mut inner = self.lock();
        let ids: HashSet<&Uuid> = article_ids.iter().collect();
        for article in inner.articles.iter_mut().filter(|a| ids.contains(&a.id)) {
            article.event_id = Some(event_id);
        }
        Ok(())
    }

    async fn articles_for_event(&self, event_id: Uuid) -> Result<Vec<Article>> {
        let inner = self.lock();
        Ok(inner
            .articles
            .iter()
            .filter(|a| a.event_id == Some(event_id))
            .cloned()
            .collect())
    }

    async fn insert_event(&self, event: &Event) -> Result<()> {
        let mut inner = self.lock();
        if inner.events.contains_key(&event.id) {
            bail!("event {} already exists", event.id);
        }
        inner.event_order.push(event.id);
        inner.events.insert(event.id, event.clone());
        Ok(())
    }

    async fn get_event(&self, id: Uuid) -> Result<Option<Event>> {
        Ok(self.lock().events.get(&id).cloned())
    }

    async fn events_for_week(&self, week: WeekId) -> Result<Vec<Event>> {
        let inner = self.lock();
        Ok(inner
            .event_order
            .iter()
            .filter_map(|id| inner.events.get(id))
            .filter(|e| e.week_id == week)
            .cloned()
            .collect())
    }

    async fn unscored_events(&self, limit: usize) -> Result<Vec<Event>> {
        let inner = self.lock();
        let mut pending: Vec<&Event> = inner
            .event_order
            .iter()
            .filter_map(|id| inner.events.get(id))
            .filter(|e| !e.is_scored())
            .collect();
        // Stable sort keeps insertion order among equal attempt counts.
        pending.sort_by_key(|e| inner.scoring_attempts.get(&e.id).copied().unwrap_or(0));
        Ok(pending.into_iter().take(limit).cloned().collect())
    }

    async fn count_unscored_events(&self) -> Result<usize> {
        Ok(self.lock().events.values().filter(|e| !e.is_scored()).count())
    }

    async fn record_scoring_failure(&self, event_id: Uuid) -> Result<()> {
        let mut inner = self.lock();
        if !inner.events.contains_key(&event_id) {
            bail!("event {event_id} not found");
        }
        *inner.scoring_attempts.entry(event_id).or_default() += 1;
        Ok(())
    }

    async fn events_due_for_freeze(&self, cutoff: DateTime<Utc>) -> Result<Vec<Event>> {
        let inner = self.lock();
        Ok(inner
            .event_order
            .iter()
            .filter_map(|id| inner.events.get(id))
            .filter(|e| e.is_scored() && !e.score_frozen && e.created_at < cutoff)
            .cloned()
            .collect())
    }

    async fn apply_change(&self, event: &Event, change: &ScoreChange) -> Result<()> {
        let mut inner = self.lock();
        if inner.fail_on_change {
            bail!("simulated write failure for event {}", event.id);
        }
        if !inner.events.contains_key(&event.id) {
            bail!("event {} not found", event.id);
        }
        inner.events.insert(event.id, event.clone());
        inner.changes.push(change.clone());
        Ok(())
    }

    async fn audit_trail(&self, event_id: Uuid) -> Result<Vec<ScoreChange>> {
        let inner = self.lock();
        // Insertion order is chronological; reverse keeps ties newest-first too.
        Ok(inner
            .changes
            .iter()
            .rev()
            .filter(|c| c.event_id == event_id)
            .cloned()
            .collect())
    }

    async fn replace_pairs(&self, week: WeekId, pairs: &[SmokescreenPair]) -> Result<()> {
        let mut inner = self.lock();
        inner.pairs.retain(|p| p.week_id != week);
        inner.pairs.extend(pairs.iter().cloned());
        Ok(())
    }

    async fn pairs_for_week(&self, week: WeekId) -> Result<Vec<SmokescreenPair>> {
        let inner = self.lock();
        let mut pairs: Vec<SmokescreenPair> =
            inner.pairs.iter().filter(|p| p.week_id == week).cloned().collect();
        pairs.sort_by(|a, b| b.smokescreen_index.total_cmp(&a.smokescreen_index));
        Ok(pairs)
    }

    async fn upsert_snapshot(&self, snapshot: &WeeklySnapshot) -> Result<()> {
        self.lock()
            .snapshots
            .insert(snapshot.week_id, snapshot.clone());
        Ok(())
    }

    async fn get_snapshot(&self, week: WeekId) -> Result<Option<WeeklySnapshot>> {
        Ok(self.lock().snapshots.get(&week).cloned())
    }

    async fn unfrozen_weeks_before(&self, week: WeekId) -> Result<Vec<WeekId>> {
        let inner = self.lock();
        let weeks: BTreeSet<WeekId> = inner
            .events
            .values()
            .map(|e| e.week_id)
            .filter(|w| *w < week)
            .filter(|w| {
                inner
                    .snapshots
                    .get(w)
                    .map_or(true, |s| s.status != WeekStatus::Frozen)
            })
            .collect();
        Ok(weeks.into_iter().collect())
    }

    async fn weeks_changed_since_snapshot(&self) -> Result<Vec<WeekId>> {
        let inner = self.lock();
        let weeks: BTreeSet<WeekId> = inner
            .changes
            .iter()
            .filter(|c| {
                inner
                    .snapshots
                    .get(&c.week_id)
                    .map_or(true, |s| c.created_at > s.computed_at)
            })
            .map(|c| c.week_id)
            .collect();
        Ok(weeks.into_iter().collect())
    }

    async fn start_run(&self, run: &RunRecord) -> Result<()> {
        self.lock().runs.push(run.clone());
        Ok(())
    }

    async fn finish_run(&self, run: &RunRecord) -> Result<()> {
        let mut inner = self.lock();
        match inner.runs.iter_mut().find(|r| r.id == run.id) {
            Some(slot) => *slot = run.clone(),
            None => bail!("run {} not found", run.id),
        }
        Ok(())
    }

    async fn sweep_stale_runs(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.lock();
        let now = Utc::now();
        let mut swept = 0;
        for run in inner
            .runs
            .iter_mut()
            .filter(|r| r.status == RunStatus::Running && r.started_at < cutoff)
        {
            run.status = RunStatus::Failed;
            run.finished_at = Some(now);
            run.errors.push("swept: run exceeded its timeout".to_string());
            swept += 1;
        }
        Ok(swept)
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let inner = self.lock();
        let mut runs = inner.runs.clone();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit);
        Ok(runs)
    }
}
