//! Process phase: cluster unassigned articles into events, score a capped
//! number of them, run the freeze controller, and regenerate each affected
//! week's smokescreen pairs and snapshot.
//!
//! Every unit of work is preceded by a budget check. Once the ceiling has
//! passed, whatever is left is recorded as deferred and picked up next run.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use tracing::{info, warn};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use smokescreen_common::{
    Article, Event, RunPhase, ScoredEvent, Settings, SmokescreenError, WeekId, WeekStatus,
};
use smokescreen_scoring::{build_snapshot, evaluate, SmokescreenMatcher};
use smokescreen_store::{AuditLedger, ScoreStore, SYSTEM_ACTOR};

use crate::budget::TimeBudget;
use crate::clustering::{EventClusterer, EventDescriptor};
use crate::merge::EventMerger;
use crate::oracle::Oracle;
use crate::run_log::EventKind;
use crate::runs::{self, ActiveRun};
use crate::score::parse_score_response;
use crate::stats::{ProcessStats, RunReport};

#[derive(TypedBuilder)]
pub struct ProcessPhase {
    store: Arc<dyn ScoreStore>,
    oracle: Arc<dyn Oracle>,
    #[builder(default)]
    settings: Settings,
    /// Measured displacement confidences keyed by `(distraction, damage)`.
    /// Pairs without one use the time-proximity heuristic.
    #[builder(default)]
    displacement: HashMap<(Uuid, Uuid), f64>,
}

impl ProcessPhase {
    pub async fn run(&self) -> Result<RunReport<ProcessStats>, SmokescreenError> {
        self.run_at(Utc::now()).await
    }

    /// Run with `now` as the reference time for week boundaries, freeze
    /// ages and stale-run sweeps.
    pub async fn run_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<RunReport<ProcessStats>, SmokescreenError> {
        let budget = TimeBudget::new(StdDuration::from_secs(
            self.settings.process.time_budget_secs,
        ));
        let stale_cutoff = now - Duration::minutes(self.settings.process.stale_run_minutes);
        let mut active =
            runs::begin(self.store.as_ref(), RunPhase::Process, stale_cutoff).await?;

        let mut stats = ProcessStats {
            stale_runs_swept: active.swept,
            ..Default::default()
        };
        let outcome = self.process(now, &budget, &mut active, &mut stats).await;

        active.log.log(EventKind::BudgetCheckpoint {
            elapsed_ms: budget.elapsed().as_millis() as u64,
            remaining_ms: budget.remaining().as_millis() as u64,
        });
        let run = runs::finish(self.store.as_ref(), active, &stats, outcome).await;

        info!("{stats}");
        Ok(RunReport { run, stats })
    }

    fn ledger(&self) -> AuditLedger {
        AuditLedger::new(self.store.clone())
    }

    async fn process(
        &self,
        now: DateTime<Utc>,
        budget: &TimeBudget,
        active: &mut ActiveRun,
        stats: &mut ProcessStats,
    ) -> Result<(), SmokescreenError> {
        let current_week = WeekId::containing(now);
        let mut affected: BTreeSet<WeekId> = BTreeSet::from([current_week]);

        if !self.within_budget(budget, "cluster", stats) {
            return Ok(());
        }
        self.cluster_new_articles(now, current_week, active, stats, &mut affected)
            .await?;

        self.score_pending(budget, active, stats, &mut affected)
            .await?;

        if !self.within_budget(budget, "freeze", stats) {
            return Ok(());
        }
        let ledger = self.ledger();
        let aged_cutoff = now - Duration::hours(self.settings.process.auto_freeze_hours);
        let frozen = ledger.freeze_aged(aged_cutoff).await?;
        if frozen > 0 {
            stats.events_frozen += frozen as u32;
            active.log.log(EventKind::EventsFrozen {
                count: frozen as u32,
            });
        }

        // Past weeks get fresh pairs before their snapshot is frozen.
        let past_weeks = self.store.unfrozen_weeks_before(current_week).await?;
        affected.extend(past_weeks.iter().copied());
        // Operator rescores, overrides and unfreezes since the last snapshot,
        // frozen weeks included.
        affected.extend(self.store.weeks_changed_since_snapshot().await?);

        for week in &affected {
            if !self.within_budget(budget, "pairs", stats) {
                return Ok(());
            }
            self.regenerate_pairs(*week, active, stats).await?;
        }

        for week in &past_weeks {
            let events = ledger.freeze_week(*week, SYSTEM_ACTOR).await?;
            stats.weeks_frozen += 1;
            stats.events_frozen += events as u32;
            active.log.log(EventKind::WeekFrozen {
                week: week.to_string(),
                events: events as u32,
            });
        }

        for week in affected.iter().filter(|w| !past_weeks.contains(w)) {
            self.refresh_snapshot(*week).await?;
        }

        Ok(())
    }

    fn within_budget(&self, budget: &TimeBudget, next_unit: &str, stats: &mut ProcessStats) -> bool {
        match budget.check(next_unit) {
            Ok(()) => true,
            Err(_) => {
                stats.budget_exhausted = true;
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Clustering
    // -----------------------------------------------------------------------

    async fn cluster_new_articles(
        &self,
        now: DateTime<Utc>,
        current_week: WeekId,
        active: &mut ActiveRun,
        stats: &mut ProcessStats,
        affected: &mut BTreeSet<WeekId>,
    ) -> Result<(), SmokescreenError> {
        let articles = self
            .store
            .unassigned_articles(self.settings.process.article_batch)
            .await?;
        stats.articles_pulled = articles.len() as u32;
        if articles.is_empty() {
            info!("No unassigned articles");
            return Ok(());
        }

        let existing: Vec<(Uuid, String)> = self
            .store
            .events_for_week(current_week)
            .await?
            .into_iter()
            .map(|e| (e.id, e.title))
            .collect();
        let existing_titles: Vec<String> = existing.iter().map(|(_, t)| t.clone()).collect();

        let clusterer =
            EventClusterer::new(self.oracle.clone(), self.settings.clustering.batch_size);
        let clustered = clusterer.cluster(&articles, &existing_titles).await;

        for report in &clustered.batches {
            match &report.error {
                None => {
                    stats.descriptors_dropped += report.dropped as u32;
                    active.log.log(EventKind::ClusterBatch {
                        batch: report.batch as u32,
                        articles: report.articles as u32,
                        descriptors: report.descriptors as u32,
                        dropped: report.dropped as u32,
                    });
                }
                Some(error) => {
                    let ids: Vec<Uuid> = articles
                        .iter()
                        .skip(report.offset)
                        .take(report.articles)
                        .map(|a| a.id)
                        .collect();
                    self.store.record_cluster_failure(&ids).await?;
                    stats.cluster_batches_failed += 1;
                    active.soft_error(format!("cluster batch {}: {error}", report.batch));
                    active.log.log(EventKind::ClusterBatchFailed {
                        batch: report.batch as u32,
                        error: error.clone(),
                    });
                }
            }
        }

        let merged = EventMerger::new(&self.settings.clustering)
            .merge(clustered.descriptors, &existing);
        stats.events_merged = merged.merged as u32;
        stats.events_matched_existing = merged.matched_existing.len() as u32;
        if merged.merged > 0 || !merged.matched_existing.is_empty() {
            active.log.log(EventKind::EventsMerged {
                merged: merged.merged as u32,
                matched_existing: merged.matched_existing.len() as u32,
            });
        }

        // Coverage of an already-tracked event attaches to it so it is not
        // clustered again next run.
        for (event_id, indices) in &merged.matched_existing {
            let ids = article_ids(&articles, indices);
            self.store.assign_articles(*event_id, &ids).await?;
            stats.articles_assigned += ids.len() as u32;
        }

        for descriptor in &merged.kept {
            let members: Vec<&Article> = descriptor
                .article_indices
                .iter()
                .filter_map(|&i| articles.get(i))
                .collect();
            let event = new_event(descriptor, &members, now);
            let ids: Vec<Uuid> = members.iter().map(|a| a.id).collect();

            self.store.insert_event(&event).await?;
            self.store.assign_articles(event.id, &ids).await?;

            info!(
                event_id = %event.id,
                week = %event.week_id,
                title = event.title.as_str(),
                articles = ids.len(),
                "Event created"
            );
            stats.events_created += 1;
            stats.articles_assigned += ids.len() as u32;
            affected.insert(event.week_id);
            active.log.log(EventKind::EventCreated {
                event_id: event.id,
                title: event.title.clone(),
                articles: ids.len() as u32,
            });
        }

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Scoring
    // -----------------------------------------------------------------------

    async fn score_pending(
        &self,
        budget: &TimeBudget,
        active: &mut ActiveRun,
        stats: &mut ProcessStats,
        affected: &mut BTreeSet<WeekId>,
    ) -> Result<(), SmokescreenError> {
        let cap = self.settings.process.max_scored_per_run;
        let pending = self
            .store
            .unscored_events(self.settings.process.article_batch.max(cap))
            .await?;
        let ledger = self.ledger();

        // Pending events beyond the fetch limit are deferred without a look.
        let unfetched = self
            .store
            .count_unscored_events()
            .await?
            .saturating_sub(pending.len());

        for (i, event) in pending.iter().enumerate() {
            let deferral = if i >= cap {
                Some("per-run scoring cap reached")
            } else if !self.within_budget(budget, "score", stats) {
                Some("time budget exhausted")
            } else {
                None
            };
            if let Some(reason) = deferral {
                stats.scoring_deferred += 1;
                active.log.log(EventKind::ScoringDeferred {
                    event_id: event.id,
                    reason: reason.to_string(),
                });
                continue;
            }

            match self.score_event(&ledger, event).await {
                Ok(scored) => {
                    stats.events_scored += 1;
                    affected.insert(scored.week_id);
                    if let (Some(a), Some(b), Some(c)) =
                        (scored.a_score, scored.b_score, scored.classification.as_ref())
                    {
                        active.log.log(EventKind::EventScored {
                            event_id: scored.id,
                            a_score: a,
                            b_score: b,
                            list: c.list.as_str().to_string(),
                            is_mixed: c.is_mixed,
                            noise_flag: c.noise_flag,
                        });
                    }
                }
                Err(e) => {
                    warn!(event_id = %event.id, error = %e, "Scoring failed");
                    self.store.record_scoring_failure(event.id).await?;
                    stats.scoring_failed += 1;
                    active.soft_error(format!("scoring {}: {e}", event.id));
                    active.log.log(EventKind::ScoringFailed {
                        event_id: event.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        stats.scoring_deferred += unfetched as u32;
        if stats.scoring_deferred > 0 {
            info!(deferred = stats.scoring_deferred, "Scoring deferred to a later run");
        }
        Ok(())
    }

    async fn score_event(
        &self,
        ledger: &AuditLedger,
        event: &Event,
    ) -> Result<Event, SmokescreenError> {
        let scored = judge_event(self.store.as_ref(), self.oracle.as_ref(), event).await?;
        let updated = ledger.record_initial(event, &scored).await?;

        info!(
            event_id = %updated.id,
            a = scored.a.final_score,
            b = scored.b.final_score,
            list = %scored.classification.list,
            "Event scored"
        );
        Ok(updated)
    }

    // -----------------------------------------------------------------------
    // Weekly derivations
    // -----------------------------------------------------------------------

    async fn regenerate_pairs(
        &self,
        week: WeekId,
        active: &mut ActiveRun,
        stats: &mut ProcessStats,
    ) -> Result<(), SmokescreenError> {
        let matcher = SmokescreenMatcher::new(self.settings.smokescreen.storage_cutoff);
        let events = self.store.events_for_week(week).await?;
        let computed = matcher.match_week(week, &events, &self.displacement);
        let computed_count = computed.len();
        let stored = matcher.storable(computed);

        self.store.replace_pairs(week, &stored).await?;
        stats.pairs_stored += stored.len() as u32;
        active.log.log(EventKind::PairsRegenerated {
            week: week.to_string(),
            computed: computed_count as u32,
            stored: stored.len() as u32,
        });
        Ok(())
    }

    /// Rebuild a week's snapshot, keeping a frozen status once set.
    async fn refresh_snapshot(&self, week: WeekId) -> Result<(), SmokescreenError> {
        let status = match self.store.get_snapshot(week).await? {
            Some(existing) => existing.status,
            None => WeekStatus::Live,
        };
        let events = self.store.events_for_week(week).await?;
        let pairs = self.store.pairs_for_week(week).await?;
        let snapshot = build_snapshot(week, status, &events, &pairs, Utc::now());
        self.store.upsert_snapshot(&snapshot).await?;
        Ok(())
    }
}

/// Ask the oracle for driver values on `event` and recompute its scores
/// locally. Nothing is persisted.
pub async fn judge_event(
    store: &dyn ScoreStore,
    oracle: &dyn Oracle,
    event: &Event,
) -> Result<ScoredEvent, SmokescreenError> {
    let articles = store.articles_for_event(event.id).await?;
    let raw = oracle.score_event(event, &articles).await?;
    let inputs = parse_score_response(&raw)?;
    Ok(evaluate(
        &inputs,
        event.mechanism,
        event.scope,
        event.population,
    ))
}

fn article_ids(articles: &[Article], indices: &[usize]) -> Vec<Uuid> {
    indices
        .iter()
        .filter_map(|&i| articles.get(i))
        .map(|a| a.id)
        .collect()
}

/// When an event happened: the oracle's date if it gave one, else the
/// earliest publication among its articles, else `now`.
fn occurred_at(
    descriptor: &EventDescriptor,
    members: &[&Article],
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    descriptor
        .event_date
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        .or_else(|| members.iter().filter_map(|a| a.published_at).min())
        .unwrap_or(now)
}

fn new_event(descriptor: &EventDescriptor, members: &[&Article], now: DateTime<Utc>) -> Event {
    let occurred_at = occurred_at(descriptor, members, now);
    Event {
        id: Uuid::new_v4(),
        week_id: WeekId::containing(occurred_at),
        title: descriptor.title.clone(),
        summary: descriptor.summary.clone(),
        occurred_at,
        mechanism: descriptor.mechanism,
        scope: descriptor.scope,
        population: descriptor.population,
        actors: descriptor.actors.clone(),
        institution: descriptor.institution.clone(),
        topic_tags: descriptor.topic_tags.clone(),
        confidence: descriptor.confidence,
        article_count: members.len() as i32,
        institutional_lever: false,
        a_score: None,
        a_breakdown: None,
        b_score: None,
        b_breakdown: None,
        classification: None,
        score_version: 0,
        scored_at: None,
        score_frozen: false,
        frozen_at: None,
        frozen_by: None,
        correction_notice: None,
        correction_at: None,
        created_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    use crate::testing::test_articles;

    fn descriptor(event_date: Option<NaiveDate>) -> EventDescriptor {
        EventDescriptor {
            title: "Agency bars reporters from briefings".to_string(),
            event_date,
            summary: String::new(),
            mechanism: None,
            scope: None,
            population: None,
            actors: Vec::new(),
            institution: None,
            topic_tags: Vec::new(),
            article_indices: vec![0, 1],
            confidence: 0.8,
        }
    }

    #[test]
    fn occurrence_prefers_oracle_date_then_earliest_article() {
        let now = Utc.with_ymd_and_hms(2025, 3, 12, 9, 0, 0).unwrap();
        let mut articles = test_articles(2);
        articles[0].published_at = Some(Utc.with_ymd_and_hms(2025, 3, 10, 18, 0, 0).unwrap());
        articles[1].published_at = Some(Utc.with_ymd_and_hms(2025, 3, 9, 7, 30, 0).unwrap());
        let members: Vec<&Article> = articles.iter().collect();

        let dated = descriptor(NaiveDate::from_ymd_opt(2025, 3, 8));
        assert_eq!(
            occurred_at(&dated, &members, now),
            Utc.with_ymd_and_hms(2025, 3, 8, 0, 0, 0).unwrap()
        );

        let undated = descriptor(None);
        assert_eq!(
            occurred_at(&undated, &members, now),
            Utc.with_ymd_and_hms(2025, 3, 9, 7, 30, 0).unwrap()
        );

        assert_eq!(occurred_at(&undated, &[], now), now);
    }

    #[test]
    fn new_events_start_unscored_in_their_occurrence_week() {
        let now = Utc.with_ymd_and_hms(2025, 3, 12, 9, 0, 0).unwrap();
        let articles = test_articles(2);
        let members: Vec<&Article> = articles.iter().collect();

        let event = new_event(&descriptor(NaiveDate::from_ymd_opt(2025, 3, 3)), &members, now);
        assert_eq!(event.week_id, WeekId::containing(event.occurred_at));
        assert_ne!(event.week_id, WeekId::containing(now));
        assert_eq!(event.article_count, 2);
        assert!(!event.is_scored());
        assert!(!event.score_frozen);
    }
}
