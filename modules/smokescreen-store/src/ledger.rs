//! Audit ledger and freeze controller.
//!
//! Every scoring mutation goes through here so that the event row and its
//! `ScoreChange` record are written together. Frozen events reject score
//! changes outright; corrections are the only edit allowed on a frozen row.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use smokescreen_common::{
    ChangeType, Event, Result, ScoreChange, ScoreList, ScoredEvent, SmokescreenError, WeekId,
    WeekStatus,
};
use smokescreen_scoring::{build_snapshot, classify, round1};

use crate::store::ScoreStore;

/// Actor recorded for mutations made by the pipeline itself.
pub const SYSTEM_ACTOR: &str = "system";

#[derive(Clone)]
pub struct AuditLedger {
    store: Arc<dyn ScoreStore>,
}

impl AuditLedger {
    pub fn new(store: Arc<dyn ScoreStore>) -> Self {
        Self { store }
    }

    async fn load(&self, event_id: Uuid) -> Result<Event> {
        self.store
            .get_event(event_id)
            .await?
            .ok_or_else(|| SmokescreenError::NotFound(format!("event {event_id}")))
    }

    async fn commit(
        &self,
        before: &Event,
        after: Event,
        change_type: ChangeType,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<Event> {
        let change = ScoreChange::between(before, &after, change_type, actor, reason);
        self.store.apply_change(&after, &change).await?;
        info!(
            event_id = %after.id,
            change = %change_type,
            version = after.score_version,
            actor,
            "Score ledger updated"
        );
        Ok(after)
    }

    /// First scoring of an event: version 0 → 1.
    pub async fn record_initial(&self, event: &Event, scored: &ScoredEvent) -> Result<Event> {
        ensure_unfrozen(event)?;
        if event.is_scored() {
            return Err(SmokescreenError::Validation(format!(
                "event {} already scored at version {}; rescore instead",
                event.id, event.score_version
            )));
        }

        let mut after = event.clone();
        apply_scores(&mut after, scored, Utc::now());
        after.score_version = 1;
        self.commit(event, after, ChangeType::Initial, SYSTEM_ACTOR, None)
            .await
    }

    pub async fn rescore(
        &self,
        event_id: Uuid,
        scored: &ScoredEvent,
        actor: &str,
        reason: &str,
    ) -> Result<Event> {
        let event = self.load(event_id).await?;
        ensure_unfrozen(&event)?;
        let reason = require_reason(reason)?;

        let mut after = event.clone();
        apply_scores(&mut after, scored, Utc::now());
        after.score_version += 1;
        self.commit(&event, after, ChangeType::Rescore, actor, Some(reason))
            .await
    }

    /// Operator override of final scores. The list is reclassified from the
    /// new scores unless `list` forces one.
    pub async fn override_scores(
        &self,
        event_id: Uuid,
        a: f64,
        b: f64,
        list: Option<ScoreList>,
        actor: &str,
        reason: &str,
    ) -> Result<Event> {
        let event = self.load(event_id).await?;
        ensure_unfrozen(&event)?;
        let reason = require_reason(reason)?;
        if !(0.0..=100.0).contains(&a) || !(0.0..=100.0).contains(&b) {
            return Err(SmokescreenError::Validation(format!(
                "override scores must be within 0–100 (got A={a}, B={b})"
            )));
        }

        let (a, b) = (round1(a), round1(b));
        let noise_codes = event
            .classification
            .as_ref()
            .map(|c| c.noise_codes.clone())
            .unwrap_or_default();
        let mut classification =
            classify(a, b, event.mechanism, event.institutional_lever, &noise_codes);
        if let Some(list) = list {
            classification.list = list;
            classification.is_mixed = false;
        }

        let mut after = event.clone();
        after.a_score = Some(a);
        after.b_score = Some(b);
        after.classification = Some(classification);
        after.scored_at = Some(Utc::now());
        after.score_version += 1;
        self.commit(&event, after, ChangeType::Override, actor, Some(reason))
            .await
    }

    /// Freeze an event's scores. Already-frozen events are left untouched.
    pub async fn freeze(&self, event_id: Uuid, actor: &str, reason: Option<&str>) -> Result<Event> {
        let event = self.load(event_id).await?;
        self.freeze_event(&event, actor, reason).await
    }

    async fn freeze_event(&self, event: &Event, actor: &str, reason: Option<&str>) -> Result<Event> {
        if event.score_frozen {
            return Ok(event.clone());
        }
        let mut after = event.clone();
        after.score_frozen = true;
        after.frozen_at = Some(Utc::now());
        after.frozen_by = Some(actor.to_string());
        self.commit(event, after, ChangeType::Freeze, actor, reason).await
    }

    /// Lift a freeze so the event can be rescored. Scores and version are
    /// unchanged until the rescore itself.
    pub async fn unfreeze(&self, event_id: Uuid, actor: &str, reason: &str) -> Result<Event> {
        let event = self.load(event_id).await?;
        let reason = require_reason(reason)?;
        if !event.score_frozen {
            return Err(SmokescreenError::Validation(format!(
                "event {event_id} is not frozen"
            )));
        }
        let mut after = event.clone();
        after.score_frozen = false;
        after.frozen_at = None;
        after.frozen_by = None;
        self.commit(&event, after, ChangeType::Unfreeze, actor, Some(reason))
            .await
    }

    /// Append a public correction. Previous notices are kept; scores are not touched.
    pub async fn append_correction(
        &self,
        event_id: Uuid,
        notice: &str,
        actor: &str,
    ) -> Result<Event> {
        let event = self.load(event_id).await?;
        let notice = notice.trim();
        if notice.is_empty() {
            return Err(SmokescreenError::Validation(
                "correction notice must not be empty".to_string(),
            ));
        }

        let mut after = event.clone();
        after.correction_notice = Some(match &event.correction_notice {
            Some(previous) => format!("{previous}\n{notice}"),
            None => notice.to_string(),
        });
        after.correction_at = Some(Utc::now());
        self.commit(&event, after, ChangeType::Correction, actor, Some(notice))
            .await
    }

    pub async fn audit_trail(&self, event_id: Uuid) -> Result<Vec<ScoreChange>> {
        Ok(self.store.audit_trail(event_id).await?)
    }

    /// Freeze scored events created before `cutoff`. Returns how many froze.
    pub async fn freeze_aged(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let due = self.store.events_due_for_freeze(cutoff).await?;
        let mut frozen = 0;
        for event in &due {
            match self
                .freeze_event(event, SYSTEM_ACTOR, Some("auto-freeze: event aged out"))
                .await
            {
                Ok(_) => frozen += 1,
                Err(e) => warn!(event_id = %event.id, error = %e, "Auto-freeze failed"),
            }
        }
        Ok(frozen)
    }

    /// Freeze every scored event in `week` and mark its snapshot frozen.
    /// Unscored events stay open; they freeze by age once scored.
    pub async fn freeze_week(&self, week: WeekId, actor: &str) -> Result<usize> {
        let events = self.store.events_for_week(week).await?;
        let reason = format!("week {week} frozen");
        let mut frozen = 0;
        for event in events.iter().filter(|e| e.is_scored() && !e.score_frozen) {
            self.freeze_event(event, actor, Some(reason.as_str())).await?;
            frozen += 1;
        }

        let events = self.store.events_for_week(week).await?;
        let pairs = self.store.pairs_for_week(week).await?;
        let snapshot = build_snapshot(week, WeekStatus::Frozen, &events, &pairs, Utc::now());
        self.store.upsert_snapshot(&snapshot).await?;

        info!(week = %week, frozen, actor, "Week frozen");
        Ok(frozen)
    }
}

fn ensure_unfrozen(event: &Event) -> Result<()> {
    if event.score_frozen {
        return Err(SmokescreenError::FrozenStateViolation { event_id: event.id });
    }
    Ok(())
}

fn require_reason(reason: &str) -> Result<&str> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(SmokescreenError::Validation(
            "a reason is required for this change".to_string(),
        ));
    }
    Ok(reason)
}

fn apply_scores(event: &mut Event, scored: &ScoredEvent, now: DateTime<Utc>) {
    event.a_score = Some(scored.a.final_score);
    event.a_breakdown = Some(scored.a.clone());
    event.b_score = Some(scored.b.final_score);
    event.b_breakdown = Some(scored.b.clone());
    event.classification = Some(scored.classification.clone());
    event.institutional_lever = scored.institutional_lever;
    event.scored_at = Some(now);
}
