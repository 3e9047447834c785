//! Smokescreen pairing: which high-hype events may have pulled coverage away
//! from high-damage events in the same week.
//!
//! Pairing is a full bipartite cross-product, not nearest-neighbour: one
//! distraction can mask several unrelated damage events.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use smokescreen_common::{Event, PairSeverity, ScoreList, SmokescreenPair, WeekId};

use crate::scoring::round1;

pub const MIN_DISTRACTION_INTENTIONALITY: u8 = 4;
pub const MIN_DAMAGE_SCORE: f64 = 40.0;
pub const PROXIMITY_WINDOW_HOURS: f64 = 48.0;
pub const NEAR_CONFIDENCE: f64 = 0.5;
pub const FAR_CONFIDENCE: f64 = 0.3;
pub const DEFAULT_STORAGE_CUTOFF: f64 = 15.0;

/// List B with deliberate intent behind it.
pub fn is_distraction(event: &Event) -> bool {
    event.list() == Some(ScoreList::B)
        && event
            .intentionality()
            .is_some_and(|i| i >= MIN_DISTRACTION_INTENTIONALITY)
}

/// List A with substantial damage.
pub fn is_damage(event: &Event) -> bool {
    event.list() == Some(ScoreList::A) && event.a_score.is_some_and(|a| a >= MIN_DAMAGE_SCORE)
}

/// Confidence used when displacement was not measured: events within 48h
/// of each other are likelier to compete for the same coverage.
pub fn proximity_confidence(distraction_at: DateTime<Utc>, damage_at: DateTime<Utc>) -> f64 {
    let hours = (damage_at - distraction_at).num_minutes().abs() as f64 / 60.0;
    if hours <= PROXIMITY_WINDOW_HOURS {
        NEAR_CONFIDENCE
    } else {
        FAR_CONFIDENCE
    }
}

/// Returns `(raw, final)`. Confidence moves the raw index within ±30%.
pub fn smokescreen_index(b_score: f64, a_score: f64, confidence: f64) -> (f64, f64) {
    let raw = b_score * a_score / 100.0;
    let confidence = confidence.clamp(0.0, 1.0);
    (raw, raw * (0.7 + 0.3 * confidence))
}

pub struct SmokescreenMatcher {
    storage_cutoff: f64,
}

impl Default for SmokescreenMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_STORAGE_CUTOFF)
    }
}

impl SmokescreenMatcher {
    pub fn new(storage_cutoff: f64) -> Self {
        Self { storage_cutoff }
    }

    pub fn storage_cutoff(&self) -> f64 {
        self.storage_cutoff
    }

    /// Every qualifying pair in `week`, sorted by index descending.
    ///
    /// `measured` holds displacement confidences keyed by
    /// `(distraction_id, damage_id)`; pairs without one fall back to the
    /// time-proximity heuristic. A confidence of exactly 0 discards the pair.
    pub fn match_week(
        &self,
        week: WeekId,
        events: &[Event],
        measured: &HashMap<(Uuid, Uuid), f64>,
    ) -> Vec<SmokescreenPair> {
        let in_week = |e: &&Event| e.week_id == week;
        let distractions: Vec<&Event> = events
            .iter()
            .filter(in_week)
            .filter(|e| is_distraction(e))
            .collect();
        let damages: Vec<&Event> = events
            .iter()
            .filter(in_week)
            .filter(|e| is_damage(e))
            .collect();

        let now = Utc::now();
        let mut pairs = Vec::with_capacity(distractions.len() * damages.len());

        for distraction in &distractions {
            for damage in &damages {
                let (Some(b), Some(a)) = (distraction.b_score, damage.a_score) else {
                    continue;
                };

                let confidence = match measured.get(&(distraction.id, damage.id)) {
                    Some(c) if c.is_finite() => c.clamp(0.0, 1.0),
                    _ => proximity_confidence(distraction.occurred_at, damage.occurred_at),
                };
                if confidence == 0.0 {
                    continue;
                }

                let (raw, index) = smokescreen_index(b, a, confidence);
                let index = round1(index);
                let delta = (damage.occurred_at - distraction.occurred_at).num_minutes() as f64 / 60.0;

                pairs.push(SmokescreenPair {
                    id: Uuid::new_v4(),
                    week_id: week,
                    distraction_event_id: distraction.id,
                    damage_event_id: damage.id,
                    raw_index: round1(raw),
                    smokescreen_index: index,
                    displacement_confidence: confidence,
                    time_delta_hours: round1(delta),
                    severity: PairSeverity::for_index(index),
                    created_at: now,
                });
            }
        }

        pairs.sort_by(|x, y| y.smokescreen_index.total_cmp(&x.smokescreen_index));
        pairs
    }

    /// The pairs worth persisting: at or above the storage cutoff.
    pub fn storable(&self, pairs: Vec<SmokescreenPair>) -> Vec<SmokescreenPair> {
        pairs
            .into_iter()
            .filter(|p| p.smokescreen_index >= self.storage_cutoff)
            .collect()
    }
}
