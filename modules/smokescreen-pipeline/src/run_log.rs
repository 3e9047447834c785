//! Run log: ordered JSON timeline of every action taken during a phase.
//!
//! Serialized into the run record's `events` column when the run finishes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

pub struct RunLog {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    events: Vec<RunEvent>,
    seq: u32,
}

#[derive(Serialize)]
struct RunEvent {
    seq: u32,
    ts: DateTime<Utc>,
    #[serde(flatten)]
    kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    StaleRunsSwept {
        count: u64,
    },
    SourceFetched {
        source_tag: String,
        articles: u32,
        attempts: u32,
    },
    SourceFailed {
        source_tag: String,
        error: String,
        attempts: u32,
    },
    ArticleRejected {
        url: String,
        reason: String,
    },
    ArticlesStored {
        count: u32,
    },
    ClusterBatch {
        batch: u32,
        articles: u32,
        descriptors: u32,
        dropped: u32,
    },
    ClusterBatchFailed {
        batch: u32,
        error: String,
    },
    EventsMerged {
        merged: u32,
        matched_existing: u32,
    },
    EventCreated {
        event_id: Uuid,
        title: String,
        articles: u32,
    },
    EventScored {
        event_id: Uuid,
        a_score: f64,
        b_score: f64,
        list: String,
        is_mixed: bool,
        noise_flag: bool,
    },
    ScoringFailed {
        event_id: Uuid,
        error: String,
    },
    ScoringDeferred {
        event_id: Uuid,
        reason: String,
    },
    EventsFrozen {
        count: u32,
    },
    WeekFrozen {
        week: String,
        events: u32,
    },
    PairsRegenerated {
        week: String,
        computed: u32,
        stored: u32,
    },
    BudgetCheckpoint {
        elapsed_ms: u64,
        remaining_ms: u64,
    },
}

impl RunLog {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            events: Vec::new(),
            seq: 0,
        }
    }

    pub fn log(&mut self, kind: EventKind) {
        self.events.push(RunEvent {
            seq: self.seq,
            ts: Utc::now(),
            kind,
        });
        self.seq += 1;
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Entries logged so far, in order.
    pub fn kinds(&self) -> impl Iterator<Item = &EventKind> {
        self.events.iter().map(|e| &e.kind)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.events).unwrap_or_else(|_| serde_json::Value::Array(Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_sequenced_and_tagged() {
        let mut log = RunLog::new(Uuid::new_v4());
        log.log(EventKind::ArticlesStored { count: 3 });
        log.log(EventKind::StaleRunsSwept { count: 1 });

        let json = log.to_json();
        let entries = json.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["seq"], 0);
        assert_eq!(entries[0]["type"], "articles_stored");
        assert_eq!(entries[0]["count"], 3);
        assert_eq!(entries[1]["seq"], 1);
        assert_eq!(entries[1]["type"], "stale_runs_swept");
    }
}
