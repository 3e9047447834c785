//! Run bookkeeping shared by both phases: sweep, start, finish.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use smokescreen_common::{RunPhase, RunRecord, RunStatus, SmokescreenError};
use smokescreen_store::ScoreStore;

use crate::run_log::{EventKind, RunLog};

/// A run that has been recorded as `running`.
pub struct ActiveRun {
    pub record: RunRecord,
    pub log: RunLog,
    pub swept: u64,
}

impl ActiveRun {
    /// Record a soft error; the run continues.
    pub fn soft_error(&mut self, message: String) {
        self.record.errors.push(message);
    }
}

/// Sweep runs left `running` since before `stale_cutoff`, then record a new
/// run. Only failing to record the new run is fatal.
pub async fn begin(
    store: &dyn ScoreStore,
    phase: RunPhase,
    stale_cutoff: DateTime<Utc>,
) -> Result<ActiveRun, SmokescreenError> {
    let mut pending = Vec::new();
    let swept = match store.sweep_stale_runs(stale_cutoff).await {
        Ok(n) => n,
        Err(e) => {
            warn!(error = %e, "Failed to sweep stale runs");
            pending.push(format!("stale run sweep failed: {e}"));
            0
        }
    };

    let mut record = RunRecord::start(phase);
    store.start_run(&record).await.map_err(|e| {
        SmokescreenError::Database(format!("failed to record {phase} run start: {e}"))
    })?;
    record.errors = pending;

    let mut log = RunLog::new(record.id);
    if swept > 0 {
        info!(count = swept, "Swept stale runs to failed");
        log.log(EventKind::StaleRunsSwept { count: swept });
    }

    info!(run_id = %record.id, phase = %phase, "Run started");
    Ok(ActiveRun { record, log, swept })
}

/// Finalize the run record from the phase outcome and persist it.
pub async fn finish<S: Serialize>(
    store: &dyn ScoreStore,
    active: ActiveRun,
    stats: &S,
    outcome: Result<(), SmokescreenError>,
) -> RunRecord {
    let ActiveRun {
        mut record, log, ..
    } = active;

    match outcome {
        Ok(()) => record.status = RunStatus::Completed,
        Err(e) => {
            error!(run_id = %record.id, error = %e, "Run failed");
            record.errors.push(e.to_string());
            record.status = RunStatus::Failed;
        }
    }
    record.finished_at = Some(Utc::now());
    record.stats = serde_json::to_value(stats).unwrap_or_default();
    record.events = log.to_json();

    if let Err(e) = store.finish_run(&record).await {
        // The next invocation's sweep marks it failed.
        warn!(run_id = %record.id, error = %e, "Failed to record run completion");
    }

    info!(
        run_id = %record.id,
        status = %record.status,
        errors = record.errors.len(),
        "Run finished"
    );
    record
}
