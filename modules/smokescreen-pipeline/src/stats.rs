use serde::Serialize;

use smokescreen_common::RunRecord;

/// What a phase invocation hands back: the finalized run record and its stats.
#[derive(Debug, Clone)]
pub struct RunReport<S> {
    pub run: RunRecord,
    pub stats: S,
}

/// Stats from an ingest run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct IngestStats {
    pub sources_ok: u32,
    pub sources_failed: u32,
    pub articles_fetched: u32,
    pub articles_rejected: u32,
    pub articles_stored: u32,
}

impl std::fmt::Display for IngestStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Ingest Run Complete ===")?;
        writeln!(f, "Sources ok:         {}", self.sources_ok)?;
        writeln!(f, "Sources failed:     {}", self.sources_failed)?;
        writeln!(f, "Articles fetched:   {}", self.articles_fetched)?;
        writeln!(f, "Articles rejected:  {}", self.articles_rejected)?;
        writeln!(f, "Articles stored:    {}", self.articles_stored)?;
        Ok(())
    }
}

/// Stats from a process run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ProcessStats {
    pub stale_runs_swept: u64,
    pub articles_pulled: u32,
    pub articles_assigned: u32,
    pub cluster_batches_failed: u32,
    pub descriptors_dropped: u32,
    pub events_merged: u32,
    pub events_matched_existing: u32,
    pub events_created: u32,
    pub events_scored: u32,
    pub scoring_failed: u32,
    pub scoring_deferred: u32,
    pub events_frozen: u32,
    pub weeks_frozen: u32,
    pub pairs_stored: u32,
    pub budget_exhausted: bool,
}

impl std::fmt::Display for ProcessStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Process Run Complete ===")?;
        writeln!(f, "Stale runs swept:   {}", self.stale_runs_swept)?;
        writeln!(f, "Articles pulled:    {}", self.articles_pulled)?;
        writeln!(f, "Articles assigned:  {}", self.articles_assigned)?;
        writeln!(f, "Batches failed:     {}", self.cluster_batches_failed)?;
        writeln!(f, "Descriptors dropped:{}", self.descriptors_dropped)?;
        writeln!(f, "Events merged:      {}", self.events_merged)?;
        writeln!(f, "Matched existing:   {}", self.events_matched_existing)?;
        writeln!(f, "Events created:     {}", self.events_created)?;
        writeln!(f, "Events scored:      {}", self.events_scored)?;
        writeln!(f, "Scoring failed:     {}", self.scoring_failed)?;
        writeln!(f, "Scoring deferred:   {}", self.scoring_deferred)?;
        writeln!(f, "Events frozen:      {}", self.events_frozen)?;
        writeln!(f, "Weeks frozen:       {}", self.weeks_frozen)?;
        writeln!(f, "Pairs stored:       {}", self.pairs_stored)?;
        if self.budget_exhausted {
            writeln!(f, "\nTime budget exhausted; remaining work deferred.")?;
        }
        Ok(())
    }
}
