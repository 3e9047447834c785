pub mod budget;
pub mod clustering;
pub mod dedup;
pub mod feed;
pub mod ingest;
pub mod merge;
pub mod oracle;
pub mod process;
pub mod run_log;
pub mod runs;
pub mod score;
pub mod similarity;
pub mod sources;
pub mod stats;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use ingest::IngestPhase;
pub use process::ProcessPhase;
pub use stats::{IngestStats, ProcessStats, RunReport};
