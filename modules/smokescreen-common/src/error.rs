use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SmokescreenError {
    #[error("Source fetch failed ({source_tag}): {message}")]
    SourceFetch { source_tag: String, message: String },

    #[error("Oracle response could not be parsed: {0}")]
    OracleParse(String),

    #[error("Time budget exceeded: {elapsed_ms}ms elapsed of {ceiling_ms}ms")]
    TimeBudgetExceeded { elapsed_ms: u128, ceiling_ms: u128 },

    #[error("Event {event_id} is frozen; unfreeze it before changing scores")]
    FrozenStateViolation { event_id: Uuid },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SmokescreenError>;
