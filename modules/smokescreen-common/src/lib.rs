pub mod types;
pub mod week;
pub mod config;
pub mod error;

pub use types::*;
pub use week::WeekId;
pub use config::{Config, Settings};
pub use error::{Result, SmokescreenError};
