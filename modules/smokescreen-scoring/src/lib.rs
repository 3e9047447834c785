//! Deterministic scoring, classification and smokescreen pairing.
//!
//! Everything here is pure: oracle output goes in as driver values and
//! comes back out as recomputed scores. Nothing in this crate performs I/O.

pub mod classify;
pub mod scoring;
pub mod smokescreen;
pub mod weekly;

pub use classify::classify;
pub use scoring::{evaluate, round1, score_a, score_b};
pub use smokescreen::SmokescreenMatcher;
pub use weekly::build_snapshot;
