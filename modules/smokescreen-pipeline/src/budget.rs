use std::time::{Duration, Instant};

use tracing::warn;

use smokescreen_common::SmokescreenError;

/// Cooperative wall-clock budget for one phase invocation.
///
/// Work is never interrupted mid-call; callers check before starting each
/// unit and defer whatever is left once the ceiling has passed.
pub struct TimeBudget {
    started: Instant,
    ceiling: Duration,
}

impl TimeBudget {
    pub fn new(ceiling: Duration) -> Self {
        Self {
            started: Instant::now(),
            ceiling,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.ceiling.saturating_sub(self.elapsed())
    }

    pub fn exhausted(&self) -> bool {
        self.elapsed() >= self.ceiling
    }

    /// `Err(TimeBudgetExceeded)` once the ceiling has passed.
    pub fn check(&self, next_unit: &str) -> Result<(), SmokescreenError> {
        let elapsed = self.elapsed();
        if elapsed < self.ceiling {
            return Ok(());
        }
        warn!(
            next_unit,
            elapsed_ms = elapsed.as_millis() as u64,
            ceiling_ms = self.ceiling.as_millis() as u64,
            "Time budget exhausted, deferring remaining work"
        );
        Err(SmokescreenError::TimeBudgetExceeded {
            elapsed_ms: elapsed.as_millis(),
            ceiling_ms: self.ceiling.as_millis(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_ceiling_is_exhausted_immediately() {
        let budget = TimeBudget::new(Duration::ZERO);
        assert!(budget.exhausted());
        assert!(matches!(
            budget.check("score"),
            Err(SmokescreenError::TimeBudgetExceeded { ceiling_ms: 0, .. })
        ));
        assert_eq!(budget.remaining(), Duration::ZERO);
    }

    #[test]
    fn generous_ceiling_allows_work() {
        let budget = TimeBudget::new(Duration::from_secs(60));
        assert!(!budget.exhausted());
        assert!(budget.check("cluster").is_ok());
        assert!(budget.remaining() > Duration::from_secs(59));
    }
}
