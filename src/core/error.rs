use super::CircuitBreaker;
use crate::utils;
use std::error::Error as StdError;
use std::fmt;

/// `CircuitBreakerError` is the fail-fast rejection returned when a call is
/// attempted while the circuit is open. It tells the caller "do not retry
/// now": the dependency was never invoked, the circuit is protecting it.
///
/// The error holds a handle to the rejecting breaker rather than a snapshot,
/// so the cool-down it reports for backoff decisions is read live.
#[derive(Debug, Clone)]
pub struct CircuitBreakerError {
    breaker: CircuitBreaker,
}

impl CircuitBreakerError {
    pub(crate) fn new(breaker: CircuitBreaker) -> Self {
        CircuitBreakerError { breaker }
    }

    /// The breaker that rejected the call.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Remaining cool-down in whole seconds, rounded and clamped at zero.
    pub fn remaining_secs(&self) -> u64 {
        let remaining_ms = self.breaker.open_remaining_ms();
        if remaining_ms <= 0 {
            0
        } else {
            ((remaining_ms as f64) / 1000.0).round() as u64
        }
    }
}

impl fmt::Display for CircuitBreakerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Circuit \"{}\" OPEN until {} ({} failures, {} sec remaining)",
            self.breaker.name(),
            utils::format_time_millis(self.breaker.open_until_ms()),
            self.breaker.failure_count(),
            self.remaining_secs()
        )
    }
}

impl StdError for CircuitBreakerError {}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::breaker::ManualClock;
    use crate::core::{BreakerConfig, NopStats};

    fn breaker(clock: ManualClock) -> CircuitBreaker {
        CircuitBreaker::with_parts(
            BreakerConfig {
                name: "Foobar".into(),
                ..Default::default()
            },
            Box::new(|_| true),
            Box::new(clock),
            Box::new(NopStats),
        )
        .unwrap()
    }

    #[test]
    fn renders_name_window_and_failures() {
        let error = CircuitBreakerError::new(breaker(ManualClock::default()));
        let rendered = error.to_string();
        assert!(rendered.starts_with("Circuit \"Foobar\" OPEN until "));
        assert!(rendered.ends_with("(0 failures, 30 sec remaining)"));
    }

    #[test]
    fn remaining_is_clamped_at_zero() {
        let clock = ManualClock::default();
        let error = CircuitBreakerError::new(breaker(clock.clone()));
        clock.advance(120_000);
        assert_eq!(error.remaining_secs(), 0);
        assert!(error.to_string().ends_with("(0 failures, 0 sec remaining)"));
    }
}
