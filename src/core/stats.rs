use super::State;
use crate::logging;

/// `StatsSink` receives the breaker's telemetry events.
///
/// All three operations are fire-and-forget. The breaker invokes them inline
/// on the calling thread, never retries them and never buffers on sink
/// failure, so implementations must not block for long or panic.
pub trait StatsSink: Send + Sync {
    /// Reports the breaker's current (possibly derived) state.
    /// Invoked exactly once per `call`, after the outcome is known.
    fn record_state(&self, name: &str, state: State);

    /// Reports a successful call, with the stored state before the reset to closed.
    fn record_success(&self, name: &str, prev_state: State);

    /// Reports a rejected or failed call, with the stored state before the update.
    fn record_failure(&self, name: &str, prev_state: State);
}

/// A `StatsSink` that discards every event.
#[derive(Debug, Default)]
pub struct NopStats;

impl StatsSink for NopStats {
    fn record_state(&self, _name: &str, _state: State) {}

    fn record_success(&self, _name: &str, _prev_state: State) {}

    fn record_failure(&self, _name: &str, _prev_state: State) {}
}

/// A `StatsSink` that forwards every event to the `log` facade at trace level.
#[derive(Debug, Default)]
pub struct LogStats;

impl StatsSink for LogStats {
    fn record_state(&self, name: &str, state: State) {
        logging::trace!("[CircuitBreaker] circuit {} is {}", name, state);
    }

    fn record_success(&self, name: &str, prev_state: State) {
        logging::trace!(
            "[CircuitBreaker] circuit {} call succeeded while {}",
            name,
            prev_state
        );
    }

    fn record_failure(&self, name: &str, prev_state: State) {
        logging::trace!(
            "[CircuitBreaker] circuit {} call failed or rejected while {}",
            name,
            prev_state
        );
    }
}
