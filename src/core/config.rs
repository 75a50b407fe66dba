use crate::{utils, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The minimum number of consecutive guarded failures before opening the circuit.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
/// The number of milliseconds to elapse before an open circuit permits a trial call.
pub const DEFAULT_RECOVERY_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// `BreakerConfig` encompasses the tunable fields of a circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// `name` uniquely identifies the breaker, it is the key in `CircuitBreakerRegistry`.
    /// Leave it empty only when wrapping an operation via `GuardedCall`,
    /// which fills it with the operation's identifier.
    pub name: String,
    /// `failure_threshold` represents the number of consecutive guarded failures
    /// required to open the circuit.
    pub failure_threshold: u32,
    /// `recovery_timeout_ms` represents recovery timeout (in milliseconds) after the circuit opens.
    /// During the open period, no calls are permitted until the timeout has elapsed.
    /// After that, the circuit breaker derives the half-open state and lets trial calls through.
    pub recovery_timeout_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        BreakerConfig {
            name: String::default(),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout_ms: DEFAULT_RECOVERY_TIMEOUT_MS,
        }
    }
}

impl BreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }

    pub fn is_valid(&self) -> Result<()> {
        if utils::is_blank(&self.name) {
            return Err(Error::msg("empty breaker name"));
        }
        if self.failure_threshold == 0 {
            return Err(Error::msg("invalid failure_threshold"));
        }
        if self.recovery_timeout_ms == 0 {
            return Err(Error::msg("invalid recovery_timeout_ms"));
        }
        Ok(())
    }
}

impl fmt::Display for BreakerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmtted = serde_json::to_string_pretty(self).unwrap();
        write!(f, "{}", fmtted)
    }
}
