#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]

//! # circuitguard
//!
//! A call-guarding circuit breaker. Wrap calls to an unreliable dependency
//! (a remote service, flaky I/O) with a [`CircuitBreaker`] and it will track
//! consecutive failures, fail fast once a threshold is exceeded, and let a
//! trial call through again after a cool-down window.
//!
//! ```text
//!                            recovery window elapsed (derived on read)
//!
//!     +----------------+                 +----------------+                 +----------------+
//!     |                |  trial succeed  |                |<----------------|                |
//!     |     Closed     |<----------------|    HalfOpen    |                 |      Open      |
//!     |                |                 |                |   trial failed  |                |
//!     |                |                 |                +---------------->|                |
//!     +----------------+                 +----------------+                 +----------------+
//!             |                                                                     ^
//!             |                 threshold consecutive failures                      |
//!             +---------------------------------------------------------------------+
//! ```
//!
//! `HalfOpen` is never stored. It is recomputed on every state read from the
//! stored state, the moment the circuit opened and the recovery timeout, so
//! several concurrent callers may all observe `HalfOpen` and attempt a trial
//! call at once.
//!
//! Generally, there are three steps when using circuitguard:
//! 1. Build a breaker with [`CircuitBreakerBuilder`] (threshold, recovery
//!    timeout, guarded failure kind).
//! 2. Run operations through [`CircuitBreaker::call`], or wrap an operation
//!    once with [`GuardedCall`].
//! 3. Register breakers with a [`CircuitBreakerRegistry`] so monitoring and
//!    health-check code can enumerate them.
//!
//! ```rust
//! use circuitguard::{CircuitBreakerBuilder, CircuitBreakerError, Result};
//! use std::time::Duration;
//!
//! fn fetch_quote() -> Result<String> {
//!     // a call that may fail
//!     Ok("42".into())
//! }
//!
//! let breaker = CircuitBreakerBuilder::new("quotes".into())
//!     .with_failure_threshold(3)
//!     .with_recovery_timeout(Duration::from_secs(5))
//!     .build()
//!     .unwrap();
//!
//! match breaker.call(fetch_quote) {
//!     Ok(quote) => println!("{}", quote),
//!     Err(err) if err.is::<CircuitBreakerError>() => {
//!         // the circuit is open, the dependency was never called
//!     }
//!     Err(err) => {
//!         // the dependency itself failed; the failure was counted
//!         // if it matched the breaker's guarded kind
//!     }
//! }
//! ```
//!
//! Optional features:
//! - `exporter`: export breaker statistics to Prometheus via
//!   [`exporter::PrometheusStats`].
//! - `logger_env`: use `env_logger` to initialize logging.
//! - `logger_log4rs`: use `log4rs` to initialize logging.

#[macro_use]
#[doc(hidden)]
pub mod macros;

/// Topmost construction APIs: the breaker builder and the call wrapper.
pub mod api;
/// Core implementations: the breaker state machine, its configuration,
/// the rejection error, stats sinks and the breaker registry.
pub mod core;
/// Adapters for different logging crates.
pub mod logging;
cfg_exporter! {
    /// Prometheus-backed [`StatsSink`](core::StatsSink) implementation.
    pub mod exporter;
}
// Utility functions for time handling.
pub mod utils;

// re-export precludes
pub use crate::core::*;
pub use api::*;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
