//! mod `api` provides the topmost fundamental APIs for users of circuitguard.
//!
//! [`CircuitBreakerBuilder`] constructs a configured breaker;
//! [`GuardedCall`] wraps one operation with a breaker once, the call-site
//! analog of decorating a function.

mod api;

pub use api::*;
