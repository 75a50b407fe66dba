use crate::core::{
    BreakerConfig, CircuitBreaker, CircuitBreakerRegistry, Clock, GuardPredicate, LogStats,
    StatsSink, SystemClock,
};
use crate::{utils, Error, Result};
use std::time::Duration;

// CircuitBreakerBuilder is the basic construction API of circuitguard.
pub struct CircuitBreakerBuilder {
    config: BreakerConfig,
    guard: Box<GuardPredicate>,
    clock: Box<dyn Clock>,
    stats: Box<dyn StatsSink>,
}

impl Default for CircuitBreakerBuilder {
    fn default() -> Self {
        CircuitBreakerBuilder {
            config: BreakerConfig::default(),
            // by default every failure is a guarded failure
            guard: Box::new(|_| true),
            clock: Box::new(SystemClock),
            stats: Box::new(LogStats),
        }
    }
}

impl CircuitBreakerBuilder {
    pub fn new(name: String) -> Self {
        CircuitBreakerBuilder {
            config: BreakerConfig {
                name,
                ..BreakerConfig::default()
            },
            ..CircuitBreakerBuilder::default()
        }
    }

    pub fn from_config(config: BreakerConfig) -> Self {
        CircuitBreakerBuilder {
            config,
            ..CircuitBreakerBuilder::default()
        }
    }

    /// `build()` validates the configuration and consumes the builder.
    pub fn build(self) -> Result<CircuitBreaker> {
        CircuitBreaker::with_parts(self.config, self.guard, self.clock, self.stats)
    }

    pub fn with_name(mut self, name: String) -> Self {
        self.config.name = name;
        self
    }

    pub fn with_failure_threshold(mut self, failure_threshold: u32) -> Self {
        self.config.failure_threshold = failure_threshold;
        self
    }

    pub fn with_recovery_timeout(mut self, recovery_timeout: Duration) -> Self {
        self.config.recovery_timeout_ms = recovery_timeout.as_millis() as u64;
        self
    }

    /// `with_guard` narrows which failures count toward the breaker's failure
    /// budget; errors the predicate rejects pass through without touching
    /// breaker state. Match on a concrete error type with `err.is::<E>()`.
    pub fn with_guard<G>(mut self, guard: G) -> Self
    where
        G: Send + Sync + Fn(&Error) -> bool + 'static,
    {
        self.guard = Box::new(guard);
        self
    }

    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_stats<S: StatsSink + 'static>(mut self, stats: S) -> Self {
        self.stats = Box::new(stats);
        self
    }

    pub(crate) fn name_is_blank(&self) -> bool {
        utils::is_blank(&self.config.name)
    }
}

/// `GuardedCall` binds one operation to a breaker, so call sites invoke the
/// wrapper exactly like the bare operation and get the breaker's rules
/// applied in front of it.
pub struct GuardedCall<F> {
    breaker: CircuitBreaker,
    operation: F,
}

impl<F> GuardedCall<F> {
    /// Wraps `operation` with the breaker described by `builder` and
    /// registers that breaker with `registry`.
    ///
    /// When the builder carries no name, the breaker is named after the
    /// operation's type identifier, so each wrapped function lands in the
    /// registry under a unique key without further ceremony.
    pub fn wrap(
        builder: CircuitBreakerBuilder,
        registry: &CircuitBreakerRegistry,
        operation: F,
    ) -> Result<Self> {
        let builder = if builder.name_is_blank() {
            let name = std::any::type_name::<F>().to_owned();
            builder.with_name(name)
        } else {
            builder
        };
        let breaker = builder.build()?;
        registry.register(breaker.clone());
        Ok(GuardedCall { breaker, operation })
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Invokes the wrapped operation under the breaker's rules. Operations
    /// taking several arguments receive them as one tuple.
    pub fn invoke<A, T>(&self, args: A) -> Result<T>
    where
        F: Fn(A) -> Result<T>,
    {
        let operation = &self.operation;
        self.breaker.call(|| operation(args))
    }
}
