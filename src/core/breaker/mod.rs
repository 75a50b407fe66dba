//! The circuit breaker state machine.
//!
//! `Closed` and `Open` are the only stored states. `HalfOpen` is derived on
//! every read: an open circuit whose recovery window has elapsed reports
//! itself as half-open and lets trial calls through. Because derivation is a
//! pure read, several concurrent callers may observe `HalfOpen` at once and
//! all be admitted as trial calls; there is no single-flight limiting.

use super::{BreakerConfig, CircuitBreakerError, LogStats, StatsSink};
use crate::{logging, utils, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};

/// States of the circuit breaker state machine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    Closed,
    Open,
    HalfOpen,
}

impl Default for State {
    fn default() -> State {
        State::Closed
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Closed => write!(f, "closed"),
            State::Open => write!(f, "open"),
            State::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// `Clock` is the time source the breaker consults for state derivation and
/// for stamping the moment the circuit opens. It is injectable so that tests
/// can drive the recovery window deterministically.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// `SystemClock` reads the wall clock.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        utils::curr_time_millis()
    }
}

/// The failure predicate deciding which errors count toward the breaker's
/// failure budget ("guarded" failures). Errors it rejects propagate to the
/// caller without touching breaker state.
pub type GuardPredicate = dyn Send + Sync + Fn(&Error) -> bool;

// The three mutable fields share one mutex, so each transition is a single
// read-modify-write critical section. Only `Closed` and `Open` are ever
// written to `state`.
#[derive(Debug)]
struct SharedFields {
    failure_count: u32,
    state: State,
    opened_at_ms: u64,
}

struct Inner {
    config: BreakerConfig,
    guard: Box<GuardPredicate>,
    clock: Box<dyn Clock>,
    stats: Box<dyn StatsSink>,
    shared: Mutex<SharedFields>,
}

/// `CircuitBreaker` guards calls to one unreliable operation.
///
/// Handles are cheap clones: every clone (registry entry, rejection error,
/// `GuardedCall` wrapper) shares the same counters and stored state, so all
/// concurrent callers of the same logical breaker observe one state machine.
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<Inner>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.inner.config)
            .field("shared", &*self.inner.shared.lock().unwrap())
            .finish()
    }
}

impl fmt::Display for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl CircuitBreaker {
    /// Creates a breaker with the default guard (every error counts), the
    /// system clock and the logging stats sink. Use `CircuitBreakerBuilder`
    /// to customize those parts.
    pub fn new(config: BreakerConfig) -> Result<Self> {
        Self::with_parts(
            config,
            Box::new(|_| true),
            Box::new(SystemClock),
            Box::new(LogStats),
        )
    }

    pub(crate) fn with_parts(
        config: BreakerConfig,
        guard: Box<GuardPredicate>,
        clock: Box<dyn Clock>,
        stats: Box<dyn StatsSink>,
    ) -> Result<Self> {
        config.is_valid()?;
        let opened_at_ms = clock.now_millis();
        Ok(CircuitBreaker {
            inner: Arc::new(Inner {
                config,
                guard,
                clock,
                stats,
                shared: Mutex::new(SharedFields {
                    failure_count: 0,
                    state: State::Closed,
                    opened_at_ms,
                }),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn failure_threshold(&self) -> u32 {
        self.inner.config.failure_threshold
    }

    pub fn recovery_timeout_ms(&self) -> u64 {
        self.inner.config.recovery_timeout_ms
    }

    /// `state` returns the current derived state of the breaker.
    ///
    /// `HalfOpen` is never stored; it is recomputed here on every read from
    /// the stored state and the recovery window.
    pub fn state(&self) -> State {
        let (state, opened_at_ms) = {
            let shared = self.inner.shared.lock().unwrap();
            (shared.state, shared.opened_at_ms)
        };
        if state == State::Open
            && self.now_millis() >= opened_at_ms + self.recovery_timeout_ms()
        {
            State::HalfOpen
        } else {
            state
        }
    }

    /// Consecutive guarded failures observed so far. Reset to zero exactly
    /// when the breaker transitions to closed.
    pub fn failure_count(&self) -> u32 {
        self.inner.shared.lock().unwrap().failure_count
    }

    /// The epoch millisecond at which the breaker becomes eligible for a
    /// trial call. Meaningful only while the circuit is open; always holds
    /// the value derived from the last open stamp.
    pub fn open_until_ms(&self) -> u64 {
        self.inner.shared.lock().unwrap().opened_at_ms + self.recovery_timeout_ms()
    }

    /// Milliseconds remaining until the recovery window elapses. Negative
    /// once the half-open view is reachable.
    pub fn open_remaining_ms(&self) -> i64 {
        self.open_until_ms() as i64 - self.now_millis() as i64
    }

    pub fn closed(&self) -> bool {
        self.state() == State::Closed
    }

    pub fn opened(&self) -> bool {
        self.state() == State::Open
    }

    /// `call` runs `operation` under the breaker's rules.
    ///
    /// - While the derived state is `Open`, the operation is never invoked
    ///   and the call fails with [`CircuitBreakerError`].
    /// - A guarded failure is counted, may open the circuit, and is returned
    ///   to the caller unchanged; the breaker never swallows it.
    /// - An unguarded failure passes through without touching breaker state.
    /// - A success closes the circuit and resets the failure count.
    ///
    /// The operation runs outside the breaker's lock and no call timeout is
    /// imposed on it; a hanging dependency is not detected as a failure.
    pub fn call<T, F>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let result = self.dispatch(operation);
        // always record the last known state of the breaker
        self.inner.stats.record_state(self.name(), self.state());
        result
    }

    fn dispatch<T, F>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        if self.state() == State::Open {
            self.inner
                .stats
                .record_failure(self.name(), self.stored_state());
            return Err(Error::new(CircuitBreakerError::new(self.clone())));
        }
        match operation() {
            Ok(value) => {
                self.on_call_succeeded();
                Ok(value)
            }
            Err(err) => {
                if (self.inner.guard)(&err) {
                    self.on_call_failed();
                }
                Err(err)
            }
        }
    }

    fn stored_state(&self) -> State {
        self.inner.shared.lock().unwrap().state
    }

    fn now_millis(&self) -> u64 {
        self.inner.clock.now_millis()
    }

    /// Close the circuit after a successful call and reset the failure count.
    fn on_call_succeeded(&self) {
        self.inner
            .stats
            .record_success(self.name(), self.stored_state());
        let recovered = {
            let mut shared = self.inner.shared.lock().unwrap();
            let recovered = shared.state == State::Open;
            shared.state = State::Closed;
            shared.failure_count = 0;
            recovered
        };
        if recovered {
            logging::info!(
                "[CircuitBreaker] circuit {} closed after successful trial call",
                self.name()
            );
        }
    }

    /// Count the failure and open the circuit once the threshold is reached.
    /// A failed trial call re-stamps the open moment, restarting the full
    /// recovery window.
    fn on_call_failed(&self) {
        self.inner
            .stats
            .record_failure(self.name(), self.stored_state());
        let tripped = {
            let mut shared = self.inner.shared.lock().unwrap();
            shared.failure_count += 1;
            if shared.failure_count >= self.failure_threshold() {
                shared.state = State::Open;
                shared.opened_at_ms = self.now_millis();
                Some(shared.failure_count)
            } else {
                None
            }
        };
        if let Some(failure_count) = tripped {
            logging::info!(
                "[CircuitBreaker] circuit {} open after {} consecutive failures, recovery in {} ms",
                self.name(),
                failure_count,
                self.recovery_timeout_ms()
            );
        }
    }
}

#[cfg(test)]
pub(crate) use test::ManualClock;

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::core::NopStats;
    use mockall::predicate::*;
    use mockall::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    /// A hand-driven clock shared between the test and the breaker under test.
    #[derive(Clone, Debug, Default)]
    pub(crate) struct ManualClock {
        now_ms: Arc<AtomicU64>,
    }

    impl ManualClock {
        pub(crate) fn advance(&self, ms: u64) {
            self.now_ms.fetch_add(ms, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_millis(&self) -> u64 {
            self.now_ms.load(Ordering::SeqCst)
        }
    }

    mock! {
        pub(crate) Stats {}
        impl StatsSink for Stats {
            fn record_state(&self, name: &str, state: State);
            fn record_success(&self, name: &str, prev_state: State);
            fn record_failure(&self, name: &str, prev_state: State);
        }
    }

    #[derive(Debug)]
    pub(crate) struct Flaky;

    impl fmt::Display for Flaky {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "flaky dependency failed")
        }
    }

    impl std::error::Error for Flaky {}

    fn guarded_breaker(
        threshold: u32,
        recovery_timeout_ms: u64,
        clock: ManualClock,
        stats: Box<dyn StatsSink>,
    ) -> CircuitBreaker {
        CircuitBreaker::with_parts(
            BreakerConfig {
                name: "abc".into(),
                failure_threshold: threshold,
                recovery_timeout_ms,
            },
            Box::new(|err| err.is::<Flaky>()),
            Box::new(clock),
            stats,
        )
        .unwrap()
    }

    fn fail_once(breaker: &CircuitBreaker) {
        let err = breaker
            .call::<(), _>(|| Err(Error::new(Flaky)))
            .unwrap_err();
        // the original failure is re-raised unchanged
        assert!(err.is::<Flaky>());
    }

    #[test]
    fn opens_after_threshold_failures() {
        let clock = ManualClock::default();
        let breaker = guarded_breaker(3, 5000, clock, Box::new(NopStats));
        fail_once(&breaker);
        fail_once(&breaker);
        assert_eq!(breaker.state(), State::Closed);
        assert_eq!(breaker.failure_count(), 2);
        fail_once(&breaker);
        assert_eq!(breaker.state(), State::Open);
        assert_eq!(breaker.failure_count(), 3);
    }

    #[test]
    fn opens_on_first_failure_when_threshold_is_one() {
        let clock = ManualClock::default();
        let breaker = guarded_breaker(1, 5000, clock, Box::new(NopStats));
        fail_once(&breaker);
        assert_eq!(breaker.state(), State::Open);
    }

    #[test]
    fn open_circuit_rejects_without_invoking_operation() {
        let clock = ManualClock::default();
        let breaker = guarded_breaker(1, 5000, clock.clone(), Box::new(NopStats));
        fail_once(&breaker);

        let invocations = AtomicUsize::new(0);
        clock.advance(4999);
        let err = breaker
            .call::<(), _>(|| {
                invocations.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap_err();
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
        let rejection = err.downcast_ref::<CircuitBreakerError>().unwrap();
        assert_eq!(rejection.breaker().name(), "abc");
    }

    #[test]
    fn half_open_after_recovery_window_permits_trial() {
        let clock = ManualClock::default();
        let breaker = guarded_breaker(1, 5000, clock.clone(), Box::new(NopStats));
        fail_once(&breaker);
        assert_eq!(breaker.state(), State::Open);

        clock.advance(5000);
        assert_eq!(breaker.state(), State::HalfOpen);
        assert!(breaker.open_remaining_ms() <= 0);

        let invocations = AtomicUsize::new(0);
        breaker
            .call(|| {
                invocations.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
        assert_eq!(breaker.state(), State::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[test]
    fn failed_trial_restamps_the_open_window() {
        let clock = ManualClock::default();
        let breaker = guarded_breaker(3, 5000, clock.clone(), Box::new(NopStats));
        fail_once(&breaker);
        fail_once(&breaker);
        fail_once(&breaker);
        assert_eq!(breaker.state(), State::Open);
        let first_window = breaker.open_until_ms();

        clock.advance(5000);
        assert_eq!(breaker.state(), State::HalfOpen);
        fail_once(&breaker);
        // immediately open again for a full new window, not half-open
        assert_eq!(breaker.state(), State::Open);
        assert_eq!(breaker.open_until_ms(), first_window + 5000);
        assert_eq!(breaker.open_remaining_ms(), 5000);

        clock.advance(5000);
        assert_eq!(breaker.state(), State::HalfOpen);
    }

    #[test]
    fn unguarded_failures_are_invisible() {
        let clock = ManualClock::default();
        let breaker = guarded_breaker(1, 5000, clock, Box::new(NopStats));
        let err = breaker
            .call::<(), _>(|| Err(Error::msg("not a flaky error")))
            .unwrap_err();
        assert!(!err.is::<Flaky>());
        assert_eq!(breaker.failure_count(), 0);
        assert_eq!(breaker.state(), State::Closed);
    }

    #[test]
    fn success_resets_the_failure_count() {
        let clock = ManualClock::default();
        let breaker = guarded_breaker(3, 5000, clock, Box::new(NopStats));
        fail_once(&breaker);
        fail_once(&breaker);
        breaker.call(|| Ok(())).unwrap();
        assert_eq!(breaker.failure_count(), 0);
        assert_eq!(breaker.state(), State::Closed);
    }

    #[test]
    fn stats_events_on_success() {
        let mut stats = MockStats::new();
        stats
            .expect_record_success()
            .with(eq("abc"), eq(State::Closed))
            .times(1)
            .return_const(());
        stats
            .expect_record_state()
            .with(eq("abc"), eq(State::Closed))
            .times(1)
            .return_const(());
        let clock = ManualClock::default();
        let breaker = guarded_breaker(1, 5000, clock, Box::new(stats));
        breaker.call(|| Ok(())).unwrap();
    }

    #[test]
    fn stats_events_on_rejection() {
        let mut stats = MockStats::new();
        // the trip itself
        stats
            .expect_record_failure()
            .with(eq("abc"), eq(State::Closed))
            .times(1)
            .return_const(());
        // the rejected call reports the stored state before rejecting
        stats
            .expect_record_failure()
            .with(eq("abc"), eq(State::Open))
            .times(1)
            .return_const(());
        stats
            .expect_record_state()
            .with(eq("abc"), eq(State::Open))
            .times(2)
            .return_const(());
        let clock = ManualClock::default();
        let breaker = guarded_breaker(1, 5000, clock, Box::new(stats));
        fail_once(&breaker);
        breaker.call::<(), _>(|| Ok(())).unwrap_err();
    }

    #[test]
    fn handles_share_one_state_machine() {
        let clock = ManualClock::default();
        let breaker = guarded_breaker(2, 5000, clock, Box::new(NopStats));
        let other = breaker.clone();
        fail_once(&breaker);
        fail_once(&other);
        assert_eq!(breaker.state(), State::Open);
        assert_eq!(other.failure_count(), 2);
    }
}
