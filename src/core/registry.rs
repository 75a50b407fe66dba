use super::CircuitBreaker;
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

/// `CircuitBreakerRegistry` is the process-wide monitor over every breaker
/// handed to it, keyed by breaker name.
///
/// It is an explicit, injectable service: components that need cross-cutting
/// visibility receive a handle (typically an `Arc<CircuitBreakerRegistry>`)
/// instead of reaching into hidden global state. Entries are upserted at
/// registration time and never removed, so reads vastly outnumber writes.
#[derive(Default)]
pub struct CircuitBreakerRegistry {
    breakers: RwLock<HashMap<String, CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts `breaker` under its name; the last registration for a given
    /// name wins.
    pub fn register(&self, breaker: CircuitBreaker) {
        self.breakers
            .write()
            .unwrap()
            .insert(breaker.name().to_owned(), breaker);
    }

    pub fn get(&self, name: &str) -> Option<CircuitBreaker> {
        self.breakers.read().unwrap().get(name).cloned()
    }

    /// Iterates over every registered breaker, order unspecified.
    ///
    /// Handles are snapshotted under the read lock up front; breaker state is
    /// read lazily as the iterator advances, so long enumerations observe
    /// transitions that happen mid-walk.
    pub fn all_breakers(&self) -> impl Iterator<Item = CircuitBreaker> {
        let handles: Vec<CircuitBreaker> =
            self.breakers.read().unwrap().values().cloned().collect();
        handles.into_iter()
    }

    /// Breakers whose derived state is open at the moment the iterator
    /// reaches them.
    pub fn open_breakers(&self) -> impl Iterator<Item = CircuitBreaker> {
        self.all_breakers().filter(|b| b.opened())
    }

    /// Breakers whose derived state is closed at the moment the iterator
    /// reaches them.
    pub fn closed_breakers(&self) -> impl Iterator<Item = CircuitBreaker> {
        self.all_breakers().filter(|b| b.closed())
    }

    /// True iff no registered breaker currently reports itself open.
    pub fn all_closed(&self) -> bool {
        self.open_breakers().next().is_none()
    }
}

impl fmt::Debug for CircuitBreakerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let breakers = self.breakers.read().unwrap();
        f.debug_set().entries(breakers.keys()).finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::breaker::test::Flaky;
    use crate::core::breaker::ManualClock;
    use crate::core::{BreakerConfig, NopStats, State};
    use crate::Error;

    fn breaker(name: &str, clock: ManualClock) -> CircuitBreaker {
        CircuitBreaker::with_parts(
            BreakerConfig {
                name: name.into(),
                failure_threshold: 1,
                recovery_timeout_ms: 5000,
            },
            Box::new(|err| err.is::<Flaky>()),
            Box::new(clock),
            Box::new(NopStats),
        )
        .unwrap()
    }

    fn trip(breaker: &CircuitBreaker) {
        breaker
            .call::<(), _>(|| Err(Error::new(Flaky)))
            .unwrap_err();
        assert_eq!(breaker.state(), State::Open);
    }

    #[test]
    fn register_and_get() {
        let registry = CircuitBreakerRegistry::new();
        let clock = ManualClock::default();
        registry.register(breaker("abc", clock));
        assert_eq!(registry.get("abc").unwrap().name(), "abc");
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn last_registration_wins() {
        let registry = CircuitBreakerRegistry::new();
        let clock = ManualClock::default();
        let first = breaker("abc", clock.clone());
        trip(&first);
        registry.register(first);
        registry.register(breaker("abc", clock));
        // the replacement is a fresh breaker, still closed
        assert!(registry.get("abc").unwrap().closed());
        assert_eq!(registry.all_breakers().count(), 1);
    }

    #[test]
    fn filters_by_state_at_enumeration_time() {
        let registry = CircuitBreakerRegistry::new();
        let clock = ManualClock::default();
        let healthy = breaker("healthy", clock.clone());
        let broken = breaker("broken", clock.clone());
        trip(&broken);
        registry.register(healthy);
        registry.register(broken);

        let open: Vec<String> = registry
            .open_breakers()
            .map(|b| b.name().to_owned())
            .collect();
        assert_eq!(open, vec!["broken".to_owned()]);
        let closed: Vec<String> = registry
            .closed_breakers()
            .map(|b| b.name().to_owned())
            .collect();
        assert_eq!(closed, vec!["healthy".to_owned()]);
        assert!(!registry.all_closed());

        // each breaker reports exactly one of opened/closed per read
        for b in registry.all_breakers() {
            assert_ne!(b.opened(), b.closed());
        }

        // half-open counts as neither open nor closed
        clock.advance(5000);
        assert!(registry.all_closed());
        assert_eq!(registry.closed_breakers().count(), 1);
    }

    #[test]
    fn all_closed_when_empty() {
        let registry = CircuitBreakerRegistry::new();
        assert!(registry.all_closed());
    }
}
