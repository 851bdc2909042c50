use std::sync::Arc;

use dashmap::DashSet;

use crate::error::{DeliveryError, DeliveryResult};
use crate::models::Principal;

/// Tracks principals with a request in flight.
///
/// Clones share the same set, so one guard is built at startup and handed to
/// every component that needs admission control.
#[derive(Clone, Debug, Default)]
pub struct RequestGuard {
    in_flight: Arc<DashSet<Principal>>,
}

impl RequestGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true only if `principal` was not already in flight.
    pub fn try_acquire(&self, principal: Principal) -> bool {
        self.in_flight.insert(principal)
    }

    pub fn release(&self, principal: Principal) {
        self.in_flight.remove(&principal);
    }

    /// Scoped acquisition: the slot is released when the permit is dropped.
    pub fn acquire(&self, principal: Principal) -> DeliveryResult<InFlightPermit> {
        if self.try_acquire(principal) {
            Ok(InFlightPermit {
                guard: self.clone(),
                principal,
            })
        } else {
            Err(DeliveryError::AlreadyInFlight(principal))
        }
    }

    pub fn is_in_flight(&self, principal: Principal) -> bool {
        self.in_flight.contains(&principal)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

#[derive(Debug)]
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct InFlightPermit {
    guard: RequestGuard,
    principal: Principal,
}

impl InFlightPermit {
    pub fn principal(&self) -> Principal {
        self.principal
    }
}

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        self.guard.release(self.principal);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_rejected_until_release() {
        let guard = RequestGuard::new();
        let user = Principal(7);

        assert!(guard.try_acquire(user));
        assert!(!guard.try_acquire(user));
        guard.release(user);
        assert!(guard.try_acquire(user));
    }

    #[test]
    fn release_is_idempotent() {
        let guard = RequestGuard::new();
        guard.release(Principal(1));
        guard.release(Principal(1));
        assert_eq!(guard.in_flight_count(), 0);
    }

    #[test]
    fn principals_are_independent() {
        let guard = RequestGuard::new();
        assert!(guard.try_acquire(Principal(1)));
        assert!(guard.try_acquire(Principal(2)));
        assert_eq!(guard.in_flight_count(), 2);
    }

    #[test]
    fn permit_releases_on_drop() {
        let guard = RequestGuard::new();
        let user = Principal(42);
        {
            let permit = guard.acquire(user).expect("first acquire");
            assert_eq!(permit.principal(), user);
            assert_eq!(
                guard.acquire(user).unwrap_err(),
                DeliveryError::AlreadyInFlight(user)
            );
        }
        assert!(!guard.is_in_flight(user));
    }

    #[test]
    fn permit_releases_when_thread_panics() {
        let guard = RequestGuard::new();
        let user = Principal(9);
        let shared = guard.clone();

        let joined = std::thread::spawn(move || {
            let _permit = shared.acquire(user).expect("acquire");
            panic!("boom");
        })
        .join();

        assert!(joined.is_err());
        assert!(!guard.is_in_flight(user));
    }

    #[test]
    fn concurrent_acquires_admit_exactly_one() {
        let guard = RequestGuard::new();
        let user = Principal(5);
        let barrier = Arc::new(std::sync::Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let guard = guard.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    guard.try_acquire(user)
                })
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|handle| handle.join().expect("thread"))
            .filter(|won| *won)
            .count();
        assert_eq!(admitted, 1);
    }
}
