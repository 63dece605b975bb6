//! Per-identity play reservations
//!
//! At most one play per identity is in flight. A new request waits a
//! bounded time for the previous one to finish, then is rejected.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Identities with a play in flight
#[derive(Debug, Default)]
pub struct PlayRegistry {
    active: Mutex<HashSet<String>>,
    released: Condvar,
}

impl PlayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `digest`, waiting up to `wait` for a current play to end.
    /// `None` if the identity is still busy when the wait runs out.
    /// A wait too long to place on the clock has no deadline.
    pub fn reserve(&self, digest: &str, wait: Duration) -> Option<PlayGuard<'_>> {
        let mut active = self.active.lock();
        match Instant::now().checked_add(wait) {
            Some(deadline) => {
                while active.contains(digest) {
                    if self.released.wait_until(&mut active, deadline).timed_out() {
                        if active.contains(digest) {
                            return None;
                        }
                        break;
                    }
                }
            }
            None => {
                while active.contains(digest) {
                    self.released.wait(&mut active);
                }
            }
        }
        active.insert(digest.to_string());
        Some(PlayGuard {
            registry: self,
            digest: digest.to_string(),
        })
    }

    pub fn is_playing(&self, digest: &str) -> bool {
        self.active.lock().contains(digest)
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    fn release(&self, digest: &str) {
        self.active.lock().remove(digest);
        self.released.notify_all();
    }
}

/// Held for the duration of a play; releases the identity when dropped
#[derive(Debug)]
pub struct PlayGuard<'a> {
    registry: &'a PlayRegistry,
    digest: String,
}

impl PlayGuard<'_> {
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl Drop for PlayGuard<'_> {
    fn drop(&mut self) {
        self.registry.release(&self.digest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_second_reservation_rejected() {
        let registry = PlayRegistry::new();
        let guard = registry.reserve("alice", Duration::ZERO).unwrap();
        assert!(registry.is_playing("alice"));
        assert!(registry.reserve("alice", Duration::from_millis(20)).is_none());
        assert!(registry.reserve("bob", Duration::ZERO).is_some());

        drop(guard);
        assert!(!registry.is_playing("alice"));
        assert!(registry.reserve("alice", Duration::ZERO).is_some());
    }

    #[test]
    fn test_waiter_gets_released_identity() {
        let registry = PlayRegistry::new();
        let guard = registry.reserve("alice", Duration::ZERO).unwrap();

        thread::scope(|s| {
            let waiter = s.spawn(|| registry.reserve("alice", Duration::from_secs(5)).is_some());
            thread::sleep(Duration::from_millis(50));
            drop(guard);
            assert!(waiter.join().unwrap());
        });
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn test_unbounded_wait() {
        let registry = PlayRegistry::new();
        let guard = registry.reserve("alice", Duration::MAX).unwrap();

        thread::scope(|s| {
            let waiter = s.spawn(|| registry.reserve("alice", Duration::MAX).is_some());
            thread::sleep(Duration::from_millis(50));
            assert!(registry.is_playing("alice"));
            drop(guard);
            assert!(waiter.join().unwrap());
        });
        assert_eq!(registry.active_count(), 0);
    }
}
