//! Per-user access state
//!
//! Holds the verification flag and the rate window of every user seen by the
//! bot. Verification flags live for the lifetime of the process. Rate windows
//! sit in a bounded `moka` cache and expire once a full window has passed
//! since their last update with no reservation in flight.

use crate::rate_limit::RateWindow;
use moka::ops::compute::Op;
use moka::sync::Cache;
use moka::Expiry;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Verification state of a single user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserState {
    /// Telegram user id
    pub user_id: i64,
    /// Whether the user passed membership verification
    pub verified: bool,
}

/// Aggregate counters for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Users marked as verified
    pub verified_users: usize,
    /// Users with a live rate window
    pub tracked_windows: u64,
}

/// Storage for verification flags and rate windows.
///
/// Every method is atomic with respect to the key it touches, so handlers
/// that interleave between network calls never observe a half-applied update.
pub trait AccessStore: Send + Sync {
    /// Whether `user_id` has been verified
    fn is_verified(&self, user_id: i64) -> bool;
    /// Mark `user_id` verified; returns `true` if the flag changed
    fn mark_verified(&self, user_id: i64) -> bool;
    /// Run `update` on the user's rate window, creating it if missing.
    /// A window left empty is dropped.
    fn update_window(&self, user_id: i64, update: &mut dyn FnMut(&mut RateWindow));
    /// Current counters
    fn stats(&self) -> StoreStats;
}

/// Expires a rate window `window` after its last write, unless a
/// reservation is still pending in it.
struct WindowExpiry {
    window: Duration,
}

impl WindowExpiry {
    fn ttl(&self, rate_window: &RateWindow) -> Option<Duration> {
        if rate_window.has_pending() {
            None
        } else {
            Some(self.window)
        }
    }
}

impl Expiry<i64, RateWindow> for WindowExpiry {
    fn expire_after_create(
        &self,
        _user_id: &i64,
        rate_window: &RateWindow,
        _created_at: Instant,
    ) -> Option<Duration> {
        self.ttl(rate_window)
    }

    fn expire_after_update(
        &self,
        _user_id: &i64,
        rate_window: &RateWindow,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        self.ttl(rate_window)
    }
}

/// Process-local [`AccessStore`]
pub struct InMemoryStore {
    users: Mutex<HashMap<i64, UserState>>,
    windows: Cache<i64, RateWindow>,
}

impl InMemoryStore {
    /// Create an empty store.
    ///
    /// Idle rate windows expire after `window`; at most `max_windows` are
    /// tracked at once.
    ///
    /// # Examples
    ///
    /// ```
    /// use linksaver_core::{AccessStore, InMemoryStore};
    /// use std::time::Duration;
    ///
    /// let store = InMemoryStore::new(Duration::from_secs(300), 10_000);
    /// assert!(!store.is_verified(42));
    /// ```
    #[must_use]
    pub fn new(window: Duration, max_windows: u64) -> Self {
        let windows = Cache::builder()
            .max_capacity(max_windows)
            .expire_after(WindowExpiry { window })
            .build();

        Self {
            users: Mutex::new(HashMap::new()),
            windows,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AccessStore for InMemoryStore {
    fn is_verified(&self, user_id: i64) -> bool {
        lock(&self.users)
            .get(&user_id)
            .is_some_and(|state| state.verified)
    }

    fn mark_verified(&self, user_id: i64) -> bool {
        let mut users = lock(&self.users);
        let state = users.entry(user_id).or_insert(UserState {
            user_id,
            verified: false,
        });
        let changed = !state.verified;
        state.verified = true;
        changed
    }

    fn update_window(&self, user_id: i64, update: &mut dyn FnMut(&mut RateWindow)) {
        self.windows.entry(user_id).and_compute_with(|current| {
            let mut rate_window = current.map(|entry| entry.into_value()).unwrap_or_default();
            update(&mut rate_window);
            if rate_window.is_empty() {
                Op::Remove
            } else {
                Op::Put(rate_window)
            }
        });
    }

    fn stats(&self) -> StoreStats {
        self.windows.run_pending_tasks();
        StoreStats {
            verified_users: lock(&self.users).values().filter(|s| s.verified).count(),
            tracked_windows: self.windows.entry_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::RateLimiter;
    use std::sync::Arc;

    const WINDOW: Duration = Duration::from_secs(300);

    fn store() -> InMemoryStore {
        InMemoryStore::new(WINDOW, 100)
    }

    #[test]
    fn test_unknown_user_is_not_verified() {
        let store = store();
        assert!(!store.is_verified(42));
    }

    #[test]
    fn test_mark_verified_is_idempotent() {
        let store = store();
        assert!(store.mark_verified(42));
        assert!(!store.mark_verified(42));
        assert!(store.is_verified(42));
        assert!(!store.is_verified(43));
        assert_eq!(store.stats().verified_users, 1);
    }

    #[test]
    fn test_empty_windows_are_not_tracked() {
        let store = store();
        store.update_window(1, &mut |_| {});
        store.update_window(2, &mut |_| {});
        assert_eq!(store.stats().tracked_windows, 0);
    }

    fn snapshot(store: &InMemoryStore, user_id: i64) -> RateWindow {
        let mut copy = RateWindow::default();
        store.update_window(user_id, &mut |w| copy = w.clone());
        copy
    }

    #[test]
    fn test_pending_windows_never_expire() {
        let expiry = WindowExpiry { window: WINDOW };
        let store = Arc::new(store());
        let limiter = RateLimiter::new(store.clone(), 3, WINDOW, 1);
        let now = Instant::now();

        let permit = limiter.admit(7, now).expect("slot available");
        let pending = snapshot(&store, 7);
        assert!(pending.has_pending());
        assert_eq!(expiry.ttl(&pending), None);

        permit.commit(now);
        let committed = snapshot(&store, 7);
        assert!(!committed.has_pending());
        assert_eq!(expiry.ttl(&committed), Some(WINDOW));
        assert_eq!(store.stats().tracked_windows, 1);
    }

    #[test]
    fn test_idle_windows_are_evicted() {
        let window = Duration::from_millis(50);
        let store = Arc::new(InMemoryStore::new(window, 100));
        let limiter = RateLimiter::new(store.clone(), 3, window, 1);
        let now = Instant::now();

        limiter.admit(7, now).expect("slot available").commit(now);
        assert_eq!(store.stats().tracked_windows, 1);

        std::thread::sleep(window * 3);
        assert_eq!(store.stats().tracked_windows, 0);
    }
}
