//! Sliding-window rate limiting
//!
//! Each user owns a [`RateWindow`] of request stamps. A request that passes
//! the check reserves a pending stamp, so concurrent requests of the same
//! user cannot both slip under the quota. The stamp becomes a committed
//! timestamp only when the relay succeeds; a failed or cancelled relay
//! drops its [`Permit`] and the reservation disappears with it.

use crate::store::AccessStore;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StampState {
    Pending,
    Committed,
}

#[derive(Debug, Clone, Copy)]
struct Stamp {
    ticket: u64,
    at: Instant,
    state: StampState,
}

/// Request stamps of one user, oldest first
#[derive(Debug, Clone, Default)]
pub struct RateWindow {
    stamps: Vec<Stamp>,
}

impl RateWindow {
    /// Number of stamps (pending and committed)
    #[must_use]
    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    /// Whether the window holds no stamps
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    /// Whether a relay holding a reservation is still in flight
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.stamps.iter().any(|s| s.state == StampState::Pending)
    }

    /// Timestamps of successful relays still held by the window
    #[must_use]
    pub fn committed(&self) -> Vec<Instant> {
        self.stamps
            .iter()
            .filter(|s| s.state == StampState::Committed)
            .map(|s| s.at)
            .collect()
    }

    /// Drop committed stamps that are `window` or more in the past.
    /// Pending reservations are never pruned.
    fn prune(&mut self, now: Instant, window: Duration) {
        self.stamps.retain(|s| {
            s.state == StampState::Pending || now.saturating_duration_since(s.at) < window
        });
    }

    fn oldest(&self) -> Option<Instant> {
        self.stamps.iter().map(|s| s.at).min()
    }

    fn reserve(&mut self, ticket: u64, now: Instant) {
        self.stamps.push(Stamp {
            ticket,
            at: now,
            state: StampState::Pending,
        });
    }

    fn commit(&mut self, ticket: u64, at: Instant) {
        match self.stamps.iter_mut().find(|s| s.ticket == ticket) {
            Some(stamp) => {
                stamp.at = at;
                stamp.state = StampState::Committed;
            }
            None => self.stamps.push(Stamp {
                ticket,
                at,
                state: StampState::Committed,
            }),
        }
        self.stamps.sort_by_key(|s| s.at);
    }

    fn release(&mut self, ticket: u64) {
        self.stamps.retain(|s| s.ticket != ticket);
    }
}

/// Minutes to wait, rounded up, before the oldest stamp leaves the window.
///
/// # Examples
///
/// ```
/// use linksaver_core::rate_limit::wait_minutes;
/// use std::time::Duration;
///
/// let window = Duration::from_secs(300);
/// assert_eq!(wait_minutes(window, Duration::from_secs(0)), 5);
/// assert_eq!(wait_minutes(window, Duration::from_secs(241)), 1);
/// ```
#[must_use]
pub fn wait_minutes(window: Duration, elapsed: Duration) -> u64 {
    let remaining = window.saturating_sub(elapsed).as_millis();
    u64::try_from(remaining.div_ceil(60_000)).unwrap_or(u64::MAX)
}

/// Denial returned when the user's quota is exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    /// Whole minutes until a slot frees up
    pub wait_minutes: u64,
}

struct Reservation {
    store: Arc<dyn AccessStore>,
    user_id: i64,
    ticket: u64,
}

/// Admission to perform one relay.
///
/// Committing records the relay's timestamp; dropping an uncommitted permit
/// gives the slot back.
pub struct Permit {
    reservation: Option<Reservation>,
}

impl Permit {
    const fn exempt() -> Self {
        Self { reservation: None }
    }

    /// Whether this permit was issued to the quota-exempt admin
    #[must_use]
    pub const fn is_exempt(&self) -> bool {
        self.reservation.is_none()
    }

    /// Record a successful relay completed at `at`
    pub fn commit(mut self, at: Instant) {
        if let Some(r) = self.reservation.take() {
            r.store
                .update_window(r.user_id, &mut |window| window.commit(r.ticket, at));
        }
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if let Some(r) = self.reservation.take() {
            debug!(user_id = r.user_id, "Releasing unused rate-limit reservation");
            r.store
                .update_window(r.user_id, &mut |window| window.release(r.ticket));
        }
    }
}

impl fmt::Debug for Permit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reservation {
            Some(r) => f
                .debug_struct("Permit")
                .field("user_id", &r.user_id)
                .field("ticket", &r.ticket)
                .finish(),
            None => f.write_str("Permit(exempt)"),
        }
    }
}

/// Per-user quota of `quota` relays per trailing `window`
pub struct RateLimiter {
    store: Arc<dyn AccessStore>,
    quota: usize,
    window: Duration,
    exempt_user: i64,
    next_ticket: AtomicU64,
}

impl RateLimiter {
    /// Create a limiter over `store`; `exempt_user` is never limited
    #[must_use]
    pub fn new(
        store: Arc<dyn AccessStore>,
        quota: usize,
        window: Duration,
        exempt_user: i64,
    ) -> Self {
        Self {
            store,
            quota,
            window,
            exempt_user,
            next_ticket: AtomicU64::new(1),
        }
    }

    /// Configured quota
    #[must_use]
    pub const fn quota(&self) -> usize {
        self.quota
    }

    /// Configured window
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Check the user's window at `now` and reserve a slot if one is free.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimited`] with the wait estimate when the quota is used up.
    pub fn admit(&self, user_id: i64, now: Instant) -> Result<Permit, RateLimited> {
        if user_id == self.exempt_user {
            return Ok(Permit::exempt());
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (quota, window) = (self.quota, self.window);
        let mut decision = Ok(());

        self.store.update_window(user_id, &mut |rate_window| {
            rate_window.prune(now, window);
            decision = if rate_window.len() < quota {
                rate_window.reserve(ticket, now);
                Ok(())
            } else {
                let elapsed = rate_window
                    .oldest()
                    .map_or(Duration::ZERO, |oldest| now.saturating_duration_since(oldest));
                // In-flight reservations older than the window would yield 0
                Err(RateLimited {
                    wait_minutes: wait_minutes(window, elapsed).max(1),
                })
            };
        });

        decision.map(|()| Permit {
            reservation: Some(Reservation {
                store: Arc::clone(&self.store),
                user_id,
                ticket,
            }),
        })
    }

    /// Stamps retained in the user's window at `now`, pending ones included
    #[must_use]
    pub fn recent_requests(&self, user_id: i64, now: Instant) -> usize {
        let window = self.window;
        let mut count = 0;
        self.store.update_window(user_id, &mut |rate_window| {
            rate_window.prune(now, window);
            count = rate_window.len();
        });
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    const ADMIN: i64 = 1;
    const USER: i64 = 42;
    const WINDOW: Duration = Duration::from_secs(300);

    fn limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(InMemoryStore::new(WINDOW, 100)), 3, WINDOW, ADMIN)
    }

    fn admit_and_commit(limiter: &RateLimiter, at: Instant) {
        match limiter.admit(USER, at) {
            Ok(permit) => permit.commit(at),
            Err(denied) => panic!("unexpected denial: {denied:?}"),
        }
    }

    #[test]
    fn test_wait_minutes_rounds_up() {
        assert_eq!(wait_minutes(WINDOW, Duration::ZERO), 5);
        assert_eq!(wait_minutes(WINDOW, Duration::from_millis(1)), 5);
        assert_eq!(wait_minutes(WINDOW, Duration::from_secs(60)), 4);
        assert_eq!(wait_minutes(WINDOW, Duration::from_millis(299_999)), 1);
        assert_eq!(wait_minutes(WINDOW, WINDOW), 0);
    }

    #[test]
    fn test_fourth_request_denied_with_wait() {
        let limiter = limiter();
        let t0 = Instant::now();
        for i in 0..3 {
            admit_and_commit(&limiter, t0 + Duration::from_secs(i * 10));
        }

        let denied = limiter
            .admit(USER, t0 + Duration::from_secs(70))
            .expect_err("fourth request must be denied");
        // oldest stamp is 70s old -> 230s remaining -> 4 minutes
        assert_eq!(denied.wait_minutes, 4);
    }

    #[test]
    fn test_slot_frees_after_window() {
        let limiter = limiter();
        let t0 = Instant::now();
        for _ in 0..3 {
            admit_and_commit(&limiter, t0);
        }
        assert!(limiter.admit(USER, t0 + WINDOW - Duration::from_millis(1)).is_err());
        assert!(limiter.admit(USER, t0 + WINDOW).is_ok());
    }

    #[test]
    fn test_dropped_permit_does_not_consume_quota() {
        let limiter = limiter();
        let t0 = Instant::now();
        for _ in 0..5 {
            let permit = limiter.admit(USER, t0).expect("slot available");
            drop(permit);
        }
        assert_eq!(limiter.recent_requests(USER, t0), 0);
    }

    #[test]
    fn test_pending_reservations_count_toward_quota() {
        let limiter = limiter();
        let t0 = Instant::now();
        let held: Vec<_> = (0..3)
            .map(|_| limiter.admit(USER, t0).expect("slot available"))
            .collect();

        assert!(limiter.admit(USER, t0).is_err());
        drop(held);
        assert!(limiter.admit(USER, t0).is_ok());
    }

    #[test]
    fn test_pending_reservation_survives_window() {
        let limiter = limiter();
        let t0 = Instant::now();
        let permit = limiter.admit(USER, t0).expect("slot available");
        assert_eq!(limiter.recent_requests(USER, t0 + WINDOW * 2), 1);
        permit.commit(t0 + WINDOW * 2);
        assert_eq!(limiter.recent_requests(USER, t0 + WINDOW * 2), 1);
    }

    #[test]
    fn test_admin_is_exempt() {
        let limiter = limiter();
        let t0 = Instant::now();
        for _ in 0..10 {
            let permit = limiter.admit(ADMIN, t0).expect("admin never limited");
            assert!(permit.is_exempt());
            permit.commit(t0);
        }
        assert_eq!(limiter.recent_requests(ADMIN, t0), 0);
    }

    #[test]
    fn test_denial_behind_stale_reservations_waits_at_least_a_minute() {
        let window = Duration::from_secs(3);
        let store = Arc::new(InMemoryStore::new(window, 100));
        let limiter = RateLimiter::new(store, 3, window, ADMIN);
        let t0 = Instant::now();
        let _held: Vec<_> = (0..3)
            .map(|_| limiter.admit(USER, t0).expect("slot available"))
            .collect();

        let denied = limiter
            .admit(USER, t0 + Duration::from_secs(5))
            .expect_err("in-flight reservations fill the quota");
        assert_eq!(denied.wait_minutes, 1);
    }
}
