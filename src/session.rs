//! Per-user conversation sessions.
//!
//! Sessions live only in process memory. Each user's session sits behind its own
//! async mutex: a handler holds the guard for its whole run, so events from the
//! same user are applied one after another while different users proceed in
//! parallel. Sessions idle for longer than the configured TTL are dropped by
//! [`SessionManager::evict_idle`] and treated as fresh when touched again.

use crate::cart::Cart;
use dashmap::DashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CheckoutStep {
    #[default]
    None,
    AwaitingPhone,
    AwaitingAddress {
        phone: String,
    },
    Confirming {
        phone: String,
        address: String,
    },
}

impl CheckoutStep {
    pub fn is_active(&self) -> bool {
        !matches!(self, CheckoutStep::None)
    }
}

#[derive(Debug)]
pub struct Session {
    pub user_id: i64,
    pub cart: Cart,
    pub checkout: CheckoutStep,
    last_seen: Instant,
}

impl Session {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            cart: Cart::default(),
            checkout: CheckoutStep::None,
            last_seen: Instant::now(),
        }
    }

    fn is_idle(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) >= ttl
    }
}

/// Exclusive access to one user's session. Dropping it lets the next event in.
pub struct SessionGuard {
    inner: OwnedMutexGuard<Session>,
}

impl Deref for SessionGuard {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.inner
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Session {
        &mut self.inner
    }
}

pub struct SessionManager {
    sessions: DashMap<i64, Arc<Mutex<Session>>>,
    idle_ttl: Duration,
}

impl SessionManager {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_ttl,
        }
    }

    /// Returns the user's session, creating an empty one on first use, and waits
    /// until no other event of the same user holds it.
    pub async fn lock(&self, user_id: i64) -> SessionGuard {
        let slot = {
            let entry = self.sessions.entry(user_id).or_insert_with(|| {
                tracing::debug!(user_id = user_id, "Creating session");
                Arc::new(Mutex::new(Session::new(user_id)))
            });
            Arc::clone(entry.value())
        };

        let mut inner = slot.lock_owned().await;
        let now = Instant::now();
        if inner.is_idle(now, self.idle_ttl) {
            tracing::debug!(user_id = user_id, "Session expired, starting over");
            *inner = Session::new(user_id);
        }
        inner.last_seen = now;
        SessionGuard { inner }
    }

    /// Removes sessions idle at `now`. Sessions that are held or awaited are kept.
    pub fn evict_idle(&self, now: Instant) -> usize {
        let before = self.sessions.len();
        let ttl = self.idle_ttl;
        self.sessions.retain(|_, slot| {
            // The shard lock is held here, so nobody can clone the slot meanwhile.
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(session) => !session.is_idle(now, ttl),
                Err(_) => true,
            }
        });
        before.saturating_sub(self.sessions.len())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn spawn_reaper(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let evicted = self.evict_idle(Instant::now());
                if evicted > 0 {
                    tracing::debug!(
                        evicted = evicted,
                        remaining = self.len(),
                        "Evicted idle sessions"
                    );
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::ProductSnapshot;

    fn snapshot(id: i64) -> ProductSnapshot {
        ProductSnapshot {
            id,
            name: "Tea".to_string(),
            price: 100,
        }
    }

    #[tokio::test]
    async fn lock_creates_session_lazily_and_keeps_state() {
        let manager = SessionManager::new(Duration::from_secs(60));
        assert_eq!(manager.len(), 0);

        {
            let mut session = manager.lock(10).await;
            assert_eq!(session.user_id, 10);
            assert!(session.cart.is_empty());
            assert_eq!(session.checkout, CheckoutStep::None);
            session.cart.add_item(snapshot(1));
            session.checkout = CheckoutStep::AwaitingPhone;
        }

        let session = manager.lock(10).await;
        assert_eq!(session.cart.quantity_of(1), Some(1));
        assert_eq!(session.checkout, CheckoutStep::AwaitingPhone);
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn same_user_is_serialized() {
        let manager = Arc::new(SessionManager::new(Duration::from_secs(60)));
        let held = manager.lock(1).await;

        let waiting = tokio::time::timeout(Duration::from_millis(50), manager.lock(1)).await;
        assert!(waiting.is_err(), "second lock must wait for the first");

        let other_user = tokio::time::timeout(Duration::from_millis(50), manager.lock(2)).await;
        assert!(other_user.is_ok(), "other users are not blocked");

        drop(held);
        let again = tokio::time::timeout(Duration::from_millis(50), manager.lock(1)).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn concurrent_increments_are_not_lost() {
        let manager = Arc::new(SessionManager::new(Duration::from_secs(60)));
        manager.lock(5).await.cart.add_item(snapshot(1));

        let mut tasks = Vec::new();
        for _ in 0..20 {
            let manager = Arc::clone(&manager);
            tasks.push(tokio::spawn(async move {
                let mut session = manager.lock(5).await;
                tokio::task::yield_now().await;
                session.cart.add_item(snapshot(1));
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(manager.lock(5).await.cart.quantity_of(1), Some(21));
    }

    #[tokio::test]
    async fn evicts_only_idle_and_unheld_sessions() {
        let manager = SessionManager::new(Duration::from_secs(30));
        drop(manager.lock(1).await);
        let held = manager.lock(2).await;

        assert_eq!(manager.evict_idle(Instant::now()), 0);

        let later = Instant::now() + Duration::from_secs(31);
        assert_eq!(manager.evict_idle(later), 1);
        assert_eq!(manager.len(), 1);

        drop(held);
        assert_eq!(manager.evict_idle(later), 1);
        assert_eq!(manager.len(), 0);
    }

    #[tokio::test]
    async fn expired_session_starts_fresh_on_access() {
        let manager = SessionManager::new(Duration::from_millis(10));
        {
            let mut session = manager.lock(3).await;
            session.cart.add_item(snapshot(1));
            session.checkout = CheckoutStep::AwaitingPhone;
        }

        tokio::time::sleep(Duration::from_millis(30)).await;

        let session = manager.lock(3).await;
        assert!(session.cart.is_empty());
        assert_eq!(session.checkout, CheckoutStep::None);
    }
}
