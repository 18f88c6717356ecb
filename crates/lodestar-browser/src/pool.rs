//! Bounded pool of reusable browsing sessions.
//!
//! The pool owns every session it creates. Callers borrow one through a
//! [`SessionLease`]; dropping the lease (or passing it to
//! [`SessionPool::release`]) returns the session. Sessions that exceed the
//! retirement ceiling, or that are explicitly retired, are closed and replaced
//! on a background task so the releaser never waits on browser I/O.
//!
//! Every session is bound to the [`EgressRoute`] it was created for and is
//! only leased again for that route. When the pool is full and the only idle
//! sessions belong to other routes, the oldest of them is evicted to make room.

use crate::egress::EgressRoute;
use crate::error::{PoolError, Result};
use crate::session::{BrowsingSession, Session, SessionFactory, SessionId};
use lodestar_core::SessionConfig;
use std::collections::{HashSet, VecDeque};
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Sizing and timing knobs for a [`SessionPool`].
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_sessions: usize,
    pub retirement_ceiling: u32,
    pub acquire_timeout: Duration,
    pub creation_attempts: u32,
    pub creation_backoff: Duration,
}

impl From<&SessionConfig> for PoolSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            max_sessions: config.max_sessions,
            retirement_ceiling: config.retirement_ceiling,
            acquire_timeout: Duration::from_millis(config.acquire_timeout_ms),
            creation_attempts: config.creation_attempts.max(1),
            creation_backoff: Duration::from_millis(config.creation_backoff_ms),
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

/// Point-in-time counts reported by [`SessionPool::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub idle: usize,
    pub leased: usize,
    /// Sessions that exist or are being created.
    pub live: usize,
    pub max: usize,
}

struct PoolState<S> {
    idle: VecDeque<Session<S>>,
    leased: HashSet<SessionId>,
    live: usize,
    closed: bool,
}

struct PoolInner<S: BrowsingSession> {
    factory: Arc<dyn SessionFactory<S>>,
    settings: PoolSettings,
    state: Mutex<PoolState<S>>,
    available: Notify,
}

enum Step<S> {
    Ready(Session<S>),
    Create,
    /// Reuse the slot of an idle session bound to another route.
    Evict(Session<S>),
    Wait,
}

/// Shared handle to a session pool. Cloning is cheap.
pub struct SessionPool<S: BrowsingSession> {
    inner: Arc<PoolInner<S>>,
}

impl<S: BrowsingSession> Clone for SessionPool<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: BrowsingSession> SessionPool<S> {
    pub fn new(factory: Arc<dyn SessionFactory<S>>, settings: PoolSettings) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                factory,
                settings,
                state: Mutex::new(PoolState {
                    idle: VecDeque::new(),
                    leased: HashSet::new(),
                    live: 0,
                    closed: false,
                }),
                available: Notify::new(),
            }),
        }
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.inner.settings
    }

    /// Lease a free session bound to `route`, creating one if none is idle.
    ///
    /// Waits at most `acquire_timeout` for a session to come back when the
    /// pool is full. Returns [`PoolError::Unavailable`] on timeout or when
    /// creation fails after all retries.
    pub async fn acquire(
        &self,
        route: &EgressRoute,
    ) -> std::result::Result<SessionLease<S>, PoolError> {
        let started = Instant::now();
        let deadline = started + self.inner.settings.acquire_timeout;

        loop {
            // Register interest before inspecting state so a release between
            // the check and the wait is not lost.
            let notified = self.inner.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let step = {
                let mut state = self.inner.lock();
                if state.closed {
                    return Err(PoolError::ShutDown);
                }
                let matching = state.idle.iter().position(|s| s.route() == route);
                if let Some(mut session) = matching.and_then(|i| state.idle.remove(i)) {
                    session.usage_count += 1;
                    state.leased.insert(session.id());
                    Step::Ready(session)
                } else if state.live < self.inner.settings.max_sessions {
                    state.live += 1;
                    Step::Create
                } else if let Some(session) = state.idle.pop_front() {
                    // The evicted session's slot passes straight to the new one.
                    Step::Evict(session)
                } else {
                    Step::Wait
                }
            };

            match step {
                Step::Ready(session) => {
                    tracing::trace!(session = %session.id(), uses = session.usage_count, "session leased");
                    return Ok(SessionLease::new(session, &self.inner));
                }
                Step::Create => return self.create_and_lease(started, route).await,
                Step::Evict(old) => {
                    tracing::debug!(
                        session = %old.id(),
                        from = %old.route().identity_id,
                        to = %route.identity_id,
                        "evicting idle session bound to another route"
                    );
                    PoolInner::close_detached(old);
                    return self.create_and_lease(started, route).await;
                }
                Step::Wait => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        tracing::debug!("timed out waiting for a free session");
                        return Err(PoolError::Unavailable {
                            waited: started.elapsed(),
                        });
                    }
                }
            }
        }
    }

    async fn create_and_lease(
        &self,
        started: Instant,
        route: &EgressRoute,
    ) -> std::result::Result<SessionLease<S>, PoolError> {
        match self.inner.create_session(route).await {
            Ok(mut session) => {
                session.usage_count = 1;
                let closed = {
                    let mut state = self.inner.lock();
                    if state.closed {
                        state.live = state.live.saturating_sub(1);
                    } else {
                        state.leased.insert(session.id());
                    }
                    state.closed
                };
                if closed {
                    PoolInner::close_detached(session);
                    return Err(PoolError::ShutDown);
                }
                tracing::debug!(
                    session = %session.id(),
                    identity = %route.identity_id,
                    "created browsing session"
                );
                Ok(SessionLease::new(session, &self.inner))
            }
            Err(e) => {
                self.inner.lock().live -= 1;
                // Another waiter may now take the freed slot.
                self.inner.available.notify_one();
                tracing::warn!(error = %e, "session creation exhausted its retries");
                Err(PoolError::Unavailable {
                    waited: started.elapsed(),
                })
            }
        }
    }

    /// Return a session to the pool. Equivalent to dropping the lease.
    pub fn release(&self, lease: SessionLease<S>) {
        drop(lease);
    }

    /// Remove a session immediately and schedule a replacement on the same route.
    pub fn retire(&self, mut lease: SessionLease<S>) {
        if let Some(session) = lease.session.take() {
            tracing::info!(session = %session.id(), "retiring session on request");
            self.inner.check_in(session, true);
        }
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.lock();
        PoolStats {
            idle: state.idle.len(),
            leased: state.leased.len(),
            live: state.live,
            max: self.inner.settings.max_sessions,
        }
    }

    /// Close idle sessions and refuse further leases.
    ///
    /// Sessions still leased are closed as their leases come back.
    pub async fn shutdown(&self) {
        let idle: Vec<Session<S>> = {
            let mut state = self.inner.lock();
            state.closed = true;
            let drained: Vec<_> = state.idle.drain(..).collect();
            state.live = state.live.saturating_sub(drained.len());
            drained
        };
        self.inner.available.notify_waiters();

        for session in idle {
            if let Err(e) = session.handle().close().await {
                tracing::warn!(session = %session.id(), error = %e, "failed to close session");
            }
        }
        tracing::info!("session pool shut down");
    }
}

impl<S: BrowsingSession> PoolInner<S> {
    fn lock(&self) -> MutexGuard<'_, PoolState<S>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn create_session(&self, route: &EgressRoute) -> Result<Session<S>> {
        let mut backoff = self.settings.creation_backoff;
        let mut attempt = 1;
        loop {
            match self.factory.create(route).await {
                Ok(handle) => return Ok(Session::new(handle, route.clone())),
                Err(e) if attempt < self.settings.creation_attempts => {
                    tracing::warn!(attempt, error = %e, "session creation failed, backing off");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn check_in(self: &Arc<Self>, session: Session<S>, force_retire: bool) {
        let mut state = self.lock();
        state.leased.remove(&session.id());

        if state.closed {
            state.live = state.live.saturating_sub(1);
            drop(state);
            Self::close_detached(session);
            return;
        }

        if force_retire || session.usage_count > self.settings.retirement_ceiling {
            // The slot stays reserved in `live` until the replacement lands.
            drop(state);
            self.replace(session);
            return;
        }

        state.idle.push_back(session);
        drop(state);
        self.available.notify_one();
    }

    fn replace(self: &Arc<Self>, old: Session<S>) {
        tracing::debug!(session = %old.id(), uses = old.usage_count, "replacing session");
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.lock().live -= 1;
            self.available.notify_one();
            return;
        };

        let inner = Arc::clone(self);
        runtime.spawn(async move {
            if let Err(e) = old.handle().close().await {
                tracing::warn!(session = %old.id(), error = %e, "failed to close retired session");
            }
            let route = old.route().clone();
            drop(old);

            let created = inner.create_session(&route).await;
            let mut state = inner.lock();
            match created {
                Ok(session) if !state.closed => {
                    state.idle.push_back(session);
                }
                Ok(session) => {
                    state.live = state.live.saturating_sub(1);
                    drop(state);
                    Self::close_detached(session);
                    return;
                }
                Err(e) => {
                    state.live = state.live.saturating_sub(1);
                    tracing::warn!(error = %e, "replacement session could not be created");
                }
            }
            drop(state);
            inner.available.notify_one();
        });
    }

    fn close_detached(session: Session<S>) {
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = session.handle().close().await {
                    tracing::warn!(session = %session.id(), error = %e, "failed to close session");
                }
            });
        }
    }
}

/// Exclusive loan of a pooled session.
///
/// The session goes back to the pool when the lease is dropped.
pub struct SessionLease<S: BrowsingSession> {
    session: Option<Session<S>>,
    pool: Weak<PoolInner<S>>,
}

impl<S: BrowsingSession> SessionLease<S> {
    fn new(session: Session<S>, pool: &Arc<PoolInner<S>>) -> Self {
        Self {
            session: Some(session),
            pool: Arc::downgrade(pool),
        }
    }
}

impl<S: BrowsingSession> Deref for SessionLease<S> {
    type Target = Session<S>;

    fn deref(&self) -> &Self::Target {
        self.session
            .as_ref()
            .expect("lease holds its session until dropped")
    }
}

impl<S: BrowsingSession> Drop for SessionLease<S> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            if let Some(pool) = self.pool.upgrade() {
                pool.check_in(session, false);
            }
        }
    }
}

impl<S: BrowsingSession> std::fmt::Debug for SessionLease<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLease")
            .field("session", &self.session.as_ref().map(Session::id))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BrowserError;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    #[derive(Debug)]
    struct FakeSession {
        closed: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl BrowsingSession for FakeSession {
        async fn close(&self) -> Result<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeFactory {
        created: AtomicU32,
        fail_first: AtomicU32,
        closed: Arc<AtomicUsize>,
        endpoints: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl SessionFactory<FakeSession> for FakeFactory {
        async fn create(&self, route: &EgressRoute) -> Result<FakeSession> {
            self.endpoints
                .lock()
                .unwrap()
                .push(route.endpoint.clone());
            if self
                .fail_first
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(BrowserError::SessionCreation("boom".to_string()));
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(FakeSession {
                closed: Arc::clone(&self.closed),
            })
        }
    }

    fn direct() -> EgressRoute {
        EgressRoute::direct()
    }

    fn proxied(id: &str) -> EgressRoute {
        EgressRoute {
            identity_id: id.to_string(),
            endpoint: format!("http://{id}.proxy.invalid:3128"),
        }
    }

    fn settings(max: usize) -> PoolSettings {
        PoolSettings {
            max_sessions: max,
            retirement_ceiling: 50,
            acquire_timeout: Duration::from_millis(200),
            creation_attempts: 3,
            creation_backoff: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_reuses_released_session() {
        let factory = Arc::new(FakeFactory::default());
        let pool = SessionPool::new(factory.clone(), settings(2));

        let first = pool.acquire(&direct()).await.expect("acquire");
        let id = first.id();
        pool.release(first);

        let second = pool.acquire(&direct()).await.expect("acquire again");
        assert_eq!(second.id(), id);
        assert_eq!(second.usage_count(), 2);
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_never_leases_same_session_twice() {
        let pool = SessionPool::new(Arc::new(FakeFactory::default()), settings(3));

        let a = pool.acquire(&direct()).await.expect("a");
        let b = pool.acquire(&direct()).await.expect("b");
        let c = pool.acquire(&direct()).await.expect("c");

        let ids: HashSet<_> = [a.id(), b.id(), c.id()].into_iter().collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(pool.stats().leased, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_pool_times_out() {
        let pool = SessionPool::new(Arc::new(FakeFactory::default()), settings(1));
        let _held = pool.acquire(&direct()).await.expect("held");

        let err = pool.acquire(&direct()).await.expect_err("should time out");
        assert!(matches!(err, PoolError::Unavailable { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_gets_released_session() {
        let pool = SessionPool::new(Arc::new(FakeFactory::default()), settings(1));
        let held = pool.acquire(&direct()).await.expect("held");
        let id = held.id();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire(&direct()).await.map(|lease| lease.id()) })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(held);

        let got = waiter.await.expect("join").expect("lease");
        assert_eq!(got, id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_creation_retries_then_succeeds() {
        let factory = Arc::new(FakeFactory::default());
        factory.fail_first.store(2, Ordering::SeqCst);
        let pool = SessionPool::new(factory.clone(), settings(1));

        let lease = pool.acquire(&direct()).await.expect("third attempt succeeds");
        assert_eq!(lease.usage_count(), 1);
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_creation_exhaustion_frees_slot() {
        let factory = Arc::new(FakeFactory::default());
        factory.fail_first.store(3, Ordering::SeqCst);
        let pool = SessionPool::new(factory, settings(1));

        let err = pool.acquire(&direct()).await.expect_err("all attempts fail");
        assert!(matches!(err, PoolError::Unavailable { .. }));
        assert_eq!(pool.stats().live, 0);

        // Factory recovers; the slot is usable again.
        pool.acquire(&direct()).await.expect("recovered");
    }

    #[tokio::test]
    async fn test_retirement_after_ceiling() {
        let factory = Arc::new(FakeFactory::default());
        let mut config = settings(1);
        config.retirement_ceiling = 2;
        let pool = SessionPool::new(factory.clone(), config);

        let first_id = {
            let lease = pool.acquire(&direct()).await.expect("1");
            lease.id()
        };
        drop(pool.acquire(&direct()).await.expect("2"));
        // Third use exceeds the ceiling; release triggers replacement.
        drop(pool.acquire(&direct()).await.expect("3"));

        let lease = pool.acquire(&direct()).await.expect("replacement");
        assert_ne!(lease.id(), first_id);
        assert_eq!(lease.usage_count(), 1);
        assert_eq!(factory.closed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().live, 1);
    }

    #[tokio::test]
    async fn test_retire_replaces_immediately() {
        let factory = Arc::new(FakeFactory::default());
        let pool = SessionPool::new(factory.clone(), settings(1));

        let lease = pool.acquire(&direct()).await.expect("lease");
        let id = lease.id();
        pool.retire(lease);

        let next = pool.acquire(&direct()).await.expect("replacement");
        assert_ne!(next.id(), id);
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_shutdown_closes_idle_and_rejects() {
        let factory = Arc::new(FakeFactory::default());
        let pool = SessionPool::new(factory.clone(), settings(2));

        drop(pool.acquire(&direct()).await.expect("lease"));
        pool.shutdown().await;

        assert_eq!(factory.closed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().live, 0);
        assert!(matches!(pool.acquire(&direct()).await, Err(PoolError::ShutDown)));
    }

    #[tokio::test]
    async fn test_factory_receives_route_endpoint() {
        let factory = Arc::new(FakeFactory::default());
        let pool = SessionPool::new(factory.clone(), settings(2));

        let lease = pool.acquire(&proxied("res-1")).await.expect("lease");
        assert_eq!(lease.route(), &proxied("res-1"));
        assert_eq!(
            *factory.endpoints.lock().unwrap(),
            vec!["http://res-1.proxy.invalid:3128".to_string()]
        );
    }

    #[tokio::test]
    async fn test_idle_session_only_reused_for_its_route() {
        let factory = Arc::new(FakeFactory::default());
        let pool = SessionPool::new(factory.clone(), settings(2));

        let a = pool.acquire(&proxied("a")).await.expect("a");
        let a_id = a.id();
        drop(a);

        let b = pool.acquire(&proxied("b")).await.expect("b");
        assert_ne!(b.id(), a_id);
        assert_eq!(b.route(), &proxied("b"));
        drop(b);

        let again = pool.acquire(&proxied("a")).await.expect("a again");
        assert_eq!(again.id(), a_id);
        assert_eq!(again.usage_count(), 2);
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_full_pool_evicts_idle_session_of_other_route() {
        let factory = Arc::new(FakeFactory::default());
        let pool = SessionPool::new(factory.clone(), settings(1));

        let a_id = pool.acquire(&proxied("a")).await.expect("a").id();

        let b = pool.acquire(&proxied("b")).await.expect("b");
        assert_ne!(b.id(), a_id);
        assert_eq!(b.route(), &proxied("b"));
        assert_eq!(pool.stats().live, 1);

        // The evicted session closes on a spawned task.
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(factory.closed.load(Ordering::SeqCst), 1);
        assert_eq!(
            *factory.endpoints.lock().unwrap(),
            vec![
                "http://a.proxy.invalid:3128".to_string(),
                "http://b.proxy.invalid:3128".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_replacement_keeps_route() {
        let factory = Arc::new(FakeFactory::default());
        let pool = SessionPool::new(factory.clone(), settings(1));

        let lease = pool.acquire(&proxied("a")).await.expect("lease");
        pool.retire(lease);

        let next = pool.acquire(&proxied("a")).await.expect("replacement");
        assert_eq!(next.route(), &proxied("a"));
        assert_eq!(next.usage_count(), 1);
        assert!(factory
            .endpoints
            .lock()
            .unwrap()
            .iter()
            .all(|e| e == "http://a.proxy.invalid:3128"));
    }
}
