use crate::egress::EgressRoute;
use crate::error::Result;
use chrono::{DateTime, Utc};

pub type SessionId = uuid::Uuid;

/// A browsing context capable of issuing extraction requests.
#[async_trait::async_trait]
pub trait BrowsingSession: Send + Sync + 'static {
    /// Release whatever the session holds (tab, connection, ...).
    async fn close(&self) -> Result<()>;
}

/// Produces new browsing sessions for a [`SessionPool`](crate::pool::SessionPool).
#[async_trait::async_trait]
pub trait SessionFactory<S: BrowsingSession>: Send + Sync + 'static {
    /// Create one session whose traffic goes out through `route`.
    async fn create(&self, route: &EgressRoute) -> Result<S>;
}

/// A pooled session: the handle plus the bookkeeping the pool needs.
#[derive(Debug)]
pub struct Session<S> {
    id: SessionId,
    handle: S,
    route: EgressRoute,
    created_at: DateTime<Utc>,
    pub(crate) usage_count: u32,
}

impl<S> Session<S> {
    pub(crate) fn new(handle: S, route: EgressRoute) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            handle,
            route,
            created_at: Utc::now(),
            usage_count: 0,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn handle(&self) -> &S {
        &self.handle
    }

    /// Route the session was opened on; it never changes.
    pub fn route(&self) -> &EgressRoute {
        &self.route
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Number of times the session has been leased, including the current lease.
    pub fn usage_count(&self) -> u32 {
        self.usage_count
    }
}
