//! Browsing resources for campaign execution.
//!
//! Provides the bounded [`SessionPool`] of reusable browsing sessions, the
//! [`EgressRotator`] that hands out network egress identities, and a
//! chromiumoxide-backed [`BrowserEngine`] that produces real sessions.

pub mod egress;
pub mod engine;
pub mod error;
pub mod pool;
pub mod session;

pub use egress::{EgressIdentity, EgressLease, EgressRotator, EgressRoute};
pub use engine::{BrowserEngine, ChromiumSession, ChromiumSessionFactory};
pub use error::{BrowserError, EgressError, PoolError, Result};
pub use pool::{PoolSettings, PoolStats, SessionLease, SessionPool};
pub use session::{BrowsingSession, Session, SessionFactory, SessionId};
