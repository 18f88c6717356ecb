//! Egress identity rotation.
//!
//! An egress identity is the network route an extraction goes out through
//! (direct, or a configured proxy endpoint). The rotator tracks a health score
//! per identity, caps concurrent use and picks the next identity by the
//! configured [`RotationStrategy`].

use crate::error::EgressError;
use chrono::{DateTime, Utc};
use lodestar_core::{EgressConfig, IdentityConfig, RotationStrategy};
use rand::Rng;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// One egress identity and its live bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EgressIdentity {
    pub id: String,
    pub endpoint: String,
    pub class: String,
    /// In [0, 1]; 1.0 is fully healthy.
    pub health: f64,
    pub active: bool,
    pub last_used: Option<DateTime<Utc>>,
    pub in_use: u32,
}

impl EgressIdentity {
    fn from_config(config: &IdentityConfig) -> Self {
        Self {
            id: config.id.clone(),
            endpoint: config.endpoint.clone(),
            class: config.class.clone(),
            health: 1.0,
            active: true,
            last_used: None,
            in_use: 0,
        }
    }

    fn direct() -> Self {
        Self::from_config(&IdentityConfig {
            id: DIRECT_ID.to_string(),
            endpoint: String::new(),
            class: "direct".to_string(),
        })
    }

    /// The network route sessions for this identity must use.
    pub fn route(&self) -> EgressRoute {
        EgressRoute {
            identity_id: self.id.clone(),
            endpoint: self.endpoint.clone(),
        }
    }
}

const DIRECT_ID: &str = "direct";

/// Network route a browsing session is bound to for its whole life.
///
/// A browser tab cannot change proxy once opened, so sessions are created for
/// one route and only leased again for that route.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EgressRoute {
    /// Identity the route belongs to
    pub identity_id: String,
    /// Proxy endpoint; empty for a direct connection
    pub endpoint: String,
}

impl EgressRoute {
    /// Route with no proxy.
    pub fn direct() -> Self {
        Self {
            identity_id: DIRECT_ID.to_string(),
            endpoint: String::new(),
        }
    }

    /// True when no proxy is involved.
    pub fn is_direct(&self) -> bool {
        self.endpoint.is_empty()
    }
}

struct RotatorState {
    identities: Vec<EgressIdentity>,
    cursor: usize,
}

struct RotatorInner {
    strategy: RotationStrategy,
    health_floor: f64,
    health_decay: f64,
    max_in_use: u32,
    state: Mutex<RotatorState>,
}

impl RotatorInner {
    fn lock(&self) -> MutexGuard<'_, RotatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, id: &str) {
        let mut state = self.lock();
        if let Some(identity) = state.identities.iter_mut().find(|i| i.id == id) {
            identity.in_use = identity.in_use.saturating_sub(1);
        }
    }
}

/// Shared handle to the identity set. Cloning is cheap.
#[derive(Clone)]
pub struct EgressRotator {
    inner: Arc<RotatorInner>,
}

impl EgressRotator {
    /// Build a rotator from configuration.
    ///
    /// With no identities configured, a single `direct` identity is used.
    pub fn from_config(config: &EgressConfig) -> Self {
        let mut identities: Vec<EgressIdentity> = config
            .identities
            .iter()
            .map(EgressIdentity::from_config)
            .collect();
        if identities.is_empty() {
            identities.push(EgressIdentity::direct());
        }

        Self {
            inner: Arc::new(RotatorInner {
                strategy: config.strategy,
                health_floor: config.health_floor,
                health_decay: config.health_decay,
                max_in_use: config.max_sessions_per_identity.max(1),
                state: Mutex::new(RotatorState {
                    identities,
                    cursor: 0,
                }),
            }),
        }
    }

    /// Pick an eligible identity and take a lease on it.
    pub fn select(&self) -> Result<EgressLease, EgressError> {
        let mut state = self.inner.lock();
        let max = self.inner.max_in_use;
        let count = state.identities.len();

        let eligible: Vec<usize> = (0..count)
            .map(|offset| (state.cursor + offset) % count)
            .filter(|&i| {
                let identity = &state.identities[i];
                identity.active && identity.in_use < max
            })
            .collect();

        let index = match self.inner.strategy {
            RotationStrategy::RoundRobin => eligible.first().copied(),
            RotationStrategy::WeightedHealth => pick_weighted(&state.identities, &eligible),
        }
        .ok_or(EgressError::Exhausted)?;

        if self.inner.strategy == RotationStrategy::RoundRobin {
            state.cursor = (index + 1) % count;
        }

        let identity = &mut state.identities[index];
        identity.in_use += 1;
        identity.last_used = Some(Utc::now());
        tracing::trace!(identity = %identity.id, in_use = identity.in_use, "egress identity selected");

        Ok(EgressLease {
            identity: identity.clone(),
            rotator: Arc::downgrade(&self.inner),
            reported: false,
        })
    }

    /// Consume a lease, folding the outcome into the identity's health.
    ///
    /// Health below the floor deactivates the identity.
    pub fn report_outcome(&self, mut lease: EgressLease, success: bool) {
        lease.reported = true;
        let mut state = self.inner.lock();
        let Some(identity) = state.identities.iter_mut().find(|i| i.id == lease.identity.id) else {
            return;
        };

        identity.in_use = identity.in_use.saturating_sub(1);
        let sample = if success { 1.0 } else { 0.0 };
        let decay = self.inner.health_decay;
        identity.health = (decay * identity.health + (1.0 - decay) * sample).clamp(0.0, 1.0);

        if identity.active && identity.health < self.inner.health_floor {
            identity.active = false;
            tracing::warn!(
                identity = %identity.id,
                health = identity.health,
                "egress identity deactivated: health below floor"
            );
        }
    }

    /// Take an identity out of rotation.
    pub fn deactivate(&self, id: &str) -> Result<(), EgressError> {
        let mut state = self.inner.lock();
        let identity = state
            .identities
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| EgressError::UnknownIdentity(id.to_string()))?;
        if identity.active {
            identity.active = false;
            tracing::warn!(identity = %id, "egress identity deactivated");
        }
        Ok(())
    }

    /// Return an identity to rotation with full health.
    pub fn reactivate(&self, id: &str) -> Result<(), EgressError> {
        let mut state = self.inner.lock();
        let identity = state
            .identities
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| EgressError::UnknownIdentity(id.to_string()))?;
        identity.active = true;
        identity.health = 1.0;
        tracing::info!(identity = %id, "egress identity reactivated");
        Ok(())
    }

    /// Advance the round-robin cursor past the next identity.
    pub fn rotate(&self) {
        let mut state = self.inner.lock();
        let count = state.identities.len();
        state.cursor = (state.cursor + 1) % count;
        tracing::debug!(cursor = state.cursor, "egress rotation");
    }

    pub fn snapshot(&self) -> Vec<EgressIdentity> {
        self.inner.lock().identities.clone()
    }

    pub fn active_count(&self) -> usize {
        self.inner.lock().identities.iter().filter(|i| i.active).count()
    }
}

fn pick_weighted(identities: &[EgressIdentity], eligible: &[usize]) -> Option<usize> {
    let total: f64 = eligible.iter().map(|&i| identities[i].health).sum();
    if total <= 0.0 {
        return eligible.first().copied();
    }

    let mut roll = rand::thread_rng().gen_range(0.0..total);
    for &i in eligible {
        roll -= identities[i].health;
        if roll < 0.0 {
            return Some(i);
        }
    }
    eligible.last().copied()
}

/// Loan of one egress identity.
///
/// Hand it back through [`EgressRotator::report_outcome`]. A lease dropped
/// without a report frees its slot and leaves health untouched.
#[derive(Debug)]
pub struct EgressLease {
    identity: EgressIdentity,
    rotator: Weak<RotatorInner>,
    reported: bool,
}

impl EgressLease {
    /// Snapshot of the identity taken when the lease was granted.
    pub fn identity(&self) -> &EgressIdentity {
        &self.identity
    }

    pub fn id(&self) -> &str {
        &self.identity.id
    }

    /// Route a session must use to go out through this identity.
    pub fn route(&self) -> EgressRoute {
        self.identity.route()
    }
}

impl Drop for EgressLease {
    fn drop(&mut self) {
        if self.reported {
            return;
        }
        if let Some(rotator) = self.rotator.upgrade() {
            rotator.release(&self.identity.id);
        }
    }
}
