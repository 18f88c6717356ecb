//! Detection-risk estimate and the throttle policy derived from it.
//!
//! The governor keeps a single risk value in `[0, 1]`. Extraction outcomes
//! push it up (failures, detections) or decay it (successes), and it also
//! cools off with a configurable half-life while nothing is observed. The
//! throttle policy turns the current risk and a stealth level into a delay
//! multiplier and batch size, and latches a pause once risk reaches the
//! emergency threshold.

use lodestar_core::{RiskConfig, StealthConfig, StealthLevel};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;

/// Outcome of an extraction attempt as seen by the risk model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Record extracted
    Success,
    /// Transient or permanent failure
    Failure,
    /// The platform flagged the request
    Detected,
}

/// Pacing parameters for the next batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrottlePolicy {
    /// Factor applied to every base delay
    pub delay_multiplier: f64,
    /// Targets to process before the next inter-batch pause
    pub batch_size: usize,
    /// Set while the emergency latch is engaged
    pub paused: bool,
}

#[derive(Debug)]
struct RiskState {
    risk: f64,
    updated_at: Instant,
    history: VecDeque<Outcome>,
    last_rotation: Instant,
    latched: bool,
}

struct GovernorInner {
    risk: RiskConfig,
    stealth: StealthConfig,
    state: Mutex<RiskState>,
}

/// Shared risk estimator. Cloning is cheap and shares state.
#[derive(Clone)]
pub struct RiskGovernor {
    inner: Arc<GovernorInner>,
}

impl RiskGovernor {
    /// Create a governor at zero risk.
    #[must_use]
    pub fn new(risk: RiskConfig, stealth: StealthConfig) -> Self {
        let now = Instant::now();
        Self {
            inner: Arc::new(GovernorInner {
                state: Mutex::new(RiskState {
                    risk: 0.0,
                    updated_at: now,
                    history: VecDeque::with_capacity(risk.history_len),
                    last_rotation: now,
                    latched: false,
                }),
                risk,
                stealth,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RiskState> {
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.apply_idle_decay(&mut state);
        state
    }

    fn apply_idle_decay(&self, state: &mut RiskState) {
        let now = Instant::now();
        let half_life = self.inner.risk.idle_half_life_secs;
        if half_life > 0 && state.risk > 0.0 {
            let elapsed = now.duration_since(state.updated_at).as_secs_f64();
            #[allow(clippy::cast_precision_loss)]
            let factor = 0.5_f64.powf(elapsed / half_life as f64);
            state.risk = (state.risk * factor).clamp(0.0, 1.0);
        }
        state.updated_at = now;
        self.update_latch(state);
    }

    fn update_latch(&self, state: &mut RiskState) {
        if !state.latched && state.risk >= self.inner.risk.emergency_threshold {
            state.latched = true;
            tracing::warn!(risk = state.risk, "risk reached emergency threshold, pausing");
        } else if state.latched && state.risk < self.inner.risk.resume_threshold {
            state.latched = false;
            tracing::info!(risk = state.risk, "risk below resume threshold, latch cleared");
        }
    }

    /// Current risk in `[0, 1]`.
    #[must_use]
    pub fn current_risk(&self) -> f64 {
        self.lock().risk
    }

    /// Fold one outcome into the estimate.
    pub fn observe(&self, outcome: Outcome) {
        let config = &self.inner.risk;
        let mut state = self.lock();
        let before = state.risk;

        state.risk = match outcome {
            Outcome::Success => before * (1.0 - config.success_decay),
            Outcome::Failure => before + config.failure_penalty,
            Outcome::Detected => before + config.detected_penalty,
        }
        .clamp(0.0, 1.0);

        if config.history_len > 0 {
            if state.history.len() == config.history_len {
                state.history.pop_front();
            }
            state.history.push_back(outcome);
        }

        self.update_latch(&mut state);
        tracing::trace!(?outcome, before, after = state.risk, "risk observed");
    }

    /// Pacing for a campaign at `level` under the current risk.
    ///
    /// The delay multiplier grows and the batch size shrinks as risk rises.
    #[must_use]
    pub fn throttle_policy(&self, level: StealthLevel) -> ThrottlePolicy {
        let profile = self.inner.stealth.profile(level);
        let state = self.lock();
        let risk = state.risk;

        let delay_multiplier =
            profile.delay_multiplier * (1.0 + self.inner.stealth.risk_delay_gain * risk);

        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let batch_size = ((profile.batch_size as f64) * (1.0 - risk)).ceil().max(1.0) as usize;

        ThrottlePolicy {
            delay_multiplier,
            batch_size,
            paused: state.latched,
        }
    }

    /// Whether the emergency latch is engaged.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.lock().latched
    }

    /// Whether risk is low enough to resume a paused campaign.
    #[must_use]
    pub fn resume_allowed(&self) -> bool {
        self.lock().risk < self.inner.risk.resume_threshold
    }

    /// Risk must fall below this before a paused campaign may resume.
    #[must_use]
    pub fn resume_threshold(&self) -> f64 {
        self.inner.risk.resume_threshold
    }

    /// True once the rotation interval elapsed or risk reached the rotation threshold.
    #[must_use]
    pub fn rotation_due(&self) -> bool {
        let state = self.lock();
        state.risk >= self.inner.risk.rotation_threshold
            || state.last_rotation.elapsed() >= self.inner.risk.rotation_interval()
    }

    /// Record that egress was rotated.
    pub fn mark_rotated(&self) {
        self.lock().last_rotation = Instant::now();
    }

    /// Recent outcomes, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<Outcome> {
        self.lock().history.iter().copied().collect()
    }

    /// Share of detections among recent outcomes.
    #[must_use]
    pub fn detection_rate(&self) -> f64 {
        let state = self.lock();
        if state.history.is_empty() {
            return 0.0;
        }
        let detected = state
            .history
            .iter()
            .filter(|o| **o == Outcome::Detected)
            .count();
        #[allow(clippy::cast_precision_loss)]
        let rate = detected as f64 / state.history.len() as f64;
        rate
    }

    /// The detection rate when it has reached the alert threshold.
    #[must_use]
    pub fn detection_alert(&self) -> Option<f64> {
        let rate = self.detection_rate();
        let threshold = self.inner.risk.detection_alert_threshold;
        (rate > 0.0 && rate >= threshold).then_some(rate)
    }
}
