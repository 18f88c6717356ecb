//! Jittered pacing delays.

use lodestar_core::PacingConfig;
use rand::Rng;
use std::time::Duration;

/// Draws pacing delays uniformly from the configured ranges.
#[derive(Debug, Clone)]
pub struct Pacer {
    config: PacingConfig,
}

impl Pacer {
    /// Create a pacer over the given ranges.
    #[must_use]
    pub fn new(config: PacingConfig) -> Self {
        Self { config }
    }

    /// Delay before a target, scaled by `multiplier`.
    #[must_use]
    pub fn target_delay(&self, multiplier: f64) -> Duration {
        jittered(self.config.target_delay_ms, multiplier)
    }

    /// Pause between batches, scaled by `multiplier`.
    #[must_use]
    pub fn batch_pause(&self, multiplier: f64) -> Duration {
        jittered(self.config.batch_pause_ms, multiplier)
    }

    /// Sleep for a target delay.
    pub async fn before_target(&self, multiplier: f64) {
        sleep_nonzero(self.target_delay(multiplier)).await;
    }

    /// Sleep for an inter-batch pause.
    pub async fn between_batches(&self, multiplier: f64) {
        let pause = self.batch_pause(multiplier);
        if !pause.is_zero() {
            tracing::debug!(pause_ms = pause.as_millis(), "pausing between batches");
        }
        sleep_nonzero(pause).await;
    }
}

fn jittered((min, max): (u64, u64), multiplier: f64) -> Duration {
    let base = if max > min {
        rand::thread_rng().gen_range(min..=max)
    } else {
        min
    };
    let base = Duration::from_millis(base).as_secs_f64();
    Duration::try_from_secs_f64(base * multiplier.max(0.0)).unwrap_or(Duration::MAX)
}

async fn sleep_nonzero(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_within_scaled_range() {
        let pacer = Pacer::new(PacingConfig::default());
        for _ in 0..100 {
            let delay = pacer.target_delay(2.0);
            assert!(delay >= Duration::from_secs(20));
            assert!(delay <= Duration::from_secs(60));
        }
    }

    #[test]
    fn test_batch_pause_range() {
        let pacer = Pacer::new(PacingConfig::default());
        let pause = pacer.batch_pause(1.0);
        assert!(pause >= Duration::from_secs(60));
        assert!(pause <= Duration::from_secs(120));
    }

    #[test]
    fn test_immediate_is_zero() {
        let pacer = Pacer::new(PacingConfig::immediate());
        assert!(pacer.target_delay(5.0).is_zero());
        assert!(pacer.batch_pause(5.0).is_zero());
    }

    #[tokio::test(start_paused = true)]
    async fn test_before_target_sleeps() {
        let pacer = Pacer::new(PacingConfig {
            target_delay_ms: (1_000, 1_000),
            batch_pause_ms: (0, 0),
        });
        let start = tokio::time::Instant::now();
        pacer.before_target(1.5).await;
        assert!(start.elapsed() >= Duration::from_millis(1_500));
    }
}
