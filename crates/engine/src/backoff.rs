//! Exponential backoff with jitter for retrying part/range job failures.
//!
//! The teacher never reaches for an external backoff crate — `worker.rs`
//! hand-rolls fixed-interval `sleep` loops around its compute/submit retries.
//! This keeps that texture: a small helper here, not a crate.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub base: Duration,
    pub factor: f64,
    /// Fractional jitter applied to each delay, e.g. `0.2` for ±20%.
    pub jitter: f64,
    pub max_retries: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            factor: 2.0,
            jitter: 0.2,
            max_retries: 3,
        }
    }
}

impl BackoffConfig {
    /// Delay before retry attempt `attempt` (0-based: the delay before the
    /// first retry, after the first failure).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let nominal_ms = self.base.as_millis() as f64 * self.factor.powi(attempt as i32);
        let jitter_frac = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        let ms = (nominal_ms * (1.0 + jitter_frac)).max(0.0);
        Duration::from_millis(ms as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_geometrically_within_jitter_bounds() {
        let cfg = BackoffConfig::default();
        for attempt in 0..4 {
            let nominal = cfg.base.as_millis() as f64 * cfg.factor.powi(attempt as i32);
            let lo = (nominal * (1.0 - cfg.jitter)).max(0.0) as u64;
            let hi = (nominal * (1.0 + cfg.jitter)) as u64;
            for _ in 0..20 {
                let delay = cfg.delay_for(attempt).as_millis() as u64;
                assert!(delay >= lo && delay <= hi + 1, "attempt {attempt}: {delay} not in [{lo},{hi}]");
            }
        }
    }
}
