use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub max_attempts: u32,
    pub base_seconds: f64,
    pub max_seconds: f64,
    pub jitter_seconds: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_seconds: 1.0,
            max_seconds: 30.0,
            jitter_seconds: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    NonRetryable,
}

/// Server-side failures are worth retrying in place; client-side statuses are
/// not. 429 never reaches this, it is handled as a quota signal upstream.
pub fn classify_status(status: u16) -> ErrorClass {
    match status {
        500..=599 => ErrorClass::Retryable,
        _ => ErrorClass::NonRetryable,
    }
}

/// Unjittered delay for the given attempt: base * 2^(attempt_no-1), capped.
pub fn base_delay_seconds(attempt_no: u32, cfg: &BackoffConfig) -> f64 {
    let exp = attempt_no.max(1).saturating_sub(1);

    // Compute 2^exp safely. If exp is too large, treat multiplier as huge and let cap handle it.
    let pow2 = 1_u64.checked_shl(exp).unwrap_or(u64::MAX) as f64;

    (cfg.base_seconds * pow2).min(cfg.max_seconds)
}

/// Delay to sleep after a failed attempt: capped exponential plus a small
/// additive jitter so synchronized workers fan out.
pub fn next_delay(attempt_no: u32, cfg: &BackoffConfig, rng: &mut impl Rng) -> Duration {
    let delay = base_delay_seconds(attempt_no, cfg);

    let jitter = if cfg.jitter_seconds > 0.0 {
        rng.gen_range(0.0..=cfg.jitter_seconds)
    } else {
        0.0
    };

    Duration::from_secs_f64((delay + jitter).max(0.0))
}
