//! Request identifier generation
//!
//! Identifiers have the form `<seconds>-<4 digit fraction>-<random>`, for
//! example `1700000000-1234-1804289383`. Uniqueness is probabilistic: the
//! timestamp has 100µs granularity and the random suffix covers 31 bits.

use rand::Rng;

/// Upper bound (inclusive) of the random suffix
pub const MAX_RANDOM_SUFFIX: u32 = i32::MAX as u32;

/// Source of wall-clock time, in seconds since the Unix epoch
pub trait Clock {
    fn now(&self) -> f64;
}

/// Clock backed by the system wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        let now = chrono::Utc::now();
        now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1_000_000.0
    }
}

impl<F> Clock for F
where
    F: Fn() -> f64,
{
    fn now(&self) -> f64 {
        self()
    }
}

/// Generate a request identifier from the given clock and random source
pub fn generate_request_id<C, R>(clock: &C, rng: &mut R) -> String
where
    C: Clock + ?Sized,
    R: Rng,
{
    let timestamp = format!("{:.4}", clock.now()).replace('.', "-");
    let suffix = rng.gen_range(0..=MAX_RANDOM_SUFFIX);
    let id = format!("{}-{}", timestamp, suffix);

    tracing::trace!("Generated request id {}", id);
    id
}
