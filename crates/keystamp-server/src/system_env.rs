//! The [`Environment`] the server binary runs with.
//!
//! Wall clock from `SystemTime` in Unix milliseconds, randomness from the OS
//! via `getrandom`, and a blocking sleep. Ledger work already runs on
//! blocking threads, so sleeping there never stalls the async runtime.

use std::time::Duration;

use keystamp_core::Environment;

/// Real clock and OS randomness.
///
/// Certificate serials and freshly generated CA keys draw from
/// `getrandom`.
///
/// # Panics
///
/// Panics if the OS RNG fails or the clock reads before 1970. A CA without
/// functioning randomness must not issue certificates.
#[derive(Debug, Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// The process environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    #[allow(clippy::disallowed_methods)]
    #[allow(clippy::expect_used)]
    fn wall_clock_millis(&self) -> i64 {
        let elapsed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("invariant: system clock is after Unix epoch (1970-01-01)");
        i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer)
            .expect("invariant: OS RNG failure is unrecoverable - CA cannot issue securely");
    }
}
