//! Environment abstraction for deterministic testing.
//!
//! Decouples the protocol from system resources (wall clock, sleeping,
//! randomness). Production uses the real clock and the OS RNG; simulations
//! use a manual clock and a seeded RNG so every run is reproducible.

use std::time::Duration;

/// Abstract environment providing time, randomness and blocking sleep.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - Methods are infallible except in exceptional circumstances (e.g., OS
///   entropy exhaustion, incorrect simulation setup)
pub trait Environment: Clone + Send + Sync + 'static {
    /// Milliseconds since the Unix epoch.
    ///
    /// Used for request freshness, envelope timestamps, certificate validity
    /// and revocation records. Not required to be monotonic; the replay
    /// watermark never relies on it.
    fn wall_clock_millis(&self) -> i64;

    /// Block the calling thread for `duration`.
    ///
    /// Only used for retry backoff on ledger reads. Simulated environments
    /// advance their clock instead of sleeping.
    fn sleep(&self, duration: Duration);

    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Given the same RNG seed, this produces the same sequence of bytes
    /// - Uses cryptographically secure RNG
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}

/// Deterministic environment for unit and integration tests.
pub mod test_utils {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicI64, AtomicU64, Ordering},
        },
        time::Duration,
    };

    use super::Environment;

    /// Start of the mock clock: 2023-11-14T22:13:20Z.
    pub const MOCK_EPOCH_MS: i64 = 1_700_000_000_000;

    /// Manual clock plus a splitmix64 byte stream.
    ///
    /// Clones share the clock and the stream. `sleep` advances the clock
    /// instead of blocking.
    #[derive(Debug, Clone)]
    pub struct MockEnv {
        now_ms: Arc<AtomicI64>,
        counter: Arc<AtomicU64>,
    }

    impl Default for MockEnv {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockEnv {
        /// Clock at [`MOCK_EPOCH_MS`], stream seeded with 0.
        pub fn new() -> Self {
            Self::with_seed(0)
        }

        /// Clock at [`MOCK_EPOCH_MS`], stream seeded with `seed`.
        pub fn with_seed(seed: u64) -> Self {
            Self {
                now_ms: Arc::new(AtomicI64::new(MOCK_EPOCH_MS)),
                counter: Arc::new(AtomicU64::new(seed)),
            }
        }

        /// Move the clock forward.
        pub fn advance(&self, duration: Duration) {
            let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
            self.now_ms.fetch_add(millis, Ordering::SeqCst);
        }

        /// Set the clock.
        pub fn set_time(&self, now_ms: i64) {
            self.now_ms.store(now_ms, Ordering::SeqCst);
        }

        fn next_word(&self) -> u64 {
            let mut z = self
                .counter
                .fetch_add(0x9E37_79B9_7F4A_7C15, Ordering::SeqCst)
                .wrapping_add(0x9E37_79B9_7F4A_7C15);
            z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
            z ^ (z >> 31)
        }
    }

    impl Environment for MockEnv {
        fn wall_clock_millis(&self) -> i64 {
            self.now_ms.load(Ordering::SeqCst)
        }

        fn sleep(&self, duration: Duration) {
            self.advance(duration);
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            for chunk in buffer.chunks_mut(8) {
                let word = self.next_word().to_le_bytes();
                chunk.copy_from_slice(&word[..chunk.len()]);
            }
        }
    }

}
