//! Simulated environment.
//!
//! Manual clock plus a seeded ChaCha RNG. Two environments built from the
//! same seed produce the same serials, the same keys and the same envelope
//! timestamps, so a failing run can be replayed exactly.

#![allow(clippy::disallowed_types, reason = "Synchronous simulation state only")]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use keystamp_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Simulation start: 2023-11-14T22:13:20Z.
pub const SIM_EPOCH_MS: i64 = 1_700_000_000_000;

/// Deterministic [`Environment`] for simulations.
///
/// Clones share the clock and the RNG. `sleep` advances the clock and
/// returns immediately, so retry backoff costs no real time.
#[derive(Clone)]
pub struct SimEnv {
    state: Arc<Mutex<SimState>>,
}

struct SimState {
    now_ms: i64,
    rng: ChaCha8Rng,
    slept: Duration,
}

impl SimEnv {
    /// Clock at [`SIM_EPOCH_MS`], RNG seeded with `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self::at(seed, SIM_EPOCH_MS)
    }

    /// Clock at `now_ms`, RNG seeded with `seed`.
    pub fn at(seed: u64, now_ms: i64) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(seed);
        let state = SimState { now_ms, rng, slept: Duration::ZERO };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    /// Current simulated time.
    pub fn now(&self) -> i64 {
        self.with_state(|s| s.now_ms)
    }

    /// Move the clock forward.
    pub fn advance(&self, duration: Duration) {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        self.with_state(|s| s.now_ms = s.now_ms.saturating_add(millis));
    }

    /// Move the clock by a signed amount; negative values step it back.
    pub fn shift(&self, millis: i64) {
        self.with_state(|s| s.now_ms = s.now_ms.saturating_add(millis));
    }

    /// Total time spent in `sleep`.
    pub fn slept(&self) -> Duration {
        self.with_state(|s| s.slept)
    }

    #[allow(clippy::expect_used)]
    fn with_state<T>(&self, f: impl FnOnce(&mut SimState) -> T) -> T {
        let mut state = self.state.lock().expect("Mutex poisoned");
        f(&mut state)
    }
}

impl std::fmt::Debug for SimEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimEnv").field("now_ms", &self.now()).finish_non_exhaustive()
    }
}

impl Environment for SimEnv {
    fn wall_clock_millis(&self) -> i64 {
        self.now()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
        self.with_state(|s| s.slept = s.slept.saturating_add(duration));
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.with_state(|s| s.rng.fill_bytes(buffer));
    }
}
