//! Authorities wired to a simulated environment.

use std::sync::Arc;

use keystamp_core::{CaIdentity, CaKey};
use keystamp_server::{Authority, AuthorityConfig, Ledger};
use p256::{
    ecdsa::SigningKey,
    pkcs8::{EncodePrivateKey, LineEnding},
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::sim_env::SimEnv;

/// CA key derived from `seed`, certificate valid from `now_ms`.
#[allow(clippy::expect_used)]
pub fn sim_ca(seed: u64, now_ms: i64) -> CaKey {
    let key = SigningKey::random(&mut ChaCha8Rng::seed_from_u64(seed));
    let pem = key.to_pkcs8_pem(LineEnding::LF).expect("invariant: P-256 key encodes as PKCS#8");
    CaKey::from_pkcs8_pem(&pem, CaIdentity::default(), now_ms)
        .expect("invariant: freshly generated key loads")
}

/// Authority over `ledger` with a [`SimEnv`] and a CA seeded from `seed`.
///
/// The environment is reachable through [`Authority::env`].
pub fn sim_authority<L: Ledger>(
    seed: u64,
    ledger: L,
    config: AuthorityConfig,
) -> Authority<SimEnv, L> {
    let env = SimEnv::with_seed(seed);
    let ca = sim_ca(seed, env.now());
    Authority::new(env, ledger, Arc::new(ca), config)
}
