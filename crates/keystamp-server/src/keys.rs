//! CA key files.
//!
//! The CA key lives on disk KeyGuard-wrapped; the password comes from the
//! environment. These helpers back the `serve`, `init-key` and `wrap-key`
//! commands.

use std::path::Path;

use keystamp_core::{CaIdentity, CaKey, Environment};
use keystamp_crypto::wrap_private_key_pem;
use p256::{
    ecdsa::SigningKey,
    pkcs8::{EncodePrivateKey, LineEnding},
};

use crate::error::ServerError;

/// Environment variable holding the CA key password.
pub const PASSWORD_ENV: &str = "KEYSTAMP_CA_PASSWORD";

/// CA key password from [`PASSWORD_ENV`].
///
/// Only the environment is consulted, never argv.
pub fn password_from_env() -> Result<String, ServerError> {
    require_password(std::env::var(PASSWORD_ENV).ok())
}

fn require_password(value: Option<String>) -> Result<String, ServerError> {
    match value {
        Some(password) if !password.is_empty() => Ok(password),
        _ => Err(ServerError::Config(format!("{PASSWORD_ENV} is not set"))),
    }
}

/// Read and unwrap the CA key at `path`.
///
/// The CA certificate is built for the current time of `env`.
pub fn load_ca_key<E: Environment>(
    path: &Path,
    password: &str,
    identity: CaIdentity,
    env: &E,
) -> Result<CaKey, ServerError> {
    let blob = std::fs::read_to_string(path)
        .map_err(|e| ServerError::Config(format!("cannot read {}: {e}", path.display())))?;

    Ok(CaKey::from_protected_pem(&blob, password, identity, env.wall_clock_millis())?)
}

/// Generate a fresh P-256 key and return it KeyGuard-wrapped.
pub fn generate_protected_key<E: Environment>(
    env: &E,
    password: &str,
) -> Result<String, ServerError> {
    let key = random_signing_key(env);
    let pem = key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| ServerError::Config(format!("cannot encode key: {e}")))?;

    Ok(wrap_private_key_pem(&pem, password)?)
}

/// Wrap an existing cleartext PKCS#8 PEM.
///
/// The input must parse as a P-256 key, so a wrapped blob is always loadable
/// with the same password.
pub fn wrap_existing_key(pkcs8_pem: &str, password: &str) -> Result<String, ServerError> {
    use p256::pkcs8::DecodePrivateKey;

    SigningKey::from_pkcs8_pem(pkcs8_pem)
        .map_err(|_| ServerError::Config("input is not a P-256 PKCS#8 private key".into()))?;

    Ok(wrap_private_key_pem(pkcs8_pem, password)?)
}

/// Rejection-sample a scalar from `env`'s randomness.
fn random_signing_key<E: Environment>(env: &E) -> SigningKey {
    loop {
        let mut bytes = [0u8; 32];
        env.random_bytes(&mut bytes);
        if let Ok(key) = SigningKey::from_slice(&bytes) {
            return key;
        }
    }
}
