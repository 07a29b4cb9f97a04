//! At-rest protection for the CA private key.
//!
//! The CA key lives on disk as a PEM block whose body is a PKCS#8 DER
//! encoding XORed with a password-derived keystream:
//!
//! ```text
//! keystream = PBKDF2-HMAC-SHA256(password, KEYGUARD_SALT, 1926, len(body))
//! stored    = base64(pkcs8_der XOR keystream), framed as PRIVATE KEY
//! ```
//!
//! # Security
//!
//! This is obfuscation, not authenticated encryption. The salt is fixed, the
//! iteration count is low and a wrong password is only detected because the
//! unmasked bytes fail to parse as a key. It keeps the key from sitting in
//! cleartext on disk; it does not stand up to an attacker who can read the
//! file and spend CPU time on the password. The parameters are fixed so
//! existing wrapped keys keep loading.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::armor::{self, PemError};

/// PBKDF2 salt shared by every wrapped key.
pub const KEYGUARD_SALT: [u8; 16] = [
    0x8d, 0x6f, 0x53, 0x6c, 0x13, 0x68, 0x15, 0x42, 0x32, 0x16, 0x8d, 0x2e, 0xac, 0x2d, 0x4f, 0x96,
];

/// PBKDF2 iteration count.
pub const KEYGUARD_ITERATIONS: u32 = 1926;

/// PEM label used for both the wrapped and the unwrapped form.
pub const PRIVATE_KEY_LABEL: &str = "PRIVATE KEY";

/// Errors from wrapping or unwrapping a key blob.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyGuardError {
    /// Blob is not PEM framed as a private key
    #[error("key blob framing: {0}")]
    Pem(#[from] PemError),

    /// PEM body decoded to zero bytes
    #[error("key blob is empty")]
    Empty,
}

/// Derive `len` bytes of keystream from `password`.
pub fn derive_keystream(password: &str, len: usize) -> Zeroizing<Vec<u8>> {
    let mut stream = Zeroizing::new(vec![0u8; len]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &KEYGUARD_SALT, KEYGUARD_ITERATIONS, &mut stream);
    stream
}

/// Recover the cleartext PKCS#8 PEM from a wrapped blob.
///
/// A wrong password still yields a well-formed PEM; the garbage inside fails
/// later when parsed as a key.
pub fn unwrap_private_key_pem(
    blob: &str,
    password: &str,
) -> Result<Zeroizing<String>, KeyGuardError> {
    let masked = Zeroizing::new(armor::decode(blob, PRIVATE_KEY_LABEL)?);
    let clear = apply_mask(&masked, password)?;

    Ok(Zeroizing::new(armor::encode(PRIVATE_KEY_LABEL, &clear)))
}

/// Wrap a cleartext PKCS#8 PEM for storage on disk.
///
/// The mask is an involution, so this is the same transform as
/// [`unwrap_private_key_pem`] applied to cleartext input.
pub fn wrap_private_key_pem(pkcs8_pem: &str, password: &str) -> Result<String, KeyGuardError> {
    let clear = Zeroizing::new(armor::decode(pkcs8_pem, PRIVATE_KEY_LABEL)?);
    let masked = apply_mask(&clear, password)?;

    Ok(armor::encode(PRIVATE_KEY_LABEL, &masked))
}

fn apply_mask(input: &[u8], password: &str) -> Result<Zeroizing<Vec<u8>>, KeyGuardError> {
    if input.is_empty() {
        return Err(KeyGuardError::Empty);
    }

    let keystream = derive_keystream(password, input.len());
    let output = input.iter().zip(keystream.iter()).map(|(byte, mask)| byte ^ mask).collect();

    Ok(Zeroizing::new(output))
}
