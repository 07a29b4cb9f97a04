//! SHA-256 fingerprints.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `bytes`.
///
/// Used for certificate digests (over the DER encoding) and public key
/// digests (over the PEM string as submitted).
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
