//! Ledger rows.

use keystamp_crypto::sha256_hex;
use serde::{Deserialize, Serialize};

use crate::error::AuthorityError;

/// Longest uid accepted, in characters (X.509 `ub-common-name`).
pub const MAX_UID_LEN: usize = 64;

/// A registered identity holding one active certificate.
///
/// `timestamp` is the replay watermark: the last client timestamp accepted
/// for this principal. It never decreases while the row exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Unique identifier, also the certificate's common name
    pub uid: String,
    /// SubjectPublicKeyInfo PEM as submitted at registration
    pub pubkey: String,
    /// SHA-256 fingerprint (hex) of the issued certificate
    pub cert_digest: String,
    /// SHA-256 (hex) of `pubkey`, used as the lookup index
    pub pubkey_digest: String,
    /// Watermark, milliseconds
    pub timestamp: i64,
}

impl Principal {
    /// Build a row, deriving `pubkey_digest` from `pubkey`.
    pub fn new(
        uid: impl Into<String>,
        pubkey: impl Into<String>,
        cert_digest: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        let pubkey = pubkey.into();
        let pubkey_digest = pubkey_digest(&pubkey);
        Self { uid: uid.into(), pubkey, cert_digest: cert_digest.into(), pubkey_digest, timestamp }
    }
}

/// A revoked certificate. Append-only; never removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revocation {
    /// Fingerprint of the revoked certificate
    pub cert_digest: String,
    /// Server time of revocation, milliseconds
    pub timestamp: i64,
}

/// Index key for a public key PEM string.
pub fn pubkey_digest(pubkey: &str) -> String {
    sha256_hex(pubkey.as_bytes())
}

/// Accept uids that fit in a certificate common name.
pub fn validate_uid(uid: &str) -> Result<(), AuthorityError> {
    if uid.is_empty() || uid.chars().count() > MAX_UID_LEN || uid.chars().any(char::is_control) {
        return Err(AuthorityError::InvalidUid);
    }
    Ok(())
}
