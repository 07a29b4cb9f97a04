//! Error types for the keystamp protocol core.
//!
//! [`AuthorityError`] covers everything a request can fail with. Each
//! variant carries detail for logs, while [`AuthorityError::message`] gives
//! the short fixed string that is allowed to reach a client.
//!
//! [`KeyLoadError`] is separate: it only happens at startup and stops the
//! process.

use keystamp_crypto::{KeyError, KeyGuardError, SignatureError};
use thiserror::Error;

/// Errors returned by the authority's operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorityError {
    /// Uid already has an active certificate.
    ///
    /// Registration is one-shot; the principal must be revoked first.
    #[error("principal {uid} is already registered")]
    DuplicatePrincipal {
        /// Requested uid
        uid: String,
    },

    /// No active principal with this uid.
    #[error("principal {uid} not found")]
    PrincipalNotFound {
        /// Requested uid
        uid: String,
    },

    /// Public key is malformed or not on P-256.
    #[error("invalid public key: {0}")]
    InvalidKey(KeyError),

    /// Client timestamp is too far from the server clock.
    ///
    /// Transient from the client's point of view: re-sign with a fresh
    /// timestamp.
    #[error("signature timestamp {timestamp} outside freshness window at {now}")]
    StaleSignature {
        /// Client timestamp (ms)
        timestamp: i64,
        /// Server clock when checked (ms)
        now: i64,
    },

    /// Client timestamp does not advance the principal's watermark.
    #[error("timestamp {timestamp} does not exceed watermark {watermark}")]
    ReplayedTimestamp {
        /// Client timestamp (ms)
        timestamp: i64,
        /// Last accepted timestamp (ms)
        watermark: i64,
    },

    /// Signature is undecodable or does not verify.
    #[error("invalid signature: {0}")]
    InvalidSignature(SignatureError),

    /// Uid is empty, too long or contains control characters.
    #[error("invalid uid")]
    InvalidUid,

    /// Request could not be parsed.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Certificate construction failed.
    ///
    /// Indicates a bug or a broken CA key, not a client mistake.
    #[error("certificate issuance failed: {0}")]
    Issuance(String),

    /// Ledger did not answer in time or reported an I/O failure.
    ///
    /// Transient - the client may retry the whole request.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Revocation was recorded but the principal row could not be removed.
    ///
    /// The certificate is revoked; the stale principal row needs operator
    /// cleanup.
    #[error("revocation of {uid} incomplete ({cert_digest} recorded): {reason}")]
    PartialRevocation {
        /// Principal being revoked
        uid: String,
        /// Digest already present in the revocation ledger
        cert_digest: String,
        /// Storage failure that interrupted the revocation
        reason: String,
    },
}

impl AuthorityError {
    /// Short fixed message safe to return to clients.
    pub fn message(&self) -> &'static str {
        match self {
            Self::DuplicatePrincipal { .. } => "uid already in use.",
            Self::PrincipalNotFound { .. } => "uid not exists.",
            Self::InvalidKey(KeyError::Malformed) => "pubkey load failed.",
            Self::InvalidKey(KeyError::WrongCurve) => "pubkey should be ECDSA P-256.",
            Self::StaleSignature { .. } => "sig expired.",
            Self::ReplayedTimestamp { .. } => "invalid timestamp.",
            Self::InvalidSignature(_) => "invalid signature.",
            Self::InvalidUid => "invalid uid.",
            Self::MalformedRequest(_) => "invalid request.",
            Self::Issuance(_) => "certificate issuance failed.",
            Self::StorageUnavailable(_) => "storage unavailable.",
            Self::PartialRevocation { .. } => "revocation incomplete.",
        }
    }

    /// Caused by the request itself rather than the service.
    pub fn is_domain(&self) -> bool {
        !matches!(
            self,
            Self::Issuance(_) | Self::StorageUnavailable(_) | Self::PartialRevocation { .. }
        )
    }

    /// Retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

/// Errors loading the CA key at startup. All fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyLoadError {
    /// Protected blob could not be unwrapped
    #[error("CA key blob: {0}")]
    Blob(#[from] KeyGuardError),

    /// Unwrapped bytes are not a P-256 PKCS#8 private key (often a wrong
    /// password)
    #[error("CA key is not a P-256 PKCS#8 private key")]
    InvalidKey,

    /// CA certificate could not be built from the key
    #[error("CA certificate: {0}")]
    Certificate(String),
}
