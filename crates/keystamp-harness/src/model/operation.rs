//! Operations for model-based testing.
//!
//! Operations represent everything a client (or the passage of time) can do
//! to the authority. They are generated randomly and applied to both the
//! model and the real implementation.

use arbitrary::Arbitrary;
use keystamp_core::AuthorityError;

/// Client identifier, reduced modulo the number of clients.
pub type ClientId = u8;

/// Operations that can be applied to the system.
#[derive(Debug, Clone, Arbitrary)]
pub enum Operation {
    /// Client registers its uid and key, signed at the current time.
    Register {
        /// Client registering
        client_id: ClientId,
        /// Send the signature as a fixed 64-byte pair instead of DER
        fixed_pair: bool,
    },

    /// Client revokes its own certificate, signed at the current time.
    Revoke {
        /// Client revoking
        client_id: ClientId,
    },

    /// Client re-sends a revocation carrying its last accepted timestamp.
    ReplayRevoke {
        /// Client whose watermark is replayed
        client_id: ClientId,
    },

    /// Attacker signs a revocation for the victim with its own key.
    ForgedRevoke {
        /// Signer
        attacker_id: ClientId,
        /// Principal whose uid and key are claimed
        victim_id: ClientId,
    },

    /// Client registers with a timestamp older than the freshness window.
    StaleRegister {
        /// Client registering
        client_id: ClientId,
        /// Extra seconds beyond the window
        late_secs: u8,
    },

    /// Advance simulation time.
    AdvanceTime {
        /// Milliseconds to advance
        millis: u16,
    },
}

/// Result of applying an operation.
pub type OperationResult = Result<(), OperationError>;

/// Coarse error classes compared between model and implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationError {
    /// Uid already active
    Duplicate,
    /// Uid not active
    NotFound,
    /// Timestamp outside the freshness window
    Stale,
    /// Timestamp at or below the watermark
    Replayed,
    /// Signature did not verify
    BadSignature,
    /// Public key rejected
    BadKey,
    /// Anything the model never produces
    Unexpected,
}

impl From<&AuthorityError> for OperationError {
    fn from(error: &AuthorityError) -> Self {
        match error {
            AuthorityError::DuplicatePrincipal { .. } => Self::Duplicate,
            AuthorityError::PrincipalNotFound { .. } => Self::NotFound,
            AuthorityError::StaleSignature { .. } => Self::Stale,
            AuthorityError::ReplayedTimestamp { .. } => Self::Replayed,
            AuthorityError::InvalidSignature(_) => Self::BadSignature,
            AuthorityError::InvalidKey(_) => Self::BadKey,
            _ => Self::Unexpected,
        }
    }
}

#[cfg(test)]
mod tests {
    use arbitrary::Unstructured;

    use super::*;

    #[test]
    fn operations_generate_from_bytes() {
        let bytes: Vec<u8> = (0..=255).collect();
        let mut u = Unstructured::new(&bytes);
        let ops: Vec<Operation> =
            (0..10).filter_map(|_| Operation::arbitrary(&mut u).ok()).collect();
        assert!(!ops.is_empty());
    }

    #[test]
    fn storage_errors_are_unexpected() {
        let error = AuthorityError::StorageUnavailable("down".into());
        assert_eq!(OperationError::from(&error), OperationError::Unexpected);
    }
}
