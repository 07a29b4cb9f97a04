//! Standard invariant checks.

use std::collections::HashSet;

use keystamp_core::pubkey_digest;

use super::{Invariant, InvariantResult, LedgerSnapshot, Violation};

/// No active principal holds a revoked certificate.
///
/// Revocation must remove the principal; a digest that is both live and
/// revoked means a revocation stopped halfway.
pub struct NoLiveRevokedCertificate;

impl Invariant for NoLiveRevokedCertificate {
    fn name(&self) -> &'static str {
        "no_live_revoked_certificate"
    }

    fn check(&self, state: &LedgerSnapshot) -> InvariantResult {
        let revoked: HashSet<&str> =
            state.revocations.iter().map(|r| r.cert_digest.as_str()).collect();

        match state.principals.iter().find(|p| revoked.contains(p.cert_digest.as_str())) {
            Some(p) => Err(Violation {
                invariant: self.name(),
                message: format!("principal {} holds revoked cert {}", p.uid, p.cert_digest),
            }),
            None => Ok(()),
        }
    }
}

/// Every live certificate digest belongs to exactly one principal.
pub struct UniqueCertificates;

impl Invariant for UniqueCertificates {
    fn name(&self) -> &'static str {
        "unique_certificates"
    }

    fn check(&self, state: &LedgerSnapshot) -> InvariantResult {
        let mut seen = HashSet::new();
        for principal in &state.principals {
            if !seen.insert(principal.cert_digest.as_str()) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("cert {} issued twice", principal.cert_digest),
                });
            }
        }
        Ok(())
    }
}

/// The public key index matches the stored key.
pub struct PubkeyIndexConsistent;

impl Invariant for PubkeyIndexConsistent {
    fn name(&self) -> &'static str {
        "pubkey_index_consistent"
    }

    fn check(&self, state: &LedgerSnapshot) -> InvariantResult {
        for principal in &state.principals {
            if principal.pubkey_digest != pubkey_digest(&principal.pubkey) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("principal {}: stale pubkey digest", principal.uid),
                });
            }
        }
        Ok(())
    }
}

/// Revocation times come from the server clock, so none lies in the future.
pub struct RevocationsNotInFuture;

impl Invariant for RevocationsNotInFuture {
    fn name(&self) -> &'static str {
        "revocations_not_in_future"
    }

    fn check(&self, state: &LedgerSnapshot) -> InvariantResult {
        match state.revocations.iter().find(|r| r.timestamp > state.now_ms) {
            Some(r) => Err(Violation {
                invariant: self.name(),
                message: format!(
                    "revocation of {} at {} after now {}",
                    r.cert_digest, r.timestamp, state.now_ms
                ),
            }),
            None => Ok(()),
        }
    }
}
