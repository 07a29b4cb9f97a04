//! Request authentication.
//!
//! Mutating requests are signed by the principal's own key over
//!
//! ```text
//! "{timestamp}||{uid}||{pubkey}||{operation}"
//! ```
//!
//! where `timestamp` and `uid` come from the request and `pubkey` from the
//! stored principal (or from the request itself during registration).
//!
//! # Check order
//!
//! 1. Freshness: `|now - timestamp|` within the window
//! 2. Monotonicity: `timestamp` strictly above the principal's watermark
//! 3. Public key parses and is P-256
//! 4. Signature decodes (re-encoding fixed pairs) and verifies
//!
//! The cheap clock checks run before anything is parsed, for registration
//! and revocation alike.
//!
//! Freshness alone leaves a replay window; the watermark closes it per
//! principal. Callers advance the watermark only after the whole operation
//! succeeds, and serialize same-principal requests around this check.

use std::time::Duration;

use keystamp_crypto::{SignatureEncoding, decode_signature, parse_public_key_pem, verify_signature};
use p256::ecdsa::VerifyingKey;
use serde::{Deserialize, Serialize};

use crate::{error::AuthorityError, principal::Principal};

/// Default freshness window.
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(30);

/// Authenticated operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Certificate issuance for a new principal
    Register,
    /// Revocation of an active principal
    Revoke,
}

impl Operation {
    /// Label bound into the canonical message.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Register => "POST:/user",
            Self::Revoke => "DELETE:/user",
        }
    }
}

/// Client-supplied signature object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSignature {
    /// Base64 signature bytes
    pub sig: String,
    /// Client timestamp, milliseconds
    pub timestamp: i64,
    /// DER unless the client says otherwise
    #[serde(default)]
    pub encoding: SignatureEncoding,
}

/// The principal a request claims to come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim<'a> {
    /// Uid from the current request
    pub uid: &'a str,
    /// Stored (or newly submitted) public key PEM
    pub pubkey: &'a str,
    /// Last accepted timestamp; 0 for unregistered principals
    pub watermark: i64,
}

impl<'a> Claim<'a> {
    /// A principal that does not exist yet.
    pub fn unregistered(uid: &'a str, pubkey: &'a str) -> Self {
        Self { uid, pubkey, watermark: 0 }
    }

    /// An active principal, addressed by the uid in the request.
    pub fn registered(uid: &'a str, principal: &'a Principal) -> Self {
        Self { uid, pubkey: &principal.pubkey, watermark: principal.timestamp }
    }
}

/// The exact string a client signs.
pub fn canonical_message(timestamp: i64, uid: &str, pubkey: &str, operation: Operation) -> String {
    format!("{timestamp}||{uid}||{pubkey}||{}", operation.label())
}

/// Verifies request signatures against a freshness window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authenticator {
    window_ms: u64,
}

impl Default for Authenticator {
    fn default() -> Self {
        Self::new(DEFAULT_FRESHNESS_WINDOW)
    }
}

impl Authenticator {
    /// Authenticator accepting timestamps within `window` of the server clock.
    pub fn new(window: Duration) -> Self {
        Self { window_ms: u64::try_from(window.as_millis()).unwrap_or(u64::MAX) }
    }

    /// Freshness window.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Reject timestamps more than the window away from `now_ms`.
    pub fn check_freshness(&self, timestamp: i64, now_ms: i64) -> Result<(), AuthorityError> {
        if now_ms.abs_diff(timestamp) > self.window_ms {
            return Err(AuthorityError::StaleSignature { timestamp, now: now_ms });
        }
        Ok(())
    }

    /// Authenticate `signature` for `operation` on behalf of `claim`.
    ///
    /// Returns the parsed public key so callers need not parse it again.
    pub fn authenticate(
        &self,
        claim: &Claim<'_>,
        operation: Operation,
        signature: &RequestSignature,
        now_ms: i64,
    ) -> Result<VerifyingKey, AuthorityError> {
        self.check_freshness(signature.timestamp, now_ms)?;

        if signature.timestamp <= claim.watermark {
            return Err(AuthorityError::ReplayedTimestamp {
                timestamp: signature.timestamp,
                watermark: claim.watermark,
            });
        }

        let key = parse_public_key_pem(claim.pubkey).map_err(AuthorityError::InvalidKey)?;

        let parsed = decode_signature(&signature.sig, signature.encoding)
            .map_err(AuthorityError::InvalidSignature)?;

        let message = canonical_message(signature.timestamp, claim.uid, claim.pubkey, operation);
        verify_signature(&key, message.as_bytes(), &parsed)
            .map_err(AuthorityError::InvalidSignature)?;

        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use keystamp_crypto::{KeyError, SignatureError, public_key_pem};
    use p256::ecdsa::{Signature, SigningKey, signature::Signer};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    const NOW_MS: i64 = 1_700_000_000_000;

    fn keypair(seed: u64) -> (SigningKey, String) {
        let key = SigningKey::random(&mut ChaCha8Rng::seed_from_u64(seed));
        let pem = public_key_pem(key.verifying_key());
        (key, pem)
    }

    fn sign(
        key: &SigningKey,
        uid: &str,
        pubkey: &str,
        operation: Operation,
        timestamp: i64,
        encoding: SignatureEncoding,
    ) -> RequestSignature {
        let message = canonical_message(timestamp, uid, pubkey, operation);
        let signature: Signature = key.sign(message.as_bytes());
        let sig = match encoding {
            SignatureEncoding::Der => STANDARD.encode(signature.to_der().as_bytes()),
            SignatureEncoding::FixedPair => STANDARD.encode(signature.to_bytes()),
        };
        RequestSignature { sig, timestamp, encoding }
    }

    fn signed(key: &SigningKey, uid: &str, pubkey: &str, op: Operation) -> RequestSignature {
        sign(key, uid, pubkey, op, NOW_MS, SignatureEncoding::Der)
    }

    fn check(
        claim: &Claim<'_>,
        op: Operation,
        signature: &RequestSignature,
    ) -> Result<VerifyingKey, AuthorityError> {
        Authenticator::default().authenticate(claim, op, signature, NOW_MS)
    }

    #[test]
    fn canonical_message_layout() {
        assert_eq!(
            canonical_message(42, "alice", "PEM", Operation::Revoke),
            "42||alice||PEM||DELETE:/user"
        );
    }

    #[test]
    fn accepts_fresh_signature() {
        let (key, pem) = keypair(1);
        let signature = signed(&key, "alice", &pem, Operation::Register);

        let verified =
            check(&Claim::unregistered("alice", &pem), Operation::Register, &signature).unwrap();
        assert_eq!(&verified, key.verifying_key());
    }

    #[test]
    fn accepts_fixed_pair_signature() {
        let (key, pem) = keypair(2);
        let signature =
            sign(&key, "alice", &pem, Operation::Register, NOW_MS, SignatureEncoding::FixedPair);

        let claim = Claim::unregistered("alice", &pem);
        assert!(check(&claim, Operation::Register, &signature).is_ok());
    }

    #[test]
    fn window_edges() {
        let auth = Authenticator::default();
        assert!(auth.check_freshness(NOW_MS - 30_000, NOW_MS).is_ok());
        assert!(auth.check_freshness(NOW_MS + 30_000, NOW_MS).is_ok());
        assert!(auth.check_freshness(NOW_MS - 30_001, NOW_MS).is_err());
        assert!(auth.check_freshness(NOW_MS + 30_001, NOW_MS).is_err());
    }

    #[test]
    fn stale_beats_everything_else() {
        let (key, pem) = keypair(3);
        let timestamp = NOW_MS - 60_000;
        let signature =
            sign(&key, "alice", &pem, Operation::Revoke, timestamp, SignatureEncoding::Der);

        // Watermark above the timestamp and a broken key: still reported stale
        let claim = Claim { uid: "alice", pubkey: "not a key", watermark: NOW_MS };
        let result = check(&claim, Operation::Revoke, &signature);
        assert!(matches!(result, Err(AuthorityError::StaleSignature { .. })));
    }

    #[test]
    fn replay_detected_before_key_parsing() {
        let (key, pem) = keypair(4);
        let signature = signed(&key, "alice", &pem, Operation::Revoke);

        let claim = Claim { uid: "alice", pubkey: "not a key", watermark: NOW_MS };
        assert_eq!(
            check(&claim, Operation::Revoke, &signature).err(),
            Some(AuthorityError::ReplayedTimestamp { timestamp: NOW_MS, watermark: NOW_MS })
        );
    }

    #[test]
    fn bad_key_reported_before_signature() {
        let (key, pem) = keypair(5);
        let signature = signed(&key, "alice", &pem, Operation::Register);

        let broken = "-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----\n";
        let claim = Claim::unregistered("alice", broken);
        assert_eq!(
            check(&claim, Operation::Register, &signature).err(),
            Some(AuthorityError::InvalidKey(KeyError::Malformed))
        );
    }

    #[test]
    fn operation_label_is_bound() {
        let (key, pem) = keypair(6);
        let signature = signed(&key, "alice", &pem, Operation::Register);

        assert_eq!(
            check(&Claim::unregistered("alice", &pem), Operation::Revoke, &signature).err(),
            Some(AuthorityError::InvalidSignature(SignatureError::Mismatch))
        );
    }

    #[test]
    fn uid_is_bound() {
        let (key, pem) = keypair(7);
        let signature = signed(&key, "alice", &pem, Operation::Register);

        assert_eq!(
            check(&Claim::unregistered("mallory", &pem), Operation::Register, &signature).err(),
            Some(AuthorityError::InvalidSignature(SignatureError::Mismatch))
        );
    }

    #[test]
    fn registered_claim_uses_stored_key_and_watermark() {
        let principal = Principal::new("alice", "PEM", "digest", 77);
        let claim = Claim::registered("alice", &principal);
        assert_eq!(claim.pubkey, "PEM");
        assert_eq!(claim.watermark, 77);
    }

    #[test]
    fn custom_window() {
        let auth = Authenticator::new(Duration::from_secs(5));
        assert_eq!(auth.window(), Duration::from_secs(5));
        assert!(auth.check_freshness(NOW_MS - 6_000, NOW_MS).is_err());
    }
}
