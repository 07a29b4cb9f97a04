//! Simulated principals.
//!
//! A [`TestClient`] holds a P-256 key and produces request signatures the
//! way a real client would: over the canonical message, in DER or in the
//! fixed 64-byte form.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use keystamp_core::{Operation, RequestSignature, canonical_message};
use keystamp_crypto::{SignatureEncoding, public_key_pem};
use p256::ecdsa::{Signature, SigningKey, signature::Signer};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// A principal with its own key.
#[derive(Clone)]
pub struct TestClient {
    uid: String,
    key: SigningKey,
    pubkey: String,
}

impl std::fmt::Debug for TestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestClient").field("uid", &self.uid).finish_non_exhaustive()
    }
}

impl TestClient {
    /// Client `uid` with a key derived from `seed`.
    pub fn new(uid: impl Into<String>, seed: u64) -> Self {
        let key = SigningKey::random(&mut ChaCha8Rng::seed_from_u64(seed));
        let pubkey = public_key_pem(key.verifying_key());
        Self { uid: uid.into(), key, pubkey }
    }

    /// Same key, different uid.
    pub fn renamed(&self, uid: impl Into<String>) -> Self {
        Self { uid: uid.into(), ..self.clone() }
    }

    /// Uid this client claims.
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Public key PEM sent at registration.
    pub fn pubkey(&self) -> &str {
        &self.pubkey
    }

    /// Signing key.
    pub fn signing_key(&self) -> &SigningKey {
        &self.key
    }

    /// DER signature for `operation` at `timestamp`.
    pub fn sign(&self, operation: Operation, timestamp: i64) -> RequestSignature {
        self.sign_encoded(operation, timestamp, SignatureEncoding::Der)
    }

    /// Signature for `operation` at `timestamp` in the given encoding.
    pub fn sign_encoded(
        &self,
        operation: Operation,
        timestamp: i64,
        encoding: SignatureEncoding,
    ) -> RequestSignature {
        let message = canonical_message(timestamp, &self.uid, &self.pubkey, operation);
        let signature: Signature = self.key.sign(message.as_bytes());
        let sig = match encoding {
            SignatureEncoding::Der => STANDARD.encode(signature.to_der().as_bytes()),
            SignatureEncoding::FixedPair => STANDARD.encode(signature.to_bytes()),
        };
        RequestSignature { sig, timestamp, encoding }
    }

    /// Signature made with this client's key over another principal's
    /// claim. Models a client that knows a victim's uid and public key but
    /// not its private key.
    pub fn forge_for(
        &self,
        victim: &TestClient,
        operation: Operation,
        timestamp: i64,
    ) -> RequestSignature {
        let message = canonical_message(timestamp, &victim.uid, &victim.pubkey, operation);
        let signature: Signature = self.key.sign(message.as_bytes());
        RequestSignature {
            sig: STANDARD.encode(signature.to_der().as_bytes()),
            timestamp,
            encoding: SignatureEncoding::Der,
        }
    }
}
