//! Signed response envelopes.
//!
//! Every response the CA sends, errors included, is sealed:
//!
//! ```text
//! { "data": { ...payload, "timestamp": <ms> },
//!   "sig":  base64(DER ECDSA-P256-SHA256(canonical_json(data))) }
//! ```
//!
//! Anyone holding the CA public key can check that a response really came
//! from this CA and was not altered, including "uid not exists." answers.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use keystamp_crypto::{SignatureEncoding, canonical_json_bytes, decode_signature, verify_signature};
use p256::ecdsa::VerifyingKey;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ca::CaKey;

/// Field injected into every sealed payload.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Result code for success.
pub const RESULT_OK: u8 = 0;

/// Result code for failure.
pub const RESULT_FAILED: u8 = 1;

/// A CA-attested response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    /// Payload plus the injected timestamp
    pub data: Map<String, Value>,
    /// Base64 DER signature over the canonical JSON of `data`
    pub sig: String,
}

impl SignedEnvelope {
    /// The `result` code, if present.
    pub fn result(&self) -> Option<u64> {
        self.data.get("result").and_then(Value::as_u64)
    }

    /// The sealing time.
    pub fn timestamp(&self) -> Option<i64> {
        self.data.get(TIMESTAMP_FIELD).and_then(Value::as_i64)
    }
}

/// Seal `payload` at `now_ms`.
///
/// Any `timestamp` already in the payload is overwritten.
pub fn seal(ca: &CaKey, mut payload: Map<String, Value>, now_ms: i64) -> SignedEnvelope {
    payload.insert(TIMESTAMP_FIELD.to_string(), Value::from(now_ms));

    let signature = ca.sign(&canonical_json_bytes(&payload));

    SignedEnvelope { data: payload, sig: STANDARD.encode(signature.to_der().as_bytes()) }
}

/// Check an envelope against the CA public key.
pub fn verify_envelope(ca_key: &VerifyingKey, envelope: &SignedEnvelope) -> bool {
    decode_signature(&envelope.sig, SignatureEncoding::Der)
        .and_then(|signature| {
            verify_signature(ca_key, &canonical_json_bytes(&envelope.data), &signature)
        })
        .is_ok()
}
