//! ECDSA P-256 public keys and signatures.
//!
//! Clients sign requests either with the standard ASN.1 DER encoding or, as
//! browsers' WebCrypto does, with the fixed-length `r || s` pair. The
//! verifier only understands DER, so fixed pairs are re-encoded first.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use p256::{
    FieldBytes,
    ecdsa::{Signature, VerifyingKey, signature::Verifier},
    pkcs8::{
        DecodePublicKey, EncodePublicKey, LineEnding, ObjectIdentifier, der::Decode,
        spki::SubjectPublicKeyInfoRef,
    },
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::armor;

/// PEM label of a SubjectPublicKeyInfo.
pub const PUBLIC_KEY_LABEL: &str = "PUBLIC KEY";

/// `id-ecPublicKey`
pub const ID_EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

/// `secp256r1` / `prime256v1`
pub const SECP256R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");

/// Wire encoding of a client signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureEncoding {
    /// ASN.1 `SEQUENCE { r INTEGER, s INTEGER }`
    #[default]
    Der,
    /// Big-endian `r || s`, both halves the same length
    FixedPair,
}

/// Public key rejection reasons.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyError {
    /// Not a parsable PEM SubjectPublicKeyInfo
    #[error("public key is malformed")]
    Malformed,

    /// Parsable, but not an EC key on P-256
    #[error("public key is not ECDSA P-256")]
    WrongCurve,
}

/// Signature rejection reasons.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureError {
    /// Not valid base64
    #[error("signature is not valid base64")]
    Base64,

    /// Bytes do not form a signature in the declared encoding
    #[error("signature is malformed")]
    Malformed,

    /// Well-formed but does not verify
    #[error("signature does not verify")]
    Mismatch,
}

/// Parse a PEM SubjectPublicKeyInfo into a P-256 verifying key.
///
/// The algorithm identifier is inspected first so that well-formed keys of
/// another type report [`KeyError::WrongCurve`] rather than
/// [`KeyError::Malformed`].
pub fn parse_public_key_pem(pem_text: &str) -> Result<VerifyingKey, KeyError> {
    let der = armor::decode(pem_text, PUBLIC_KEY_LABEL).map_err(|_| KeyError::Malformed)?;
    let info = SubjectPublicKeyInfoRef::from_der(&der).map_err(|_| KeyError::Malformed)?;
    let (algorithm, curve) = info.algorithm.oids().map_err(|_| KeyError::Malformed)?;

    if algorithm != ID_EC_PUBLIC_KEY || curve != Some(SECP256R1) {
        return Err(KeyError::WrongCurve);
    }

    VerifyingKey::from_public_key_der(&der).map_err(|_| KeyError::Malformed)
}

/// PEM SubjectPublicKeyInfo for a P-256 key, uncompressed point, LF endings.
#[allow(clippy::expect_used)]
pub fn public_key_pem(key: &VerifyingKey) -> String {
    key.to_public_key_pem(LineEnding::LF)
        .expect("invariant: a P-256 point always encodes as SubjectPublicKeyInfo")
}

/// Re-encode a fixed-length `r || s` pair as ASN.1 DER.
pub fn fixed_pair_to_der(raw: &[u8]) -> Result<Vec<u8>, SignatureError> {
    Ok(fixed_pair_signature(raw)?.to_der().as_bytes().to_vec())
}

/// Split `raw` into equal halves and read each as a big-endian scalar.
fn fixed_pair_signature(raw: &[u8]) -> Result<Signature, SignatureError> {
    if raw.is_empty() || !raw.len().is_multiple_of(2) {
        return Err(SignatureError::Malformed);
    }

    let (r, s) = raw.split_at(raw.len() / 2);
    Signature::from_scalars(scalar_bytes(r)?, scalar_bytes(s)?)
        .map_err(|_| SignatureError::Malformed)
}

/// Strip leading zeros, then left-pad to the 32-byte field width.
fn scalar_bytes(half: &[u8]) -> Result<FieldBytes, SignatureError> {
    let first_nonzero = half.iter().position(|&b| b != 0).unwrap_or(half.len());
    let trimmed = &half[first_nonzero..];

    let mut bytes = FieldBytes::default();
    if trimmed.len() > bytes.len() {
        return Err(SignatureError::Malformed);
    }
    let offset = bytes.len() - trimmed.len();
    bytes[offset..].copy_from_slice(trimmed);
    Ok(bytes)
}

/// Decode a base64 client signature in the given encoding.
pub fn decode_signature(
    encoded: &str,
    encoding: SignatureEncoding,
) -> Result<Signature, SignatureError> {
    let raw = STANDARD.decode(encoded.trim()).map_err(|_| SignatureError::Base64)?;

    match encoding {
        SignatureEncoding::Der => Signature::from_der(&raw).map_err(|_| SignatureError::Malformed),
        SignatureEncoding::FixedPair => fixed_pair_signature(&raw),
    }
}

/// Verify `signature` over `message` (hashed with SHA-256).
pub fn verify_signature(
    key: &VerifyingKey,
    message: &[u8],
    signature: &Signature,
) -> Result<(), SignatureError> {
    key.verify(message, signature).map_err(|_| SignatureError::Mismatch)
}
