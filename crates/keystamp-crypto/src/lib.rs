//! Keystamp Cryptographic Primitives
//!
//! Pure building blocks for the keystamp certificate authority. Nothing in
//! this crate touches the clock, the network or storage; callers provide
//! timestamps and randomness.
//!
//! # Pieces
//!
//! ```text
//! protected PEM ──KeyGuard──▶ PKCS#8 PEM ──▶ CA signing key
//!
//! request ──canonical string──▶ ECDSA P-256 verify (DER or fixed pair)
//!
//! response payload ──canonical JSON──▶ ECDSA P-256 sign ──▶ envelope
//! ```
//!
//! - [`keyguard`]: at-rest obfuscation of the CA private key
//! - [`signature`]: public key parsing, signature normalization, verification
//! - [`canonical`]: deterministic JSON bytes shared by signer and verifiers
//! - [`armor`]: PEM framing with 64-column bodies
//! - [`fingerprint`]: SHA-256 hex digests for certificates and public keys

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod armor;
pub mod canonical;
pub mod fingerprint;
pub mod keyguard;
pub mod signature;

pub use armor::PemError;
pub use canonical::{canonical_json, canonical_json_bytes};
pub use fingerprint::sha256_hex;
pub use keyguard::{KeyGuardError, unwrap_private_key_pem, wrap_private_key_pem};
pub use signature::{
    KeyError, SignatureEncoding, SignatureError, decode_signature, fixed_pair_to_der,
    parse_public_key_pem, public_key_pem, verify_signature,
};
