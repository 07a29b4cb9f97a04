//! Keystamp Protocol Core
//!
//! The certificate authority's protocol logic with no I/O: request
//! authentication, certificate issuance and response sealing. Storage, HTTP
//! and the real clock live in `keystamp-server`; everything here takes an
//! [`Environment`] or explicit timestamps so simulations stay deterministic.
//!
//! # Flow
//!
//! ```text
//! register:  uid + pubkey + sig ──Authenticator──▶ issue_certificate ──▶ row
//! revoke:    uid + sig ──(stored key, watermark)──Authenticator──▶ revocation record
//! any reply: payload ──seal──▶ SignedEnvelope { data, sig }
//! ```
//!
//! - [`authenticator`]: freshness window, replay watermark, signature check
//! - [`issuer`]: leaf certificates signed by the CA key
//! - [`envelope`]: CA-signed response envelopes
//! - [`ca`]: CA key loading and the self-signed CA certificate
//! - [`principal`]: ledger row types
//! - [`env`]: clock, sleep and randomness seam

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod authenticator;
pub mod ca;
pub mod env;
pub mod envelope;
pub mod error;
pub mod issuer;
pub mod principal;

pub use authenticator::{
    Authenticator, Claim, DEFAULT_FRESHNESS_WINDOW, Operation, RequestSignature,
    canonical_message,
};
pub use ca::{CaIdentity, CaKey};
pub use env::Environment;
pub use envelope::{RESULT_FAILED, RESULT_OK, SignedEnvelope, seal, verify_envelope};
pub use error::{AuthorityError, KeyLoadError};
pub use issuer::{IssuedCertificate, issue_certificate};
pub use principal::{MAX_UID_LEN, Principal, Revocation, pubkey_digest, validate_uid};
