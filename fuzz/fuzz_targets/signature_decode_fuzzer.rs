//! Fuzz target for client signature decoding
//!
//! # Strategy
//!
//! - Raw bytes: arbitrary input to the fixed-pair re-encoder
//! - Base64 text: arbitrary strings in both encodings
//! - Valid pairs: 64-byte inputs that p256 accepts as scalars
//!
//! # Invariants
//!
//! - NEVER panic on malformed input
//! - Re-encoded DER of a valid pair parses to the same signature
//! - Both encodings of one signature decode identically

#![no_main]

use arbitrary::Arbitrary;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use keystamp_crypto::{SignatureEncoding, decode_signature, fixed_pair_to_der};
use libfuzzer_sys::fuzz_target;
use p256::ecdsa::Signature;

#[derive(Debug, Clone, Arbitrary)]
enum Input {
    RawPair { bytes: Vec<u8> },
    Text { encoded: String, fixed_pair: bool },
    Pair { r: [u8; 32], s: [u8; 32] },
}

fuzz_target!(|input: Input| {
    match input {
        Input::RawPair { bytes } => {
            if let Ok(der) = fixed_pair_to_der(&bytes) {
                assert_eq!(der[0], 0x30, "DER must start with SEQUENCE");
            }
        },
        Input::Text { encoded, fixed_pair } => {
            let encoding =
                if fixed_pair { SignatureEncoding::FixedPair } else { SignatureEncoding::Der };
            let _ = decode_signature(&encoded, encoding);
        },
        Input::Pair { r, s } => {
            let mut raw = [0u8; 64];
            raw[..32].copy_from_slice(&r);
            raw[32..].copy_from_slice(&s);

            let Ok(expected) = Signature::from_slice(&raw) else {
                return;
            };

            let der = fixed_pair_to_der(&raw).expect("valid pair must re-encode");
            assert_eq!(Signature::from_der(&der).expect("re-encoded DER must parse"), expected);

            let fixed = STANDARD.encode(raw);
            let der = STANDARD.encode(expected.to_der().as_bytes());
            let from_fixed = decode_signature(&fixed, SignatureEncoding::FixedPair).unwrap();
            let from_der = decode_signature(&der, SignatureEncoding::Der).unwrap();
            assert_eq!(from_fixed, from_der);
        },
    }
});
