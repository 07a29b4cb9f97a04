//! PEM armor for key material.
//!
//! Framing goes through the `pem` crate; this module only pins the output
//! shape (LF line endings, 64-column bodies) and picks the block with the
//! wanted label. Surrounding whitespace on each line is dropped before
//! parsing so hand-edited key files still load.

use ::pem::{EncodeConfig, LineEnding, Pem};
use thiserror::Error;
use zeroize::Zeroizing;

/// Line width of PEM bodies.
pub const LINE_WIDTH: usize = 64;

/// Errors from PEM decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PemError {
    /// No well-formed block carries the wanted label
    #[error("no PEM block labelled {0}")]
    MissingBlock(String),

    /// Framing or base64 body is broken
    #[error("malformed PEM: {0}")]
    Malformed(String),
}

/// Decode the first block labelled `label` into its DER bytes.
pub fn decode(text: &str, label: &str) -> Result<Vec<u8>, PemError> {
    let normalized: Vec<&str> = text.lines().map(str::trim).collect();
    let blocks =
        ::pem::parse_many(normalized.join("\n")).map_err(|e| PemError::Malformed(e.to_string()))?;

    blocks
        .into_iter()
        .find(|block| block.tag() == label)
        .map(Pem::into_contents)
        .ok_or_else(|| PemError::MissingBlock(label.to_string()))
}

/// Encode DER bytes as a PEM block with a trailing newline.
pub fn encode(label: &str, der: &[u8]) -> String {
    let block = Pem::new(label, der.to_vec());
    let text = ::pem::encode_config(&block, EncodeConfig::new().set_line_ending(LineEnding::LF));
    // the block holds a copy of possibly secret bytes
    drop(Zeroizing::new(block.into_contents()));
    text
}
