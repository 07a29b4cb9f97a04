//! Canonical JSON encoding for signed envelopes.
//!
//! Signer and verifiers must agree on the exact bytes, so the encoding is
//! pinned down here rather than left to a serializer's defaults:
//!
//! - object keys sorted by code point at every depth
//! - `", "` between items, `": "` between key and value
//! - only printable ASCII is emitted raw; everything else is `\uXXXX`
//!   (UTF-16 units, lowercase hex), with the usual short escapes for
//!   `"`, `\`, `\n`, `\r`, `\t`, `\b` and `\f`
//!
//! This is the layout produced by Python's `json.dumps(sort_keys=True)`, so
//! envelopes stay verifiable by clients written against the earlier service.
//! Bytes come out of `serde_json`'s own serializer with a custom
//! [`Formatter`]. Floats use its shortest round-trip form; the CA never
//! emits them.

use std::io::{self, Write};

use serde::{Serialize, Serializer};
use serde_json::{Map, Value, ser::Formatter};

/// Canonical encoding of any JSON value.
pub fn canonical_json(value: &Value) -> String {
    into_string(encode(&Sorted(value)))
}

/// Canonical encoding of an object, as the UTF-8 bytes that get signed.
pub fn canonical_json_bytes(object: &Map<String, Value>) -> Vec<u8> {
    encode(&SortedObject(object))
}

#[allow(clippy::expect_used)]
fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, SpacedAsciiFormatter);
    value
        .serialize(&mut serializer)
        .expect("invariant: JSON values with string keys serialize into a Vec");
    out
}

#[allow(clippy::expect_used)]
fn into_string(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).expect("invariant: canonical output is pure ASCII")
}

/// `", "` and `": "` separators; anything outside printable ASCII escaped.
///
/// `serde_json` already escapes quotes, backslashes and C0 controls the same
/// way; only the separators and the plain fragments between escapes differ.
struct SpacedAsciiFormatter;

impl Formatter for SpacedAsciiFormatter {
    fn begin_array_value<W: ?Sized + Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W: ?Sized + Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        for ch in fragment.chars() {
            if matches!(ch, ' '..='~') {
                writer.write_all(&[ch as u8])?;
            } else {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

/// Serializes a value with object keys sorted at every depth.
struct Sorted<'a>(&'a Value);

struct SortedObject<'a>(&'a Map<String, Value>);

impl Serialize for Sorted<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Value::Array(items) => serializer.collect_seq(items.iter().map(Sorted)),
            Value::Object(object) => SortedObject(object).serialize(serializer),
            scalar => scalar.serialize(serializer),
        }
    }
}

impl Serialize for SortedObject<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut entries: Vec<(&String, &Value)> = self.0.iter().collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
        serializer.collect_map(entries.into_iter().map(|(key, value)| (key, Sorted(value))))
    }
}
