//! # Lexicoder — order-preserving typed keys
//!
//! Maps typed [`Value`]s to byte strings whose plain lexicographic order
//! matches the values' natural order. Table primary keys are run through a
//! lexicoder so that every downstream structure (tablets, partitions, the
//! index tree) can compare keys with nothing but `[u8]` ordering.
//!
//! ## Contract
//!
//! For any two values `a`, `b` in a coder's domain:
//!
//! - `encode(a) <= encode(b)` (bytewise) **iff** `a <= b` (natural order)
//! - `decode(encode(a)) == a`
//!
//! ## Encodings
//!
//! | Coder     | Accepts          | Encoding                                        |
//! |-----------|------------------|-------------------------------------------------|
//! | `bytes`   | `Value::Bytes`   | identity                                        |
//! | `string`  | `Value::String`  | UTF-8 bytes (sorts by code point)               |
//! | `integer` | `Value::Int`     | sign/length header byte + minimal magnitude     |
//! | `long`    | `Value::Int`     | 8-byte big-endian, sign bit flipped             |
//! | `instant` | `Value::Int`     | as `long`; interpreted as millis since epoch    |
//! | `tuple`   | `Value::List`    | members escaped and `0x00`-terminated, in order |
//!
//! The integer coder writes a single header byte carrying the sign and the
//! magnitude length, then the minimal big-endian magnitude (complemented for
//! negatives). Shorter negative magnitudes get *larger* headers and shorter
//! positive magnitudes get *smaller* ones, so ordering falls out of the
//! header comparison before any magnitude byte is read.
//!
//! The tuple coder terminates every member encoding with `0x00` and escapes
//! embedded zero bytes as `0x00 0xFF`. The terminator guarantees that a
//! shorter tuple sorts before any tuple it prefixes, and the escape keeps
//! member comparisons consistent with their unescaped order.

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod value;

pub use value::Value;

/// Errors from encoding or decoding keys.
#[derive(Debug, Error)]
pub enum LexicoderError {
    /// The value is not in the coder's domain (wrong variant, or a tuple of
    /// the wrong arity).
    #[error("invalid value for {coder} lexicoder: got {found}")]
    InvalidValue {
        /// Name of the coder that rejected the value.
        coder: &'static str,
        /// Description of what was passed.
        found: String,
    },

    /// The encoded key ended before the coder finished reading it.
    #[error("encoded key truncated")]
    Truncated,

    /// The encoded bytes do not form a valid key for this coder.
    #[error("invalid key encoding: {0}")]
    InvalidEncoding(String),
}

/// Result alias for lexicoder operations.
pub type Result<T> = std::result::Result<T, LexicoderError>;

/// Tuple member separator / terminator byte.
const SEPARATOR: u8 = 0x00;
/// Second byte of the escape sequence for an embedded separator.
const ESCAPE: u8 = 0xFF;

/// Integer header for a non-negative value with a zero-length magnitude.
/// Non-negative headers are `0x80 + len`, negative headers are `0x7F - len`.
const INT_ZERO_HEADER: u8 = 0x80;

/// An order-preserving coder from [`Value`]s to byte-string keys.
///
/// The variant set is closed; the coder itself is serializable so table
/// parameters can persist which coder their primary key uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Lexicoder {
    /// Identity over byte strings.
    Bytes,
    /// UTF-8 strings, ordered by code point.
    String,
    /// Variable-length signed integers.
    Integer,
    /// Fixed-width signed 64-bit integers.
    Long,
    /// Points in time as millis since the Unix epoch, fixed-width.
    Instant,
    /// Heterogeneous fixed-arity tuples of the member coders.
    Tuple(Vec<Lexicoder>),
}

impl Lexicoder {
    /// Encodes `value` into a key.
    ///
    /// # Errors
    ///
    /// Returns [`LexicoderError::InvalidValue`] when `value` is not in this
    /// coder's domain.
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.encode_into(value, &mut out)?;
        Ok(out)
    }

    /// Decodes a key produced by [`encode`](Lexicoder::encode).
    ///
    /// # Errors
    ///
    /// Returns [`LexicoderError::Truncated`] or
    /// [`LexicoderError::InvalidEncoding`] when `bytes` is not a well-formed
    /// key for this coder.
    pub fn decode(&self, bytes: &[u8]) -> Result<Value> {
        match self {
            Lexicoder::Bytes => Ok(Value::Bytes(bytes.to_vec())),
            Lexicoder::String => {
                let s = std::str::from_utf8(bytes)
                    .map_err(|e| LexicoderError::InvalidEncoding(e.to_string()))?;
                Ok(Value::String(s.to_string()))
            }
            Lexicoder::Integer => decode_integer(bytes),
            Lexicoder::Long | Lexicoder::Instant => decode_long(bytes),
            Lexicoder::Tuple(members) => decode_tuple(members, bytes),
        }
    }

    /// Encodes `value` by appending to `out`.
    fn encode_into(&self, value: &Value, out: &mut Vec<u8>) -> Result<()> {
        match (self, value) {
            (Lexicoder::Bytes, Value::Bytes(b)) => {
                out.extend_from_slice(b);
                Ok(())
            }
            (Lexicoder::String, Value::String(s)) => {
                out.extend_from_slice(s.as_bytes());
                Ok(())
            }
            (Lexicoder::Integer, Value::Int(n)) => {
                encode_integer(*n, out);
                Ok(())
            }
            (Lexicoder::Long, Value::Int(n)) | (Lexicoder::Instant, Value::Int(n)) => {
                encode_long(*n, out);
                Ok(())
            }
            (Lexicoder::Tuple(members), Value::List(items)) => {
                if members.len() != items.len() {
                    return Err(LexicoderError::InvalidValue {
                        coder: "tuple",
                        found: format!(
                            "list of {} items (coder has {} members)",
                            items.len(),
                            members.len()
                        ),
                    });
                }
                for (member, item) in members.iter().zip(items) {
                    let mut element = Vec::new();
                    member.encode_into(item, &mut element)?;
                    escape_into(&element, out);
                    out.push(SEPARATOR);
                }
                Ok(())
            }
            (coder, other) => Err(LexicoderError::InvalidValue {
                coder: coder.name(),
                found: other.type_name().to_string(),
            }),
        }
    }

    /// Short name of this coder, used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Lexicoder::Bytes => "bytes",
            Lexicoder::String => "string",
            Lexicoder::Integer => "integer",
            Lexicoder::Long => "long",
            Lexicoder::Instant => "instant",
            Lexicoder::Tuple(_) => "tuple",
        }
    }
}

/// Writes the variable-length integer encoding of `n`.
///
/// Header byte: `0x80 + len` for `n >= 0`, `0x7F - len` for `n < 0`, where
/// `len` is the minimal big-endian byte length of the magnitude (complement
/// of the magnitude for negatives). Magnitude bytes follow, complemented for
/// negatives so that more-negative values sort first.
fn encode_integer(n: i64, out: &mut Vec<u8>) {
    if n >= 0 {
        let magnitude = minimal_be(n as u64);
        out.push(INT_ZERO_HEADER + magnitude.len() as u8);
        out.extend_from_slice(&magnitude);
    } else {
        // !n is the non-negative magnitude: -1 -> 0, i64::MIN -> i64::MAX.
        let magnitude = minimal_be(!n as u64);
        out.push(INT_ZERO_HEADER - 1 - magnitude.len() as u8);
        for byte in &magnitude {
            out.push(!byte);
        }
    }
}

/// Minimal big-endian representation of `n`; empty for zero.
fn minimal_be(n: u64) -> Vec<u8> {
    let bytes = n.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    bytes[skip..].to_vec()
}

fn decode_integer(bytes: &[u8]) -> Result<Value> {
    let (&header, rest) = bytes.split_first().ok_or(LexicoderError::Truncated)?;
    let (negative, len) = if header >= INT_ZERO_HEADER {
        (false, (header - INT_ZERO_HEADER) as usize)
    } else {
        (true, (INT_ZERO_HEADER - 1 - header) as usize)
    };
    if len > 8 {
        return Err(LexicoderError::InvalidEncoding(format!(
            "integer magnitude of {} bytes exceeds 8",
            len
        )));
    }
    if rest.len() != len {
        return Err(LexicoderError::Truncated);
    }
    let mut magnitude: u64 = 0;
    for &byte in rest {
        let byte = if negative { !byte } else { byte };
        magnitude = (magnitude << 8) | byte as u64;
    }
    if negative {
        if magnitude > i64::MAX as u64 {
            return Err(LexicoderError::InvalidEncoding(
                "negative magnitude out of range".to_string(),
            ));
        }
        Ok(Value::Int(!(magnitude as i64)))
    } else {
        if magnitude > i64::MAX as u64 {
            return Err(LexicoderError::InvalidEncoding(
                "integer out of range".to_string(),
            ));
        }
        Ok(Value::Int(magnitude as i64))
    }
}

/// Writes the fixed-width encoding of `n`: big-endian two's complement with
/// the sign bit flipped, so negatives precede positives bytewise.
fn encode_long(n: i64, out: &mut Vec<u8>) {
    let mut buf = [0u8; 8];
    BigEndian::write_u64(&mut buf, (n as u64) ^ (1 << 63));
    out.extend_from_slice(&buf);
}

fn decode_long(bytes: &[u8]) -> Result<Value> {
    if bytes.len() < 8 {
        return Err(LexicoderError::Truncated);
    }
    if bytes.len() > 8 {
        return Err(LexicoderError::InvalidEncoding(format!(
            "expected 8 bytes, got {}",
            bytes.len()
        )));
    }
    let biased = BigEndian::read_u64(bytes);
    Ok(Value::Int((biased ^ (1 << 63)) as i64))
}

/// Appends `element` to `out` with every `0x00` escaped as `0x00 0xFF`.
///
/// The escape is strictly monotone as a byte-string transform, so member
/// ordering survives it.
fn escape_into(element: &[u8], out: &mut Vec<u8>) {
    for &byte in element {
        out.push(byte);
        if byte == SEPARATOR {
            out.push(ESCAPE);
        }
    }
}

fn decode_tuple(members: &[Lexicoder], bytes: &[u8]) -> Result<Value> {
    let mut items = Vec::with_capacity(members.len());
    let mut element = Vec::new();
    let mut member_iter = members.iter();
    let mut i = 0;
    while i < bytes.len() {
        let byte = bytes[i];
        if byte == SEPARATOR {
            match bytes.get(i + 1) {
                Some(&ESCAPE) => {
                    // escaped zero inside a member
                    element.push(SEPARATOR);
                    i += 2;
                }
                _ => {
                    // member terminator
                    let member = member_iter.next().ok_or_else(|| {
                        LexicoderError::InvalidEncoding(
                            "tuple has more members than the coder".to_string(),
                        )
                    })?;
                    items.push(member.decode(&element)?);
                    element.clear();
                    i += 1;
                }
            }
        } else {
            element.push(byte);
            i += 1;
        }
    }
    if !element.is_empty() {
        return Err(LexicoderError::Truncated);
    }
    if member_iter.next().is_some() {
        return Err(LexicoderError::Truncated);
    }
    Ok(Value::List(items))
}

#[cfg(test)]
mod tests;
