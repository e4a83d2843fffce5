//! Strict base64 handling for JSON-embedded binary payloads
//!
//! Lenient decoders accept inputs that silently lose bits (non-canonical
//! trailing bits, stray whitespace in the middle, missing padding). A payload
//! is accepted here only if decoding and re-encoding it reproduces the trimmed
//! input exactly.

use base64::{engine::general_purpose::STANDARD, Engine};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Base64Error {
    #[error("Base64 payload is empty")]
    Empty,

    #[error("Invalid base64 encoding: {0}")]
    Malformed(String),

    #[error("Base64 payload is not canonical (decode/encode round trip changed the value)")]
    NotCanonical,
}

/// Decode `input` as canonical, padded, standard-alphabet base64.
pub fn decode_strict(input: &str) -> Result<Vec<u8>, Base64Error> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Base64Error::Empty);
    }

    let decoded = STANDARD
        .decode(trimmed)
        .map_err(|e| Base64Error::Malformed(e.to_string()))?;

    if STANDARD.encode(&decoded) != trimmed {
        return Err(Base64Error::NotCanonical);
    }

    Ok(decoded)
}

pub fn is_valid_base64(input: &str) -> bool {
    decode_strict(input).is_ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_padded_input() {
        assert_eq!(decode_strict("SGVsbG8=").unwrap(), b"Hello");
        assert_eq!(decode_strict("  SGVsbG8=\n").unwrap(), b"Hello");
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(decode_strict("not base64!"), Err(Base64Error::Malformed(_))));
        assert_eq!(decode_strict("   "), Err(Base64Error::Empty));
    }

    #[test]
    fn test_rejects_missing_padding() {
        assert!(!is_valid_base64("SGVsbG8"));
    }

    #[test]
    fn test_rejects_non_canonical_trailing_bits() {
        // "SGVsbG9=" decodes to the same bytes as "SGVsbG8=" under lenient
        // decoders but carries non-zero trailing bits.
        assert!(!is_valid_base64("SGVsbG9="));
    }
}
