//! Conversions between raw bytes and text under a named encoding.
//!
//! Encoding names are WHATWG labels (`utf-8`, `latin1`, `windows-1252`,
//! `shift_jis`, ...), matched case-insensitively. Malformed input is always an
//! error, never replaced.

use encoding_rs::Encoding;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("unknown encoding '{0}'")]
    Unsupported(String),

    #[error("bytes are not valid {encoding}")]
    Decode { encoding: &'static str },

    #[error("text cannot be represented in {encoding}")]
    Encode { encoding: &'static str },

    #[error("{encoding} is not ASCII-compatible and cannot be split into lines")]
    NotLineOriented { encoding: &'static str },
}

/// Resolve an encoding label.
pub fn lookup(encoding_name: &str) -> Result<&'static Encoding, CodecError> {
    Encoding::for_label(encoding_name.trim().as_bytes())
        .ok_or_else(|| CodecError::Unsupported(encoding_name.to_string()))
}

pub fn to_text(bytes: &[u8], encoding_name: &str) -> Result<String, CodecError> {
    decode_with(lookup(encoding_name)?, bytes)
}

pub fn to_binary(text: &str, encoding_name: &str) -> Result<Vec<u8>, CodecError> {
    encode_with(lookup(encoding_name)?, text)
}

pub(crate) fn decode_with(encoding: &'static Encoding, bytes: &[u8]) -> Result<String, CodecError> {
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
        .ok_or(CodecError::Decode { encoding: encoding.name() })
}

pub(crate) fn encode_with(encoding: &'static Encoding, text: &str) -> Result<Vec<u8>, CodecError> {
    // encoding_rs silently swaps UTF-16 and `replacement` for UTF-8 on output.
    if encoding.output_encoding() != encoding {
        return Err(CodecError::Unsupported(format!("{} (decode only)", encoding.name())));
    }
    let (bytes, _, had_unmappable) = encoding.encode(text);
    if had_unmappable {
        return Err(CodecError::Encode { encoding: encoding.name() });
    }
    Ok(bytes.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn utf8_both_ways() {
        let raw = to_binary("🫢", "utf-8").unwrap();
        assert_eq!(raw, vec![0xf0, 0x9f, 0xab, 0xa2]);
        assert_eq!(to_text(&raw, "UTF-8").unwrap(), "🫢");
    }

    #[test]
    fn latin1_label() {
        assert_eq!(to_text(&[0x63, 0x61, 0x66, 0xe9], "latin1").unwrap(), "café");
        assert_eq!(to_binary("café", "latin1").unwrap(), vec![0x63, 0x61, 0x66, 0xe9]);
    }

    #[test]
    fn malformed_bytes_fail() {
        assert_eq!(
            to_text(&[0xff, 0xfe, 0x41], "utf-8"),
            Err(CodecError::Decode { encoding: "UTF-8" })
        );
    }

    #[test]
    fn unmappable_text_fails() {
        assert_eq!(
            to_binary("🫢", "latin1"),
            Err(CodecError::Encode { encoding: "windows-1252" })
        );
    }

    #[test]
    fn unknown_label() {
        assert_eq!(
            to_text(b"x", "klingon"),
            Err(CodecError::Unsupported("klingon".into()))
        );
    }
}
