//! Minimal percent-decoding for ESL header values.
//!
//! The engine percent-encodes header values that would otherwise contain a
//! `:` or a line terminator (`%HH` with an uppercase-hex pair). Decoding is
//! the inverse: every `%HH` triplet becomes the byte `HH`, everything else
//! passes through unchanged. This is deliberately narrower than a general
//! URL-decoder — the wire format never uses `+` for space, so we don't
//! special-case it.

use crate::error::ProtocolError;

pub fn percent_decode(input: &str) -> Result<String, ProtocolError> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .ok_or_else(|| ProtocolError::InvalidPercentEncoding(input.to_owned()))?;
            let hex_str = std::str::from_utf8(hex)
                .map_err(|_| ProtocolError::InvalidPercentEncoding(input.to_owned()))?;
            let byte = u8::from_str_radix(hex_str, 16)
                .map_err(|_| ProtocolError::InvalidPercentEncoding(input.to_owned()))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| ProtocolError::InvalidPercentEncoding(input.to_owned()))
}

/// Encode a header value for the wire: escape `%`, `\r`, `\n`, and `:`.
///
/// Exact inverse of [`percent_decode`] for any string built from that
/// alphabet (see the `round_trip` property test).
pub fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'%' | b'\r' | b'\n' | b':' => out.push_str(&format!("%{:02X}", byte)),
            _ => out.push(byte as char),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_special_chars() {
        for raw in ["plain", "has:colon", "has\r\nnewline", "pct%sign", "a:b\r\nc%d"] {
            let encoded = percent_encode(raw);
            let decoded = percent_decode(&encoded).unwrap();
            assert_eq!(decoded, raw);
        }
    }

    #[test]
    fn decode_passes_through_plain_text() {
        assert_eq!(percent_decode("hello world").unwrap(), "hello world");
    }

    #[test]
    fn decode_rejects_truncated_escape() {
        assert!(percent_decode("abc%2").is_err());
        assert!(percent_decode("abc%").is_err());
    }

    #[test]
    fn decode_rejects_non_hex_escape() {
        assert!(percent_decode("abc%zz").is_err());
    }
}
