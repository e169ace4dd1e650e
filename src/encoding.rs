//! String and byte helpers shared by the key loading and payload decoding code.
use base64::{decode, encode};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("value is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("value is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// True if the string is empty or contains only whitespace and new lines.
pub fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

/// Decode a hex string, ignoring surrounding whitespace and an optional `0x` prefix.
pub fn hex_to_bytes(s: &str) -> Result<Vec<u8>, Error> {
    let s = s.trim();
    let s = s.strip_prefix("0x").unwrap_or(s);
    Ok(hex::decode(s)?)
}

/// Decode standard base64, tolerating embedded line breaks.
pub fn base64_to_bytes(s: &str) -> Result<Vec<u8>, Error> {
    let compact: String = s.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    Ok(decode(compact)?)
}

pub fn bytes_to_base64(bytes: &[u8]) -> String {
    encode(bytes)
}
