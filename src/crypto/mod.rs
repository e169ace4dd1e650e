//! Decryption of downloaded files.
//!
//! The pipeline only depends on [CryptoProvider]. [HybridCipher] implements the
//! envelope digi.me uses for consent access files; hosts with a hardware backed
//! key can plug in their own provider instead.
mod hybrid;

pub use hybrid::HybridCipher;

use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;

use crate::encoding;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("private key could not be parsed: {0}")]
    InvalidKey(String),
    #[error("rsa operation failed: {0}")]
    Rsa(#[from] rsa::Error),
    #[error("ciphertext is malformed: {0}")]
    Malformed(&'static str),
    #[error("symmetric decryption failed")]
    Symmetric,
    #[error("decrypted content does not match its digest")]
    DigestMismatch,
}

/// Length of the type descriptor that leads every downloaded file body.
pub const TYPE_DESCRIPTOR_LEN: usize = 8;

/// How a file body is stored, as told by its type descriptor.
///
/// The descriptor is a big endian integer of [TYPE_DESCRIPTOR_LEN] bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FileFormat {
    Unencrypted = 0,
    Encrypted = 1,
}

impl FileFormat {
    /// Read the type descriptor off `body`, returning the format and the payload after it.
    pub fn split(body: &[u8]) -> Result<(FileFormat, &[u8]), Error> {
        if body.len() < TYPE_DESCRIPTOR_LEN {
            return Err(Error::Malformed("shorter than its type descriptor"));
        }
        let (descriptor, payload) = body.split_at(TYPE_DESCRIPTOR_LEN);
        let mut raw = [0u8; TYPE_DESCRIPTOR_LEN];
        raw.copy_from_slice(descriptor);
        let format = match u64::from_be_bytes(raw) {
            0 => FileFormat::Unencrypted,
            1 => FileFormat::Encrypted,
            _ => return Err(Error::Malformed("unknown type descriptor")),
        };
        Ok((format, payload))
    }

    /// Prefix `payload` with this format's type descriptor.
    pub fn frame(self, payload: &[u8]) -> Vec<u8> {
        let mut body = (self as u64).to_be_bytes().to_vec();
        body.extend_from_slice(payload);
        body
    }
}

/// Asymmetric decryption capability used by the download pipeline.
pub trait CryptoProvider: Send + Sync {
    /// Decrypt `ciphertext` with the DER encoded private key in `key`.
    fn decrypt(&self, ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>, Error>;
}

/// Parse a DER encoded RSA private key, PKCS#1 first and PKCS#8 as a fallback.
pub fn parse_private_key(der: &[u8]) -> Result<RsaPrivateKey, Error> {
    RsaPrivateKey::from_pkcs1_der(der)
        .or_else(|_| RsaPrivateKey::from_pkcs8_der(der))
        .map_err(|e| Error::InvalidKey(e.to_string()))
}

/// Turn a textual private key into DER bytes.
///
/// Accepts the hex dump of a DER key, as exported by the platform keychain, or
/// a PEM document (`RSA PRIVATE KEY` or `PRIVATE KEY`). The result is checked to
/// be a parseable RSA key.
pub fn private_key_der_from_text(text: &str) -> Result<Vec<u8>, Error> {
    let text = text.trim();
    let der = if text.starts_with("-----BEGIN") {
        let (label, der) = pem_rfc7468::decode_vec(text.as_bytes())
            .map_err(|e| Error::InvalidKey(format!("unable to parse pem: {}", e)))?;
        if label != "RSA PRIVATE KEY" && label != "PRIVATE KEY" {
            return Err(Error::InvalidKey(format!("unexpected pem label {label}")));
        }
        der
    } else {
        encoding::hex_to_bytes(text).map_err(|e| Error::InvalidKey(e.to_string()))?
    };
    parse_private_key(&der)?;
    Ok(der)
}
