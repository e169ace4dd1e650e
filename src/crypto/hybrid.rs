//! RSA/AES envelope of consent access files.
//!
//! ```text
//! | RSA-OAEP(SHA-1) encrypted data key | IV (16) | AES-256-CBC(SHA-512(data) || data) |
//! |<---------- modulus size ---------->|
//! ```
//!
//! The data key is 32 bytes. The block cipher input is PKCS#7 padded and starts
//! with the SHA-512 digest of the data, which is checked after decryption.
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::{CryptoRng, RngCore};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPublicKey};
use sha1::Sha1;
use sha2::{Digest, Sha512};
use zeroize::Zeroizing;

use super::{parse_private_key, CryptoProvider, Error};

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

const DATA_KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
const BLOCK_LEN: usize = 16;
const DIGEST_LEN: usize = 64;

#[derive(Debug, Clone, Copy, Default)]
pub struct HybridCipher;

impl HybridCipher {
    /// Produce an envelope readable by the holder of the private half of `public_key`.
    pub fn encrypt<R: RngCore + CryptoRng>(
        rng: &mut R,
        public_key: &RsaPublicKey,
        data: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let mut data_key = Zeroizing::new([0u8; DATA_KEY_LEN]);
        rng.fill_bytes(&mut data_key[..]);
        let mut iv = [0u8; IV_LEN];
        rng.fill_bytes(&mut iv);

        let mut plaintext = Sha512::digest(data).to_vec();
        plaintext.extend_from_slice(data);

        let body = Aes256CbcEnc::new_from_slices(&data_key[..], &iv)
            .map_err(|_| Error::Symmetric)?
            .encrypt_padded_vec_mut::<Pkcs7>(&plaintext);
        let encrypted_key = public_key.encrypt(rng, Oaep::new::<Sha1>(), &data_key[..])?;

        let mut out = Vec::with_capacity(encrypted_key.len() + IV_LEN + body.len());
        out.extend_from_slice(&encrypted_key);
        out.extend_from_slice(&iv);
        out.extend_from_slice(&body);
        Ok(out)
    }
}

impl CryptoProvider for HybridCipher {
    fn decrypt(&self, ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>, Error> {
        let private_key = parse_private_key(key)?;
        let key_len = private_key.size();

        if ciphertext.len() < key_len + IV_LEN + BLOCK_LEN {
            return Err(Error::Malformed("shorter than the envelope header"));
        }
        let (encrypted_key, rest) = ciphertext.split_at(key_len);
        let (iv, body) = rest.split_at(IV_LEN);
        if body.len() % BLOCK_LEN != 0 {
            return Err(Error::Malformed("body is not a whole number of blocks"));
        }

        let data_key = Zeroizing::new(private_key.decrypt(Oaep::new::<Sha1>(), encrypted_key)?);
        if data_key.len() != DATA_KEY_LEN {
            return Err(Error::Malformed("unexpected data key length"));
        }

        let mut plaintext = Aes256CbcDec::new_from_slices(&data_key, iv)
            .map_err(|_| Error::Symmetric)?
            .decrypt_padded_vec_mut::<Pkcs7>(body)
            .map_err(|_| Error::Symmetric)?;
        if plaintext.len() < DIGEST_LEN {
            return Err(Error::Malformed("missing content digest"));
        }
        let data = plaintext.split_off(DIGEST_LEN);
        if Sha512::digest(&data).as_slice() != plaintext.as_slice() {
            return Err(Error::DigestMismatch);
        }
        Ok(data)
    }
}
