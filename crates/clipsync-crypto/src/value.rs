//! Whole-value AES-256-CBC encryption for clipboard text and small buffers
//!
//! `encrypt_text` output is the standard-alphabet, padded base64 encoding of
//! the full envelope with no line breaks, safe for a form field or JSON string.

use aes::Aes256;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use secrecy::SecretString;

use crate::envelope::{decode, encode, EnvelopeHeader};
use crate::kdf::derive_key;
use crate::{CryptoError, CryptoResult};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Encrypt a byte buffer into a complete envelope.
pub fn encrypt_bytes(plaintext: &[u8], password: &SecretString) -> Vec<u8> {
    let header = EnvelopeHeader::generate();
    let key = derive_key(password, &header.salt);

    let ciphertext = Aes256CbcEnc::new(key.as_bytes().into(), &header.iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    encode(&header, &ciphertext)
}

/// Decrypt a complete envelope produced by [`encrypt_bytes`] or the streaming cipher.
///
/// An envelope with no ciphertext decrypts to an empty buffer.
pub fn decrypt_bytes(envelope: &[u8], password: &SecretString) -> CryptoResult<Vec<u8>> {
    let (header, ciphertext) = decode(envelope)?;
    if ciphertext.is_empty() {
        return Ok(Vec::new());
    }

    let key = derive_key(password, &header.salt);
    Aes256CbcDec::new(key.as_bytes().into(), &header.iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Encrypt clipboard text and base64-encode the envelope.
pub fn encrypt_text(plaintext: &str, password: &SecretString) -> String {
    STANDARD.encode(encrypt_bytes(plaintext.as_bytes(), password))
}

/// Reverse of [`encrypt_text`].
pub fn decrypt_text(encoded: &str, password: &SecretString) -> CryptoResult<String> {
    let envelope = STANDARD
        .decode(encoded.trim())
        .map_err(|e| CryptoError::MalformedEnvelope(format!("invalid base64: {e}")))?;

    let plaintext = decrypt_bytes(&envelope, password)?;
    String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
}
