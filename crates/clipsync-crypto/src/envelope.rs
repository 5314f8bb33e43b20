//! Envelope codec
//!
//! Wire format (binary):
//! ```text
//! [16 bytes: salt][16 bytes: iv][N bytes: ciphertext]
//! ```
//!
//! Field sizes are fixed, so the layout is plain concatenation. There is no
//! version byte: any change to this layout is a breaking wire change.

use crate::kdf::{generate_iv, generate_salt};
use crate::{CryptoError, CryptoResult, HEADER_SIZE, IV_SIZE, SALT_SIZE};

/// The fixed-size prefix of every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeHeader {
    pub salt: [u8; SALT_SIZE],
    pub iv: [u8; IV_SIZE],
}

impl EnvelopeHeader {
    /// Fresh random salt and iv. Never reuse a header across messages.
    pub fn generate() -> Self {
        Self {
            salt: generate_salt(),
            iv: generate_iv(),
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[..SALT_SIZE].copy_from_slice(&self.salt);
        out[SALT_SIZE..].copy_from_slice(&self.iv);
        out
    }

    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        let mut salt = [0u8; SALT_SIZE];
        let mut iv = [0u8; IV_SIZE];
        salt.copy_from_slice(&bytes[..SALT_SIZE]);
        iv.copy_from_slice(&bytes[SALT_SIZE..]);
        Self { salt, iv }
    }
}

/// Assemble `salt || iv || ciphertext`.
pub fn encode(header: &EnvelopeHeader, ciphertext: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
    out.extend_from_slice(&header.salt);
    out.extend_from_slice(&header.iv);
    out.extend_from_slice(ciphertext);
    out
}

/// Split an envelope into its header and ciphertext.
pub fn decode(data: &[u8]) -> CryptoResult<(EnvelopeHeader, &[u8])> {
    if data.len() < HEADER_SIZE {
        return Err(CryptoError::MalformedEnvelope(format!(
            "envelope too short: {} bytes (minimum {HEADER_SIZE})",
            data.len()
        )));
    }

    let (head, ciphertext) = data.split_at(HEADER_SIZE);
    let mut header_bytes = [0u8; HEADER_SIZE];
    header_bytes.copy_from_slice(head);

    Ok((EnvelopeHeader::from_bytes(&header_bytes), ciphertext))
}
