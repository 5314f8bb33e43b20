//! clipsync-crypto: password-based envelope encryption for ClipSync
//!
//! Architecture: PBKDF2-derived key, AES-256-CBC with PKCS#7 padding
//!
//! Envelope format (binary, no version byte, no length prefixes):
//! ```text
//! [16 bytes: salt][16 bytes: iv][N bytes: AES-256-CBC ciphertext]
//! key = PBKDF2-HMAC-SHA256(password, salt, 10_000 iterations, 32 bytes)
//! ```
//!
//! Two ciphers share this format:
//! - whole-value (`value`): clipboard text, base64-encoded for form/JSON fields
//! - streaming (`stream`): file transfers in O(buffer) memory
//!
//! Download pipeline:
//! ```text
//! HTTP body → ProgressReader → Base64DecodeReader → header strip → AES-CBC decrypt → sink
//! ```
//!
//! The envelope carries no authentication tag. A wrong password and corrupted
//! ciphertext are indistinguishable and both surface as
//! [`CryptoError::DecryptionFailed`].

pub mod envelope;
pub mod error;
pub mod kdf;
pub mod progress;
pub mod stream;
pub mod transcode;
pub mod value;

pub use envelope::{decode, encode, EnvelopeHeader};
pub use error::{CryptoError, CryptoResult};
pub use kdf::{derive_key, generate_iv, generate_salt, DerivedKey};
pub use progress::{ProgressFn, ProgressReader};
pub use stream::{decrypt_stream, encrypt_stream};
pub use transcode::{Base64DecodeReader, Base64EncodeWriter};
pub use value::{decrypt_bytes, decrypt_text, encrypt_bytes, encrypt_text};

/// Size of a derived AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of the per-envelope PBKDF2 salt
pub const SALT_SIZE: usize = 16;

/// Size of the AES-CBC initialization vector
pub const IV_SIZE: usize = 16;

/// AES block size
pub const BLOCK_SIZE: usize = 16;

/// Envelope header: salt || iv
pub const HEADER_SIZE: usize = SALT_SIZE + IV_SIZE;

/// PBKDF2 iteration count. Part of the wire format: changing it breaks
/// decryption of everything produced by other clients.
pub const PBKDF2_ITERATIONS: u32 = 10_000;

/// Default chunk size for the streaming cipher
pub const DEFAULT_BUFFER_SIZE: usize = 8192;
