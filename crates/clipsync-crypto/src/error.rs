use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// Input cannot be an envelope at all (too short, not base64)
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// A stream ended before the 32-byte salt+iv header was complete
    #[error("truncated envelope header: stream ended after {read} of 32 bytes")]
    TruncatedHeader { read: usize },

    /// Bad padding, bad block alignment, or non-UTF-8 plaintext.
    ///
    /// There is no authentication tag, so a wrong password cannot be told
    /// apart from corrupted data.
    #[error("decryption failed: wrong password or corrupted data")]
    DecryptionFailed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CryptoError {
    /// True for failures the user should see as "wrong password or corrupted data".
    pub fn is_decryption_failure(&self) -> bool {
        matches!(self, CryptoError::DecryptionFailed)
    }
}
