use clipsync_core::ClipsyncError;
use clipsync_crypto::CryptoError;

pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server error (HTTP {status}): {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ClipsyncError),

    #[error("cipher worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl TransportError {
    /// True when the server answered but the payload would not decrypt.
    pub fn is_decryption_failure(&self) -> bool {
        matches!(self, TransportError::Crypto(e) if e.is_decryption_failure())
    }
}
