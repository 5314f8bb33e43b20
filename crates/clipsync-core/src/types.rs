use serde::{Deserialize, Serialize};

/// Form field carrying the encrypted clipboard on `POST /clipboard`
pub const CLIPBOARD_FIELD: &str = "clipboard";

/// JSON body of `GET /clipboard`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardPayload {
    /// Base64 envelope; empty when the server has nothing to offer
    pub clipboard: String,
}

/// JSON body of `POST /clipboard`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardAck {
    pub status: String,
    #[serde(default)]
    pub clipboard: Option<String>,
}

/// Direction of a file transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    Upload,
    Download,
}

impl std::fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferDirection::Upload => f.write_str("upload"),
            TransferDirection::Download => f.write_str("download"),
        }
    }
}

/// Outcome of one completed file transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReport {
    pub direction: TransferDirection,
    /// Remote file name
    pub name: String,
    /// Plaintext bytes read (upload) or written (download)
    pub plaintext_bytes: u64,
}
