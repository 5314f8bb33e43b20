use thiserror::Error;

pub type ClipsyncResult<T> = Result<T, ClipsyncError>;

#[derive(Debug, Error)]
pub enum ClipsyncError {
    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
