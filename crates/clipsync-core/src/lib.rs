pub mod config;
pub mod error;
pub mod types;

pub use config::ClipsyncConfig;
pub use error::{ClipsyncError, ClipsyncResult};
