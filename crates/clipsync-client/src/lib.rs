//! clipsync-client: async HTTP client for the companion desktop server
//!
//! Clipboard text travels as a base64 envelope in a form field. Files are
//! streamed: uploads send the raw envelope, downloads receive it
//! base64-encoded and decode it on the fly. The cipher itself is synchronous
//! and runs on the blocking pool, bridged to the HTTP bodies.

pub mod client;
pub mod error;
pub mod http;

pub use client::CompanionClient;
pub use error::{TransportError, TransportResult};
