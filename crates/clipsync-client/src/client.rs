//! Companion server client

use std::ffi::OsString;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clipsync_core::types::{
    ClipboardAck, ClipboardPayload, TransferDirection, TransferReport, CLIPBOARD_FIELD,
};
use clipsync_core::ClipsyncConfig;
use clipsync_crypto::{
    decrypt_stream, decrypt_text, encrypt_stream, encrypt_text, Base64DecodeReader, CryptoResult,
    ProgressFn, ProgressReader,
};
use futures::TryStreamExt;
use reqwest::header::CONTENT_TYPE;
use secrecy::SecretString;
use tokio_util::io::{ReaderStream, StreamReader, SyncIoBridge};
use tracing::{debug, info};

use crate::error::{TransportError, TransportResult};
use crate::http::{build_http_client, check_response, Endpoint};

/// In-flight bytes between the cipher thread and the upload body
const UPLOAD_PIPE_CAPACITY: usize = 64 * 1024;

/// Client for one companion server, bound to one shared password.
///
/// Every operation derives a fresh key from the password and the salt of the
/// envelope at hand, so no key material outlives a call.
pub struct CompanionClient {
    http: reqwest::Client,
    endpoint: Endpoint,
    password: Arc<SecretString>,
    buffer_size: usize,
}

impl CompanionClient {
    pub fn new(config: &ClipsyncConfig, password: SecretString) -> TransportResult<Self> {
        config.validate()?;
        let (http, endpoint) = build_http_client(&config.server)?;
        Ok(Self {
            http,
            endpoint,
            password: Arc::new(password),
            buffer_size: config.crypto.buffer_size,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.endpoint.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint.base_url, path)
    }

    fn with_timeout(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.endpoint.request_timeout {
            Some(timeout) => req.timeout(timeout),
            None => req,
        }
    }

    // ── Clipboard ──────────────────────────────────────────────────────────

    /// Encrypt `text` and send it as the server's clipboard.
    pub async fn push_clipboard(&self, text: &str) -> TransportResult<ClipboardAck> {
        let password = Arc::clone(&self.password);
        let text = text.to_owned();
        let encoded = tokio::task::spawn_blocking(move || encrypt_text(&text, &password)).await?;

        debug!(encoded_len = encoded.len(), "pushing clipboard");
        let req = self
            .http
            .post(self.url("/clipboard"))
            .form(&[(CLIPBOARD_FIELD, encoded.as_str())]);
        let resp = check_response(self.with_timeout(req).send().await?).await?;
        let ack: ClipboardAck = resp.json().await?;

        info!(status = %ack.status, "clipboard pushed");
        Ok(ack)
    }

    /// Fetch and decrypt the server's clipboard. `None` when it has nothing.
    pub async fn fetch_clipboard(&self) -> TransportResult<Option<String>> {
        let req = self.http.get(self.url("/clipboard"));
        let resp = check_response(self.with_timeout(req).send().await?).await?;
        let payload: ClipboardPayload = resp.json().await?;

        if payload.clipboard.trim().is_empty() {
            debug!("server clipboard is empty");
            return Ok(None);
        }

        debug!(encoded_len = payload.clipboard.len(), "fetched clipboard");
        let password = Arc::clone(&self.password);
        let text =
            tokio::task::spawn_blocking(move || decrypt_text(&payload.clipboard, &password))
                .await??;
        Ok(Some(text))
    }

    // ── Files ──────────────────────────────────────────────────────────────

    /// Stream-encrypt `path` and upload the envelope as `name`.
    ///
    /// Progress is reported against the plaintext file size.
    pub async fn upload_file(
        &self,
        path: &Path,
        name: &str,
        progress: Option<ProgressFn>,
    ) -> TransportResult<TransferReport> {
        let file = tokio::fs::File::open(path).await?;
        let total = file.metadata().await?.len();
        let file = file.into_std().await;

        let (pipe_writer, pipe_reader) = tokio::io::duplex(UPLOAD_PIPE_CAPACITY);
        let mut sink = SyncIoBridge::new(pipe_writer);
        let password = Arc::clone(&self.password);
        let buffer_size = self.buffer_size;

        debug!(path = %path.display(), name, total, buffer_size, "starting upload");
        let encrypt = tokio::task::spawn_blocking(move || -> CryptoResult<u64> {
            let mut source = ProgressReader::new(BufReader::new(file), Some(total), progress);
            encrypt_stream(&mut source, &mut sink, &password, buffer_size)?;
            sink.shutdown()?;
            Ok(source.bytes_read())
        });

        let send = self
            .http
            .post(self.url("/upload"))
            .query(&[("name", name)])
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(reqwest::Body::wrap_stream(ReaderStream::new(pipe_reader)))
            .send();

        let (resp, encrypted) = tokio::join!(send, encrypt);
        // A rejected or failed request also breaks the pipe, so report the
        // server side first.
        let encrypted = encrypted?;
        check_response(resp?).await?;
        let plaintext_bytes = encrypted?;

        info!(name, bytes = plaintext_bytes, "upload complete");
        Ok(TransferReport {
            direction: TransferDirection::Upload,
            name: name.to_string(),
            plaintext_bytes,
        })
    }

    /// Download `name`, decrypting it into `dest`.
    ///
    /// Output goes to `<dest>.part` and is renamed into place only once the
    /// whole envelope has decrypted. On any failure the partial file is
    /// removed and `dest` is left untouched. Progress is reported against the
    /// response's Content-Length when the server sends one.
    pub async fn download_file(
        &self,
        name: &str,
        dest: &Path,
        progress: Option<ProgressFn>,
    ) -> TransportResult<TransferReport> {
        let resp = self
            .http
            .get(self.url("/download"))
            .query(&[("name", name)])
            .send()
            .await?;
        let resp = check_response(resp).await?;
        let total = resp.content_length();

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let part = partial_path(dest);
        let file = tokio::fs::File::create(&part).await?.into_std().await;

        let body = StreamReader::new(Box::pin(
            resp.bytes_stream().map_err(std::io::Error::other),
        ));
        let source = SyncIoBridge::new(body);
        let password = Arc::clone(&self.password);
        let buffer_size = self.buffer_size;

        debug!(name, dest = %dest.display(), ?total, buffer_size, "starting download");
        let decrypted = tokio::task::spawn_blocking(move || -> CryptoResult<u64> {
            let source = Base64DecodeReader::new(ProgressReader::new(source, total, progress));
            let mut sink = BufWriter::new(file);
            let written = decrypt_stream(source, &mut sink, &password, buffer_size)?;
            let file = sink.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
            Ok(written)
        })
        .await;

        let outcome = match decrypted {
            Ok(Ok(written)) => tokio::fs::rename(&part, dest)
                .await
                .map(|()| written)
                .map_err(TransportError::from),
            Ok(Err(e)) => Err(e.into()),
            Err(e) => Err(e.into()),
        };

        match outcome {
            Ok(plaintext_bytes) => {
                info!(name, bytes = plaintext_bytes, dest = %dest.display(), "download complete");
                Ok(TransferReport {
                    direction: TransferDirection::Download,
                    name: name.to_string(),
                    plaintext_bytes,
                })
            }
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&part).await {
                    debug!(part = %part.display(), "could not remove partial download: {rm}");
                }
                Err(e)
            }
        }
    }
}

/// `<dest>.part`
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = OsString::from(dest.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}
