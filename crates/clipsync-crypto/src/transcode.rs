//! Base64 transport stages
//!
//! The download path receives the envelope base64-encoded. Decoding is a
//! separate `Read` stage placed between the transport body and
//! [`decrypt_stream`](crate::decrypt_stream), never fused into it:
//!
//! ```text
//! HTTP bytes → Base64DecodeReader → decrypt_stream → plaintext sink
//! ```

use std::io::{Read, Write};

use base64::engine::general_purpose::{self, GeneralPurpose};
use base64::read::DecoderReader;
use base64::write::EncoderWriter;

static ENGINE: GeneralPurpose = general_purpose::STANDARD;

/// Drops ASCII whitespace (line breaks from the server, a trailing newline)
/// before it reaches the decoder.
struct SkipWhitespace<R> {
    inner: R,
}

impl<R: Read> Read for SkipWhitespace<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        loop {
            let n = self.inner.read(buf)?;
            if n == 0 {
                return Ok(0);
            }
            let mut kept = 0;
            for i in 0..n {
                let b = buf[i];
                if !b.is_ascii_whitespace() {
                    buf[kept] = b;
                    kept += 1;
                }
            }
            if kept > 0 {
                return Ok(kept);
            }
        }
    }
}

/// Streaming standard-alphabet base64 decoder.
///
/// Invalid base64 surfaces as an `io::Error` of kind `InvalidData`.
pub struct Base64DecodeReader<R: Read> {
    inner: DecoderReader<'static, GeneralPurpose, SkipWhitespace<R>>,
}

impl<R: Read> Base64DecodeReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: DecoderReader::new(SkipWhitespace { inner }, &ENGINE),
        }
    }
}

impl<R: Read> Read for Base64DecodeReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

/// Streaming standard-alphabet base64 encoder, no line wrapping.
///
/// [`finish`](Self::finish) must be called to emit the final padded quantum.
pub struct Base64EncodeWriter<W: Write> {
    inner: EncoderWriter<'static, GeneralPurpose, W>,
}

impl<W: Write> Base64EncodeWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: EncoderWriter::new(inner, &ENGINE),
        }
    }

    /// Flush the trailing partial quantum and return the wrapped writer.
    pub fn finish(mut self) -> std::io::Result<W> {
        self.inner.finish()
    }
}

impl<W: Write> Write for Base64EncodeWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decrypt_stream, encrypt_stream, CryptoError, DEFAULT_BUFFER_SIZE};
    use base64::Engine;
    use secrecy::SecretString;
    use std::io::Cursor;

    fn make_data(size: usize) -> Vec<u8> {
        (0..size).map(|i| (i * 31 % 251) as u8).collect()
    }

    fn encode_all(data: &[u8]) -> Vec<u8> {
        let mut w = Base64EncodeWriter::new(Vec::new());
        w.write_all(data).unwrap();
        w.finish().unwrap()
    }

    #[test]
    fn test_encoder_matches_engine() {
        let data = make_data(1000);
        let encoded = encode_all(&data);
        assert_eq!(encoded, ENGINE.encode(&data).into_bytes());
        assert!(!encoded.contains(&b'\n'));
    }

    #[test]
    fn test_decoder_roundtrip() {
        for size in [0usize, 1, 2, 3, 4, 100, 4099] {
            let data = make_data(size);
            let mut out = Vec::new();
            Base64DecodeReader::new(Cursor::new(encode_all(&data)))
                .read_to_end(&mut out)
                .unwrap();
            assert_eq!(out, data, "size {size}");
        }
    }

    #[test]
    fn test_decoder_skips_whitespace() {
        let data = make_data(200);
        let encoded = ENGINE.encode(&data);
        let wrapped: String = encoded
            .as_bytes()
            .chunks(76)
            .map(|line| format!("{}\r\n", std::str::from_utf8(line).unwrap()))
            .collect();

        let mut out = Vec::new();
        Base64DecodeReader::new(Cursor::new(wrapped.into_bytes()))
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_decoder_rejects_garbage() {
        let mut out = Vec::new();
        let err = Base64DecodeReader::new(Cursor::new(b"@@@@not-base64@@@@".to_vec()))
            .read_to_end(&mut out)
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_download_pipeline() {
        let password = SecretString::from("pipeline");
        let data = make_data(20_000);

        // Server side: envelope, then base64 with a trailing newline
        let mut body = Base64EncodeWriter::new(Vec::new());
        encrypt_stream(&data[..], &mut body, &password, DEFAULT_BUFFER_SIZE).unwrap();
        let mut body = body.finish().unwrap();
        body.push(b'\n');

        let mut out = Vec::new();
        decrypt_stream(
            Base64DecodeReader::new(Cursor::new(body)),
            &mut out,
            &password,
            DEFAULT_BUFFER_SIZE,
        )
        .unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_download_pipeline_truncated_header() {
        // 20 raw bytes after decoding: not enough for salt + iv
        let body = ENGINE.encode([0u8; 20]);
        let mut out = Vec::new();
        let err = decrypt_stream(
            Base64DecodeReader::new(Cursor::new(body.into_bytes())),
            &mut out,
            &SecretString::from("p"),
            DEFAULT_BUFFER_SIZE,
        )
        .unwrap_err();
        assert!(matches!(err, CryptoError::TruncatedHeader { read: 20 }));
    }
}
