//! Streaming AES-256-CBC over `Read`/`Write`
//!
//! Produces and consumes the same envelope as the whole-value cipher, without
//! holding the payload in memory. Each call owns its key and cipher state;
//! concurrent sessions share nothing.
//!
//! Encrypt carries at most one partial block across chunk boundaries.
//! Decrypt holds back the last complete block until end of stream so that
//! padding is stripped only from the final chunk.
//!
//! An empty source encrypts to the bare 32-byte header, and an empty
//! ciphertext body decrypts to an empty sink.

use std::io::{ErrorKind, Read, Write};

use aes::Aes256;
use cbc::cipher::{
    block_padding::Pkcs7, generic_array::GenericArray, BlockDecryptMut, BlockEncryptMut,
    KeyIvInit,
};
use secrecy::SecretString;
use tracing::debug;

use crate::envelope::EnvelopeHeader;
use crate::kdf::derive_key;
use crate::{CryptoError, CryptoResult, BLOCK_SIZE, HEADER_SIZE};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Encrypt `source` into `sink` as one envelope.
///
/// The header is written before the first source read. Returns the number of
/// bytes written to `sink`, header included.
pub fn encrypt_stream<R: Read, W: Write>(
    mut source: R,
    mut sink: W,
    password: &SecretString,
    buffer_size: usize,
) -> CryptoResult<u64> {
    let buffer_size = buffer_size.max(1);
    let header = EnvelopeHeader::generate();
    let key = derive_key(password, &header.salt);

    sink.write_all(&header.to_bytes())?;
    let mut written = HEADER_SIZE as u64;

    let mut cipher = Aes256CbcEnc::new(key.as_bytes().into(), &header.iv.into());
    drop(key);

    // buf[..carry] holds plaintext that did not fill a whole block yet
    let mut buf = vec![0u8; buffer_size + BLOCK_SIZE];
    let mut carry = 0usize;
    let mut consumed = 0u64;

    loop {
        let n = read_some(&mut source, &mut buf[carry..carry + buffer_size])?;
        if n == 0 {
            break;
        }
        consumed += n as u64;

        let filled = carry + n;
        let whole = filled - filled % BLOCK_SIZE;
        for block in buf[..whole].chunks_exact_mut(BLOCK_SIZE) {
            cipher.encrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        sink.write_all(&buf[..whole])?;
        written += whole as u64;

        buf.copy_within(whole..filled, 0);
        carry = filled - whole;
    }

    if consumed > 0 {
        let mut last = [0u8; BLOCK_SIZE];
        last[..carry].copy_from_slice(&buf[..carry]);
        // carry < BLOCK_SIZE, so PKCS#7 always fits in one block
        let padded = cipher
            .encrypt_padded_mut::<Pkcs7>(&mut last, carry)
            .map_err(|_| std::io::Error::other("PKCS#7 padding buffer too small"))?;
        sink.write_all(padded)?;
        written += padded.len() as u64;
    }

    sink.flush()?;
    debug!(plaintext_bytes = consumed, envelope_bytes = written, buffer_size, "stream encrypted");
    Ok(written)
}

/// Decrypt one envelope from `source` into `sink`.
///
/// Returns the number of plaintext bytes written. Plaintext preceding a
/// padding failure may already have reached `sink`; callers must discard the
/// output of any failed call.
pub fn decrypt_stream<R: Read, W: Write>(
    mut source: R,
    mut sink: W,
    password: &SecretString,
    buffer_size: usize,
) -> CryptoResult<u64> {
    let buffer_size = buffer_size.max(1);
    let header = read_header(&mut source)?;
    let key = derive_key(password, &header.salt);
    let mut cipher = Aes256CbcDec::new(key.as_bytes().into(), &header.iv.into());
    drop(key);

    // buf[..held] holds ciphertext not yet decrypted: either a partial block,
    // or the most recent full block (which may be the padded final one)
    let mut buf = vec![0u8; buffer_size + BLOCK_SIZE];
    let mut held = 0usize;
    let mut written = 0u64;

    loop {
        let n = read_some(&mut source, &mut buf[held..held + buffer_size])?;
        if n == 0 {
            break;
        }

        let filled = held + n;
        let keep = match filled % BLOCK_SIZE {
            0 => BLOCK_SIZE.min(filled),
            partial => partial,
        };
        let ready = filled - keep;

        for block in buf[..ready].chunks_exact_mut(BLOCK_SIZE) {
            cipher.decrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        sink.write_all(&buf[..ready])?;
        written += ready as u64;

        buf.copy_within(ready..filled, 0);
        held = keep;
    }

    if held > 0 {
        if held != BLOCK_SIZE {
            return Err(CryptoError::DecryptionFailed);
        }
        let mut last = [0u8; BLOCK_SIZE];
        last.copy_from_slice(&buf[..BLOCK_SIZE]);
        let plain = cipher
            .decrypt_padded_mut::<Pkcs7>(&mut last)
            .map_err(|_| CryptoError::DecryptionFailed)?;
        sink.write_all(plain)?;
        written += plain.len() as u64;
    }

    sink.flush()?;
    debug!(plaintext_bytes = written, buffer_size, "stream decrypted");
    Ok(written)
}

/// Read the 32-byte salt+iv header, looping over short reads.
fn read_header<R: Read>(source: &mut R) -> CryptoResult<EnvelopeHeader> {
    let mut header = [0u8; HEADER_SIZE];
    let mut read = 0usize;
    while read < HEADER_SIZE {
        match source.read(&mut header[read..]) {
            Ok(0) => return Err(CryptoError::TruncatedHeader { read }),
            Ok(n) => read += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(EnvelopeHeader::from_bytes(&header))
}

/// One `read` call, retried on `Interrupted`. Returns 0 only at end of stream.
fn read_some<R: Read>(source: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    loop {
        match source.read(buf) {
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decrypt_bytes, encrypt_bytes, DEFAULT_BUFFER_SIZE};
    use proptest::prelude::*;
    use std::io::Cursor;

    fn pw(s: &str) -> SecretString {
        SecretString::from(s)
    }

    fn make_data(size: usize) -> Vec<u8> {
        (0..size)
            .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
            .collect()
    }

    fn roundtrip(data: &[u8], enc_buf: usize, dec_buf: usize) -> Vec<u8> {
        let password = pw("stream-pass");
        let mut envelope = Vec::new();
        encrypt_stream(data, &mut envelope, &password, enc_buf).unwrap();
        let mut out = Vec::new();
        decrypt_stream(Cursor::new(envelope), &mut out, &password, dec_buf).unwrap();
        out
    }

    /// Hands out at most `max` bytes per read, like a slow socket.
    struct Trickle<R> {
        inner: R,
        max: usize,
    }

    impl<R: Read> Read for Trickle<R> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = buf.len().min(self.max);
            self.inner.read(&mut buf[..n])
        }
    }

    /// Fails every other read with `Interrupted`.
    struct Flaky<R> {
        inner: R,
        interrupt_next: bool,
    }

    impl<R: Read> Read for Flaky<R> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.interrupt_next = !self.interrupt_next;
            if self.interrupt_next {
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }

    /// Sink that fails after accepting `limit` bytes, like a closed socket.
    struct ClosedAfter {
        limit: usize,
        taken: usize,
    }

    impl Write for ClosedAfter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.taken >= self.limit {
                return Err(std::io::Error::from(ErrorKind::BrokenPipe));
            }
            let n = buf.len().min(self.limit - self.taken);
            self.taken += n;
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_roundtrip_boundary_sizes() {
        for size in [0usize, 1, 8191, 8192, 8193] {
            let data = make_data(size);
            assert_eq!(
                roundtrip(&data, DEFAULT_BUFFER_SIZE, DEFAULT_BUFFER_SIZE),
                data,
                "size {size}"
            );
        }
    }

    #[test]
    fn test_roundtrip_ten_mib() {
        let data = make_data(10 * 1024 * 1024);
        assert_eq!(roundtrip(&data, DEFAULT_BUFFER_SIZE, DEFAULT_BUFFER_SIZE), data);
    }

    #[test]
    fn test_roundtrip_mismatched_buffer_sizes() {
        let data = make_data(5000);
        for (enc, dec) in [(1, 1), (1, 8192), (15, 17), (16, 16), (17, 3), (4096, 1)] {
            assert_eq!(roundtrip(&data, enc, dec), data, "buffers {enc}/{dec}");
        }
    }

    #[test]
    fn test_zero_buffer_size_is_usable() {
        let data = make_data(100);
        assert_eq!(roundtrip(&data, 0, 0), data);
    }

    #[test]
    fn test_empty_input_is_header_only() {
        let password = pw("empty");
        let mut envelope = Vec::new();
        let written = encrypt_stream(&b""[..], &mut envelope, &password, DEFAULT_BUFFER_SIZE)
            .unwrap();
        assert_eq!(written, HEADER_SIZE as u64);
        assert_eq!(envelope.len(), HEADER_SIZE);

        let mut out = Vec::new();
        let n = decrypt_stream(Cursor::new(envelope), &mut out, &password, DEFAULT_BUFFER_SIZE)
            .unwrap();
        assert_eq!(n, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_envelope_size_matches_padding() {
        let password = pw("size");
        for size in [1usize, 15, 16, 17, 8192] {
            let mut envelope = Vec::new();
            let written =
                encrypt_stream(&make_data(size)[..], &mut envelope, &password, 64).unwrap();
            let expected = HEADER_SIZE + (size / 16 + 1) * 16;
            assert_eq!(envelope.len(), expected, "size {size}");
            assert_eq!(written, expected as u64);
        }
    }

    #[test]
    fn test_stream_matches_whole_value_format() {
        let password = pw("interop");
        let data = make_data(777);

        let envelope = encrypt_bytes(&data, &password);
        let mut out = Vec::new();
        decrypt_stream(Cursor::new(&envelope), &mut out, &password, 10).unwrap();
        assert_eq!(out, data);

        let mut streamed = Vec::new();
        encrypt_stream(&data[..], &mut streamed, &password, 10).unwrap();
        assert_eq!(decrypt_bytes(&streamed, &password).unwrap(), data);
    }

    #[test]
    fn test_decrypts_padded_empty_envelope() {
        // Other producers emit one full padding block for an empty payload
        let password = pw("compat");
        let envelope = encrypt_bytes(b"", &password);
        assert_eq!(envelope.len(), HEADER_SIZE + 16);

        let mut out = Vec::new();
        decrypt_stream(Cursor::new(envelope), &mut out, &password, 8).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_truncated_header() {
        for len in [0usize, 1, 16, 31] {
            let mut out = Vec::new();
            let err = decrypt_stream(Cursor::new(vec![0u8; len]), &mut out, &pw("p"), 16)
                .unwrap_err();
            match err {
                CryptoError::TruncatedHeader { read } => assert_eq!(read, len),
                other => panic!("expected TruncatedHeader for {len} bytes, got {other:?}"),
            }
            assert!(out.is_empty());
        }
    }

    #[test]
    fn test_header_survives_short_reads() {
        let password = pw("trickle");
        let data = make_data(300);
        let mut envelope = Vec::new();
        encrypt_stream(&data[..], &mut envelope, &password, 32).unwrap();

        let source = Trickle {
            inner: Cursor::new(envelope),
            max: 3,
        };
        let mut out = Vec::new();
        decrypt_stream(source, &mut out, &password, 64).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_interrupted_reads_are_retried() {
        let password = pw("flaky");
        let data = make_data(1000);

        let mut envelope = Vec::new();
        let source = Flaky {
            inner: &data[..],
            interrupt_next: false,
        };
        encrypt_stream(source, &mut envelope, &password, 100).unwrap();

        let mut out = Vec::new();
        let source = Flaky {
            inner: Cursor::new(envelope),
            interrupt_next: false,
        };
        decrypt_stream(source, &mut out, &password, 100).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_wrong_password_fails() {
        let data = b"secret file contents";
        let mut failures = 0;

        // Without a MAC a wrong key passes the padding check about 1 time in
        // 256; it must still never reproduce the plaintext.
        for _ in 0..8 {
            let mut envelope = Vec::new();
            encrypt_stream(&data[..], &mut envelope, &pw("right"), 64).unwrap();

            let mut out = Vec::new();
            match decrypt_stream(Cursor::new(envelope), &mut out, &pw("wrong"), 64) {
                Err(e) => {
                    assert!(e.is_decryption_failure(), "got {e:?}");
                    failures += 1;
                }
                Ok(_) => assert_ne!(out, data),
            }
        }
        assert!(failures > 0);
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        let password = pw("cut");
        let mut envelope = Vec::new();
        encrypt_stream(&make_data(100)[..], &mut envelope, &password, 64).unwrap();
        envelope.truncate(envelope.len() - 5);

        let mut out = Vec::new();
        let err = decrypt_stream(Cursor::new(envelope), &mut out, &password, 64).unwrap_err();
        assert!(err.is_decryption_failure());
    }

    #[test]
    fn test_closed_sink_fails_encrypt() {
        let mut sink = ClosedAfter { limit: 40, taken: 0 };
        let err = encrypt_stream(&make_data(4096)[..], &mut sink, &pw("p"), 64).unwrap_err();
        assert!(matches!(err, CryptoError::Io(ref e) if e.kind() == ErrorKind::BrokenPipe));
    }

    #[test]
    fn test_closed_source_fails_decrypt() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::from(ErrorKind::ConnectionReset))
            }
        }

        let mut out = Vec::new();
        let err = decrypt_stream(Broken, &mut out, &pw("p"), 64).unwrap_err();
        assert!(matches!(err, CryptoError::Io(ref e) if e.kind() == ErrorKind::ConnectionReset));
    }

    #[test]
    fn test_file_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let src = tmp.path().join("plain.bin");
        let enc = tmp.path().join("plain.bin.enc");
        let dst = tmp.path().join("plain.out");
        let data = make_data(70_000);
        std::fs::write(&src, &data).unwrap();

        let password = pw("file");
        encrypt_stream(
            std::fs::File::open(&src).unwrap(),
            std::fs::File::create(&enc).unwrap(),
            &password,
            DEFAULT_BUFFER_SIZE,
        )
        .unwrap();
        decrypt_stream(
            std::fs::File::open(&enc).unwrap(),
            std::fs::File::create(&dst).unwrap(),
            &password,
            DEFAULT_BUFFER_SIZE,
        )
        .unwrap();

        assert_eq!(std::fs::read(&dst).unwrap(), data);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn stream_roundtrip_any_buffer(
            data in proptest::collection::vec(any::<u8>(), 0..=4096),
            enc_buf in 1usize..=300,
            dec_buf in 1usize..=300,
        ) {
            prop_assert_eq!(roundtrip(&data, enc_buf, dec_buf), data);
        }
    }
}
