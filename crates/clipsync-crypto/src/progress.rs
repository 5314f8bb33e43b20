//! Progress observation for the transport-facing side of a stream

use std::io::Read;

/// Progress callback: fraction of the transfer read so far, in `[0, 1]`.
///
/// Called on the thread doing the I/O, so it should return quickly.
pub type ProgressFn = Box<dyn Fn(f64) + Send + Sync>;

/// A pass-through `Read` stage that reports how much of `total` has been read.
///
/// Reported fractions never decrease and never exceed 1.0. End of stream
/// always reports 1.0, including when the total was unknown. The callback
/// has no way to fail the read.
pub struct ProgressReader<R> {
    inner: R,
    total: Option<u64>,
    read: u64,
    last: f64,
    callback: Option<ProgressFn>,
}

impl<R: Read> ProgressReader<R> {
    pub fn new(inner: R, total: Option<u64>, callback: Option<ProgressFn>) -> Self {
        Self {
            inner,
            total: total.filter(|t| *t > 0),
            read: 0,
            last: 0.0,
            callback,
        }
    }

    /// Bytes that have passed through so far.
    pub fn bytes_read(&self) -> u64 {
        self.read
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn report(&mut self, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction <= self.last {
            return;
        }
        self.last = fraction;
        if let Some(cb) = &self.callback {
            cb(fraction);
        }
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 {
            if !buf.is_empty() {
                self.report(1.0);
            }
            return Ok(0);
        }

        self.read += n as u64;
        if let Some(total) = self.total {
            self.report(self.read as f64 / total as f64);
        }
        Ok(n)
    }
}
