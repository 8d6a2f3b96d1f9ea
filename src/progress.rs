use std::io::{self, Read};

/// Default callback interval: 8 MiB.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 8 * 1024 * 1024;

/// A reader wrapper that invokes a callback every time the cumulative
/// number of bytes read crosses a multiple of `interval`. If one read
/// crosses several multiples, the callback fires once per crossed
/// multiple, in order.
///
/// Useful for surfacing ingestion progress on multi-gigabyte inputs
/// without the decoder knowing anything about the byte source.
#[derive(Debug)]
pub struct ProgressRead<R, F>
where
    R: Read,
    F: FnMut(u64),
{
    inner: R,
    callback: F,
    interval: u64,
    total_read: u64,
    next_threshold: u64,
}

impl<R, F> ProgressRead<R, F>
where
    R: Read,
    F: FnMut(u64),
{
    pub fn new(inner: R, callback: F) -> Self {
        Self::with_interval(inner, DEFAULT_PROGRESS_INTERVAL, callback)
    }

    /// A zero `interval` falls back to the default.
    pub fn with_interval(inner: R, interval: u64, callback: F) -> Self {
        let interval = if interval == 0 {
            DEFAULT_PROGRESS_INTERVAL
        } else {
            interval
        };
        ProgressRead {
            inner,
            callback,
            interval,
            total_read: 0,
            next_threshold: interval,
        }
    }

    /// Total bytes read from the underlying source so far.
    pub fn total_read(&self) -> u64 {
        self.total_read
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn maybe_fire(&mut self) {
        while self.total_read >= self.next_threshold {
            (self.callback)(self.total_read);
            // Saturate rather than wrap on absurdly long streams.
            let next = self.next_threshold.saturating_add(self.interval);
            if next <= self.next_threshold {
                break;
            }
            self.next_threshold = next;
        }
    }
}

impl<R, F> Read for ProgressRead<R, F>
where
    R: Read,
    F: FnMut(u64),
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.total_read = self.total_read.saturating_add(n as u64);
            self.maybe_fire();
        }
        Ok(n)
    }
}
