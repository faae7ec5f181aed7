//! Deadline-bounded byte IO over the UART.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Size of the read-ahead buffer in front of the UART.
const READ_BUFFER_SIZE: usize = 2048;

/// The UART byte stream plus the cancellation token that aborts waits on it.
///
/// Every read takes an absolute deadline. A read that hits its deadline, or
/// that is cancelled, returns "nothing" rather than an error; only real
/// transport failures surface as `Err`.
#[derive(Debug)]
pub struct Transport<T> {
    io: BufReader<T>,
    cancel: CancellationToken,
}

impl<T: AsyncRead + AsyncWrite + Unpin> Transport<T> {
    pub fn new(io: T, cancel: CancellationToken) -> Self {
        Transport {
            io: BufReader::with_capacity(READ_BUFFER_SIZE, io),
            cancel,
        }
    }

    /// Replace the token that aborts waits.
    pub fn set_cancellation_token(&mut self, cancel: CancellationToken) {
        self.cancel = cancel;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Read one byte. `Ok(None)` on deadline or cancellation.
    pub async fn read_byte(&mut self, deadline: Instant) -> io::Result<Option<u8>> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Ok(None),
            read = tokio::time::timeout_at(deadline, self.io.read_u8()) => match read {
                Ok(Ok(byte)) => Ok(Some(byte)),
                Ok(Err(e)) => Err(e),
                Err(_) => Ok(None),
            },
        }
    }

    /// Fill `buf` completely. `Ok(false)` if the deadline passes or the wait is
    /// cancelled first; the bytes read so far are lost.
    pub async fn read_exact(&mut self, buf: &mut [u8], deadline: Instant) -> io::Result<bool> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Ok(false),
            read = tokio::time::timeout_at(deadline, self.io.read_exact(buf)) => match read {
                Ok(Ok(_)) => Ok(true),
                Ok(Err(e)) => Err(e),
                Err(_) => Ok(false),
            },
        }
    }

    /// Write and flush.
    pub async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let writer = self.io.get_mut();
        writer.write_all(data).await?;
        writer.flush().await
    }

    /// Throw away everything that is already waiting to be read. Returns the
    /// number of bytes discarded.
    pub async fn discard_pending(&mut self) -> io::Result<usize> {
        let mut scratch = [0u8; 256];
        let mut discarded = 0;
        loop {
            match tokio::time::timeout(Duration::ZERO, self.io.read(&mut scratch)).await {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(n)) => discarded += n,
                Ok(Err(e)) => return Err(e),
            }
        }
        if discarded > 0 {
            trace!(bytes = discarded, "discarded stale input");
        }
        Ok(discarded)
    }

    /// Sleep, returning early with `false` if cancelled.
    pub async fn pause(&mut self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    pub fn into_inner(self) -> T {
        self.io.into_inner()
    }
}
