//! Paced body streaming.
//!
//! Bytes go out in [`CHUNK_SIZE`] chunks. With a rate of `R` kilobits per
//! second, after each chunk the writer sleeps until
//! `bytes_sent * 8 / (R * 1024)` seconds have elapsed since the first byte.
//! A rate of `0` writes without pacing.
//!
//! The sleep blocks the calling thread; the kernel runs on a blocking worker.

use std::io::{self, Read};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::Transport;

/// Bytes per paced write.
pub const CHUNK_SIZE: usize = 1024;

/// Tracks elapsed time against bytes sent at a fixed rate.
#[derive(Debug)]
pub struct Pacer {
    kbps: u32,
    started: Instant,
    sent: u64,
}

impl Pacer {
    pub fn new(kbps: u32) -> Self {
        Self {
            kbps,
            started: Instant::now(),
            sent: 0,
        }
    }

    pub fn is_paced(&self) -> bool {
        self.kbps > 0
    }

    /// Total bytes recorded so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Minimum time the `sent` bytes may take at this rate.
    pub fn budget(&self) -> Duration {
        if self.kbps == 0 {
            return Duration::ZERO;
        }
        let bits_per_second = u64::from(self.kbps) * 1024;
        Duration::from_secs_f64((self.sent * 8) as f64 / bits_per_second as f64)
    }

    /// Records `bytes` as sent and sleeps until the rate is honoured.
    pub fn record(&mut self, bytes: usize) {
        self.sent += bytes as u64;
        if let Some(wait) = self.budget().checked_sub(self.started.elapsed()) {
            if !wait.is_zero() {
                thread::sleep(wait);
            }
        }
    }
}

/// Writes `data` to `transport` at `kbps`.
///
/// Returns the number of bytes written; fewer than `data.len()` when the
/// transport disconnects mid-stream.
pub fn stream_bytes(transport: &mut dyn Transport, data: &[u8], kbps: u32) -> io::Result<u64> {
    if kbps == 0 {
        transport.write(data)?;
        transport.flush()?;
        return Ok(data.len() as u64);
    }

    let mut pacer = Pacer::new(kbps);
    for chunk in data.chunks(CHUNK_SIZE) {
        if !transport.is_connected() {
            warn!(sent = pacer.sent(), total = data.len(), "connection lost, stream aborted");
            break;
        }
        transport.write(chunk)?;
        transport.flush()?;
        pacer.record(chunk.len());
    }
    debug!(sent = pacer.sent(), kbps, "paced stream finished");
    Ok(pacer.sent())
}

/// Copies up to `length` bytes from `reader` to `transport` at `kbps`.
///
/// Stops early at end of input or when the transport disconnects.
pub fn stream_reader<R: Read>(
    transport: &mut dyn Transport,
    mut reader: R,
    length: u64,
    kbps: u32,
) -> io::Result<u64> {
    let mut pacer = Pacer::new(kbps);
    let mut buf = [0u8; CHUNK_SIZE];
    let mut remaining = length;

    while remaining > 0 {
        if !transport.is_connected() {
            warn!(sent = pacer.sent(), total = length, "connection lost, stream aborted");
            break;
        }
        let want = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let read = reader.read(&mut buf[..want])?;
        if read == 0 {
            break;
        }
        transport.write(&buf[..read])?;
        if pacer.is_paced() {
            transport.flush()?;
        }
        pacer.record(read);
        remaining -= read as u64;
    }
    transport.flush()?;
    Ok(pacer.sent())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::transport::BufferTransport;

    #[test]
    fn unpaced_writes_everything_at_once() {
        let mut transport = BufferTransport::new();
        let sent = stream_bytes(&mut transport, &[7u8; 5000], 0).unwrap();
        assert_eq!(sent, 5000);
        assert_eq!(transport.writes(), 1);
    }

    #[test]
    fn paced_stream_takes_at_least_the_budget() {
        // 4 KiB at 64 kbit/s: 4096 * 8 / 65536 = 0.5 s.
        let mut transport = BufferTransport::new();
        let started = Instant::now();
        let sent = stream_bytes(&mut transport, &[1u8; 4096], 64).unwrap();
        assert_eq!(sent, 4096);
        assert_eq!(transport.writes(), 4);
        assert!(started.elapsed() >= Duration::from_millis(500));
    }

    #[test]
    fn disconnect_aborts_the_stream() {
        let mut transport = BufferTransport::new().disconnect_after(2);
        let sent = stream_bytes(&mut transport, &[0u8; 10 * CHUNK_SIZE], 8192).unwrap();
        assert_eq!(sent, 2 * CHUNK_SIZE as u64);
    }

    #[test]
    fn reader_honours_length() {
        let mut transport = BufferTransport::new();
        let mut cursor = Cursor::new(b"foobar".to_vec());
        cursor.set_position(1);
        let sent = stream_reader(&mut transport, cursor, 3, 0).unwrap();
        assert_eq!(sent, 3);
        assert_eq!(transport.body(), b"oob");
    }

    #[test]
    fn budget_matches_the_rate() {
        let mut pacer = Pacer::new(8);
        pacer.sent = 1024;
        assert_eq!(pacer.budget(), Duration::from_secs(1));
    }
}
