//! Byte device abstraction
//!
//! The transport engine talks to hardware through the [`Device`] trait so
//! that real serial ports and test doubles are interchangeable. The read
//! calls encode connection health in their return value: `None` means the
//! device failed or went away, an empty buffer means nothing arrived before
//! the device's read timeout.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A byte-oriented device usable by the transport engine.
///
/// Implementations are owned by one engine at a time and accessed behind a
/// lock, so methods take `&mut self` and do their own short blocking.
pub trait Device: Send {
    /// Try to open the device. Returns `false` on failure (already-open
    /// devices report `true`).
    fn open(&mut self) -> bool;

    /// Close the device, flushing pending output first. Closing a closed
    /// device is a no-op.
    fn close(&mut self);

    /// Drain pending output, discard nothing. No-op when closed.
    fn flush(&mut self);

    /// Whether the device is currently open
    fn is_open(&self) -> bool;

    /// Write `data`, returning the number of bytes accepted (0 when closed
    /// or failed).
    fn write(&mut self, data: &[u8]) -> usize;

    /// Read up to `size` bytes, waiting at most the device's read timeout.
    ///
    /// `None` means the device is closed or disconnected; `Some` with fewer
    /// bytes than requested (possibly zero) means the timeout expired first.
    fn read(&mut self, size: usize) -> Option<Vec<u8>>;

    /// Read bytes until `delimiter` is seen (inclusive) or the read timeout
    /// expires, in which case whatever arrived is returned. `None` means
    /// closed or disconnected.
    fn read_until(&mut self, delimiter: u8) -> Option<Vec<u8>>;

    /// Identity of the underlying port, if the device has one. Devices
    /// without an identity are rejected by
    /// [`Stream::set_device`](super::Stream::set_device).
    fn port(&self) -> Option<&str>;
}

/// Default read timeout for [`LoopDevice`]
const LOOP_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Granularity of the loopback read polling
const LOOP_POLL: Duration = Duration::from_millis(1);

/// In-memory loopback device.
///
/// Every write lands in a shared buffer that reads consume, so a stream
/// talking to a `LoopDevice` receives its own frames back. Clones share the
/// buffer but carry their own open/closed state, which lets a test keep a
/// handle for injecting bytes while the engine owns the original.
#[derive(Debug, Clone)]
pub struct LoopDevice {
    buffer: Arc<Mutex<VecDeque<u8>>>,
    open: bool,
    read_timeout: Duration,
}

impl LoopDevice {
    /// Create a closed loopback device with the default read timeout
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(Mutex::new(VecDeque::new())),
            open: false,
            read_timeout: LOOP_READ_TIMEOUT,
        }
    }

    /// Create a closed loopback device with a custom read timeout
    pub fn with_timeout(read_timeout: Duration) -> Self {
        Self {
            read_timeout,
            ..Self::new()
        }
    }

    /// Number of bytes currently queued
    pub fn pending(&self) -> usize {
        self.buffer.lock().map(|b| b.len()).unwrap_or(0)
    }

    fn pop_front(&self, max: usize) -> Vec<u8> {
        match self.buffer.lock() {
            Ok(mut buffer) => {
                let take = max.min(buffer.len());
                buffer.drain(..take).collect()
            }
            Err(_) => Vec::new(),
        }
    }

    /// Pop bytes through the first `delimiter`, or `None` if the buffer
    /// does not contain one yet.
    fn pop_through(&self, delimiter: u8) -> Option<Vec<u8>> {
        match self.buffer.lock() {
            Ok(mut buffer) => buffer
                .iter()
                .position(|&b| b == delimiter)
                .map(|pos| buffer.drain(..=pos).collect()),
            Err(_) => None,
        }
    }
}

impl Default for LoopDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for LoopDevice {
    fn open(&mut self) -> bool {
        self.open = true;
        true
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn flush(&mut self) {}

    fn is_open(&self) -> bool {
        self.open
    }

    fn write(&mut self, data: &[u8]) -> usize {
        if !self.open {
            return 0;
        }
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.extend(data.iter().copied());
            data.len()
        } else {
            0
        }
    }

    fn read(&mut self, size: usize) -> Option<Vec<u8>> {
        if !self.open {
            return None;
        }
        let deadline = Instant::now() + self.read_timeout;
        loop {
            let chunk = self.pop_front(size);
            if !chunk.is_empty() || Instant::now() >= deadline {
                return Some(chunk);
            }
            std::thread::sleep(LOOP_POLL);
        }
    }

    fn read_until(&mut self, delimiter: u8) -> Option<Vec<u8>> {
        if !self.open {
            return None;
        }
        let deadline = Instant::now() + self.read_timeout;
        loop {
            if let Some(chunk) = self.pop_through(delimiter) {
                return Some(chunk);
            }
            if Instant::now() >= deadline {
                // Timed out mid-frame; hand back what arrived.
                return Some(self.pop_front(usize::MAX));
            }
            std::thread::sleep(LOOP_POLL);
        }
    }

    fn port(&self) -> Option<&str> {
        Some("loop://")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_device_echoes_writes() {
        let mut device = LoopDevice::new();
        assert!(device.open());
        assert_eq!(device.write(&[1, 2, 3]), 3);
        assert_eq!(device.read(3), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_loop_device_closed_reads_fail() {
        let mut device = LoopDevice::new();
        assert_eq!(device.read(1), None);
        assert_eq!(device.read_until(0x00), None);
        assert_eq!(device.write(&[1]), 0);
    }

    #[test]
    fn test_loop_device_read_until_delimiter() {
        let mut device = LoopDevice::with_timeout(Duration::from_millis(20));
        device.open();
        device.write(&[0x05, 0x06, 0x00, 0x07]);

        assert_eq!(device.read_until(0x00), Some(vec![0x05, 0x06, 0x00]));
        assert_eq!(device.read(1), Some(vec![0x07]));
    }

    #[test]
    fn test_loop_device_read_until_timeout_returns_partial() {
        let mut device = LoopDevice::with_timeout(Duration::from_millis(20));
        device.open();
        device.write(&[0x09, 0x08]);

        assert_eq!(device.read_until(0x00), Some(vec![0x09, 0x08]));
    }

    #[test]
    fn test_loop_device_clones_share_buffer() {
        let mut device = LoopDevice::new();
        let mut tap = device.clone();
        device.open();
        tap.open();

        tap.write(&[0xAB]);
        assert_eq!(device.read(1), Some(vec![0xAB]));

        // Open state is per-handle.
        tap.close();
        assert!(device.is_open());
        assert!(!tap.is_open());
    }

    #[test]
    fn test_loop_device_read_empty_after_timeout() {
        let mut device = LoopDevice::with_timeout(Duration::from_millis(10));
        device.open();
        let started = Instant::now();
        assert_eq!(device.read(1), Some(Vec::new()));
        assert!(started.elapsed() >= Duration::from_millis(10));
    }
}
