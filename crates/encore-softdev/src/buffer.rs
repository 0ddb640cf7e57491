//! Shared host memory buffers.

use std::sync::{Arc, Mutex};

/// A byte buffer shared between the host and queued operations.
///
/// Cloning is cheap and aliases the same storage, which is exactly what a
/// captured operation needs: the payload keeps a handle, the test keeps
/// another, and replays observe whatever the buffer holds at execution time.
#[derive(Clone, Debug)]
pub struct HostBuffer {
    data: Arc<Mutex<Vec<u8>>>,
}

impl HostBuffer {
    /// Allocates a zero-filled buffer of `len` bytes.
    pub fn zeroed(len: usize) -> Self {
        Self {
            data: Arc::new(Mutex::new(vec![0; len])),
        }
    }

    /// Wraps existing bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Arc::new(Mutex::new(bytes.into())),
        }
    }

    /// Returns the buffer length in bytes.
    pub fn len(&self) -> usize {
        self.data.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Returns true if the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the whole buffer out.
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Overwrites `bytes.len()` bytes starting at `offset`.
    ///
    /// Out-of-range writes are truncated to the buffer.
    pub fn write(&self, offset: usize, bytes: &[u8]) {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        let end = (offset + bytes.len()).min(data.len());
        if offset < end {
            data[offset..end].copy_from_slice(&bytes[..end - offset]);
        }
    }

    /// Reads `len` bytes starting at `offset`, truncated to the buffer.
    pub fn read(&self, offset: usize, len: usize) -> Vec<u8> {
        let data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        let end = (offset + len).min(data.len());
        if offset < end {
            data[offset..end].to_vec()
        } else {
            Vec::new()
        }
    }

    /// Fills `len` bytes starting at `offset` with `byte`.
    pub fn fill(&self, offset: usize, len: usize, byte: u8) {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        let end = (offset + len).min(data.len());
        if offset < end {
            data[offset..end].fill(byte);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_alias_storage() {
        let a = HostBuffer::zeroed(4);
        let b = a.clone();
        a.write(1, &[7, 8]);
        assert_eq!(b.snapshot(), vec![0, 7, 8, 0]);
    }

    #[test]
    fn out_of_range_access_is_truncated() {
        let buf = HostBuffer::from_bytes([1, 2, 3]);
        buf.write(2, &[9, 9, 9]);
        assert_eq!(buf.snapshot(), vec![1, 2, 9]);
        assert_eq!(buf.read(2, 10), vec![9]);
        assert!(buf.read(5, 2).is_empty());
    }

    #[test]
    fn fill_range() {
        let buf = HostBuffer::zeroed(5);
        buf.fill(1, 3, 0xAB);
        assert_eq!(buf.snapshot(), vec![0, 0xAB, 0xAB, 0xAB, 0]);
    }
}
