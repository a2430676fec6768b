//! Fixed-capacity byte rings bridging the codec and the transport.
//!
//! The TX ring collects encoded frames until the transport accepts them, which
//! may take several partial writes. The RX ring collects received chunks until
//! a complete frame is available for decoding.

use super::error::Error;
use heapless::{Deque, Vec};

/// Sink the packet encoder writes into.
///
/// Implementations must reject a write that does not fit instead of storing
/// a prefix of it.
pub trait BufMut {
    /// Number of bytes that can still be written.
    fn remaining_mut(&self) -> usize;

    /// Append `src` in full, or fail without writing anything.
    fn put_slice(&mut self, src: &[u8]) -> Result<(), Error>;

    /// Append a single byte.
    fn put_u8(&mut self, byte: u8) -> Result<(), Error> {
        self.put_slice(&[byte])
    }

    /// Append a big-endian `u16`.
    fn put_u16(&mut self, value: u16) -> Result<(), Error> {
        self.put_slice(&value.to_be_bytes())
    }
}

impl<const N: usize> BufMut for Vec<u8, N> {
    fn remaining_mut(&self) -> usize {
        N - self.len()
    }

    fn put_slice(&mut self, src: &[u8]) -> Result<(), Error> {
        self.extend_from_slice(src).map_err(|_| Error::PacketTooLarge)
    }
}

/// A byte ring with compile-time capacity `N`.
///
/// # Examples
///
/// ```rust
/// use cellmqtt::network::application::mqtt::RingBuffer;
///
/// let mut ring: RingBuffer<8> = RingBuffer::new();
/// assert_eq!(ring.fill(b"hello world"), 8);
/// assert_eq!(ring.free(), 0);
///
/// let mut out = [0u8; 5];
/// assert_eq!(ring.read(&mut out), 5);
/// assert_eq!(&out, b"hello");
/// assert_eq!(ring.len(), 3);
/// ```
#[derive(Debug)]
pub struct RingBuffer<const N: usize> {
    inner: Deque<u8, N>,
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RingBuffer<N> {
    /// Create an empty ring. A zero capacity is rejected at compile time.
    pub const fn new() -> Self {
        const { assert!(N > 0, "ring buffer capacity must be non-zero") };
        Self {
            inner: Deque::new(),
        }
    }

    /// Total capacity in bytes.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Bytes currently stored.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Bytes that can still be stored.
    pub fn free(&self) -> usize {
        N - self.inner.len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Drop every stored byte.
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Store as much of `data` as fits and return how many bytes were taken.
    pub fn fill(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.free());
        for &byte in &data[..n] {
            // Cannot fail: `n` is bounded by the free space.
            let _ = self.inner.push_back(byte);
        }
        n
    }

    /// Byte at `index` counted from the oldest stored byte.
    pub fn peek(&self, index: usize) -> Option<u8> {
        self.inner.iter().nth(index).copied()
    }

    /// The oldest stored bytes that are contiguous in memory.
    pub fn chunk(&self) -> &[u8] {
        self.inner.as_slices().0
    }

    /// Discard up to `n` of the oldest bytes, returning how many were dropped.
    pub fn consume(&mut self, n: usize) -> usize {
        let n = n.min(self.inner.len());
        for _ in 0..n {
            self.inner.pop_front();
        }
        n
    }

    /// Move the oldest bytes into `out`, returning how many were copied.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let mut n = 0;
        while n < out.len() {
            match self.inner.pop_front() {
                Some(byte) => {
                    out[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        n
    }
}

impl<const N: usize> BufMut for RingBuffer<N> {
    fn remaining_mut(&self) -> usize {
        self.free()
    }

    fn put_slice(&mut self, src: &[u8]) -> Result<(), Error> {
        if src.len() > self.free() {
            return Err(Error::Busy);
        }
        self.fill(src);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_stops_at_capacity() {
        let mut ring: RingBuffer<4> = RingBuffer::new();
        assert_eq!(ring.fill(&[1, 2, 3]), 3);
        assert_eq!(ring.fill(&[4, 5, 6]), 1);
        assert_eq!(ring.len(), 4);
        assert_eq!(ring.free(), 0);
    }

    #[test]
    fn test_put_slice_is_all_or_nothing() {
        let mut ring: RingBuffer<4> = RingBuffer::new();
        ring.put_slice(&[1, 2]).unwrap();
        assert_eq!(ring.put_slice(&[3, 4, 5]), Err(Error::Busy));
        assert_eq!(ring.len(), 2);
        ring.put_slice(&[3, 4]).unwrap();
        assert_eq!(ring.free(), 0);
    }

    #[test]
    fn test_wraparound_keeps_order() {
        let mut ring: RingBuffer<4> = RingBuffer::new();
        ring.fill(&[1, 2, 3]);
        assert_eq!(ring.consume(2), 2);
        ring.fill(&[4, 5, 6]);

        assert_eq!(ring.peek(0), Some(3));
        assert_eq!(ring.peek(3), Some(6));
        assert_eq!(ring.peek(4), None);

        let mut out = [0u8; 4];
        assert_eq!(ring.read(&mut out), 4);
        assert_eq!(out, [3, 4, 5, 6]);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_chunk_is_a_prefix() {
        let mut ring: RingBuffer<4> = RingBuffer::new();
        ring.fill(&[1, 2, 3, 4]);
        ring.consume(3);
        ring.fill(&[5, 6]);

        let chunk = ring.chunk();
        assert!(!chunk.is_empty());
        assert_eq!(chunk[0], 4);
        assert!(chunk.len() <= ring.len());
    }

    #[test]
    fn test_vec_sink_reports_too_large() {
        let mut vec: Vec<u8, 2> = Vec::new();
        assert_eq!(vec.put_u16(0xABCD), Ok(()));
        assert_eq!(vec.put_u8(1), Err(Error::PacketTooLarge));
        assert_eq!(&vec[..], &[0xAB, 0xCD]);
    }
}
