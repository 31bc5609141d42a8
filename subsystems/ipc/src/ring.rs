//! # Ring Buffer
//!
//! Fixed-capacity circular byte buffer backing a pipe. Cursors wrap modulo
//! the capacity and `len() + available() == CAP` holds after every call.

use alloc::boxed::Box;
use alloc::vec;
use core::fmt;

/// Circular byte buffer of `CAP` bytes
pub struct RingBuffer<const CAP: usize> {
    /// Backing storage
    storage: Box<[u8]>,
    /// Next byte to read
    rp: usize,
    /// Next byte to write
    wp: usize,
    /// Bytes left to read
    leftovers: usize,
    /// Free bytes
    avail_space: usize,
}

impl<const CAP: usize> RingBuffer<CAP> {
    const NONZERO: () = assert!(CAP > 0, "ring buffer capacity must be non-zero");

    /// Create an empty buffer
    pub fn new() -> Self {
        let () = Self::NONZERO;
        Self {
            storage: vec![0u8; CAP].into_boxed_slice(),
            rp: 0,
            wp: 0,
            leftovers: 0,
            avail_space: CAP,
        }
    }

    /// Total capacity
    pub const fn capacity(&self) -> usize {
        CAP
    }

    /// Bytes waiting to be read
    pub fn len(&self) -> usize {
        self.leftovers
    }

    /// Check if there is nothing to read
    pub fn is_empty(&self) -> bool {
        self.leftovers == 0
    }

    /// Check if there is no room to write
    pub fn is_full(&self) -> bool {
        self.avail_space == 0
    }

    /// Free bytes
    pub fn available(&self) -> usize {
        self.avail_space
    }

    /// Copy as much of `src` as fits. Returns the number of bytes taken.
    pub fn push(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.avail_space);
        let first = n.min(CAP - self.wp);
        self.storage[self.wp..self.wp + first].copy_from_slice(&src[..first]);
        self.storage[..n - first].copy_from_slice(&src[first..n]);

        self.wp = (self.wp + n) % CAP;
        self.leftovers += n;
        self.avail_space -= n;
        self.check_invariants();
        n
    }

    /// Move up to `dst.len()` bytes out of the buffer. Returns the number of
    /// bytes copied.
    pub fn pop(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.leftovers);
        let first = n.min(CAP - self.rp);
        dst[..first].copy_from_slice(&self.storage[self.rp..self.rp + first]);
        dst[first..n].copy_from_slice(&self.storage[..n - first]);

        self.rp = (self.rp + n) % CAP;
        self.leftovers -= n;
        self.avail_space += n;
        self.check_invariants();
        n
    }

    fn check_invariants(&self) {
        assert!(
            self.leftovers <= CAP && self.leftovers + self.avail_space == CAP,
            "ring buffer accounting broken: leftovers {} avail {} cap {}",
            self.leftovers,
            self.avail_space,
            CAP
        );
    }
}

impl<const CAP: usize> Default for RingBuffer<CAP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAP: usize> fmt::Debug for RingBuffer<CAP> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &CAP)
            .field("rp", &self.rp)
            .field("wp", &self.wp)
            .field("leftovers", &self.leftovers)
            .field("avail_space", &self.avail_space)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_and_drain() {
        let mut ring = RingBuffer::<4>::new();
        assert!(ring.is_empty());
        assert_eq!(ring.push(b"abcdef"), 4);
        assert!(ring.is_full());
        assert_eq!(ring.push(b"x"), 0);

        let mut out = [0u8; 8];
        assert_eq!(ring.pop(&mut out), 4);
        assert_eq!(&out[..4], b"abcd");
        assert_eq!(ring.pop(&mut out), 0);
        assert_eq!(ring.available(), 4);
    }

    #[test]
    fn test_wraparound_preserves_order() {
        let mut ring = RingBuffer::<8>::new();
        let mut out = [0u8; 10];

        assert_eq!(ring.push(b"ABCDE"), 5);
        assert_eq!(ring.pop(&mut out[..3]), 3);
        assert_eq!(&out[..3], b"ABC");
        assert_eq!((ring.len(), ring.available()), (2, 6));

        // Write side wraps past the end of storage.
        assert_eq!(ring.push(b"FGHIJK"), 6);
        assert_eq!((ring.len(), ring.available()), (8, 0));

        // Read side wraps too.
        assert_eq!(ring.pop(&mut out), 8);
        assert_eq!(&out[..8], b"DEFGHIJK");
        assert_eq!((ring.len(), ring.available()), (0, 8));
    }

    #[test]
    fn test_many_small_cycles() {
        let mut ring = RingBuffer::<5>::new();
        let mut written = alloc::vec::Vec::new();
        let mut read = alloc::vec::Vec::new();
        let mut out = [0u8; 3];
        for round in 0u8..40 {
            let chunk = [round, round.wrapping_add(1)];
            let n = ring.push(&chunk);
            written.extend_from_slice(&chunk[..n]);
            let m = ring.pop(&mut out[..1 + (round as usize % 3)]);
            read.extend_from_slice(&out[..m]);
            assert_eq!(ring.len() + ring.available(), ring.capacity());
        }
        loop {
            let m = ring.pop(&mut out);
            if m == 0 {
                break;
            }
            read.extend_from_slice(&out[..m]);
        }
        assert_eq!(read, written);
    }
}
