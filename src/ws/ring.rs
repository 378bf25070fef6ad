//! Per-client transmit ring.
//!
//! Frames are queued whole or not at all, so the drain side can ship any
//! prefix of the ring without ever leaving a torn frame behind.

use heapless::spsc::Queue;

pub const TX_RING_SIZE: usize = 4096;

pub struct TxRing {
    q: Queue<u8, TX_RING_SIZE>,
}

impl TxRing {
    pub const fn new() -> Self {
        Self { q: Queue::new() }
    }

    /// Storage size. One slot is always kept free, so at most
    /// `capacity() - 1` bytes are ever queued.
    pub const fn capacity(&self) -> usize {
        TX_RING_SIZE
    }

    pub fn available(&self) -> usize {
        self.q.len()
    }

    pub fn free_space(&self) -> usize {
        TX_RING_SIZE - 1 - self.q.len()
    }

    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
    }

    /// Queue the concatenation of `parts`, or nothing if it does not fit.
    pub fn push_all(&mut self, parts: &[&[u8]]) -> bool {
        let total: usize = parts.iter().map(|p| p.len()).sum();
        if total > self.free_space() {
            return false;
        }
        for &b in parts.iter().flat_map(|p| p.iter()) {
            // Cannot fail: room was checked above.
            self.q.enqueue(b).ok();
        }
        true
    }

    /// Copy up to `out.len()` queued bytes without consuming them.
    pub fn peek(&self, out: &mut [u8]) -> usize {
        let mut n = 0;
        for (dst, &src) in out.iter_mut().zip(self.q.iter()) {
            *dst = src;
            n += 1;
        }
        n
    }

    /// Drop `n` bytes from the front, after the NIC took them.
    pub fn consume(&mut self, n: usize) {
        for _ in 0..n {
            if self.q.dequeue().is_none() {
                break;
            }
        }
    }

    pub fn clear(&mut self) {
        while self.q.dequeue().is_some() {}
    }
}

impl Default for TxRing {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invariant(r: &TxRing) -> bool {
        r.available() + r.free_space() == r.capacity() - 1
    }

    #[test]
    fn fills_to_capacity_then_refuses() {
        let mut r = TxRing::new();
        let frame = [0xABu8; 100];
        let mut queued = 0;
        while r.push_all(&[&frame[..2], &frame[2..]]) {
            queued += 1;
            assert!(invariant(&r));
        }
        assert_eq!(queued, 40);
        assert_eq!(r.available(), 4000);
        assert_eq!(r.free_space(), 95);

        assert!(!r.push_all(&[&frame[..]]));
        assert_eq!(r.available(), 4000);
        assert!(invariant(&r));
        assert!(r.push_all(&[&frame[..95]]));
        assert_eq!(r.free_space(), 0);
        assert!(!r.push_all(&[&[1u8][..]]));
        assert!(invariant(&r));
    }

    #[test]
    fn peek_then_consume_preserves_order() {
        let mut r = TxRing::new();
        assert!(r.push_all(&[&b"abc"[..], &b"def"[..]]));
        let mut out = [0u8; 4];
        assert_eq!(r.peek(&mut out), 4);
        assert_eq!(&out, b"abcd");
        assert_eq!(r.available(), 6);
        r.consume(2);
        let mut out = [0u8; 8];
        assert_eq!(r.peek(&mut out), 4);
        assert_eq!(&out[..4], b"cdef");
        r.clear();
        assert!(r.is_empty());
        assert!(invariant(&r));
    }

    #[test]
    fn wraps_around() {
        let mut r = TxRing::new();
        let block = [7u8; 3000];
        assert!(r.push_all(&[&block[..]]));
        r.consume(3000);
        assert!(r.push_all(&[&block[..]]));
        assert_eq!(r.available(), 3000);
        assert!(invariant(&r));
    }
}
