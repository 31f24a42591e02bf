//! Bounded byte ring that captured scans are pushed into, and that the transport drains.

use core::ops::{Add, AddAssign};
use std::io;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingCursor {
    index: usize,
    bound: usize,
}

impl RingCursor {
    pub fn new(bound: usize) -> RingCursor {
        RingCursor { index: 0, bound }
    }

    pub fn into_inner(self) -> usize {
        self.index
    }
}

impl Add<usize> for RingCursor {
    type Output = RingCursor;

    fn add(self, offset: usize) -> Self::Output {
        if self.bound == 0 { return self }
        RingCursor { index: self.index.wrapping_add(offset) % self.bound, bound: self.bound }
    }
}

impl AddAssign<usize> for RingCursor {
    fn add_assign(&mut self, offset: usize) {
        *self = *self + offset
    }
}

/// The capture buffer.
///
/// The capacity requested with [`set_capacity`](Self::set_capacity) is only a bound: on the
/// first push of a session it is truncated to a whole number of scans, so that a scan never
/// straddles the point where the transport would stop reading. This happens once per session;
/// [`begin_session`](Self::begin_session) re-arms it.
///
/// A push that does not fit is rejected as a whole with [`Error::BufferFull`]; the buffer never
/// overwrites data that has not been drained.
#[derive(Debug)]
pub struct RingBufferSink {
    storage: Vec<u8>,
    requested: usize,
    capacity: usize,
    bytes_per_scan: usize,
    finalized: bool,
    read: RingCursor,
    write: RingCursor,
    len: usize,
}

impl RingBufferSink {
    pub fn new(capacity: usize) -> RingBufferSink {
        RingBufferSink {
            storage: vec![0; capacity],
            requested: capacity,
            capacity,
            bytes_per_scan: 1,
            finalized: false,
            read: RingCursor::new(capacity),
            write: RingCursor::new(capacity),
            len: 0,
        }
    }

    /// Record the capacity for the next session. The alignment to scans is deferred to the
    /// first push.
    pub fn set_capacity(&mut self, total_bytes: usize) {
        log::debug!("set_capacity({})", total_bytes);
        self.requested = total_bytes;
    }

    /// Discard any buffered data and prepare for a session producing `bytes_per_scan` byte scans.
    pub fn begin_session(&mut self, bytes_per_scan: usize) {
        assert!(bytes_per_scan > 0);
        self.bytes_per_scan = bytes_per_scan;
        self.finalized = false;
        self.storage.resize(self.requested, 0);
        self.clear();
    }

    pub fn bytes_per_scan(&self) -> usize {
        self.bytes_per_scan
    }

    /// Requested capacity until the first push of a session, aligned capacity afterwards.
    pub fn capacity(&self) -> usize {
        if self.finalized { self.capacity } else { self.requested }
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of bytes that can be pushed before the buffer is full.
    pub fn available(&self) -> usize {
        self.capacity() - self.len
    }

    /// Number of complete scans waiting to be drained.
    pub fn scans(&self) -> usize {
        self.len / self.bytes_per_scan
    }

    fn finalize(&mut self) {
        self.capacity = (self.requested / self.bytes_per_scan) * self.bytes_per_scan;
        if self.storage.len() < self.capacity {
            self.storage.resize(self.capacity, 0);
        }
        self.finalized = true;
        self.read = RingCursor::new(self.capacity);
        self.write = RingCursor::new(self.capacity);
        log::debug!("capacity finalized at {} bytes ({} requested, {} bytes per scan)",
                    self.capacity, self.requested, self.bytes_per_scan);
    }

    pub fn push(&mut self, bytes: &[u8]) -> Result<()> {
        if !self.finalized {
            self.finalize();
        }
        let available = self.capacity - self.len;
        if bytes.len() > available {
            return Err(Error::BufferFull { needed: bytes.len(), available })
        }
        let start = self.write.into_inner();
        let head = bytes.len().min(self.capacity - start);
        self.storage[start..start + head].copy_from_slice(&bytes[..head]);
        self.storage[..bytes.len() - head].copy_from_slice(&bytes[head..]);
        self.write += bytes.len();
        self.len += bytes.len();
        Ok(())
    }

    /// Move up to `data.len()` of the oldest bytes into `data`, returning how many were moved.
    pub fn drain(&mut self, data: &mut [u8]) -> usize {
        let count = data.len().min(self.len);
        if count == 0 { return 0 }
        let start = self.read.into_inner();
        let head = count.min(self.capacity - start);
        data[..head].copy_from_slice(&self.storage[start..start + head]);
        data[head..count].copy_from_slice(&self.storage[..count - head]);
        self.read += count;
        self.len -= count;
        count
    }

    /// Like `drain`, but moves whole samples of type `T` only, returning how many were moved.
    pub fn drain_samples<T: bytemuck::Pod>(&mut self, samples: &mut [T]) -> usize {
        let size = core::mem::size_of::<T>();
        let count = (self.len / size).min(samples.len());
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut samples[..count]);
        self.drain(bytes) / size
    }

    pub fn clear(&mut self) {
        self.read = RingCursor::new(self.capacity);
        self.write = RingCursor::new(self.capacity);
        self.len = 0;
    }
}

/// Reading never blocks; an empty buffer reads as zero bytes.
impl io::Read for RingBufferSink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.drain(buf))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Read;

    fn sink(capacity: usize, bytes_per_scan: usize) -> RingBufferSink {
        let mut sink = RingBufferSink::new(0);
        sink.set_capacity(capacity);
        sink.begin_session(bytes_per_scan);
        sink
    }

    #[test]
    fn test_ring_cursor() {
        let cursor = RingCursor::new(128);
        assert_eq!((cursor + 10).index, 10);
        assert_eq!((cursor + 10 + 120).index, 2);
        assert_eq!((cursor + 130).index, 2);
        assert_eq!((cursor + 0), cursor);
        let mut cursor = cursor;
        cursor += 127;
        assert_eq!(cursor.index, 127);
        cursor += 1;
        assert_eq!(cursor.index, 0);
        assert_eq!((RingCursor::new(0) + 5).index, 0);
    }

    #[test]
    fn test_capacity_already_aligned() {
        let mut sink = sink(32768, 4);
        assert!(!sink.is_finalized());
        sink.push(&[1, 2, 3, 4]).unwrap();
        assert!(sink.is_finalized());
        assert_eq!(sink.capacity(), 32768);
    }

    #[test]
    fn test_capacity_truncated_to_scans() {
        let mut sink = sink(100, 6);
        assert_eq!(sink.capacity(), 100);
        sink.push(&[0; 6]).unwrap();
        assert_eq!(sink.capacity(), 96);
        sink.push(&[0; 6]).unwrap();
        sink.push(&[0; 6]).unwrap();
        assert_eq!(sink.capacity(), 96);
    }

    #[test]
    fn test_finalized_capacity_divisible_by_scan() {
        for requested in [1, 7, 64, 100, 1000, 4097, 32768] {
            for bytes_per_scan in 1..=16 {
                let mut sink = sink(requested, bytes_per_scan);
                let _ = sink.push(&[]);
                assert_eq!(sink.capacity() % bytes_per_scan, 0);
                assert_eq!(sink.capacity(), requested / bytes_per_scan * bytes_per_scan);
                assert!(sink.capacity() <= requested);
            }
        }
    }

    #[test]
    fn test_finalized_once_per_session() {
        let mut sink = sink(100, 6);
        sink.push(&[0; 6]).unwrap();
        assert_eq!(sink.capacity(), 96);
        // takes effect at the next session only
        sink.set_capacity(50);
        sink.push(&[0; 6]).unwrap();
        assert_eq!(sink.capacity(), 96);
        sink.begin_session(4);
        assert!(!sink.is_finalized());
        assert!(sink.is_empty());
        sink.push(&[0; 4]).unwrap();
        assert_eq!(sink.capacity(), 48);
    }

    #[test]
    fn test_round_trip_two_channels() {
        let mut sink = sink(64, 4);
        let s0_ch0 = [0x01, 0x02];
        let s0_ch1 = [0x11, 0x12];
        let s1_ch0 = [0x21, 0x22];
        let s1_ch1 = [0x31, 0x32];
        sink.push(&[s0_ch0, s0_ch1].concat()).unwrap();
        sink.push(&[s1_ch0, s1_ch1].concat()).unwrap();
        assert_eq!(sink.scans(), 2);
        let mut data = [0; 8];
        assert_eq!(sink.drain(&mut data), 8);
        assert_eq!(data, [0x01, 0x02, 0x11, 0x12, 0x21, 0x22, 0x31, 0x32]);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_overrun_is_rejected() {
        let mut sink = sink(10, 3);
        sink.push(&[1, 2, 3]).unwrap();
        sink.push(&[4, 5, 6]).unwrap();
        sink.push(&[7, 8, 9]).unwrap();
        assert!(matches!(sink.push(&[10, 11, 12]),
                         Err(Error::BufferFull { needed: 3, available: 0 })));
        assert_eq!(sink.len(), 9);
        let mut data = [0; 9];
        sink.drain(&mut data);
        assert_eq!(data, [1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_wrap_around() {
        let mut sink = sink(8, 2);
        let mut data = [0; 6];
        sink.push(&[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(sink.drain(&mut data[..4]), 4);
        sink.push(&[7, 8, 9, 10, 11, 12]).unwrap();
        assert_eq!(sink.available(), 0);
        let mut data = [0; 8];
        assert_eq!(sink.drain(&mut data), 8);
        assert_eq!(data, [5, 6, 7, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn test_drain_samples() {
        let mut sink = sink(16, 4);
        sink.push(&[0x34, 0x12, 0x78, 0x56]).unwrap();
        sink.push(&[0xcd, 0xab]).unwrap();
        sink.push(&[0xff]).unwrap();
        let mut samples = [0u16; 8];
        assert_eq!(sink.drain_samples(&mut samples), 3);
        assert_eq!(samples[..3], [0x1234, 0x5678, 0xabcd]);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_read() {
        let mut sink = sink(16, 1);
        sink.push(b"scan").unwrap();
        let mut text = String::new();
        sink.read_to_string(&mut text).unwrap();
        assert_eq!(text, "scan");
        assert_eq!(sink.read(&mut [0; 4]).unwrap(), 0);
    }
}
