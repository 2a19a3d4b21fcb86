//! In-memory byte pipes shared between the adapter and the engine.
//!
//! A [`BytePipe`] is an unbounded FIFO: the engine and the adapter each
//! see one end of it.  Writes never block and never fail; it is up to the
//! adapter to keep the amount of buffered data reasonable.

use std::collections::VecDeque;

/// A unidirectional, unbounded, in-memory byte FIFO.
///
/// Tracks how many bytes have ever passed through each end, so that
/// callers can tell whether anything moved between two observations.
#[derive(Clone, Debug, Default)]
pub struct BytePipe {
    /// Bytes written but not yet read.
    buf: VecDeque<u8>,
    /// Total number of bytes ever consumed by [`BytePipe::read`].
    total_read: u64,
    /// Total number of bytes ever appended by [`BytePipe::write`].
    total_written: u64,
}

impl BytePipe {
    /// Create a new empty pipe.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` to the tail of the pipe.
    pub fn write(&mut self, bytes: &[u8]) {
        self.buf.extend(bytes);
        self.total_written += bytes.len() as u64;
    }

    /// Remove up to `out.len()` bytes from the head of the pipe into `out`.
    ///
    /// Returns the number of bytes copied; zero if the pipe is empty.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let n = self.peek(out);
        self.buf.drain(..n);
        self.total_read += n as u64;
        n
    }

    /// Remove and return up to `max` bytes from the head of the pipe.
    pub fn read_vec(&mut self, max: usize) -> Vec<u8> {
        let n = max.min(self.buf.len());
        self.total_read += n as u64;
        self.buf.drain(..n).collect()
    }

    /// Copy up to `out.len()` bytes from the head of the pipe without
    /// consuming them.
    pub fn peek(&self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.buf.len());
        let (front, back) = self.buf.as_slices();
        if n <= front.len() {
            out[..n].copy_from_slice(&front[..n]);
        } else {
            let split = front.len();
            out[..split].copy_from_slice(front);
            out[split..n].copy_from_slice(&back[..n - split]);
        }
        n
    }

    /// Number of bytes currently buffered.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Return true if no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Total number of bytes ever read from this pipe.
    pub fn total_read(&self) -> u64 {
        self.total_read
    }

    /// Total number of bytes ever written to this pipe.
    pub fn total_written(&self) -> u64 {
        self.total_written
    }
}

/// The two pipes connecting an engine to a transport.
#[derive(Clone, Debug, Default)]
#[allow(clippy::exhaustive_structs)]
pub struct PipePair {
    /// Ciphertext received from the transport, waiting for the engine.
    pub read: BytePipe,
    /// Ciphertext produced by the engine, waiting for the transport.
    pub write: BytePipe,
}

impl PipePair {
    /// Build a pair from two pipes.
    pub fn new(read: BytePipe, write: BytePipe) -> Self {
        PipePair { read, write }
    }
}

#[cfg(test)]
mod test {
    // @@ begin test lint list maintained by maint/add_warning @@
    #![allow(clippy::bool_assert_comparison)]
    #![allow(clippy::clone_on_copy)]
    #![allow(clippy::dbg_macro)]
    #![allow(clippy::mixed_attributes_style)]
    #![allow(clippy::print_stderr)]
    #![allow(clippy::print_stdout)]
    #![allow(clippy::single_char_pattern)]
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::unchecked_time_subtraction)]
    #![allow(clippy::useless_vec)]
    #![allow(clippy::needless_pass_by_value)]
    //! <!-- @@ end test lint list maintained by maint/add_warning @@ -->
    use super::*;

    #[test]
    fn fifo() {
        let mut p = BytePipe::new();
        assert!(p.is_empty());
        p.write(b"hello ");
        p.write(b"world");
        assert_eq!(p.pending(), 11);

        let mut buf = [0_u8; 4];
        assert_eq!(p.read(&mut buf), 4);
        assert_eq!(&buf, b"hell");
        assert_eq!(p.read_vec(100), b"o world".to_vec());
        assert_eq!(p.pending(), 0);
        assert_eq!(p.read(&mut buf), 0);
        assert_eq!(p.total_written(), 11);
        assert_eq!(p.total_read(), 11);
    }

    #[test]
    fn peek_across_wrap() {
        let mut p = BytePipe::new();
        // Force the ring buffer to wrap around.
        p.write(&[1; 6]);
        assert_eq!(p.read_vec(5).len(), 5);
        p.write(&[2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);

        let mut buf = [0_u8; 8];
        assert_eq!(p.peek(&mut buf), 8);
        assert_eq!(buf, [1, 2, 3, 4, 5, 6, 7, 8]);
        // Nothing consumed.
        assert_eq!(p.pending(), 12);
        assert_eq!(p.total_read(), 5);
    }

    #[test]
    fn counters_track_pending() {
        let mut p = BytePipe::new();
        for i in 0..10_u8 {
            p.write(&vec![i; usize::from(i)]);
            let _ = p.read_vec(3);
            assert_eq!(p.total_written() - p.total_read(), p.pending() as u64);
        }
    }
}
