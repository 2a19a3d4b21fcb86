//! An in-memory duplex transport with fault injection.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use educe::Educe;
use futures::channel::mpsc;
use futures::{AsyncRead, AsyncWrite, StreamExt as _};

/// One end of an in-memory byte stream.
///
/// Bytes written to one end of a [`pair`](MockTransport::pair) can be read
/// from the other.  Closing an end makes the other end see end-of-stream
/// once it has read everything that was sent.
#[derive(Educe)]
#[educe(Debug)]
pub struct MockTransport {
    /// Sends to the peer; `None` once closed.
    #[educe(Debug(ignore))]
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    /// Receives from the peer.
    #[educe(Debug(ignore))]
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    /// Part of a received chunk not yet read.
    leftover: Vec<u8>,
    /// Fault injection for this end.
    control: TransportControl,
}

/// A handle for changing how a [`MockTransport`] behaves, and inspecting
/// what was written to it.
#[derive(Clone, Debug, Default)]
pub struct TransportControl {
    /// Shared state.
    inner: Arc<Mutex<ControlState>>,
}

/// State behind a [`TransportControl`].
#[derive(Debug, Default)]
struct ControlState {
    /// Largest number of bytes a single write accepts.
    write_limit: Option<usize>,
    /// Fail every write with this kind of error.
    fail_writes: Option<io::ErrorKind>,
    /// Fail every read with this kind of error.
    fail_reads: Option<io::ErrorKind>,
    /// Leave writes pending.
    block_writes: bool,
    /// Task waiting on a blocked write.
    blocked: Option<Waker>,
    /// Everything ever written.
    written: Vec<u8>,
    /// Number of writes that accepted at least one byte.
    write_calls: usize,
}

impl TransportControl {
    /// Lock the state.
    fn state(&self) -> MutexGuard<'_, ControlState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Accept at most `limit` bytes per write.
    pub fn set_write_limit(&self, limit: Option<usize>) {
        self.state().write_limit = limit;
    }

    /// Make writes fail with `kind` (or succeed again, given `None`).
    pub fn fail_writes(&self, kind: Option<io::ErrorKind>) {
        self.state().fail_writes = kind;
    }

    /// Make reads fail with `kind` (or succeed again, given `None`).
    pub fn fail_reads(&self, kind: Option<io::ErrorKind>) {
        self.state().fail_reads = kind;
    }

    /// Make writes hang until unblocked.
    pub fn block_writes(&self, block: bool) {
        let mut st = self.state();
        st.block_writes = block;
        if !block {
            if let Some(waker) = st.blocked.take() {
                waker.wake();
            }
        }
    }

    /// Every byte written so far.
    pub fn written(&self) -> Vec<u8> {
        self.state().written.clone()
    }

    /// Number of writes that accepted data.
    pub fn write_calls(&self) -> usize {
        self.state().write_calls
    }
}

impl MockTransport {
    /// Construct one end.
    fn new(tx: mpsc::UnboundedSender<Vec<u8>>, rx: mpsc::UnboundedReceiver<Vec<u8>>) -> Self {
        MockTransport {
            tx: Some(tx),
            rx,
            leftover: Vec::new(),
            control: TransportControl::default(),
        }
    }

    /// Return two connected ends.
    pub fn pair() -> (MockTransport, MockTransport) {
        let (tx_a, rx_b) = mpsc::unbounded();
        let (tx_b, rx_a) = mpsc::unbounded();
        (MockTransport::new(tx_a, rx_a), MockTransport::new(tx_b, rx_b))
    }

    /// A handle to this end's fault injection and write log.
    pub fn control(&self) -> TransportControl {
        self.control.clone()
    }
}

impl AsyncRead for MockTransport {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        if let Some(kind) = self.control.state().fail_reads {
            return Poll::Ready(Err(kind.into()));
        }
        while self.leftover.is_empty() {
            match self.rx.poll_next_unpin(cx) {
                Poll::Ready(Some(chunk)) => self.leftover = chunk,
                Poll::Ready(None) => return Poll::Ready(Ok(0)),
                Poll::Pending => return Poll::Pending,
            }
        }
        let n = buf.len().min(self.leftover.len());
        buf[..n].copy_from_slice(&self.leftover[..n]);
        self.leftover.drain(..n);
        Poll::Ready(Ok(n))
    }
}

impl AsyncWrite for MockTransport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut st = self.control.state();
        if let Some(kind) = st.fail_writes {
            return Poll::Ready(Err(kind.into()));
        }
        if st.block_writes {
            st.blocked = Some(cx.waker().clone());
            return Poll::Pending;
        }
        let n = buf.len().min(st.write_limit.unwrap_or(usize::MAX));
        if n == 0 {
            return Poll::Ready(Ok(0));
        }
        let Some(tx) = &self.tx else {
            return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
        };
        if tx.unbounded_send(buf[..n].to_vec()).is_err() {
            return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
        }
        st.written.extend_from_slice(&buf[..n]);
        st.write_calls += 1;
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.tx = None;
        Poll::Ready(Ok(()))
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
    use futures::{AsyncReadExt as _, AsyncWriteExt as _, FutureExt as _};

    #[futures_await_test::async_test]
    async fn pair_and_close() {
        let (mut a, mut b) = MockTransport::pair();
        a.write_all(b"hello").await.unwrap();
        a.close().await.unwrap();
        let mut got = Vec::new();
        b.read_to_end(&mut got).await.unwrap();
        assert_eq!(got, b"hello");
        assert_eq!(a.control().written(), b"hello");
    }

    #[futures_await_test::async_test]
    async fn limits_and_faults() {
        let (mut a, _b) = MockTransport::pair();
        let ctl = a.control();
        ctl.set_write_limit(Some(2));
        assert_eq!(a.write(b"abcdef").await.unwrap(), 2);
        assert_eq!(ctl.write_calls(), 1);

        ctl.fail_writes(Some(io::ErrorKind::ConnectionReset));
        let e = a.write(b"x").await.unwrap_err();
        assert_eq!(e.kind(), io::ErrorKind::ConnectionReset);
        ctl.fail_writes(None);

        ctl.block_writes(true);
        assert!(a.write(b"x").now_or_never().is_none());
        ctl.block_writes(false);
        assert_eq!(a.write(b"x").await.unwrap(), 1);
        assert_eq!(ctl.written(), b"abx");
    }
}
