//! The stream adapter: pump bytes between an engine's pipes and a transport.
//!
//! # Locking
//!
//! A [`TlsStream`] may be read from one task while it is written from
//! another.  To make that safe, state is split between several locks:
//!
//!  * `core`, a synchronous mutex, guards the engine, its pipes, and the
//!    handshake bookkeeping.  It is never held across an `.await`.
//!  * `reader` and `writer` guard the two halves of the transport.  At most
//!    one task talks to each half at a time.
//!  * `handshake_lock` makes sure only one task drives a handshake.
//!
//! A task that holds `reader` or `writer` never waits for
//! `handshake_lock`, so the handshake driver can always take the transport
//! halves it needs.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use educe::Educe;
use futures::io::{ReadHalf, WriteHalf};
use futures::lock::Mutex as AsyncMutex;
use futures::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _};
use tracing::{debug, info, trace, warn};

use crate::cert::{Certificate, CertificateCallbacks};
use crate::config::{ClientOptions, EngineConfig, ProtocolVersion, Role, ServerOptions, StreamConfig};
use crate::engine::{EngineHandle, Needs, Status, TlsBackend};
use crate::err::{Direction, Error, UsageError};
use crate::handshake::{Handshake, HandshakeState, Step};
use crate::pipe::BytePipe;
use crate::session::{
    CipherAlgorithm, CipherDescription, HashAlgorithm, KeyExchangeAlgorithm, SessionInfo,
    TrafficStats,
};
use crate::Result;

/// A TLS connection layered over a duplex transport.
///
/// Construct one with [`TlsStream::new`], then call
/// [`authenticate_as_client`](TlsStream::authenticate_as_client) or
/// [`authenticate_as_server`](TlsStream::authenticate_as_server).  After
/// that, [`read`](TlsStream::read) and [`write`](TlsStream::write) carry
/// application data.
///
/// All methods take `&self`.  One read and one write may be in flight at
/// the same time (for instance, from two tasks sharing an `Arc`); a second
/// overlapping call in the same direction is refused with
/// [`UsageError::Overlapping`].
///
/// Dropping the future of an operation while it is waiting on the
/// transport leaves the stream failed with [`Error::Canceled`].
#[derive(Educe)]
#[educe(Debug)]
pub struct TlsStream<T> {
    /// Engine and handshake state.
    core: Mutex<Core>,
    /// The transport's read half.
    #[educe(Debug(ignore))]
    reader: AsyncMutex<Reader<T>>,
    /// The transport's write half.
    #[educe(Debug(ignore))]
    writer: AsyncMutex<Writer<T>>,
    /// Held by whichever task is driving a handshake.
    #[educe(Debug(ignore))]
    handshake_lock: AsyncMutex<()>,
    /// True while a `read` is in flight.
    reading: AtomicBool,
    /// True while a `write`, `flush` or `close` is in flight.
    writing: AtomicBool,
    /// Used to create the engine at authentication time.
    #[educe(Debug(ignore))]
    backend: Arc<dyn TlsBackend>,
    /// Tuning.
    config: StreamConfig,
}

/// Everything protected by [`TlsStream::core`].
#[derive(Educe)]
#[educe(Debug)]
struct Core {
    /// Where we are in the handshake lifecycle.
    handshake: Handshake,
    /// The engine, once authentication has begun.
    #[educe(Debug(ignore))]
    attached: Option<Attached>,
    /// Parameters of the last completed handshake.
    session: Option<SessionInfo>,
    /// The transport has reported end-of-stream.
    transport_eof: bool,
    /// The peer has sent its closure alert.
    peer_closed: bool,
    /// We have queued our own closure alert.
    close_sent: bool,
    /// [`TlsStream::close`] has been called.
    closed: bool,
    /// Ciphertext bytes handed to the transport.
    sent: u64,
    /// Ciphertext bytes taken from the transport.
    received: u64,
}

/// An engine together with the role and callbacks it was set up for.
struct Attached {
    /// The engine and its pipes.
    engine: EngineHandle,
    /// Our end of the handshake.
    role: Role,
    /// Answers certificate questions from the engine.
    callbacks: Arc<dyn CertificateCallbacks>,
}

/// The read half of the transport, with a scratch buffer.
struct Reader<T> {
    /// Transport read half.
    half: ReadHalf<T>,
    /// Bytes read from the transport land here before going to the pipe.
    buf: Box<[u8]>,
}

/// The write half of the transport.
struct Writer<T> {
    /// Transport write half.
    half: WriteHalf<T>,
    /// Bytes taken from the write pipe that the transport has not yet
    /// accepted.
    staged: Vec<u8>,
}

/// What a data operation wants the pump loop to do next.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum DataStep {
    /// The engine consumed or produced this many bytes.
    Done(usize),
    /// The peer sent its closure alert.
    PeerClosed,
    /// Drain the write pipe, then try again.
    Flush,
    /// Read more ciphertext, unless someone else already did.
    NeedInput {
        /// Read pipe `total_written` when the engine asked.
        seen: u64,
    },
    /// A handshake must finish first.
    Retry,
}

/// Outcome of one attempt to read ciphertext from the transport.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Input {
    /// New bytes were moved to the read pipe.
    Bytes,
    /// Another task delivered input since the caller last looked.
    Raced,
    /// The transport is at end-of-stream.
    Eof,
}

impl Core {
    /// Queue our closure alert, unless it was already queued.
    ///
    /// Returns true if there are now alert bytes to send.
    fn queue_close_notify(&mut self) -> bool {
        if self.close_sent {
            return false;
        }
        let Some(attached) = self.attached.as_mut() else {
            return false;
        };
        match attached.engine.shutdown() {
            Status::Done(()) | Status::Progress(_) => {
                self.close_sent = true;
                attached.engine.write_pipe().pending() > 0
            }
            Status::Fatal(code) => {
                debug!(
                    "Unable to queue closure alert: {}",
                    attached.engine.error_string(code)
                );
                false
            }
        }
    }

    /// Run `op` against the engine until it completes or needs the
    /// transport.
    fn data_step<F>(&mut self, mut op: F) -> Result<DataStep>
    where
        F: FnMut(&mut EngineHandle) -> Status<usize>,
    {
        self.handshake.check_failed()?;
        if self.handshake.state() != HandshakeState::Established || self.handshake.has_pending_fault()
        {
            return Ok(DataStep::Retry);
        }
        let attached = self
            .attached
            .as_mut()
            .ok_or(UsageError::NotAuthenticated)?;
        loop {
            match op(&mut attached.engine) {
                Status::Done(n) => {
                    // The peer may have renegotiated inside this call.
                    if let Some(session) = attached.engine.session() {
                        self.session = Some(session);
                    }
                    return Ok(DataStep::Done(n));
                }
                Status::Progress(Needs::Input) => {
                    if attached.engine.write_pipe().pending() > 0 {
                        return Ok(DataStep::Flush);
                    }
                    return Ok(DataStep::NeedInput {
                        seen: attached.engine.read_pipe().total_written(),
                    });
                }
                Status::Progress(Needs::Output) => return Ok(DataStep::Flush),
                Status::Progress(needs) => self.handshake.resolve(
                    &mut attached.engine,
                    &*attached.callbacks,
                    attached.role,
                    &needs,
                ),
                Status::Fatal(code) => {
                    self.handshake.engine_fatal(&attached.engine, code)?;
                    return Ok(DataStep::Flush);
                }
            }
        }
    }
}

/// Lock `core`, ignoring poison: the state inside is always consistent
/// between statements.
fn lock(core: &Mutex<Core>) -> MutexGuard<'_, Core> {
    core.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks one direction as busy for as long as it lives.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    /// Claim `flag`, or report an overlapping call in direction `dir`.
    fn enter(flag: &'a AtomicBool, dir: Direction) -> Result<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            return Err(UsageError::Overlapping(dir).into());
        }
        Ok(InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Fails the stream with [`Error::Canceled`] if dropped while armed.
///
/// Armed around every transport `.await`: if the future is dropped there,
/// we can no longer tell how many bytes reached the transport.
struct CancelGuard<'a> {
    /// The state to fail.
    core: &'a Mutex<Core>,
    /// Whether dropping should fail the stream.
    armed: bool,
}

impl<'a> CancelGuard<'a> {
    /// Arm a new guard.
    fn arm(core: &'a Mutex<Core>) -> Self {
        CancelGuard { core, armed: true }
    }

    /// The transport operation finished; drop without failing.
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!("Transport operation dropped before completion");
            let _ = lock(self.core).handshake.fail(Error::Canceled);
        }
    }
}

/// Counts consecutive pump iterations that moved no bytes.
struct StallCounter {
    /// Iterations allowed.
    limit: u32,
    /// Iterations so far without progress.
    idle: u32,
}

impl StallCounter {
    /// A counter that trips after `limit` idle iterations.
    fn new(limit: u32) -> Self {
        StallCounter { limit, idle: 0 }
    }

    /// Record one iteration; return true if we have now stalled.
    fn record(&mut self, progressed: bool) -> bool {
        if progressed {
            self.idle = 0;
        } else {
            self.idle += 1;
        }
        self.idle >= self.limit
    }
}

impl<T> TlsStream<T>
where
    T: AsyncRead + AsyncWrite,
{
    /// Wrap `transport`.  Nothing is sent until authentication starts.
    pub fn new<B>(transport: T, backend: B, config: StreamConfig) -> Self
    where
        B: TlsBackend + 'static,
    {
        Self::with_shared_backend(transport, Arc::new(backend), config)
    }

    /// Like [`new`](TlsStream::new), but with a backend shared between
    /// streams.
    pub fn with_shared_backend(
        transport: T,
        backend: Arc<dyn TlsBackend>,
        config: StreamConfig,
    ) -> Self {
        let (read_half, write_half) = transport.split();
        TlsStream {
            core: Mutex::new(Core {
                handshake: Handshake::new(),
                attached: None,
                session: None,
                transport_eof: false,
                peer_closed: false,
                close_sent: false,
                closed: false,
                sent: 0,
                received: 0,
            }),
            reader: AsyncMutex::new(Reader {
                half: read_half,
                buf: vec![0_u8; config.read_chunk_size].into_boxed_slice(),
            }),
            writer: AsyncMutex::new(Writer {
                half: write_half,
                staged: Vec::new(),
            }),
            handshake_lock: AsyncMutex::new(()),
            reading: AtomicBool::new(false),
            writing: AtomicBool::new(false),
            backend,
            config,
        }
    }

    /// Put the stream into the failed state; return the error to report.
    fn fail(&self, err: Error) -> Error {
        self.core().handshake.fail(err)
    }

    /// Set up a client engine without starting the handshake.
    ///
    /// The handshake then runs on the first read, write, or
    /// [`handshake`](TlsStream::handshake) call.
    pub fn configure_client<C>(&self, options: ClientOptions, callbacks: C) -> Result<()>
    where
        C: CertificateCallbacks + 'static,
    {
        self.attach(EngineConfig::for_client(&options), Arc::new(callbacks))
    }

    /// Set up a server engine without starting the handshake.
    pub fn configure_server<C>(&self, options: ServerOptions, callbacks: C) -> Result<()>
    where
        C: CertificateCallbacks + 'static,
    {
        self.attach(EngineConfig::for_server(&options), Arc::new(callbacks))
    }

    /// Create an engine for `config` and attach it to fresh pipes.
    fn attach(&self, config: EngineConfig, callbacks: Arc<dyn CertificateCallbacks>) -> Result<()> {
        let mut core = self.core();
        core.handshake.check_failed()?;
        if core.attached.is_some() {
            return Err(UsageError::AlreadyAuthenticated.into());
        }
        let engine = self.backend.create(&config)?;
        debug!(
            "Created {} engine with ciphers {:?}",
            config.role, config.cipher_list
        );
        core.attached = Some(Attached {
            engine: EngineHandle::attach(engine, BytePipe::new(), BytePipe::new()),
            role: config.role,
            callbacks,
        });
        Ok(())
    }

    /// Authenticate as a client, and run the handshake to completion.
    pub async fn authenticate_as_client<C>(&self, options: ClientOptions, callbacks: C) -> Result<()>
    where
        C: CertificateCallbacks + 'static,
    {
        self.configure_client(options, callbacks)?;
        self.handshake().await
    }

    /// Authenticate as a server, and run the handshake to completion.
    pub async fn authenticate_as_server<C>(&self, options: ServerOptions, callbacks: C) -> Result<()>
    where
        C: CertificateCallbacks + 'static,
    {
        self.configure_server(options, callbacks)?;
        self.handshake().await
    }

    /// Run any outstanding handshake to completion.
    ///
    /// Returns immediately if the stream is already established.
    pub async fn handshake(&self) -> Result<()> {
        {
            let core = self.core();
            core.handshake.check_failed()?;
            if core.attached.is_none() {
                return Err(UsageError::NotAuthenticated.into());
            }
            if core.handshake.state() == HandshakeState::Established
                && !core.handshake.has_pending_fault()
            {
                return Ok(());
            }
        }
        self.drive_handshake().await
    }

    /// Step the handshake, doing the I/O it asks for, until it is
    /// established or fails.
    async fn drive_handshake(&self) -> Result<()> {
        let _driving = self.handshake_lock.lock().await;
        let mut stall = StallCounter::new(self.config.stall_limit);
        loop {
            let step = {
                let mut guard = self.core();
                let core = &mut *guard;
                let attached = core
                    .attached
                    .as_mut()
                    .ok_or(UsageError::NotAuthenticated)?;
                let step = core.handshake.step(
                    &mut attached.engine,
                    &*attached.callbacks,
                    attached.role,
                )?;
                if step == Step::Established {
                    core.session = attached.engine.session();
                }
                step
            };
            match step {
                Step::Established => return Ok(()),
                Step::Flush => {
                    let moved = self.flush_locked().await?;
                    self.core().handshake.deliver_pending_fault()?;
                    self.check_stall(&mut stall, moved > 0)?;
                }
                Step::NeedInput { seen } => match self.pump_input(seen).await? {
                    Input::Eof => return Err(self.fail(Error::ClosedDuringHandshake)),
                    Input::Bytes | Input::Raced => self.check_stall(&mut stall, true)?,
                },
            }
        }
    }

    /// Fail with [`Error::Stalled`] if `stall` trips.
    fn check_stall(&self, stall: &mut StallCounter, progressed: bool) -> Result<()> {
        if stall.record(progressed) {
            return Err(self.fail(Error::Stalled(stall.limit)));
        }
        Ok(())
    }

    /// Read some ciphertext into the read pipe, unless the pipe has grown
    /// past `seen` in the meantime.
    async fn pump_input(&self, seen: u64) -> Result<Input> {
        let mut guard = self.reader.lock().await;
        {
            let core = self.core();
            core.handshake.check_failed()?;
            if core.transport_eof {
                return Ok(Input::Eof);
            }
            if let Some(attached) = &core.attached {
                if attached.engine.read_pipe().total_written() != seen {
                    return Ok(Input::Raced);
                }
            }
        }
        self.read_transport(&mut guard).await
    }

    /// Do one transport read, retrying if interrupted.
    async fn read_transport(&self, reader: &mut Reader<T>) -> Result<Input> {
        loop {
            let cancel = CancelGuard::arm(&self.core);
            let result = reader.half.read(&mut reader.buf).await;
            cancel.disarm();
            match result {
                Ok(0) => {
                    debug!("Transport reached end of stream");
                    self.core().transport_eof = true;
                    return Ok(Input::Eof);
                }
                Ok(n) => {
                    trace!("Read {} bytes from transport", n);
                    let mut core = self.core();
                    core.received += n as u64;
                    if let Some(attached) = core.attached.as_mut() {
                        attached.engine.read_pipe_mut().write(&reader.buf[..n]);
                    }
                    return Ok(Input::Bytes);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.fail(Error::transport(e))),
            }
        }
    }

    /// Take the writer lock and drain the write pipe.
    async fn flush_locked(&self) -> Result<usize> {
        let mut guard = self.writer.lock().await;
        self.flush_outgoing(&mut guard).await
    }

    /// Drain staged bytes and the write pipe to the transport.
    ///
    /// Returns the number of bytes the transport accepted.
    async fn flush_outgoing(&self, writer: &mut Writer<T>) -> Result<usize> {
        self.core().handshake.check_failed()?;
        self.write_staged(writer)
            .await
            .map_err(|e| self.fail(Error::transport(e)))
    }

    /// Write everything pending to the transport and flush it.
    ///
    /// Partial writes are retried until the transport has accepted every
    /// byte.  Bytes accepted by the transport are never offered again.
    async fn write_staged(&self, writer: &mut Writer<T>) -> io::Result<usize> {
        let mut moved = 0;
        loop {
            if writer.staged.is_empty() {
                let mut core = self.core();
                let Some(attached) = core.attached.as_mut() else {
                    break;
                };
                let pending = attached.engine.write_pipe().pending();
                if pending == 0 {
                    break;
                }
                writer.staged = attached.engine.write_pipe_mut().read_vec(pending);
            }
            let cancel = CancelGuard::arm(&self.core);
            let result = writer.half.write(&writer.staged).await;
            cancel.disarm();
            match result {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    trace!("Wrote {} of {} staged bytes to transport", n, writer.staged.len());
                    writer.staged.drain(..n);
                    moved += n;
                    self.core().sent += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        if moved > 0 {
            let cancel = CancelGuard::arm(&self.core);
            let result = writer.half.flush().await;
            cancel.disarm();
            result?;
        }
        Ok(moved)
    }

    /// Make sure the handshake is complete before moving data.
    async fn ensure_established(&self) -> Result<()> {
        self.handshake().await
    }

    /// Read decrypted application data into `buf`.
    ///
    /// Returns the number of bytes read.  Zero means the peer closed the
    /// connection, either with a closure alert or by closing the transport.
    /// If the stream has not finished its handshake, it does so first.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let _busy = InFlight::enter(&self.reading, Direction::Read)?;
        let mut stall = StallCounter::new(self.config.stall_limit);
        loop {
            {
                let core = self.core();
                core.handshake.check_failed()?;
                if core.peer_closed {
                    return Ok(0);
                }
            }
            self.ensure_established().await?;
            if buf.is_empty() {
                return Ok(0);
            }
            let step = {
                let mut core = self.core();
                match core.data_step(|engine| engine.decrypt(buf))? {
                    DataStep::Done(0) => {
                        debug!("Peer sent closure alert");
                        core.peer_closed = true;
                        DataStep::PeerClosed
                    }
                    other => other,
                }
            };
            match step {
                DataStep::Done(n) => return Ok(n),
                DataStep::PeerClosed => {
                    self.answer_close_notify().await;
                    return Ok(0);
                }
                DataStep::Flush => {
                    let moved = self.flush_locked().await?;
                    self.core().handshake.deliver_pending_fault()?;
                    self.check_stall(&mut stall, moved > 0)?;
                }
                DataStep::NeedInput { seen } => match self.pump_input(seen).await? {
                    Input::Eof => return Ok(0),
                    Input::Bytes | Input::Raced => self.check_stall(&mut stall, true)?,
                },
                DataStep::Retry => {}
            }
        }
    }

    /// Send our closure alert in answer to the peer's, if so configured.
    ///
    /// The peer may already have closed the transport, so failures here
    /// are logged and otherwise ignored.
    async fn answer_close_notify(&self) {
        if !self.config.reply_to_close_notify {
            return;
        }
        if !self.core().queue_close_notify() {
            return;
        }
        let mut writer = self.writer.lock().await;
        if let Err(e) = self.write_staged(&mut writer).await {
            debug!("Unable to answer closure alert: {}", e);
        }
    }

    /// Encrypt and send all of `buf`.
    ///
    /// Returns once every byte has been accepted by the engine and the
    /// resulting ciphertext has been accepted by the transport.  If the
    /// stream has not finished its handshake, it does so first.
    pub async fn write(&self, buf: &[u8]) -> Result<()> {
        let _busy = InFlight::enter(&self.writing, Direction::Write)?;
        {
            let core = self.core();
            core.handshake.check_failed()?;
            if core.closed {
                return Err(UsageError::Closed.into());
            }
        }
        let mut stall = StallCounter::new(self.config.stall_limit);
        let mut offset = 0;
        loop {
            self.ensure_established().await?;
            let mut writer = self.writer.lock().await;
            // Ciphertext from an earlier call goes out first.
            let earlier = self.flush_outgoing(&mut writer).await?;
            if offset == buf.len() {
                return Ok(());
            }
            let step = self
                .core()
                .data_step(|engine| engine.encrypt(&buf[offset..]))?;
            match step {
                DataStep::Done(n) => {
                    offset += n;
                    let moved = self.flush_outgoing(&mut writer).await?;
                    self.core().handshake.deliver_pending_fault()?;
                    if offset == buf.len() {
                        return Ok(());
                    }
                    self.check_stall(&mut stall, n > 0 || moved > 0)?;
                }
                DataStep::Flush => {
                    let moved = self.flush_outgoing(&mut writer).await?;
                    self.core().handshake.deliver_pending_fault()?;
                    self.check_stall(&mut stall, earlier > 0 || moved > 0)?;
                }
                DataStep::NeedInput { seen } => {
                    drop(writer);
                    match self.pump_input(seen).await? {
                        Input::Eof => {
                            let eof = io::Error::from(io::ErrorKind::UnexpectedEof);
                            return Err(self.fail(Error::transport(eof)));
                        }
                        Input::Bytes | Input::Raced => self.check_stall(&mut stall, true)?,
                    }
                }
                DataStep::Retry | DataStep::PeerClosed => {}
            }
        }
    }

    /// Send any ciphertext that is still waiting, and flush the transport.
    pub async fn flush(&self) -> Result<()> {
        let _busy = InFlight::enter(&self.writing, Direction::Write)?;
        let mut writer = self.writer.lock().await;
        self.flush_outgoing(&mut writer).await?;
        let cancel = CancelGuard::arm(&self.core);
        let result = writer.half.flush().await;
        cancel.disarm();
        result.map_err(|e| self.fail(Error::transport(e)))
    }

    /// Start a new handshake on an established stream, and wait for it to
    /// complete.
    ///
    /// If a renegotiation is already underway, this waits for that one
    /// instead.
    pub async fn renegotiate(&self) -> Result<()> {
        {
            let mut core = self.core();
            core.handshake.check_failed()?;
            if core.attached.is_none() {
                return Err(UsageError::NotAuthenticated.into());
            }
            if core.closed {
                return Err(UsageError::Closed.into());
            }
            core.handshake.request_renegotiation()?;
        }
        info!("Renegotiating TLS session");
        self.drive_handshake().await
    }

    /// Send our closure alert (if the stream is established) and close the
    /// transport's write side.
    ///
    /// Reads remain possible afterwards, so that the peer's answer can be
    /// collected.  Closing twice is harmless.  Closing a failed stream
    /// reports its failure.
    pub async fn close(&self) -> Result<()> {
        let _busy = InFlight::enter(&self.writing, Direction::Write)?;
        let queued = {
            let mut core = self.core();
            core.handshake.check_failed()?;
            if core.closed {
                return Ok(());
            }
            core.closed = true;
            core.handshake.state() == HandshakeState::Established && core.queue_close_notify()
        };
        let mut writer = self.writer.lock().await;
        if queued {
            self.flush_outgoing(&mut writer).await?;
        }
        let cancel = CancelGuard::arm(&self.core);
        let result = writer.half.close().await;
        cancel.disarm();
        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("Error while closing transport: {}", e);
                Err(self.fail(Error::transport(e)))
            }
        }
    }
}

impl<T> TlsStream<T> {
    /// Lock the core state.
    fn core(&self) -> MutexGuard<'_, Core> {
        lock(&self.core)
    }

    /// Current handshake state.
    pub fn handshake_state(&self) -> HandshakeState {
        self.core().handshake.state()
    }

    /// The role this stream was authenticated as, if any.
    pub fn role(&self) -> Option<Role> {
        self.core().attached.as_ref().map(|a| a.role)
    }

    /// Return true if this stream is the server end.
    pub fn is_server(&self) -> bool {
        self.role() == Some(Role::Server)
    }

    /// Return true once a handshake has completed, for as long as the
    /// stream has not failed.
    pub fn is_authenticated(&self) -> bool {
        let core = self.core();
        core.session.is_some() && core.handshake.check_failed().is_ok()
    }

    /// Return true if both ends presented certificates in the last
    /// handshake.
    pub fn is_mutually_authenticated(&self) -> bool {
        self.is_authenticated()
            && self
                .core()
                .session
                .as_ref()
                .is_some_and(SessionInfo::is_mutually_authenticated)
    }

    /// Parameters of the last completed handshake.
    pub fn session(&self) -> Option<SessionInfo> {
        self.core().session.clone()
    }

    /// Negotiated protocol version.
    pub fn protocol_version(&self) -> Option<ProtocolVersion> {
        self.core().session.as_ref().map(|s| s.protocol)
    }

    /// Negotiated cipher suite.
    pub fn cipher(&self) -> Option<CipherDescription> {
        self.core().session.as_ref().map(|s| s.cipher.clone())
    }

    /// Run `f` on the negotiated cipher suite, if there is one.
    fn with_cipher<R>(&self, f: impl FnOnce(&CipherDescription) -> R) -> Option<R> {
        self.core().session.as_ref().map(|s| f(&s.cipher))
    }

    /// Bulk encryption algorithm of the negotiated suite.
    pub fn cipher_algorithm(&self) -> Option<CipherAlgorithm> {
        self.with_cipher(|c| c.algorithm)
    }

    /// Key size of the negotiated suite, in bits.
    pub fn cipher_strength(&self) -> Option<u32> {
        self.with_cipher(|c| c.bits)
    }

    /// MAC hash of the negotiated suite.
    pub fn hash_algorithm(&self) -> Option<HashAlgorithm> {
        self.with_cipher(|c| c.hash)
    }

    /// Strength of the negotiated MAC hash, in bits.
    pub fn hash_strength(&self) -> Option<u32> {
        self.with_cipher(CipherDescription::hash_strength)
    }

    /// Key exchange method of the negotiated suite.
    pub fn key_exchange_algorithm(&self) -> Option<KeyExchangeAlgorithm> {
        self.with_cipher(|c| c.key_exchange)
    }

    /// Strength of the negotiated key exchange, in bits.
    pub fn key_exchange_strength(&self) -> Option<u32> {
        self.with_cipher(|c| c.key_exchange_bits)
    }

    /// The certificate presented by the peer.
    pub fn peer_certificate(&self) -> Option<Certificate> {
        self.core()
            .session
            .as_ref()
            .and_then(|s| s.peer_certificate.clone())
    }

    /// The certificate we presented.
    pub fn local_certificate(&self) -> Option<Certificate> {
        self.core()
            .session
            .as_ref()
            .and_then(|s| s.local_certificate.clone())
    }

    /// Ciphertext byte counts so far.
    pub fn stats(&self) -> TrafficStats {
        let core = self.core();
        TrafficStats {
            sent: core.sent,
            received: core.received,
        }
    }

    /// The error that failed this stream, if it has failed.
    pub fn failure(&self) -> Option<Error> {
        self.core().handshake.check_failed().err()
    }
}
