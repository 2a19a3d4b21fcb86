//! The interface to an external TLS engine.
//!
//! An engine never sees the transport.  It reads ciphertext from the read
//! pipe of a [`PipePair`], writes ciphertext to the write pipe, and tells
//! its caller what it needs next through a [`Status`].

use derive_more::Display;

use crate::cert::{Certificate, CertificateRequest, PeerVerification, Verdict};
use crate::config::EngineConfig;
use crate::pipe::{BytePipe, PipePair};
use crate::session::SessionInfo;

/// An engine-specific diagnostic code for a fatal condition.
///
/// Only the engine that produced a code can describe it; see
/// [`TlsEngine::error_string`].
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Hash)]
#[display("{_0:#x}")]
#[allow(clippy::exhaustive_structs)]
pub struct EngineCode(pub u64);

/// What an engine wants before an operation can make progress.
#[derive(Clone, Debug)]
#[allow(clippy::exhaustive_enums)]
pub enum Needs {
    /// More ciphertext must be placed in the read pipe.
    Input,
    /// The write pipe must be drained to the transport.
    Output,
    /// A certificate from the peer needs an accept/reject decision; answer
    /// with [`TlsEngine::resolve_peer_verification`].
    PeerVerification(PeerVerification),
    /// The server asked for a client certificate; answer with
    /// [`TlsEngine::resolve_local_certificate`].
    LocalCertificate(CertificateRequest),
}

/// The outcome of one engine call.
#[derive(Clone, Debug)]
#[allow(clippy::exhaustive_enums)]
pub enum Status<T> {
    /// The operation completed.
    Done(T),
    /// The operation can't continue yet; retry once the need is met.
    Progress(Needs),
    /// The engine hit an unrecoverable error.  Any alert it wants the peer
    /// to see is already in the write pipe.
    Fatal(EngineCode),
}

/// A TLS protocol engine bound to one connection.
///
/// Every method that touches ciphertext receives the connection's pipes.
/// Methods are never called concurrently.
pub trait TlsEngine: Send {
    /// Advance the handshake: connect for a client, accept for a server, or
    /// continue a renegotiation.
    fn step_handshake(&mut self, pipes: &mut PipePair) -> Status<()>;

    /// Begin a new handshake on an established connection.  Progress is then
    /// made through [`step_handshake`](TlsEngine::step_handshake).
    fn start_renegotiation(&mut self, pipes: &mut PipePair) -> Status<()>;

    /// Deliver the answer to the most recent [`Needs::PeerVerification`].
    fn resolve_peer_verification(&mut self, verdict: Verdict);

    /// Deliver the answer to the most recent [`Needs::LocalCertificate`].
    /// The certificate, if any, always carries a private key.
    fn resolve_local_certificate(&mut self, certificate: Option<Certificate>);

    /// Encrypt a prefix of `plaintext` into the write pipe, returning how
    /// many bytes were consumed.
    fn encrypt(&mut self, plaintext: &[u8], pipes: &mut PipePair) -> Status<usize>;

    /// Decrypt into `out` from the read pipe, returning how many bytes were
    /// produced.  `Done(0)` on a non-empty `out` means the peer has sent its
    /// closure alert.
    fn decrypt(&mut self, out: &mut [u8], pipes: &mut PipePair) -> Status<usize>;

    /// Queue a closure alert in the write pipe.
    fn shutdown(&mut self, pipes: &mut PipePair) -> Status<()>;

    /// Describe a code previously returned in [`Status::Fatal`].
    fn error_string(&self, code: EngineCode) -> String;

    /// Parameters agreed by the most recently completed handshake.
    ///
    /// A handshake still in progress must not show through here.
    fn session(&self) -> Option<SessionInfo>;
}

/// A factory for [`TlsEngine`]s.
pub trait TlsBackend: Send + Sync {
    /// Create an engine for one connection.
    fn create(&self, config: &EngineConfig) -> Result<Box<dyn TlsEngine>, EngineSetupError>;
}

/// An error from [`TlsBackend::create`].
#[derive(Clone, Debug, thiserror::Error)]
#[error("{message}")]
pub struct EngineSetupError {
    /// What went wrong.
    message: String,
}

impl EngineSetupError {
    /// Construct a new setup error.
    pub fn new(message: impl Into<String>) -> Self {
        EngineSetupError {
            message: message.into(),
        }
    }
}

/// An engine attached to the pipes it talks through.
///
/// Owns both; dropping the handle frees the engine and releases the pipe
/// buffers.
pub(crate) struct EngineHandle {
    /// The engine itself.
    engine: Box<dyn TlsEngine>,
    /// Pipes shared between the engine and the transport pump.
    pipes: PipePair,
}

impl EngineHandle {
    /// Bind `engine` to a read pipe and a write pipe.
    pub(crate) fn attach(engine: Box<dyn TlsEngine>, read: BytePipe, write: BytePipe) -> Self {
        EngineHandle {
            engine,
            pipes: PipePair::new(read, write),
        }
    }

    /// See [`TlsEngine::step_handshake`].
    pub(crate) fn step_handshake(&mut self) -> Status<()> {
        self.engine.step_handshake(&mut self.pipes)
    }

    /// See [`TlsEngine::start_renegotiation`].
    pub(crate) fn start_renegotiation(&mut self) -> Status<()> {
        self.engine.start_renegotiation(&mut self.pipes)
    }

    /// See [`TlsEngine::resolve_peer_verification`].
    pub(crate) fn resolve_peer_verification(&mut self, verdict: Verdict) {
        self.engine.resolve_peer_verification(verdict);
    }

    /// See [`TlsEngine::resolve_local_certificate`].
    pub(crate) fn resolve_local_certificate(&mut self, certificate: Option<Certificate>) {
        self.engine.resolve_local_certificate(certificate);
    }

    /// See [`TlsEngine::encrypt`].
    pub(crate) fn encrypt(&mut self, plaintext: &[u8]) -> Status<usize> {
        self.engine.encrypt(plaintext, &mut self.pipes)
    }

    /// See [`TlsEngine::decrypt`].
    pub(crate) fn decrypt(&mut self, out: &mut [u8]) -> Status<usize> {
        self.engine.decrypt(out, &mut self.pipes)
    }

    /// See [`TlsEngine::shutdown`].
    pub(crate) fn shutdown(&mut self) -> Status<()> {
        self.engine.shutdown(&mut self.pipes)
    }

    /// See [`TlsEngine::error_string`].
    pub(crate) fn error_string(&self, code: EngineCode) -> String {
        self.engine.error_string(code)
    }

    /// See [`TlsEngine::session`].
    pub(crate) fn session(&self) -> Option<SessionInfo> {
        self.engine.session()
    }

    /// The read pipe (transport to engine).
    pub(crate) fn read_pipe(&self) -> &BytePipe {
        &self.pipes.read
    }

    /// The read pipe, mutably.
    pub(crate) fn read_pipe_mut(&mut self) -> &mut BytePipe {
        &mut self.pipes.read
    }

    /// The write pipe (engine to transport).
    pub(crate) fn write_pipe(&self) -> &BytePipe {
        &self.pipes.write
    }

    /// The write pipe, mutably.
    pub(crate) fn write_pipe_mut(&mut self) -> &mut BytePipe {
        &mut self.pipes.write
    }
}
