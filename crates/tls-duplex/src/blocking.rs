//! A blocking front end for callers without an executor.

use std::io::{self, Read, Write};

use futures::executor::block_on;
use futures::io::AllowStdIo;

use crate::cert::{Certificate, CertificateCallbacks};
use crate::config::{ClientOptions, ProtocolVersion, Role, ServerOptions, StreamConfig};
use crate::engine::TlsBackend;
use crate::err::Error;
use crate::handshake::HandshakeState;
use crate::session::{
    CipherAlgorithm, CipherDescription, HashAlgorithm, KeyExchangeAlgorithm, SessionInfo,
    TrafficStats,
};
use crate::stream::TlsStream;
use crate::Result;

/// A [`TlsStream`] over a blocking [`Read`] + [`Write`] transport.
///
/// Every operation runs to completion on the calling thread.  Also
/// implements [`Read`] and [`Write`] itself, so it can stand in for the
/// transport it wraps.
#[derive(Debug)]
pub struct BlockingTlsStream<T> {
    /// The asynchronous stream doing the work.
    inner: TlsStream<AllowStdIo<T>>,
}

impl<T> BlockingTlsStream<T>
where
    T: Read + Write,
{
    /// Wrap `transport`.
    pub fn new<B>(transport: T, backend: B, config: StreamConfig) -> Self
    where
        B: TlsBackend + 'static,
    {
        BlockingTlsStream {
            inner: TlsStream::new(AllowStdIo::new(transport), backend, config),
        }
    }

    /// See [`TlsStream::configure_client`].
    pub fn configure_client<C>(&self, options: ClientOptions, callbacks: C) -> Result<()>
    where
        C: CertificateCallbacks + 'static,
    {
        self.inner.configure_client(options, callbacks)
    }

    /// See [`TlsStream::configure_server`].
    pub fn configure_server<C>(&self, options: ServerOptions, callbacks: C) -> Result<()>
    where
        C: CertificateCallbacks + 'static,
    {
        self.inner.configure_server(options, callbacks)
    }

    /// See [`TlsStream::handshake`].
    pub fn handshake(&self) -> Result<()> {
        block_on(self.inner.handshake())
    }

    /// See [`TlsStream::authenticate_as_client`].
    pub fn authenticate_as_client<C>(&self, options: ClientOptions, callbacks: C) -> Result<()>
    where
        C: CertificateCallbacks + 'static,
    {
        block_on(self.inner.authenticate_as_client(options, callbacks))
    }

    /// See [`TlsStream::authenticate_as_server`].
    pub fn authenticate_as_server<C>(&self, options: ServerOptions, callbacks: C) -> Result<()>
    where
        C: CertificateCallbacks + 'static,
    {
        block_on(self.inner.authenticate_as_server(options, callbacks))
    }

    /// See [`TlsStream::read`].
    pub fn read_data(&self, buf: &mut [u8]) -> Result<usize> {
        block_on(self.inner.read(buf))
    }

    /// See [`TlsStream::write`].
    pub fn write_all_data(&self, buf: &[u8]) -> Result<()> {
        block_on(self.inner.write(buf))
    }

    /// See [`TlsStream::flush`].
    pub fn flush_data(&self) -> Result<()> {
        block_on(self.inner.flush())
    }

    /// See [`TlsStream::renegotiate`].
    pub fn renegotiate(&self) -> Result<()> {
        block_on(self.inner.renegotiate())
    }

    /// See [`TlsStream::close`].
    pub fn close(&self) -> Result<()> {
        block_on(self.inner.close())
    }
}

impl<T> BlockingTlsStream<T> {
    /// See [`TlsStream::handshake_state`].
    pub fn handshake_state(&self) -> HandshakeState {
        self.inner.handshake_state()
    }

    /// See [`TlsStream::role`].
    pub fn role(&self) -> Option<Role> {
        self.inner.role()
    }

    /// See [`TlsStream::is_server`].
    pub fn is_server(&self) -> bool {
        self.inner.is_server()
    }

    /// See [`TlsStream::is_authenticated`].
    pub fn is_authenticated(&self) -> bool {
        self.inner.is_authenticated()
    }

    /// See [`TlsStream::is_mutually_authenticated`].
    pub fn is_mutually_authenticated(&self) -> bool {
        self.inner.is_mutually_authenticated()
    }

    /// See [`TlsStream::session`].
    pub fn session(&self) -> Option<SessionInfo> {
        self.inner.session()
    }

    /// See [`TlsStream::peer_certificate`].
    pub fn peer_certificate(&self) -> Option<Certificate> {
        self.inner.peer_certificate()
    }

    /// See [`TlsStream::protocol_version`].
    pub fn protocol_version(&self) -> Option<ProtocolVersion> {
        self.inner.protocol_version()
    }

    /// See [`TlsStream::cipher`].
    pub fn cipher(&self) -> Option<CipherDescription> {
        self.inner.cipher()
    }

    /// See [`TlsStream::cipher_algorithm`].
    pub fn cipher_algorithm(&self) -> Option<CipherAlgorithm> {
        self.inner.cipher_algorithm()
    }

    /// See [`TlsStream::cipher_strength`].
    pub fn cipher_strength(&self) -> Option<u32> {
        self.inner.cipher_strength()
    }

    /// See [`TlsStream::hash_algorithm`].
    pub fn hash_algorithm(&self) -> Option<HashAlgorithm> {
        self.inner.hash_algorithm()
    }

    /// See [`TlsStream::hash_strength`].
    pub fn hash_strength(&self) -> Option<u32> {
        self.inner.hash_strength()
    }

    /// See [`TlsStream::key_exchange_algorithm`].
    pub fn key_exchange_algorithm(&self) -> Option<KeyExchangeAlgorithm> {
        self.inner.key_exchange_algorithm()
    }

    /// See [`TlsStream::key_exchange_strength`].
    pub fn key_exchange_strength(&self) -> Option<u32> {
        self.inner.key_exchange_strength()
    }

    /// See [`TlsStream::local_certificate`].
    pub fn local_certificate(&self) -> Option<Certificate> {
        self.inner.local_certificate()
    }

    /// See [`TlsStream::failure`].
    pub fn failure(&self) -> Option<Error> {
        self.inner.failure()
    }

    /// See [`TlsStream::stats`].
    pub fn stats(&self) -> TrafficStats {
        self.inner.stats()
    }

    /// Borrow the asynchronous stream underneath.
    pub fn get_ref(&self) -> &TlsStream<AllowStdIo<T>> {
        &self.inner
    }
}

impl<T> Read for BlockingTlsStream<T>
where
    T: Read + Write,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_data(buf)?)
    }
}

impl<T> Write for BlockingTlsStream<T>
where
    T: Read + Write,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_all_data(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.flush_data()?)
    }
}
