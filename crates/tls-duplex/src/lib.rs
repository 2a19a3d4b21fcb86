#![cfg_attr(docsrs, feature(doc_cfg))]
//! Drive a buffer-based TLS engine over an arbitrary duplex byte stream.
//!
//! Many TLS implementations never touch a socket themselves: they consume
//! ciphertext from one in-memory buffer and produce ciphertext into another.
//! This crate supplies the other half of that arrangement.  A [`TlsStream`]
//! owns the engine and its two [`BytePipe`]s, and pumps bytes between those
//! pipes and a real transport (anything implementing
//! [`futures::AsyncRead`] and [`futures::AsyncWrite`]) until the engine is
//! satisfied.
//!
//! The adapter is responsible for:
//!
//!  * running the handshake to completion before application data flows,
//!  * absorbing the engine's "need more input" / "need to flush output"
//!    signals,
//!  * making sure that alert bytes queued by a failing engine reach the
//!    peer before the failure is reported,
//!  * renegotiation,
//!  * serializing access to the engine when reads and writes run
//!    concurrently.
//!
//! The engine itself is supplied through the [`TlsBackend`] and
//! [`TlsEngine`] traits.  Certificate decisions made during the handshake
//! are routed through a [`CertificateCallbacks`] implementation supplied at
//! authentication time.
//!
//! # Example
//!
//! ```no_run
//! # async fn demo<T, B>(transport: T, backend: B) -> Result<(), tls_duplex::Error>
//! # where T: futures::AsyncRead + futures::AsyncWrite + Send + 'static,
//! #       B: tls_duplex::TlsBackend + 'static,
//! # {
//! use tls_duplex::{ClientOptions, DefaultCallbacks, StreamConfig, TlsStream};
//!
//! let stream = TlsStream::new(transport, backend, StreamConfig::default());
//! let options = ClientOptions::builder().host_name("example.com").build()?;
//! stream.authenticate_as_client(options, DefaultCallbacks).await?;
//! stream.write(b"GET / HTTP/1.0\r\n\r\n").await?;
//!
//! let mut buf = [0_u8; 1024];
//! let n = stream.read(&mut buf).await?;
//! # let _ = n;
//! # Ok(())
//! # }
//! ```
//!
//! For callers without an executor, [`BlockingTlsStream`] offers the same
//! operations over a [`std::io::Read`] + [`std::io::Write`] transport.

// @@ begin lint list maintained by maint/add_warning @@
#![allow(renamed_and_removed_lints)] // @@REMOVE_WHEN(ci_arti_stable)
#![allow(unknown_lints)] // @@REMOVE_WHEN(ci_arti_nightly)
#![warn(missing_docs)]
#![warn(noop_method_call)]
#![warn(unreachable_pub)]
#![warn(clippy::all)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::cargo_common_metadata)]
#![deny(clippy::cast_lossless)]
#![deny(clippy::checked_conversions)]
#![warn(clippy::cognitive_complexity)]
#![deny(clippy::debug_assert_with_mut_call)]
#![deny(clippy::exhaustive_enums)]
#![deny(clippy::exhaustive_structs)]
#![deny(clippy::expl_impl_clone_on_copy)]
#![deny(clippy::fallible_impl_from)]
#![deny(clippy::implicit_clone)]
#![deny(clippy::large_stack_arrays)]
#![warn(clippy::manual_ok_or)]
#![deny(clippy::missing_docs_in_private_items)]
#![warn(clippy::needless_borrow)]
#![warn(clippy::needless_pass_by_value)]
#![warn(clippy::option_option)]
#![deny(clippy::print_stderr)]
#![deny(clippy::print_stdout)]
#![warn(clippy::rc_buffer)]
#![deny(clippy::ref_option_ref)]
#![warn(clippy::semicolon_if_nothing_returned)]
#![warn(clippy::trait_duplication_in_bounds)]
#![deny(clippy::unchecked_time_subtraction)]
#![deny(clippy::unnecessary_wraps)]
#![warn(clippy::unseparated_literal_suffix)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::mod_module_files)]
#![allow(clippy::let_unit_value)] // This can reasonably be done for explicitness
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::significant_drop_in_scrutinee)] // arti/-/merge_requests/588/#note_2812945
#![allow(clippy::result_large_err)] // temporary workaround for arti#587
#![allow(clippy::needless_raw_string_hashes)] // complained-about code is fine, often best
#![allow(clippy::needless_lifetimes)] // See arti#1765
#![allow(mismatched_lifetime_syntaxes)] // temporary workaround for arti#2060
//! <!-- @@ end lint list maintained by maint/add_warning @@ -->

mod blocking;
mod cert;
mod config;
mod engine;
mod err;
mod handshake;
mod pipe;
mod session;
mod stream;

pub use blocking::BlockingTlsStream;
pub use cert::{
    Certificate, CertificateCallbacks, CertificateParseError, CertificateRequest, DefaultCallbacks,
    PeerVerification, PrivateKey, Verdict, VerifyResult,
};
pub use config::{
    CipherStrength, ClientOptions, ClientOptionsBuilder, ConfigBuildError, EngineConfig,
    ProtocolOptions, ProtocolVersion, ProtocolVersions, Role, ServerOptions,
    ServerOptionsBuilder, StreamConfig, StreamConfigBuilder, VerifyMode,
};
pub use engine::{EngineCode, EngineSetupError, Needs, Status, TlsBackend, TlsEngine};
pub use err::{Direction, Error, ErrorKind, UsageError};
pub use handshake::HandshakeState;
pub use pipe::{BytePipe, PipePair};
pub use session::{
    CipherAlgorithm, CipherDescription, HashAlgorithm, KeyExchangeAlgorithm, SessionInfo,
    TrafficStats,
};
pub use stream::TlsStream;

/// A Result as returned by this crate.
pub type Result<T> = std::result::Result<T, Error>;
