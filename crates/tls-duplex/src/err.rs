//! Declare an error type for the tls-duplex crate.

use std::io;
use std::sync::Arc;

use strum::Display;

use crate::cert::VerifyResult;
use crate::config::ConfigBuildError;
use crate::engine::{EngineCode, EngineSetupError};

/// An error returned by a [`TlsStream`](crate::TlsStream).
///
/// Errors are `Clone`: once a stream has failed, it reports the same error
/// from every later call.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The underlying transport failed.
    #[error("I/O error on underlying transport")]
    Transport(#[source] Arc<io::Error>),

    /// The engine detected a fatal protocol problem.
    #[error("TLS protocol failure ({code}): {message}")]
    Protocol {
        /// The engine's code for the failure.
        code: EngineCode,
        /// The engine's description of the failure.
        message: String,
    },

    /// A peer certificate was rejected during verification.
    #[error("Peer certificate rejected at depth {depth}: {result}")]
    VerificationRejected {
        /// The engine's verification result for the rejected certificate.
        result: VerifyResult,
        /// Chain position of the rejected certificate.
        depth: u32,
    },

    /// The transport reached end-of-stream before the handshake finished.
    #[error("The remote stream was closed during the TLS handshake")]
    ClosedDuringHandshake,

    /// A transport operation was abandoned part-way through.
    #[error("A transport operation was canceled")]
    Canceled,

    /// The pump loop stopped making progress.
    #[error("No progress after {0} consecutive pump iterations")]
    Stalled(u32),

    /// The stream was used incorrectly.
    #[error("Invalid use of TLS stream")]
    Usage(#[from] UsageError),

    /// A configuration object could not be built.
    #[error("Invalid TLS configuration")]
    Config(#[from] ConfigBuildError),

    /// The backend could not create an engine.
    #[error("Unable to create TLS engine")]
    EngineSetup(#[from] EngineSetupError),
}

/// A direction of data flow on a stream.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Hash)]
#[strum(serialize_all = "lowercase")]
#[allow(clippy::exhaustive_enums)]
pub enum Direction {
    /// Data from the peer.
    Read,
    /// Data to the peer.
    Write,
}

/// A mistake in how a stream was driven.
///
/// These are reported without touching the transport, and do not put the
/// stream into a failed state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum UsageError {
    /// Data or renegotiation was requested before any authentication.
    #[error("The stream has not been authenticated")]
    NotAuthenticated,
    /// A second authentication was attempted.
    #[error("The stream is already authenticated")]
    AlreadyAuthenticated,
    /// A call overlapped another one in the same direction.
    #[error("Another {0} is already in progress")]
    Overlapping(Direction),
    /// The stream has been closed locally.
    #[error("The stream has been closed")]
    Closed,
}

/// A coarse classification of an [`Error`].
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The transport failed or was closed early.
    #[strum(serialize = "transport failure")]
    TransportFailed,
    /// The peer violated the protocol, or we refused its parameters.
    #[strum(serialize = "TLS protocol violation")]
    ProtocolViolation,
    /// We refused the peer's certificate.
    #[strum(serialize = "peer certificate rejected")]
    PeerRejected,
    /// An operation was canceled or stopped making progress.
    #[strum(serialize = "operation abandoned")]
    Abandoned,
    /// The caller used the API incorrectly.
    #[strum(serialize = "bad API usage")]
    BadApiUsage,
    /// Configuration was invalid or unsupported.
    #[strum(serialize = "invalid configuration")]
    InvalidConfig,
}

impl Error {
    /// Wrap a transport error.
    pub(crate) fn transport(e: io::Error) -> Self {
        Error::Transport(Arc::new(e))
    }

    /// Return the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        use Error as E;
        use ErrorKind as EK;
        match self {
            E::Transport(_) | E::ClosedDuringHandshake => EK::TransportFailed,
            E::Protocol { .. } => EK::ProtocolViolation,
            E::VerificationRejected { .. } => EK::PeerRejected,
            E::Canceled | E::Stalled(_) => EK::Abandoned,
            E::Usage(_) => EK::BadApiUsage,
            E::Config(_) | E::EngineSetup(_) => EK::InvalidConfig,
        }
    }

    /// Return true if this error leaves the stream permanently failed.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            Error::Usage(_) | Error::Config(_) | Error::EngineSetup(_)
        )
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> io::Error {
        use io::ErrorKind as IK;
        let kind = match &err {
            Error::Transport(e) => e.kind(),
            Error::ClosedDuringHandshake => IK::UnexpectedEof,
            Error::Protocol { .. } | Error::VerificationRejected { .. } => IK::InvalidData,
            Error::Canceled => IK::Interrupted,
            Error::Stalled(_) => IK::TimedOut,
            Error::Usage(UsageError::NotAuthenticated) => IK::NotConnected,
            Error::Usage(UsageError::Closed) => IK::BrokenPipe,
            Error::Usage(_) => IK::InvalidInput,
            Error::Config(_) | Error::EngineSetup(_) => IK::InvalidInput,
        };
        io::Error::new(kind, err)
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
    fn kinds() {
        let e = Error::transport(io::Error::new(io::ErrorKind::ConnectionReset, "gone"));
        assert_eq!(e.kind(), ErrorKind::TransportFailed);
        assert!(e.is_terminal());
        let io: io::Error = e.into();
        assert_eq!(io.kind(), io::ErrorKind::ConnectionReset);

        let e = Error::from(UsageError::Overlapping(Direction::Write));
        assert_eq!(e.kind(), ErrorKind::BadApiUsage);
        assert!(!e.is_terminal());
        assert_eq!(
            UsageError::Overlapping(Direction::Write).to_string(),
            "Another write is already in progress"
        );

        let e = Error::VerificationRejected {
            result: VerifyResult::CertHasExpired,
            depth: 1,
        };
        assert_eq!(e.kind(), ErrorKind::PeerRejected);
        assert_eq!(
            e.to_string(),
            "Peer certificate rejected at depth 1: certificate has expired (10)"
        );
        let io: io::Error = e.into();
        assert_eq!(io.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn clone_keeps_source() {
        use std::error::Error as _;
        let e = Error::transport(io::Error::other("boom"));
        let e2 = e.clone();
        assert_eq!(e2.source().unwrap().to_string(), "boom");
    }
}
