//! The handshake state machine.
//!
//! [`Handshake`] records where a connection is in its lifecycle, and
//! knows how to take a single step with the engine.  It never performs
//! I/O: whenever the engine needs the transport, the step returns and the
//! stream's pump loop does the work before stepping again.

use tracing::{debug, info, warn};

use crate::cert::{self, CertificateCallbacks, Verdict, VerifyResult};
use crate::config::Role;
use crate::engine::{EngineCode, EngineHandle, Needs, Status};
use crate::err::Error;

/// Where a stream is in its handshake lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, strum::Display, strum::IntoStaticStr)]
#[non_exhaustive]
pub enum HandshakeState {
    /// No handshake has been attempted yet.
    NotStarted,
    /// The initial handshake is running.
    InProgress,
    /// Application data may flow.
    Established,
    /// A renegotiation was requested but has not been started.
    RenegotiateRequested,
    /// A renegotiation is running.
    RenegotiateInProgress,
    /// The stream failed; every later call reports the failure.
    Failed,
}

impl HandshakeState {
    /// Return true if a handshake is running or about to run.
    pub fn is_handshaking(self) -> bool {
        matches!(
            self,
            HandshakeState::InProgress
                | HandshakeState::RenegotiateRequested
                | HandshakeState::RenegotiateInProgress
        )
    }
}

/// What the pump loop must do after a handshake step.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Step {
    /// The handshake is complete.
    Established,
    /// Drain the write pipe to the transport, then step again (or report
    /// the pending fault, if one was recorded).
    Flush,
    /// Read more ciphertext, unless the read pipe has grown past `seen`
    /// since the step was taken.
    NeedInput {
        /// Value of the read pipe's `total_written` at the time of the step.
        seen: u64,
    },
}

/// Handshake bookkeeping for one stream.
#[derive(Debug)]
pub(crate) struct Handshake {
    /// Current state.
    state: HandshakeState,
    /// A fatal error held back until the write pipe has been flushed.
    pending_fault: Option<Error>,
    /// The error that put us into [`HandshakeState::Failed`].
    failure: Option<Error>,
    /// The most recent certificate rejection, so that the engine's generic
    /// failure code can be reported as a verification failure.
    rejection: Option<(VerifyResult, u32)>,
}

impl Handshake {
    /// Return bookkeeping for a stream that has not started.
    pub(crate) fn new() -> Self {
        Handshake {
            state: HandshakeState::NotStarted,
            pending_fault: None,
            failure: None,
            rejection: None,
        }
    }

    /// Current state.
    pub(crate) fn state(&self) -> HandshakeState {
        self.state
    }

    /// If the stream has failed, return the failure.
    pub(crate) fn check_failed(&self) -> Result<(), Error> {
        match &self.failure {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    /// Move to [`HandshakeState::Failed`], remembering `err`.
    ///
    /// If we had already failed, the original failure is kept and returned.
    pub(crate) fn fail(&mut self, err: Error) -> Error {
        if let Some(first) = &self.failure {
            return first.clone();
        }
        warn!("TLS stream failed in state {}: {}", self.state, err);
        if let Some(fault) = self.pending_fault.take() {
            warn!("Alert for pending fault was not delivered: {}", fault);
        }
        self.state = HandshakeState::Failed;
        self.failure = Some(err.clone());
        err
    }

    /// If a fault was held back for a flush, fail with it now.
    pub(crate) fn deliver_pending_fault(&mut self) -> Result<(), Error> {
        match self.pending_fault.take() {
            Some(err) => Err(self.fail(err)),
            None => Ok(()),
        }
    }

    /// Return true if a fault is waiting for the write pipe to drain.
    pub(crate) fn has_pending_fault(&self) -> bool {
        self.pending_fault.is_some()
    }

    /// Established → RenegotiateRequested.
    pub(crate) fn request_renegotiation(&mut self) -> Result<(), Error> {
        self.check_failed()?;
        match self.state {
            HandshakeState::Established => {
                debug!("Renegotiation requested");
                self.state = HandshakeState::RenegotiateRequested;
                Ok(())
            }
            // Already on its way; the caller just waits for it.
            s if s.is_handshaking() => Ok(()),
            _ => Err(crate::err::UsageError::NotAuthenticated.into()),
        }
    }

    /// Turn an engine failure code into an error, and either fail
    /// immediately or hold it back until the write pipe has drained.
    ///
    /// Returns `Ok(())` if the fault was deferred.
    pub(crate) fn engine_fatal(&mut self, engine: &EngineHandle, code: EngineCode) -> Result<(), Error> {
        let err = match self.rejection.take() {
            Some((result, depth)) => Error::VerificationRejected { result, depth },
            None => Error::Protocol {
                code,
                message: engine.error_string(code),
            },
        };
        let pending = engine.write_pipe().pending();
        if pending > 0 {
            debug!("Holding back fatal error until {} alert bytes are flushed", pending);
            self.pending_fault = Some(err);
            Ok(())
        } else {
            Err(self.fail(err))
        }
    }

    /// Answer a certificate question from the engine through `callbacks`.
    ///
    /// This is the only place certificate callbacks are invoked.
    pub(crate) fn resolve(
        &mut self,
        engine: &mut EngineHandle,
        callbacks: &dyn CertificateCallbacks,
        role: Role,
        needs: &Needs,
    ) {
        match needs {
            Needs::PeerVerification(req) => {
                let verdict = cert::verify_peer(callbacks, req);
                if verdict == Verdict::Reject {
                    self.rejection = Some((req.result, req.depth));
                }
                engine.resolve_peer_verification(verdict);
            }
            Needs::LocalCertificate(req) => {
                let chosen = cert::select_local_certificate(callbacks, role, req);
                engine.resolve_local_certificate(chosen);
            }
            Needs::Input | Needs::Output => {}
        }
    }

    /// Take one handshake step.
    ///
    /// Certificate questions are answered inline; everything that needs
    /// the transport is returned to the caller as a [`Step`].  When the
    /// engine wants input but also has output queued, the output wins.
    pub(crate) fn step(
        &mut self,
        engine: &mut EngineHandle,
        callbacks: &dyn CertificateCallbacks,
        role: Role,
    ) -> Result<Step, Error> {
        self.check_failed()?;
        if self.pending_fault.is_some() {
            return Ok(Step::Flush);
        }
        match self.state {
            HandshakeState::Established => return Ok(Step::Established),
            HandshakeState::NotStarted => {
                debug!("Starting {} handshake", role);
                self.state = HandshakeState::InProgress;
            }
            HandshakeState::RenegotiateRequested => {
                debug!("Starting renegotiation as {}", role);
                self.state = HandshakeState::RenegotiateInProgress;
                match engine.start_renegotiation() {
                    Status::Fatal(code) => {
                        self.engine_fatal(engine, code)?;
                        return Ok(Step::Flush);
                    }
                    Status::Done(()) | Status::Progress(_) => {}
                }
            }
            HandshakeState::InProgress | HandshakeState::RenegotiateInProgress => {}
            HandshakeState::Failed => {
                // `failure` is always set in this state, so check_failed
                // has already returned.
            }
        }

        loop {
            match engine.step_handshake() {
                Status::Done(()) => {
                    let renegotiated = self.state == HandshakeState::RenegotiateInProgress;
                    self.state = HandshakeState::Established;
                    self.rejection = None;
                    if renegotiated {
                        info!("TLS renegotiation complete");
                    } else {
                        info!("TLS handshake complete");
                    }
                    // Anything the engine queued on the way out (a final
                    // Finished message, say) still has to go.
                    if engine.write_pipe().pending() > 0 {
                        return Ok(Step::Flush);
                    }
                    return Ok(Step::Established);
                }
                Status::Progress(Needs::Input) => {
                    if engine.write_pipe().pending() > 0 {
                        return Ok(Step::Flush);
                    }
                    return Ok(Step::NeedInput {
                        seen: engine.read_pipe().total_written(),
                    });
                }
                Status::Progress(Needs::Output) => return Ok(Step::Flush),
                Status::Progress(needs) => self.resolve(engine, callbacks, role, &needs),
                Status::Fatal(code) => {
                    self.engine_fatal(engine, code)?;
                    return Ok(Step::Flush);
                }
            }
        }
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
    use crate::cert::{Certificate, CertificateRequest, DefaultCallbacks, PeerVerification};
    use crate::engine::TlsEngine;
    use crate::pipe::{BytePipe, PipePair};
    use crate::session::SessionInfo;
    use assert_matches::assert_matches;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// One scripted engine reply, with the bytes to emit before it.
    type Scripted = (&'static [u8], Status<()>);

    /// Record of what the scripted engine was told.
    #[derive(Default)]
    struct Log {
        verdicts: Vec<Verdict>,
        selections: Vec<Option<String>>,
        renegotiations: usize,
    }

    /// An engine that plays back a fixed list of handshake results.
    struct ScriptEngine {
        script: VecDeque<Scripted>,
        log: Arc<Mutex<Log>>,
    }

    impl ScriptEngine {
        fn handle(script: Vec<Scripted>) -> (EngineHandle, Arc<Mutex<Log>>) {
            let log = Arc::new(Mutex::new(Log::default()));
            let engine = ScriptEngine {
                script: script.into(),
                log: log.clone(),
            };
            (
                EngineHandle::attach(Box::new(engine), BytePipe::new(), BytePipe::new()),
                log,
            )
        }
    }

    impl TlsEngine for ScriptEngine {
        fn step_handshake(&mut self, pipes: &mut PipePair) -> Status<()> {
            let (bytes, status) = self.script.pop_front().unwrap();
            pipes.write.write(bytes);
            status
        }
        fn start_renegotiation(&mut self, _pipes: &mut PipePair) -> Status<()> {
            self.log.lock().unwrap().renegotiations += 1;
            Status::Done(())
        }
        fn resolve_peer_verification(&mut self, verdict: Verdict) {
            self.log.lock().unwrap().verdicts.push(verdict);
        }
        fn resolve_local_certificate(&mut self, certificate: Option<Certificate>) {
            self.log
                .lock()
                .unwrap()
                .selections
                .push(certificate.map(|c| c.subject().to_string()));
        }
        fn encrypt(&mut self, _plaintext: &[u8], _pipes: &mut PipePair) -> Status<usize> {
            unimplemented!()
        }
        fn decrypt(&mut self, _out: &mut [u8], _pipes: &mut PipePair) -> Status<usize> {
            unimplemented!()
        }
        fn shutdown(&mut self, _pipes: &mut PipePair) -> Status<()> {
            Status::Done(())
        }
        fn error_string(&self, code: EngineCode) -> String {
            format!("scripted failure {}", code)
        }
        fn session(&self) -> Option<SessionInfo> {
            None
        }
    }

    fn drain(engine: &mut EngineHandle) -> Vec<u8> {
        let n = engine.write_pipe().pending();
        engine.write_pipe_mut().read_vec(n)
    }

    #[test]
    fn straight_through() {
        let (mut engine, _log) = ScriptEngine::handle(vec![
            (b"hello", Status::Progress(Needs::Input)),
            (b"", Status::Progress(Needs::Input)),
            (b"", Status::Done(())),
        ]);
        let mut hs = Handshake::new();
        assert_eq!(hs.state(), HandshakeState::NotStarted);

        // Output queued alongside a request for input: flush first.
        let s = hs.step(&mut engine, &DefaultCallbacks, Role::Client).unwrap();
        assert_eq!(s, Step::Flush);
        assert_eq!(hs.state(), HandshakeState::InProgress);
        assert_eq!(drain(&mut engine), b"hello");

        let s = hs.step(&mut engine, &DefaultCallbacks, Role::Client).unwrap();
        assert_eq!(s, Step::NeedInput { seen: 0 });
        engine.read_pipe_mut().write(b"reply");

        let s = hs.step(&mut engine, &DefaultCallbacks, Role::Client).unwrap();
        assert_eq!(s, Step::Established);
        assert_eq!(hs.state(), HandshakeState::Established);
    }

    #[test]
    fn immediate_fatal() {
        let (mut engine, _log) = ScriptEngine::handle(vec![(b"", Status::Fatal(EngineCode(7)))]);
        let mut hs = Handshake::new();
        let err = hs.step(&mut engine, &DefaultCallbacks, Role::Server).unwrap_err();
        assert_matches!(err, Error::Protocol { code: EngineCode(7), ref message } if message == "scripted failure 0x7");
        assert_eq!(hs.state(), HandshakeState::Failed);
        // Later calls see the same failure.
        assert_matches!(
            hs.step(&mut engine, &DefaultCallbacks, Role::Server),
            Err(Error::Protocol { .. })
        );
    }

    #[test]
    fn deferred_fatal() {
        let (mut engine, _log) =
            ScriptEngine::handle(vec![(b"ALERT", Status::Fatal(EngineCode(40)))]);
        let mut hs = Handshake::new();
        let s = hs.step(&mut engine, &DefaultCallbacks, Role::Server).unwrap();
        assert_eq!(s, Step::Flush);
        assert!(hs.has_pending_fault());
        assert_ne!(hs.state(), HandshakeState::Failed);

        // Stepping again before the flush does nothing new.
        let s = hs.step(&mut engine, &DefaultCallbacks, Role::Server).unwrap();
        assert_eq!(s, Step::Flush);

        assert_eq!(drain(&mut engine), b"ALERT");
        assert_matches!(hs.deliver_pending_fault(), Err(Error::Protocol { .. }));
        assert_eq!(hs.state(), HandshakeState::Failed);
    }

    /// Callbacks that reject everything.
    struct RejectAll;
    impl CertificateCallbacks for RejectAll {
        fn verify_peer(&self, _request: &PeerVerification) -> Verdict {
            Verdict::Reject
        }
    }

    #[test]
    fn rejection_is_reported_as_verification_failure() {
        let cert = Certificate::new("CN=peer", "CN=ca", vec![]);
        let req = PeerVerification::new(cert.clone(), vec![cert], 0, VerifyResult::Ok);
        let (mut engine, log) = ScriptEngine::handle(vec![
            (b"", Status::Progress(Needs::PeerVerification(req))),
            (b"BAD", Status::Fatal(EngineCode(42))),
        ]);
        let mut hs = Handshake::new();
        let s = hs.step(&mut engine, &RejectAll, Role::Client).unwrap();
        assert_eq!(s, Step::Flush);
        assert_eq!(log.lock().unwrap().verdicts, vec![Verdict::Reject]);
        drain(&mut engine);
        assert_matches!(
            hs.deliver_pending_fault(),
            Err(Error::VerificationRejected {
                result: VerifyResult::Ok,
                depth: 0
            })
        );
    }

    #[test]
    fn keyless_certificate_not_presented() {
        let keyless = Certificate::new("CN=me", "CN=ca", vec![]);
        let req = CertificateRequest::new("host", vec![keyless], None, vec![]);
        let (mut engine, log) = ScriptEngine::handle(vec![
            (b"", Status::Progress(Needs::LocalCertificate(req))),
            (b"", Status::Done(())),
        ]);
        let mut hs = Handshake::new();
        let s = hs.step(&mut engine, &DefaultCallbacks, Role::Client).unwrap();
        assert_eq!(s, Step::Established);
        assert_eq!(log.lock().unwrap().selections, vec![None]);
    }

    #[test]
    fn renegotiation() {
        let (mut engine, log) = ScriptEngine::handle(vec![
            (b"", Status::Done(())),
            (b"HELLO", Status::Progress(Needs::Input)),
            (b"FIN", Status::Done(())),
        ]);
        let mut hs = Handshake::new();
        assert_matches!(
            hs.request_renegotiation(),
            Err(Error::Usage(crate::err::UsageError::NotAuthenticated))
        );
        assert_eq!(
            hs.step(&mut engine, &DefaultCallbacks, Role::Client).unwrap(),
            Step::Established
        );

        hs.request_renegotiation().unwrap();
        assert_eq!(hs.state(), HandshakeState::RenegotiateRequested);
        assert_eq!(
            hs.step(&mut engine, &DefaultCallbacks, Role::Client).unwrap(),
            Step::Flush
        );
        assert_eq!(hs.state(), HandshakeState::RenegotiateInProgress);
        assert_eq!(log.lock().unwrap().renegotiations, 1);
        assert_eq!(drain(&mut engine), b"HELLO");

        // Completion with a trailing message still asks for a flush.
        assert_eq!(
            hs.step(&mut engine, &DefaultCallbacks, Role::Client).unwrap(),
            Step::Flush
        );
        assert_eq!(hs.state(), HandshakeState::Established);
        assert_eq!(drain(&mut engine), b"FIN");
        assert_eq!(
            hs.step(&mut engine, &DefaultCallbacks, Role::Client).unwrap(),
            Step::Established
        );
    }
}
