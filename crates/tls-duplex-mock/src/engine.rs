//! A toy TLS engine that speaks the [`wire`](crate::wire) record format.
//!
//! It follows the shape of a real handshake closely enough to exercise
//! everything a stream adapter has to cope with: output and input needs,
//! certificate verification and selection, client certificates,
//! renegotiation initiated from either side, alerts queued ahead of a
//! fatal error, and closure alerts.  It provides no security whatsoever.

use std::collections::VecDeque;

use tracing::{debug, trace};

use tls_duplex::{
    Certificate, CertificateRequest, CipherAlgorithm, CipherDescription, EngineCode,
    EngineConfig, EngineSetupError, HashAlgorithm, KeyExchangeAlgorithm, Needs,
    PeerVerification, PipePair, ProtocolVersion, Role, SessionInfo, Status, TlsBackend,
    TlsEngine, Verdict, VerifyMode, VerifyResult,
};

use crate::wire::{self, ClientHello, Incoming, RecordKind, ServerHello};

/// Alert numbers used by the mock engine.
pub mod alert {
    /// A record arrived that makes no sense at this point.
    pub const UNEXPECTED_MESSAGE: u8 = 10;
    /// A certificate was rejected.
    pub const BAD_CERTIFICATE: u8 = 42;
    /// A record could not be parsed.
    pub const DECODE_ERROR: u8 = 50;
    /// No protocol version in common.
    pub const PROTOCOL_VERSION: u8 = 70;
    /// The engine is misconfigured.
    pub const INTERNAL_ERROR: u8 = 80;
    /// The server required a client certificate and got none.
    pub const CERTIFICATE_REQUIRED: u8 = 116;

    /// Name of an alert, for error strings.
    pub fn name(alert: u8) -> &'static str {
        match alert {
            UNEXPECTED_MESSAGE => "unexpected_message",
            BAD_CERTIFICATE => "bad_certificate",
            DECODE_ERROR => "decode_error",
            PROTOCOL_VERSION => "protocol_version",
            INTERNAL_ERROR => "internal_error",
            CERTIFICATE_REQUIRED => "certificate_required",
            _ => "unknown_alert",
        }
    }
}

/// Base of the codes for alerts we sent.
const LOCAL_ALERT_BASE: u64 = 0x1000;
/// Base of the codes for alerts we received.
const REMOTE_ALERT_BASE: u64 = 0x2000;

/// The failure code for an alert this engine sent.
pub fn local_alert(alert: u8) -> EngineCode {
    EngineCode(LOCAL_ALERT_BASE + u64::from(alert))
}

/// The failure code for an alert this engine received.
pub fn remote_alert(alert: u8) -> EngineCode {
    EngineCode(REMOTE_ALERT_BASE + u64::from(alert))
}

/// Name of the only cipher suite the mock engine knows.
pub const CIPHER_NAME: &str = "MOCK-ECDHE-XOR-SHA256";

/// Knobs for making the mock misbehave.
#[derive(Clone, Debug, Default)]
#[allow(clippy::exhaustive_structs)]
pub struct MockSettings {
    /// Report this raw result code for the peer's leaf certificate instead
    /// of working it out.
    pub forced_verify_result: Option<i32>,
    /// Refuse to create engines.
    pub fail_creation: bool,
    /// Once established, answer every encrypt with "need output" without
    /// producing anything.
    pub stall_on_output: bool,
    /// Subjects reported as revoked when revocation checking is on.
    pub revoked_subjects: Vec<String>,
}

/// A [`TlsBackend`] producing [`MockEngine`]s.
#[derive(Clone, Debug, Default)]
pub struct MockBackend {
    /// Settings handed to every engine.
    settings: MockSettings,
}

impl MockBackend {
    /// A backend with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose engines use `settings`.
    pub fn with_settings(settings: MockSettings) -> Self {
        MockBackend { settings }
    }
}

impl TlsBackend for MockBackend {
    fn create(&self, config: &EngineConfig) -> Result<Box<dyn TlsEngine>, EngineSetupError> {
        if self.settings.fail_creation {
            return Err(EngineSetupError::new("mock backend refuses to create engines"));
        }
        if config.role == Role::Server && config.certificate.is_none() {
            return Err(EngineSetupError::new("server engine needs a certificate"));
        }
        Ok(Box::new(MockEngine::new(config.clone(), self.settings.clone())))
    }
}

/// Where a [`MockEngine`] is in its handshake.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
    /// Nothing has happened yet.
    Idle,
    /// Client: hello sent.
    AwaitServerHello,
    /// Either side: answering verification questions about the peer chain.
    Verify,
    /// Client: asking the application for a certificate.
    ChooseCertificate,
    /// Client: finished sent.
    AwaitServerFinished,
    /// Server: waiting for (possibly another) client hello.
    AwaitClientHello,
    /// Server: waiting for the client's certificate record.
    AwaitClientCertificate,
    /// Server: waiting for the client's finished.
    AwaitClientFinished,
    /// Handshake complete.
    Established,
    /// Dead.
    Failed(EngineCode),
}

/// The mock engine.
pub struct MockEngine {
    /// What we were created with.
    config: EngineConfig,
    /// How to misbehave.
    settings: MockSettings,
    /// Handshake position.
    phase: Phase,
    /// Number of handshakes completed.
    handshakes: u32,
    /// Negotiated version.
    version: Option<ProtocolVersion>,
    /// Certificate the peer presented in the current handshake.
    peer_certificate: Option<Certificate>,
    /// Certificate we presented in the current handshake.
    local_certificate: Option<Certificate>,
    /// What the last completed handshake agreed on.
    established: Option<SessionInfo>,
    /// Verification questions not yet answered, highest depth first.
    verify_queue: VecDeque<PeerVerification>,
    /// A verification question was answered with [`Verdict::Reject`].
    rejected: bool,
    /// Client: the server asked for a certificate.
    certificate_requested: bool,
    /// Client: the application has answered the certificate question.
    certificate_chosen: bool,
    /// Client: issuers the server said it accepts.
    acceptable_issuers: Vec<String>,
    /// Decrypted data not yet handed out.
    plaintext: VecDeque<u8>,
    /// The peer sent its closure alert.
    peer_closed: bool,
}

impl MockEngine {
    /// Create an engine.
    pub fn new(config: EngineConfig, settings: MockSettings) -> Self {
        let phase = match config.role {
            Role::Client => Phase::Idle,
            Role::Server => Phase::AwaitClientHello,
        };
        MockEngine {
            config,
            settings,
            phase,
            handshakes: 0,
            version: None,
            peer_certificate: None,
            local_certificate: None,
            established: None,
            verify_queue: VecDeque::new(),
            rejected: false,
            certificate_requested: false,
            certificate_chosen: false,
            acceptable_issuers: Vec::new(),
            plaintext: VecDeque::new(),
            peer_closed: false,
        }
    }

    /// Number of handshakes completed so far.
    pub fn handshakes(&self) -> u32 {
        self.handshakes
    }

    /// Send `alert` and die.
    fn abort<T>(&mut self, pipes: &mut PipePair, alert: u8) -> Status<T> {
        debug!("Mock {} engine sending alert {}", self.config.role, alert::name(alert));
        pipes.write.write(&wire::alert_record(alert));
        let code = local_alert(alert);
        self.phase = Phase::Failed(code);
        Status::Fatal(code)
    }

    /// Die because the peer sent an alert.
    fn received_alert<T>(&mut self, payload: &[u8]) -> Status<T> {
        let alert = payload.first().copied().unwrap_or(0);
        debug!("Mock {} engine received alert {}", self.config.role, alert::name(alert));
        let code = remote_alert(alert);
        self.phase = Phase::Failed(code);
        Status::Fatal(code)
    }

    /// Client: start a handshake.
    fn send_client_hello(&mut self, pipes: &mut PipePair) {
        let hello = ClientHello {
            versions: self.config.protocols,
            host: self.config.host_name.clone().unwrap_or_default(),
        };
        pipes.write.write(&hello.to_record());
        self.certificate_requested = false;
        self.certificate_chosen = false;
        self.rejected = false;
        self.verify_queue.clear();
        self.phase = Phase::AwaitServerHello;
    }

    /// Mark the handshake complete.
    fn complete(&mut self) {
        self.handshakes += 1;
        self.phase = Phase::Established;
        self.established = self.describe_session();
        trace!("Mock {} engine completed handshake {}", self.config.role, self.handshakes);
    }

    /// Describe the current handshake's parameters.
    fn describe_session(&self) -> Option<SessionInfo> {
        let bits = if self.config.cipher_list.starts_with("HIGH") {
            256
        } else if self.config.cipher_list.starts_with("MEDIUM") {
            128
        } else {
            56
        };
        let cipher = CipherDescription::new(CIPHER_NAME, bits)
            .with_algorithm(CipherAlgorithm::Other)
            .with_hash(HashAlgorithm::Sha256)
            .with_key_exchange(KeyExchangeAlgorithm::EcDiffieHellman, 256);
        Some(SessionInfo::new(
            self.version?,
            cipher,
            self.peer_certificate.clone(),
            self.local_certificate.clone(),
        ))
    }

    /// Work out the preliminary result for the peer's leaf certificate.
    fn leaf_result(&self, leaf: &Certificate, trusted: bool, chain_len: usize) -> VerifyResult {
        if let Some(code) = self.settings.forced_verify_result {
            return VerifyResult::from_code(code);
        }
        if !trusted {
            return if leaf.is_self_signed() {
                VerifyResult::DepthZeroSelfSignedCert
            } else {
                VerifyResult::UnableToGetIssuerCertLocally
            };
        }
        if chain_len > self.config.verify_depth as usize + 1 {
            return VerifyResult::CertChainTooLong;
        }
        if let Some(host) = &self.config.host_name {
            let subject = leaf.subject();
            if subject != host && subject != format!("CN={}", host) {
                return VerifyResult::HostnameMismatch;
            }
        }
        if self.config.check_revocation
            && self.settings.revoked_subjects.iter().any(|s| s == leaf.subject())
        {
            return VerifyResult::CertRevoked;
        }
        VerifyResult::Ok
    }

    /// Queue verification questions for the chain ending in `leaf`.
    fn queue_verification(&mut self, leaf: Certificate) {
        let issuer = self
            .config
            .trusted_authorities
            .iter()
            .find(|ca| ca.subject() == leaf.issuer())
            .cloned();
        let mut chain = vec![leaf.clone()];
        if let Some(ca) = &issuer {
            if !leaf.is_self_signed() {
                chain.push(ca.clone());
            }
        }
        let result = self.leaf_result(&leaf, issuer.is_some(), chain.len());
        self.verify_queue.clear();
        self.rejected = false;
        if chain.len() > 1 {
            self.verify_queue.push_back(PeerVerification::new(
                chain[1].clone(),
                chain.clone(),
                1,
                VerifyResult::Ok,
            ));
        }
        self.verify_queue
            .push_back(PeerVerification::new(leaf, chain, 0, result));
        self.phase = Phase::Verify;
    }

    /// Client: send our certificate (if asked) and finished.
    fn send_client_finished(&mut self, pipes: &mut PipePair) {
        if self.certificate_requested {
            let names = self
                .local_certificate
                .as_ref()
                .map(|c| (c.subject(), c.issuer()));
            wire::write_record(
                &mut pipes.write,
                RecordKind::Certificate,
                &wire::encode_certificate(names),
            );
        }
        wire::write_record(&mut pipes.write, RecordKind::Finished, b"");
        self.phase = Phase::AwaitServerFinished;
    }

    /// Server: answer a client hello.
    fn on_client_hello(&mut self, payload: &[u8], pipes: &mut PipePair) -> Option<Status<()>> {
        let Some(hello) = ClientHello::decode(payload) else {
            return Some(self.abort(pipes, alert::DECODE_ERROR));
        };
        let Some(version) = (hello.versions & self.config.protocols).highest() else {
            return Some(self.abort(pipes, alert::PROTOCOL_VERSION));
        };
        let Some(certificate) = self.config.certificate.clone() else {
            return Some(self.abort(pipes, alert::INTERNAL_ERROR));
        };
        let request_certificate = self.config.verify_mode.contains(VerifyMode::PEER);
        let reply = ServerHello {
            version,
            request_certificate,
            subject: certificate.subject().to_string(),
            issuer: certificate.issuer().to_string(),
            acceptable_issuers: self.config.acceptable_issuers.clone(),
        };
        wire::write_record(&mut pipes.write, RecordKind::ServerHello, &reply.encode());
        debug!("Mock server chose {} for {:?}", version, hello.host);
        self.version = Some(version);
        self.local_certificate = Some(certificate);
        self.peer_certificate = None;
        self.phase = if request_certificate {
            Phase::AwaitClientCertificate
        } else {
            Phase::AwaitClientFinished
        };
        None
    }

    /// Client: process the server's hello.
    fn on_server_hello(&mut self, payload: &[u8], pipes: &mut PipePair) -> Option<Status<()>> {
        let Some(hello) = ServerHello::decode(payload) else {
            return Some(self.abort(pipes, alert::DECODE_ERROR));
        };
        if !self.config.protocols.contains(hello.version.flag()) {
            return Some(self.abort(pipes, alert::PROTOCOL_VERSION));
        }
        let peer = Certificate::new(hello.subject, hello.issuer, Vec::new());
        self.version = Some(hello.version);
        self.peer_certificate = Some(peer.clone());
        self.local_certificate = None;
        self.certificate_requested = hello.request_certificate;
        self.acceptable_issuers = hello.acceptable_issuers;
        self.queue_verification(peer);
        None
    }

    /// Server: process the client's certificate record.
    fn on_client_certificate(
        &mut self,
        payload: &[u8],
        pipes: &mut PipePair,
    ) -> Option<Status<()>> {
        match wire::decode_certificate(payload) {
            None => Some(self.abort(pipes, alert::DECODE_ERROR)),
            Some(None) => {
                if self
                    .config
                    .verify_mode
                    .contains(VerifyMode::FAIL_IF_NO_PEER_CERT)
                {
                    return Some(self.abort(pipes, alert::CERTIFICATE_REQUIRED));
                }
                self.phase = Phase::AwaitClientFinished;
                None
            }
            Some(Some((subject, issuer))) => {
                let peer = Certificate::new(subject, issuer, Vec::new());
                self.peer_certificate = Some(peer.clone());
                self.queue_verification(peer);
                None
            }
        }
    }

    /// Handle a record that arrived mid-handshake.  Returns a status if
    /// the handshake cannot simply continue.
    fn on_handshake_record(
        &mut self,
        kind: RecordKind,
        payload: Vec<u8>,
        pipes: &mut PipePair,
    ) -> Option<Status<()>> {
        use Phase as P;
        use RecordKind as K;
        match (self.phase, kind) {
            (_, K::Alert) => Some(self.received_alert(&payload)),
            (_, K::AppData) if self.handshakes > 0 => {
                // Data sent before the peer saw our renegotiation.
                let mut payload = payload;
                wire::xor(&mut payload);
                self.plaintext.extend(payload);
                None
            }
            (P::AwaitClientHello, K::ClientHello) => self.on_client_hello(&payload, pipes),
            (P::AwaitServerHello, K::ServerHello) => self.on_server_hello(&payload, pipes),
            (P::AwaitClientCertificate, K::Certificate) => {
                self.on_client_certificate(&payload, pipes)
            }
            (P::AwaitServerFinished, K::Finished) => {
                self.complete();
                None
            }
            (P::AwaitClientFinished, K::Finished) => {
                wire::write_record(&mut pipes.write, K::Finished, b"");
                self.complete();
                None
            }
            // A request that crossed with our own hello.
            (_, K::HelloRequest) if self.config.role == Role::Client => None,
            (_, _) => Some(self.abort(pipes, alert::UNEXPECTED_MESSAGE)),
        }
    }

    /// Advance the handshake as far as possible.
    fn drive(&mut self, pipes: &mut PipePair) -> Status<()> {
        loop {
            match self.phase {
                Phase::Failed(code) => return Status::Fatal(code),
                Phase::Established => return Status::Done(()),
                Phase::Idle => self.send_client_hello(pipes),
                Phase::Verify => {
                    if self.rejected {
                        return self.abort(pipes, alert::BAD_CERTIFICATE);
                    }
                    if let Some(request) = self.verify_queue.front() {
                        return Status::Progress(Needs::PeerVerification(request.clone()));
                    }
                    match self.config.role {
                        Role::Server => self.phase = Phase::AwaitClientFinished,
                        Role::Client if self.certificate_requested => {
                            self.phase = Phase::ChooseCertificate;
                        }
                        Role::Client => self.send_client_finished(pipes),
                    }
                }
                Phase::ChooseCertificate => {
                    if !self.certificate_chosen {
                        return Status::Progress(Needs::LocalCertificate(CertificateRequest::new(
                            self.config.host_name.clone().unwrap_or_default(),
                            self.config.local_certificates.clone(),
                            self.peer_certificate.clone(),
                            self.acceptable_issuers.clone(),
                        )));
                    }
                    self.send_client_finished(pipes);
                }
                Phase::AwaitServerHello
                | Phase::AwaitServerFinished
                | Phase::AwaitClientHello
                | Phase::AwaitClientCertificate
                | Phase::AwaitClientFinished => match wire::next_record(&mut pipes.read) {
                    Incoming::Partial => return Status::Progress(Needs::Input),
                    Incoming::Malformed => return self.abort(pipes, alert::DECODE_ERROR),
                    Incoming::Record(kind, payload) => {
                        if let Some(status) = self.on_handshake_record(kind, payload, pipes) {
                            return status;
                        }
                    }
                },
            }
        }
    }

    /// Move buffered plaintext into `out`.
    fn take_plaintext(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.plaintext.len());
        for (dst, src) in out.iter_mut().zip(self.plaintext.drain(..n)) {
            *dst = src;
        }
        n
    }
}

/// Re-type a handshake status for a data operation; `None` if the
/// handshake is done.
fn pending<T>(status: Status<()>) -> Option<Status<T>> {
    match status {
        Status::Done(()) => None,
        Status::Progress(needs) => Some(Status::Progress(needs)),
        Status::Fatal(code) => Some(Status::Fatal(code)),
    }
}

impl TlsEngine for MockEngine {
    fn step_handshake(&mut self, pipes: &mut PipePair) -> Status<()> {
        self.drive(pipes)
    }

    fn start_renegotiation(&mut self, pipes: &mut PipePair) -> Status<()> {
        match self.phase {
            Phase::Established => {}
            Phase::Failed(code) => return Status::Fatal(code),
            _ => return Status::Done(()),
        }
        match self.config.role {
            Role::Client => self.send_client_hello(pipes),
            Role::Server => {
                wire::write_record(&mut pipes.write, RecordKind::HelloRequest, b"");
                self.phase = Phase::AwaitClientHello;
            }
        }
        Status::Done(())
    }

    fn resolve_peer_verification(&mut self, verdict: Verdict) {
        if self.verify_queue.pop_front().is_some() && verdict == Verdict::Reject {
            self.rejected = true;
        }
    }

    fn resolve_local_certificate(&mut self, certificate: Option<Certificate>) {
        self.local_certificate = certificate;
        self.certificate_chosen = true;
    }

    fn encrypt(&mut self, plaintext: &[u8], pipes: &mut PipePair) -> Status<usize> {
        if let Phase::Failed(code) = self.phase {
            return Status::Fatal(code);
        }
        if self.handshakes == 0 {
            return self.abort(pipes, alert::INTERNAL_ERROR);
        }
        if self.settings.stall_on_output {
            return Status::Progress(Needs::Output);
        }
        let n = plaintext.len().min(wire::MAX_PAYLOAD);
        pipes.write.write(&wire::app_data_record(&plaintext[..n]));
        Status::Done(n)
    }

    fn decrypt(&mut self, out: &mut [u8], pipes: &mut PipePair) -> Status<usize> {
        loop {
            if let Phase::Failed(code) = self.phase {
                return Status::Fatal(code);
            }
            if !self.plaintext.is_empty() {
                return Status::Done(self.take_plaintext(out));
            }
            if self.peer_closed {
                return Status::Done(0);
            }
            if self.handshakes == 0 {
                return self.abort(pipes, alert::UNEXPECTED_MESSAGE);
            }
            if self.phase != Phase::Established {
                if let Some(status) = pending(self.drive(pipes)) {
                    return status;
                }
                continue;
            }
            match wire::next_record(&mut pipes.read) {
                Incoming::Partial => return Status::Progress(Needs::Input),
                Incoming::Malformed => return self.abort(pipes, alert::DECODE_ERROR),
                Incoming::Record(RecordKind::AppData, mut payload) => {
                    wire::xor(&mut payload);
                    self.plaintext.extend(payload);
                }
                Incoming::Record(RecordKind::CloseNotify, _) => self.peer_closed = true,
                Incoming::Record(RecordKind::Alert, payload) => {
                    return self.received_alert(&payload);
                }
                Incoming::Record(RecordKind::HelloRequest, _)
                    if self.config.role == Role::Client =>
                {
                    debug!("Mock client renegotiating at the server's request");
                    self.send_client_hello(pipes);
                }
                Incoming::Record(RecordKind::ClientHello, payload)
                    if self.config.role == Role::Server =>
                {
                    debug!("Mock server renegotiating at the client's request");
                    if let Some(Status::Fatal(code)) = self.on_client_hello(&payload, pipes) {
                        return Status::Fatal(code);
                    }
                }
                Incoming::Record(..) => return self.abort(pipes, alert::UNEXPECTED_MESSAGE),
            }
        }
    }

    fn shutdown(&mut self, pipes: &mut PipePair) -> Status<()> {
        if let Phase::Failed(code) = self.phase {
            return Status::Fatal(code);
        }
        wire::write_record(&mut pipes.write, RecordKind::CloseNotify, b"");
        Status::Done(())
    }

    fn error_string(&self, code: EngineCode) -> String {
        let alert = (code.0 & 0xff) as u8;
        match code.0 & !0xff {
            LOCAL_ALERT_BASE => format!("sent alert: {}", alert::name(alert)),
            REMOTE_ALERT_BASE => format!("received alert: {}", alert::name(alert)),
            _ => format!("unknown mock error {}", code),
        }
    }

    fn session(&self) -> Option<SessionInfo> {
        self.established.clone()
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
    use crate::pki;
    use assert_matches::assert_matches;
    use tls_duplex::{BytePipe, ClientOptions, DefaultCallbacks, ServerOptions, TlsStream};

    /// Move everything one engine wrote to the other's read pipe.
    fn shuttle(from: &mut PipePair, to: &mut PipePair) {
        let bytes = from.write.read_vec(from.write.pending());
        to.read.write(&bytes);
    }

    /// Build a client/server engine pair from the stream's own option
    /// types, by way of a throwaway stream.
    fn engine_configs() -> (EngineConfig, EngineConfig) {
        let ca = pki::authority("CN=Mock CA");
        let server_cert = pki::issue("CN=mock.test", &ca);
        let client = ClientOptions::builder()
            .host_name("mock.test")
            .trusted_authorities(vec![ca])
            .build()
            .unwrap();
        let server = ServerOptions::builder()
            .certificate(server_cert)
            .build()
            .unwrap();
        (
            capture(|s| s.configure_client(client, DefaultCallbacks)),
            capture(|s| s.configure_server(server, DefaultCallbacks)),
        )
    }

    /// Return the [`EngineConfig`] a stream hands to its backend.
    fn capture<F>(configure: F) -> EngineConfig
    where
        F: FnOnce(&TlsStream<crate::MockTransport>) -> tls_duplex::Result<()>,
    {
        use std::sync::{Arc, Mutex};
        struct Capture(Arc<Mutex<Option<EngineConfig>>>);
        impl TlsBackend for Capture {
            fn create(
                &self,
                config: &EngineConfig,
            ) -> Result<Box<dyn TlsEngine>, EngineSetupError> {
                *self.0.lock().unwrap() = Some(config.clone());
                MockBackend::new().create(config)
            }
        }
        let seen = Arc::new(Mutex::new(None));
        let (a, _b) = crate::MockTransport::pair();
        let stream = TlsStream::new(a, Capture(seen.clone()), Default::default());
        configure(&stream).unwrap();
        let config = seen.lock().unwrap().take().unwrap();
        config
    }

    #[test]
    fn direct_handshake() {
        let (cc, sc) = engine_configs();
        let mut client = MockEngine::new(cc, MockSettings::default());
        let mut server = MockEngine::new(sc, MockSettings::default());
        let mut cp = PipePair::new(BytePipe::new(), BytePipe::new());
        let mut sp = PipePair::new(BytePipe::new(), BytePipe::new());

        assert_matches!(client.step_handshake(&mut cp), Status::Progress(Needs::Input));
        shuttle(&mut cp, &mut sp);
        assert_matches!(server.step_handshake(&mut sp), Status::Progress(Needs::Input));
        shuttle(&mut sp, &mut cp);

        // CA first, then the leaf.
        let req = assert_matches!(
            client.step_handshake(&mut cp),
            Status::Progress(Needs::PeerVerification(r)) => r);
        assert_eq!(req.depth, 1);
        client.resolve_peer_verification(Verdict::Accept);
        let req = assert_matches!(
            client.step_handshake(&mut cp),
            Status::Progress(Needs::PeerVerification(r)) => r);
        assert_eq!(req.depth, 0);
        assert_eq!(req.result, VerifyResult::Ok);
        client.resolve_peer_verification(Verdict::Accept);

        assert_matches!(client.step_handshake(&mut cp), Status::Progress(Needs::Input));
        shuttle(&mut cp, &mut sp);
        assert_matches!(server.step_handshake(&mut sp), Status::Done(()));
        shuttle(&mut sp, &mut cp);
        assert_matches!(client.step_handshake(&mut cp), Status::Done(()));
        assert_eq!(client.handshakes(), 1);

        assert_matches!(client.encrypt(b"ping", &mut cp), Status::Done(4));
        shuttle(&mut cp, &mut sp);
        let mut buf = [0_u8; 16];
        assert_matches!(server.decrypt(&mut buf, &mut sp), Status::Done(4));
        assert_eq!(&buf[..4], b"ping");
        assert_matches!(server.decrypt(&mut buf, &mut sp), Status::Progress(Needs::Input));

        let session = client.session().unwrap();
        assert_eq!(session.cipher.name, CIPHER_NAME);
        assert_eq!(session.cipher.bits, 128);
        assert_eq!(session.cipher.hash, HashAlgorithm::Sha256);
        assert_eq!(session.cipher.key_exchange, KeyExchangeAlgorithm::EcDiffieHellman);
        assert_eq!(session.peer_certificate.unwrap().subject(), "CN=mock.test");
    }

    #[test]
    fn rejection_sends_alert() {
        let (cc, sc) = engine_configs();
        let mut client = MockEngine::new(cc, MockSettings::default());
        let mut server = MockEngine::new(sc, MockSettings::default());
        let mut cp = PipePair::new(BytePipe::new(), BytePipe::new());
        let mut sp = PipePair::new(BytePipe::new(), BytePipe::new());

        let _ = client.step_handshake(&mut cp);
        shuttle(&mut cp, &mut sp);
        let _ = server.step_handshake(&mut sp);
        shuttle(&mut sp, &mut cp);
        let _ = client.step_handshake(&mut cp);
        client.resolve_peer_verification(Verdict::Reject);
        let code = assert_matches!(client.step_handshake(&mut cp), Status::Fatal(c) => c);
        assert_eq!(code, local_alert(alert::BAD_CERTIFICATE));
        assert_eq!(cp.write.read_vec(100), wire::alert_record(alert::BAD_CERTIFICATE));
        assert_eq!(client.error_string(code), "sent alert: bad_certificate");
        // Still dead.
        assert_matches!(client.step_handshake(&mut cp), Status::Fatal(_));
    }

    #[test]
    fn unknown_code() {
        let (cc, _) = engine_configs();
        let client = MockEngine::new(cc, MockSettings::default());
        assert_eq!(client.error_string(EngineCode(7)), "unknown mock error 0x7");
    }
}
