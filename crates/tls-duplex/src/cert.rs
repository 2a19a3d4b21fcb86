//! Certificates, verification results, and the certificate callback bridge.
//!
//! Certificates and private keys are owned by whatever produced them; this
//! crate only holds counted references.  Cloning a [`Certificate`] is
//! cheap and is how a reference is taken for the duration of a handshake.
//!
//! During a handshake the engine may ask two questions: "do you accept
//! this peer certificate?" and (for clients) "which certificate should I
//! present?".  Both are answered by a [`CertificateCallbacks`]
//! implementation handed to the stream when it is authenticated.  The
//! functions at the bottom of this module are the single place where
//! those callbacks are invoked.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::Role;

/// A counted reference to an X.509 certificate.
///
/// A certificate may carry the private key that goes with it; only such
/// certificates can be presented to a peer.
#[derive(Clone)]
pub struct Certificate {
    /// Shared certificate data.
    inner: Arc<CertificateInner>,
}

/// The data behind a [`Certificate`].
struct CertificateInner {
    /// Subject distinguished name.
    subject: String,
    /// Issuer distinguished name.
    issuer: String,
    /// DER encoding, if known.
    der: Vec<u8>,
    /// Matching private key, if we have one.
    private_key: Option<PrivateKey>,
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.inner.subject)
            .field("issuer", &self.inner.issuer)
            .field("has_private_key", &self.inner.private_key.is_some())
            .finish()
    }
}

/// An error from [`Certificate::from_der`].
#[derive(Clone, Debug, thiserror::Error)]
#[error("Unable to parse X.509 certificate: {0}")]
pub struct CertificateParseError(String);

impl Certificate {
    /// Construct a certificate reference from its names and DER encoding.
    pub fn new(subject: impl Into<String>, issuer: impl Into<String>, der: Vec<u8>) -> Self {
        Certificate {
            inner: Arc::new(CertificateInner {
                subject: subject.into(),
                issuer: issuer.into(),
                der,
                private_key: None,
            }),
        }
    }

    /// Parse a DER-encoded X.509 certificate, extracting its names.
    pub fn from_der(der: &[u8]) -> Result<Self, CertificateParseError> {
        let (_, parsed) = x509_parser::parse_x509_certificate(der)
            .map_err(|e| CertificateParseError(e.to_string()))?;
        Ok(Certificate::new(
            parsed.subject().to_string(),
            parsed.issuer().to_string(),
            der.to_vec(),
        ))
    }

    /// Return a reference to this certificate with `key` attached.
    pub fn with_private_key(&self, key: PrivateKey) -> Self {
        Certificate {
            inner: Arc::new(CertificateInner {
                subject: self.inner.subject.clone(),
                issuer: self.inner.issuer.clone(),
                der: self.inner.der.clone(),
                private_key: Some(key),
            }),
        }
    }

    /// Subject distinguished name.
    pub fn subject(&self) -> &str {
        &self.inner.subject
    }

    /// Issuer distinguished name.
    pub fn issuer(&self) -> &str {
        &self.inner.issuer
    }

    /// DER encoding of this certificate.
    pub fn der(&self) -> &[u8] {
        &self.inner.der
    }

    /// The private key attached to this certificate, if any.
    pub fn private_key(&self) -> Option<&PrivateKey> {
        self.inner.private_key.as_ref()
    }

    /// Return true if this certificate has a private key attached.
    pub fn has_private_key(&self) -> bool {
        self.inner.private_key.is_some()
    }

    /// Return true if subject and issuer are the same.
    pub fn is_self_signed(&self) -> bool {
        self.inner.subject == self.inner.issuer
    }

    /// Return true if `self` and `other` refer to the same certificate
    /// object.
    pub fn ptr_eq(&self, other: &Certificate) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// A counted reference to a private key.
#[derive(Clone)]
pub struct PrivateKey {
    /// Shared key data.
    inner: Arc<PrivateKeyInner>,
}

/// The data behind a [`PrivateKey`].
struct PrivateKeyInner {
    /// Algorithm name, e.g. "rsa" or "ec".
    algorithm: String,
    /// Encoded key material.
    der: Vec<u8>,
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("algorithm", &self.inner.algorithm)
            .finish_non_exhaustive()
    }
}

impl PrivateKey {
    /// Construct a key reference.
    pub fn new(algorithm: impl Into<String>, der: Vec<u8>) -> Self {
        PrivateKey {
            inner: Arc::new(PrivateKeyInner {
                algorithm: algorithm.into(),
                der,
            }),
        }
    }

    /// Algorithm name.
    pub fn algorithm(&self) -> &str {
        &self.inner.algorithm
    }

    /// Encoded key material.
    pub fn der(&self) -> &[u8] {
        &self.inner.der
    }
}

/// Generate [`VerifyResult`] and its code conversions from one table.
macro_rules! verify_results {
    { $( $(#[$meta:meta])* $name:ident = $code:literal => $desc:literal, )* } => {
        /// The engine's preliminary verdict on a certificate.
        ///
        /// These are the standard X.509 verification result codes.  Codes we
        /// do not recognize are kept as [`VerifyResult::Unknown`], which is
        /// never considered a success.
        #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
        #[non_exhaustive]
        pub enum VerifyResult {
            $( $(#[$meta])* $name, )*
            /// A result code we do not recognize.
            Unknown(i32),
        }

        impl VerifyResult {
            /// Interpret a raw engine result code.
            pub fn from_code(code: i32) -> Self {
                match code {
                    $( $code => VerifyResult::$name, )*
                    other => VerifyResult::Unknown(other),
                }
            }

            /// Return the raw result code.
            pub fn code(self) -> i32 {
                match self {
                    $( VerifyResult::$name => $code, )*
                    VerifyResult::Unknown(c) => c,
                }
            }

            /// Return a short description of this result.
            pub fn description(self) -> &'static str {
                match self {
                    $( VerifyResult::$name => $desc, )*
                    VerifyResult::Unknown(_) => "unrecognized verification result",
                }
            }
        }
    }
}

verify_results! {
    /// Verification succeeded.
    Ok = 0 => "ok",
    /// Issuer certificate could not be found.
    UnableToGetIssuerCert = 2 => "unable to get issuer certificate",
    /// CRL could not be found.
    UnableToGetCrl = 3 => "unable to get certificate CRL",
    /// Certificate signature could not be decrypted.
    UnableToDecryptCertSignature = 4 => "unable to decrypt certificate's signature",
    /// Issuer public key could not be decoded.
    UnableToDecodeIssuerPublicKey = 6 => "unable to decode issuer public key",
    /// Certificate signature is invalid.
    CertSignatureFailure = 7 => "certificate signature failure",
    /// CRL signature is invalid.
    CrlSignatureFailure = 8 => "CRL signature failure",
    /// Certificate is not yet valid.
    CertNotYetValid = 9 => "certificate is not yet valid",
    /// Certificate has expired.
    CertHasExpired = 10 => "certificate has expired",
    /// CRL is not yet valid.
    CrlNotYetValid = 11 => "CRL is not yet valid",
    /// CRL has expired.
    CrlHasExpired = 12 => "CRL has expired",
    /// Out of memory during verification.
    OutOfMem = 17 => "out of memory",
    /// Leaf certificate is self-signed and untrusted.
    DepthZeroSelfSignedCert = 18 => "self signed certificate",
    /// Chain contains an untrusted self-signed certificate.
    SelfSignedCertInChain = 19 => "self signed certificate in certificate chain",
    /// Issuer of a locally looked-up certificate could not be found.
    UnableToGetIssuerCertLocally = 20 => "unable to get local issuer certificate",
    /// Chain contains only the leaf and it is not self-signed.
    UnableToVerifyLeafSignature = 21 => "unable to verify the first certificate",
    /// Chain is longer than the permitted depth.
    CertChainTooLong = 22 => "certificate chain too long",
    /// Certificate has been revoked.
    CertRevoked = 23 => "certificate revoked",
    /// A CA certificate is invalid.
    InvalidCa = 24 => "invalid CA certificate",
    /// Path length constraint exceeded.
    PathLengthExceeded = 25 => "path length constraint exceeded",
    /// Certificate cannot be used for this purpose.
    InvalidPurpose = 26 => "unsupported certificate purpose",
    /// Root CA is not trusted for this purpose.
    CertUntrusted = 27 => "certificate not trusted",
    /// Root CA is marked to reject this purpose.
    CertRejected = 28 => "certificate rejected",
    /// Issuer name does not match the subject of the candidate issuer.
    SubjectIssuerMismatch = 29 => "subject issuer mismatch",
    /// Key identifiers do not match.
    AkidSkidMismatch = 30 => "authority and subject key identifier mismatch",
    /// Issuer cannot sign certificates.
    KeyUsageNoCertSign = 32 => "key usage does not include certificate signing",
    /// A critical extension was not understood.
    UnhandledCriticalExtension = 34 => "unhandled critical extension",
    /// A non-CA certificate has CA markings.
    InvalidNonCa = 37 => "invalid non-CA certificate (has CA markings)",
    /// The application rejected the certificate.
    ApplicationVerification = 50 => "application verification failure",
    /// Host name does not match the certificate.
    HostnameMismatch = 62 => "hostname mismatch",
}

impl VerifyResult {
    /// Return true if this result means "verified".
    pub fn is_ok(self) -> bool {
        self == VerifyResult::Ok
    }
}

impl fmt::Display for VerifyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}

/// Answer to a peer verification request.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[allow(clippy::exhaustive_enums)]
pub enum Verdict {
    /// Continue the handshake.
    Accept,
    /// Abort the handshake.
    Reject,
}

impl From<bool> for Verdict {
    fn from(accept: bool) -> Self {
        if accept {
            Verdict::Accept
        } else {
            Verdict::Reject
        }
    }
}

/// A request from the engine to judge one certificate of the peer's chain.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct PeerVerification {
    /// The certificate under consideration.
    pub certificate: Certificate,
    /// The full chain presented by the peer, leaf first.
    pub chain: Vec<Certificate>,
    /// Position of `certificate` in the chain; 0 is the leaf.
    pub depth: u32,
    /// The engine's own verdict.
    pub result: VerifyResult,
}

impl PeerVerification {
    /// Construct a new verification request.
    pub fn new(
        certificate: Certificate,
        chain: Vec<Certificate>,
        depth: u32,
        result: VerifyResult,
    ) -> Self {
        PeerVerification {
            certificate,
            chain,
            depth,
            result,
        }
    }
}

/// A request from a client engine for a certificate to present.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct CertificateRequest {
    /// The host name we are connecting to.
    pub target_host: String,
    /// Certificates the application made available.
    pub local_certificates: Vec<Certificate>,
    /// The server's certificate, if already received.
    pub peer_certificate: Option<Certificate>,
    /// Issuer names the server says it will accept.  Empty means "any".
    pub acceptable_issuers: Vec<String>,
}

impl CertificateRequest {
    /// Construct a new certificate request.
    pub fn new(
        target_host: impl Into<String>,
        local_certificates: Vec<Certificate>,
        peer_certificate: Option<Certificate>,
        acceptable_issuers: Vec<String>,
    ) -> Self {
        CertificateRequest {
            target_host: target_host.into(),
            local_certificates,
            peer_certificate,
            acceptable_issuers,
        }
    }
}

/// Application hooks consulted during a handshake.
///
/// Both methods are called synchronously from within a handshake step,
/// and may take as long as they need.
pub trait CertificateCallbacks: Send + Sync {
    /// Decide whether to accept one certificate from the peer's chain.
    ///
    /// The default accepts exactly when the engine's preliminary result is
    /// [`VerifyResult::Ok`].
    fn verify_peer(&self, request: &PeerVerification) -> Verdict {
        Verdict::from(request.result.is_ok())
    }

    /// Choose a certificate (with its private key) to present to a server
    /// that asked for one.  Returning `None` sends no certificate.
    ///
    /// The default picks the first local certificate that has a private key
    /// and whose issuer the server listed as acceptable.
    fn select_local_certificate(&self, request: &CertificateRequest) -> Option<Certificate> {
        request
            .local_certificates
            .iter()
            .filter(|c| c.has_private_key())
            .find(|c| {
                request.acceptable_issuers.is_empty()
                    || request.acceptable_issuers.iter().any(|i| i == c.issuer())
            })
            .cloned()
    }
}

/// [`CertificateCallbacks`] that use the default behavior for everything.
#[derive(Clone, Copy, Debug, Default)]
#[allow(clippy::exhaustive_structs)]
pub struct DefaultCallbacks;

impl CertificateCallbacks for DefaultCallbacks {}

impl<C: CertificateCallbacks + ?Sized> CertificateCallbacks for Arc<C> {
    fn verify_peer(&self, request: &PeerVerification) -> Verdict {
        (**self).verify_peer(request)
    }

    fn select_local_certificate(&self, request: &CertificateRequest) -> Option<Certificate> {
        (**self).select_local_certificate(request)
    }
}

/// Ask `callbacks` about one certificate of the peer's chain.
pub(crate) fn verify_peer(callbacks: &dyn CertificateCallbacks, request: &PeerVerification) -> Verdict {
    if let VerifyResult::Unknown(code) = request.result {
        warn!(
            "Engine reported unrecognized verification result {} at depth {}",
            code, request.depth
        );
    }
    let verdict = callbacks.verify_peer(request);
    debug!(
        subject = request.certificate.subject(),
        depth = request.depth,
        result = %request.result,
        ?verdict,
        "Peer certificate verification"
    );
    verdict
}

/// Ask `callbacks` for a client certificate, enforcing that only
/// certificates with a private key are ever handed to the engine.
pub(crate) fn select_local_certificate(
    callbacks: &dyn CertificateCallbacks,
    role: Role,
    request: &CertificateRequest,
) -> Option<Certificate> {
    if role != Role::Client {
        warn!("Engine asked a server for a client certificate; declining");
        return None;
    }
    match callbacks.select_local_certificate(request) {
        Some(cert) if cert.has_private_key() => {
            debug!(subject = cert.subject(), "Presenting client certificate");
            Some(cert)
        }
        Some(cert) => {
            warn!(
                subject = cert.subject(),
                "Selected client certificate has no private key; sending none"
            );
            None
        }
        None => {
            debug!("No client certificate selected");
            None
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
    use std::sync::Mutex;

    fn key() -> PrivateKey {
        PrivateKey::new("ec", vec![1, 2, 3])
    }

    #[test]
    fn verify_result_codes() {
        assert_eq!(VerifyResult::from_code(0), VerifyResult::Ok);
        assert_eq!(VerifyResult::from_code(10), VerifyResult::CertHasExpired);
        assert_eq!(VerifyResult::CertRevoked.code(), 23);
        assert_eq!(VerifyResult::from_code(9999), VerifyResult::Unknown(9999));
        assert_eq!(VerifyResult::Unknown(9999).code(), 9999);
        assert!(VerifyResult::Ok.is_ok());
        assert!(!VerifyResult::Unknown(0x7fff).is_ok());
        assert_eq!(
            VerifyResult::HostnameMismatch.to_string(),
            "hostname mismatch (62)"
        );
    }

    #[test]
    #[tracing_test::traced_test]
    fn default_verification_denies_unknown() {
        let cert = Certificate::new("CN=a", "CN=a", vec![]);
        let mut req = PeerVerification::new(cert.clone(), vec![cert], 0, VerifyResult::Ok);
        assert_eq!(verify_peer(&DefaultCallbacks, &req), Verdict::Accept);
        req.result = VerifyResult::from_code(12345);
        assert_eq!(verify_peer(&DefaultCallbacks, &req), Verdict::Reject);
        assert!(logs_contain("unrecognized verification result 12345"));
        req.result = VerifyResult::CertHasExpired;
        assert_eq!(verify_peer(&DefaultCallbacks, &req), Verdict::Reject);
    }

    #[test]
    fn default_selection() {
        let no_key = Certificate::new("CN=first", "CN=ca1", vec![]);
        let wrong_issuer = Certificate::new("CN=second", "CN=ca2", vec![]).with_private_key(key());
        let good = Certificate::new("CN=third", "CN=ca1", vec![]).with_private_key(key());
        let req = CertificateRequest::new(
            "example.com",
            vec![no_key, wrong_issuer.clone(), good.clone()],
            None,
            vec!["CN=ca1".into()],
        );
        let chosen = select_local_certificate(&DefaultCallbacks, Role::Client, &req).unwrap();
        assert!(chosen.ptr_eq(&good));

        let any = CertificateRequest::new("example.com", req.local_certificates.clone(), None, vec![]);
        let chosen = select_local_certificate(&DefaultCallbacks, Role::Client, &any).unwrap();
        assert!(chosen.ptr_eq(&wrong_issuer));
    }

    /// Callbacks that always return a certificate without a key.
    struct Keyless(Mutex<usize>);

    impl CertificateCallbacks for Keyless {
        fn select_local_certificate(&self, _request: &CertificateRequest) -> Option<Certificate> {
            *self.0.lock().unwrap() += 1;
            Some(Certificate::new("CN=keyless", "CN=ca", vec![]))
        }
    }

    #[test]
    fn keyless_selection_is_dropped() {
        let cb = Keyless(Mutex::new(0));
        let req = CertificateRequest::new("h", vec![], None, vec![]);
        assert!(select_local_certificate(&cb, Role::Client, &req).is_none());
        assert_eq!(*cb.0.lock().unwrap(), 1);
        // Servers never run selection at all.
        assert!(select_local_certificate(&cb, Role::Server, &req).is_none());
        assert_eq!(*cb.0.lock().unwrap(), 1);
    }

    #[test]
    fn references_are_shared() {
        let cert = Certificate::new("CN=x", "CN=y", vec![9; 4]);
        let other = cert.clone();
        assert!(cert.ptr_eq(&other));
        let keyed = cert.with_private_key(key());
        assert!(!keyed.ptr_eq(&cert));
        assert!(keyed.has_private_key());
        assert!(!cert.has_private_key());
        assert_eq!(keyed.der(), cert.der());
        let dbg = format!("{:?}", keyed);
        assert!(dbg.contains("CN=x"));
        assert!(!dbg.contains("[1, 2, 3]"));
    }

    #[test]
    fn parse_der() {
        let der = include_bytes!("../testdata/selfsigned.der");
        let cert = Certificate::from_der(der).unwrap();
        assert!(cert.subject().contains("tls-duplex test"));
        assert!(cert.is_self_signed());
        assert_eq!(cert.der(), &der[..]);

        assert!(Certificate::from_der(b"not a certificate").is_err());
    }
}
