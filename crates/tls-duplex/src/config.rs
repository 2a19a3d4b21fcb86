//! Configuration for streams and engines.
//!
//! Everything here is immutable once built.  Applications describe what
//! they want with [`ClientOptions`], [`ServerOptions`] and
//! [`StreamConfig`]; the stream turns the first two into an
//! [`EngineConfig`] which is handed to the [`TlsBackend`](crate::TlsBackend)
//! when the engine is created.

use derive_builder::{Builder, UninitializedFieldError};
use serde::Deserialize;
use strum::{Display, IntoStaticStr};

use crate::cert::Certificate;

/// Which end of the connection a stream plays.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
#[allow(clippy::exhaustive_enums)]
pub enum Role {
    /// We initiate the handshake.
    Client,
    /// We respond to the handshake.
    Server,
}

bitflags::bitflags! {
    /// A set of protocol versions a stream is willing to negotiate.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
    pub struct ProtocolVersions: u16 {
        /// SSL 2.0.
        const SSL2 = 1 << 0;
        /// SSL 3.0.
        const SSL3 = 1 << 1;
        /// TLS 1.0.
        const TLS1_0 = 1 << 2;
        /// TLS 1.1.
        const TLS1_1 = 1 << 3;
        /// TLS 1.2.
        const TLS1_2 = 1 << 4;
        /// TLS 1.3.
        const TLS1_3 = 1 << 5;
    }
}

impl Default for ProtocolVersions {
    fn default() -> Self {
        ProtocolVersions::TLS1_2 | ProtocolVersions::TLS1_3
    }
}

impl ProtocolVersions {
    /// Return the engine option bits that disable every version not in
    /// this set.
    pub fn disabled_options(self) -> ProtocolOptions {
        let mut opts = ProtocolOptions::empty();
        for v in ProtocolVersion::ALL {
            if !self.contains(v.flag()) {
                opts |= v.disable_option();
            }
        }
        opts
    }

    /// Return the newest version in this set, if any.
    pub fn highest(self) -> Option<ProtocolVersion> {
        ProtocolVersion::ALL
            .iter()
            .rev()
            .copied()
            .find(|v| self.contains(v.flag()))
    }
}

bitflags::bitflags! {
    /// Engine option bits that switch protocol versions off.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
    pub struct ProtocolOptions: u32 {
        /// Refuse SSL 2.0.
        const NO_SSLV2 = 0x0100_0000;
        /// Refuse SSL 3.0.
        const NO_SSLV3 = 0x0200_0000;
        /// Refuse TLS 1.0.
        const NO_TLSV1 = 0x0400_0000;
        /// Refuse TLS 1.1.
        const NO_TLSV1_1 = 0x1000_0000;
        /// Refuse TLS 1.2.
        const NO_TLSV1_2 = 0x0800_0000;
        /// Refuse TLS 1.3.
        const NO_TLSV1_3 = 0x2000_0000;
    }
}

/// A single protocol version, as negotiated.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Display, IntoStaticStr,
)]
#[non_exhaustive]
pub enum ProtocolVersion {
    /// SSL 2.0.
    #[strum(serialize = "SSLv2")]
    Ssl2,
    /// SSL 3.0.
    #[strum(serialize = "SSLv3")]
    Ssl3,
    /// TLS 1.0.
    #[strum(serialize = "TLSv1")]
    Tls1_0,
    /// TLS 1.1.
    #[strum(serialize = "TLSv1.1")]
    Tls1_1,
    /// TLS 1.2.
    #[strum(serialize = "TLSv1.2")]
    Tls1_2,
    /// TLS 1.3.
    #[strum(serialize = "TLSv1.3")]
    Tls1_3,
}

impl ProtocolVersion {
    /// Every version, oldest first.
    pub const ALL: [ProtocolVersion; 6] = [
        ProtocolVersion::Ssl2,
        ProtocolVersion::Ssl3,
        ProtocolVersion::Tls1_0,
        ProtocolVersion::Tls1_1,
        ProtocolVersion::Tls1_2,
        ProtocolVersion::Tls1_3,
    ];

    /// The [`ProtocolVersions`] bit for this version.
    pub fn flag(self) -> ProtocolVersions {
        match self {
            ProtocolVersion::Ssl2 => ProtocolVersions::SSL2,
            ProtocolVersion::Ssl3 => ProtocolVersions::SSL3,
            ProtocolVersion::Tls1_0 => ProtocolVersions::TLS1_0,
            ProtocolVersion::Tls1_1 => ProtocolVersions::TLS1_1,
            ProtocolVersion::Tls1_2 => ProtocolVersions::TLS1_2,
            ProtocolVersion::Tls1_3 => ProtocolVersions::TLS1_3,
        }
    }

    /// The [`ProtocolOptions`] bit that disables this version.
    fn disable_option(self) -> ProtocolOptions {
        match self {
            ProtocolVersion::Ssl2 => ProtocolOptions::NO_SSLV2,
            ProtocolVersion::Ssl3 => ProtocolOptions::NO_SSLV3,
            ProtocolVersion::Tls1_0 => ProtocolOptions::NO_TLSV1,
            ProtocolVersion::Tls1_1 => ProtocolOptions::NO_TLSV1_1,
            ProtocolVersion::Tls1_2 => ProtocolOptions::NO_TLSV1_2,
            ProtocolVersion::Tls1_3 => ProtocolOptions::NO_TLSV1_3,
        }
    }
}

bitflags::bitflags! {
    /// Which cipher strength classes are acceptable.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
    pub struct CipherStrength: u8 {
        /// Ciphers with keys shorter than 128 bits.
        const LOW = 1;
        /// 128-bit ciphers.
        const MEDIUM = 2;
        /// 256-bit ciphers.
        const HIGH = 4;
        /// Anything.
        const ALL = Self::LOW.bits() | Self::MEDIUM.bits() | Self::HIGH.bits();
    }
}

impl Default for CipherStrength {
    fn default() -> Self {
        CipherStrength::MEDIUM
    }
}

impl CipherStrength {
    /// Classify a cipher by its key size.
    pub fn for_bits(bits: u32) -> Self {
        match bits {
            0..128 => CipherStrength::LOW,
            128..256 => CipherStrength::MEDIUM,
            _ => CipherStrength::HIGH,
        }
    }
}

bitflags::bitflags! {
    /// How the engine should verify its peer.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
    pub struct VerifyMode: u8 {
        /// Request and verify the peer's certificate.
        const PEER = 0x01;
        /// Fail the handshake if the peer sends no certificate.
        const FAIL_IF_NO_PEER_CERT = 0x02;
        /// Only request a client certificate on the first handshake.
        const CLIENT_ONCE = 0x04;
    }
}

/// Build the engine's cipher list for a strength and protocol selection.
pub(crate) fn cipher_list(fips: bool, protocols: ProtocolVersions, strength: CipherStrength) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if fips || strength.contains(CipherStrength::HIGH) {
        parts.push("HIGH");
    }
    if fips || strength.contains(CipherStrength::MEDIUM) {
        parts.push("MEDIUM");
    }
    if !fips && strength.contains(CipherStrength::LOW) {
        parts.push("LOW");
    }
    if !protocols.contains(ProtocolVersions::SSL2) {
        parts.push("!SSLv2");
    }
    if fips {
        parts.extend(["AES", "3DES", "SHA", "!DES", "!MD5", "!IDEA", "!RC2", "!RC4"]);
    }
    parts.extend(["!ADH", "!aNULL", "!eNULL", "@STRENGTH"]);
    parts.join(":")
}

/// An error that occurred while building a configuration object.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigBuildError {
    /// A mandatory field was not present.
    #[error("Field was not provided: {field}")]
    MissingField {
        /// The name of the missing field.
        field: String,
    },
    /// A single field had a value that proved to be unusable.
    #[error("Value of {field} was incorrect: {problem}")]
    Invalid {
        /// The name of the invalid field.
        field: String,
        /// A description of the problem.
        problem: String,
    },
}

impl From<UninitializedFieldError> for ConfigBuildError {
    fn from(val: UninitializedFieldError) -> Self {
        ConfigBuildError::MissingField {
            field: val.field_name().to_string(),
        }
    }
}

impl ConfigBuildError {
    /// Shorthand for an [`Invalid`](ConfigBuildError::Invalid) error.
    fn invalid(field: &str, problem: impl Into<String>) -> Self {
        ConfigBuildError::Invalid {
            field: field.to_string(),
            problem: problem.into(),
        }
    }
}

/// Reject an empty protocol selection.
fn check_protocols(protocols: Option<&ProtocolVersions>) -> Result<(), ConfigBuildError> {
    match protocols {
        Some(p) if p.is_empty() => Err(ConfigBuildError::invalid(
            "protocols",
            "at least one protocol version must be allowed",
        )),
        _ => Ok(()),
    }
}

/// Options for authenticating as a client.
#[derive(Clone, Debug, Builder)]
#[builder(build_fn(validate = "Self::validate", error = "ConfigBuildError"))]
#[non_exhaustive]
pub struct ClientOptions {
    /// Name of the server we expect to be talking to.
    #[builder(setter(into))]
    pub(crate) host_name: String,
    /// Certificates we may present if the server asks for one.
    #[builder(default)]
    pub(crate) local_certificates: Vec<Certificate>,
    /// Certificate authorities we trust.
    #[builder(default)]
    pub(crate) trusted_authorities: Vec<Certificate>,
    /// Protocol versions we will negotiate.
    #[builder(default)]
    pub(crate) protocols: ProtocolVersions,
    /// Acceptable cipher strengths.
    #[builder(default)]
    pub(crate) strength: CipherStrength,
    /// Whether the engine should consult revocation information.
    #[builder(default)]
    pub(crate) check_revocation: bool,
    /// Restrict ciphers to FIPS-approved ones.
    #[builder(default)]
    pub(crate) fips: bool,
}

impl ClientOptions {
    /// Return a new builder.
    pub fn builder() -> ClientOptionsBuilder {
        ClientOptionsBuilder::default()
    }

    /// Name of the server we expect to be talking to.
    pub fn host_name(&self) -> &str {
        &self.host_name
    }
}

impl ClientOptionsBuilder {
    /// Check the builder for consistency.
    fn validate(&self) -> Result<(), ConfigBuildError> {
        if let Some(host) = &self.host_name {
            if host.is_empty() {
                return Err(ConfigBuildError::invalid("host_name", "must not be empty"));
            }
        }
        check_protocols(self.protocols.as_ref())
    }
}

/// Options for authenticating as a server.
#[derive(Clone, Debug, Builder)]
#[builder(build_fn(validate = "Self::validate", error = "ConfigBuildError"))]
#[non_exhaustive]
pub struct ServerOptions {
    /// The certificate we present.  Must carry its private key.
    pub(crate) certificate: Certificate,
    /// Whether clients must present a certificate.
    #[builder(default)]
    pub(crate) require_client_certificate: bool,
    /// Certificate authorities we trust for client certificates.  Their
    /// subjects are advertised to clients as acceptable issuers.
    #[builder(default)]
    pub(crate) trusted_authorities: Vec<Certificate>,
    /// Protocol versions we will negotiate.
    #[builder(default)]
    pub(crate) protocols: ProtocolVersions,
    /// Acceptable cipher strengths.
    #[builder(default)]
    pub(crate) strength: CipherStrength,
    /// Whether the engine should consult revocation information.
    #[builder(default)]
    pub(crate) check_revocation: bool,
    /// Restrict ciphers to FIPS-approved ones.
    #[builder(default)]
    pub(crate) fips: bool,
    /// Maximum depth of client certificate chains.
    #[builder(default = "10")]
    pub(crate) verify_depth: u32,
}

impl ServerOptions {
    /// Return a new builder.
    pub fn builder() -> ServerOptionsBuilder {
        ServerOptionsBuilder::default()
    }

    /// The certificate we present.
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }
}

impl ServerOptionsBuilder {
    /// Check the builder for consistency.
    fn validate(&self) -> Result<(), ConfigBuildError> {
        if let Some(cert) = &self.certificate {
            if !cert.has_private_key() {
                return Err(ConfigBuildError::invalid(
                    "certificate",
                    "server certificate has no private key",
                ));
            }
        }
        if self.verify_depth == Some(0) {
            return Err(ConfigBuildError::invalid("verify_depth", "must be at least 1"));
        }
        check_protocols(self.protocols.as_ref())
    }
}

/// Everything an engine needs to know about its role and policy.
///
/// Built by the stream from [`ClientOptions`] or [`ServerOptions`]; never
/// modified afterwards.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct EngineConfig {
    /// Which end of the handshake this engine plays.
    pub role: Role,
    /// Protocol versions the engine may negotiate.
    pub protocols: ProtocolVersions,
    /// Option bits disabling every other version.
    pub disabled: ProtocolOptions,
    /// Cipher list in the usual colon-separated syntax.
    pub cipher_list: String,
    /// Peer verification policy.
    pub verify_mode: VerifyMode,
    /// Maximum peer chain depth.
    pub verify_depth: u32,
    /// For clients: the server name we expect.
    pub host_name: Option<String>,
    /// For servers: the certificate to present.
    pub certificate: Option<Certificate>,
    /// For clients: candidates to present if asked.
    pub local_certificates: Vec<Certificate>,
    /// Authorities trusted for the peer's chain.
    pub trusted_authorities: Vec<Certificate>,
    /// For servers: issuer names advertised to clients.
    pub acceptable_issuers: Vec<String>,
    /// Whether revocation should be checked.
    pub check_revocation: bool,
}

impl EngineConfig {
    /// Engine configuration for a client.
    pub(crate) fn for_client(opts: &ClientOptions) -> Self {
        EngineConfig {
            role: Role::Client,
            protocols: opts.protocols,
            disabled: opts.protocols.disabled_options(),
            cipher_list: cipher_list(opts.fips, opts.protocols, opts.strength),
            verify_mode: VerifyMode::PEER,
            verify_depth: 10,
            host_name: Some(opts.host_name.clone()),
            certificate: None,
            local_certificates: opts.local_certificates.clone(),
            trusted_authorities: opts.trusted_authorities.clone(),
            acceptable_issuers: Vec::new(),
            check_revocation: opts.check_revocation,
        }
    }

    /// Engine configuration for a server.
    pub(crate) fn for_server(opts: &ServerOptions) -> Self {
        let verify_mode = if opts.require_client_certificate {
            VerifyMode::PEER | VerifyMode::FAIL_IF_NO_PEER_CERT
        } else {
            VerifyMode::empty()
        };
        EngineConfig {
            role: Role::Server,
            protocols: opts.protocols,
            disabled: opts.protocols.disabled_options(),
            cipher_list: cipher_list(opts.fips, opts.protocols, opts.strength),
            verify_mode,
            verify_depth: opts.verify_depth,
            host_name: None,
            certificate: Some(opts.certificate.clone()),
            local_certificates: Vec::new(),
            trusted_authorities: opts.trusted_authorities.clone(),
            acceptable_issuers: opts
                .trusted_authorities
                .iter()
                .map(|ca| ca.subject().to_string())
                .collect(),
            check_revocation: opts.check_revocation,
        }
    }
}

/// Tuning for a [`TlsStream`](crate::TlsStream).
///
/// The builder can be deserialized, so these settings can live in a
/// configuration file:
///
/// ```
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// # let text = "read_chunk_size = 4096";
/// let builder: tls_duplex::StreamConfigBuilder = toml::from_str(text)?;
/// let config = builder.build()?;
/// assert_eq!(config.read_chunk_size(), 4096);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Builder, Eq, PartialEq)]
#[builder(derive(Debug, Deserialize))]
#[builder(build_fn(validate = "Self::validate", error = "ConfigBuildError"))]
#[non_exhaustive]
pub struct StreamConfig {
    /// Largest number of bytes to request from the transport at once.
    #[builder(default = "16384")]
    pub(crate) read_chunk_size: usize,
    /// How many consecutive pump iterations may pass without moving a
    /// byte before the stream gives up.
    #[builder(default = "64")]
    pub(crate) stall_limit: u32,
    /// Whether to answer the peer's closure alert with our own.
    #[builder(default = "true")]
    pub(crate) reply_to_close_notify: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            read_chunk_size: 16384,
            stall_limit: 64,
            reply_to_close_notify: true,
        }
    }
}

impl StreamConfig {
    /// Return a new builder.
    pub fn builder() -> StreamConfigBuilder {
        StreamConfigBuilder::default()
    }

    /// Largest number of bytes to request from the transport at once.
    pub fn read_chunk_size(&self) -> usize {
        self.read_chunk_size
    }

    /// Permitted consecutive idle pump iterations.
    pub fn stall_limit(&self) -> u32 {
        self.stall_limit
    }

    /// Whether the peer's closure alert is answered.
    pub fn reply_to_close_notify(&self) -> bool {
        self.reply_to_close_notify
    }
}

impl StreamConfigBuilder {
    /// Check the builder for consistency.
    fn validate(&self) -> Result<(), ConfigBuildError> {
        if self.read_chunk_size == Some(0) {
            return Err(ConfigBuildError::invalid("read_chunk_size", "must be positive"));
        }
        if self.stall_limit == Some(0) {
            return Err(ConfigBuildError::invalid("stall_limit", "must be positive"));
        }
        Ok(())
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
    use crate::cert::PrivateKey;
    use assert_matches::assert_matches;

    #[test]
    fn cipher_strings() {
        assert_eq!(
            cipher_list(false, ProtocolVersions::default(), CipherStrength::MEDIUM),
            "MEDIUM:!SSLv2:!ADH:!aNULL:!eNULL:@STRENGTH"
        );
        assert_eq!(
            cipher_list(false, ProtocolVersions::all(), CipherStrength::ALL),
            "HIGH:MEDIUM:LOW:!ADH:!aNULL:!eNULL:@STRENGTH"
        );
        assert_eq!(
            cipher_list(true, ProtocolVersions::TLS1_2, CipherStrength::LOW),
            "HIGH:MEDIUM:!SSLv2:AES:3DES:SHA:!DES:!MD5:!IDEA:!RC2:!RC4:!ADH:!aNULL:!eNULL:@STRENGTH"
        );
    }

    #[test]
    fn protocol_masks() {
        let p = ProtocolVersions::TLS1_2 | ProtocolVersions::TLS1_3;
        let off = p.disabled_options();
        assert!(off.contains(ProtocolOptions::NO_SSLV2 | ProtocolOptions::NO_SSLV3));
        assert!(off.contains(ProtocolOptions::NO_TLSV1 | ProtocolOptions::NO_TLSV1_1));
        assert!(!off.intersects(ProtocolOptions::NO_TLSV1_2 | ProtocolOptions::NO_TLSV1_3));
        assert_eq!(p.highest(), Some(ProtocolVersion::Tls1_3));
        assert_eq!(ProtocolVersions::empty().highest(), None);
        assert_eq!(ProtocolVersion::Tls1_2.to_string(), "TLSv1.2");
    }

    #[test]
    fn strength_classes() {
        assert_eq!(CipherStrength::for_bits(56), CipherStrength::LOW);
        assert_eq!(CipherStrength::for_bits(128), CipherStrength::MEDIUM);
        assert_eq!(CipherStrength::for_bits(256), CipherStrength::HIGH);
    }

    #[test]
    fn client_options() {
        let err = ClientOptions::builder().build().unwrap_err();
        assert_matches!(err, ConfigBuildError::MissingField { field } if field == "host_name");

        let err = ClientOptions::builder().host_name("").build().unwrap_err();
        assert_matches!(err, ConfigBuildError::Invalid { .. });

        let err = ClientOptions::builder()
            .host_name("example.com")
            .protocols(ProtocolVersions::empty())
            .build()
            .unwrap_err();
        assert_matches!(err, ConfigBuildError::Invalid { field, .. } if field == "protocols");

        let opts = ClientOptions::builder()
            .host_name("example.com")
            .fips(true)
            .build()
            .unwrap();
        let cfg = EngineConfig::for_client(&opts);
        assert_eq!(cfg.role, Role::Client);
        assert_eq!(cfg.host_name.as_deref(), Some("example.com"));
        assert_eq!(cfg.verify_mode, VerifyMode::PEER);
        assert!(cfg.cipher_list.starts_with("HIGH:MEDIUM:"));
    }

    #[test]
    fn server_options() {
        let bare = Certificate::new("CN=server", "CN=ca", vec![]);
        let err = ServerOptions::builder()
            .certificate(bare.clone())
            .build()
            .unwrap_err();
        assert_matches!(err, ConfigBuildError::Invalid { field, .. } if field == "certificate");

        let keyed = bare.with_private_key(PrivateKey::new("ec", vec![7]));
        let ca = Certificate::new("CN=ca", "CN=ca", vec![]);
        let opts = ServerOptions::builder()
            .certificate(keyed)
            .require_client_certificate(true)
            .trusted_authorities(vec![ca])
            .build()
            .unwrap();
        let cfg = EngineConfig::for_server(&opts);
        assert_eq!(cfg.verify_mode, VerifyMode::PEER | VerifyMode::FAIL_IF_NO_PEER_CERT);
        assert_eq!(cfg.verify_depth, 10);
        assert_eq!(cfg.acceptable_issuers, vec!["CN=ca".to_string()]);
        assert!(cfg.certificate.is_some());
    }

    #[test]
    fn stream_config() {
        assert_eq!(StreamConfig::builder().build().unwrap(), StreamConfig::default());

        let b: StreamConfigBuilder =
            toml::from_str("read_chunk_size = 512\nreply_to_close_notify = false\n").unwrap();
        let cfg = b.build().unwrap();
        assert_eq!(cfg.read_chunk_size(), 512);
        assert_eq!(cfg.stall_limit(), 64);
        assert!(!cfg.reply_to_close_notify());

        let b: StreamConfigBuilder = toml::from_str("stall_limit = 0").unwrap();
        assert_matches!(b.build(), Err(ConfigBuildError::Invalid { .. }));
    }
}
