//! The mock engine's record format.
//!
//! Every record is a one-byte kind, a big-endian `u16` payload length,
//! and the payload.  Strings inside payloads are `u16`-length-prefixed
//! UTF-8.  Application data is "encrypted" by XOR with a fixed byte, which
//! is enough to make sure nobody confuses ciphertext with plaintext.

use tls_duplex::{BytePipe, ProtocolVersion, ProtocolVersions};

/// Length of a record header.
pub const HEADER_LEN: usize = 3;

/// Largest payload a record may carry.
pub const MAX_PAYLOAD: usize = 16384;

/// Key for the application data "cipher".
const XOR_KEY: u8 = 0x5A;

/// The type of a record.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[allow(clippy::exhaustive_enums)]
#[repr(u8)]
pub enum RecordKind {
    /// Client's opening handshake message.
    ClientHello = 1,
    /// Server's answer, with its certificate.
    ServerHello = 2,
    /// Client certificate, sent when the server asked for one.
    Certificate = 3,
    /// End of a handshake.
    Finished = 4,
    /// Encrypted application data.
    AppData = 5,
    /// A fatal alert.
    Alert = 6,
    /// Server's request that the client start a new handshake.
    HelloRequest = 7,
    /// Closure alert.
    CloseNotify = 8,
}

impl RecordKind {
    /// Decode a kind byte.
    fn from_u8(b: u8) -> Option<Self> {
        use RecordKind as K;
        Some(match b {
            1 => K::ClientHello,
            2 => K::ServerHello,
            3 => K::Certificate,
            4 => K::Finished,
            5 => K::AppData,
            6 => K::Alert,
            7 => K::HelloRequest,
            8 => K::CloseNotify,
            _ => return None,
        })
    }
}

/// Encode a complete record.
///
/// # Panics
///
/// Panics if `payload` is longer than [`MAX_PAYLOAD`].
pub fn encode_record(kind: RecordKind, payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() <= MAX_PAYLOAD, "record payload too long");
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.push(kind as u8);
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Encode an alert record.
pub fn alert_record(alert: u8) -> Vec<u8> {
    encode_record(RecordKind::Alert, &[alert])
}

/// Encode an application data record carrying `plaintext`.
pub fn app_data_record(plaintext: &[u8]) -> Vec<u8> {
    let mut body = plaintext.to_vec();
    xor(&mut body);
    encode_record(RecordKind::AppData, &body)
}

/// Apply (or remove) the application data "cipher".
pub(crate) fn xor(bytes: &mut [u8]) {
    for b in bytes {
        *b ^= XOR_KEY;
    }
}

/// Append a record to `pipe`.
pub(crate) fn write_record(pipe: &mut BytePipe, kind: RecordKind, payload: &[u8]) {
    pipe.write(&encode_record(kind, payload));
}

/// What was found at the head of a read pipe.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum Incoming {
    /// Not enough bytes for a whole record yet.
    Partial,
    /// A complete record, now removed from the pipe.
    Record(RecordKind, Vec<u8>),
    /// The header makes no sense.
    Malformed,
}

/// Take the next complete record from `pipe`, if there is one.
pub(crate) fn next_record(pipe: &mut BytePipe) -> Incoming {
    let mut header = [0_u8; HEADER_LEN];
    if pipe.peek(&mut header) < HEADER_LEN {
        return Incoming::Partial;
    }
    let Some(kind) = RecordKind::from_u8(header[0]) else {
        return Incoming::Malformed;
    };
    let len = usize::from(u16::from_be_bytes([header[1], header[2]]));
    if len > MAX_PAYLOAD {
        return Incoming::Malformed;
    }
    if pipe.pending() < HEADER_LEN + len {
        return Incoming::Partial;
    }
    let mut record = pipe.read_vec(HEADER_LEN + len);
    record.drain(..HEADER_LEN);
    Incoming::Record(kind, record)
}

/// Append a length-prefixed string.
fn put_str(out: &mut Vec<u8>, s: &str) {
    let bytes = &s.as_bytes()[..s.len().min(usize::from(u16::MAX))];
    out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    out.extend_from_slice(bytes);
}

/// A cursor over a record payload.
struct Fields<'a> {
    /// Bytes not yet consumed.
    rest: &'a [u8],
}

impl<'a> Fields<'a> {
    /// Start reading `data`.
    fn new(data: &'a [u8]) -> Self {
        Fields { rest: data }
    }

    /// Take `n` bytes.
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.rest.len() < n {
            return None;
        }
        let (head, tail) = self.rest.split_at(n);
        self.rest = tail;
        Some(head)
    }

    /// Take one byte.
    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    /// Take a big-endian `u16`.
    fn u16(&mut self) -> Option<u16> {
        self.take(2).map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    /// Take a length-prefixed string.
    fn string(&mut self) -> Option<String> {
        let len = self.u16()?;
        let bytes = self.take(usize::from(len))?;
        String::from_utf8(bytes.to_vec()).ok()
    }

    /// Succeed only if everything was consumed.
    fn finish(self) -> Option<()> {
        self.rest.is_empty().then_some(())
    }
}

/// Body of a [`RecordKind::ClientHello`].
#[derive(Clone, Debug, Eq, PartialEq)]
#[allow(clippy::exhaustive_structs)]
pub struct ClientHello {
    /// Versions the client will accept.
    pub versions: ProtocolVersions,
    /// Server name the client expects.
    pub host: String,
}

impl ClientHello {
    /// Encode as a payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.versions.bits().to_be_bytes().to_vec();
        put_str(&mut out, &self.host);
        out
    }

    /// Encode as a complete record.
    pub fn to_record(&self) -> Vec<u8> {
        encode_record(RecordKind::ClientHello, &self.encode())
    }

    /// Decode a payload.
    pub(crate) fn decode(payload: &[u8]) -> Option<Self> {
        let mut f = Fields::new(payload);
        let versions = ProtocolVersions::from_bits_truncate(f.u16()?);
        let host = f.string()?;
        f.finish()?;
        Some(ClientHello { versions, host })
    }
}

/// Body of a [`RecordKind::ServerHello`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct ServerHello {
    /// The version chosen by the server.
    pub(crate) version: ProtocolVersion,
    /// Whether the client must answer with a certificate record.
    pub(crate) request_certificate: bool,
    /// Server certificate subject.
    pub(crate) subject: String,
    /// Server certificate issuer.
    pub(crate) issuer: String,
    /// Issuers the server accepts for client certificates.
    pub(crate) acceptable_issuers: Vec<String>,
}

impl ServerHello {
    /// Encode as a payload.
    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut out = self.version.flag().bits().to_be_bytes().to_vec();
        out.push(u8::from(self.request_certificate));
        put_str(&mut out, &self.subject);
        put_str(&mut out, &self.issuer);
        out.push(self.acceptable_issuers.len().min(255) as u8);
        for issuer in self.acceptable_issuers.iter().take(255) {
            put_str(&mut out, issuer);
        }
        out
    }

    /// Decode a payload.
    pub(crate) fn decode(payload: &[u8]) -> Option<Self> {
        let mut f = Fields::new(payload);
        let bits = f.u16()?;
        let version = ProtocolVersion::ALL
            .iter()
            .copied()
            .find(|v| v.flag().bits() == bits)?;
        let request_certificate = f.u8()? != 0;
        let subject = f.string()?;
        let issuer = f.string()?;
        let n = f.u8()?;
        let acceptable_issuers = (0..n).map(|_| f.string()).collect::<Option<Vec<_>>>()?;
        f.finish()?;
        Some(ServerHello {
            version,
            request_certificate,
            subject,
            issuer,
            acceptable_issuers,
        })
    }
}

/// Encode a client certificate payload: subject and issuer, or nothing.
pub(crate) fn encode_certificate(names: Option<(&str, &str)>) -> Vec<u8> {
    let mut out = Vec::new();
    match names {
        Some((subject, issuer)) => {
            out.push(1);
            put_str(&mut out, subject);
            put_str(&mut out, issuer);
        }
        None => out.push(0),
    }
    out
}

/// Decode a client certificate payload.  The outer `Option` is `None` if
/// the payload is malformed.
pub(crate) fn decode_certificate(payload: &[u8]) -> Option<Option<(String, String)>> {
    let mut f = Fields::new(payload);
    let names = match f.u8()? {
        0 => None,
        _ => Some((f.string()?, f.string()?)),
    };
    f.finish()?;
    Some(names)
}
