//! Parameters of a negotiated session.

use crate::cert::Certificate;
use crate::config::{CipherStrength, ProtocolVersion};

/// Bulk encryption algorithm of a cipher suite.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, strum::Display)]
#[non_exhaustive]
pub enum CipherAlgorithm {
    /// No encryption.
    None,
    /// DES.
    Des,
    /// Triple DES.
    TripleDes,
    /// RC2.
    Rc2,
    /// RC4.
    Rc4,
    /// IDEA.
    Idea,
    /// AES with a 128-bit key.
    Aes128,
    /// AES with a 256-bit key.
    Aes256,
    /// Camellia.
    Camellia,
    /// ChaCha20.
    ChaCha20,
    /// Something the engine did not classify.
    Other,
}

/// Message authentication hash of a cipher suite.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, strum::Display)]
#[non_exhaustive]
pub enum HashAlgorithm {
    /// No hash (AEAD suites with no separate MAC).
    None,
    /// MD5.
    Md5,
    /// SHA-1.
    Sha1,
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// Something the engine did not classify.
    Other,
}

impl HashAlgorithm {
    /// Output size in bits, or 0 if unknown.
    pub fn bits(self) -> u32 {
        match self {
            HashAlgorithm::Md5 => 128,
            HashAlgorithm::Sha1 => 160,
            HashAlgorithm::Sha256 => 256,
            HashAlgorithm::Sha384 => 384,
            HashAlgorithm::None | HashAlgorithm::Other => 0,
        }
    }
}

/// Key exchange method of a cipher suite.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, strum::Display)]
#[non_exhaustive]
pub enum KeyExchangeAlgorithm {
    /// No key exchange.
    None,
    /// RSA key transport.
    Rsa,
    /// Finite-field Diffie-Hellman.
    DiffieHellman,
    /// Elliptic-curve Diffie-Hellman.
    EcDiffieHellman,
    /// Something the engine did not classify.
    Other,
}

/// A negotiated cipher suite.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct CipherDescription {
    /// The engine's name for the cipher suite.
    pub name: String,
    /// Effective symmetric key size.
    pub bits: u32,
    /// Bulk encryption algorithm.
    pub algorithm: CipherAlgorithm,
    /// MAC hash.
    pub hash: HashAlgorithm,
    /// Key exchange method.
    pub key_exchange: KeyExchangeAlgorithm,
    /// Strength of the key exchange, in bits.
    pub key_exchange_bits: u32,
}

impl CipherDescription {
    /// Construct a new description.  The algorithms start out as
    /// `Other`; use the `with_` methods to fill them in.
    pub fn new(name: impl Into<String>, bits: u32) -> Self {
        CipherDescription {
            name: name.into(),
            bits,
            algorithm: CipherAlgorithm::Other,
            hash: HashAlgorithm::Other,
            key_exchange: KeyExchangeAlgorithm::Other,
            key_exchange_bits: 0,
        }
    }

    /// Set the bulk encryption algorithm.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: CipherAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the MAC hash.
    #[must_use]
    pub fn with_hash(mut self, hash: HashAlgorithm) -> Self {
        self.hash = hash;
        self
    }

    /// Set the key exchange method and its strength.
    #[must_use]
    pub fn with_key_exchange(mut self, key_exchange: KeyExchangeAlgorithm, bits: u32) -> Self {
        self.key_exchange = key_exchange;
        self.key_exchange_bits = bits;
        self
    }

    /// Strength class of this cipher.
    pub fn strength(&self) -> CipherStrength {
        CipherStrength::for_bits(self.bits)
    }

    /// Strength of the MAC hash, in bits.
    pub fn hash_strength(&self) -> u32 {
        self.hash.bits()
    }
}

/// What a completed handshake agreed on.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct SessionInfo {
    /// Protocol version in use.
    pub protocol: ProtocolVersion,
    /// Cipher suite in use.
    pub cipher: CipherDescription,
    /// The certificate the peer presented, if any.
    pub peer_certificate: Option<Certificate>,
    /// The certificate we presented, if any.
    pub local_certificate: Option<Certificate>,
}

impl SessionInfo {
    /// Construct a new session description.
    pub fn new(
        protocol: ProtocolVersion,
        cipher: CipherDescription,
        peer_certificate: Option<Certificate>,
        local_certificate: Option<Certificate>,
    ) -> Self {
        SessionInfo {
            protocol,
            cipher,
            peer_certificate,
            local_certificate,
        }
    }

    /// Return true if both sides presented certificates.
    pub fn is_mutually_authenticated(&self) -> bool {
        self.peer_certificate.is_some() && self.local_certificate.is_some()
    }
}

/// Ciphertext byte counts for a stream.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct TrafficStats {
    /// Bytes handed to the transport.
    pub sent: u64,
    /// Bytes received from the transport.
    pub received: u64,
}
