//! Ready-made certificates for tests.
//!
//! The mock engine only ever looks at subject and issuer names, so these
//! certificates carry no real DER and placeholder keys.

use tls_duplex::{Certificate, PrivateKey};

/// A placeholder private key.
fn key() -> PrivateKey {
    PrivateKey::new("mock", vec![0x4b; 32])
}

/// A self-signed authority named `subject`, with its key.
pub fn authority(subject: &str) -> Certificate {
    self_signed(subject)
}

/// A self-signed certificate named `subject`, with its key.
pub fn self_signed(subject: &str) -> Certificate {
    Certificate::new(subject, subject, Vec::new()).with_private_key(key())
}

/// A certificate for `subject` issued by `issuer`, with its key.
pub fn issue(subject: &str, issuer: &Certificate) -> Certificate {
    keyless(subject, issuer).with_private_key(key())
}

/// A certificate for `subject` issued by `issuer`, without a key.
pub fn keyless(subject: &str, issuer: &Certificate) -> Certificate {
    Certificate::new(subject, issuer.subject(), Vec::new())
}
