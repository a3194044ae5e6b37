use thiserror::Error;

use crate::dns::name::Name;

/// Failures of the DS → DNSKEY → RRSIG verification pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("unsupported DNSSEC algorithm {0}")]
    UnsupportedAlgorithm(u8),
    #[error("unsupported DS digest type {0}")]
    UnsupportedDigestType(u8),
    #[error("signature verification failed")]
    BadSignature,
    #[error("signature has expired")]
    SignatureExpired,
    #[error("signature is not yet valid")]
    SignatureNotYetValid,
    #[error("DS digest does not match the DNSKEY")]
    DsDigestMismatch,
    #[error("malformed public key")]
    BadPublicKey,
    #[error("no DNSKEY matches the DS set for {0}")]
    NoSepDnskey(Name),
    #[error("DS exists but the DNSKEY chain below it cannot be validated for {0}")]
    DanglingDs(Name),
    #[error("no records form the requested RRset")]
    EmptyRrset,
    #[error("malformed RRset: {0}")]
    BadRrset(String),
}
