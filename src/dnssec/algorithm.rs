use std::fmt;

use ring::signature;

/// The DNSSEC signing algorithms this resolver can verify (RFC 8624 §3.1),
/// plus the identifiers it must at least recognize on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    RsaSha1,
    RsaSha1Nsec3,
    RsaSha256,
    RsaSha512,
    EcdsaP256Sha256,
    EcdsaP384Sha384,
    Ed25519,
    Ed448,
}

/// How a signature of a given algorithm is checked: RSA keys carry RFC 3110
/// component encoding and go through ring's RSA parameter interface, the
/// rest verify as raw public keys.
pub enum Verifier {
    Rsa(&'static signature::RsaParameters),
    Raw(&'static dyn signature::VerificationAlgorithm),
}

impl Algorithm {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            5 => Some(Self::RsaSha1),
            7 => Some(Self::RsaSha1Nsec3),
            8 => Some(Self::RsaSha256),
            10 => Some(Self::RsaSha512),
            13 => Some(Self::EcdsaP256Sha256),
            14 => Some(Self::EcdsaP384Sha384),
            15 => Some(Self::Ed25519),
            16 => Some(Self::Ed448),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::RsaSha1 => 5,
            Self::RsaSha1Nsec3 => 7,
            Self::RsaSha256 => 8,
            Self::RsaSha512 => 10,
            Self::EcdsaP256Sha256 => 13,
            Self::EcdsaP384Sha384 => 14,
            Self::Ed25519 => 15,
            Self::Ed448 => 16,
        }
    }

    /// The ring verifier for this algorithm, or `None` where ring offers no
    /// implementation (Ed448).
    ///
    /// DNSSEC ECDSA signatures are fixed-width r||s (RFC 6605 §4), so the
    /// `_FIXED` variants apply, not ASN.1.
    pub fn verifier(&self) -> Option<Verifier> {
        match self {
            Self::RsaSha1 | Self::RsaSha1Nsec3 => Some(Verifier::Rsa(
                &signature::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
            )),
            Self::RsaSha256 => Some(Verifier::Rsa(&signature::RSA_PKCS1_2048_8192_SHA256)),
            Self::RsaSha512 => Some(Verifier::Rsa(&signature::RSA_PKCS1_2048_8192_SHA512)),
            Self::EcdsaP256Sha256 => Some(Verifier::Raw(&signature::ECDSA_P256_SHA256_FIXED)),
            Self::EcdsaP384Sha384 => Some(Verifier::Raw(&signature::ECDSA_P384_SHA384_FIXED)),
            Self::Ed25519 => Some(Verifier::Raw(&signature::ED25519)),
            Self::Ed448 => None,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RsaSha1 => write!(f, "RSASHA1"),
            Self::RsaSha1Nsec3 => write!(f, "RSASHA1-NSEC3-SHA1"),
            Self::RsaSha256 => write!(f, "RSASHA256"),
            Self::RsaSha512 => write!(f, "RSASHA512"),
            Self::EcdsaP256Sha256 => write!(f, "ECDSAP256SHA256"),
            Self::EcdsaP384Sha384 => write!(f, "ECDSAP384SHA384"),
            Self::Ed25519 => write!(f, "ED25519"),
            Self::Ed448 => write!(f, "ED448"),
        }
    }
}
