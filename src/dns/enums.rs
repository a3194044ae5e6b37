use std::fmt;

/// Pseudo-type used as the cache-key type coordinate for negative entries
/// that represent rcode-level failures not tied to a real qtype. Drawn from
/// the RFC 6895 §3.1 private-use range.
pub const ERR_TYPE_VALUE: u16 = 0xFF00;

/// Resource record types the core understands, plus an opaque escape hatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordType {
    A,
    NS,
    CNAME,
    SOA,
    PTR,
    TXT,
    AAAA,
    OPT,
    DS,
    RRSIG,
    NSEC,
    DNSKEY,
    /// Failure sentinel for negative cache entries with no qtype.
    ERR,
    Unknown(u16),
}

impl RecordType {
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => Self::A,
            2 => Self::NS,
            5 => Self::CNAME,
            6 => Self::SOA,
            12 => Self::PTR,
            16 => Self::TXT,
            28 => Self::AAAA,
            41 => Self::OPT,
            43 => Self::DS,
            46 => Self::RRSIG,
            47 => Self::NSEC,
            48 => Self::DNSKEY,
            ERR_TYPE_VALUE => Self::ERR,
            other => Self::Unknown(other),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            Self::A => 1,
            Self::NS => 2,
            Self::CNAME => 5,
            Self::SOA => 6,
            Self::PTR => 12,
            Self::TXT => 16,
            Self::AAAA => 28,
            Self::OPT => 41,
            Self::DS => 43,
            Self::RRSIG => 46,
            Self::NSEC => 47,
            Self::DNSKEY => 48,
            Self::ERR => ERR_TYPE_VALUE,
            Self::Unknown(v) => v,
        }
    }

    /// Parse the presentation-format mnemonic, for the CLI and config.
    pub fn from_mnemonic(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Some(Self::A),
            "NS" => Some(Self::NS),
            "CNAME" => Some(Self::CNAME),
            "SOA" => Some(Self::SOA),
            "PTR" => Some(Self::PTR),
            "TXT" => Some(Self::TXT),
            "AAAA" => Some(Self::AAAA),
            "DS" => Some(Self::DS),
            "RRSIG" => Some(Self::RRSIG),
            "NSEC" => Some(Self::NSEC),
            "DNSKEY" => Some(Self::DNSKEY),
            _ => None,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(v) => write!(f, "TYPE{v}"),
            Self::ERR => write!(f, "TYPE{ERR_TYPE_VALUE}"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Resource record classes. Everything except IN is carried opaquely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordClass {
    IN,
    CH,
    HS,
    Unknown(u16),
}

impl RecordClass {
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => Self::IN,
            3 => Self::CH,
            4 => Self::HS,
            other => Self::Unknown(other),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            Self::IN => 1,
            Self::CH => 3,
            Self::HS => 4,
            Self::Unknown(v) => v,
        }
    }
}

impl fmt::Display for RecordClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IN => write!(f, "IN"),
            Self::CH => write!(f, "CH"),
            Self::HS => write!(f, "HS"),
            Self::Unknown(v) => write!(f, "CLASS{v}"),
        }
    }
}

/// Response codes, including the EDNS extended BADVERS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rcode {
    NoError,
    FormErr,
    ServFail,
    NXDomain,
    NotImp,
    Refused,
    BadVers,
    Unknown(u16),
}

impl Rcode {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => Self::NoError,
            1 => Self::FormErr,
            2 => Self::ServFail,
            3 => Self::NXDomain,
            4 => Self::NotImp,
            5 => Self::Refused,
            16 => Self::BadVers,
            other => Self::Unknown(other),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            Self::NoError => 0,
            Self::FormErr => 1,
            Self::ServFail => 2,
            Self::NXDomain => 3,
            Self::NotImp => 4,
            Self::Refused => 5,
            Self::BadVers => 16,
            Self::Unknown(v) => v,
        }
    }
}

impl fmt::Display for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoError => write!(f, "NOERROR"),
            Self::FormErr => write!(f, "FORMERR"),
            Self::ServFail => write!(f, "SERVFAIL"),
            Self::NXDomain => write!(f, "NXDOMAIN"),
            Self::NotImp => write!(f, "NOTIMP"),
            Self::Refused => write!(f, "REFUSED"),
            Self::BadVers => write!(f, "BADVERS"),
            Self::Unknown(v) => write!(f, "RCODE{v}"),
        }
    }
}
