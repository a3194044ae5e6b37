use thiserror::Error;

use crate::dns::enums::Rcode;
use crate::dnssec::VerifyError;

pub type Result<T> = std::result::Result<T, ResolveError>;

/// Unified error type for the resolver core.
///
/// Every failure that can cross a module boundary is one of these variants;
/// the `rcode` mapping decides how a failure is surfaced to a client.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    // Protocol invariants broken by the remote server
    #[error("malformed response: {0}")]
    FormatError(String),
    #[error("response ID does not match the query")]
    SequenceNumberMismatch,
    #[error("response question section does not match the query")]
    QuestionMismatch,
    #[error("unexpected rdata: {0}")]
    UnexpectedRdata(String),
    #[error("message decode failed: {0}")]
    DecodeError(String),

    // Resolution impossible
    #[error("server failure: {0}")]
    ServerFailure(String),
    #[error("retry limit exceeded")]
    RetryLimitExceeded,
    #[error("query timeout expired")]
    TimeoutExpired,
    #[error("network failure: {0}")]
    NetworkFailure(String),
    #[error("illegal domain name: {0}")]
    IllegalDomain(String),
    #[error("bad configuration: {0}")]
    BadConfiguration(String),
    #[error("unknown DNS error: {0}")]
    UnknownDnsError(String),

    // Definitive answers from the authority
    #[error("name does not exist")]
    NameError,
    #[error("query kind not implemented by the server")]
    NotImplemented,
    #[error("operation refused by the server")]
    OperationRefused,
    #[error("bad EDNS OPT record")]
    BadOptRecord,

    // DNSSEC chain failures (always surfaced with AD=0)
    #[error("DNSSEC validation failed: {0}")]
    Verify(#[from] VerifyError),
}

impl ResolveError {
    /// RCODE surfaced to the client for this failure.
    pub fn rcode(&self) -> Rcode {
        match self {
            ResolveError::FormatError(_)
            | ResolveError::SequenceNumberMismatch
            | ResolveError::QuestionMismatch
            | ResolveError::UnexpectedRdata(_)
            | ResolveError::DecodeError(_) => Rcode::FormErr,
            ResolveError::ServerFailure(_)
            | ResolveError::RetryLimitExceeded
            | ResolveError::TimeoutExpired
            | ResolveError::NetworkFailure(_)
            | ResolveError::IllegalDomain(_)
            | ResolveError::BadConfiguration(_)
            | ResolveError::UnknownDnsError(_)
            | ResolveError::Verify(_) => Rcode::ServFail,
            ResolveError::NameError => Rcode::NXDomain,
            ResolveError::NotImplemented => Rcode::NotImp,
            ResolveError::OperationRefused => Rcode::Refused,
            ResolveError::BadOptRecord => Rcode::BadVers,
        }
    }
}

impl From<std::io::Error> for ResolveError {
    fn from(err: std::io::Error) -> Self {
        ResolveError::NetworkFailure(err.to_string())
    }
}
