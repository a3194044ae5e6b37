pub mod algorithm;
pub mod digest;
pub mod errors;
pub mod key_tag;
pub mod trust_anchor;
pub mod verify;

pub use algorithm::Algorithm;
pub use digest::DigestType;
pub use errors::VerifyError;
pub use key_tag::key_tag;
pub use trust_anchor::{TrustAnchor, TrustAnchorSet};
pub use verify::{RrsetVerdict, select_sep_dnskeys, verify_ds, verify_rrset, verify_rrsig};
