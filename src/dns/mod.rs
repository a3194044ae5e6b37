pub mod enums;
pub mod message;
pub mod name;
pub mod rdata;
pub mod record;
pub mod wire;

pub use enums::{Rcode, RecordClass, RecordType};
pub use message::{Edns, Header, Message, Question, Section};
pub use name::Name;
pub use rdata::{Ds, Dnskey, RData, Rrsig, Soa};
pub use record::{CanonicalRrset, ResourceRecord, RrsetError};
