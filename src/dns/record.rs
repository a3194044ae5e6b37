use std::fmt;

use thiserror::Error;

use crate::dns::enums::{RecordClass, RecordType};
use crate::dns::name::Name;
use crate::dns::rdata::RData;

/// A single resource record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub name: Name,
    pub rtype: RecordType,
    pub class: RecordClass,
    pub ttl: u32,
    pub rdata: RData,
}

impl ResourceRecord {
    pub fn new(name: Name, class: RecordClass, ttl: u32, rdata: RData) -> Self {
        ResourceRecord {
            name,
            rtype: rdata.record_type(),
            class,
            ttl,
            rdata,
        }
    }
}

impl fmt::Display for ResourceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}",
            self.name, self.ttl, self.class, self.rtype, self.rdata
        )
    }
}

/// Why a group of records failed the RRset grouping law.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RrsetError {
    #[error("empty record group")]
    Empty,
    #[error("RRset for {0} is not Internet class")]
    NotInternetClass(Name),
    #[error("record type {declared} does not match rdata type {actual} at {owner}")]
    TypeMismatch {
        owner: Name,
        declared: RecordType,
        actual: RecordType,
    },
    #[error("records for {0} do not share one (name, type, class) key")]
    MixedKeys(Name),
}

/// A validated RRset: all members share one (name, type, class), the class
/// is Internet, every rdata matches the declared type, and the set is
/// non-empty. The TTL is the minimum over the members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRrset {
    name: Name,
    rtype: RecordType,
    class: RecordClass,
    ttl: u32,
    rdatas: Vec<RData>,
}

impl CanonicalRrset {
    /// Apply the grouping law to a list of records that should form one
    /// RRset.
    pub fn from_records(records: &[ResourceRecord]) -> Result<Self, RrsetError> {
        let first = records.first().ok_or(RrsetError::Empty)?;
        if first.class != RecordClass::IN {
            return Err(RrsetError::NotInternetClass(first.name.clone()));
        }
        let mut ttl = u32::MAX;
        let mut rdatas = Vec::with_capacity(records.len());
        for record in records {
            if record.name != first.name
                || record.rtype != first.rtype
                || record.class != first.class
            {
                return Err(RrsetError::MixedKeys(first.name.clone()));
            }
            if record.rdata.record_type() != record.rtype {
                return Err(RrsetError::TypeMismatch {
                    owner: record.name.clone(),
                    declared: record.rtype,
                    actual: record.rdata.record_type(),
                });
            }
            ttl = ttl.min(record.ttl);
            rdatas.push(record.rdata.clone());
        }
        Ok(CanonicalRrset {
            name: first.name.clone(),
            rtype: first.rtype,
            class: first.class,
            ttl,
            rdatas,
        })
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn rtype(&self) -> RecordType {
        self.rtype
    }

    pub fn class(&self) -> RecordClass {
        self.class
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    pub fn rdatas(&self) -> &[RData] {
        &self.rdatas
    }

    pub fn into_rdatas(self) -> Vec<RData> {
        self.rdatas
    }

    /// Materialize the RRset back into records, all carrying the set TTL.
    pub fn records(&self) -> Vec<ResourceRecord> {
        self.rdatas
            .iter()
            .map(|rdata| ResourceRecord {
                name: self.name.clone(),
                rtype: self.rtype,
                class: self.class,
                ttl: self.ttl,
                rdata: rdata.clone(),
            })
            .collect()
    }
}

/// Group records by (name, type, class) in first-seen order and validate
/// each group. RRSIG records are excluded: they ride along with the RRset
/// they cover and never form a cacheable set of their own here.
pub fn group_rrsets(records: &[ResourceRecord]) -> Vec<Result<CanonicalRrset, RrsetError>> {
    let mut order: Vec<(Name, RecordType, RecordClass)> = Vec::new();
    let mut groups: Vec<Vec<ResourceRecord>> = Vec::new();
    for record in records {
        if record.rtype == RecordType::RRSIG || record.rtype == RecordType::OPT {
            continue;
        }
        let key = (record.name.clone(), record.rtype, record.class);
        match order.iter().position(|k| *k == key) {
            Some(index) => groups[index].push(record.clone()),
            None => {
                order.push(key);
                groups.push(vec![record.clone()]);
            }
        }
    }
    groups
        .iter()
        .map(|group| CanonicalRrset::from_records(group))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn a_record(owner: &str, ttl: u32, addr: [u8; 4]) -> ResourceRecord {
        ResourceRecord::new(
            Name::parse(owner).unwrap(),
            RecordClass::IN,
            ttl,
            RData::A(Ipv4Addr::new(addr[0], addr[1], addr[2], addr[3])),
        )
    }

    #[test]
    fn rrset_ttl_is_the_member_minimum() {
        let rrs = vec![
            a_record("host.example.com", 300, [192, 0, 2, 1]),
            a_record("host.example.com", 60, [192, 0, 2, 2]),
        ];
        let rrset = CanonicalRrset::from_records(&rrs).unwrap();
        assert_eq!(rrset.ttl(), 60);
        assert_eq!(rrset.rdatas().len(), 2);
    }

    #[test]
    fn rrset_rejects_mixed_owners() {
        let rrs = vec![
            a_record("a.example.com", 300, [192, 0, 2, 1]),
            a_record("b.example.com", 300, [192, 0, 2, 2]),
        ];
        assert!(matches!(
            CanonicalRrset::from_records(&rrs),
            Err(RrsetError::MixedKeys(_))
        ));
    }

    #[test]
    fn rrset_rejects_type_rdata_mismatch() {
        let mut record = a_record("host.example.com", 300, [192, 0, 2, 1]);
        record.rtype = RecordType::TXT;
        assert!(matches!(
            CanonicalRrset::from_records(&[record]),
            Err(RrsetError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn rrset_rejects_chaos_class() {
        let mut record = a_record("host.example.com", 300, [192, 0, 2, 1]);
        record.class = RecordClass::CH;
        assert!(matches!(
            CanonicalRrset::from_records(&[record]),
            Err(RrsetError::NotInternetClass(_))
        ));
    }

    #[test]
    fn grouping_and_materializing_round_trips() {
        let rrs = vec![
            a_record("a.example.com", 120, [192, 0, 2, 1]),
            a_record("b.example.com", 300, [192, 0, 2, 2]),
            a_record("a.example.com", 120, [192, 0, 2, 3]),
        ];
        let groups: Vec<CanonicalRrset> = group_rrsets(&rrs)
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(groups.len(), 2);

        let materialized: Vec<ResourceRecord> =
            groups.iter().flat_map(|g| g.records()).collect();
        let regrouped: Vec<CanonicalRrset> = group_rrsets(&materialized)
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(groups, regrouped);
    }
}
