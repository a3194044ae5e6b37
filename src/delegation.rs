use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use rand::Rng;
use rand::seq::SliceRandom;
use smallvec::SmallVec;

use crate::dns::enums::RecordType;
use crate::dns::name::Name;
use crate::dns::rdata::{Dnskey, Ds, RData};
use crate::dns::record::ResourceRecord;

/// One name server of a zone cut, with whatever glue the referral carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NsEntry {
    /// NS name with no glue; the address must be resolved separately.
    OnlyName(Name),
    V4(Name, Vec<Ipv4Addr>),
    V6(Name, Vec<Ipv6Addr>),
    Dual(Name, Vec<Ipv4Addr>, Vec<Ipv6Addr>),
}

impl NsEntry {
    pub fn name(&self) -> &Name {
        match self {
            NsEntry::OnlyName(name)
            | NsEntry::V4(name, _)
            | NsEntry::V6(name, _)
            | NsEntry::Dual(name, _, _) => name,
        }
    }
}

/// Why a delegation's DS state is still unresolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingReason {
    /// An ordinary referral; the DS set has not been fetched yet.
    Referral,
    /// The referral came from a server also serving the child zone, so the
    /// DS set was never seen and must be fetched from the parent.
    ServesChildZone,
    /// The delegation was rebuilt from cache without a cached DS RRset.
    CacheMiss,
}

/// DS disposition of a zone cut.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DsState {
    /// DS records from the parent; an empty list is a provably-insecure
    /// delegation, not an unknown one.
    Filled(Vec<Ds>),
    /// This zone is a configured trust anchor.
    Anchor,
    /// Not yet resolved; must be filled before descending through it.
    Pending(PendingReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Built from a referral in this query.
    Fresh,
    /// Rebuilt from the cache or the compiled hints.
    Cached,
}

/// A zone cut: the delegated zone, its name servers with glue, the DS
/// disposition, and the validated DNSKEY set once it has been fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delegation {
    pub zone: Name,
    pub ns: Vec<NsEntry>,
    pub ds_state: DsState,
    pub dnskeys: Vec<Dnskey>,
    pub fresh: Freshness,
}

impl Delegation {
    /// Whether a secure chain runs through this cut (DS present or anchor).
    pub fn has_ds(&self) -> bool {
        match &self.ds_state {
            DsState::Filled(list) => !list.is_empty(),
            DsState::Anchor => true,
            DsState::Pending(_) => false,
        }
    }

    /// Whether the DS state still needs to be resolved before this cut can
    /// be descended through.
    pub fn ds_pending(&self) -> bool {
        matches!(self.ds_state, DsState::Pending(_))
    }

    pub fn ns_names(&self) -> impl Iterator<Item = &Name> {
        self.ns.iter().map(|entry| entry.name())
    }
}

/// A referral whose NS set and glue have been paired up, waiting for its DS
/// disposition before it becomes a usable `Delegation`.
#[derive(Debug, Clone)]
pub struct DelegationBuilder {
    zone: Name,
    ns: Vec<NsEntry>,
}

impl DelegationBuilder {
    pub fn zone(&self) -> &Name {
        &self.zone
    }

    pub fn resolve_ds(self, ds_state: DsState) -> Delegation {
        Delegation {
            zone: self.zone,
            ns: self.ns,
            ds_state,
            dnskeys: Vec::new(),
            fresh: Freshness::Fresh,
        }
    }
}

/// Pair NS names with their A/AAAA glue by merging the two sorted lists.
/// Returns `None` when the NS set is empty.
pub fn find_delegation(
    zone: &Name,
    ns_names: &[Name],
    glue: &[ResourceRecord],
) -> Option<DelegationBuilder> {
    if ns_names.is_empty() {
        return None;
    }

    let mut names: Vec<Name> = ns_names.to_vec();
    names.sort();
    names.dedup();

    // Glue grouped by owner, sorted the same way as the NS names.
    let mut glued: Vec<(Name, Vec<Ipv4Addr>, Vec<Ipv6Addr>)> = Vec::new();
    let mut sorted_glue: Vec<&ResourceRecord> = glue
        .iter()
        .filter(|rr| matches!(rr.rtype, RecordType::A | RecordType::AAAA))
        .collect();
    sorted_glue.sort_by(|a, b| a.name.cmp(&b.name));
    for rr in sorted_glue {
        if glued.last().map(|(name, _, _)| name) != Some(&rr.name) {
            glued.push((rr.name.clone(), Vec::new(), Vec::new()));
        }
        let (_, v4s, v6s) = glued.last_mut().expect("group was just pushed");
        match &rr.rdata {
            RData::A(addr) => v4s.push(*addr),
            RData::AAAA(addr) => v6s.push(*addr),
            _ => {}
        }
    }

    let mut entries = Vec::with_capacity(names.len());
    let mut glue_iter = glued.into_iter().peekable();
    for name in names {
        while glue_iter
            .peek()
            .map(|(owner, _, _)| *owner < name)
            .unwrap_or(false)
        {
            glue_iter.next();
        }
        let entry = match glue_iter.peek() {
            Some((owner, v4s, v6s)) if *owner == name => match (v4s.is_empty(), v6s.is_empty()) {
                (false, false) => NsEntry::Dual(name, v4s.clone(), v6s.clone()),
                (false, true) => NsEntry::V4(name, v4s.clone()),
                (true, false) => NsEntry::V6(name, v6s.clone()),
                (true, true) => NsEntry::OnlyName(name),
            },
            _ => NsEntry::OnlyName(name),
        };
        entries.push(entry);
    }

    Some(DelegationBuilder {
        zone: zone.clone(),
        ns: entries,
    })
}

/// The root server addresses compiled in as a last resort
/// (root-servers.net, IANA).
const ROOT_HINTS: &[(&str, &str, &str)] = &[
    ("a.root-servers.net.", "198.41.0.4", "2001:503:ba3e::2:30"),
    ("b.root-servers.net.", "199.9.14.201", "2001:500:200::b"),
    ("c.root-servers.net.", "192.33.4.12", "2001:500:2::c"),
    ("d.root-servers.net.", "199.7.91.13", "2001:500:2d::d"),
    ("e.root-servers.net.", "192.203.230.10", "2001:500:a8::e"),
    ("f.root-servers.net.", "192.5.5.241", "2001:500:2f::f"),
    ("g.root-servers.net.", "192.112.36.4", "2001:500:12::d0d"),
    ("h.root-servers.net.", "198.97.190.53", "2001:500:1::53"),
    ("i.root-servers.net.", "192.36.148.17", "2001:7fe::53"),
    ("j.root-servers.net.", "192.58.128.30", "2001:503:c27::2:30"),
    ("k.root-servers.net.", "193.0.14.129", "2001:7fd::1"),
    ("l.root-servers.net.", "199.7.83.42", "2001:500:9f::42"),
    ("m.root-servers.net.", "202.12.27.33", "2001:dc3::35"),
];

/// The compiled root delegation, carrying the given root DS anchors.
pub fn root_hint(root_ds: Vec<Ds>) -> Delegation {
    let ns = ROOT_HINTS
        .iter()
        .map(|(name, v4, v6)| {
            NsEntry::Dual(
                Name::parse(name).expect("compiled root server name is valid"),
                vec![v4.parse().expect("compiled root server IPv4 is valid")],
                vec![v6.parse().expect("compiled root server IPv6 is valid")],
            )
        })
        .collect();
    Delegation {
        zone: Name::root(),
        ns,
        ds_state: DsState::Filled(root_ds),
        dnskeys: Vec::new(),
        fresh: Freshness::Cached,
    }
}

/// A root delegation from operator-supplied hint addresses, for setups where
/// the compiled table is overridden.
pub fn root_hint_with_addrs(addrs: &[IpAddr], root_ds: Vec<Ds>) -> Delegation {
    let name = Name::parse("root-hints.invalid.").expect("placeholder hint name is valid");
    let v4s: Vec<Ipv4Addr> = addrs
        .iter()
        .filter_map(|a| match a {
            IpAddr::V4(v4) => Some(*v4),
            IpAddr::V6(_) => None,
        })
        .collect();
    let v6s: Vec<Ipv6Addr> = addrs
        .iter()
        .filter_map(|a| match a {
            IpAddr::V6(v6) => Some(*v6),
            IpAddr::V4(_) => None,
        })
        .collect();
    let entry = match (v4s.is_empty(), v6s.is_empty()) {
        (false, false) => NsEntry::Dual(name, v4s, v6s),
        (false, true) => NsEntry::V4(name, v4s),
        (true, false) => NsEntry::V6(name, v6s),
        (true, true) => NsEntry::OnlyName(name),
    };
    Delegation {
        zone: Name::root(),
        ns: vec![entry],
        ds_state: DsState::Filled(root_ds),
        dnskeys: Vec::new(),
        fresh: Freshness::Cached,
    }
}

/// Pick up to `k` distinct addresses to query from a delegation's NS set.
///
/// Entries that only have IPv6 glue are skipped entirely when v6 is
/// disabled; dual-stack entries contribute one randomly chosen family.
pub fn select_addresses(
    entries: &[NsEntry],
    disable_v6: bool,
    k: usize,
    rng: &mut impl Rng,
) -> SmallVec<[IpAddr; 8]> {
    let mut candidates: Vec<IpAddr> = Vec::new();
    for entry in entries {
        match entry {
            NsEntry::OnlyName(_) => {}
            NsEntry::V4(_, v4s) => candidates.extend(v4s.iter().map(|a| IpAddr::V4(*a))),
            NsEntry::V6(_, v6s) => {
                if !disable_v6 {
                    candidates.extend(v6s.iter().map(|a| IpAddr::V6(*a)));
                }
            }
            NsEntry::Dual(_, v4s, v6s) => {
                if disable_v6 || rng.random_bool(0.5) {
                    candidates.extend(v4s.iter().map(|a| IpAddr::V4(*a)));
                } else {
                    candidates.extend(v6s.iter().map(|a| IpAddr::V6(*a)));
                }
            }
        }
    }
    candidates.sort();
    candidates.dedup();
    candidates.shuffle(rng);
    candidates.into_iter().take(k).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::enums::RecordClass;

    fn glue_a(owner: &str, addr: Ipv4Addr) -> ResourceRecord {
        ResourceRecord::new(
            Name::parse(owner).unwrap(),
            RecordClass::IN,
            3600,
            RData::A(addr),
        )
    }

    #[test]
    fn find_delegation_pairs_glue_with_ns_names() {
        let zone = Name::parse("example.com").unwrap();
        let ns1 = Name::parse("ns1.example.com").unwrap();
        let ns2 = Name::parse("ns2.example.net").unwrap();
        let glue = vec![glue_a("ns1.example.com", Ipv4Addr::new(192, 0, 2, 1))];

        let builder = find_delegation(&zone, &[ns2.clone(), ns1.clone()], &glue).unwrap();
        let delegation = builder.resolve_ds(DsState::Filled(vec![]));

        assert_eq!(delegation.zone, zone);
        assert_eq!(delegation.ns.len(), 2);
        assert!(delegation.ns.contains(&NsEntry::V4(
            ns1,
            vec![Ipv4Addr::new(192, 0, 2, 1)]
        )));
        assert!(delegation.ns.contains(&NsEntry::OnlyName(ns2)));
        assert_eq!(delegation.fresh, Freshness::Fresh);
    }

    #[test]
    fn find_delegation_requires_ns_names() {
        let zone = Name::parse("example.com").unwrap();
        assert!(find_delegation(&zone, &[], &[]).is_none());
    }

    #[test]
    fn root_hint_has_thirteen_dual_stack_servers() {
        let root = root_hint(vec![]);
        assert!(root.zone.is_root());
        assert_eq!(root.ns.len(), 13);
        assert!(root
            .ns
            .iter()
            .all(|entry| matches!(entry, NsEntry::Dual(_, v4, v6) if !v4.is_empty() && !v6.is_empty())));
    }

    #[test]
    fn select_addresses_skips_v6_only_entries_when_disabled() {
        let entries = vec![
            NsEntry::V6(
                Name::parse("ns1.example.com").unwrap(),
                vec!["2001:db8::1".parse().unwrap()],
            ),
            NsEntry::V4(
                Name::parse("ns2.example.com").unwrap(),
                vec![Ipv4Addr::new(192, 0, 2, 2)],
            ),
        ];
        let mut rng = rand::rng();
        let addrs = select_addresses(&entries, true, 8, &mut rng);
        assert_eq!(addrs.len(), 1);
        assert_eq!(addrs[0], IpAddr::V4(Ipv4Addr::new(192, 0, 2, 2)));
    }

    #[test]
    fn select_addresses_caps_and_dedups() {
        let entries: Vec<NsEntry> = (0..6)
            .map(|i| {
                NsEntry::V4(
                    Name::parse(&format!("ns{i}.example.com")).unwrap(),
                    vec![Ipv4Addr::new(192, 0, 2, i), Ipv4Addr::new(192, 0, 2, i)],
                )
            })
            .collect();
        let mut rng = rand::rng();
        let addrs = select_addresses(&entries, false, 3, &mut rng);
        assert_eq!(addrs.len(), 3);
        let mut unique = addrs.to_vec();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 3);
    }
}
