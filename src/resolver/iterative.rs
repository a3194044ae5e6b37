use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::cache::{CacheKey, Hit, Ranking};
use crate::delegation::{
    Delegation, DsState, Freshness, NsEntry, PendingReason, find_delegation, select_addresses,
};
use crate::dns::enums::{Rcode, RecordType};
use crate::dns::message::{Message, Section};
use crate::dns::name::Name;
use crate::dns::rdata::{RData, Soa};
use crate::dns::record::{CanonicalRrset, ResourceRecord};
use crate::dnssec::{RrsetVerdict, VerifyError, select_sep_dnskeys, verify_rrset};
use crate::error::{ResolveError, Result};
use crate::resolver::norec::{NorecResponse, norec};
use crate::resolver::{QueryControls, Resolver, unix_now};

/// Fallback TTL for negative results that arrive without an SOA (RFC 2308
/// suggests a few minutes at most).
const NO_SOA_NEGATIVE_TTL: u32 = 300;

/// Outcome of probing one super-domain level.
enum Step {
    /// A zone cut was found; descend into it.
    Descend(Delegation),
    /// No delegation at this level; keep the current servers.
    Stay,
}

impl Resolver {
    /// One full descent for `(qname, qtype)`: walk the delegations, issue
    /// the final query, absorb the response into the cache. Returns the
    /// response, the zone cut that answered, and the DNSSEC disposition.
    pub(crate) async fn resolve_once(
        &self,
        qname: &Name,
        qtype: RecordType,
        controls: &QueryControls,
    ) -> Result<(NorecResponse, Arc<Delegation>, bool)> {
        let root = self.refresh_root().await?;
        let nss = self.iterative(root, qname).await?;

        let addrs = {
            let mut rng = rand::rng();
            select_addresses(
                &nss.ns,
                self.config.disable_v6_ns,
                self.config.ns_sample,
                &mut rng,
            )
        };
        let dnssec_ok = controls.dnssec_ok.unwrap_or(self.config.dnssec_ok_default)
            && nss.has_ds()
            && !nss.dnskeys.is_empty();
        // EDNS overrides from the front-end apply to the final exchange.
        let config = match controls.udp_payload_size {
            Some(size) => {
                let mut config = (*self.config).clone();
                config.edns_udp_size = size;
                std::sync::Arc::new(config)
            }
            None => self.config.clone(),
        };
        let response = norec(&config, dnssec_ok, &addrs, qname, qtype).await?;
        let secure = self.absorb_answer(&response.message, &nss, qname, qtype)?;
        Ok((response, nss, secure))
    }

    /// Walk the super-domains of `qname` from the root down, reusing cached
    /// delegations and querying where the cache is silent.
    pub(crate) async fn iterative(
        &self,
        start: Arc<Delegation>,
        qname: &Name,
    ) -> Result<Arc<Delegation>> {
        let mut nss = start;
        let mut lateral: u8 = 0;

        for zone in qname.super_domains() {
            if zone == nss.zone || !zone.is_subdomain_of(&nss.zone) {
                continue;
            }

            let now = unix_now();
            if let Some(mut cached) = self.delegation_from_cache(now, &zone) {
                trace!(%zone, "reusing cached delegation");
                if cached.ds_pending() || (cached.has_ds() && cached.dnskeys.is_empty()) {
                    self.fill_dnssec(&nss, &mut cached).await?;
                }
                nss = Arc::new(cached);
                continue;
            }
            if self.no_delegation_marker(now, &zone) {
                trace!(%zone, "cached marker says no delegation at this level");
                continue;
            }

            match self.step_query(&nss, &zone).await? {
                Step::Descend(mut next) => {
                    if next.zone.is_subdomain_of(&nss.zone) {
                        lateral = 0;
                    } else {
                        lateral += 1;
                        if lateral > self.config.max_lateral_steps {
                            return Err(ResolveError::ServerFailure(format!(
                                "too many lateral delegation steps at {zone}"
                            )));
                        }
                    }
                    self.fill_dnssec(&nss, &mut next).await?;
                    debug!(zone = %next.zone, secure = next.has_ds(), "descended to zone cut");
                    nss = Arc::new(next);
                }
                Step::Stay => {}
            }
        }
        Ok(nss)
    }

    /// Probe one super-domain with an A query (the QNAME-minimization shape)
    /// and interpret the reply as referral, sibling-zone cut, or no
    /// delegation.
    async fn step_query(&self, nss: &Delegation, zone: &Name) -> Result<Step> {
        let addrs = {
            let mut rng = rand::rng();
            select_addresses(
                &nss.ns,
                self.config.disable_v6_ns,
                self.config.ns_sample,
                &mut rng,
            )
        };
        let dnssec_ok =
            self.config.dnssec_ok_default && nss.has_ds() && !nss.dnskeys.is_empty();
        let response = norec(&self.config, dnssec_ok, &addrs, zone, RecordType::A).await?;
        let msg = response.message;
        let now = unix_now();

        // Deepest NS owner at or above the probed zone marks the referral.
        let ns_owner = msg
            .authorities
            .iter()
            .filter(|rr| rr.rtype == RecordType::NS)
            .map(|rr| &rr.name)
            .filter(|owner| *owner == zone || zone.is_subdomain_of(owner))
            .max_by_key(|owner| owner.label_count())
            .cloned();

        if let Some(owner) = ns_owner {
            return self.referral(now, &msg, nss, &owner).map(Step::Descend);
        }

        // Sibling-zone workaround: a lone SOA for the probed zone from a
        // server we already know is authoritative for an ancestor.
        let mut soa_owners: Vec<&Name> = msg
            .authorities
            .iter()
            .filter(|rr| rr.rtype == RecordType::SOA)
            .map(|rr| &rr.name)
            .collect();
        soa_owners.sort();
        soa_owners.dedup();
        if soa_owners.len() > 1 {
            return Err(ResolveError::ServerFailure(format!(
                "multiple SOA owners in referral for {zone}"
            )));
        }
        if soa_owners.first().map(|o| *o == zone).unwrap_or(false) && *zone != nss.zone {
            debug!(%zone, "server also serves the child zone, forcing DS fill");
            return Ok(Step::Descend(Delegation {
                zone: zone.clone(),
                ns: nss.ns.clone(),
                ds_state: DsState::Pending(PendingReason::ServesChildZone),
                dnskeys: Vec::new(),
                fresh: Freshness::Fresh,
            }));
        }

        // No delegation at this level; absorb whatever was answered and
        // leave a marker so the next descent skips the probe.
        self.absorb_answer(&msg, nss, zone, RecordType::A)?;
        let marker_ttl = authority_soa(&msg)
            .map(|(_, soa, ttl)| ttl.min(soa.minimum))
            .unwrap_or(NO_SOA_NEGATIVE_TTL);
        self.cache.insert_with_expire(
            now,
            CacheKey::internet(zone.clone(), RecordType::ERR),
            marker_ttl,
            Hit::NegativeNoSoa { rcode: msg.rcode() },
            Ranking::from_section(Section::Answer, msg.header.aa),
        );
        Ok(Step::Stay)
    }

    /// Build and cache a delegation from a referral's authority + glue.
    fn referral(
        &self,
        now: u64,
        msg: &Message,
        nss: &Delegation,
        owner: &Name,
    ) -> Result<Delegation> {
        // Validate the NS RRset when the parent zone has keys; referral NS
        // sets are normally unsigned, which validates as Unsigned and is
        // fine. A malformed set is fatal.
        let ns_rrset = if nss.dnskeys.is_empty() {
            let members: Vec<ResourceRecord> = msg
                .authorities
                .iter()
                .filter(|rr| rr.name == *owner && rr.rtype == RecordType::NS)
                .cloned()
                .collect();
            CanonicalRrset::from_records(&members)
                .map_err(|e| ResolveError::ServerFailure(format!("bad referral NS set: {e}")))?
        } else {
            match verify_rrset(
                &nss.dnskeys,
                &nss.zone,
                now,
                &msg.authorities,
                owner,
                RecordType::NS,
            ) {
                Ok(verdict) => verdict.rrset().clone(),
                Err(err) => {
                    return Err(ResolveError::ServerFailure(format!(
                        "referral NS set for {owner} failed validation: {err}"
                    )));
                }
            }
        };

        let ns_names: Vec<Name> = ns_rrset
            .rdatas()
            .iter()
            .filter_map(|rdata| match rdata {
                RData::NS(name) => Some(name.clone()),
                _ => None,
            })
            .collect();

        // Only in-bailiwick glue is trusted: the owner must sit at or below
        // the delegated zone.
        let glue: Vec<ResourceRecord> = msg
            .additionals
            .iter()
            .filter(|rr| matches!(rr.rtype, RecordType::A | RecordType::AAAA))
            .filter(|rr| rr.name == *owner || rr.name.is_subdomain_of(owner))
            .cloned()
            .collect();

        let builder = find_delegation(owner, &ns_names, &glue).ok_or_else(|| {
            ResolveError::ServerFailure(format!("referral for {owner} carries no NS names"))
        })?;

        // Cache the referral: NS at authority rank, glue at additional rank.
        self.cache
            .insert_rrset(now, &ns_rrset, Ranking::from_section(Section::Authority, false));
        let (_, glue_failures) =
            self.cache
                .insert_rrsets(now, &glue, Ranking::from_section(Section::Additional, false));
        for failure in glue_failures {
            debug!(%failure, "skipped malformed glue RRset");
        }

        Ok(builder.resolve_ds(DsState::Pending(PendingReason::Referral)))
    }

    /// Resolve the DS and DNSKEY state of a freshly cut delegation, per the
    /// chain-of-trust rules: an insecure parent pins the child insecure; a
    /// DS set must lead to a SEP-validated DNSKEY RRset or the descent dies.
    pub(crate) async fn fill_dnssec(&self, parent: &Delegation, dest: &mut Delegation) -> Result<()> {
        if parent.dnskeys.is_empty() {
            // The chain is already broken above; stays provably insecure.
            dest.ds_state = DsState::Filled(Vec::new());
            dest.dnskeys.clear();
            return Ok(());
        }
        if matches!(dest.ds_state, DsState::Filled(_) | DsState::Anchor)
            && !dest.dnskeys.is_empty()
        {
            return Ok(());
        }

        let ds_list = match &dest.ds_state {
            DsState::Filled(list) => list.clone(),
            // Anchored zones get their keys from priming, not from a parent.
            DsState::Anchor => return Ok(()),
            DsState::Pending(reason) => {
                trace!(zone = %dest.zone, ?reason, "fetching DS from the parent");
                self.fetch_ds(parent, &dest.zone).await?
            }
        };
        dest.ds_state = DsState::Filled(ds_list.clone());

        if ds_list.is_empty() {
            dest.dnskeys.clear();
            return Ok(());
        }
        if !dest.dnskeys.is_empty() {
            return Ok(());
        }
        dest.dnskeys = self.fetch_dnskeys(dest, &ds_list).await?;
        Ok(())
    }

    /// Query the parent for the child's DS RRset and validate it under the
    /// parent's keys. NODATA means a provably-insecure delegation.
    async fn fetch_ds(&self, parent: &Delegation, zone: &Name) -> Result<Vec<crate::dns::rdata::Ds>> {
        let addrs = {
            let mut rng = rand::rng();
            select_addresses(
                &parent.ns,
                self.config.disable_v6_ns,
                self.config.ns_sample,
                &mut rng,
            )
        };
        let response = norec(&self.config, true, &addrs, zone, RecordType::DS).await?;
        let msg = &response.message;
        let now = unix_now();
        let aa = msg.header.aa;

        match verify_rrset(&parent.dnskeys, &parent.zone, now, &msg.answers, zone, RecordType::DS) {
            Ok(RrsetVerdict::Valid { rrset, rrsigs }) => {
                self.cache.insert_valid_rrset(
                    now,
                    &rrset,
                    &rrsigs,
                    Ranking::from_section(Section::Answer, aa),
                );
                Ok(rrset
                    .rdatas()
                    .iter()
                    .filter_map(|rdata| match rdata {
                        RData::DS(ds) => Some(ds.clone()),
                        _ => None,
                    })
                    .collect())
            }
            Ok(RrsetVerdict::Unsigned(_)) => Err(ResolveError::ServerFailure(format!(
                "DS RRset for {zone} did not validate under the parent keys"
            ))),
            Err(VerifyError::EmptyRrset) => {
                // No DS: cache the negative and descend insecurely.
                self.cache_negative(now, msg, parent, zone, RecordType::DS)?;
                debug!(%zone, "no DS at the parent, delegation is insecure");
                Ok(Vec::new())
            }
            Err(err) => Err(ResolveError::ServerFailure(format!(
                "DS response for {zone} is malformed: {err}"
            ))),
        }
    }

    /// Query the child for its DNSKEY RRset, select the SEPs the DS set
    /// vouches for, and verify the self-signature. A DS with no validatable
    /// DNSKEY below it is a dangling chain and fatal.
    async fn fetch_dnskeys(
        &self,
        dest: &Delegation,
        ds_list: &[crate::dns::rdata::Ds],
    ) -> Result<Vec<crate::dns::rdata::Dnskey>> {
        let addrs = {
            let mut rng = rand::rng();
            select_addresses(
                &dest.ns,
                self.config.disable_v6_ns,
                self.config.ns_sample,
                &mut rng,
            )
        };
        let response = norec(&self.config, true, &addrs, &dest.zone, RecordType::DNSKEY).await?;
        let msg = &response.message;
        let now = unix_now();

        let all_keys: Vec<crate::dns::rdata::Dnskey> = msg
            .answers
            .iter()
            .filter(|rr| rr.name == dest.zone)
            .filter_map(|rr| match &rr.rdata {
                RData::DNSKEY(key) => Some(key.clone()),
                _ => None,
            })
            .collect();
        let seps = select_sep_dnskeys(ds_list, &dest.zone, &all_keys);
        if seps.is_empty() {
            warn!(zone = %dest.zone, "DS present but no DNSKEY matches it");
            return Err(VerifyError::DanglingDs(dest.zone.clone()).into());
        }

        match verify_rrset(&seps, &dest.zone, now, &msg.answers, &dest.zone, RecordType::DNSKEY) {
            Ok(RrsetVerdict::Valid { rrset, rrsigs }) => {
                self.cache.insert_valid_rrset(
                    now,
                    &rrset,
                    &rrsigs,
                    Ranking::from_section(Section::Answer, msg.header.aa),
                );
                Ok(all_keys)
            }
            Ok(RrsetVerdict::Unsigned(_)) => {
                warn!(zone = %dest.zone, "DNSKEY RRset not self-signed by a SEP key");
                Err(VerifyError::DanglingDs(dest.zone.clone()).into())
            }
            Err(err) => {
                warn!(zone = %dest.zone, %err, "DNSKEY RRset failed validation");
                Err(VerifyError::DanglingDs(dest.zone.clone()).into())
            }
        }
    }

    /// Rebuild a delegation for `zone` out of cached NS, glue, DS and DNSKEY
    /// entries. Only DNSSEC-valid cached DNSKEYs are trusted as keys.
    fn delegation_from_cache(&self, now: u64, zone: &Name) -> Option<Delegation> {
        let (_, ns_hit, _) = self
            .cache
            .lookup(now, &CacheKey::internet(zone.clone(), RecordType::NS))?;
        let ns_names: Vec<Name> = match &ns_hit {
            Hit::NotVerified(rdatas) | Hit::Valid { rdatas, .. } => rdatas
                .iter()
                .filter_map(|rdata| match rdata {
                    RData::NS(name) => Some(name.clone()),
                    _ => None,
                })
                .collect(),
            _ => return None,
        };
        if ns_names.is_empty() {
            return None;
        }

        let mut ns = Vec::with_capacity(ns_names.len());
        for name in &ns_names {
            let v4s: Vec<std::net::Ipv4Addr> = self
                .cache
                .lookup(now, &CacheKey::internet(name.clone(), RecordType::A))
                .map(|(_, hit, _)| addrs_v4(&hit))
                .unwrap_or_default();
            let v6s: Vec<std::net::Ipv6Addr> = self
                .cache
                .lookup(now, &CacheKey::internet(name.clone(), RecordType::AAAA))
                .map(|(_, hit, _)| addrs_v6(&hit))
                .unwrap_or_default();
            ns.push(match (v4s.is_empty(), v6s.is_empty()) {
                (false, false) => NsEntry::Dual(name.clone(), v4s, v6s),
                (false, true) => NsEntry::V4(name.clone(), v4s),
                (true, false) => NsEntry::V6(name.clone(), v6s),
                (true, true) => NsEntry::OnlyName(name.clone()),
            });
        }

        let ds_state = match self
            .cache
            .lookup(now, &CacheKey::internet(zone.clone(), RecordType::DS))
        {
            Some((_, Hit::Valid { rdatas, .. }, _)) | Some((_, Hit::NotVerified(rdatas), _)) => {
                DsState::Filled(
                    rdatas
                        .iter()
                        .filter_map(|rdata| match rdata {
                            RData::DS(ds) => Some(ds.clone()),
                            _ => None,
                        })
                        .collect(),
                )
            }
            Some((_, Hit::Negative { .. }, _)) | Some((_, Hit::NegativeNoSoa { .. }, _)) => {
                DsState::Filled(Vec::new())
            }
            None => DsState::Pending(PendingReason::CacheMiss),
        };

        let dnskeys = match self
            .cache
            .lookup(now, &CacheKey::internet(zone.clone(), RecordType::DNSKEY))
        {
            Some((_, Hit::Valid { rdatas, .. }, _)) => rdatas
                .iter()
                .filter_map(|rdata| match rdata {
                    RData::DNSKEY(key) => Some(key.clone()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };

        Some(Delegation {
            zone: zone.clone(),
            ns,
            ds_state,
            dnskeys,
            fresh: Freshness::Cached,
        })
    }

    /// Whether a cached `(zone, ERR)` entry says this level has no
    /// delegation.
    fn no_delegation_marker(&self, now: u64, zone: &Name) -> bool {
        self.cache
            .lookup(now, &CacheKey::internet(zone.clone(), RecordType::ERR))
            .is_some()
    }

    /// Absorb a final (or probe) response into the cache and report whether
    /// the answer validates. Positive answers are cached per RRset at answer
    /// rank; authority and additional data at glue rank; negatives with
    /// their SOA per RFC 2308.
    pub(crate) fn absorb_answer(
        &self,
        msg: &Message,
        nss: &Delegation,
        qname: &Name,
        qtype: RecordType,
    ) -> Result<bool> {
        let now = unix_now();
        let aa = msg.header.aa;
        let chain_secure = nss.has_ds() && !nss.dnskeys.is_empty();

        let relevant = msg
            .answers
            .iter()
            .any(|rr| rr.rtype != RecordType::RRSIG);
        if msg.rcode() == Rcode::NXDomain || !relevant {
            let secure = self.cache_negative(now, msg, nss, qname, qtype)?;
            return Ok(secure && chain_secure);
        }

        let mut all_valid = true;
        for group in crate::dns::record::group_rrsets(&msg.answers) {
            let rrset = match group {
                Ok(rrset) => rrset,
                Err(err) => {
                    warn!(zone = %nss.zone, %err, "dropping malformed answer RRset");
                    all_valid = false;
                    continue;
                }
            };
            let rank = Ranking::from_section(Section::Answer, aa);
            if nss.dnskeys.is_empty() {
                self.cache.insert_rrset(now, &rrset, rank);
                all_valid = false;
                continue;
            }
            match verify_rrset(
                &nss.dnskeys,
                &nss.zone,
                now,
                &msg.answers,
                rrset.name(),
                rrset.rtype(),
            ) {
                Ok(RrsetVerdict::Valid { rrset, rrsigs }) => {
                    self.cache.insert_valid_rrset(now, &rrset, &rrsigs, rank);
                }
                Ok(RrsetVerdict::Unsigned(rrset)) => {
                    self.cache.insert_rrset(now, &rrset, rank);
                    all_valid = false;
                }
                Err(err) => {
                    warn!(zone = %nss.zone, owner = %rrset.name(), %err, "answer RRset failed validation");
                    return Err(err.into());
                }
            }
        }

        // Authority and additional data never outrank existing entries.
        let (_, failures) = self.cache.insert_rrsets(
            now,
            &msg.authorities,
            Ranking::from_section(Section::Authority, aa),
        );
        for failure in failures {
            debug!(%failure, "skipped malformed authority RRset");
        }
        let (_, failures) = self.cache.insert_rrsets(
            now,
            &msg.additionals,
            Ranking::from_section(Section::Additional, aa),
        );
        for failure in failures {
            debug!(%failure, "skipped malformed additional RRset");
        }

        Ok(chain_secure && all_valid)
    }

    /// Cache a negative response per RFC 2308: the SOA under its own owner,
    /// the negative entry under the original question with the TTL
    /// `min(soa.minimum, soa rr ttl)`. Returns whether the SOA validated.
    fn cache_negative(
        &self,
        now: u64,
        msg: &Message,
        nss: &Delegation,
        qname: &Name,
        qtype: RecordType,
    ) -> Result<bool> {
        let aa = msg.header.aa;
        let rank = Ranking::from_section(Section::Answer, aa);
        let rcode = msg.rcode();

        let Some((soa_owner, soa, soa_ttl)) = authority_soa(msg) else {
            self.cache.insert_with_expire(
                now,
                CacheKey::internet(qname.clone(), qtype),
                NO_SOA_NEGATIVE_TTL,
                Hit::NegativeNoSoa { rcode },
                rank,
            );
            return Ok(false);
        };

        let soa_validated = if nss.dnskeys.is_empty() {
            let members: Vec<ResourceRecord> = msg
                .authorities
                .iter()
                .filter(|rr| rr.name == soa_owner && rr.rtype == RecordType::SOA)
                .cloned()
                .collect();
            if let Ok(rrset) = CanonicalRrset::from_records(&members) {
                self.cache.insert_rrset(
                    now,
                    &rrset,
                    Ranking::from_section(Section::Authority, aa),
                );
            }
            false
        } else {
            match verify_rrset(
                &nss.dnskeys,
                &nss.zone,
                now,
                &msg.authorities,
                &soa_owner,
                RecordType::SOA,
            ) {
                Ok(RrsetVerdict::Valid { rrset, rrsigs }) => {
                    self.cache.insert_valid_rrset(
                        now,
                        &rrset,
                        &rrsigs,
                        Ranking::from_section(Section::Authority, aa),
                    );
                    true
                }
                Ok(RrsetVerdict::Unsigned(rrset)) => {
                    self.cache.insert_rrset(
                        now,
                        &rrset,
                        Ranking::from_section(Section::Authority, aa),
                    );
                    false
                }
                Err(err) => {
                    warn!(zone = %nss.zone, %err, "negative SOA failed validation");
                    return Err(err.into());
                }
            }
        };

        let negative_ttl = soa_ttl.min(soa.minimum);
        self.cache.insert_with_expire(
            now,
            CacheKey::internet(qname.clone(), qtype),
            negative_ttl,
            Hit::Negative {
                soa_owner,
                rcode,
            },
            rank,
        );
        Ok(soa_validated)
    }
}

/// The first SOA in the authority section, with its owner and record TTL.
fn authority_soa(msg: &Message) -> Option<(Name, Soa, u32)> {
    msg.authorities.iter().find_map(|rr| match &rr.rdata {
        RData::SOA(soa) => Some((rr.name.clone(), soa.clone(), rr.ttl)),
        _ => None,
    })
}

/// IPv4 glue addresses out of a cached hit.
fn addrs_v4(hit: &Hit) -> Vec<std::net::Ipv4Addr> {
    match hit {
        Hit::NotVerified(rdatas) | Hit::Valid { rdatas, .. } => rdatas
            .iter()
            .filter_map(|rdata| match rdata {
                RData::A(addr) => Some(*addr),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// IPv6 glue addresses out of a cached hit.
fn addrs_v6(hit: &Hit) -> Vec<std::net::Ipv6Addr> {
    match hit {
        Hit::NotVerified(rdatas) | Hit::Valid { rdatas, .. } => rdatas
            .iter()
            .filter_map(|rdata| match rdata {
                RData::AAAA(addr) => Some(*addr),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}
