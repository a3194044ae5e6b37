use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::{CacheKey, Ranking};
use crate::delegation::{
    Delegation, DsState, Freshness, find_delegation, root_hint, root_hint_with_addrs,
    select_addresses,
};
use crate::dns::enums::RecordType;
use crate::dns::message::Section;
use crate::dns::name::Name;
use crate::dns::rdata::RData;
use crate::dnssec::{RrsetVerdict, VerifyError, verify_rrset};
use crate::error::{ResolveError, Result};
use crate::resolver::norec::norec;
use crate::resolver::{Resolver, unix_now};

impl Resolver {
    /// The validated root delegation, reusing the process-wide cell while
    /// the root NS RRset is still cached and re-priming when it is not.
    /// Priming failures fall back to the compiled hints rather than failing
    /// the query.
    pub(crate) async fn refresh_root(&self) -> Result<Arc<Delegation>> {
        let now = unix_now();
        if let Some(root) = self.root.read().clone() {
            let ns_cached = self
                .cache
                .lookup(now, &CacheKey::internet(Name::root(), RecordType::NS))
                .is_some();
            if ns_cached {
                let mut cached = (*root).clone();
                cached.fresh = Freshness::Cached;
                return Ok(Arc::new(cached));
            }
        }

        match self.prime_root().await {
            Ok(root) => {
                let root = Arc::new(root);
                *self.root.write() = Some(root.clone());
                info!("root delegation primed and validated");
                Ok(root)
            }
            Err(err) => {
                warn!(%err, "root priming failed, falling back to compiled hints");
                Ok(Arc::new(self.hint_delegation()))
            }
        }
    }

    /// The bootstrap delegation: operator-supplied hint addresses when
    /// configured, the compiled root-servers.net table otherwise.
    fn hint_delegation(&self) -> Delegation {
        let root_ds = self.anchors.ds_for(&Name::root());
        match &self.config.root_hint_addrs {
            Some(addrs) => root_hint_with_addrs(addrs, root_ds),
            None => root_hint(root_ds),
        }
    }

    /// Fetch and validate the root DNSKEY RRset against the configured
    /// anchors, then the root NS RRset under those keys, and rebuild the
    /// root delegation from the result.
    async fn prime_root(&self) -> Result<Delegation> {
        let hints = self.hint_delegation();
        let addrs = {
            let mut rng = rand::rng();
            select_addresses(
                &hints.ns,
                self.config.disable_v6_ns,
                self.config.ns_sample,
                &mut rng,
            )
        };
        let root = Name::root();

        // Step one: the root keys, anchored by the configured DS set.
        let response = norec(&self.config, true, &addrs, &root, RecordType::DNSKEY).await?;
        let msg = &response.message;
        let now = unix_now();
        let all_keys: Vec<_> = msg
            .answers
            .iter()
            .filter(|rr| rr.name == root)
            .filter_map(|rr| match &rr.rdata {
                RData::DNSKEY(key) => Some(key.clone()),
                _ => None,
            })
            .collect();
        let seps = self.anchors.select_keys(&root, &all_keys);
        if seps.is_empty() {
            return Err(VerifyError::NoSepDnskey(root).into());
        }
        let root_keys = match verify_rrset(&seps, &root, now, &msg.answers, &root, RecordType::DNSKEY)?
        {
            RrsetVerdict::Valid { rrset, rrsigs } => {
                self.cache.insert_valid_rrset(
                    now,
                    &rrset,
                    &rrsigs,
                    Ranking::from_section(Section::Answer, msg.header.aa),
                );
                all_keys
            }
            RrsetVerdict::Unsigned(_) => {
                return Err(ResolveError::ServerFailure(
                    "root DNSKEY RRset is not self-signed by an anchored key".to_string(),
                ));
            }
        };

        // Step two: the root NS set, which must validate under those keys.
        let response = norec(&self.config, true, &addrs, &root, RecordType::NS).await?;
        let msg = &response.message;
        let now = unix_now();
        let ns_rrset = match verify_rrset(&root_keys, &root, now, &msg.answers, &root, RecordType::NS)?
        {
            RrsetVerdict::Valid { rrset, rrsigs } => {
                self.cache.insert_valid_rrset(
                    now,
                    &rrset,
                    &rrsigs,
                    Ranking::from_section(Section::Answer, msg.header.aa),
                );
                rrset
            }
            RrsetVerdict::Unsigned(_) => {
                return Err(ResolveError::ServerFailure(
                    "root NS RRset did not validate under the root keys".to_string(),
                ));
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
        let glue: Vec<_> = msg
            .additionals
            .iter()
            .filter(|rr| matches!(rr.rtype, RecordType::A | RecordType::AAAA))
            .cloned()
            .collect();
        let (_, failures) = self.cache.insert_rrsets(
            now,
            &glue,
            Ranking::from_section(Section::Additional, false),
        );
        for failure in failures {
            debug!(%failure, "skipped malformed root glue RRset");
        }

        let builder = find_delegation(&root, &ns_names, &glue).ok_or_else(|| {
            ResolveError::ServerFailure("primed root NS RRset carries no names".to_string())
        })?;
        let mut delegation = builder.resolve_ds(DsState::Anchor);
        delegation.dnskeys = root_keys;
        Ok(delegation)
    }
}
