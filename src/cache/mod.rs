use std::cmp::Reverse;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use priority_queue::PriorityQueue;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::dns::enums::{Rcode, RecordClass, RecordType};
use crate::dns::name::Name;
use crate::dns::rdata::{RData, Rrsig};
use crate::dns::record::{CanonicalRrset, ResourceRecord, RrsetError, group_rrsets};
use crate::dns::message::Section;

/// Cache key: the question triple, with the name already canonical.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub name: Name,
    pub rtype: RecordType,
    pub class: RecordClass,
}

impl CacheKey {
    pub fn new(name: Name, rtype: RecordType, class: RecordClass) -> Self {
        CacheKey { name, rtype, class }
    }

    pub fn internet(name: Name, rtype: RecordType) -> Self {
        Self::new(name, rtype, RecordClass::IN)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.class, self.rtype)
    }
}

/// RFC 2181 §5.4.1 trust ranking, collapsed to the three levels the
/// resolver distinguishes. Higher-ranked data may overwrite lower-ranked
/// data, never the other way around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Ranking {
    Additional,
    Answer,
    AuthAnswer,
}

impl Ranking {
    /// Ranking for an RRset received in `section` of a reply with the given
    /// AA flag. Authority data is deliberately kept at glue rank so a
    /// referral can never overwrite answer data.
    pub fn from_section(section: Section, aa: bool) -> Self {
        match section {
            Section::Answer if aa => Ranking::AuthAnswer,
            Section::Answer => Ranking::Answer,
            Section::Authority | Section::Additional => Ranking::Additional,
        }
    }
}

/// A cached result for one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hit {
    /// Answer rdata present, RRSIG not checked.
    NotVerified(Vec<RData>),
    /// DNSSEC-validated RRset plus the signatures that validated it.
    Valid {
        rdatas: Vec<RData>,
        rrsigs: Vec<Rrsig>,
    },
    /// NXDOMAIN or NODATA; the cached SOA at `soa_owner` supplies the
    /// negative TTL when the entry is materialized, the rcode says which of
    /// the two this was.
    Negative { soa_owner: Name, rcode: Rcode },
    /// Negative result with no accompanying SOA; self-contained.
    NegativeNoSoa { rcode: Rcode },
}

impl Hit {
    fn is_negative(&self) -> bool {
        matches!(self, Hit::Negative { .. } | Hit::NegativeNoSoa { .. })
    }
}

/// A cache entry materialized back into resource records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedAnswer {
    /// Positive entry: the answer RRs, plus synthetic RRSIG records when the
    /// entry was validated.
    Positive {
        rrs: Vec<ResourceRecord>,
        rank: Ranking,
        validated: bool,
    },
    /// Negative entry joined with its SOA; the SOA TTL is capped at the
    /// negative entry's remaining TTL.
    Negative {
        soa_rrs: Vec<ResourceRecord>,
        rcode: Rcode,
        rank: Ranking,
    },
    /// Negative entry that carries only an rcode.
    Failed { rcode: Rcode, rank: Ranking },
}

#[derive(Debug, Clone)]
struct CacheEntry {
    hit: Hit,
    rank: Ranking,
    expires_at: u64,
}

/// Cache hit/miss counters, shared behind the cache lock-free.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
    pub expired: AtomicU64,
    pub negative_hits: AtomicU64,
}

impl CacheStats {
    fn record_hit(&self, negative: bool) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        if negative {
            self.negative_hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }
}

/// Ranked, TTL-indexed resource-record cache.
///
/// A hash index provides key lookup; a priority queue ordered by absolute
/// expiry provides the min-expiry view used for eviction and batch sweeps.
/// The two structures always hold exactly the same keys.
pub struct RankedCache {
    entries: FxHashMap<CacheKey, CacheEntry>,
    expiry: PriorityQueue<CacheKey, Reverse<u64>>,
    max_size: usize,
    negative_cap: u32,
    stats: CacheStats,
}

impl RankedCache {
    pub fn new(max_size: usize, negative_cap: u32) -> Self {
        RankedCache {
            entries: FxHashMap::default(),
            expiry: PriorityQueue::new(),
            max_size,
            negative_cap,
            stats: CacheStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Insert an entry expiring `ttl` seconds after `now`.
    ///
    /// Returns false without touching the cache when capacity is zero, when
    /// an unexpired entry of equal or higher rank exists, or when the cache
    /// is full and the candidate would expire no later than the entry it
    /// would evict.
    pub fn insert(&mut self, now: u64, key: CacheKey, ttl: u32, hit: Hit, rank: Ranking) -> bool {
        let ttl = if hit.is_negative() {
            ttl.min(self.negative_cap)
        } else {
            ttl
        };
        if ttl == 0 {
            trace!(%key, "not caching zero-TTL entry");
            return false;
        }
        self.insert_at(now, key, now + ttl as u64, hit, rank)
    }

    /// Insert with a caller-supplied absolute expiry.
    fn insert_at(
        &mut self,
        now: u64,
        key: CacheKey,
        expires_at: u64,
        hit: Hit,
        rank: Ranking,
    ) -> bool {
        if self.max_size == 0 {
            return false;
        }

        match self.entries.get(&key) {
            Some(existing) if existing.expires_at > now => {
                // Replace-on-higher-rank; equal or lower rank is a no-op.
                if rank <= existing.rank {
                    trace!(%key, ?rank, existing = ?existing.rank, "ranking rejected insert");
                    return false;
                }
                self.entries
                    .insert(key.clone(), CacheEntry { hit, rank, expires_at });
                self.expiry.change_priority(&key, Reverse(expires_at));
                return true;
            }
            Some(_) => {
                // Expired remnant; drop it and fall through to a fresh insert.
                self.remove(&key);
                self.stats.expired.fetch_add(1, Ordering::Relaxed);
            }
            None => {}
        }

        if self.entries.len() >= self.max_size {
            let earliest = self.expiry.peek().map(|(_, Reverse(exp))| *exp);
            match earliest {
                Some(earliest) if expires_at > earliest => {
                    if let Some((victim, _)) = self.expiry.pop() {
                        self.entries.remove(&victim);
                        self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                        debug!(%victim, "evicted earliest-expiring cache entry");
                    }
                }
                _ => {
                    trace!(%key, "rejected insert expiring before the eviction candidate");
                    return false;
                }
            }
        }

        self.entries
            .insert(key.clone(), CacheEntry { hit, rank, expires_at });
        self.expiry.push(key, Reverse(expires_at));
        true
    }

    fn remove(&mut self, key: &CacheKey) {
        self.entries.remove(key);
        self.expiry.remove(key);
    }

    /// Look up an unexpired entry, returning the remaining TTL.
    pub fn lookup(&mut self, now: u64, key: &CacheKey) -> Option<(u32, Hit, Ranking)> {
        match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => {
                let ttl = (entry.expires_at - now).min(u32::MAX as u64) as u32;
                let result = (ttl, entry.hit.clone(), entry.rank);
                self.stats.record_hit(result.1.is_negative());
                Some(result)
            }
            Some(_) => {
                self.remove(key);
                self.stats.expired.fetch_add(1, Ordering::Relaxed);
                self.stats.record_miss();
                None
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Look up and materialize an entry into records.
    ///
    /// A `Negative` hit performs a second lookup for the SOA it references;
    /// if the SOA has meanwhile expired the negative entry cannot be
    /// materialized and the lookup is a miss.
    pub fn lookup_answer(&mut self, now: u64, key: &CacheKey) -> Option<CachedAnswer> {
        let (ttl, hit, rank) = self.lookup(now, key)?;
        match hit {
            Hit::NotVerified(rdatas) => Some(CachedAnswer::Positive {
                rrs: materialize(&key.name, key.class, ttl, &rdatas, &[]),
                rank,
                validated: false,
            }),
            Hit::Valid { rdatas, rrsigs } => Some(CachedAnswer::Positive {
                rrs: materialize(&key.name, key.class, ttl, &rdatas, &rrsigs),
                rank,
                validated: true,
            }),
            Hit::Negative { soa_owner, rcode } => {
                let soa_key = CacheKey::new(soa_owner, RecordType::SOA, key.class);
                let (soa_ttl, soa_hit, _) = self.lookup(now, &soa_key)?;
                let capped = soa_ttl.min(ttl);
                let (rdatas, rrsigs) = match soa_hit {
                    Hit::NotVerified(rdatas) => (rdatas, Vec::new()),
                    Hit::Valid { rdatas, rrsigs } => (rdatas, rrsigs),
                    _ => return None,
                };
                Some(CachedAnswer::Negative {
                    soa_rrs: materialize(&soa_key.name, soa_key.class, capped, &rdatas, &rrsigs),
                    rcode,
                    rank,
                })
            }
            Hit::NegativeNoSoa { rcode } => Some(CachedAnswer::Failed { rcode, rank }),
        }
    }

    /// Sweep every entry whose expiry is at or before `now`; returns how
    /// many were removed.
    pub fn expire(&mut self, now: u64) -> usize {
        let mut removed = 0;
        while let Some((_, Reverse(expires_at))) = self.expiry.peek() {
            if *expires_at > now {
                break;
            }
            if let Some((key, _)) = self.expiry.pop() {
                self.entries.remove(&key);
                removed += 1;
            }
        }
        if removed > 0 {
            self.stats.expired.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(removed, "swept expired cache entries");
        }
        removed
    }

    /// Group `rrs` into RRsets and insert each as a not-verified entry.
    /// Returns the number of RRsets inserted plus the groups that failed the
    /// grouping law (which are never inserted).
    pub fn insert_rrsets(
        &mut self,
        now: u64,
        rrs: &[ResourceRecord],
        rank: Ranking,
    ) -> (usize, Vec<RrsetError>) {
        let mut inserted = 0;
        let mut failures = Vec::new();
        for group in group_rrsets(rrs) {
            match group {
                Ok(rrset) => {
                    if self.insert_rrset(now, &rrset, rank) {
                        inserted += 1;
                    }
                }
                Err(err) => failures.push(err),
            }
        }
        (inserted, failures)
    }

    /// Insert one validated-grouping RRset as a not-verified entry.
    pub fn insert_rrset(&mut self, now: u64, rrset: &CanonicalRrset, rank: Ranking) -> bool {
        let key = CacheKey::new(rrset.name().clone(), rrset.rtype(), rrset.class());
        self.insert(
            now,
            key,
            rrset.ttl(),
            Hit::NotVerified(rrset.rdatas().to_vec()),
            rank,
        )
    }

    /// Insert a DNSSEC-validated RRset together with its signatures.
    pub fn insert_valid_rrset(
        &mut self,
        now: u64,
        rrset: &CanonicalRrset,
        rrsigs: &[Rrsig],
        rank: Ranking,
    ) -> bool {
        let key = CacheKey::new(rrset.name().clone(), rrset.rtype(), rrset.class());
        self.insert(
            now,
            key,
            rrset.ttl(),
            Hit::Valid {
                rdatas: rrset.rdatas().to_vec(),
                rrsigs: rrsigs.to_vec(),
            },
            rank,
        )
    }

    /// Stub-path insert: answer rank, caller-supplied absolute expiry, no
    /// ranking subtleties beyond the usual replace rule.
    pub fn stub_insert(&mut self, now: u64, key: CacheKey, expires_at: u64, rdatas: Vec<RData>) -> bool {
        self.insert_at(now, key, expires_at, Hit::NotVerified(rdatas), Ranking::Answer)
    }

    /// Stub-path lookup: rdata and absolute expiry, no rank.
    pub fn stub_lookup(&mut self, now: u64, key: &CacheKey) -> Option<(Vec<RData>, u64)> {
        let entry = self.entries.get(key)?;
        if entry.expires_at <= now {
            return None;
        }
        match &entry.hit {
            Hit::NotVerified(rdatas) | Hit::Valid { rdatas, .. } => {
                Some((rdatas.clone(), entry.expires_at))
            }
            _ => None,
        }
    }

    /// Snapshot of all live entries, for diagnostics.
    pub fn dump(&self) -> Vec<(CacheKey, Hit, Ranking, u64)> {
        self.entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.hit.clone(), entry.rank, entry.expires_at))
            .collect()
    }
}

impl fmt::Debug for RankedCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RankedCache")
            .field("len", &self.entries.len())
            .field("max_size", &self.max_size)
            .field("negative_cap", &self.negative_cap)
            .finish()
    }
}

/// Rebuild records from cached rdata, appending synthetic RRSIG records for
/// validated entries.
fn materialize(
    name: &Name,
    class: RecordClass,
    ttl: u32,
    rdatas: &[RData],
    rrsigs: &[Rrsig],
) -> Vec<ResourceRecord> {
    let mut rrs: Vec<ResourceRecord> = rdatas
        .iter()
        .map(|rdata| ResourceRecord::new(name.clone(), class, ttl, rdata.clone()))
        .collect();
    for sig in rrsigs {
        rrs.push(ResourceRecord::new(
            name.clone(),
            class,
            ttl,
            RData::RRSIG(sig.clone()),
        ));
    }
    rrs
}

/// Clone-able, thread-safe handle around the cache. All operations take the
/// lock for their full duration, which is what makes the lookup-then-insert
/// ranking check atomic.
#[derive(Debug, Clone)]
pub struct SharedCache {
    inner: Arc<Mutex<RankedCache>>,
}

impl SharedCache {
    pub fn new(max_size: usize, negative_cap: u32) -> Self {
        SharedCache {
            inner: Arc::new(Mutex::new(RankedCache::new(max_size, negative_cap))),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn insert(&self, now: u64, key: CacheKey, ttl: u32, hit: Hit, rank: Ranking) -> bool {
        self.inner.lock().insert(now, key, ttl, hit, rank)
    }

    /// Sweep expired entries, then insert; keeps the cache tidy at insertion
    /// boundaries without a background timer.
    pub fn insert_with_expire(
        &self,
        now: u64,
        key: CacheKey,
        ttl: u32,
        hit: Hit,
        rank: Ranking,
    ) -> bool {
        let mut cache = self.inner.lock();
        cache.expire(now);
        cache.insert(now, key, ttl, hit, rank)
    }

    pub fn lookup(&self, now: u64, key: &CacheKey) -> Option<(u32, Hit, Ranking)> {
        self.inner.lock().lookup(now, key)
    }

    pub fn lookup_answer(&self, now: u64, key: &CacheKey) -> Option<CachedAnswer> {
        self.inner.lock().lookup_answer(now, key)
    }

    pub fn expire(&self, now: u64) -> usize {
        self.inner.lock().expire(now)
    }

    pub fn insert_rrsets(
        &self,
        now: u64,
        rrs: &[ResourceRecord],
        rank: Ranking,
    ) -> (usize, Vec<RrsetError>) {
        self.inner.lock().insert_rrsets(now, rrs, rank)
    }

    pub fn insert_rrset(&self, now: u64, rrset: &CanonicalRrset, rank: Ranking) -> bool {
        self.inner.lock().insert_rrset(now, rrset, rank)
    }

    pub fn insert_valid_rrset(
        &self,
        now: u64,
        rrset: &CanonicalRrset,
        rrsigs: &[Rrsig],
        rank: Ranking,
    ) -> bool {
        self.inner.lock().insert_valid_rrset(now, rrset, rrsigs, rank)
    }

    pub fn stub_insert(&self, now: u64, key: CacheKey, expires_at: u64, rdatas: Vec<RData>) -> bool {
        self.inner.lock().stub_insert(now, key, expires_at, rdatas)
    }

    pub fn stub_lookup(&self, now: u64, key: &CacheKey) -> Option<(Vec<RData>, u64)> {
        self.inner.lock().stub_lookup(now, key)
    }

    pub fn dump(&self) -> Vec<(CacheKey, Hit, Ranking, u64)> {
        self.inner.lock().dump()
    }
}
