//! Ranked-cache behavior: ranking monotonicity, eviction, TTL decay, and
//! negative/SOA materialization.

mod common;

use common::{name, rr_a, rr_soa};
use mimir::cache::{CacheKey, CachedAnswer, Hit, RankedCache, Ranking, SharedCache};
use mimir::dns::enums::{Rcode, RecordType};
use mimir::dns::rdata::RData;
use std::net::Ipv4Addr;

const NOW: u64 = 1_700_000_000;

fn a_key(owner: &str) -> CacheKey {
    CacheKey::internet(name(owner), RecordType::A)
}

fn a_hit(last_octet: u8) -> Hit {
    Hit::NotVerified(vec![RData::A(Ipv4Addr::new(192, 0, 2, last_octet))])
}

#[test]
fn ranking_monotonicity_upgrades_only() {
    let mut cache = RankedCache::new(16, 1800);
    let key = a_key("host.example.com");

    assert!(cache.insert(NOW, key.clone(), 300, a_hit(1), Ranking::Additional));

    // Same rank: no-op. Lower rank later: no-op.
    assert!(!cache.insert(NOW, key.clone(), 300, a_hit(2), Ranking::Additional));
    let (_, hit, rank) = cache.lookup(NOW, &key).unwrap();
    assert_eq!(hit, a_hit(1));
    assert_eq!(rank, Ranking::Additional);

    // Strictly greater rank replaces.
    assert!(cache.insert(NOW, key.clone(), 300, a_hit(3), Ranking::AuthAnswer));
    let (_, hit, rank) = cache.lookup(NOW, &key).unwrap();
    assert_eq!(hit, a_hit(3));
    assert_eq!(rank, Ranking::AuthAnswer);

    // Downgrade attempts cannot overwrite authoritative data.
    assert!(!cache.insert(NOW, key.clone(), 300, a_hit(4), Ranking::Answer));
    let (_, hit, _) = cache.lookup(NOW, &key).unwrap();
    assert_eq!(hit, a_hit(3));
}

#[test]
fn replacement_preserves_size() {
    let mut cache = RankedCache::new(4, 1800);
    let key = a_key("host.example.com");
    cache.insert(NOW, key.clone(), 300, a_hit(1), Ranking::Answer);
    cache.insert(NOW, key, 300, a_hit(2), Ranking::AuthAnswer);
    assert_eq!(cache.len(), 1);
}

#[test]
fn eviction_removes_the_earliest_expiry() {
    let mut cache = RankedCache::new(2, 1800);
    cache.insert(NOW, a_key("a.example.com"), 100, a_hit(1), Ranking::Answer);
    cache.insert(NOW, a_key("b.example.com"), 500, a_hit(2), Ranking::Answer);

    // Full: a later-expiring entry evicts the earliest one.
    assert!(cache.insert(NOW, a_key("c.example.com"), 300, a_hit(3), Ranking::Answer));
    assert_eq!(cache.len(), 2);
    assert!(cache.lookup(NOW, &a_key("a.example.com")).is_none());
    assert!(cache.lookup(NOW, &a_key("b.example.com")).is_some());
    assert!(cache.lookup(NOW, &a_key("c.example.com")).is_some());

    // An entry expiring no later than the eviction candidate is rejected.
    assert!(!cache.insert(NOW, a_key("d.example.com"), 200, a_hit(4), Ranking::Answer));
    assert_eq!(cache.len(), 2);
    assert!(cache.lookup(NOW, &a_key("d.example.com")).is_none());
}

#[test]
fn zero_capacity_disables_all_inserts() {
    let mut cache = RankedCache::new(0, 1800);
    assert!(!cache.insert(NOW, a_key("host.example.com"), 300, a_hit(1), Ranking::AuthAnswer));
    assert_eq!(cache.len(), 0);
}

#[test]
fn ttl_decays_and_expires() {
    let mut cache = RankedCache::new(16, 1800);
    let key = a_key("host.example.com");
    cache.insert(NOW, key.clone(), 300, a_hit(1), Ranking::Answer);

    let (ttl, _, _) = cache.lookup(NOW + 5, &key).unwrap();
    assert_eq!(ttl, 295);

    let (ttl, _, _) = cache.lookup(NOW + 299, &key).unwrap();
    assert_eq!(ttl, 1);

    // insert_time + ttl is no longer in the future: the entry is gone.
    assert!(cache.lookup(NOW + 300, &key).is_none());
    assert!(cache.lookup(NOW, &key).is_none());
}

#[test]
fn expire_sweeps_everything_due() {
    let mut cache = RankedCache::new(16, 1800);
    cache.insert(NOW, a_key("a.example.com"), 10, a_hit(1), Ranking::Answer);
    cache.insert(NOW, a_key("b.example.com"), 20, a_hit(2), Ranking::Answer);
    cache.insert(NOW, a_key("c.example.com"), 999, a_hit(3), Ranking::Answer);

    assert_eq!(cache.expire(NOW + 20), 2);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.expire(NOW + 20), 0);
}

#[test]
fn negative_entry_materializes_with_capped_soa_ttl() {
    let mut cache = RankedCache::new(16, 1800);
    let soa = rr_soa("example.com", 600, 120);
    let soa_key = CacheKey::internet(name("example.com"), RecordType::SOA);
    cache.insert(
        NOW,
        soa_key,
        600,
        Hit::NotVerified(vec![soa.rdata.clone()]),
        Ranking::Additional,
    );

    let neg_key = CacheKey::internet(name("nosuch.example.com"), RecordType::A);
    cache.insert(
        NOW,
        neg_key.clone(),
        120,
        Hit::Negative {
            soa_owner: name("example.com"),
            rcode: Rcode::NXDomain,
        },
        Ranking::AuthAnswer,
    );

    // 60 s later the negative entry has 60 s left, the SOA 540 s: the
    // effective TTL is the minimum of the two remainders.
    match cache.lookup_answer(NOW + 60, &neg_key).unwrap() {
        CachedAnswer::Negative { soa_rrs, rcode, .. } => {
            assert_eq!(rcode, Rcode::NXDomain);
            assert_eq!(soa_rrs.len(), 1);
            assert_eq!(soa_rrs[0].ttl, 60);
            assert_eq!(soa_rrs[0].name, name("example.com"));
        }
        other => panic!("expected a negative answer, got {other:?}"),
    }
}

#[test]
fn negative_entry_without_cached_soa_is_a_miss() {
    let mut cache = RankedCache::new(16, 1800);
    let neg_key = CacheKey::internet(name("nosuch.example.com"), RecordType::A);
    cache.insert(
        NOW,
        neg_key.clone(),
        120,
        Hit::Negative {
            soa_owner: name("example.com"),
            rcode: Rcode::NXDomain,
        },
        Ranking::AuthAnswer,
    );
    assert!(cache.lookup_answer(NOW, &neg_key).is_none());
}

#[test]
fn negative_ttl_is_capped_by_configuration() {
    let mut cache = RankedCache::new(16, 30);
    let key = CacheKey::internet(name("nosuch.example.com"), RecordType::A);
    cache.insert(
        NOW,
        key.clone(),
        3600,
        Hit::NegativeNoSoa {
            rcode: Rcode::ServFail,
        },
        Ranking::Answer,
    );
    let (ttl, _, _) = cache.lookup(NOW, &key).unwrap();
    assert!(ttl <= 30, "negative TTL {ttl} exceeds the configured cap");

    // Positive entries are not subject to the negative cap.
    let pos = a_key("host.example.com");
    cache.insert(NOW, pos.clone(), 3600, a_hit(1), Ranking::Answer);
    let (ttl, _, _) = cache.lookup(NOW, &pos).unwrap();
    assert_eq!(ttl, 3600);
}

#[test]
fn err_sentinel_keys_cache_rcode_failures() {
    let mut cache = RankedCache::new(16, 1800);
    let key = CacheKey::internet(name("broken.example.com"), RecordType::ERR);
    cache.insert(
        NOW,
        key.clone(),
        60,
        Hit::NegativeNoSoa {
            rcode: Rcode::ServFail,
        },
        Ranking::Answer,
    );
    match cache.lookup_answer(NOW, &key).unwrap() {
        CachedAnswer::Failed { rcode, .. } => assert_eq!(rcode, Rcode::ServFail),
        other => panic!("expected a failure entry, got {other:?}"),
    }
}

#[test]
fn grouped_inserts_reject_malformed_sets_and_keep_good_ones() {
    let mut cache = RankedCache::new(16, 1800);
    let mut bad = rr_a("broken.example.com", 300, [192, 0, 2, 9]);
    bad.rtype = RecordType::TXT; // rdata discriminant mismatch

    let rrs = vec![
        rr_a("a.example.com", 300, [192, 0, 2, 1]),
        rr_a("a.example.com", 200, [192, 0, 2, 2]),
        bad,
    ];
    let (inserted, failures) = cache.insert_rrsets(NOW, &rrs, Ranking::Answer);
    assert_eq!(inserted, 1);
    assert_eq!(failures.len(), 1);

    let (ttl, hit, _) = cache.lookup(NOW, &a_key("a.example.com")).unwrap();
    assert_eq!(ttl, 200, "RRset TTL is the member minimum");
    match hit {
        Hit::NotVerified(rdatas) => assert_eq!(rdatas.len(), 2),
        other => panic!("expected a positive hit, got {other:?}"),
    }
}

#[test]
fn stub_path_round_trips_with_absolute_expiry() {
    let mut cache = RankedCache::new(16, 1800);
    let key = a_key("stub.example.com");
    let rdatas = vec![RData::A(Ipv4Addr::new(192, 0, 2, 7))];
    assert!(cache.stub_insert(NOW, key.clone(), NOW + 42, rdatas.clone()));

    let (got, expires_at) = cache.stub_lookup(NOW, &key).unwrap();
    assert_eq!(got, rdatas);
    assert_eq!(expires_at, NOW + 42);
    assert!(cache.stub_lookup(NOW + 42, &key).is_none());
}

#[test]
fn shared_cache_insert_with_expire_sweeps_first() {
    let cache = SharedCache::new(16, 1800);
    cache.insert(NOW, a_key("old.example.com"), 10, a_hit(1), Ranking::Answer);
    assert_eq!(cache.len(), 1);

    cache.insert_with_expire(
        NOW + 60,
        a_key("new.example.com"),
        300,
        a_hit(2),
        Ranking::Answer,
    );
    assert_eq!(cache.len(), 1, "expired entry swept at the insert boundary");
    assert!(cache.lookup(NOW + 60, &a_key("new.example.com")).is_some());
}
