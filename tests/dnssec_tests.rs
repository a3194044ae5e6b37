//! Verification pipeline tests against generated known-good vectors:
//! Ed25519 and ECDSA-P256 signatures over fixed RRsets, DS digests, SEP
//! selection, and the central RRset validator.

mod common;

use common::vectors::*;
use common::{dnskey, ds, name, rr, rr_a, rrsig};
use mimir::dns::enums::RecordType;
use mimir::dns::rdata::RData;
use mimir::dns::record::CanonicalRrset;
use mimir::dnssec::{
    RrsetVerdict, TrustAnchor, TrustAnchorSet, VerifyError, key_tag, select_sep_dnskeys,
    verify_ds, verify_rrset, verify_rrsig,
};

/// A moment inside every vector's validity window.
const NOW: u64 = 1_700_000_000;

fn a_com_rrset() -> CanonicalRrset {
    CanonicalRrset::from_records(&[rr_a("a.com", SIG_TTL, [192, 0, 2, 10])]).unwrap()
}

#[test]
fn ed25519_signature_verifies() {
    let key = dnskey(COM_PUBKEY, 15, 257);
    let sig = rrsig(RecordType::A, 15, 2, COM_KEY_TAG, "com.", A_COM_SIG);
    assert_eq!(key_tag(&key), COM_KEY_TAG);
    verify_rrsig(&key, &sig, &a_com_rrset()).expect("known-good signature must verify");
}

#[test]
fn corrupted_signature_is_rejected() {
    let key = dnskey(COM_PUBKEY, 15, 257);
    let mut sig = rrsig(RecordType::A, 15, 2, COM_KEY_TAG, "com.", A_COM_SIG);
    sig.signature[0] ^= 0xFF;
    assert_eq!(
        verify_rrsig(&key, &sig, &a_com_rrset()),
        Err(VerifyError::BadSignature)
    );
}

#[test]
fn tampered_rrset_is_rejected() {
    let key = dnskey(COM_PUBKEY, 15, 257);
    let sig = rrsig(RecordType::A, 15, 2, COM_KEY_TAG, "com.", A_COM_SIG);
    let tampered =
        CanonicalRrset::from_records(&[rr_a("a.com", SIG_TTL, [192, 0, 2, 66])]).unwrap();
    assert_eq!(
        verify_rrsig(&key, &sig, &tampered),
        Err(VerifyError::BadSignature)
    );
}

#[test]
fn ecdsa_p256_signature_verifies() {
    let key = dnskey(P256_PUBKEY, 13, 256);
    let sig = rrsig(RecordType::A, 13, 2, P256_KEY_TAG, "com.", P256_SIG);
    assert_eq!(key_tag(&key), P256_KEY_TAG);
    verify_rrsig(&key, &sig, &a_com_rrset()).expect("P-256 signature must verify");
}

#[test]
fn ed448_is_unsupported() {
    let key = dnskey(COM_PUBKEY, 16, 257);
    let mut sig = rrsig(RecordType::A, 16, 2, COM_KEY_TAG, "com.", A_COM_SIG);
    sig.algorithm = 16;
    assert_eq!(
        verify_rrsig(&key, &sig, &a_com_rrset()),
        Err(VerifyError::UnsupportedAlgorithm(16))
    );
}

#[test]
fn ds_digest_matches_the_dnskey() {
    let key = dnskey(COM_PUBKEY, 15, 257);
    let good = ds(COM_KEY_TAG, 15, COM_DS_DIGEST);
    verify_ds(&name("com."), &key, &good).expect("generated DS must match");

    let wrong_digest = ds(COM_KEY_TAG, 15, ROOT_DS_DIGEST);
    assert_eq!(
        verify_ds(&name("com."), &key, &wrong_digest),
        Err(VerifyError::DsDigestMismatch)
    );

    // Same digest, wrong owner name: the digest covers the owner too.
    assert_eq!(
        verify_ds(&name("net."), &key, &good),
        Err(VerifyError::DsDigestMismatch)
    );
}

#[test]
fn sep_selection_picks_only_vouched_keys() {
    let com_key = dnskey(COM_PUBKEY, 15, 257);
    let root_key = dnskey(ROOT_PUBKEY, 15, 257);
    let dss = vec![ds(COM_KEY_TAG, 15, COM_DS_DIGEST)];

    let selected = select_sep_dnskeys(&dss, &name("com."), &[com_key.clone(), root_key]);
    assert_eq!(selected, vec![com_key]);

    // No DS matches: trust-chain break surfaces as an empty selection.
    let none = select_sep_dnskeys(&dss, &name("com."), &[dnskey(ROOT_PUBKEY, 15, 257)]);
    assert!(none.is_empty());
}

#[test]
fn verify_rrset_returns_valid_with_the_verifying_signature() {
    let key = dnskey(COM_PUBKEY, 15, 257);
    let section = vec![
        rr_a("a.com", SIG_TTL, [192, 0, 2, 10]),
        rr(
            "a.com",
            SIG_TTL,
            RData::RRSIG(rrsig(RecordType::A, 15, 2, COM_KEY_TAG, "com.", A_COM_SIG)),
        ),
    ];
    match verify_rrset(
        &[key],
        &name("com."),
        NOW,
        &section,
        &name("a.com"),
        RecordType::A,
    )
    .unwrap()
    {
        RrsetVerdict::Valid { rrset, rrsigs } => {
            assert_eq!(rrset.ttl(), SIG_TTL);
            assert_eq!(rrsigs.len(), 1);
            assert_eq!(rrsigs[0].key_tag, COM_KEY_TAG);
        }
        RrsetVerdict::Unsigned(_) => panic!("expected a validated RRset"),
    }
}

#[test]
fn verify_rrset_skips_signatures_outside_their_window() {
    let key = dnskey(COM_PUBKEY, 15, 257);
    let section = vec![
        rr_a("a.com", SIG_TTL, [192, 0, 2, 10]),
        rr(
            "a.com",
            SIG_TTL,
            RData::RRSIG(rrsig(RecordType::A, 15, 2, COM_KEY_TAG, "com.", A_COM_SIG)),
        ),
    ];
    // Past the expiration the same material no longer validates.
    let verdict = verify_rrset(
        &[key],
        &name("com."),
        u64::from(SIG_EXPIRATION) + 1,
        &section,
        &name("a.com"),
        RecordType::A,
    )
    .unwrap();
    assert!(matches!(verdict, RrsetVerdict::Unsigned(_)));
}

#[test]
fn verify_rrset_ignores_signatures_from_other_zones() {
    let key = dnskey(COM_PUBKEY, 15, 257);
    let section = vec![
        rr_a("a.com", SIG_TTL, [192, 0, 2, 10]),
        rr(
            "a.com",
            SIG_TTL,
            // Right bytes, wrong signer zone: must not be paired.
            RData::RRSIG(rrsig(RecordType::A, 15, 2, COM_KEY_TAG, "net.", A_COM_SIG)),
        ),
    ];
    let verdict = verify_rrset(
        &[key],
        &name("com."),
        NOW,
        &section,
        &name("a.com"),
        RecordType::A,
    )
    .unwrap();
    assert!(matches!(verdict, RrsetVerdict::Unsigned(_)));
}

#[test]
fn verify_rrset_distinguishes_empty_from_malformed() {
    let key = dnskey(COM_PUBKEY, 15, 257);
    assert_eq!(
        verify_rrset(
            &[key.clone()],
            &name("com."),
            NOW,
            &[],
            &name("a.com"),
            RecordType::A,
        ),
        Err(VerifyError::EmptyRrset)
    );

    let mut broken = rr_a("a.com", SIG_TTL, [192, 0, 2, 10]);
    broken.rtype = RecordType::A;
    broken.class = mimir::dns::enums::RecordClass::CH;
    assert!(matches!(
        verify_rrset(
            &[key],
            &name("com."),
            NOW,
            &[broken],
            &name("a.com"),
            RecordType::A,
        ),
        Err(VerifyError::BadRrset(_))
    ));
}

#[test]
fn trust_anchor_set_enters_the_chain_at_the_root() {
    let anchors = TrustAnchorSet::from_anchors(vec![TrustAnchor::Ds {
        owner: name("."),
        ds: ds(ROOT_KEY_TAG, 15, ROOT_DS_DIGEST),
    }]);
    let root_key = dnskey(ROOT_PUBKEY, 15, 257);
    let other_key = dnskey(COM_PUBKEY, 15, 257);

    let selected = anchors.select_keys(&name("."), &[root_key.clone(), other_key]);
    assert_eq!(selected, vec![root_key]);
}
