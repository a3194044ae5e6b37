use bytes::BufMut;
use ring::signature;
use tracing::{debug, trace};

use crate::dns::enums::RecordType;
use crate::dns::name::Name;
use crate::dns::rdata::{Dnskey, Ds, Rrsig};
use crate::dns::record::{CanonicalRrset, ResourceRecord};
use crate::dnssec::algorithm::{Algorithm, Verifier};
use crate::dnssec::digest::DigestType;
use crate::dnssec::errors::VerifyError;
use crate::dnssec::key_tag::key_tag;

/// Outcome of validating one RRset out of a message section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RrsetVerdict {
    /// At least one covering signature verified under the supplied keys.
    Valid {
        rrset: CanonicalRrset,
        rrsigs: Vec<Rrsig>,
    },
    /// The RRset is canonical but no signature verified.
    Unsigned(CanonicalRrset),
}

impl RrsetVerdict {
    pub fn rrset(&self) -> &CanonicalRrset {
        match self {
            RrsetVerdict::Valid { rrset, .. } => rrset,
            RrsetVerdict::Unsigned(rrset) => rrset,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, RrsetVerdict::Valid { .. })
    }
}

/// Verify one RRSIG over a canonical RRset with one DNSKEY.
///
/// The caller is responsible for pairing: key tag, algorithm, and validity
/// window are its filters. This only rebuilds the RFC 4034 §3.1.8.1 signed
/// form and asks the crypto layer.
pub fn verify_rrsig(key: &Dnskey, sig: &Rrsig, rrset: &CanonicalRrset) -> Result<(), VerifyError> {
    let algorithm =
        Algorithm::from_u8(sig.algorithm).ok_or(VerifyError::UnsupportedAlgorithm(sig.algorithm))?;
    let verifier = algorithm
        .verifier()
        .ok_or(VerifyError::UnsupportedAlgorithm(sig.algorithm))?;
    let data = signed_data(sig, rrset);

    match verifier {
        Verifier::Rsa(params) => {
            let (n, e) = rsa_components(&key.public_key)?;
            signature::RsaPublicKeyComponents { n, e }
                .verify(params, &data, &sig.signature)
                .map_err(|_| VerifyError::BadSignature)
        }
        Verifier::Raw(alg) => {
            // ECDSA DNSKEYs carry the bare x||y point; ring wants the
            // uncompressed SEC 1 form with its 0x04 marker.
            let key_bytes: Vec<u8> = match algorithm {
                Algorithm::EcdsaP256Sha256 | Algorithm::EcdsaP384Sha384 => {
                    let mut sec1 = Vec::with_capacity(key.public_key.len() + 1);
                    sec1.push(0x04);
                    sec1.extend_from_slice(&key.public_key);
                    sec1
                }
                _ => key.public_key.clone(),
            };
            signature::UnparsedPublicKey::new(alg, key_bytes)
                .verify(&data, &sig.signature)
                .map_err(|_| VerifyError::BadSignature)
        }
    }
}

/// Split an RFC 3110 RSA public key into (modulus, exponent).
fn rsa_components(public_key: &[u8]) -> Result<(&[u8], &[u8]), VerifyError> {
    let first = *public_key.first().ok_or(VerifyError::BadPublicKey)?;
    let (exp_len, exp_start) = if first == 0 {
        if public_key.len() < 3 {
            return Err(VerifyError::BadPublicKey);
        }
        (
            u16::from_be_bytes([public_key[1], public_key[2]]) as usize,
            3,
        )
    } else {
        (first as usize, 1)
    };
    let modulus_start = exp_start + exp_len;
    if exp_len == 0 || modulus_start >= public_key.len() {
        return Err(VerifyError::BadPublicKey);
    }
    Ok((
        &public_key[modulus_start..],
        &public_key[exp_start..modulus_start],
    ))
}

/// Rebuild the byte string an RRSIG signs: the rdata with the signature
/// removed, followed by every member record in canonical form and order
/// (RFC 4034 §3.1.8.1 and §6).
pub fn signed_data(sig: &Rrsig, rrset: &CanonicalRrset) -> Vec<u8> {
    let mut data = Vec::new();
    data.put_u16(sig.type_covered.to_u16());
    data.put_u8(sig.algorithm);
    data.put_u8(sig.labels);
    data.put_u32(sig.original_ttl);
    data.put_u32(sig.expiration);
    data.put_u32(sig.inception);
    data.put_u16(sig.key_tag);
    sig.signer.write_wire(&mut data);

    // A label count below the owner's means the signature covers a wildcard
    // expansion; the signed owner is the wildcard itself.
    let owner = rrset.name();
    let signed_owner = if (sig.labels as usize) < owner.label_count() {
        owner.trailing_labels(sig.labels as usize).with_wildcard()
    } else {
        owner.clone()
    };

    let mut rdatas: Vec<Vec<u8>> = rrset.rdatas().iter().map(|r| r.to_wire()).collect();
    rdatas.sort();

    for rdata in rdatas {
        signed_owner.write_wire(&mut data);
        data.put_u16(rrset.rtype().to_u16());
        data.put_u16(rrset.class().to_u16());
        data.put_u32(sig.original_ttl);
        data.put_u16(rdata.len() as u16);
        data.extend_from_slice(&rdata);
    }
    data
}

/// Check a DS record against a DNSKEY: tag, algorithm, and digest over
/// owner-name || DNSKEY-rdata must all line up.
pub fn verify_ds(owner: &Name, key: &Dnskey, ds: &Ds) -> Result<(), VerifyError> {
    if ds.key_tag != key_tag(key) || ds.algorithm != key.algorithm {
        return Err(VerifyError::DsDigestMismatch);
    }
    let digest_type = DigestType::from_u8(ds.digest_type)
        .ok_or(VerifyError::UnsupportedDigestType(ds.digest_type))?;

    let mut data = Vec::new();
    owner.write_wire(&mut data);
    data.extend_from_slice(&key.rdata_wire());

    if digest_type.digest(&data) == ds.digest {
        Ok(())
    } else {
        Err(VerifyError::DsDigestMismatch)
    }
}

/// The DNSKEYs out of `keys` that some DS in `dss` vouches for. An empty
/// result where DS records exist is a broken trust chain.
pub fn select_sep_dnskeys(dss: &[Ds], owner: &Name, keys: &[Dnskey]) -> Vec<Dnskey> {
    keys.iter()
        .filter(|key| {
            dss.iter().any(|ds| {
                ds.key_tag == key_tag(key)
                    && ds.algorithm == key.algorithm
                    && verify_ds(owner, key, ds).is_ok()
            })
        })
        .cloned()
        .collect()
}

/// The central validator: pick the RRset `(name, rtype)` out of a message
/// section, pair it with its covering signatures from the same section, and
/// try to verify under `keys`.
///
/// `Valid` needs one good signature; a canonical RRset with no verifying
/// signature is `Unsigned`. An absent RRset and a malformed one are distinct
/// errors so callers can tell NODATA from garbage.
pub fn verify_rrset(
    keys: &[Dnskey],
    zone: &Name,
    now: u64,
    section: &[ResourceRecord],
    name: &Name,
    rtype: RecordType,
) -> Result<RrsetVerdict, VerifyError> {
    let members: Vec<ResourceRecord> = section
        .iter()
        .filter(|rr| rr.name == *name && rr.rtype == rtype)
        .cloned()
        .collect();
    if members.is_empty() {
        return Err(VerifyError::EmptyRrset);
    }
    let rrset =
        CanonicalRrset::from_records(&members).map_err(|e| VerifyError::BadRrset(e.to_string()))?;

    let covering: Vec<Rrsig> = section
        .iter()
        .filter(|rr| rr.name == *name)
        .filter_map(|rr| match &rr.rdata {
            crate::dns::rdata::RData::RRSIG(sig)
                if sig.type_covered == rtype && sig.signer == *zone =>
            {
                Some(sig.clone())
            }
            _ => None,
        })
        .collect();

    let mut verified = Vec::new();
    for sig in &covering {
        if !sig.in_validity_window(now) {
            debug!(owner = %name, signer = %sig.signer, "signature outside its validity window");
            continue;
        }
        let candidates = keys
            .iter()
            .filter(|key| key_tag(key) == sig.key_tag && key.algorithm == sig.algorithm)
            .filter(|key| key.is_zone_key());
        for key in candidates {
            match verify_rrsig(key, sig, &rrset) {
                Ok(()) => {
                    trace!(owner = %name, %rtype, tag = sig.key_tag, "signature verified");
                    verified.push(sig.clone());
                    break;
                }
                Err(err) => {
                    debug!(owner = %name, %rtype, tag = sig.key_tag, %err, "signature rejected");
                }
            }
        }
    }

    if verified.is_empty() {
        Ok(RrsetVerdict::Unsigned(rrset))
    } else {
        Ok(RrsetVerdict::Valid {
            rrset,
            rrsigs: verified,
        })
    }
}
