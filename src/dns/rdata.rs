use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use base64::Engine;
use bytes::BufMut;

use crate::dns::enums::RecordType;
use crate::dns::name::Name;
use crate::dns::wire::WireReader;
use crate::error::ResolveError;

/// SOA rdata (RFC 1035 §3.3.13). The `minimum` field doubles as the
/// negative-caching TTL bound per RFC 2308.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Soa {
    pub mname: Name,
    pub rname: Name,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

/// DS rdata (RFC 4034 §5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ds {
    pub key_tag: u16,
    pub algorithm: u8,
    pub digest_type: u8,
    pub digest: Vec<u8>,
}

/// DNSKEY rdata (RFC 4034 §2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dnskey {
    pub flags: u16,
    pub protocol: u8,
    pub algorithm: u8,
    pub public_key: Vec<u8>,
}

impl Dnskey {
    /// Secure Entry Point bit: set on keys a parent DS may reference.
    pub fn is_sep(&self) -> bool {
        self.flags & 0x0001 != 0
    }

    pub fn is_zone_key(&self) -> bool {
        self.flags & 0x0100 != 0
    }

    /// The rdata wire image, used for key tags and DS digests.
    pub fn rdata_wire(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.public_key.len());
        buf.put_u16(self.flags);
        buf.put_u8(self.protocol);
        buf.put_u8(self.algorithm);
        buf.extend_from_slice(&self.public_key);
        buf
    }
}

/// RRSIG rdata (RFC 4034 §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rrsig {
    pub type_covered: RecordType,
    pub algorithm: u8,
    pub labels: u8,
    pub original_ttl: u32,
    pub expiration: u32,
    pub inception: u32,
    pub key_tag: u16,
    pub signer: Name,
    pub signature: Vec<u8>,
}

impl Rrsig {
    /// Whether `now` falls inside the signature validity window.
    pub fn in_validity_window(&self, now: u64) -> bool {
        let now = now as u32;
        self.inception <= now && now <= self.expiration
    }
}

/// Parsed rdata for the record types the core consumes; anything else is
/// carried opaquely so unknown types still cache and round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RData {
    A(Ipv4Addr),
    AAAA(Ipv6Addr),
    NS(Name),
    CNAME(Name),
    PTR(Name),
    SOA(Soa),
    TXT(Vec<Vec<u8>>),
    DS(Ds),
    DNSKEY(Dnskey),
    RRSIG(Rrsig),
    Unknown { rtype: u16, data: Vec<u8> },
}

impl RData {
    /// The record type this rdata belongs to.
    pub fn record_type(&self) -> RecordType {
        match self {
            RData::A(_) => RecordType::A,
            RData::AAAA(_) => RecordType::AAAA,
            RData::NS(_) => RecordType::NS,
            RData::CNAME(_) => RecordType::CNAME,
            RData::PTR(_) => RecordType::PTR,
            RData::SOA(_) => RecordType::SOA,
            RData::TXT(_) => RecordType::TXT,
            RData::DS(_) => RecordType::DS,
            RData::DNSKEY(_) => RecordType::DNSKEY,
            RData::RRSIG(_) => RecordType::RRSIG,
            RData::Unknown { rtype, .. } => RecordType::from_u16(*rtype),
        }
    }

    /// Append the uncompressed rdata wire image to `buf`.
    ///
    /// Names inside rdata are written uncompressed and lowercase, which is
    /// also the RFC 4034 §6 canonical form the verifier signs over.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            RData::A(addr) => buf.extend_from_slice(&addr.octets()),
            RData::AAAA(addr) => buf.extend_from_slice(&addr.octets()),
            RData::NS(name) | RData::CNAME(name) | RData::PTR(name) => name.write_wire(buf),
            RData::SOA(soa) => {
                soa.mname.write_wire(buf);
                soa.rname.write_wire(buf);
                buf.put_u32(soa.serial);
                buf.put_u32(soa.refresh);
                buf.put_u32(soa.retry);
                buf.put_u32(soa.expire);
                buf.put_u32(soa.minimum);
            }
            RData::TXT(segments) => {
                for segment in segments {
                    buf.put_u8(segment.len().min(255) as u8);
                    buf.extend_from_slice(&segment[..segment.len().min(255)]);
                }
            }
            RData::DS(ds) => {
                buf.put_u16(ds.key_tag);
                buf.put_u8(ds.algorithm);
                buf.put_u8(ds.digest_type);
                buf.extend_from_slice(&ds.digest);
            }
            RData::DNSKEY(key) => buf.extend_from_slice(&key.rdata_wire()),
            RData::RRSIG(sig) => {
                buf.put_u16(sig.type_covered.to_u16());
                buf.put_u8(sig.algorithm);
                buf.put_u8(sig.labels);
                buf.put_u32(sig.original_ttl);
                buf.put_u32(sig.expiration);
                buf.put_u32(sig.inception);
                buf.put_u16(sig.key_tag);
                sig.signer.write_wire(buf);
                buf.extend_from_slice(&sig.signature);
            }
            RData::Unknown { data, .. } => buf.extend_from_slice(data),
        }
    }

    /// The rdata wire image as an owned buffer.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }

    /// Decode rdata of the given type from `rdlen` octets at the cursor.
    pub fn decode(
        rtype: RecordType,
        reader: &mut WireReader<'_>,
        rdlen: usize,
    ) -> Result<RData, ResolveError> {
        let end = reader.pos() + rdlen;
        let too_short =
            |what: &str| ResolveError::DecodeError(format!("short {what} rdata"));

        let rdata = match rtype {
            RecordType::A => {
                let bytes = reader.read_bytes(4).map_err(|_| too_short("A"))?;
                RData::A(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]))
            }
            RecordType::AAAA => {
                let bytes = reader.read_bytes(16).map_err(|_| too_short("AAAA"))?;
                let mut octets = [0u8; 16];
                octets.copy_from_slice(bytes);
                RData::AAAA(Ipv6Addr::from(octets))
            }
            RecordType::NS => RData::NS(reader.read_name()?),
            RecordType::CNAME => RData::CNAME(reader.read_name()?),
            RecordType::PTR => RData::PTR(reader.read_name()?),
            RecordType::SOA => {
                let mname = reader.read_name()?;
                let rname = reader.read_name()?;
                RData::SOA(Soa {
                    mname,
                    rname,
                    serial: reader.read_u32()?,
                    refresh: reader.read_u32()?,
                    retry: reader.read_u32()?,
                    expire: reader.read_u32()?,
                    minimum: reader.read_u32()?,
                })
            }
            RecordType::TXT => {
                let mut segments = Vec::new();
                while reader.pos() < end {
                    let len = reader.read_u8()? as usize;
                    segments.push(reader.read_bytes(len)?.to_vec());
                }
                RData::TXT(segments)
            }
            RecordType::DS => {
                if rdlen < 4 {
                    return Err(too_short("DS"));
                }
                RData::DS(Ds {
                    key_tag: reader.read_u16()?,
                    algorithm: reader.read_u8()?,
                    digest_type: reader.read_u8()?,
                    digest: reader.read_bytes(rdlen - 4)?.to_vec(),
                })
            }
            RecordType::DNSKEY => {
                if rdlen < 4 {
                    return Err(too_short("DNSKEY"));
                }
                RData::DNSKEY(Dnskey {
                    flags: reader.read_u16()?,
                    protocol: reader.read_u8()?,
                    algorithm: reader.read_u8()?,
                    public_key: reader.read_bytes(rdlen - 4)?.to_vec(),
                })
            }
            RecordType::RRSIG => {
                if rdlen < 18 {
                    return Err(too_short("RRSIG"));
                }
                let type_covered = RecordType::from_u16(reader.read_u16()?);
                let algorithm = reader.read_u8()?;
                let labels = reader.read_u8()?;
                let original_ttl = reader.read_u32()?;
                let expiration = reader.read_u32()?;
                let inception = reader.read_u32()?;
                let key_tag = reader.read_u16()?;
                // RFC 4034 §3.1.7: the signer name is never compressed.
                let signer = reader.read_name()?;
                if reader.pos() > end {
                    return Err(too_short("RRSIG"));
                }
                let signature = reader.read_bytes(end - reader.pos())?.to_vec();
                RData::RRSIG(Rrsig {
                    type_covered,
                    algorithm,
                    labels,
                    original_ttl,
                    expiration,
                    inception,
                    key_tag,
                    signer,
                    signature,
                })
            }
            other => RData::Unknown {
                rtype: other.to_u16(),
                data: reader.read_bytes(rdlen)?.to_vec(),
            },
        };

        if reader.pos() != end {
            return Err(ResolveError::DecodeError(format!(
                "rdata length mismatch for {rtype}"
            )));
        }
        Ok(rdata)
    }
}

impl fmt::Display for RData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b64 = base64::engine::general_purpose::STANDARD;
        match self {
            RData::A(addr) => write!(f, "{addr}"),
            RData::AAAA(addr) => write!(f, "{addr}"),
            RData::NS(name) | RData::CNAME(name) | RData::PTR(name) => write!(f, "{name}"),
            RData::SOA(soa) => write!(
                f,
                "{} {} {} {} {} {} {}",
                soa.mname, soa.rname, soa.serial, soa.refresh, soa.retry, soa.expire, soa.minimum
            ),
            RData::TXT(segments) => {
                let mut first = true;
                for segment in segments {
                    if !first {
                        write!(f, " ")?;
                    }
                    first = false;
                    write!(f, "\"{}\"", String::from_utf8_lossy(segment))?;
                }
                Ok(())
            }
            RData::DS(ds) => write!(
                f,
                "{} {} {} {}",
                ds.key_tag,
                ds.algorithm,
                ds.digest_type,
                hex::encode_upper(&ds.digest)
            ),
            RData::DNSKEY(key) => write!(
                f,
                "{} {} {} {}",
                key.flags,
                key.protocol,
                key.algorithm,
                b64.encode(&key.public_key)
            ),
            RData::RRSIG(sig) => write!(
                f,
                "{} {} {} {} {} {} {} {} {}",
                sig.type_covered,
                sig.algorithm,
                sig.labels,
                sig.original_ttl,
                sig.expiration,
                sig.inception,
                sig.key_tag,
                sig.signer,
                b64.encode(&sig.signature)
            ),
            RData::Unknown { data, .. } => {
                write!(f, "\\# {} {}", data.len(), hex::encode(data))
            }
        }
    }
}
