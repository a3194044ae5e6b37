use bitstream_io::{BigEndian, BitRead, BitReader, BitWrite, BitWriter};
use bytes::BufMut;

use crate::dns::enums::{Rcode, RecordClass, RecordType};
use crate::dns::name::Name;
use crate::dns::rdata::RData;
use crate::dns::record::ResourceRecord;
use crate::dns::wire::WireReader;
use crate::error::ResolveError;

/// DNS message header (RFC 1035 §4.1.1, AD/CD bits from RFC 4035).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    pub id: u16,
    pub qr: bool,
    pub opcode: u8,
    pub aa: bool,
    pub tc: bool,
    pub rd: bool,
    pub ra: bool,
    pub z: bool,
    pub ad: bool,
    pub cd: bool,
    pub rcode: u8,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl Header {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), ResolveError> {
        let mut writer = BitWriter::endian(&mut *buf, BigEndian);
        let io_err = |e: std::io::Error| ResolveError::DecodeError(e.to_string());
        writer.write_var::<u16>(16, self.id).map_err(io_err)?;
        writer.write_var::<u8>(1, self.qr as u8).map_err(io_err)?;
        writer.write_var::<u8>(4, self.opcode).map_err(io_err)?;
        writer.write_var::<u8>(1, self.aa as u8).map_err(io_err)?;
        writer.write_var::<u8>(1, self.tc as u8).map_err(io_err)?;
        writer.write_var::<u8>(1, self.rd as u8).map_err(io_err)?;
        writer.write_var::<u8>(1, self.ra as u8).map_err(io_err)?;
        writer.write_var::<u8>(1, self.z as u8).map_err(io_err)?;
        writer.write_var::<u8>(1, self.ad as u8).map_err(io_err)?;
        writer.write_var::<u8>(1, self.cd as u8).map_err(io_err)?;
        writer.write_var::<u8>(4, self.rcode).map_err(io_err)?;
        writer.write_var::<u16>(16, self.qdcount).map_err(io_err)?;
        writer.write_var::<u16>(16, self.ancount).map_err(io_err)?;
        writer.write_var::<u16>(16, self.nscount).map_err(io_err)?;
        writer.write_var::<u16>(16, self.arcount).map_err(io_err)?;
        Ok(())
    }

    fn decode(data: &[u8]) -> Result<Self, ResolveError> {
        if data.len() < 12 {
            return Err(ResolveError::DecodeError("message shorter than header".to_string()));
        }
        let mut reader = BitReader::endian(&data[..12], BigEndian);
        let io_err = |e: std::io::Error| ResolveError::DecodeError(e.to_string());
        Ok(Header {
            id: reader.read_var::<u16>(16).map_err(io_err)?,
            qr: reader.read_var::<u8>(1).map_err(io_err)? == 1,
            opcode: reader.read_var::<u8>(4).map_err(io_err)?,
            aa: reader.read_var::<u8>(1).map_err(io_err)? == 1,
            tc: reader.read_var::<u8>(1).map_err(io_err)? == 1,
            rd: reader.read_var::<u8>(1).map_err(io_err)? == 1,
            ra: reader.read_var::<u8>(1).map_err(io_err)? == 1,
            z: reader.read_var::<u8>(1).map_err(io_err)? == 1,
            ad: reader.read_var::<u8>(1).map_err(io_err)? == 1,
            cd: reader.read_var::<u8>(1).map_err(io_err)? == 1,
            rcode: reader.read_var::<u8>(4).map_err(io_err)?,
            qdcount: reader.read_var::<u16>(16).map_err(io_err)?,
            ancount: reader.read_var::<u16>(16).map_err(io_err)?,
            nscount: reader.read_var::<u16>(16).map_err(io_err)?,
            arcount: reader.read_var::<u16>(16).map_err(io_err)?,
        })
    }
}

/// EDNS0 state extracted from (or destined for) the OPT pseudo-record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edns {
    pub udp_payload_size: u16,
    pub extended_rcode: u8,
    pub version: u8,
    pub dnssec_ok: bool,
    pub options: Vec<(u16, Vec<u8>)>,
}

impl Default for Edns {
    fn default() -> Self {
        Edns {
            udp_payload_size: 1232,
            extended_rcode: 0,
            version: 0,
            dnssec_ok: false,
            options: Vec::new(),
        }
    }
}

/// A question section entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub name: Name,
    pub qtype: RecordType,
    pub qclass: RecordClass,
}

/// The three record-carrying sections of a message. Which section an RRset
/// arrived in decides its cache ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Answer,
    Authority,
    Additional,
}

/// A decoded DNS message. The OPT pseudo-record lives in `edns`, not in
/// `additionals`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub authorities: Vec<ResourceRecord>,
    pub additionals: Vec<ResourceRecord>,
    pub edns: Option<Edns>,
}

impl Message {
    /// Build a query message. Flags beyond RD default to zero, which is
    /// exactly what a non-recursive upstream query wants.
    pub fn query(id: u16, name: Name, qtype: RecordType) -> Self {
        Message {
            header: Header {
                id,
                qdcount: 1,
                ..Header::default()
            },
            questions: vec![Question {
                name,
                qtype,
                qclass: RecordClass::IN,
            }],
            ..Message::default()
        }
    }

    /// The effective response code, merging the EDNS extended bits.
    pub fn rcode(&self) -> Rcode {
        let base = self.header.rcode as u16;
        let extended = self
            .edns
            .as_ref()
            .map(|e| (e.extended_rcode as u16) << 4)
            .unwrap_or(0);
        Rcode::from_u16(extended | base)
    }

    pub fn section(&self, section: Section) -> &[ResourceRecord] {
        match section {
            Section::Answer => &self.answers,
            Section::Authority => &self.authorities,
            Section::Additional => &self.additionals,
        }
    }

    /// Serialize to wire format. Counts are recomputed; names are written
    /// uncompressed, which every resolver is required to accept.
    pub fn encode(&self) -> Result<Vec<u8>, ResolveError> {
        let mut buf = Vec::with_capacity(512);
        let mut header = self.header.clone();
        header.qdcount = self.questions.len() as u16;
        header.ancount = self.answers.len() as u16;
        header.nscount = self.authorities.len() as u16;
        header.arcount = self.additionals.len() as u16 + self.edns.is_some() as u16;
        header.encode(&mut buf)?;

        for question in &self.questions {
            question.name.write_wire(&mut buf);
            buf.put_u16(question.qtype.to_u16());
            buf.put_u16(question.qclass.to_u16());
        }
        for record in self
            .answers
            .iter()
            .chain(self.authorities.iter())
            .chain(self.additionals.iter())
        {
            encode_record(record, &mut buf);
        }
        if let Some(edns) = &self.edns {
            encode_opt(edns, &mut buf);
        }
        Ok(buf)
    }

    /// Decode a message from wire format, pulling the OPT record out into
    /// `edns` and rejecting messages with more than one OPT.
    pub fn parse(data: &[u8]) -> Result<Self, ResolveError> {
        let header = Header::decode(data)?;
        let mut reader = WireReader::new(data);
        // Skip the 12 header octets the bit reader already consumed.
        reader.read_bytes(12)?;

        let mut questions = Vec::with_capacity(header.qdcount as usize);
        for _ in 0..header.qdcount {
            let name = reader.read_name()?;
            let qtype = RecordType::from_u16(reader.read_u16()?);
            let qclass = RecordClass::from_u16(reader.read_u16()?);
            questions.push(Question { name, qtype, qclass });
        }

        let mut answers = Vec::with_capacity(header.ancount as usize);
        for _ in 0..header.ancount {
            if let Decoded::Record(rr) = decode_record(&mut reader)? {
                answers.push(rr);
            } else {
                return Err(ResolveError::DecodeError(
                    "OPT record outside the additional section".to_string(),
                ));
            }
        }
        let mut authorities = Vec::with_capacity(header.nscount as usize);
        for _ in 0..header.nscount {
            if let Decoded::Record(rr) = decode_record(&mut reader)? {
                authorities.push(rr);
            } else {
                return Err(ResolveError::DecodeError(
                    "OPT record outside the additional section".to_string(),
                ));
            }
        }

        let mut additionals = Vec::new();
        let mut edns = None;
        for _ in 0..header.arcount {
            match decode_record(&mut reader)? {
                Decoded::Record(rr) => additionals.push(rr),
                Decoded::Opt(parsed) => {
                    if edns.replace(parsed).is_some() {
                        return Err(ResolveError::DecodeError(
                            "more than one OPT record".to_string(),
                        ));
                    }
                }
            }
        }

        Ok(Message {
            header,
            questions,
            answers,
            authorities,
            additionals,
            edns,
        })
    }
}

fn encode_record(record: &ResourceRecord, buf: &mut Vec<u8>) {
    record.name.write_wire(buf);
    buf.put_u16(record.rtype.to_u16());
    buf.put_u16(record.class.to_u16());
    buf.put_u32(record.ttl);
    let rdata = record.rdata.to_wire();
    buf.put_u16(rdata.len() as u16);
    buf.extend_from_slice(&rdata);
}

fn encode_opt(edns: &Edns, buf: &mut Vec<u8>) {
    buf.put_u8(0); // root owner
    buf.put_u16(RecordType::OPT.to_u16());
    buf.put_u16(edns.udp_payload_size);
    let ttl = ((edns.extended_rcode as u32) << 24)
        | ((edns.version as u32) << 16)
        | if edns.dnssec_ok { 0x8000 } else { 0 };
    buf.put_u32(ttl);
    let mut rdata = Vec::new();
    for (code, data) in &edns.options {
        rdata.put_u16(*code);
        rdata.put_u16(data.len() as u16);
        rdata.extend_from_slice(data);
    }
    buf.put_u16(rdata.len() as u16);
    buf.extend_from_slice(&rdata);
}

enum Decoded {
    Record(ResourceRecord),
    Opt(Edns),
}

fn decode_record(reader: &mut WireReader<'_>) -> Result<Decoded, ResolveError> {
    let name = reader.read_name()?;
    let rtype = RecordType::from_u16(reader.read_u16()?);
    let class_value = reader.read_u16()?;
    let ttl = reader.read_u32()?;
    let rdlen = reader.read_u16()? as usize;

    if rtype == RecordType::OPT {
        let mut options = Vec::new();
        let end = reader.pos() + rdlen;
        while reader.pos() + 4 <= end {
            let code = reader.read_u16()?;
            let len = reader.read_u16()? as usize;
            options.push((code, reader.read_bytes(len)?.to_vec()));
        }
        if reader.pos() != end {
            return Err(ResolveError::DecodeError("malformed OPT rdata".to_string()));
        }
        return Ok(Decoded::Opt(Edns {
            udp_payload_size: class_value,
            extended_rcode: (ttl >> 24) as u8,
            version: (ttl >> 16) as u8,
            dnssec_ok: ttl & 0x8000 != 0,
            options,
        }));
    }

    let rdata = RData::decode(rtype, reader, rdlen)?;
    Ok(Decoded::Record(ResourceRecord {
        name,
        rtype,
        class: RecordClass::from_u16(class_value),
        ttl,
        rdata,
    }))
}
