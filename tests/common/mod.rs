//! Shared test helpers: record builders and an in-process mock
//! authoritative server speaking UDP and TCP on one port.

#![allow(dead_code)]

pub mod vectors;

use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};

use mimir::config::ResolverConfig;
use mimir::dns::enums::{Rcode, RecordClass, RecordType};
use mimir::dns::message::{Header, Message};
use mimir::dns::name::Name;
use mimir::dns::rdata::{Dnskey, Ds, RData, Rrsig, Soa};
use mimir::dns::record::ResourceRecord;

pub fn name(s: &str) -> Name {
    Name::parse(s).expect("test name is valid")
}

pub fn rr(owner: &str, ttl: u32, rdata: RData) -> ResourceRecord {
    ResourceRecord::new(name(owner), RecordClass::IN, ttl, rdata)
}

pub fn rr_a(owner: &str, ttl: u32, addr: [u8; 4]) -> ResourceRecord {
    rr(
        owner,
        ttl,
        RData::A(Ipv4Addr::new(addr[0], addr[1], addr[2], addr[3])),
    )
}

pub fn rr_ns(owner: &str, ttl: u32, target: &str) -> ResourceRecord {
    rr(owner, ttl, RData::NS(name(target)))
}

pub fn rr_cname(owner: &str, ttl: u32, target: &str) -> ResourceRecord {
    rr(owner, ttl, RData::CNAME(name(target)))
}

pub fn rr_soa(owner: &str, ttl: u32, minimum: u32) -> ResourceRecord {
    rr(
        owner,
        ttl,
        RData::SOA(Soa {
            mname: name(&format!("ns.{owner}")),
            rname: name(&format!("hostmaster.{owner}")),
            serial: 2024010100,
            refresh: 7200,
            retry: 3600,
            expire: 1209600,
            minimum,
        }),
    )
}

pub fn rr_txt(owner: &str, ttl: u32, text: &[u8]) -> ResourceRecord {
    rr(owner, ttl, RData::TXT(vec![text.to_vec()]))
}

pub fn dnskey(pubkey_hex: &str, algorithm: u8, flags: u16) -> Dnskey {
    Dnskey {
        flags,
        protocol: 3,
        algorithm,
        public_key: hex::decode(pubkey_hex).expect("vector hex is valid"),
    }
}

pub fn ds(key_tag: u16, algorithm: u8, digest_hex: &str) -> Ds {
    Ds {
        key_tag,
        algorithm,
        digest_type: 2,
        digest: hex::decode(digest_hex).expect("vector hex is valid"),
    }
}

pub fn rrsig(
    type_covered: RecordType,
    algorithm: u8,
    labels: u8,
    key_tag: u16,
    signer: &str,
    signature_hex: &str,
) -> Rrsig {
    Rrsig {
        type_covered,
        algorithm,
        labels,
        original_ttl: vectors::SIG_TTL,
        expiration: vectors::SIG_EXPIRATION,
        inception: vectors::SIG_INCEPTION,
        key_tag,
        signer: name(signer),
        signature: hex::decode(signature_hex).expect("vector hex is valid"),
    }
}

/// Canned reply the mock server sends for one (qname, qtype).
#[derive(Debug, Clone)]
pub struct MockReply {
    pub message: Message,
    /// Answer with TC=1 over UDP, forcing the client onto TCP.
    pub truncate_udp: bool,
}

impl MockReply {
    pub fn new(message: Message) -> Self {
        MockReply {
            message,
            truncate_udp: false,
        }
    }

    pub fn truncated(message: Message) -> Self {
        MockReply {
            message,
            truncate_udp: true,
        }
    }
}

/// A reply message under construction.
pub fn reply(
    aa: bool,
    rcode: Rcode,
    answers: Vec<ResourceRecord>,
    authorities: Vec<ResourceRecord>,
    additionals: Vec<ResourceRecord>,
) -> Message {
    Message {
        header: Header {
            qr: true,
            aa,
            rcode: rcode.to_u16() as u8,
            ..Header::default()
        },
        questions: Vec::new(),
        answers,
        authorities,
        additionals,
        edns: None,
    }
}

/// Scripted responses keyed by (qname, qtype). Each key holds a queue;
/// the final entry repeats once the queue drains.
#[derive(Default, Clone)]
pub struct Script {
    entries: Arc<Mutex<HashMap<(String, u16), VecDeque<MockReply>>>>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, qname: &str, qtype: RecordType, reply: MockReply) -> &Self {
        self.entries
            .lock()
            .entry((qname.to_string(), qtype.to_u16()))
            .or_default()
            .push_back(reply);
        self
    }

    fn take(&self, qname: &str, qtype: u16) -> Option<MockReply> {
        let mut entries = self.entries.lock();
        let queue = entries.get_mut(&(qname.to_string(), qtype))?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

/// In-process authoritative server: one UDP socket and one TCP listener on
/// the same port, answering from a `Script`.
pub struct MockServer {
    pub port: u16,
    pub query_count: Arc<AtomicUsize>,
}

impl MockServer {
    pub async fn start(script: Script) -> MockServer {
        let (udp, tcp) = bind_pair().await;
        let port = udp.local_addr().expect("mock socket has an address").port();
        let query_count = Arc::new(AtomicUsize::new(0));

        let udp_script = script.clone();
        let udp_count = query_count.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 65535];
            loop {
                let Ok((len, peer)) = udp.recv_from(&mut buf).await else {
                    return;
                };
                udp_count.fetch_add(1, Ordering::SeqCst);
                let Ok(query) = Message::parse(&buf[..len]) else {
                    continue;
                };
                let Some(wire) = respond(&udp_script, &query, true) else {
                    continue;
                };
                let _ = udp.send_to(&wire, peer).await;
            }
        });

        let tcp_script = script.clone();
        let tcp_count = query_count.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = tcp.accept().await else {
                    return;
                };
                let script = tcp_script.clone();
                tcp_count.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut len_buf = [0u8; 2];
                    if stream.read_exact(&mut len_buf).await.is_err() {
                        return;
                    }
                    let len = u16::from_be_bytes(len_buf) as usize;
                    let mut buf = vec![0u8; len];
                    if stream.read_exact(&mut buf).await.is_err() {
                        return;
                    }
                    let Ok(query) = Message::parse(&buf) else {
                        return;
                    };
                    let Some(wire) = respond(&script, &query, false) else {
                        return;
                    };
                    let _ = stream
                        .write_all(&(wire.len() as u16).to_be_bytes())
                        .await;
                    let _ = stream.write_all(&wire).await;
                });
            }
        });

        MockServer { port, query_count }
    }

    pub fn queries(&self) -> usize {
        self.query_count.load(Ordering::SeqCst)
    }
}

/// Bind UDP and TCP to the same loopback port.
async fn bind_pair() -> (UdpSocket, TcpListener) {
    for _ in 0..32 {
        let udp = UdpSocket::bind("127.0.0.1:0")
            .await
            .expect("mock UDP bind succeeds");
        let port = udp.local_addr().expect("mock socket has an address").port();
        if let Ok(tcp) = TcpListener::bind(("127.0.0.1", port)).await {
            return (udp, tcp);
        }
    }
    panic!("could not bind a UDP/TCP port pair");
}

/// Build the wire reply for one query, or `None` for undecodable input.
fn respond(script: &Script, query: &Message, udp: bool) -> Option<Vec<u8>> {
    let question = query.questions.first()?;
    let scripted = script.take(&question.name.to_string(), question.qtype.to_u16());

    let mut message = match scripted {
        Some(reply) if udp && reply.truncate_udp => {
            let mut truncated = reply.message.clone();
            truncated.header.tc = true;
            truncated.answers.clear();
            truncated.authorities.clear();
            truncated.additionals.clear();
            truncated
        }
        Some(reply) => reply.message,
        // Unscripted questions answer REFUSED so tests fail loudly.
        None => reply(false, Rcode::Refused, vec![], vec![], vec![]),
    };
    message.header.id = query.header.id;
    message.header.qr = true;
    message.questions = query.questions.clone();
    message.header.qdcount = 1;
    if query.edns.is_some() {
        message.edns = Some(mimir::dns::message::Edns::default());
    }
    message.encode().ok()
}

/// Resolver config pointed at the mock server.
pub fn test_config(port: u16) -> ResolverConfig {
    ResolverConfig {
        upstream_port: port,
        root_hint_addrs: Some(vec!["127.0.0.1".parse().expect("loopback parses")]),
        disable_v6_ns: true,
        query_timeout: std::time::Duration::from_millis(500),
        udp_retries: 1,
        ns_sample: 2,
        ..ResolverConfig::default()
    }
}
