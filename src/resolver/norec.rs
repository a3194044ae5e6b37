use std::net::{IpAddr, SocketAddr};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, trace, warn};

use crate::config::ResolverConfig;
use crate::dns::enums::{Rcode, RecordType};
use crate::dns::message::{Edns, Message};
use crate::dns::name::Name;
use crate::error::{ResolveError, Result};
use crate::resolver::fresh_id;

/// How a reply reached us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Udp,
    Tcp,
    Cache,
}

/// A reply from one non-recursive upstream exchange.
#[derive(Debug, Clone)]
pub struct NorecResponse {
    pub message: Message,
    pub transport: Transport,
    pub bytes: usize,
}

/// Issue a single non-recursive query to the given servers in order.
///
/// Per server: UDP with a per-attempt timeout and a bounded number of
/// retries; truncation or an EDNS FORMERR falls back to TCP on the same
/// server with a fresh ID. Responses with a wrong ID are dropped without
/// resending until the attempt deadline passes. The first response passing
/// the ID and question checks wins; otherwise the last error accumulates.
pub async fn norec(
    config: &ResolverConfig,
    dnssec_ok: bool,
    servers: &[IpAddr],
    qname: &Name,
    qtype: RecordType,
) -> Result<NorecResponse> {
    if servers.is_empty() {
        return Err(ResolveError::ServerFailure(format!(
            "no addresses to query for {qname} {qtype}"
        )));
    }

    let mut last_err = None;
    for server in servers {
        let target = SocketAddr::new(*server, config.upstream_port);
        for attempt in 0..=config.udp_retries {
            match exchange_once(config, dnssec_ok, target, qname, qtype).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    debug!(%target, %qname, %qtype, attempt, %err, "upstream attempt failed");
                    let fatal_for_server = matches!(
                        err,
                        ResolveError::QuestionMismatch
                            | ResolveError::OperationRefused
                            | ResolveError::NotImplemented
                            | ResolveError::FormatError(_)
                            | ResolveError::BadOptRecord
                    );
                    last_err = Some(err);
                    if fatal_for_server {
                        break;
                    }
                }
            }
        }
    }
    Err(last_err.unwrap_or(ResolveError::RetryLimitExceeded))
}

/// One UDP attempt against one server, with TCP fallback where the reply
/// demands it.
async fn exchange_once(
    config: &ResolverConfig,
    dnssec_ok: bool,
    target: SocketAddr,
    qname: &Name,
    qtype: RecordType,
) -> Result<NorecResponse> {
    let id = fresh_id();
    let query = build_query(id, qname, qtype, dnssec_ok, config.edns_udp_size);
    let wire = query.encode()?;
    let deadline = Instant::now() + config.query_timeout;

    let (message, bytes) = udp_exchange(&wire, id, target, deadline).await?;

    // Truncated replies and EDNS-challenged servers both answer fully over
    // TCP; everything else is checked right here.
    if message.header.tc {
        trace!(%target, %qname, "UDP reply truncated, retrying over TCP");
        return tcp_exchange(config, dnssec_ok, target, qname, qtype).await;
    }
    if message.rcode() == Rcode::FormErr {
        trace!(%target, %qname, "FORMERR over UDP, retrying over TCP");
        return tcp_exchange(config, dnssec_ok, target, qname, qtype).await;
    }

    check_reply(&query, &message)?;
    classify_rcode(&message)?;
    Ok(NorecResponse {
        message,
        transport: Transport::Udp,
        bytes,
    })
}

fn build_query(id: u16, qname: &Name, qtype: RecordType, dnssec_ok: bool, udp_size: u16) -> Message {
    let mut query = Message::query(id, qname.clone(), qtype);
    query.edns = Some(Edns {
        udp_payload_size: udp_size,
        dnssec_ok,
        ..Edns::default()
    });
    query
}

/// Send one datagram and read until a reply with the right ID arrives or the
/// deadline passes. Mismatched IDs are dropped, not answered with a resend.
async fn udp_exchange(
    wire: &[u8],
    id: u16,
    target: SocketAddr,
    deadline: Instant,
) -> Result<(Message, usize)> {
    let bind_addr: SocketAddr = if target.is_ipv4() {
        "0.0.0.0:0".parse().expect("wildcard v4 bind address is valid")
    } else {
        "[::]:0".parse().expect("wildcard v6 bind address is valid")
    };
    let socket = UdpSocket::bind(bind_addr).await?;
    socket.connect(target).await?;
    socket.send(wire).await?;

    let mut buf = vec![0u8; 4096];
    loop {
        let len = timeout_at(deadline, socket.recv(&mut buf))
            .await
            .map_err(|_| ResolveError::TimeoutExpired)??;
        let message = match Message::parse(&buf[..len]) {
            Ok(message) => message,
            Err(err) => {
                debug!(%target, %err, "dropping undecodable datagram");
                continue;
            }
        };
        if message.header.id != id {
            warn!(%target, got = message.header.id, want = id, "dropping reply with mismatched ID");
            continue;
        }
        if !message.header.qr {
            return Err(ResolveError::FormatError("reply without QR bit".to_string()));
        }
        return Ok((message, len));
    }
}

/// The TCP leg of the fallback path: length-prefixed exchange with a fresh
/// ID on the same server.
async fn tcp_exchange(
    config: &ResolverConfig,
    dnssec_ok: bool,
    target: SocketAddr,
    qname: &Name,
    qtype: RecordType,
) -> Result<NorecResponse> {
    let id = fresh_id();
    let query = build_query(id, qname, qtype, dnssec_ok, config.edns_udp_size);
    let wire = query.encode()?;
    let deadline = Instant::now() + config.query_timeout;

    let exchange = async {
        let mut stream = TcpStream::connect(target).await?;
        stream.write_all(&(wire.len() as u16).to_be_bytes()).await?;
        stream.write_all(&wire).await?;
        stream.flush().await?;

        let mut len_buf = [0u8; 2];
        stream.read_exact(&mut len_buf).await?;
        let len = u16::from_be_bytes(len_buf) as usize;
        let mut buf = vec![0u8; len];
        stream.read_exact(&mut buf).await?;
        Ok::<_, ResolveError>((buf, len))
    };
    let (buf, bytes) = timeout_at(deadline, exchange)
        .await
        .map_err(|_| ResolveError::TimeoutExpired)??;

    let message = Message::parse(&buf)?;
    if message.header.id != id {
        return Err(ResolveError::SequenceNumberMismatch);
    }
    if !message.header.qr {
        return Err(ResolveError::FormatError("reply without QR bit".to_string()));
    }
    if message.rcode() == Rcode::FormErr {
        // The TCP retry was the accommodation; a second FORMERR is final.
        return Err(ResolveError::FormatError(format!(
            "{target} answered FORMERR over TCP"
        )));
    }
    check_reply(&query, &message)?;
    classify_rcode(&message)?;
    Ok(NorecResponse {
        message,
        transport: Transport::Tcp,
        bytes,
    })
}

/// Question-section sanity check, with the FORMERR empty-question allowance.
fn check_reply(query: &Message, reply: &Message) -> Result<()> {
    if reply.rcode() == Rcode::FormErr && reply.questions.is_empty() {
        return Ok(());
    }
    if reply.questions.len() != 1 || reply.questions[0] != query.questions[0] {
        return Err(ResolveError::QuestionMismatch);
    }
    Ok(())
}

/// Map terminal rcodes to errors. NOERROR and NXDOMAIN are answers the
/// engine interprets; everything else ends this exchange.
fn classify_rcode(reply: &Message) -> Result<()> {
    match reply.rcode() {
        Rcode::NoError | Rcode::NXDomain => Ok(()),
        Rcode::ServFail => Err(ResolveError::ServerFailure(
            "upstream answered SERVFAIL".to_string(),
        )),
        Rcode::NotImp => Err(ResolveError::NotImplemented),
        Rcode::Refused => Err(ResolveError::OperationRefused),
        Rcode::BadVers => Err(ResolveError::BadOptRecord),
        Rcode::FormErr => Err(ResolveError::FormatError(
            "upstream answered FORMERR".to_string(),
        )),
        other => Err(ResolveError::UnknownDnsError(format!(
            "upstream answered {other}"
        ))),
    }
}
