pub mod iterative;
pub mod norec;
pub mod priming;

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use rand::Rng;
use tracing::{debug, info};

use crate::cache::{CacheKey, CachedAnswer, SharedCache};
use crate::config::ResolverConfig;
use crate::delegation::Delegation;
use crate::dns::enums::{Rcode, RecordType};
use crate::dns::message::{Header, Message, Question};
use crate::dns::name::Name;
use crate::dns::rdata::RData;
use crate::dns::record::ResourceRecord;
use crate::dnssec::TrustAnchorSet;
use crate::error::{ResolveError, Result};

pub use norec::{NorecResponse, Transport};

/// Seconds since the Unix epoch, the time base for every TTL computation.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// A fresh 16-bit message ID from the thread's CSPRNG.
pub(crate) fn fresh_id() -> u16 {
    rand::rng().random()
}

/// Per-query overrides a front-end may pass through.
#[derive(Debug, Clone, Default)]
pub struct QueryControls {
    /// Override of the configured DNSSEC-OK default.
    pub dnssec_ok: Option<bool>,
    /// Override of the advertised EDNS UDP payload size.
    pub udp_payload_size: Option<u16>,
    /// CD: accept data that fails validation. The engine still validates,
    /// it just does not fail the query over it.
    pub checking_disabled: bool,
    /// Outer wall-clock budget for the whole query.
    pub deadline: Option<Duration>,
}

/// The outcome of one resolution, ready for a front-end to serialize.
#[derive(Debug, Clone)]
pub struct Reply {
    pub message: Message,
    /// The zone cut that produced the final answer.
    pub zone: Name,
    /// Whether a validated chain from a trust anchor covers the answer.
    pub secure: bool,
    pub transport: Transport,
    pub bytes: usize,
}

/// The iterative, validating resolver. Owns the process-wide shared state:
/// the record cache, the trust anchors, and the root-delegation cell.
pub struct Resolver {
    pub(crate) config: Arc<ResolverConfig>,
    pub(crate) cache: SharedCache,
    pub(crate) anchors: Arc<TrustAnchorSet>,
    pub(crate) root: RwLock<Option<Arc<Delegation>>>,
}

impl Resolver {
    pub fn new(config: ResolverConfig) -> Result<Self> {
        let anchors = Arc::new(config.trust_anchor_set()?);
        let cache = SharedCache::new(config.cache_size, config.negative_min_ttl_cap);
        Ok(Resolver {
            config: Arc::new(config),
            cache,
            anchors,
            root: RwLock::new(None),
        })
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve with default controls.
    pub async fn resolve(&self, qname: &str, qtype: RecordType) -> Result<Reply> {
        self.resolve_with(qname, qtype, QueryControls::default()).await
    }

    /// Resolve a question, following CNAME chains and consulting the cache
    /// before any network work.
    pub async fn resolve_with(
        &self,
        qname: &str,
        qtype: RecordType,
        controls: QueryControls,
    ) -> Result<Reply> {
        let name = Name::parse(qname)?;
        match controls.deadline {
            Some(budget) => tokio::time::timeout(budget, self.resolve_chain(name, qtype, &controls))
                .await
                .map_err(|_| ResolveError::TimeoutExpired)?,
            None => self.resolve_chain(name, qtype, &controls).await,
        }
    }

    /// The CNAME-following loop around single-pass resolution.
    async fn resolve_chain(
        &self,
        qname: Name,
        qtype: RecordType,
        controls: &QueryControls,
    ) -> Result<Reply> {
        let mut current = qname.clone();
        // CNAME records crossed so far, prepended to the final answer.
        let mut chain: Vec<ResourceRecord> = Vec::new();

        for _hop in 0..=self.config.max_cname_chain {
            if let Some(reply) = self.reply_from_cache(&qname, &current, qtype, &chain) {
                match cname_target(&reply.message.answers, &current, qtype)? {
                    Some(target) => {
                        chain.extend(
                            reply
                                .message
                                .answers
                                .iter()
                                .filter(|rr| rr.name == current && rr.rtype == RecordType::CNAME)
                                .cloned(),
                        );
                        current = target;
                        continue;
                    }
                    None => return Ok(reply),
                }
            }

            let (response, nss, secure) = self.resolve_once(&current, qtype, controls).await?;
            match cname_target(&response.message.answers, &current, qtype)? {
                Some(target) => {
                    debug!(%current, %target, "following CNAME");
                    chain.extend(
                        response
                            .message
                            .answers
                            .iter()
                            .filter(|rr| rr.name == current && rr.rtype == RecordType::CNAME)
                            .cloned(),
                    );
                    current = target;
                    continue;
                }
                None => {
                    let mut message = response.message;
                    restore_question(&mut message, &qname, qtype);
                    if !chain.is_empty() {
                        let mut answers = chain.clone();
                        answers.extend(message.answers);
                        message.answers = answers;
                        message.header.ancount = message.answers.len() as u16;
                    }
                    message.header.ad = secure && !controls.checking_disabled;
                    info!(%qname, %qtype, zone = %nss.zone, secure, "resolved");
                    return Ok(Reply {
                        message,
                        zone: nss.zone.clone(),
                        secure,
                        transport: response.transport,
                        bytes: response.bytes,
                    });
                }
            }
        }
        Err(ResolveError::ServerFailure(format!(
            "CNAME chain for {qname} exceeds {} links",
            self.config.max_cname_chain
        )))
    }

    /// Build a reply straight from the cache, if it can answer.
    fn reply_from_cache(
        &self,
        qname: &Name,
        current: &Name,
        qtype: RecordType,
        chain: &[ResourceRecord],
    ) -> Option<Reply> {
        let now = unix_now();
        let direct = self
            .cache
            .lookup_answer(now, &CacheKey::internet(current.clone(), qtype));
        let answer = match direct {
            Some(answer) => answer,
            // A cached CNAME under its own type also answers this question.
            None if qtype != RecordType::CNAME => self
                .cache
                .lookup_answer(now, &CacheKey::internet(current.clone(), RecordType::CNAME))?,
            None => return None,
        };

        let (answers, rcode, soa_rrs, validated) = match answer {
            CachedAnswer::Positive { rrs, validated, .. } => {
                (rrs, Rcode::NoError, Vec::new(), validated)
            }
            CachedAnswer::Negative { soa_rrs, rcode, .. } => (Vec::new(), rcode, soa_rrs, false),
            CachedAnswer::Failed { rcode, .. } => (Vec::new(), rcode, Vec::new(), false),
        };

        let mut message = Message {
            header: Header {
                qr: true,
                // Only the low four bits fit the header; extended rcodes
                // would need an OPT, which cached failures never carry.
                rcode: (rcode.to_u16() & 0x0F) as u8,
                ad: validated,
                ..Header::default()
            },
            questions: vec![Question {
                name: qname.clone(),
                qtype,
                qclass: crate::dns::enums::RecordClass::IN,
            }],
            answers: chain.to_vec(),
            authorities: soa_rrs,
            additionals: Vec::new(),
            edns: None,
        };
        message.answers.extend(answers);
        message.header.ancount = message.answers.len() as u16;
        message.header.nscount = message.authorities.len() as u16;

        debug!(%current, %qtype, %rcode, "answered from cache");
        Some(Reply {
            message,
            zone: current.clone(),
            secure: validated,
            transport: Transport::Cache,
            bytes: 0,
        })
    }
}

/// If the answers carry a CNAME for `current` (and the question was not for
/// the CNAME itself), the target to continue with. A server returning both
/// the CNAME and the queried type for one owner is broken.
fn cname_target(
    answers: &[ResourceRecord],
    current: &Name,
    qtype: RecordType,
) -> Result<Option<Name>> {
    if qtype == RecordType::CNAME {
        return Ok(None);
    }
    let cname = answers.iter().find_map(|rr| match &rr.rdata {
        RData::CNAME(target) if rr.name == *current => Some(target.clone()),
        _ => None,
    });
    let has_direct = answers
        .iter()
        .any(|rr| rr.name == *current && rr.rtype == qtype);
    match (cname, has_direct) {
        (Some(_), true) => Err(ResolveError::UnexpectedRdata(format!(
            "{current} answers both CNAME and {qtype}"
        ))),
        (Some(target), false) => Ok(Some(target)),
        (None, _) => Ok(None),
    }
}

/// Put the original question back on a reply that answered the end of a
/// CNAME chain.
fn restore_question(message: &mut Message, qname: &Name, qtype: RecordType) {
    message.questions = vec![Question {
        name: qname.clone(),
        qtype,
        qclass: crate::dns::enums::RecordClass::IN,
    }];
    message.header.qdcount = 1;
}
