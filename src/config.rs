use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use base64::Engine;
use serde::Deserialize;

use crate::dns::name::Name;
use crate::dns::rdata::{Dnskey, Ds};
use crate::dnssec::{TrustAnchor, TrustAnchorSet};
use crate::error::ResolveError;

/// Resolver configuration. Defaults are usable as-is; the environment and an
/// optional TOML file override individual knobs.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Maximum number of cache entries; zero disables all inserts.
    pub cache_size: usize,

    /// Upper bound on the TTL of negative cache entries, in seconds.
    pub negative_min_ttl_cap: u32,

    /// Never query name servers over IPv6.
    pub disable_v6_ns: bool,

    /// Whether upstream queries set the EDNS DO bit by default.
    pub dnssec_ok_default: bool,

    /// Per-attempt timeout for one upstream exchange.
    pub query_timeout: Duration,

    /// UDP retries per server before moving on.
    pub udp_retries: u8,

    /// EDNS advertised UDP payload size.
    pub edns_udp_size: u16,

    /// Port upstream servers are queried on. Only tests and unusual
    /// deployments change this.
    pub upstream_port: u16,

    /// How many NS addresses to try per delegation step.
    pub ns_sample: usize,

    /// Budget of consecutive delegation steps that do not descend into a
    /// strict sub-zone.
    pub max_lateral_steps: u8,

    /// Maximum CNAME chain length followed for one query.
    pub max_cname_chain: u8,

    /// Operator override of the compiled root hint addresses.
    pub root_hint_addrs: Option<Vec<IpAddr>>,

    /// Operator override of the compiled root trust anchors, as
    /// `DS <tag> <alg> <digest-type> <hex>` or
    /// `DNSKEY <flags> <proto> <alg> <base64>` strings.
    pub root_trust_anchors: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_size: 2048,
            negative_min_ttl_cap: 1800,
            disable_v6_ns: false,
            dnssec_ok_default: true,
            query_timeout: Duration::from_secs(5),
            udp_retries: 2,
            edns_udp_size: 1232,
            upstream_port: 53,
            ns_sample: 3,
            max_lateral_steps: 16,
            max_cname_chain: 12,
            root_hint_addrs: None,
            root_trust_anchors: Vec::new(),
        }
    }
}

/// TOML file shape: every key optional, merged over the defaults.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    cache_size: Option<usize>,
    negative_min_ttl_cap: Option<u32>,
    disable_v6_ns: Option<bool>,
    dnssec_ok_default: Option<bool>,
    query_timeout_secs: Option<u64>,
    udp_retries: Option<u8>,
    edns_udp_size: Option<u16>,
    upstream_port: Option<u16>,
    ns_sample: Option<usize>,
    root_hint_addrs: Option<Vec<IpAddr>>,
    root_trust_anchors: Option<Vec<String>>,
}

impl ResolverConfig {
    /// Build a config from defaults plus `MIMIR_*` environment overrides.
    pub fn from_env() -> Result<Self, ResolveError> {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("MIMIR_CACHE_SIZE") {
            config.cache_size = value.parse().map_err(|_| {
                ResolveError::BadConfiguration(format!("invalid MIMIR_CACHE_SIZE: {value}"))
            })?;
        }
        if let Ok(value) = std::env::var("MIMIR_NEGATIVE_TTL_CAP") {
            config.negative_min_ttl_cap = value.parse().map_err(|_| {
                ResolveError::BadConfiguration(format!("invalid MIMIR_NEGATIVE_TTL_CAP: {value}"))
            })?;
        }
        if let Ok(value) = std::env::var("MIMIR_DISABLE_V6_NS") {
            config.disable_v6_ns = parse_bool(&value);
        }
        if let Ok(value) = std::env::var("MIMIR_DNSSEC_OK") {
            config.dnssec_ok_default = parse_bool(&value);
        }
        if let Ok(value) = std::env::var("MIMIR_QUERY_TIMEOUT") {
            let secs: u64 = value.parse().map_err(|_| {
                ResolveError::BadConfiguration(format!("invalid MIMIR_QUERY_TIMEOUT: {value}"))
            })?;
            if secs == 0 {
                return Err(ResolveError::BadConfiguration(
                    "MIMIR_QUERY_TIMEOUT must be greater than 0".to_string(),
                ));
            }
            config.query_timeout = Duration::from_secs(secs);
        }
        if let Ok(value) = std::env::var("MIMIR_UPSTREAM_PORT") {
            config.upstream_port = value.parse().map_err(|_| {
                ResolveError::BadConfiguration(format!("invalid MIMIR_UPSTREAM_PORT: {value}"))
            })?;
        }
        if let Ok(value) = std::env::var("MIMIR_ROOT_HINTS") {
            let addrs: Result<Vec<IpAddr>, _> =
                value.split(',').map(|s| s.trim().parse()).collect();
            config.root_hint_addrs = Some(addrs.map_err(|_| {
                ResolveError::BadConfiguration(format!("invalid MIMIR_ROOT_HINTS: {value}"))
            })?);
        }
        if let Ok(value) = std::env::var("MIMIR_TRUST_ANCHORS") {
            config.root_trust_anchors = value.split(';').map(|s| s.trim().to_string()).collect();
        }

        Ok(config)
    }

    /// Load a TOML config file and merge it over the defaults.
    pub fn load(path: &Path) -> Result<Self, ResolveError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ResolveError::BadConfiguration(format!("cannot read {}: {e}", path.display()))
        })?;
        let file: ConfigFile = toml::from_str(&text).map_err(|e| {
            ResolveError::BadConfiguration(format!("cannot parse {}: {e}", path.display()))
        })?;

        let mut config = Self::default();
        if let Some(v) = file.cache_size {
            config.cache_size = v;
        }
        if let Some(v) = file.negative_min_ttl_cap {
            config.negative_min_ttl_cap = v;
        }
        if let Some(v) = file.disable_v6_ns {
            config.disable_v6_ns = v;
        }
        if let Some(v) = file.dnssec_ok_default {
            config.dnssec_ok_default = v;
        }
        if let Some(v) = file.query_timeout_secs {
            if v == 0 {
                return Err(ResolveError::BadConfiguration(
                    "query_timeout_secs must be greater than 0".to_string(),
                ));
            }
            config.query_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.udp_retries {
            config.udp_retries = v;
        }
        if let Some(v) = file.edns_udp_size {
            config.edns_udp_size = v;
        }
        if let Some(v) = file.upstream_port {
            config.upstream_port = v;
        }
        if let Some(v) = file.ns_sample {
            config.ns_sample = v;
        }
        if let Some(v) = file.root_hint_addrs {
            config.root_hint_addrs = Some(v);
        }
        if let Some(v) = file.root_trust_anchors {
            config.root_trust_anchors = v;
        }
        Ok(config)
    }

    /// The trust anchors this configuration establishes: operator-supplied
    /// if any were given, the compiled IANA root DS set otherwise.
    pub fn trust_anchor_set(&self) -> Result<TrustAnchorSet, ResolveError> {
        if self.root_trust_anchors.is_empty() {
            return Ok(TrustAnchorSet::root_default());
        }
        let anchors: Result<Vec<TrustAnchor>, ResolveError> = self
            .root_trust_anchors
            .iter()
            .map(|line| parse_trust_anchor(line))
            .collect();
        Ok(TrustAnchorSet::from_anchors(anchors?))
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Parse one configured root trust anchor line.
fn parse_trust_anchor(line: &str) -> Result<TrustAnchor, ResolveError> {
    let bad = |why: &str| ResolveError::BadConfiguration(format!("trust anchor {line:?}: {why}"));
    let fields: Vec<&str> = line.split_whitespace().collect();
    match fields.as_slice() {
        ["DS", tag, alg, digest_type, digest] => Ok(TrustAnchor::Ds {
            owner: Name::root(),
            ds: Ds {
                key_tag: tag.parse().map_err(|_| bad("bad key tag"))?,
                algorithm: alg.parse().map_err(|_| bad("bad algorithm"))?,
                digest_type: digest_type.parse().map_err(|_| bad("bad digest type"))?,
                digest: hex::decode(digest).map_err(|_| bad("bad digest hex"))?,
            },
        }),
        ["DNSKEY", flags, protocol, alg, key] => Ok(TrustAnchor::Key {
            owner: Name::root(),
            key: Dnskey {
                flags: flags.parse().map_err(|_| bad("bad flags"))?,
                protocol: protocol.parse().map_err(|_| bad("bad protocol"))?,
                algorithm: alg.parse().map_err(|_| bad("bad algorithm"))?,
                public_key: base64::engine::general_purpose::STANDARD
                    .decode(key)
                    .map_err(|_| bad("bad key base64"))?,
            },
        }),
        _ => Err(bad("expected 'DS tag alg digest-type hex' or 'DNSKEY flags proto alg base64'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = ResolverConfig::default();
        assert_eq!(config.cache_size, 2048);
        assert_eq!(config.negative_min_ttl_cap, 1800);
        assert!(config.dnssec_ok_default);
        assert_eq!(config.query_timeout, Duration::from_secs(5));
        assert_eq!(config.udp_retries, 2);
        assert_eq!(config.edns_udp_size, 1232);
        assert_eq!(config.upstream_port, 53);
    }

    #[test]
    fn ds_anchor_line_parses() {
        let anchor = parse_trust_anchor(
            "DS 20326 8 2 E06D44B80B8F1D39A95C0B0D7C65D08458E880409BBC683457104237C7F8EC8D",
        )
        .unwrap();
        match anchor {
            TrustAnchor::Ds { owner, ds } => {
                assert!(owner.is_root());
                assert_eq!(ds.key_tag, 20326);
                assert_eq!(ds.digest.len(), 32);
            }
            _ => panic!("expected a DS anchor"),
        }
    }

    #[test]
    fn malformed_anchor_lines_are_rejected() {
        assert!(parse_trust_anchor("DS 20326 8 2").is_err());
        assert!(parse_trust_anchor("DS x 8 2 AA").is_err());
        assert!(parse_trust_anchor("NSEC nonsense").is_err());
    }

    #[test]
    fn empty_anchor_config_falls_back_to_compiled_roots() {
        let config = ResolverConfig::default();
        let set = config.trust_anchor_set().unwrap();
        assert_eq!(set.ds_for(&Name::root()).len(), 2);
    }
}
