use tracing::debug;

use crate::dns::name::Name;
use crate::dns::rdata::{Dnskey, Ds};
use crate::dnssec::verify::select_sep_dnskeys;

/// A configured entry point into the DNSSEC chain of trust: either a DS
/// whose digest a zone's SEP DNSKEY must match, or a prevalidated DNSKEY
/// accepted by equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustAnchor {
    Ds { owner: Name, ds: Ds },
    Key { owner: Name, key: Dnskey },
}

impl TrustAnchor {
    pub fn owner(&self) -> &Name {
        match self {
            TrustAnchor::Ds { owner, .. } => owner,
            TrustAnchor::Key { owner, .. } => owner,
        }
    }
}

/// The anchor set the resolver is configured with. Operators may replace the
/// compiled root anchors wholesale; there is no merging.
#[derive(Debug, Clone)]
pub struct TrustAnchorSet {
    anchors: Vec<TrustAnchor>,
}

impl TrustAnchorSet {
    /// The IANA root key-signing keys, as DS records: KSK-2017 (tag 20326)
    /// and KSK-2024 (tag 38696).
    pub fn root_default() -> Self {
        let ksk_2017 = Ds {
            key_tag: 20326,
            algorithm: 8,
            digest_type: 2,
            digest: hex::decode(
                "E06D44B80B8F1D39A95C0B0D7C65D08458E880409BBC683457104237C7F8EC8D",
            )
            .expect("compiled root DS digest is valid hex"),
        };
        let ksk_2024 = Ds {
            key_tag: 38696,
            algorithm: 8,
            digest_type: 2,
            digest: hex::decode(
                "683D2D0ACB8C9B712A1948B27F741219298D0A450D612C483AF444A4C0FB2B16",
            )
            .expect("compiled root DS digest is valid hex"),
        };
        TrustAnchorSet {
            anchors: vec![
                TrustAnchor::Ds {
                    owner: Name::root(),
                    ds: ksk_2017,
                },
                TrustAnchor::Ds {
                    owner: Name::root(),
                    ds: ksk_2024,
                },
            ],
        }
    }

    pub fn from_anchors(anchors: Vec<TrustAnchor>) -> Self {
        TrustAnchorSet { anchors }
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// The DS anchors configured for `owner`.
    pub fn ds_for(&self, owner: &Name) -> Vec<Ds> {
        self.anchors
            .iter()
            .filter_map(|anchor| match anchor {
                TrustAnchor::Ds { owner: o, ds } if o == owner => Some(ds.clone()),
                _ => None,
            })
            .collect()
    }

    /// Select the DNSKEYs out of `keys` this anchor set vouches for: DS
    /// anchors by digest verification, key anchors by rdata equality. Empty
    /// means the chain cannot be entered at `owner`.
    pub fn select_keys(&self, owner: &Name, keys: &[Dnskey]) -> Vec<Dnskey> {
        let mut selected = select_sep_dnskeys(&self.ds_for(owner), owner, keys);
        for anchor in &self.anchors {
            if let TrustAnchor::Key { owner: o, key } = anchor {
                if o == owner && keys.contains(key) && !selected.contains(key) {
                    selected.push(key.clone());
                }
            }
        }
        if selected.is_empty() {
            debug!(%owner, "no configured trust anchor matched the DNSKEY set");
        }
        selected
    }
}

impl Default for TrustAnchorSet {
    fn default() -> Self {
        Self::root_default()
    }
}
