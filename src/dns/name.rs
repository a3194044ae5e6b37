use std::fmt;

use crate::error::ResolveError;

/// Maximum length of a domain name on the wire (RFC 1035 §2.3.4).
pub const MAX_NAME_WIRE_LEN: usize = 255;
/// Maximum length of a single label.
pub const MAX_LABEL_LEN: usize = 63;

/// A fully-qualified domain name in canonical form.
///
/// The canonical form is lowercase with a trailing root label, so `Name`
/// values compare and hash the way the cache and the verifier need them to.
/// The root is represented as `"."`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(String);

impl Name {
    /// The root name `"."`.
    pub fn root() -> Self {
        Name(".".to_string())
    }

    /// Parse and canonicalize a textual domain name.
    ///
    /// Accepts upper/lower-case labels separated by `.`, with or without a
    /// trailing dot. Rejects names longer than the wire limit, labels longer
    /// than 63 octets, empty labels, names containing `:` or `/`, and
    /// single-label names (no dot anywhere).
    pub fn parse(input: &str) -> Result<Self, ResolveError> {
        if input.is_empty() {
            return Err(ResolveError::IllegalDomain("empty name".to_string()));
        }
        if input == "." {
            return Ok(Self::root());
        }
        if input.contains(':') || input.contains('/') {
            return Err(ResolveError::IllegalDomain(format!(
                "forbidden character in {input:?}"
            )));
        }
        if !input.contains('.') {
            return Err(ResolveError::IllegalDomain(format!(
                "{input:?} has no dot"
            )));
        }

        let stripped = input.strip_suffix('.').unwrap_or(input);
        // 253 chars of presentation form plus the trailing dot is the longest
        // name that still fits in 255 wire octets.
        if stripped.len() > MAX_NAME_WIRE_LEN - 2 {
            return Err(ResolveError::IllegalDomain(format!(
                "{input:?} exceeds the maximum name length"
            )));
        }

        let mut canonical = String::with_capacity(stripped.len() + 1);
        for label in stripped.split('.') {
            if label.is_empty() {
                return Err(ResolveError::IllegalDomain(format!(
                    "empty label in {input:?}"
                )));
            }
            if label.len() > MAX_LABEL_LEN {
                return Err(ResolveError::IllegalDomain(format!(
                    "label longer than 63 octets in {input:?}"
                )));
            }
            canonical.push_str(&label.to_ascii_lowercase());
            canonical.push('.');
        }
        Ok(Name(canonical))
    }

    /// Build a `Name` from already-decoded wire labels.
    ///
    /// Wire names are trusted to satisfy the label limits (the decoder
    /// enforces them); this only canonicalizes case.
    pub(crate) fn from_wire_labels(labels: &[String]) -> Self {
        if labels.is_empty() {
            return Self::root();
        }
        let mut canonical = String::new();
        for label in labels {
            canonical.push_str(&label.to_ascii_lowercase());
            canonical.push('.');
        }
        Name(canonical)
    }

    pub fn is_root(&self) -> bool {
        self.0 == "."
    }

    /// Labels of this name, most-specific first. Empty for the root.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.split('.').filter(|l| !l.is_empty())
    }

    pub fn label_count(&self) -> usize {
        self.labels().count()
    }

    /// The name with the leftmost label removed; `None` for the root.
    pub fn parent(&self) -> Option<Name> {
        if self.is_root() {
            return None;
        }
        match self.0.split_once('.') {
            Some((_, rest)) if rest.is_empty() => Some(Self::root()),
            Some((_, rest)) => Some(Name(rest.to_string())),
            None => None,
        }
    }

    /// All super-domains of this name below the root, shortest first,
    /// including the name itself: `www.example.com.` yields
    /// `[com., example.com., www.example.com.]`.
    pub fn super_domains(&self) -> Vec<Name> {
        let mut chain = Vec::new();
        let mut current = self.clone();
        while !current.is_root() {
            chain.push(current.clone());
            match current.parent() {
                Some(p) => current = p,
                None => break,
            }
        }
        chain.reverse();
        chain
    }

    /// Whether `self` is a strict sub-domain of `other` (label boundaries
    /// respected; a name is not a sub-domain of itself).
    pub fn is_subdomain_of(&self, other: &Name) -> bool {
        if self == other {
            return false;
        }
        if other.is_root() {
            return true;
        }
        self.0.len() > other.0.len() && {
            let tail_start = self.0.len() - other.0.len();
            self.0.ends_with(other.0.as_str())
                && self.0.as_bytes()[tail_start - 1] == b'.'
        }
    }

    /// Prepend a wildcard label, used when reconstructing the owner a
    /// wildcard RRSIG actually covers.
    pub fn with_wildcard(&self) -> Name {
        if self.is_root() {
            Name("*.".to_string())
        } else {
            Name(format!("*.{}", self.0))
        }
    }

    /// Keep only the rightmost `count` labels.
    pub fn trailing_labels(&self, count: usize) -> Name {
        let total = self.label_count();
        if count >= total {
            return self.clone();
        }
        let mut current = self.clone();
        for _ in 0..total - count {
            current = current.parent().unwrap_or_else(Self::root);
        }
        current
    }

    /// Append the uncompressed wire encoding of this name to `buf`.
    pub fn write_wire(&self, buf: &mut Vec<u8>) {
        for label in self.labels() {
            buf.push(label.len() as u8);
            buf.extend_from_slice(label.as_bytes());
        }
        buf.push(0);
    }

    /// Length of the wire encoding in octets.
    pub fn wire_len(&self) -> usize {
        if self.is_root() {
            1
        } else {
            self.0.len() + 1
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.0)
    }
}
