use crate::error::ParseError;
use crate::parser::{self, value_needs_quoting};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Which of the two tag-list schemes a [`Urn`] was parsed/built as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// `cap:...` — a capability URN, matched by the host's routing table.
    Cap,
    /// `media:...` — a media-shape URN, matched by the `satisfies` relation.
    Media,
}

impl Scheme {
    fn prefix(self) -> &'static str {
        match self {
            Scheme::Cap => "cap:",
            Scheme::Media => "media:",
        }
    }
}

/// The wildcard value. A tag whose value is `*` matches any value the other side has
/// for that key, and does not contribute to [`Urn::specificity`].
pub const WILDCARD: &str = "*";

/// A parsed and canonicalizable capability or media URN.
///
/// Keys are always lower-cased. Values are stored exactly as given (quoting is a
/// serialization concern, decided fresh every time [`Urn::canonical`] runs).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Urn {
    scheme: Scheme,
    tags: BTreeMap<String, String>,
}

impl Urn {
    /// Parses a `cap:...` string.
    pub fn parse_cap(input: &str) -> Result<Self, ParseError> {
        let tags = parser::parse_cap_body(input)?;
        Ok(Urn {
            scheme: Scheme::Cap,
            tags,
        })
    }

    /// Parses a `media:...` string.
    pub fn parse_media(input: &str) -> Result<Self, ParseError> {
        let tags = parser::parse_media_body(input)?;
        Ok(Urn {
            scheme: Scheme::Media,
            tags,
        })
    }

    /// Parses either scheme, inferring it from the prefix.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        if input.len() >= 4 && input[..4].eq_ignore_ascii_case("cap:") {
            Self::parse_cap(input)
        } else {
            Self::parse_media(input)
        }
    }

    /// The URN's scheme.
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Looks up a tag's value by key (case-insensitive key match).
    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    /// `true` if this URN has `key` set to exactly `value` (byte-exact, case-sensitive
    /// value comparison; `key` is matched case-insensitively).
    pub fn has(&self, key: &str, value: &str) -> bool {
        self.get(key) == Some(value)
    }

    /// Iterator over this URN's tags, in canonical (sorted) key order.
    pub fn tags(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns a copy of this URN with `key` set to `value`, replacing any existing
    /// value for that key.
    pub fn with_tag(&self, key: &str, value: &str) -> Result<Self, ParseError> {
        let key = parser::validate_key(key)?;
        let mut tags = self.tags.clone();
        tags.insert(key, value.to_string());
        Ok(Urn {
            scheme: self.scheme,
            tags,
        })
    }

    /// Returns a copy of this URN with `key` removed, if present.
    pub fn without_tag(&self, key: &str) -> Self {
        let mut tags = self.tags.clone();
        tags.remove(&key.to_ascii_lowercase());
        Urn {
            scheme: self.scheme,
            tags,
        }
    }

    /// The number of tags whose value is not the wildcard `*`. Used to rank competing
    /// capability matches: a more specific match wins.
    pub fn specificity(&self) -> usize {
        self.tags.values().filter(|v| v.as_str() != WILDCARD).count()
    }

    /// `true` if, for every key present in both URNs, the values agree or one side is
    /// the wildcard. Keys present in only one URN never conflict.
    pub fn is_compatible_with(&self, other: &Self) -> bool {
        for (k, v) in &self.tags {
            if let Some(ov) = other.tags.get(k) {
                if v != WILDCARD && ov != WILDCARD && v != ov {
                    return false;
                }
            }
        }
        true
    }

    /// `true` if `self` (a published capability) matches `request` (a lookup query):
    /// every tag the request specifies is either absent from `self`, wildcarded on
    /// either side, or equal.
    pub fn matches(&self, request: &Self) -> bool {
        for (k, rv) in &request.tags {
            match self.tags.get(k) {
                None => continue,
                Some(cv) => {
                    if cv != WILDCARD && rv != WILDCARD && cv != rv {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// `true` if `self` is compatible with `other` and strictly more specific.
    pub fn is_more_specific_than(&self, other: &Self) -> bool {
        self.is_compatible_with(other) && self.specificity() > other.specificity()
    }

    /// `true` if every tag `pattern` specifies is present in `self` with an identical
    /// value. Unlike [`Urn::matches`], this is not wildcard-aware: it is the
    /// "satisfies" relation used to decide whether a media instance meets a media
    /// pattern, and pattern tags are never optional wildcards, they are requirements.
    pub fn satisfies(&self, pattern: &Self) -> bool {
        for (k, pv) in &pattern.tags {
            if self.tags.get(k) != Some(pv) {
                return false;
            }
        }
        true
    }

    /// The canonical textual form: scheme prefix, keys sorted lexicographically,
    /// values quoted exactly when they contain a structural separator or whitespace.
    pub fn canonical(&self) -> String {
        let mut out = String::from(self.scheme.prefix());
        for (i, (k, v)) in self.tags.iter().enumerate() {
            if i > 0 {
                out.push(';');
            }
            out.push_str(k);
            out.push('=');
            if value_needs_quoting(v) {
                out.push('"');
                for c in v.chars() {
                    if c == '"' || c == '\\' {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push('"');
            } else {
                out.push_str(v);
            }
        }
        out
    }

    /// SHA-256 digest of the canonical textual form. Two URNs that compare equal
    /// always produce the same digest.
    pub fn content_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical().as_bytes());
        hasher.finalize().into()
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// Picks the best-matching item in `items` for `request`, i.e. the most specific
/// compatible match. Ties are broken by insertion order: the first maximally
/// specific match in iteration order wins.
pub fn best_match<'a, T>(
    items: impl IntoIterator<Item = &'a T>,
    urn_of: impl Fn(&T) -> &Urn,
    request: &Urn,
) -> Option<&'a T> {
    let mut best: Option<(&T, usize)> = None;
    for item in items {
        let urn = urn_of(item);
        if !urn.matches(request) {
            continue;
        }
        let specificity = urn.specificity();
        match best {
            Some((_, best_spec)) if specificity <= best_spec => {}
            _ => best = Some((item, specificity)),
        }
    }
    best.map(|(item, _)| item)
}

/// A builder for constructing [`Urn`]s programmatically without going through the
/// textual grammar. Unlike [`Urn::parse`], values are accepted verbatim: quoting is
/// purely a serialization concern decided by [`Urn::canonical`].
pub struct UrnBuilder {
    scheme: Scheme,
    tags: BTreeMap<String, String>,
}

impl UrnBuilder {
    /// Starts building a `cap:` URN.
    pub fn cap() -> Self {
        UrnBuilder {
            scheme: Scheme::Cap,
            tags: BTreeMap::new(),
        }
    }

    /// Starts building a `media:` URN.
    pub fn media() -> Self {
        UrnBuilder {
            scheme: Scheme::Media,
            tags: BTreeMap::new(),
        }
    }

    /// Adds a tag. Fails if `key` is malformed or already set.
    pub fn tag(mut self, key: &str, value: &str) -> Result<Self, ParseError> {
        let key = parser::validate_key(key)?;
        if self.tags.contains_key(&key) {
            return Err(ParseError::DuplicateKey { pos: 0, key });
        }
        self.tags.insert(key, value.to_string());
        Ok(self)
    }

    /// Consumes the builder, producing the finished [`Urn`].
    pub fn build(self) -> Urn {
        Urn {
            scheme: self.scheme,
            tags: self.tags,
        }
    }
}
