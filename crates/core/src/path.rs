//! Route canonicalization.
//!
//! Every route that reaches the authorization layer (from a grant row, a
//! screen, or the navigation guard) is folded into a [`PathKey`] first, so
//! lookups are plain string equality on the canonical form.

use std::borrow::Borrow;

use serde::{Deserialize, Deserializer, Serialize};

/// Canonical, normalized absolute route.
///
/// Invariants (upheld by [`normalize`], the only constructor):
/// - starts with `/`
/// - no query string or fragment
/// - no trailing slash unless the key is exactly `/`
/// - no run of two or more slashes
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PathKey(String);

impl PathKey {
    /// The root key (`/`).
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Normalize `raw` into a key. Same as [`normalize`].
    pub fn new(raw: &str) -> Self {
        normalize(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Ordered ancestor prefixes, shortest first, excluding the key itself
    /// and the root.
    ///
    /// `/a/b/c` yields `/a`, `/a/b`. Root and single-segment keys yield
    /// nothing.
    pub fn ancestors(&self) -> impl Iterator<Item = &str> + '_ {
        self.0
            .match_indices('/')
            .map(|(idx, _)| idx)
            .filter(|&idx| idx > 0)
            .map(|idx| &self.0[..idx])
    }

    /// Whether `self` is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &PathKey) -> bool {
        other.ancestors().any(|prefix| prefix == self.as_str())
    }
}

/// Canonicalize a raw route string.
///
/// Total (never fails) and idempotent. Truncates at the first `?` or `#`,
/// collapses repeated slashes, drops a trailing slash, and prepends a leading
/// one. Empty input (or input that is only separators) becomes `/`.
pub fn normalize(raw: &str) -> PathKey {
    let end = raw.find(['?', '#']).unwrap_or(raw.len());

    let mut key = String::with_capacity(end + 1);
    for segment in raw[..end].split('/').filter(|s| !s.is_empty()) {
        key.push('/');
        key.push_str(segment);
    }

    if key.is_empty() {
        key.push('/');
    }

    PathKey(key)
}

impl core::fmt::Display for PathKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PathKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for PathKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PathKey {
    fn from(value: &str) -> Self {
        normalize(value)
    }
}

impl From<String> for PathKey {
    fn from(value: String) -> Self {
        normalize(&value)
    }
}

// Deserialization goes through the normalizer so a key read from the outside
// can never violate the invariants.
impl<'de> Deserialize<'de> for PathKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(normalize(&raw))
    }
}
