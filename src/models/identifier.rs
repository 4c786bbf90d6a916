//! Content identifier type and extraction.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Canonical length of a content identifier.
pub const ID_LENGTH: usize = 36;

/// The 8-4-4-4-12 hex shape every identifier has on the wire.
static ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("[0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{12}")
        .expect("identifier pattern is a valid regex")
});

/// Opaque token uniquely naming one content item.
///
/// Compared by value. Construction normalizes longer representations
/// (e.g. a URL ending in an identifier) down to the canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Normalize a raw value to canonical form.
    ///
    /// Anything longer than [`ID_LENGTH`] characters is reduced to its
    /// trailing [`ID_LENGTH`] characters; shorter or exact values pass
    /// through unchanged.
    pub fn normalize(raw: &str) -> Self {
        let trimmed = raw.trim();
        let count = trimmed.chars().count();
        if count > ID_LENGTH {
            Self(trimmed.chars().skip(count - ID_LENGTH).collect())
        } else {
            Self(trimmed.to_string())
        }
    }

    /// Extract every identifier-shaped token from free text, in order of
    /// appearance. Duplicates are preserved; callers dedup against their
    /// own seen-sets.
    pub fn extract_all(text: &str) -> Vec<ContentId> {
        ID_REGEX
            .find_iter(text)
            .map(|m| ContentId(m.as_str().to_string()))
            .collect()
    }

    /// Whether a string is already in canonical form.
    pub fn is_canonical(raw: &str) -> bool {
        raw.len() == ID_LENGTH && ID_REGEX.is_match(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
