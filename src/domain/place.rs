//! Place identity and coordinates
//!
//! Every place name in the system goes through [`normalize_place_text`] so
//! that lookups are insensitive to case, accents and punctuation.

use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Fold free text into the canonical place form.
///
/// NFD decomposition with combining marks dropped, uppercase, any
/// non-alphanumeric character replaced by a space, whitespace collapsed.
/// `"San Donà di Piave"` and `"SAN-DONA' DI  PIAVE"` both become
/// `"SAN DONA DI PIAVE"`.
pub fn normalize_place_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.nfd().filter(|c| !is_combining_mark(*c)) {
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(c.to_uppercase());
        } else {
            pending_space = true;
        }
    }

    out
}

/// Canonical place identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaceName(String);

impl PlaceName {
    /// Build a canonical name from raw text. Returns `None` when nothing
    /// alphanumeric is left after normalization.
    pub fn new(raw: &str) -> Option<Self> {
        let normalized = normalize_place_text(raw);
        if normalized.is_empty() {
            None
        } else {
            Some(Self(normalized))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in characters, used for longest-match-first ordering
    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }
}

impl std::fmt::Display for PlaceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// WGS84 position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Reject NaN and out-of-range values coming from reference files
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Entry of the known-places reference table
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub name: PlaceName,
    pub coordinates: Coordinates,
}
