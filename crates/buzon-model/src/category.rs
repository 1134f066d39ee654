//! Category taxonomy
//!
//! The taxonomy is fixed at build time. The three-letter code is what the
//! folio embeds; the numeric id is what submissions reference.

use crate::error::FolioError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Three uppercase ASCII letters
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CategoryCode([u8; 3]);

impl CategoryCode {
    /// Build from a byte triple, validating the alphabet
    pub const fn from_bytes(bytes: [u8; 3]) -> Option<Self> {
        if bytes[0].is_ascii_uppercase() && bytes[1].is_ascii_uppercase() && bytes[2].is_ascii_uppercase() {
            Some(Self(bytes))
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        // Constructors only admit ASCII uppercase
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl fmt::Debug for CategoryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CategoryCode({})", self.as_str())
    }
}

impl fmt::Display for CategoryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategoryCode {
    type Err = FolioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 3] = s
            .as_bytes()
            .try_into()
            .map_err(|_| FolioError::InvalidCategoryCode(s.to_string()))?;
        Self::from_bytes(bytes).ok_or_else(|| FolioError::InvalidCategoryCode(s.to_string()))
    }
}

impl Serialize for CategoryCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CategoryCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Numeric taxonomy reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub u16);

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Taxonomy entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Category {
    pub id: CategoryId,
    pub code: CategoryCode,
    pub label: &'static str,
}

const fn entry(id: u16, code: [u8; 3], label: &'static str) -> Category {
    Category {
        id: CategoryId(id),
        code: CategoryCode(code),
        label,
    }
}

static TAXONOMY: [Category; 7] = [
    entry(1, *b"ACA", "Academic"),
    entry(2, *b"ADM", "Administrative services"),
    entry(3, *b"INF", "Infrastructure and facilities"),
    entry(4, *b"SEG", "Safety and security"),
    entry(5, *b"TRA", "Treatment and conduct"),
    entry(6, *b"TEC", "Technology services"),
    entry(7, *b"OTR", "Other"),
];

/// Every taxonomy entry, ordered by id
#[must_use]
pub fn categories() -> &'static [Category] {
    &TAXONOMY
}

#[must_use]
pub fn category_by_id(id: CategoryId) -> Option<&'static Category> {
    TAXONOMY.iter().find(|c| c.id == id)
}

#[must_use]
pub fn category_by_code(code: CategoryCode) -> Option<&'static Category> {
    TAXONOMY.iter().find(|c| c.code == code)
}
