//! Error types for model primitives

/// Errors produced while building or parsing folios
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FolioError {
    /// String does not match the folio grammar
    #[error("malformed folio '{folio}': {reason}")]
    Malformed {
        /// The rejected input
        folio: String,
        /// Which rule rejected it
        reason: &'static str,
    },

    /// Year cannot be expressed with two digits
    #[error("year {0} outside 2000..=2099")]
    YearOutOfRange(u16),

    /// Category code is not three uppercase ASCII letters
    #[error("invalid category code: '{0}'")]
    InvalidCategoryCode(String),

    /// Institution code is not 2-10 uppercase ASCII letters
    #[error("invalid institution code: '{0}'")]
    InvalidInstitutionCode(String),

    /// Consecutive numbers start at 1
    #[error("consecutive number must be at least 1")]
    ZeroConsecutive,
}

impl FolioError {
    #[inline]
    pub(crate) fn malformed(folio: &str, reason: &'static str) -> Self {
        Self::Malformed {
            folio: folio.to_string(),
            reason,
        }
    }
}

/// Error for string forms of enums and identifiers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: '{value}'")]
pub struct ParseError {
    /// Type being parsed
    pub kind: &'static str,
    /// Rejected input
    pub value: String,
}

impl ParseError {
    #[inline]
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
