//! Folio grammar
//!
//! A folio is the public tracking code handed to the submitter:
//!
//! ```text
//! D0007-ACA-UNACH-25
//! │└┬─┘ └┬┘ └─┬─┘ └┤
//! │ │    │    │    └ two-digit year
//! │ │    │    └ institution code
//! │ │    └ category code
//! │ └ consecutive, zero-padded to four digits
//! └ channel marker
//! ```
//!
//! Formatting and parsing are exact inverses for every valid input.

use crate::case::Channel;
use crate::category::CategoryCode;
use crate::error::FolioError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Institution code used when none is configured
pub const DEFAULT_INSTITUTION: &str = "UNACH";

const PAD_WIDTH: usize = 4;

static FOLIO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([PD])([0-9]{4,})-([A-Z]{3})-([A-Z]{2,10})-([0-9]{2})$")
        .unwrap_or_else(|e| panic!("folio pattern must compile: {e}"))
});

/// Calendar year of a folio, restricted to what two digits can express
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Year(u16);

impl Year {
    pub const MIN: u16 = 2000;
    pub const MAX: u16 = 2099;

    /// # Errors
    ///
    /// [`FolioError::YearOutOfRange`] outside `2000..=2099`
    pub fn new(year: u16) -> Result<Self, FolioError> {
        if (Self::MIN..=Self::MAX).contains(&year) {
            Ok(Self(year))
        } else {
            Err(FolioError::YearOutOfRange(year))
        }
    }

    /// Inverse of [`Year::two_digit`]
    pub fn from_two_digit(yy: u8) -> Result<Self, FolioError> {
        Self::new(Self::MIN + u16::from(yy))
    }

    #[inline]
    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn two_digit(self) -> u8 {
        // Range check in `new` keeps this below 100
        (self.0 - Self::MIN) as u8
    }
}

impl TryFrom<u16> for Year {
    type Error = FolioError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Year> for u16 {
    fn from(year: Year) -> Self {
        year.0
    }
}

impl fmt::Display for Year {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Institution segment, 2 to 10 uppercase ASCII letters
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstitutionCode(String);

impl InstitutionCode {
    /// # Errors
    ///
    /// [`FolioError::InvalidInstitutionCode`] when the code breaks the grammar
    pub fn new(code: impl Into<String>) -> Result<Self, FolioError> {
        let code = code.into();
        let valid = (2..=10).contains(&code.len()) && code.bytes().all(|b| b.is_ascii_uppercase());
        if valid {
            Ok(Self(code))
        } else {
            Err(FolioError::InvalidInstitutionCode(code))
        }
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for InstitutionCode {
    fn default() -> Self {
        Self(DEFAULT_INSTITUTION.to_string())
    }
}

impl TryFrom<String> for InstitutionCode {
    type Error = FolioError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<InstitutionCode> for String {
    fn from(code: InstitutionCode) -> Self {
        code.0
    }
}

impl FromStr for InstitutionCode {
    type Err = FolioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for InstitutionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rendered folio string
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Folio(String);

impl Folio {
    /// Wrap a string previously produced by [`FolioFormatter::format`],
    /// e.g. one read back from storage
    #[inline]
    #[must_use]
    pub fn from_issued(folio: impl Into<String>) -> Self {
        Self(folio.into())
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Folio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Folio {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Decoded folio components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolioParts {
    pub channel: Channel,
    pub year: Year,
    pub consecutive: u64,
    pub category: CategoryCode,
}

/// Renders and parses folios for one institution
#[derive(Debug, Clone, Default)]
pub struct FolioFormatter {
    institution: InstitutionCode,
}

impl FolioFormatter {
    #[must_use]
    pub fn new(institution: InstitutionCode) -> Self {
        Self { institution }
    }

    #[inline]
    #[must_use]
    pub fn institution(&self) -> &InstitutionCode {
        &self.institution
    }

    /// Render a folio
    ///
    /// # Errors
    ///
    /// [`FolioError::ZeroConsecutive`] when `consecutive` is 0
    pub fn format(&self, parts: &FolioParts) -> Result<Folio, FolioError> {
        if parts.consecutive == 0 {
            return Err(FolioError::ZeroConsecutive);
        }
        Ok(Folio(format!(
            "{}{:0width$}-{}-{}-{:02}",
            parts.channel.marker(),
            parts.consecutive,
            parts.category,
            self.institution,
            parts.year.two_digit(),
            width = PAD_WIDTH,
        )))
    }

    /// Parse a folio issued by this institution
    ///
    /// # Errors
    ///
    /// [`FolioError::Malformed`] for any deviation from the grammar,
    /// including a folio from another institution
    pub fn parse(&self, input: &str) -> Result<FolioParts, FolioError> {
        let caps = FOLIO_RE
            .captures(input)
            .ok_or_else(|| FolioError::malformed(input, "does not match folio grammar"))?;

        let marker = caps[1].chars().next().unwrap_or_default();
        let channel = Channel::from_marker(marker)
            .ok_or_else(|| FolioError::malformed(input, "unknown channel marker"))?;

        let digits = &caps[2];
        if digits.len() > PAD_WIDTH && digits.starts_with('0') {
            return Err(FolioError::malformed(input, "leading zeros beyond padding"));
        }
        let consecutive: u64 = digits
            .parse()
            .map_err(|_| FolioError::malformed(input, "consecutive out of range"))?;
        if consecutive == 0 {
            return Err(FolioError::malformed(input, "consecutive must be at least 1"));
        }

        let category = CategoryCode::from_str(&caps[3])
            .map_err(|_| FolioError::malformed(input, "invalid category code"))?;

        if &caps[4] != self.institution.as_str() {
            return Err(FolioError::malformed(input, "institution does not match"));
        }

        let yy: u8 = caps[5]
            .parse()
            .map_err(|_| FolioError::malformed(input, "invalid year"))?;
        let year = Year::from_two_digit(yy).map_err(|_| FolioError::malformed(input, "invalid year"))?;

        Ok(FolioParts {
            channel,
            year,
            consecutive,
            category,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn code(s: &str) -> CategoryCode {
        CategoryCode::from_str(s).unwrap()
    }

    fn parts(channel: Channel, year: u16, consecutive: u64, category: &str) -> FolioParts {
        FolioParts {
            channel,
            year: Year::new(year).unwrap(),
            consecutive,
            category: code(category),
        }
    }

    #[test]
    fn formats_reference_folio() {
        let f = FolioFormatter::default();
        let folio = f.format(&parts(Channel::Digital, 2025, 7, "ACA")).unwrap();
        assert_eq!(folio.as_str(), "D0007-ACA-UNACH-25");
    }

    #[test]
    fn widens_past_padding() {
        let f = FolioFormatter::default();
        let folio = f.format(&parts(Channel::Physical, 2031, 123_456, "INF")).unwrap();
        assert_eq!(folio.as_str(), "P123456-INF-UNACH-31");
        assert_eq!(f.parse(folio.as_str()).unwrap().consecutive, 123_456);
    }

    #[test]
    fn zero_consecutive_is_rejected() {
        let f = FolioFormatter::default();
        assert_eq!(
            f.format(&parts(Channel::Digital, 2025, 0, "ACA")),
            Err(FolioError::ZeroConsecutive)
        );
        assert!(f.parse("D0000-ACA-UNACH-25").is_err());
    }

    #[test]
    fn year_bounds() {
        assert!(Year::new(1999).is_err());
        assert!(Year::new(2100).is_err());
        assert_eq!(Year::new(2000).unwrap().two_digit(), 0);
        assert_eq!(Year::new(2099).unwrap().two_digit(), 99);
        assert_eq!(Year::from_two_digit(25).unwrap().value(), 2025);
    }

    #[test]
    fn rejects_deviations() {
        let f = FolioFormatter::default();
        for bad in [
            "",
            "D0007-ACA-UNACH-25 ",
            "d0007-ACA-UNACH-25",
            "X0007-ACA-UNACH-25",
            "D007-ACA-UNACH-25",
            "D00007-ACA-UNACH-25",
            "D0007-aca-UNACH-25",
            "D0007-ACA-OTHER-25",
            "D0007-ACA-UNACH-2025",
            "D0007-ACA-UNACH-25-extra",
            "D0007ACAUNACH25",
        ] {
            assert!(
                matches!(f.parse(bad), Err(FolioError::Malformed { .. })),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn custom_institution() {
        let f = FolioFormatter::new(InstitutionCode::new("UAM").unwrap());
        let folio = f.format(&parts(Channel::Digital, 2026, 12, "TEC")).unwrap();
        assert_eq!(folio.as_str(), "D0012-TEC-UAM-26");
        assert!(FolioFormatter::default().parse(folio.as_str()).is_err());
    }

    #[test]
    fn institution_code_grammar() {
        assert!(InstitutionCode::new("U").is_err());
        assert!(InstitutionCode::new("ABCDEFGHIJK").is_err());
        assert!(InstitutionCode::new("unach").is_err());
        assert!(InstitutionCode::new("UN4CH").is_err());
        assert_eq!(InstitutionCode::default().as_str(), DEFAULT_INSTITUTION);
    }

    fn arb_parts() -> impl Strategy<Value = FolioParts> {
        (
            prop_oneof![Just(Channel::Physical), Just(Channel::Digital)],
            2000u16..=2099,
            1u64..10_000_000,
            proptest::array::uniform3(b'A'..=b'Z'),
        )
            .prop_map(|(channel, year, consecutive, letters)| FolioParts {
                channel,
                year: Year::new(year).unwrap(),
                consecutive,
                category: CategoryCode::from_bytes(letters).unwrap(),
            })
    }

    proptest! {
        #[test]
        fn parse_inverts_format(p in arb_parts()) {
            let f = FolioFormatter::default();
            let folio = f.format(&p).unwrap();
            prop_assert_eq!(f.parse(folio.as_str()).unwrap(), p);
        }

        #[test]
        fn parse_never_panics(s in "\\PC{0,24}") {
            let _ = FolioFormatter::default().parse(&s);
        }
    }
}
