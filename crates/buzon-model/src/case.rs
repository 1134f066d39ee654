//! Case enums
//!
//! Every enum has a stable snake_case string form shared by serde, storage
//! columns and the CLI.

use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Submission medium, part of the folio sequence key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Paper form dropped in a physical mailbox, captured by staff
    Physical,
    /// Web form
    Digital,
}

impl Channel {
    /// Single-letter marker used in the folio
    #[inline]
    #[must_use]
    pub const fn marker(self) -> char {
        match self {
            Channel::Physical => 'P',
            Channel::Digital => 'D',
        }
    }

    /// Inverse of [`Channel::marker`]
    #[inline]
    #[must_use]
    pub const fn from_marker(marker: char) -> Option<Self> {
        match marker {
            'P' => Some(Channel::Physical),
            'D' => Some(Channel::Digital),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Channel::Physical => "physical",
            Channel::Digital => "digital",
        }
    }
}

/// What the submitter is telling the institution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseKind {
    Complaint,
    Suggestion,
    Commendation,
}

impl CaseKind {
    /// Complaints and suggestions carry area and improvement fields;
    /// commendations do not.
    #[inline]
    #[must_use]
    pub const fn accepts_improvement_fields(self) -> bool {
        !matches!(self, CaseKind::Commendation)
    }

    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            CaseKind::Complaint => "complaint",
            CaseKind::Suggestion => "suggestion",
            CaseKind::Commendation => "commendation",
        }
    }
}

/// Workflow status of a case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Received,
    InProgress,
    Addressed,
    Closed,
}

impl CaseStatus {
    /// All statuses in workflow order
    pub const ALL: [CaseStatus; 4] = [
        CaseStatus::Received,
        CaseStatus::InProgress,
        CaseStatus::Addressed,
        CaseStatus::Closed,
    ];

    /// No transition leaves a terminal status
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, CaseStatus::Closed)
    }

    /// Statuses that present the case as resolved to the submitter.
    /// Entering one requires resolution notes and stamps `resolved_at`.
    #[inline]
    #[must_use]
    pub const fn is_resolution(self) -> bool {
        matches!(self, CaseStatus::Addressed | CaseStatus::Closed)
    }

    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            CaseStatus::Received => "received",
            CaseStatus::InProgress => "in_progress",
            CaseStatus::Addressed => "addressed",
            CaseStatus::Closed => "closed",
        }
    }
}

/// Staff-assigned urgency
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

macro_rules! string_form {
    ($ty:ident, $kind:literal, [$($variant:ident),+ $(,)?]) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s == $ty::$variant.as_str() {
                        return Ok($ty::$variant);
                    }
                )+
                Err(ParseError::new($kind, s))
            }
        }
    };
}

string_form!(Channel, "channel", [Physical, Digital]);
string_form!(CaseKind, "case kind", [Complaint, Suggestion, Commendation]);
string_form!(CaseStatus, "case status", [Received, InProgress, Addressed, Closed]);
string_form!(Priority, "priority", [Low, Medium, High]);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_markers_round_trip() {
        for channel in [Channel::Physical, Channel::Digital] {
            assert_eq!(Channel::from_marker(channel.marker()), Some(channel));
        }
        assert_eq!(Channel::from_marker('X'), None);
    }

    #[test]
    fn status_string_forms() {
        for status in CaseStatus::ALL {
            assert_eq!(status.to_string().parse::<CaseStatus>().unwrap(), status);
        }
        assert_eq!(CaseStatus::InProgress.as_str(), "in_progress");
        assert!("open".parse::<CaseStatus>().is_err());
    }

    #[test]
    fn serde_matches_string_form() {
        let json = serde_json::to_string(&CaseStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let kind: CaseKind = serde_json::from_str("\"commendation\"").unwrap();
        assert_eq!(kind, CaseKind::Commendation);
    }

    #[test]
    fn resolution_statuses() {
        assert!(!CaseStatus::Received.is_resolution());
        assert!(!CaseStatus::InProgress.is_resolution());
        assert!(CaseStatus::Addressed.is_resolution());
        assert!(CaseStatus::Closed.is_resolution());
        assert!(CaseStatus::Closed.is_terminal());
        assert!(!CaseStatus::Addressed.is_terminal());
    }

    #[test]
    fn commendations_have_no_improvement_fields() {
        assert!(CaseKind::Complaint.accepts_improvement_fields());
        assert!(CaseKind::Suggestion.accepts_improvement_fields());
        assert!(!CaseKind::Commendation.accepts_improvement_fields());
    }
}
