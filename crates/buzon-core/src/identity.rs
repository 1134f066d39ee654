//! Identity resolver
//!
//! Turns the submitter's privacy flags into one [`IdentityDecision`]. The
//! decision is made once at intake; nothing downstream looks at the raw
//! flags again.

use crate::config::ConfidentialPolicy;
use crate::error::{DeskError, DeskResult};
use buzon_model::SubmitterId;
use buzon_store::{Datastore, IdentityStore, SubmitterProfile};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Privacy flags as submitted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacyChoice {
    pub confidential: bool,
    pub contact_authorized: bool,
    pub email: Option<String>,
}

impl PrivacyChoice {
    #[must_use]
    pub fn confidential(email: Option<&str>) -> Self {
        Self {
            confidential: true,
            contact_authorized: false,
            email: email.map(str::to_string),
        }
    }

    #[must_use]
    pub fn contact_authorized(email: &str) -> Self {
        Self {
            confidential: false,
            contact_authorized: true,
            email: Some(email.to_string()),
        }
    }
}

/// Outcome of identity resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "submitter_id", rename_all = "snake_case")]
pub enum IdentityDecision {
    /// No identity is linked
    Anonymous,
    /// Linked identity visible only to privileged readers
    ConfidentialRecord(SubmitterId),
    /// Linked identity visible to staff
    ContactAuthorized(SubmitterId),
}

impl IdentityDecision {
    #[inline]
    #[must_use]
    pub fn submitter(&self) -> Option<SubmitterId> {
        match self {
            Self::Anonymous => None,
            Self::ConfidentialRecord(id) | Self::ContactAuthorized(id) => Some(*id),
        }
    }

    #[inline]
    #[must_use]
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::ConfidentialRecord(_) => "confidential",
            Self::ContactAuthorized(_) => "contact_authorized",
        }
    }
}

/// Trim and lowercase
#[must_use]
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn is_email_shaped(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

/// Checks the flags and returns the normalized email, if any
///
/// # Errors
/// [`DeskError::ConflictingPrivacyFlags`], [`DeskError::MissingPrivacyChoice`],
/// [`DeskError::MissingContactEmail`], or [`DeskError::InvalidSubmission`]
/// for an email that is not `local@domain` shaped
pub fn validate_choice(choice: &PrivacyChoice) -> DeskResult<Option<String>> {
    match (choice.confidential, choice.contact_authorized) {
        (true, true) => return Err(DeskError::ConflictingPrivacyFlags),
        (false, false) => return Err(DeskError::MissingPrivacyChoice),
        _ => {}
    }

    let email = choice
        .email
        .as_deref()
        .map(normalize_email)
        .filter(|e| !e.is_empty());

    match email {
        None if choice.contact_authorized => Err(DeskError::MissingContactEmail),
        Some(e) if !is_email_shaped(&e) => Err(DeskError::invalid_submission("email is not valid")),
        other => Ok(other),
    }
}

/// Resolves privacy flags against the identity store
pub struct IdentityResolver<S: ?Sized = dyn Datastore> {
    store: Arc<S>,
    policy: ConfidentialPolicy,
}

impl<S: IdentityStore + ?Sized> IdentityResolver<S> {
    #[must_use]
    pub fn new(store: Arc<S>, policy: ConfidentialPolicy) -> Self {
        Self { store, policy }
    }

    /// Validate `choice` and look up or create the identity it calls for
    ///
    /// # Errors
    /// Validation errors from [`validate_choice`]; [`DeskError::Storage`]
    pub fn resolve(
        &self,
        choice: &PrivacyChoice,
        profile: &SubmitterProfile,
        at: DateTime<Utc>,
    ) -> DeskResult<IdentityDecision> {
        let email = validate_choice(choice)?;

        let decision = match email {
            Some(email) if choice.contact_authorized => {
                let record = self.store.upsert_identity(&email, false, profile, at)?;
                IdentityDecision::ContactAuthorized(record.id)
            }
            Some(email) if self.policy == ConfidentialPolicy::HiddenRecord => {
                let record = self.store.upsert_identity(&email, true, profile, at)?;
                IdentityDecision::ConfidentialRecord(record.id)
            }
            _ => IdentityDecision::Anonymous,
        };

        tracing::debug!(mode = decision.mode(), "resolved submitter identity");
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buzon_store::{now, InMemoryStore};

    fn resolver(policy: ConfidentialPolicy) -> (Arc<InMemoryStore>, IdentityResolver<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (Arc::clone(&store), IdentityResolver::new(store, policy))
    }

    #[test]
    fn flags_are_mutually_exclusive() {
        let both = PrivacyChoice {
            confidential: true,
            contact_authorized: true,
            email: Some("a@uni.mx".into()),
        };
        assert!(matches!(validate_choice(&both), Err(DeskError::ConflictingPrivacyFlags)));
        assert!(matches!(
            validate_choice(&PrivacyChoice::default()),
            Err(DeskError::MissingPrivacyChoice)
        ));
    }

    #[test]
    fn contact_requires_email() {
        for email in [None, Some(""), Some("   ")] {
            let choice = PrivacyChoice {
                confidential: false,
                contact_authorized: true,
                email: email.map(str::to_string),
            };
            assert!(matches!(validate_choice(&choice), Err(DeskError::MissingContactEmail)));
        }
    }

    #[test]
    fn malformed_email_is_invalid() {
        for email in ["nobody", "@uni.mx", "a@", "a b@uni.mx", "a@uni.mx.", "a@@uni.mx"] {
            assert!(
                matches!(
                    validate_choice(&PrivacyChoice::contact_authorized(email)),
                    Err(DeskError::InvalidSubmission(_))
                ),
                "accepted {email:?}"
            );
        }
    }

    #[test]
    fn contact_identity_is_reused_and_updated() {
        let (store, resolver) = resolver(ConfidentialPolicy::HiddenRecord);
        let first = resolver
            .resolve(
                &PrivacyChoice::contact_authorized("  Ana@Uni.MX "),
                &SubmitterProfile {
                    display_name: Some("Ana".into()),
                    ..SubmitterProfile::default()
                },
                now(),
            )
            .unwrap();
        let second = resolver
            .resolve(
                &PrivacyChoice::contact_authorized("ana@uni.mx"),
                &SubmitterProfile {
                    phone: Some("961 000 0000".into()),
                    ..SubmitterProfile::default()
                },
                now(),
            )
            .unwrap();

        assert_eq!(first, second);
        let IdentityDecision::ContactAuthorized(id) = second else {
            panic!("expected contact-authorized, got {second:?}");
        };
        let record = store.get_identity(id).unwrap().unwrap();
        assert_eq!(record.email, "ana@uni.mx");
        assert!(!record.confidential);
        assert_eq!(record.profile.display_name.as_deref(), Some("Ana"));
        assert_eq!(record.profile.phone.as_deref(), Some("961 000 0000"));
    }

    #[test]
    fn confidential_policy_decides_record() {
        let choice = PrivacyChoice::confidential(Some("beto@uni.mx"));

        let (store, hidden) = resolver(ConfidentialPolicy::HiddenRecord);
        let decision = hidden.resolve(&choice, &SubmitterProfile::default(), now()).unwrap();
        let IdentityDecision::ConfidentialRecord(id) = decision else {
            panic!("expected confidential record, got {decision:?}");
        };
        assert!(store.get_identity(id).unwrap().unwrap().confidential);

        let (store, none) = resolver(ConfidentialPolicy::NoRecord);
        let decision = none.resolve(&choice, &SubmitterProfile::default(), now()).unwrap();
        assert_eq!(decision, IdentityDecision::Anonymous);
        assert!(store.identities_by_email("beto@uni.mx").unwrap().is_empty());
    }

    #[test]
    fn confidential_without_email_is_anonymous() {
        let (_, resolver) = resolver(ConfidentialPolicy::HiddenRecord);
        for email in [None, Some("  ")] {
            let decision = resolver
                .resolve(&PrivacyChoice::confidential(email), &SubmitterProfile::default(), now())
                .unwrap();
            assert_eq!(decision, IdentityDecision::Anonymous);
        }
    }

    #[test]
    fn confidential_and_visible_identities_stay_apart() {
        let (_, resolver) = resolver(ConfidentialPolicy::HiddenRecord);
        let profile = SubmitterProfile::default();
        let hidden = resolver
            .resolve(&PrivacyChoice::confidential(Some("cami@uni.mx")), &profile, now())
            .unwrap();
        let visible = resolver
            .resolve(&PrivacyChoice::contact_authorized("cami@uni.mx"), &profile, now())
            .unwrap();
        assert_ne!(hidden.submitter(), visible.submitter());
    }
}
