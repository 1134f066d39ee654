//! Desk configuration
//!
//! Loaded from TOML; every section and field has a default, so an empty
//! file is a valid configuration.
//!
//! ```toml
//! institution_code = "UNACH"
//! confidential_policy = "hidden_record"
//!
//! [allocation]
//! max_attempts = 8
//!
//! [attachments]
//! max_bytes = 10485760
//! ```

use crate::error::{DeskError, DeskResult};
use buzon_model::{InstitutionCode, DEFAULT_INSTITUTION};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What a confidential submission with an email leaves behind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidentialPolicy {
    /// Keep an identity row visible only to privileged readers
    #[default]
    HiddenRecord,
    /// Keep nothing; the case is anonymous
    NoRecord,
}

/// Sequence allocation retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl AllocationConfig {
    /// Backoff ceiling before jitter for the given 1-based attempt
    #[must_use]
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        let millis = self.base_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_backoff_ms: 2,
            max_backoff_ms: 50,
        }
    }
}

/// Workflow retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub max_attempts: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self { max_attempts: 8 }
    }
}

/// Attachment limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentConfig {
    pub max_bytes: u64,
    pub max_per_case: usize,
    pub allowed_content_types: Vec<String>,
}

impl AttachmentConfig {
    #[must_use]
    pub fn allows(&self, content_type: &str) -> bool {
        self.allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(content_type))
    }
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            max_per_case: 5,
            allowed_content_types: vec![
                "application/pdf".to_string(),
                "image/jpeg".to_string(),
                "image/png".to_string(),
            ],
        }
    }
}

/// Where the CLI keeps its data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub blob_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("buzon.db"),
            blob_dir: PathBuf::from("buzon-blobs"),
        }
    }
}

/// Desk configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeskConfig {
    /// Institution segment of every folio
    pub institution_code: String,
    pub confidential_policy: ConfidentialPolicy,
    pub allocation: AllocationConfig,
    pub workflow: WorkflowConfig,
    pub attachments: AttachmentConfig,
    pub storage: StorageConfig,
}

impl DeskConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate TOML
    ///
    /// # Errors
    /// [`DeskError::Config`] on syntax errors or invalid values
    pub fn from_toml_str(raw: &str) -> DeskResult<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| DeskError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// [`DeskError::Config`] when the file is unreadable or invalid
    pub fn load(path: impl AsRef<Path>) -> DeskResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| DeskError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// # Errors
    /// [`DeskError::Config`] naming the first offending field
    pub fn validate(&self) -> DeskResult<()> {
        self.institution()?;
        if self.allocation.max_attempts == 0 {
            return Err(DeskError::Config("allocation.max_attempts must be at least 1".into()));
        }
        if self.allocation.base_backoff_ms > self.allocation.max_backoff_ms {
            return Err(DeskError::Config(
                "allocation.base_backoff_ms exceeds allocation.max_backoff_ms".into(),
            ));
        }
        if self.workflow.max_attempts == 0 {
            return Err(DeskError::Config("workflow.max_attempts must be at least 1".into()));
        }
        if self.attachments.max_bytes == 0 {
            return Err(DeskError::Config("attachments.max_bytes must be at least 1".into()));
        }
        Ok(())
    }

    /// Validated institution code
    pub fn institution(&self) -> DeskResult<InstitutionCode> {
        InstitutionCode::new(self.institution_code.clone())
            .map_err(|e| DeskError::Config(e.to_string()))
    }

    #[inline]
    #[must_use]
    pub fn with_institution_code(mut self, code: impl Into<String>) -> Self {
        self.institution_code = code.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_confidential_policy(mut self, policy: ConfidentialPolicy) -> Self {
        self.confidential_policy = policy;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_allocation(mut self, allocation: AllocationConfig) -> Self {
        self.allocation = allocation;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_workflow_attempts(mut self, max_attempts: u32) -> Self {
        self.workflow.max_attempts = max_attempts;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_attachments(mut self, attachments: AttachmentConfig) -> Self {
        self.attachments = attachments;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            institution_code: DEFAULT_INSTITUTION.to_string(),
            confidential_policy: ConfidentialPolicy::default(),
            allocation: AllocationConfig::default(),
            workflow: WorkflowConfig::default(),
            attachments: AttachmentConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(DeskConfig::from_toml_str("").unwrap(), DeskConfig::default());
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let config = DeskConfig::from_toml_str(
            r#"
            institution_code = "UAM"
            confidential_policy = "no_record"

            [allocation]
            max_attempts = 3

            [attachments]
            allowed_content_types = ["application/pdf"]
            "#,
        )
        .unwrap();
        assert_eq!(config.institution().unwrap().as_str(), "UAM");
        assert_eq!(config.confidential_policy, ConfidentialPolicy::NoRecord);
        assert_eq!(config.allocation.max_attempts, 3);
        assert_eq!(config.allocation.base_backoff_ms, 2);
        assert!(config.attachments.allows("APPLICATION/PDF"));
        assert!(!config.attachments.allows("image/png"));
        assert_eq!(config.attachments.max_per_case, 5);
    }

    #[test]
    fn invalid_values_are_rejected() {
        for raw in [
            "institution_code = \"unach\"",
            "[allocation]\nmax_attempts = 0",
            "[workflow]\nmax_attempts = 0",
            "[allocation]\nbase_backoff_ms = 100\nmax_backoff_ms = 10",
            "confidential_policy = \"sometimes\"",
            "institution_code = ",
        ] {
            assert!(
                matches!(DeskConfig::from_toml_str(raw), Err(DeskError::Config(_))),
                "accepted {raw:?}"
            );
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let allocation = AllocationConfig::default();
        assert_eq!(allocation.backoff_ceiling(1), Duration::from_millis(2));
        assert_eq!(allocation.backoff_ceiling(3), Duration::from_millis(8));
        assert_eq!(allocation.backoff_ceiling(10), Duration::from_millis(50));
        assert_eq!(allocation.backoff_ceiling(200), Duration::from_millis(50));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buzon.toml");
        std::fs::write(&path, "[workflow]\nmax_attempts = 2\n").unwrap();
        assert_eq!(DeskConfig::load(&path).unwrap().workflow.max_attempts, 2);
        assert!(DeskConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
