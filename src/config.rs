//! Configuration for the sync engine.
//!
//! All knobs live in one explicit [`SyncConfig`] that is threaded through
//! the call chain; there are no ambient environment-driven feature flags.
//! Configuration can be constructed programmatically or deserialized from
//! JSON/YAML.
//!
//! # Configuration Structure
//!
//! ```text
//! SyncConfig
//! ├── source: SourceConfig      # editorial content store (read side)
//! │   ├── api_url, dataset, token
//! │   └── asset_base_url        # deterministic asset URL derivation
//! ├── target: TargetConfig      # collection CMS (write side)
//! │   └── api_url, site_id, token
//! ├── runtime: RuntimeOptions   # per-run flags (force, publish, check…)
//! └── limits: SyncLimits        # batch sizes, page size, field caps
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use collection_sync::config::SyncConfig;
//!
//! let mut config = SyncConfig::for_testing();
//! config.runtime.auto_publish = true;
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};

/// The top-level config object passed to `SyncEngine::new()`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SyncConfig {
    /// Source content store (system of record, read-only to us).
    pub source: SourceConfig,

    /// Target collection CMS (read/write).
    pub target: TargetConfig,

    /// Per-run behavior flags.
    #[serde(default)]
    pub runtime: RuntimeOptions,

    /// Batch sizes and field limits.
    #[serde(default)]
    pub limits: SyncLimits,
}

impl SyncConfig {
    /// Create a minimal config for testing. Credentials are placeholders;
    /// tests substitute mock clients at the trait seams, so no network
    /// calls are made with these values.
    pub fn for_testing() -> Self {
        Self {
            source: SourceConfig {
                api_url: "http://source.test".to_string(),
                dataset: "test".to_string(),
                token: "test-token".to_string(),
                asset_base_url: "http://cdn.test".to_string(),
            },
            target: TargetConfig {
                api_url: "http://target.test".to_string(),
                site_id: "site-test".to_string(),
                token: "test-token".to_string(),
            },
            runtime: RuntimeOptions::default(),
            limits: SyncLimits::default(),
        }
    }

    /// Validate that every required credential and identifier is present.
    ///
    /// Called before any write is issued; a failure here aborts the run.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.source.api_url.is_empty() {
            return Err(crate::error::SyncError::Config(
                "source.api_url is required".to_string(),
            ));
        }
        if self.source.token.is_empty() {
            return Err(crate::error::SyncError::Config(
                "source.token is required".to_string(),
            ));
        }
        if self.target.api_url.is_empty() {
            return Err(crate::error::SyncError::Config(
                "target.api_url is required".to_string(),
            ));
        }
        if self.target.token.is_empty() {
            return Err(crate::error::SyncError::Config(
                "target.token is required (bearer credential for all mutating calls)".to_string(),
            ));
        }
        if self.target.site_id.is_empty() {
            return Err(crate::error::SyncError::Config(
                "target.site_id is required for asset uploads".to_string(),
            ));
        }
        if self.limits.create_batch_size == 0 {
            return Err(crate::error::SyncError::Config(
                "limits.create_batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Source content store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SourceConfig {
    /// Base URL of the source query API.
    pub api_url: String,

    /// Dataset/environment name within the source store.
    #[serde(default = "default_dataset")]
    pub dataset: String,

    /// Read token. The synchronizer never mutates editorial content,
    /// but the same token also writes the reserved state documents.
    pub token: String,

    /// Base URL for derived asset URLs (CDN). Asset URL construction is a
    /// pure string transform against this base, never a network call.
    #[serde(default)]
    pub asset_base_url: String,
}

fn default_dataset() -> String {
    "production".to_string()
}

/// Target collection CMS connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TargetConfig {
    /// Base URL of the target REST API.
    pub api_url: String,

    /// Site identifier (scopes asset uploads).
    pub site_id: String,

    /// Bearer credential for all mutating calls.
    pub token: String,
}

/// Per-run behavior flags (replaces the old env-var driven switches).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeOptions {
    /// Force updates even when the content hash is unchanged.
    #[serde(default)]
    pub force: bool,

    /// Publish items that were created or updated during the run.
    #[serde(default)]
    pub auto_publish: bool,

    /// Publish every mapped item, not just the ones touched this run.
    #[serde(default)]
    pub publish_all: bool,

    /// Dry run: compute the create/update delta, issue no writes.
    #[serde(default)]
    pub check_only: bool,

    /// Only sync records updated at or after this cutoff (RFC 3339).
    /// Applied at the source query layer.
    #[serde(default)]
    pub since: Option<String>,

    /// Allow adopting an existing target item when its display name
    /// matches exactly one source record and no slug match exists.
    /// Name collisions between unrelated items would cross-link them,
    /// so operators can turn this off; slug adoption is always on.
    #[serde(default = "default_true")]
    pub adopt_by_name: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            force: false,
            auto_publish: false,
            publish_all: false,
            check_only: false,
            since: None,
            adopt_by_name: true,
        }
    }
}

/// Batch sizes, page sizes and field caps dictated by the target API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLimits {
    /// Maximum items per batch create call.
    #[serde(default = "default_create_batch_size")]
    pub create_batch_size: usize,

    /// Page size for listing endpoints. A short page signals end-of-list.
    #[serde(default = "default_list_page_size")]
    pub list_page_size: usize,

    /// Maximum length of the display name field. Longer names are
    /// truncated, never rejected.
    #[serde(default = "default_display_name_max")]
    pub display_name_max: usize,

    /// Fixed delay before each asset upload call, in milliseconds.
    /// A blunt rate-limit guard independent of the 429 backoff path.
    #[serde(default = "default_asset_upload_delay_ms")]
    pub asset_upload_delay_ms: u64,
}

fn default_create_batch_size() -> usize {
    50
}

fn default_list_page_size() -> usize {
    100
}

fn default_display_name_max() -> usize {
    256
}

fn default_asset_upload_delay_ms() -> u64 {
    1000
}

impl Default for SyncLimits {
    fn default() -> Self {
        Self {
            create_batch_size: 50,
            list_page_size: 100,
            display_name_max: 256,
            asset_upload_delay_ms: 1000,
        }
    }
}

impl SyncLimits {
    /// Small batches and no upload delay, for fast tests.
    pub fn testing() -> Self {
        Self {
            create_batch_size: 3,
            list_page_size: 5,
            display_name_max: 256,
            asset_upload_delay_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_testing_validates() {
        let config = SyncConfig::for_testing();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_target_token_is_fatal() {
        let mut config = SyncConfig::for_testing();
        config.target.token = String::new();
        let err = config.validate().unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("target.token"));
    }

    #[test]
    fn test_missing_site_id_is_fatal() {
        let mut config = SyncConfig::for_testing();
        config.target.site_id = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = SyncConfig::for_testing();
        config.limits.create_batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_limit_defaults() {
        let limits = SyncLimits::default();
        assert_eq!(limits.create_batch_size, 50);
        assert_eq!(limits.list_page_size, 100);
        assert_eq!(limits.display_name_max, 256);
        assert_eq!(limits.asset_upload_delay_ms, 1000);
    }

    #[test]
    fn test_runtime_defaults() {
        let runtime = RuntimeOptions::default();
        assert!(!runtime.force);
        assert!(!runtime.auto_publish);
        assert!(!runtime.check_only);
        assert!(runtime.adopt_by_name);
        assert!(runtime.since.is_none());
    }

    #[test]
    fn test_deserialize_partial_json() {
        let json = r#"{
            "source": {"api_url": "http://s", "token": "t"},
            "target": {"api_url": "http://t", "site_id": "site", "token": "t"}
        }"#;
        let config: SyncConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.source.dataset, "production");
        assert_eq!(config.limits.create_batch_size, 50);
        assert!(config.runtime.adopt_by_name);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = SyncConfig::for_testing();
        let json = serde_json::to_string(&config).unwrap();
        let back: SyncConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.source.api_url, config.source.api_url);
        assert_eq!(back.limits.create_batch_size, config.limits.create_batch_size);
    }
}
