// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the collection sync engine.
//!
//! Errors are categorized by what the caller should do with them: retry
//! with backoff, skip the record and continue, or abort the run.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Scope | Description |
//! |------------|-----------|-------|-------------|
//! | `RateLimited` | Yes | call | Target API returned HTTP 429 |
//! | `Network` | Yes | call | Transport failure (timeout, connection reset) |
//! | `Api` | No | record | Non-2xx response, body attached |
//! | `Validation` | No | record | Target rejected a payload (dangling ref, oversized field) |
//! | `AmbiguousAdoption` | No | record | Multiple target items match by name, manual resolution required |
//! | `Config` | No | run | Missing credential/identifier, fatal before any write |
//! | `StateStore` | No | run | Mapping persistence failure |
//! | `Internal` | No | run | Unexpected internal error |
//!
//! # Retry Behavior
//!
//! Use [`SyncError::is_retryable()`] to decide whether a call should be
//! retried with backoff. Record-scoped errors are counted in the per-item
//! outcome and the run continues; run-scoped errors abort the run.

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Boxed async future, used by the trait seams ([`crate::client::TargetApi`],
/// [`crate::source::SourceStore`], [`crate::store::MappingStore`]) so tests
/// can substitute mock implementations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Errors that can occur during synchronization.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Target API signalled rate limiting (HTTP 429).
    ///
    /// Retryable with exponential backoff; the same call is reissued.
    #[error("Rate limited ({operation})")]
    RateLimited { operation: String },

    /// Transport-level failure (DNS, timeout, connection reset).
    ///
    /// Retryable with the same backoff policy as rate limiting.
    #[error("Network error ({operation}): {message}")]
    Network {
        operation: String,
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// Non-2xx API response other than 429.
    ///
    /// Not retryable. The response body is attached for diagnostics.
    #[error("API error ({operation}): status {status}: {body}")]
    Api {
        operation: String,
        status: u16,
        body: String,
    },

    /// The target rejected a specific record's payload.
    ///
    /// The record is skipped and logged; the run continues.
    #[error("Validation error for {record_id}: {message}")]
    Validation { record_id: String, message: String },

    /// Adoption found more than one target item with the same name.
    ///
    /// Never auto-resolved: creating anyway would risk a silent duplicate.
    /// The record is recorded as skipped and requires manual resolution.
    #[error("Ambiguous adoption for {record_id}: {candidates} target items named {name:?}")]
    AmbiguousAdoption {
        record_id: String,
        name: String,
        candidates: usize,
    },

    /// Invalid or missing configuration.
    ///
    /// Fatal at startup; the run aborts before any write.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Mapping/hash/asset map persistence failure.
    #[error("State store error: {0}")]
    StateStore(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Create a network error from a reqwest error.
    pub fn network(operation: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            operation: operation.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a network error without a source.
    pub fn network_msg(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create an API error with the response body attached.
    pub fn api(operation: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::Api {
            operation: operation.into(),
            status,
            body: body.into(),
        }
    }

    /// Check if this error is retryable (transient).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Network { .. } => true,
            Self::Api { .. } => false, // Target rejected the call outright
            Self::Validation { .. } => false,
            Self::AmbiguousAdoption { .. } => false,
            Self::Config(_) => false,
            Self::StateStore(_) => false,
            Self::Internal(_) => false,
        }
    }

    /// Check if this error is scoped to a single record.
    ///
    /// Record-scoped errors are counted against the record and the run
    /// continues with the remaining records (partial-failure tolerance).
    pub fn is_record_scoped(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::AmbiguousAdoption { .. } | Self::Api { .. }
        )
    }
}
