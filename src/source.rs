// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Read side: the document-oriented content store.
//!
//! The [`SourceStore`] trait covers everything the engine reads from the
//! store (records, asset binaries) plus the two state documents the engine
//! persists back into it. The store is the single system of record for
//! both content and sync state, so no extra database is involved.
//!
//! Asset ids encode the binary's identity (`image-<fingerprint>-<dims>-<ext>`);
//! [`derive_asset_url`] turns one into a CDN URL deterministically, with no
//! extra API round-trip.

use crate::config::SourceConfig;
use crate::error::{BoxFuture, Result, SyncError};
use crate::record::{RecordType, SourceRecord};
use crate::resilience::{retry_api_call, RetryConfig};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

/// What the engine needs from the content store.
pub trait SourceStore: Send + Sync + 'static {
    /// Fetch all records of one type, ordered by the store's natural
    /// ordering. `since` restricts to records modified at or after the
    /// given timestamp (incremental runs).
    fn records_of_type<'a>(
        &'a self,
        record_type: RecordType,
        since: Option<&'a str>,
    ) -> BoxFuture<'a, Vec<SourceRecord>>;

    /// Fetch specific records by id. Missing ids are silently absent from
    /// the result; the caller decides whether that matters.
    fn records_by_ids<'a>(&'a self, ids: &'a [String]) -> BoxFuture<'a, Vec<SourceRecord>>;

    /// Download an asset's binary from the store's CDN.
    fn fetch_asset_bytes<'a>(&'a self, asset_id: &'a str) -> BoxFuture<'a, Vec<u8>>;

    /// Read a sync state document. `Ok(None)` means the document does not
    /// exist yet (first run).
    fn read_state_doc<'a>(&'a self, doc_id: &'a str) -> BoxFuture<'a, Option<serde_json::Value>>;

    /// Replace a sync state document atomically.
    fn write_state_doc<'a>(
        &'a self,
        doc_id: &'a str,
        value: serde_json::Value,
    ) -> BoxFuture<'a, ()>;
}

/// Derive the CDN URL for an asset id.
///
/// `image-ab12cd-1200x800-jpg` becomes `{base}/ab12cd-1200x800.jpg`. An id
/// that does not follow the convention is passed through as a path segment
/// so the download fails loudly with the real id in the error.
pub fn derive_asset_url(base_url: &str, asset_id: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), derive_asset_filename(asset_id))
}

/// Filename form of an asset id: kind prefix stripped, the trailing
/// extension segment turned into a real extension.
pub fn derive_asset_filename(asset_id: &str) -> String {
    let stripped = asset_id
        .strip_prefix("image-")
        .or_else(|| asset_id.strip_prefix("file-"))
        .unwrap_or(asset_id);
    match stripped.rsplit_once('-') {
        Some((stem, ext)) if !stem.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            format!("{stem}.{ext}")
        }
        _ => stripped.to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HTTP implementation
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
struct QueryResponse {
    result: Vec<SourceRecord>,
}

/// Production client for the content store's HTTP API.
pub struct HttpSourceStore {
    http: reqwest::Client,
    config: SourceConfig,
    retry: RetryConfig,
}

impl HttpSourceStore {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn query_url(&self) -> String {
        format!("{}/{}/query", self.config.api_url, self.config.dataset)
    }

    fn doc_url(&self, doc_id: &str) -> String {
        format!("{}/{}/docs/{}", self.config.api_url, self.config.dataset, doc_id)
    }

    async fn run_query(
        &self,
        operation: &str,
        params: Vec<(&'static str, String)>,
    ) -> Result<Vec<SourceRecord>> {
        let url = self.query_url();
        let http = self.http.clone();
        let token = self.config.token.clone();
        let op = operation.to_string();
        retry_api_call(&self.retry, operation, || {
            let http = http.clone();
            let url = url.clone();
            let token = token.clone();
            let params = params.clone();
            let op = op.clone();
            async move {
                let response = http
                    .get(&url)
                    .bearer_auth(&token)
                    .query(&params)
                    .send()
                    .await
                    .map_err(|e| SyncError::network(op.clone(), e))?;
                let response = crate::client::check_response(&op, response).await?;
                let parsed: QueryResponse = response
                    .json()
                    .await
                    .map_err(|e| SyncError::network(op.clone(), e))?;
                Ok(parsed.result)
            }
        })
        .await
    }
}

impl SourceStore for HttpSourceStore {
    fn records_of_type<'a>(
        &'a self,
        record_type: RecordType,
        since: Option<&'a str>,
    ) -> BoxFuture<'a, Vec<SourceRecord>> {
        Box::pin(async move {
            let mut params = vec![("type", record_type.to_string())];
            if let Some(since) = since {
                params.push(("since", since.to_string()));
            }
            let records = self.run_query("query_records", params).await?;
            debug!(
                record_type = %record_type,
                count = records.len(),
                incremental = since.is_some(),
                "fetched source records"
            );
            Ok(records)
        })
    }

    fn records_by_ids<'a>(&'a self, ids: &'a [String]) -> BoxFuture<'a, Vec<SourceRecord>> {
        Box::pin(async move {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let params = vec![("ids", ids.join(","))];
            self.run_query("query_records_by_id", params).await
        })
    }

    fn fetch_asset_bytes<'a>(&'a self, asset_id: &'a str) -> BoxFuture<'a, Vec<u8>> {
        let url = derive_asset_url(&self.config.asset_base_url, asset_id);
        let http = self.http.clone();
        Box::pin(async move {
            retry_api_call(&self.retry, "fetch_asset", || {
                let http = http.clone();
                let url = url.clone();
                async move {
                    // CDN downloads are unauthenticated.
                    let response = http
                        .get(&url)
                        .send()
                        .await
                        .map_err(|e| SyncError::network("fetch_asset", e))?;
                    let response = crate::client::check_response("fetch_asset", response).await?;
                    let bytes = response
                        .bytes()
                        .await
                        .map_err(|e| SyncError::network("fetch_asset", e))?;
                    Ok(bytes.to_vec())
                }
            })
            .await
        })
    }

    fn read_state_doc<'a>(&'a self, doc_id: &'a str) -> BoxFuture<'a, Option<serde_json::Value>> {
        let url = self.doc_url(doc_id);
        let http = self.http.clone();
        let token = self.config.token.clone();
        Box::pin(async move {
            retry_api_call(&self.retry, "read_state_doc", || {
                let http = http.clone();
                let url = url.clone();
                let token = token.clone();
                async move {
                    let response = http
                        .get(&url)
                        .bearer_auth(&token)
                        .send()
                        .await
                        .map_err(|e| SyncError::network("read_state_doc", e))?;
                    if response.status() == StatusCode::NOT_FOUND {
                        return Ok(None);
                    }
                    let response =
                        crate::client::check_response("read_state_doc", response).await?;
                    let value: serde_json::Value = response
                        .json()
                        .await
                        .map_err(|e| SyncError::network("read_state_doc", e))?;
                    Ok(Some(value))
                }
            })
            .await
        })
    }

    fn write_state_doc<'a>(
        &'a self,
        doc_id: &'a str,
        value: serde_json::Value,
    ) -> BoxFuture<'a, ()> {
        let url = self.doc_url(doc_id);
        let http = self.http.clone();
        let token = self.config.token.clone();
        Box::pin(async move {
            retry_api_call(&self.retry, "write_state_doc", || {
                let http = http.clone();
                let url = url.clone();
                let token = token.clone();
                let value = value.clone();
                async move {
                    let response = http
                        .put(&url)
                        .bearer_auth(&token)
                        .json(&value)
                        .send()
                        .await
                        .map_err(|e| SyncError::network("write_state_doc", e))?;
                    crate::client::check_response("write_state_doc", response).await?;
                    Ok(())
                }
            })
            .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_filename_image() {
        assert_eq!(
            derive_asset_filename("image-ab12cd-1200x800-jpg"),
            "ab12cd-1200x800.jpg"
        );
    }

    #[test]
    fn test_derive_filename_file_prefix() {
        assert_eq!(derive_asset_filename("file-deadbeef-pdf"), "deadbeef.pdf");
    }

    #[test]
    fn test_derive_filename_unrecognized_passthrough() {
        assert_eq!(derive_asset_filename("whatever"), "whatever");
    }

    #[test]
    fn test_derive_url_trims_trailing_slash() {
        assert_eq!(
            derive_asset_url("https://cdn.example.com/images/", "image-ab-10x10-png"),
            "https://cdn.example.com/images/ab-10x10.png"
        );
    }

    #[test]
    fn test_derive_url_is_deterministic() {
        let a = derive_asset_url("https://cdn.example.com", "image-ab-10x10-png");
        let b = derive_asset_url("https://cdn.example.com", "image-ab-10x10-png");
        assert_eq!(a, b);
    }
}
