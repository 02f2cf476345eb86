// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Rate-limited client for the target collection CMS.
//!
//! Every outbound call goes through [`crate::resilience::retry_api_call`]:
//! HTTP 429 and transport failures are retried with exponential backoff
//! (base 1s, doubling, capped at 3 retries); any other non-2xx response is
//! surfaced with the response body attached and never retried.
//!
//! Listing endpoints are paginated with a fixed page size; the client
//! follows pages until a short page signals end-of-list. The accumulated
//! listing feeds an [`ExistenceIndex`] used for live "is this id still
//! real" checks and for adoption lookups.
//!
//! The [`TargetApi`] trait is the seam tests mock; [`HttpTargetClient`] is
//! the production implementation.

use crate::config::{SyncLimits, TargetConfig};
use crate::error::{BoxFuture, Result, SyncError};
use crate::record::{AssetUploadTicket, FieldData, TargetItem};
use crate::resilience::{retry_api_call, RetryConfig};
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

/// What the syncer needs from the target CMS.
///
/// All mutating calls require the bearer credential held by the
/// implementation. Batch limits are enforced by the caller, not here.
pub trait TargetApi: Send + Sync + 'static {
    /// List every item in a collection, following pagination to the end.
    fn list_items<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Vec<TargetItem>>;

    /// Create a batch of items in one request. The response order is not
    /// guaranteed to match the request order.
    fn create_items<'a>(
        &'a self,
        collection: &'a str,
        payloads: Vec<FieldData>,
    ) -> BoxFuture<'a, Vec<TargetItem>>;

    /// Update a single item (the target has no bulk update).
    fn update_item<'a>(
        &'a self,
        collection: &'a str,
        item_id: &'a str,
        payload: FieldData,
    ) -> BoxFuture<'a, TargetItem>;

    /// Publish a batch of items.
    fn publish_items<'a>(
        &'a self,
        collection: &'a str,
        item_ids: Vec<String>,
    ) -> BoxFuture<'a, ()>;

    /// Create site-scoped asset metadata; returns the new asset id and
    /// presigned upload credentials.
    fn create_asset<'a>(
        &'a self,
        filename: &'a str,
        content_hash: &'a str,
    ) -> BoxFuture<'a, AssetUploadTicket>;

    /// Upload the binary to the presigned destination.
    fn upload_asset_binary<'a>(
        &'a self,
        ticket: &'a AssetUploadTicket,
        bytes: Vec<u8>,
    ) -> BoxFuture<'a, ()>;

    /// Patch asset metadata without re-uploading the binary. Callers treat
    /// failures as best-effort.
    fn update_asset_metadata<'a>(
        &'a self,
        asset_id: &'a str,
        display_name: &'a str,
        alt_text: Option<&'a str>,
    ) -> BoxFuture<'a, ()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Existence index
// ═══════════════════════════════════════════════════════════════════════════════

/// Current-existence index over one collection's full listing, plus items
/// created during the run. Backs live existence checks and adoption.
#[derive(Debug, Default)]
pub struct ExistenceIndex {
    items: HashMap<String, TargetItem>,
    by_slug: HashMap<String, String>,
    by_name: HashMap<String, Vec<String>>,
}

impl ExistenceIndex {
    pub fn from_items(items: Vec<TargetItem>) -> Self {
        let mut index = Self::default();
        for item in items {
            index.insert(item);
        }
        index
    }

    /// Add an item (listing or a creation made during the run).
    pub fn insert(&mut self, item: TargetItem) {
        if let Some(slug) = item.slug() {
            self.by_slug.insert(slug.to_string(), item.id.clone());
        }
        if let Some(name) = item.name() {
            self.by_name
                .entry(name.to_string())
                .or_default()
                .push(item.id.clone());
        }
        self.items.insert(item.id.clone(), item);
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.items.contains_key(item_id)
    }

    pub fn get(&self, item_id: &str) -> Option<&TargetItem> {
        self.items.get(item_id)
    }

    /// Target id whose slug equals the given slug, if any.
    pub fn id_for_slug(&self, slug: &str) -> Option<&str> {
        self.by_slug.get(slug).map(String::as_str)
    }

    /// All target ids sharing the given display name.
    pub fn ids_for_name(&self, name: &str) -> &[String] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HTTP implementation
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
struct ItemListResponse {
    items: Vec<TargetItem>,
}

#[derive(Deserialize)]
struct AssetCreateResponse {
    id: String,
    #[serde(rename = "uploadUrl")]
    upload_url: String,
}

/// Map a response to an error unless it is 2xx. 429 becomes
/// [`SyncError::RateLimited`]; other failures carry the body.
pub(crate) async fn check_response(
    operation: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(SyncError::RateLimited {
            operation: operation.to_string(),
        });
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SyncError::api(operation, status.as_u16(), body));
    }
    Ok(response)
}

/// Production client for the target CMS REST API.
pub struct HttpTargetClient {
    http: reqwest::Client,
    config: TargetConfig,
    limits: SyncLimits,
    retry: RetryConfig,
}

impl HttpTargetClient {
    pub fn new(config: TargetConfig, limits: SyncLimits) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            limits,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn items_url(&self, collection: &str) -> String {
        format!("{}/collections/{}/items", self.config.api_url, collection)
    }

    /// Fetch one page of a collection listing.
    async fn list_page(&self, collection: &str, offset: usize) -> Result<Vec<TargetItem>> {
        let url = format!(
            "{}?offset={}&limit={}",
            self.items_url(collection),
            offset,
            self.limits.list_page_size
        );
        let http = self.http.clone();
        let token = self.config.token.clone();
        retry_api_call(&self.retry, "list_items", || {
            let http = http.clone();
            let url = url.clone();
            let token = token.clone();
            async move {
                let response = http
                    .get(&url)
                    .bearer_auth(&token)
                    .send()
                    .await
                    .map_err(|e| SyncError::network("list_items", e))?;
                let response = check_response("list_items", response).await?;
                let parsed: ItemListResponse = response
                    .json()
                    .await
                    .map_err(|e| SyncError::network("list_items", e))?;
                Ok(parsed.items)
            }
        })
        .await
    }
}

impl TargetApi for HttpTargetClient {
    fn list_items<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Vec<TargetItem>> {
        Box::pin(async move {
            let mut all = Vec::new();
            let mut offset = 0usize;
            loop {
                let page = self.list_page(collection, offset).await?;
                let short = page.len() < self.limits.list_page_size;
                offset += page.len();
                all.extend(page);
                if short {
                    break;
                }
            }
            debug!(collection, count = all.len(), "listed target items");
            Ok(all)
        })
    }

    fn create_items<'a>(
        &'a self,
        collection: &'a str,
        payloads: Vec<FieldData>,
    ) -> BoxFuture<'a, Vec<TargetItem>> {
        let url = self.items_url(collection);
        let http = self.http.clone();
        let token = self.config.token.clone();
        let body = serde_json::json!({
            "items": payloads
                .into_iter()
                .map(|p| serde_json::json!({ "fieldData": p }))
                .collect::<Vec<_>>()
        });
        Box::pin(async move {
            retry_api_call(&self.retry, "create_items", || {
                let http = http.clone();
                let url = url.clone();
                let token = token.clone();
                let body = body.clone();
                async move {
                    let response = http
                        .post(&url)
                        .bearer_auth(&token)
                        .json(&body)
                        .send()
                        .await
                        .map_err(|e| SyncError::network("create_items", e))?;
                    let response = check_response("create_items", response).await?;
                    let parsed: ItemListResponse = response
                        .json()
                        .await
                        .map_err(|e| SyncError::network("create_items", e))?;
                    Ok(parsed.items)
                }
            })
            .await
        })
    }

    fn update_item<'a>(
        &'a self,
        collection: &'a str,
        item_id: &'a str,
        payload: FieldData,
    ) -> BoxFuture<'a, TargetItem> {
        let url = format!("{}/{}", self.items_url(collection), item_id);
        let http = self.http.clone();
        let token = self.config.token.clone();
        let body = serde_json::json!({ "fieldData": payload });
        Box::pin(async move {
            retry_api_call(&self.retry, "update_item", || {
                let http = http.clone();
                let url = url.clone();
                let token = token.clone();
                let body = body.clone();
                async move {
                    let response = http
                        .patch(&url)
                        .bearer_auth(&token)
                        .json(&body)
                        .send()
                        .await
                        .map_err(|e| SyncError::network("update_item", e))?;
                    let response = check_response("update_item", response).await?;
                    let item: TargetItem = response
                        .json()
                        .await
                        .map_err(|e| SyncError::network("update_item", e))?;
                    Ok(item)
                }
            })
            .await
        })
    }

    fn publish_items<'a>(
        &'a self,
        collection: &'a str,
        item_ids: Vec<String>,
    ) -> BoxFuture<'a, ()> {
        let url = format!("{}/publish", self.items_url(collection));
        let http = self.http.clone();
        let token = self.config.token.clone();
        let body = serde_json::json!({ "itemIds": item_ids });
        Box::pin(async move {
            retry_api_call(&self.retry, "publish_items", || {
                let http = http.clone();
                let url = url.clone();
                let token = token.clone();
                let body = body.clone();
                async move {
                    let response = http
                        .post(&url)
                        .bearer_auth(&token)
                        .json(&body)
                        .send()
                        .await
                        .map_err(|e| SyncError::network("publish_items", e))?;
                    check_response("publish_items", response).await?;
                    Ok(())
                }
            })
            .await
        })
    }

    fn create_asset<'a>(
        &'a self,
        filename: &'a str,
        content_hash: &'a str,
    ) -> BoxFuture<'a, AssetUploadTicket> {
        let url = format!(
            "{}/sites/{}/assets",
            self.config.api_url, self.config.site_id
        );
        let http = self.http.clone();
        let token = self.config.token.clone();
        let body = serde_json::json!({ "fileName": filename, "fileHash": content_hash });
        Box::pin(async move {
            retry_api_call(&self.retry, "create_asset", || {
                let http = http.clone();
                let url = url.clone();
                let token = token.clone();
                let body = body.clone();
                async move {
                    let response = http
                        .post(&url)
                        .bearer_auth(&token)
                        .json(&body)
                        .send()
                        .await
                        .map_err(|e| SyncError::network("create_asset", e))?;
                    let response = check_response("create_asset", response).await?;
                    let parsed: AssetCreateResponse = response
                        .json()
                        .await
                        .map_err(|e| SyncError::network("create_asset", e))?;
                    Ok(AssetUploadTicket {
                        asset_id: parsed.id,
                        upload_url: parsed.upload_url,
                    })
                }
            })
            .await
        })
    }

    fn upload_asset_binary<'a>(
        &'a self,
        ticket: &'a AssetUploadTicket,
        bytes: Vec<u8>,
    ) -> BoxFuture<'a, ()> {
        let http = self.http.clone();
        let url = ticket.upload_url.clone();
        Box::pin(async move {
            retry_api_call(&self.retry, "upload_asset", || {
                let http = http.clone();
                let url = url.clone();
                let bytes = bytes.clone();
                async move {
                    // Presigned destination: no bearer credential.
                    let response = http
                        .put(&url)
                        .body(bytes)
                        .send()
                        .await
                        .map_err(|e| SyncError::network("upload_asset", e))?;
                    check_response("upload_asset", response).await?;
                    Ok(())
                }
            })
            .await
        })
    }

    fn update_asset_metadata<'a>(
        &'a self,
        asset_id: &'a str,
        display_name: &'a str,
        alt_text: Option<&'a str>,
    ) -> BoxFuture<'a, ()> {
        let url = format!("{}/assets/{}", self.config.api_url, asset_id);
        let http = self.http.clone();
        let token = self.config.token.clone();
        let body = serde_json::json!({ "displayName": display_name, "altText": alt_text });
        Box::pin(async move {
            retry_api_call(&self.retry, "update_asset_metadata", || {
                let http = http.clone();
                let url = url.clone();
                let token = token.clone();
                let body = body.clone();
                async move {
                    let response = http
                        .patch(&url)
                        .bearer_auth(&token)
                        .json(&body)
                        .send()
                        .await
                        .map_err(|e| SyncError::network("update_asset_metadata", e))?;
                    check_response("update_asset_metadata", response).await?;
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
    use serde_json::json;

    fn item(id: &str, name: &str, slug: &str) -> TargetItem {
        let mut fields = FieldData::new();
        fields.insert("name".to_string(), json!(name));
        fields.insert("slug".to_string(), json!(slug));
        TargetItem::new(id, fields)
    }

    #[test]
    fn test_index_contains_and_get() {
        let index = ExistenceIndex::from_items(vec![item("t-1", "One", "one")]);
        assert!(index.contains("t-1"));
        assert!(!index.contains("t-2"));
        assert_eq!(index.get("t-1").unwrap().name(), Some("One"));
        assert_eq!(index.len(), 1);
        assert!(!index.is_empty());
    }

    #[test]
    fn test_index_slug_lookup() {
        let index = ExistenceIndex::from_items(vec![
            item("t-1", "One", "one"),
            item("t-2", "Two", "two"),
        ]);
        assert_eq!(index.id_for_slug("two"), Some("t-2"));
        assert_eq!(index.id_for_slug("three"), None);
    }

    #[test]
    fn test_index_name_collision_keeps_all_ids() {
        let index = ExistenceIndex::from_items(vec![
            item("t-1", "Untitled", "untitled-1"),
            item("t-2", "Untitled", "untitled-2"),
        ]);
        let ids = index.ids_for_name("Untitled");
        assert_eq!(ids.len(), 2);
        assert!(index.ids_for_name("Nope").is_empty());
    }

    #[test]
    fn test_index_insert_after_creation() {
        let mut index = ExistenceIndex::default();
        assert!(index.is_empty());
        index.insert(item("t-9", "New", "new"));
        assert!(index.contains("t-9"));
        assert_eq!(index.id_for_slug("new"), Some("t-9"));
    }

    #[test]
    fn test_index_item_without_slug_or_name() {
        let mut index = ExistenceIndex::default();
        index.insert(TargetItem::new("t-bare", FieldData::new()));
        assert!(index.contains("t-bare"));
        assert_eq!(index.id_for_slug(""), None);
    }
}
