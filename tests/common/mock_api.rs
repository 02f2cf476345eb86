// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory mock of the target CMS. Records every call and supports
//! fault injection (rate limiting a number of upcoming mutating calls).

use collection_sync::error::{BoxFuture, SyncError};
use collection_sync::record::{AssetUploadTicket, FieldData, TargetItem};
use collection_sync::TargetApi;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct MockTargetApi {
    items: Mutex<HashMap<String, Vec<TargetItem>>>,
    published: Mutex<HashMap<String, Vec<String>>>,
    calls: Mutex<Vec<String>>,
    next_id: AtomicUsize,
    /// Mutating calls left to reject with a 429 before behaving normally.
    rate_limited_calls: AtomicUsize,
    uploads: AtomicUsize,
    metadata_updates: AtomicUsize,
}

impl MockTargetApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a pre-existing item, as if an operator created it by hand.
    pub fn seed_item(&self, collection: &str, name: &str, slug: &str) -> String {
        let id = self.allocate_id();
        let mut fields = FieldData::new();
        fields.insert("name".to_string(), serde_json::json!(name));
        fields.insert("slug".to_string(), serde_json::json!(slug));
        self.items
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .push(TargetItem::new(id.clone(), fields));
        id
    }

    /// Reject the next `n` mutating calls with a 429.
    pub fn rate_limit_next(&self, n: usize) {
        self.rate_limited_calls.store(n, Ordering::SeqCst);
    }

    /// Delete a seeded/created item directly (simulates out-of-band
    /// deletion between runs).
    pub fn remove_item(&self, collection: &str, item_id: &str) {
        if let Some(items) = self.items.lock().unwrap().get_mut(collection) {
            items.retain(|i| i.id != item_id);
        }
    }

    /// Overwrite one field of an item (simulates an out-of-band edit).
    pub fn edit_field(&self, collection: &str, item_id: &str, key: &str, value: serde_json::Value) {
        if let Some(items) = self.items.lock().unwrap().get_mut(collection) {
            if let Some(item) = items.iter_mut().find(|i| i.id == item_id) {
                item.field_data.insert(key.to_string(), value);
            }
        }
    }

    pub fn items_in(&self, collection: &str) -> Vec<TargetItem> {
        self.items
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn item(&self, collection: &str, item_id: &str) -> Option<TargetItem> {
        self.items_in(collection).into_iter().find(|i| i.id == item_id)
    }

    pub fn published_in(&self, collection: &str) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == operation)
            .count()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn metadata_update_count(&self) -> usize {
        self.metadata_updates.load(Ordering::SeqCst)
    }

    fn allocate_id(&self) -> String {
        format!("t-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn record_call(&self, operation: &str) {
        self.calls.lock().unwrap().push(operation.to_string());
    }

    /// Consume one injected fault, if any remain.
    fn maybe_rate_limit(&self, operation: &str) -> Result<(), SyncError> {
        let remaining = self.rate_limited_calls.load(Ordering::SeqCst);
        if remaining > 0 {
            self.rate_limited_calls.store(remaining - 1, Ordering::SeqCst);
            return Err(SyncError::RateLimited {
                operation: operation.to_string(),
            });
        }
        Ok(())
    }
}

impl TargetApi for MockTargetApi {
    fn list_items<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Vec<TargetItem>> {
        Box::pin(async move {
            self.record_call("list_items");
            Ok(self.items_in(collection))
        })
    }

    fn create_items<'a>(
        &'a self,
        collection: &'a str,
        payloads: Vec<FieldData>,
    ) -> BoxFuture<'a, Vec<TargetItem>> {
        Box::pin(async move {
            self.record_call("create_items");
            self.maybe_rate_limit("create_items")?;
            let mut created = Vec::new();
            for payload in payloads {
                let item = TargetItem::new(self.allocate_id(), payload);
                self.items
                    .lock()
                    .unwrap()
                    .entry(collection.to_string())
                    .or_default()
                    .push(item.clone());
                created.push(item);
            }
            // The real API does not guarantee response order.
            created.reverse();
            Ok(created)
        })
    }

    fn update_item<'a>(
        &'a self,
        collection: &'a str,
        item_id: &'a str,
        payload: FieldData,
    ) -> BoxFuture<'a, TargetItem> {
        Box::pin(async move {
            self.record_call("update_item");
            self.maybe_rate_limit("update_item")?;
            let mut items = self.items.lock().unwrap();
            let item = items
                .get_mut(collection)
                .and_then(|v| v.iter_mut().find(|i| i.id == item_id))
                .ok_or_else(|| SyncError::api("update_item", 404, "item not found"))?;
            for (key, value) in payload {
                item.field_data.insert(key, value);
            }
            Ok(item.clone())
        })
    }

    fn publish_items<'a>(
        &'a self,
        collection: &'a str,
        item_ids: Vec<String>,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.record_call("publish_items");
            self.maybe_rate_limit("publish_items")?;
            self.published
                .lock()
                .unwrap()
                .entry(collection.to_string())
                .or_default()
                .extend(item_ids);
            Ok(())
        })
    }

    fn create_asset<'a>(
        &'a self,
        filename: &'a str,
        _content_hash: &'a str,
    ) -> BoxFuture<'a, AssetUploadTicket> {
        Box::pin(async move {
            self.record_call("create_asset");
            self.maybe_rate_limit("create_asset")?;
            let id = format!("asset-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
            Ok(AssetUploadTicket {
                asset_id: id.clone(),
                upload_url: format!("mock://upload/{id}/{filename}"),
            })
        })
    }

    fn upload_asset_binary<'a>(
        &'a self,
        _ticket: &'a AssetUploadTicket,
        _bytes: Vec<u8>,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.record_call("upload_asset_binary");
            self.maybe_rate_limit("upload_asset_binary")?;
            self.uploads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn update_asset_metadata<'a>(
        &'a self,
        _asset_id: &'a str,
        _display_name: &'a str,
        _alt_text: Option<&'a str>,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.record_call("update_asset_metadata");
            self.metadata_updates.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}
