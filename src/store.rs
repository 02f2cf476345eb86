// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Mapping & hash store: the durable state that survives between runs.
//!
//! Three maps are persisted (identity, hash, asset); the order index is
//! rebuilt from ordered parent reference arrays at the start of each run
//! and never persisted. All maps are append-mostly: entries are removed
//! only when a live lookup proves a cached identity stale, or when a full
//! rebuild is explicitly requested.
//!
//! # Persistence contract
//!
//! - `load()` never fails the run merely because no prior state exists:
//!   missing or unparseable state documents yield empty maps (logged).
//! - `save()` uses write-new-then-replace semantics at the storage layer,
//!   so a partial write cannot corrupt previously good state.
//! - `save_identity()` / `save_hash()` are best-effort incremental writes:
//!   image uploads can make runs slow, and process termination must not
//!   drop identities that were already committed on the target.
//!
//! The store is injected into the engine (never ambient global state) so
//! tests substitute [`InMemoryMappingStore`].

use crate::error::{BoxFuture, Result, SyncError};
use crate::record::SourceRecord;
use crate::source::SourceStore;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Reserved document identifiers for the persisted maps. These live in the
/// same storage tier as ordinary source content but are namespaced so they
/// never collide with editorial records.
pub const IDENTITY_MAP_DOC: &str = "sync.state.identity-map";
pub const HASH_MAP_DOC: &str = "sync.state.hash-map";
pub const ASSET_MAP_DOC: &str = "sync.state.asset-map";

/// One persisted asset mapping entry: a source asset id that has already
/// been uploaded to the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEntry {
    /// Target-side asset id, reused on every later reference.
    pub target_asset_id: String,
    /// Alt text derived at upload time.
    pub alt_text: Option<String>,
    /// Filename derived from the source asset id.
    pub filename: String,
    /// Source URL the binary was fetched from.
    pub url: String,
    /// Unix timestamp of the last metadata update.
    pub last_updated: i64,
}

/// The full in-memory sync state: the three persisted maps plus the
/// per-run order index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncState {
    /// `(collection, source_id) → target_id`. Many-to-one is forbidden:
    /// each source record maps to at most one target item.
    #[serde(default)]
    pub identity: HashMap<String, HashMap<String, String>>,

    /// `(collection, source_id) → content hash` of the mapped payload,
    /// slug excluded.
    #[serde(default)]
    pub hashes: HashMap<String, HashMap<String, String>>,

    /// `source asset id → asset entry`.
    #[serde(default)]
    pub assets: HashMap<String, AssetEntry>,

    /// `source record id → 1-based position`, rebuilt each run from
    /// ordered parent reference arrays. Never persisted.
    #[serde(skip)]
    pub order_index: HashMap<String, u32>,
}

impl SyncState {
    pub fn identity_get(&self, collection: &str, source_id: &str) -> Option<&str> {
        self.identity
            .get(collection)
            .and_then(|m| m.get(source_id))
            .map(String::as_str)
    }

    pub fn identity_set(&mut self, collection: &str, source_id: &str, target_id: &str) {
        self.identity
            .entry(collection.to_string())
            .or_default()
            .insert(source_id.to_string(), target_id.to_string());
    }

    /// Remove a cached identity proven stale by a live lookup.
    pub fn identity_remove(&mut self, collection: &str, source_id: &str) {
        if let Some(m) = self.identity.get_mut(collection) {
            m.remove(source_id);
        }
    }

    pub fn hash_get(&self, collection: &str, source_id: &str) -> Option<&str> {
        self.hashes
            .get(collection)
            .and_then(|m| m.get(source_id))
            .map(String::as_str)
    }

    pub fn hash_set(&mut self, collection: &str, source_id: &str, hash: &str) {
        self.hashes
            .entry(collection.to_string())
            .or_default()
            .insert(source_id.to_string(), hash.to_string());
    }

    /// Rebuild the order index from the ordered reference arrays of the
    /// given parent records. Explicit positions win; otherwise array order.
    pub fn rebuild_order_index<'a>(&mut self, parents: impl IntoIterator<Item = &'a SourceRecord>) {
        self.order_index.clear();
        for parent in parents {
            for (i, r) in parent.ordered_references().iter().enumerate() {
                let position = r.position.unwrap_or(i as u32 + 1);
                self.order_index.insert(r.id.clone(), position);
            }
        }
    }

    /// Restrict the state to the given source record ids and asset ids.
    /// Used by the single-record fast path, which loads only the entries
    /// relevant to one record.
    pub fn scoped(&self, source_ids: &HashSet<String>, asset_ids: &HashSet<String>) -> SyncState {
        let filter = |maps: &HashMap<String, HashMap<String, String>>| {
            maps.iter()
                .map(|(coll, m)| {
                    let filtered: HashMap<String, String> = m
                        .iter()
                        .filter(|(k, _)| source_ids.contains(*k))
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
                    (coll.clone(), filtered)
                })
                .collect()
        };
        SyncState {
            identity: filter(&self.identity),
            hashes: filter(&self.hashes),
            assets: self
                .assets
                .iter()
                .filter(|(k, _)| asset_ids.contains(*k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            order_index: self.order_index.clone(),
        }
    }

    /// Total number of identity entries across collections.
    pub fn identity_count(&self) -> usize {
        self.identity.values().map(HashMap::len).sum()
    }
}

/// Durable storage for the sync state. Injected into the engine.
pub trait MappingStore: Send + Sync + 'static {
    /// Load the persisted maps. Missing state yields empty maps.
    fn load(&self) -> BoxFuture<'_, SyncState>;

    /// Persist the full state atomically (write-new-then-replace).
    fn save<'a>(&'a self, state: &'a SyncState) -> BoxFuture<'a, ()>;

    /// Persist a single newly established identity immediately.
    /// Callers treat failures as best-effort (logged, not fatal).
    fn save_identity<'a>(
        &'a self,
        collection: &'a str,
        source_id: &'a str,
        target_id: &'a str,
    ) -> BoxFuture<'a, ()>;

    /// Persist a single updated content hash immediately.
    fn save_hash<'a>(
        &'a self,
        collection: &'a str,
        source_id: &'a str,
        hash: &'a str,
    ) -> BoxFuture<'a, ()>;

    /// Persist a single asset map entry immediately (the binary is already
    /// on the target when this is called).
    fn save_asset<'a>(&'a self, asset_id: &'a str, entry: &'a AssetEntry) -> BoxFuture<'a, ()>;

    /// Load only the entries relevant to the given records and assets.
    /// Default implementation filters a full load.
    fn load_scoped<'a>(
        &'a self,
        source_ids: &'a HashSet<String>,
        asset_ids: &'a HashSet<String>,
    ) -> BoxFuture<'a, SyncState> {
        Box::pin(async move { Ok(self.load().await?.scoped(source_ids, asset_ids)) })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Source-store-backed implementation
// ═══════════════════════════════════════════════════════════════════════════════

/// Persists the maps as reserved state documents in the source content
/// store. Cache-first: incremental writes update the in-memory copy and
/// rewrite only the affected document.
pub struct SourceMappingStore<S: SourceStore> {
    source: Arc<S>,
    cache: RwLock<SyncState>,
}

impl<S: SourceStore> SourceMappingStore<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            cache: RwLock::new(SyncState::default()),
        }
    }

    async fn read_doc<T: serde::de::DeserializeOwned + Default>(&self, doc_id: &str) -> T {
        match self.source.read_state_doc(doc_id).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(parsed) => parsed,
                Err(e) => {
                    // Suspected corruption: continue with empty maps; a
                    // full mapping rebuild will repopulate via adoption.
                    warn!(doc_id, error = %e, "state document unparseable, starting empty");
                    T::default()
                }
            },
            Ok(None) => {
                info!(doc_id, "no prior state document, starting empty");
                T::default()
            }
            Err(e) => {
                warn!(doc_id, error = %e, "state document read failed, starting empty");
                T::default()
            }
        }
    }

    async fn write_doc<T: Serialize>(&self, doc_id: &str, value: &T) -> Result<()> {
        let json = serde_json::to_value(value)
            .map_err(|e| SyncError::StateStore(format!("serialize {doc_id}: {e}")))?;
        self.source.write_state_doc(doc_id, json).await
    }
}

impl<S: SourceStore> MappingStore for SourceMappingStore<S> {
    fn load(&self) -> BoxFuture<'_, SyncState> {
        Box::pin(async move {
            let identity: HashMap<String, HashMap<String, String>> =
                self.read_doc(IDENTITY_MAP_DOC).await;
            let hashes: HashMap<String, HashMap<String, String>> =
                self.read_doc(HASH_MAP_DOC).await;
            let assets: HashMap<String, AssetEntry> = self.read_doc(ASSET_MAP_DOC).await;

            let state = SyncState {
                identity,
                hashes,
                assets,
                order_index: HashMap::new(),
            };
            info!(
                identities = state.identity_count(),
                assets = state.assets.len(),
                "loaded sync state"
            );
            *self.cache.write().await = state.clone();
            Ok(state)
        })
    }

    fn save<'a>(&'a self, state: &'a SyncState) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.write_doc(IDENTITY_MAP_DOC, &state.identity).await?;
            self.write_doc(HASH_MAP_DOC, &state.hashes).await?;
            self.write_doc(ASSET_MAP_DOC, &state.assets).await?;
            *self.cache.write().await = state.clone();
            debug!(identities = state.identity_count(), "sync state saved");
            Ok(())
        })
    }

    fn save_identity<'a>(
        &'a self,
        collection: &'a str,
        source_id: &'a str,
        target_id: &'a str,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let identity = {
                let mut cache = self.cache.write().await;
                cache.identity_set(collection, source_id, target_id);
                cache.identity.clone()
            };
            self.write_doc(IDENTITY_MAP_DOC, &identity).await
        })
    }

    fn save_hash<'a>(
        &'a self,
        collection: &'a str,
        source_id: &'a str,
        hash: &'a str,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let hashes = {
                let mut cache = self.cache.write().await;
                cache.hash_set(collection, source_id, hash);
                cache.hashes.clone()
            };
            self.write_doc(HASH_MAP_DOC, &hashes).await
        })
    }

    fn save_asset<'a>(&'a self, asset_id: &'a str, entry: &'a AssetEntry) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let assets = {
                let mut cache = self.cache.write().await;
                cache.assets.insert(asset_id.to_string(), entry.clone());
                cache.assets.clone()
            };
            self.write_doc(ASSET_MAP_DOC, &assets).await
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-memory implementation (tests)
// ═══════════════════════════════════════════════════════════════════════════════

/// In-memory store used by tests and by the check-only dry run.
#[derive(Default)]
pub struct InMemoryMappingStore {
    state: RwLock<SyncState>,
    save_calls: std::sync::atomic::AtomicUsize,
}

impl InMemoryMappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: SyncState) -> Self {
        Self {
            state: RwLock::new(state),
            save_calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Snapshot of the current state (for assertions).
    pub async fn snapshot(&self) -> SyncState {
        self.state.read().await.clone()
    }

    /// Number of full `save()` calls observed.
    pub fn save_count(&self) -> usize {
        self.save_calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl MappingStore for InMemoryMappingStore {
    fn load(&self) -> BoxFuture<'_, SyncState> {
        Box::pin(async move { Ok(self.state.read().await.clone()) })
    }

    fn save<'a>(&'a self, state: &'a SyncState) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.save_calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            *self.state.write().await = state.clone();
            Ok(())
        })
    }

    fn save_identity<'a>(
        &'a self,
        collection: &'a str,
        source_id: &'a str,
        target_id: &'a str,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.state
                .write()
                .await
                .identity_set(collection, source_id, target_id);
            Ok(())
        })
    }

    fn save_hash<'a>(
        &'a self,
        collection: &'a str,
        source_id: &'a str,
        hash: &'a str,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.state.write().await.hash_set(collection, source_id, hash);
            Ok(())
        })
    }

    fn save_asset<'a>(&'a self, asset_id: &'a str, entry: &'a AssetEntry) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.state
                .write()
                .await
                .assets
                .insert(asset_id.to_string(), entry.clone());
            Ok(())
        })
    }
}
