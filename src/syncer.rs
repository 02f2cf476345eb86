// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-collection synchronization.
//!
//! [`CollectionSyncer::sync_collection`] runs one collection through the
//! full pipeline: map each record, establish its target identity (cached
//! mapping, record-level fallback, or adoption), decide create/update/skip
//! against the live target state, then flush creates in batches, updates
//! individually, and publishes last.
//!
//! # Identity resolution order
//!
//! 1. Identity map entry `(collection, source_id)`
//! 2. `target_item_id` stored on the source record (legacy integrations)
//! 3. Adoption by slug against the full listing
//! 4. Adoption by exact display name, only when it matches exactly one
//!    item (gated by `adopt_by_name`; ambiguity skips the record)
//!
//! Every candidate id is verified against the current listing before use;
//! a cached id pointing at a deleted item is removed and the record falls
//! through to adoption or creation. When the candidate is live, the
//! previous hash is recomputed from the item's current field data
//! (restricted to mapped keys) so out-of-band target edits are detected
//! even when the stored hash claims nothing changed.
//!
//! Partial failure tolerance: record-scoped errors and exhausted retries
//! are counted in the outcome and the pass continues; only run-scoped
//! errors (state store, config) abort.

use crate::client::{ExistenceIndex, TargetApi};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::hash::{content_hash, content_hash_restricted, decide, Decision};
use crate::mappers::{map_record, MapperContext};
use crate::record::{FieldData, RecordType, SourceRecord};
use crate::store::{MappingStore, SyncState};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Per-item outcome counts for one collection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CollectionOutcome {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Records skipped because name adoption was ambiguous.
    pub ambiguous: usize,
    /// Records that failed mapping, creation or update.
    pub errored: usize,
}

impl CollectionOutcome {
    pub fn merge(&mut self, other: &CollectionOutcome) {
        self.created += other.created;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.ambiguous += other.ambiguous;
        self.errored += other.errored;
    }

    pub fn total(&self) -> usize {
        self.created + self.updated + self.skipped + self.ambiguous + self.errored
    }

    /// True when every record either synced cleanly or was a no-op.
    pub fn is_clean(&self) -> bool {
        self.ambiguous == 0 && self.errored == 0
    }
}

/// A record staged for batch creation.
struct PendingCreate {
    source_id: String,
    slug: String,
    payload: FieldData,
}

/// A record staged for individual update.
struct PendingUpdate {
    source_id: String,
    target_id: String,
    payload: FieldData,
    new_hash: String,
}

/// Synchronizes one collection at a time. Stateless between calls; all
/// run state lives in the [`SyncState`] and confirmed set passed in.
pub struct CollectionSyncer<'a, A: TargetApi> {
    api: &'a A,
    config: &'a SyncConfig,
}

impl<'a, A: TargetApi> CollectionSyncer<'a, A> {
    pub fn new(api: &'a A, config: &'a SyncConfig) -> Self {
        Self { api, config }
    }

    /// Sync all given records of one type into their collection.
    ///
    /// `confirmed` holds every target id known to exist; creations made
    /// here are added to it (and to `index`) so later collections in the
    /// same run can reference them.
    pub async fn sync_collection(
        &self,
        record_type: RecordType,
        records: &[SourceRecord],
        state: &mut SyncState,
        confirmed: &mut HashSet<String>,
        index: &mut ExistenceIndex,
        store: &dyn MappingStore,
    ) -> Result<CollectionOutcome> {
        let collection = record_type.collection();
        let check_only = self.config.runtime.check_only;
        let mut outcome = CollectionOutcome::default();
        let mut pending_creates: Vec<PendingCreate> = Vec::new();
        let mut pending_updates: Vec<PendingUpdate> = Vec::new();
        let mut touched: Vec<String> = Vec::new();

        for record in records {
            debug_assert_eq!(record.record_type(), record_type);

            let payload = {
                let ctx = MapperContext {
                    state,
                    confirmed,
                    limits: &self.config.limits,
                    asset_base_url: &self.config.source.asset_base_url,
                };
                match map_record(record, &ctx) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(record_id = %record.id, error = %e, "mapping failed, record skipped");
                        crate::metrics::record_record_action(collection, "errored");
                        outcome.errored += 1;
                        continue;
                    }
                }
            };
            let new_hash = content_hash(&payload);

            // Identity resolution with live verification.
            let mut candidate = state
                .identity_get(collection, &record.id)
                .map(str::to_string)
                .or_else(|| record.target_item_id.clone());
            let mut prev_hash: Option<String> = None;

            if let Some(id) = candidate.clone() {
                match index.get(&id) {
                    Some(live) => {
                        // Compare against what the target holds right now,
                        // not what we last wrote.
                        prev_hash = Some(content_hash_restricted(&live.field_data, &payload));
                        if state.identity_get(collection, &record.id).is_none() {
                            // Came from the record-level fallback: promote
                            // it into the identity map.
                            state.identity_set(collection, &record.id, &id);
                            if !check_only {
                                self.persist_identity(store, collection, &record.id, &id).await;
                            }
                        }
                    }
                    None => {
                        warn!(
                            record_id = %record.id,
                            target_id = %id,
                            "mapped target item no longer exists, healing identity"
                        );
                        crate::metrics::record_stale_identity(collection);
                        state.identity_remove(collection, &record.id);
                        candidate = None;
                    }
                }
            }

            // Adoption: slug first, then unique display name.
            if candidate.is_none() {
                match self.adopt(record, &payload, index) {
                    Ok(Some(adopted_id)) => {
                        state.identity_set(collection, &record.id, &adopted_id);
                        if !check_only {
                            self.persist_identity(store, collection, &record.id, &adopted_id)
                                .await;
                        }
                        if let Some(live) = index.get(&adopted_id) {
                            prev_hash =
                                Some(content_hash_restricted(&live.field_data, &payload));
                        }
                        candidate = Some(adopted_id);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(record_id = %record.id, error = %e, "adoption ambiguous, record skipped");
                        crate::metrics::record_record_action(collection, "ambiguous");
                        outcome.ambiguous += 1;
                        continue;
                    }
                }
            }

            let stored_hash = state.hash_get(collection, &record.id).map(str::to_string);
            let effective_prev = prev_hash.or(stored_hash);
            match decide(
                candidate.as_deref(),
                effective_prev.as_deref(),
                &new_hash,
                self.config.runtime.force,
            ) {
                Decision::Create => {
                    let slug = payload
                        .get("slug")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    pending_creates.push(PendingCreate {
                        source_id: record.id.clone(),
                        slug,
                        payload,
                    });
                }
                Decision::Update => {
                    if let Some(target_id) = candidate {
                        let mut payload = payload;
                        // Slugs are stable once an item has one; an update
                        // never overwrites it (URLs would break).
                        if index.get(&target_id).and_then(|i| i.slug()).is_some() {
                            payload.remove("slug");
                        }
                        pending_updates.push(PendingUpdate {
                            source_id: record.id.clone(),
                            target_id,
                            payload,
                            new_hash,
                        });
                    }
                }
                Decision::Skip => {
                    crate::metrics::record_record_action(collection, "skipped");
                    outcome.skipped += 1;
                }
            }
        }

        if check_only {
            outcome.created += pending_creates.len();
            outcome.updated += pending_updates.len();
            info!(
                collection,
                would_create = pending_creates.len(),
                would_update = pending_updates.len(),
                skipped = outcome.skipped,
                "check-only pass complete"
            );
            return Ok(outcome);
        }

        self.flush_creates(
            collection,
            pending_creates,
            state,
            confirmed,
            index,
            store,
            &mut outcome,
            &mut touched,
        )
        .await?;

        self.flush_updates(collection, pending_updates, state, store, &mut outcome, &mut touched)
            .await?;

        self.publish(collection, state, &touched, &outcome).await;

        info!(
            collection,
            created = outcome.created,
            updated = outcome.updated,
            skipped = outcome.skipped,
            ambiguous = outcome.ambiguous,
            errored = outcome.errored,
            "collection synced"
        );
        Ok(outcome)
    }

    /// Adoption lookup. `Ok(None)` means no match (create); an error means
    /// an ambiguous name match.
    fn adopt(
        &self,
        record: &SourceRecord,
        payload: &FieldData,
        index: &ExistenceIndex,
    ) -> Result<Option<String>> {
        let collection = record.record_type().collection();

        let slug = payload
            .get("slug")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty());
        if let Some(slug) = slug {
            if let Some(id) = index.id_for_slug(slug) {
                info!(record_id = %record.id, target_id = id, slug, "adopted existing item by slug");
                crate::metrics::record_adoption(collection, "slug");
                return Ok(Some(id.to_string()));
            }
        }

        if !self.config.runtime.adopt_by_name {
            return Ok(None);
        }
        let Some(name) = payload.get("name").and_then(|v| v.as_str()) else {
            return Ok(None);
        };
        match index.ids_for_name(name) {
            [] => Ok(None),
            [id] => {
                // Name matches are weaker than slug matches; flag them.
                warn!(record_id = %record.id, target_id = %id, name, "adopted existing item by name");
                crate::metrics::record_adoption(collection, "name");
                Ok(Some(id.clone()))
            }
            many => Err(SyncError::AmbiguousAdoption {
                record_id: record.id.clone(),
                name: name.to_string(),
                candidates: many.len(),
            }),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn flush_creates(
        &self,
        collection: &str,
        pending: Vec<PendingCreate>,
        state: &mut SyncState,
        confirmed: &mut HashSet<String>,
        index: &mut ExistenceIndex,
        store: &dyn MappingStore,
        outcome: &mut CollectionOutcome,
        touched: &mut Vec<String>,
    ) -> Result<()> {
        let batch_size = self.config.limits.create_batch_size;
        for batch in pending.chunks(batch_size) {
            let payloads: Vec<FieldData> = batch.iter().map(|p| p.payload.clone()).collect();
            let created = match self.api.create_items(collection, payloads).await {
                Ok(items) => items,
                Err(e) if e.is_record_scoped() || e.is_retryable() => {
                    warn!(collection, batch = batch.len(), error = %e, "batch create failed");
                    for _ in batch {
                        crate::metrics::record_record_action(collection, "errored");
                    }
                    outcome.errored += batch.len();
                    continue;
                }
                Err(e) => return Err(e),
            };

            // The response order is not guaranteed; correlate by slug.
            let mut matched: HashSet<&str> = HashSet::new();
            for item in created {
                // An empty slug matches nothing rather than everything.
                let Some(entry) = item
                    .slug()
                    .filter(|slug| !slug.is_empty())
                    .and_then(|slug| batch.iter().find(|p| p.slug == slug))
                else {
                    warn!(collection, item_id = %item.id, "created item matches no staged record");
                    continue;
                };
                matched.insert(entry.source_id.as_str());
                state.identity_set(collection, &entry.source_id, &item.id);
                self.persist_identity(store, collection, &entry.source_id, &item.id)
                    .await;
                confirmed.insert(item.id.clone());
                touched.push(item.id.clone());
                crate::metrics::record_record_action(collection, "created");
                outcome.created += 1;
                index.insert(item);
            }
            for entry in batch.iter().filter(|p| !matched.contains(p.source_id.as_str())) {
                warn!(collection, record_id = %entry.source_id, "no created item for staged record");
                crate::metrics::record_record_action(collection, "errored");
                outcome.errored += 1;
            }
        }
        Ok(())
    }

    async fn flush_updates(
        &self,
        collection: &str,
        pending: Vec<PendingUpdate>,
        state: &mut SyncState,
        store: &dyn MappingStore,
        outcome: &mut CollectionOutcome,
        touched: &mut Vec<String>,
    ) -> Result<()> {
        for update in pending {
            match self
                .api
                .update_item(collection, &update.target_id, update.payload)
                .await
            {
                Ok(_) => {
                    // The hash is committed only after the write lands, so
                    // a crash mid-run re-updates rather than silently skips.
                    state.hash_set(collection, &update.source_id, &update.new_hash);
                    if let Err(e) = store
                        .save_hash(collection, &update.source_id, &update.new_hash)
                        .await
                    {
                        warn!(record_id = %update.source_id, error = %e, "incremental hash save failed");
                    }
                    touched.push(update.target_id);
                    crate::metrics::record_record_action(collection, "updated");
                    outcome.updated += 1;
                }
                Err(e) if e.is_record_scoped() || e.is_retryable() => {
                    warn!(
                        collection,
                        record_id = %update.source_id,
                        target_id = %update.target_id,
                        error = %e,
                        "update failed, record skipped"
                    );
                    crate::metrics::record_record_action(collection, "errored");
                    outcome.errored += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Publish touched items (or everything mapped, with `publish_all`).
    /// Publishing is best-effort: a failure leaves items staged, which the
    /// next run retries.
    async fn publish(
        &self,
        collection: &str,
        state: &SyncState,
        touched: &[String],
        outcome: &CollectionOutcome,
    ) {
        let ids: Vec<String> = if self.config.runtime.publish_all {
            state
                .identity
                .get(collection)
                .map(|m| m.values().cloned().collect())
                .unwrap_or_default()
        } else if self.config.runtime.auto_publish {
            touched.to_vec()
        } else {
            return;
        };
        if ids.is_empty() {
            return;
        }

        for batch in ids.chunks(self.config.limits.create_batch_size) {
            if let Err(e) = self.api.publish_items(collection, batch.to_vec()).await {
                warn!(collection, batch = batch.len(), error = %e, "publish failed, items remain staged");
            }
        }
        debug!(
            collection,
            published = ids.len(),
            created = outcome.created,
            updated = outcome.updated,
            "publish pass complete"
        );
    }

    /// Best-effort incremental identity persistence: the target item
    /// already exists, so losing the write only costs an adoption next run.
    async fn persist_identity(
        &self,
        store: &dyn MappingStore,
        collection: &str,
        source_id: &str,
        target_id: &str,
    ) {
        if let Err(e) = store.save_identity(collection, source_id, target_id).await {
            warn!(collection, source_id, error = %e, "incremental identity save failed");
        }
    }
}
