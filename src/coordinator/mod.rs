// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Run coordination: multi-phase full runs and the single-record fast
//! path with dependency cascade.
//!
//! # Full run
//!
//! ```text
//! load state ─ fetch records ─ rebuild order index ─ list target items
//!      │
//!      ├─ sync assets (dedup via asset map, throttled uploads)
//!      ├─ phase: foundation      (artists)
//!      ├─ phase: referencing     (artworks, exhibitions)
//!      ├─ phase: reverse-link    (exhibitions re-pass)
//!      └─ save state
//! ```
//!
//! The confirmed-existence set is shared across phases: every creation is
//! added to it immediately, so references to items created earlier in the
//! same run resolve. References to items created *later* in the run are
//! pruned at mapping time and repaired by the reverse-link pass.
//!
//! # Single-record run
//!
//! Loads only the state entries relevant to one record, ensures its
//! dependencies exist on the target (one cascade level per dependency
//! hop), syncs the record, and persists through incremental writes only;
//! a full state save here would clobber entries outside the loaded scope.

mod types;

pub use types::{Phase, ProgressEvent, SyncReport};

use crate::assets::AssetSyncer;
use crate::client::{ExistenceIndex, TargetApi};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::record::{ImageRef, RecordType, SourceRecord};
use crate::resilience::UploadThrottle;
use crate::source::SourceStore;
use crate::store::{MappingStore, SyncState};
use crate::syncer::CollectionSyncer;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

/// The engine: owns the trait objects for both systems and the mapping
/// store, and drives runs.
pub struct SyncEngine<A: TargetApi, S: SourceStore, M: MappingStore> {
    api: Arc<A>,
    source: Arc<S>,
    store: Arc<M>,
    config: SyncConfig,
    progress_tx: Option<UnboundedSender<ProgressEvent>>,
}

impl<A: TargetApi, S: SourceStore, M: MappingStore> Clone for SyncEngine<A, S, M> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            source: Arc::clone(&self.source),
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            progress_tx: self.progress_tx.clone(),
        }
    }
}

impl<A: TargetApi, S: SourceStore, M: MappingStore> SyncEngine<A, S, M> {
    pub fn new(api: Arc<A>, source: Arc<S>, store: Arc<M>, config: SyncConfig) -> Self {
        Self {
            api,
            source,
            store,
            config,
            progress_tx: None,
        }
    }

    /// Attach a progress channel. Events are dropped if the receiver goes
    /// away; a run never blocks on its observer.
    pub fn with_progress(mut self, tx: UnboundedSender<ProgressEvent>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn emit(&self, phase: Phase, message: impl Into<String>, current: usize, total: usize) {
        if let Some(tx) = &self.progress_tx {
            // Ignore send failures: the listener disconnected.
            let _ = tx.send(ProgressEvent {
                phase,
                message: message.into(),
                current,
                total,
            });
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Full run
    // ═══════════════════════════════════════════════════════════════════

    /// Run a full synchronization of every collection.
    pub async fn run_full(&self) -> Result<SyncReport> {
        self.config.validate()?;
        let run_start = Instant::now();
        let check_only = self.config.runtime.check_only;
        let since = self.config.runtime.since.as_deref();

        let mut state = self.store.load().await?;

        // Fetch every record type up front; the order index needs the
        // ordered parents before any collection syncs.
        let mut records: HashMap<RecordType, Vec<SourceRecord>> = HashMap::new();
        for record_type in RecordType::ALL {
            let fetched = self.source.records_of_type(record_type, since).await?;
            records.insert(record_type, fetched);
        }
        state.rebuild_order_index(records.values().flatten());

        let (mut indexes, mut confirmed) = self.list_collections(RecordType::ALL.iter().copied()).await?;

        if !check_only {
            let images: Vec<&ImageRef> = records
                .values()
                .flatten()
                .flat_map(|r| r.images())
                .collect();
            self.sync_assets(&images, &mut state).await;
        }

        let total_passes: usize = Phase::ALL.iter().map(|p| p.record_types().len()).sum();
        let mut current = 0usize;
        let mut report = SyncReport {
            check_only,
            ..Default::default()
        };
        let syncer = CollectionSyncer::new(self.api.as_ref(), &self.config);

        for phase in Phase::ALL {
            // A dry run creates nothing, so a re-pass could only
            // double-count the same would-create decisions.
            if check_only && phase == Phase::ReverseLink {
                continue;
            }
            let phase_start = Instant::now();
            for record_type in phase.record_types() {
                let collection = record_type.collection();
                self.emit(phase, format!("syncing {collection}"), current, total_passes);
                let batch = records.get(&record_type).map(Vec::as_slice).unwrap_or(&[]);
                let index = indexes
                    .get_mut(collection)
                    .ok_or_else(|| SyncError::Internal(format!("no listing for {collection}")))?;
                let outcome = syncer
                    .sync_collection(
                        record_type,
                        batch,
                        &mut state,
                        &mut confirmed,
                        index,
                        self.store.as_ref(),
                    )
                    .await?;
                report.record(collection, &outcome);
                current += 1;
                self.emit(phase, format!("{collection} done"), current, total_passes);
            }
            crate::metrics::record_phase_duration(&phase.to_string(), phase_start.elapsed());
        }

        if !check_only {
            self.store.save(&state).await?;
            crate::metrics::record_identity_map_size(state.identity_count());
        }

        report.duration_ms = run_start.elapsed().as_millis() as u64;
        crate::metrics::record_run(run_start.elapsed(), report.is_clean());
        info!(
            duration_ms = report.duration_ms,
            check_only,
            totals = ?report.totals(),
            "run complete"
        );
        Ok(report)
    }

    /// Run one collection in isolation.
    ///
    /// Referenced collections are listed (so references can resolve and be
    /// confirmed) but not synced; records pointing at never-synced
    /// dependencies simply omit those references, same as a full run
    /// before its reverse-link pass.
    pub async fn run_collection(&self, record_type: RecordType) -> Result<SyncReport> {
        self.config.validate()?;
        let run_start = Instant::now();
        let check_only = self.config.runtime.check_only;
        let since = self.config.runtime.since.as_deref();

        let mut state = self.store.load().await?;
        let records = self.source.records_of_type(record_type, since).await?;

        // Artwork sort order comes from exhibition reference arrays, so
        // ordered parents are fetched for the index even when they are
        // not being synced.
        if RecordType::ALL
            .iter()
            .any(|t| t.needs_reverse_link_pass() && *t != record_type)
        {
            let mut parents = Vec::new();
            for parent_type in RecordType::ALL {
                if parent_type.needs_reverse_link_pass() && parent_type != record_type {
                    parents.extend(self.source.records_of_type(parent_type, None).await?);
                }
            }
            state.rebuild_order_index(parents.iter().chain(records.iter()));
        } else {
            state.rebuild_order_index(records.iter());
        }

        let mut types: Vec<RecordType> = vec![record_type];
        types.extend(record_type.referenced_types().iter().copied());
        let (mut indexes, mut confirmed) = self.list_collections(types.into_iter()).await?;

        if !check_only {
            let images: Vec<&ImageRef> = records.iter().flat_map(|r| r.images()).collect();
            self.sync_assets(&images, &mut state).await;
        }

        let collection = record_type.collection();
        let syncer = CollectionSyncer::new(self.api.as_ref(), &self.config);
        self.emit(phase_of(record_type), format!("syncing {collection}"), 0, 1);
        let index = indexes
            .get_mut(collection)
            .ok_or_else(|| SyncError::Internal(format!("no listing for {collection}")))?;
        let outcome = syncer
            .sync_collection(
                record_type,
                &records,
                &mut state,
                &mut confirmed,
                index,
                self.store.as_ref(),
            )
            .await?;

        let mut report = SyncReport {
            check_only,
            ..Default::default()
        };
        report.record(collection, &outcome);

        if !check_only {
            self.store.save(&state).await?;
            crate::metrics::record_identity_map_size(state.identity_count());
        }

        report.duration_ms = run_start.elapsed().as_millis() as u64;
        crate::metrics::record_run(run_start.elapsed(), report.is_clean());
        info!(
            collection,
            duration_ms = report.duration_ms,
            totals = ?report.totals(),
            "collection run complete"
        );
        Ok(report)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Single-record fast path
    // ═══════════════════════════════════════════════════════════════════

    /// Sync one record, ensuring its dependencies exist first.
    ///
    /// State is loaded scoped to the involved records and persisted only
    /// through incremental writes, so entries outside the scope are never
    /// rewritten.
    pub async fn run_single(
        &self,
        document_id: &str,
        record_type: RecordType,
        auto_publish: bool,
    ) -> Result<SyncReport> {
        self.config.validate()?;
        let run_start = Instant::now();

        let root = self.fetch_record(document_id, record_type).await?;

        // One cascade level per dependency hop: the root's references,
        // then theirs (an exhibition's artworks pull in their artists).
        let level1 = self.fetch_references(std::slice::from_ref(&root)).await?;
        let level2 = self.fetch_references(&level1).await?;
        let mut dependencies = level2;
        dependencies.extend(level1);

        let mut involved: Vec<SourceRecord> = dependencies.clone();
        involved.push(root.clone());

        let source_ids: HashSet<String> = involved.iter().map(|r| r.id.clone()).collect();
        let asset_ids: HashSet<String> = involved
            .iter()
            .flat_map(|r| r.images())
            .map(|i| i.asset_id.clone())
            .collect();
        let mut state = self.store.load_scoped(&source_ids, &asset_ids).await?;
        state.rebuild_order_index(involved.iter());

        let types: HashSet<RecordType> = involved.iter().map(|r| r.record_type()).collect();
        let (mut indexes, mut confirmed) = self.list_collections(types.iter().copied()).await?;

        if !self.config.runtime.check_only {
            let images: Vec<&ImageRef> = involved.iter().flat_map(|r| r.images()).collect();
            self.sync_assets(&images, &mut state).await;
            self.persist_assets(&asset_ids, &state).await;
        }

        // The trigger can request publication for this record without the
        // run-wide flag being set.
        let mut config = self.config.clone();
        config.runtime.auto_publish = config.runtime.auto_publish || auto_publish;
        let syncer = CollectionSyncer::new(self.api.as_ref(), &config);

        let mut report = SyncReport {
            check_only: config.runtime.check_only,
            ..Default::default()
        };
        let total_passes = RecordType::ALL.len() + 1;
        let mut current = 0usize;

        // Dependencies first, in dependency order, skipping anything that
        // is already mapped to a confirmed item.
        for dep_type in RecordType::ALL {
            let missing: Vec<SourceRecord> = dependencies
                .iter()
                .filter(|r| r.record_type() == dep_type)
                .filter(|r| {
                    state
                        .identity_get(dep_type.collection(), &r.id)
                        .map(|t| !confirmed.contains(t))
                        .unwrap_or(true)
                })
                .cloned()
                .collect();
            current += 1;
            if missing.is_empty() {
                continue;
            }
            info!(
                record_id = document_id,
                dependency_type = %dep_type,
                count = missing.len(),
                "syncing missing dependencies"
            );
            self.emit(
                phase_of(dep_type),
                format!("ensuring {} dependencies", dep_type.collection()),
                current,
                total_passes,
            );
            let index = indexes
                .get_mut(dep_type.collection())
                .ok_or_else(|| SyncError::Internal(format!("no listing for {}", dep_type.collection())))?;
            let outcome = syncer
                .sync_collection(
                    dep_type,
                    &missing,
                    &mut state,
                    &mut confirmed,
                    index,
                    self.store.as_ref(),
                )
                .await?;
            report.record(dep_type.collection(), &outcome);
        }

        let collection = record_type.collection();
        self.emit(
            phase_of(record_type),
            format!("syncing {collection} record"),
            current,
            total_passes,
        );
        let index = indexes
            .get_mut(collection)
            .ok_or_else(|| SyncError::Internal(format!("no listing for {collection}")))?;
        let outcome = syncer
            .sync_collection(
                record_type,
                std::slice::from_ref(&root),
                &mut state,
                &mut confirmed,
                index,
                self.store.as_ref(),
            )
            .await?;
        report.record(collection, &outcome);

        report.duration_ms = run_start.elapsed().as_millis() as u64;
        crate::metrics::record_run(run_start.elapsed(), report.is_clean());
        info!(
            record_id = document_id,
            duration_ms = report.duration_ms,
            totals = ?report.totals(),
            "single-record run complete"
        );
        Ok(report)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Shared plumbing
    // ═══════════════════════════════════════════════════════════════════

    async fn fetch_record(
        &self,
        document_id: &str,
        record_type: RecordType,
    ) -> Result<SourceRecord> {
        let ids = vec![document_id.to_string()];
        let mut fetched = self.source.records_by_ids(&ids).await?;
        let record = fetched
            .drain(..)
            .find(|r| r.id == document_id)
            .ok_or_else(|| SyncError::Validation {
                record_id: document_id.to_string(),
                message: "record not found in source".to_string(),
            })?;
        if record.record_type() != record_type {
            return Err(SyncError::Validation {
                record_id: document_id.to_string(),
                message: format!(
                    "record is a {}, not a {}",
                    record.record_type(),
                    record_type
                ),
            });
        }
        Ok(record)
    }

    /// Fetch the records referenced by the given records (one level).
    async fn fetch_references(&self, records: &[SourceRecord]) -> Result<Vec<SourceRecord>> {
        let ids: Vec<String> = records
            .iter()
            .flat_map(|r| r.references())
            .map(|(_, reference)| reference.id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let fetched = self.source.records_by_ids(&ids).await?;
        if fetched.len() < ids.len() {
            // Dangling references in the source; the mapper will omit them.
            warn!(
                requested = ids.len(),
                found = fetched.len(),
                "some referenced records do not exist"
            );
        }
        Ok(fetched)
    }

    /// List every involved collection and build the per-collection
    /// existence indexes plus the run-wide confirmed id set.
    async fn list_collections(
        &self,
        types: impl Iterator<Item = RecordType>,
    ) -> Result<(HashMap<&'static str, ExistenceIndex>, HashSet<String>)> {
        let mut indexes = HashMap::new();
        let mut confirmed = HashSet::new();
        for record_type in types {
            let collection = record_type.collection();
            let items = self.api.list_items(collection).await?;
            let index = ExistenceIndex::from_items(items);
            confirmed.extend(index.ids().map(str::to_string));
            indexes.insert(collection, index);
        }
        Ok((indexes, confirmed))
    }

    /// Upload missing assets. Per-asset failures are logged inside the
    /// asset syncer; affected image fields are simply omitted.
    async fn sync_assets(&self, images: &[&ImageRef], state: &mut SyncState) {
        let throttle = UploadThrottle::from_millis(self.config.limits.asset_upload_delay_ms);
        let syncer = AssetSyncer::new(
            self.api.as_ref(),
            self.source.as_ref(),
            &throttle,
            &self.config.source.asset_base_url,
        );
        let outcome = syncer.ensure_assets(images, state).await;
        info!(
            uploaded = outcome.uploaded,
            reused = outcome.reused,
            metadata_updated = outcome.metadata_updated,
            failed = outcome.failed,
            "assets synced"
        );
    }

    /// Incrementally persist asset entries touched by a scoped run.
    async fn persist_assets(&self, asset_ids: &HashSet<String>, state: &SyncState) {
        for asset_id in asset_ids {
            if let Some(entry) = state.assets.get(asset_id) {
                if let Err(e) = self.store.save_asset(asset_id, entry).await {
                    warn!(asset_id, error = %e, "incremental asset save failed");
                }
            }
        }
    }
}

fn phase_of(record_type: RecordType) -> Phase {
    if record_type.is_foundation() {
        Phase::Foundation
    } else {
        Phase::Referencing
    }
}
