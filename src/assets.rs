// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Incremental asset synchronization.
//!
//! Binaries are immutable per source asset id (a changed image gets a new
//! id), so the asset map answers "already uploaded?" with a single lookup
//! and a mapped asset costs zero network calls. Metadata (alt text) can
//! change without the binary changing; that is patched in place,
//! best-effort, without re-uploading.
//!
//! Uploads go through the fixed-gap [`UploadThrottle`] because the target
//! rate-limits binary uploads far harder than metadata calls.

use crate::client::TargetApi;
use crate::error::Result;
use crate::record::ImageRef;
use crate::resilience::UploadThrottle;
use crate::source::{derive_asset_filename, derive_asset_url, SourceStore};
use crate::store::{AssetEntry, SyncState};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Counters for one batch of asset work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssetOutcome {
    /// Binaries uploaded to the target.
    pub uploaded: usize,
    /// Assets served from the asset map with no network traffic.
    pub reused: usize,
    /// Metadata patched without re-upload.
    pub metadata_updated: usize,
    /// Assets that could not be synced; referencing fields are omitted.
    pub failed: usize,
}

/// Uploads source assets to the target, deduplicating via the asset map.
pub struct AssetSyncer<'a, A: TargetApi, S: SourceStore> {
    api: &'a A,
    source: &'a S,
    throttle: &'a UploadThrottle,
    asset_base_url: &'a str,
}

impl<'a, A: TargetApi, S: SourceStore> AssetSyncer<'a, A, S> {
    pub fn new(
        api: &'a A,
        source: &'a S,
        throttle: &'a UploadThrottle,
        asset_base_url: &'a str,
    ) -> Self {
        Self {
            api,
            source,
            throttle,
            asset_base_url,
        }
    }

    /// Ensure every referenced image exists on the target, updating the
    /// asset map in place. Per-asset failures are logged and counted; the
    /// records referencing a failed asset simply omit it.
    pub async fn ensure_assets(
        &self,
        images: &[&ImageRef],
        state: &mut SyncState,
    ) -> AssetOutcome {
        let mut outcome = AssetOutcome::default();
        for image in images {
            match self.ensure_asset(image, state).await {
                Ok(AssetStatus::Uploaded) => outcome.uploaded += 1,
                Ok(AssetStatus::Reused) => {
                    crate::metrics::record_asset_dedup_hit();
                    outcome.reused += 1;
                }
                Ok(AssetStatus::MetadataUpdated) => {
                    crate::metrics::record_asset_dedup_hit();
                    outcome.metadata_updated += 1;
                }
                Err(e) => {
                    warn!(asset_id = %image.asset_id, error = %e, "asset sync failed, field will be omitted");
                    outcome.failed += 1;
                }
            }
        }
        outcome
    }

    async fn ensure_asset(&self, image: &ImageRef, state: &mut SyncState) -> Result<AssetStatus> {
        let alt_text = image.alt.primary().map(str::to_string);

        if let Some(entry) = state.assets.get(&image.asset_id) {
            if entry.alt_text == alt_text {
                debug!(asset_id = %image.asset_id, "asset already synced");
                return Ok(AssetStatus::Reused);
            }
            // Binary unchanged, alt text drifted: patch metadata only.
            // Failure here is tolerable; the stale alt text stands.
            let target_asset_id = entry.target_asset_id.clone();
            let filename = entry.filename.clone();
            if let Err(e) = self
                .api
                .update_asset_metadata(&target_asset_id, &filename, alt_text.as_deref())
                .await
            {
                warn!(asset_id = %image.asset_id, error = %e, "asset metadata update failed");
                return Ok(AssetStatus::Reused);
            }
            if let Some(entry) = state.assets.get_mut(&image.asset_id) {
                entry.alt_text = alt_text;
                entry.last_updated = unix_now();
            }
            return Ok(AssetStatus::MetadataUpdated);
        }

        // New asset: download, fingerprint, create metadata, upload.
        let bytes = self.source.fetch_asset_bytes(&image.asset_id).await?;
        let fingerprint = format!("{:x}", Sha256::digest(&bytes));
        let filename = derive_asset_filename(&image.asset_id);

        let ticket = self.api.create_asset(&filename, &fingerprint).await?;
        self.throttle.acquire().await;
        self.api.upload_asset_binary(&ticket, bytes).await?;
        crate::metrics::record_asset_upload();
        info!(asset_id = %image.asset_id, target_asset_id = %ticket.asset_id, "asset uploaded");

        state.assets.insert(
            image.asset_id.clone(),
            AssetEntry {
                target_asset_id: ticket.asset_id,
                alt_text,
                filename,
                url: derive_asset_url(self.asset_base_url, &image.asset_id),
                last_updated: unix_now(),
            },
        );
        Ok(AssetStatus::Uploaded)
    }
}

enum AssetStatus {
    Uploaded,
    Reused,
    MetadataUpdated,
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
