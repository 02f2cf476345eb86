// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the sync engine.
//!
//! Thin wrappers over the `metrics` facade so call sites stay one line and
//! metric names live in one place. A recorder (Prometheus or otherwise) is
//! installed by the embedding application; without one these are no-ops.
//!
//! All metrics are prefixed `collection_sync_`.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a retried API call (the attempt that failed, not the retry).
pub fn record_api_retry(operation: &str) {
    counter!("collection_sync_api_retries_total", "operation" => operation.to_string())
        .increment(1);
}

/// Record a per-record outcome within a collection pass.
/// `action` is one of: created, updated, skipped, ambiguous, errored.
pub fn record_record_action(collection: &str, action: &'static str) {
    counter!(
        "collection_sync_records_total",
        "collection" => collection.to_string(),
        "action" => action
    )
    .increment(1);
}

/// Record an asset binary upload to the target.
pub fn record_asset_upload() {
    counter!("collection_sync_asset_uploads_total").increment(1);
}

/// Record an asset served from the asset map without re-upload.
pub fn record_asset_dedup_hit() {
    counter!("collection_sync_asset_dedup_hits_total").increment(1);
}

/// Record a cached identity that pointed at a deleted target item.
pub fn record_stale_identity(collection: &str) {
    counter!("collection_sync_stale_identities_total", "collection" => collection.to_string())
        .increment(1);
}

/// Record an identity adopted from a pre-existing target item.
/// `method` is "slug" or "name".
pub fn record_adoption(collection: &str, method: &'static str) {
    counter!(
        "collection_sync_adoptions_total",
        "collection" => collection.to_string(),
        "method" => method
    )
    .increment(1);
}

/// Record the wall time of one sync phase.
pub fn record_phase_duration(phase: &str, elapsed: Duration) {
    histogram!("collection_sync_phase_duration_seconds", "phase" => phase.to_string())
        .record(elapsed.as_secs_f64());
}

/// Record the wall time and outcome of a whole run.
pub fn record_run(elapsed: Duration, success: bool) {
    histogram!("collection_sync_run_duration_seconds").record(elapsed.as_secs_f64());
    counter!(
        "collection_sync_runs_total",
        "outcome" => if success { "ok" } else { "error" }
    )
    .increment(1);
}

/// Record the current size of the identity map after a save.
pub fn record_identity_map_size(entries: usize) {
    gauge!("collection_sync_identity_map_entries").set(entries as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Without an installed recorder these must be silent no-ops.
    #[test]
    fn test_metrics_are_noops_without_recorder() {
        record_api_retry("list_items");
        record_record_action("artists", "created");
        record_asset_upload();
        record_asset_dedup_hit();
        record_stale_identity("artworks");
        record_adoption("artists", "slug");
        record_phase_duration("foundation", Duration::from_millis(5));
        record_run(Duration::from_secs(1), true);
        record_identity_map_size(42);
    }
}
