// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Types shared by the coordinator and its callers: phases, progress
//! events and the end-of-run report.

use crate::record::RecordType;
use crate::syncer::CollectionOutcome;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The phases of a full run, in execution order.
///
/// Foundation types carry no outbound references and must exist before
/// anything that points at them. The reverse-link pass re-syncs types
/// whose reference arrays may have been pruned when their targets did not
/// yet exist during the referencing phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Foundation,
    Referencing,
    ReverseLink,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Foundation, Phase::Referencing, Phase::ReverseLink];

    /// The record types synced in this phase, in dependency order.
    pub fn record_types(&self) -> Vec<RecordType> {
        match self {
            Phase::Foundation => RecordType::ALL
                .into_iter()
                .filter(RecordType::is_foundation)
                .collect(),
            Phase::Referencing => RecordType::ALL
                .into_iter()
                .filter(|t| !t.is_foundation())
                .collect(),
            Phase::ReverseLink => RecordType::ALL
                .into_iter()
                .filter(RecordType::needs_reverse_link_pass)
                .collect(),
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Foundation => write!(f, "foundation"),
            Phase::Referencing => write!(f, "referencing"),
            Phase::ReverseLink => write!(f, "reverse-link"),
        }
    }
}

/// A progress notification emitted while a run executes. Consumed by the
/// interactive trigger's event stream; dropped when nobody listens.
/// Serialized field names are part of the event-stream wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub message: String,
    /// Collections completed so far within the run.
    #[serde(rename = "currentCount")]
    pub current: usize,
    /// Total collection passes the run will make.
    #[serde(rename = "totalCount")]
    pub total: usize,
}

/// End-of-run summary returned to the caller and serialized by the
/// interactive trigger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    /// Outcome per collection key. `BTreeMap` keeps report output stable.
    pub collections: BTreeMap<String, CollectionOutcome>,
    /// Whether this was a dry run (no writes issued).
    pub check_only: bool,
    pub duration_ms: u64,
}

impl SyncReport {
    /// Aggregate outcome across all collections.
    pub fn totals(&self) -> CollectionOutcome {
        let mut total = CollectionOutcome::default();
        for outcome in self.collections.values() {
            total.merge(outcome);
        }
        total
    }

    /// Merge a collection pass into the report. Re-passes over the same
    /// collection (reverse-link) accumulate rather than overwrite.
    pub fn record(&mut self, collection: &str, outcome: &CollectionOutcome) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .merge(outcome);
    }

    pub fn is_clean(&self) -> bool {
        self.totals().is_clean()
    }
}
