// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # collection-sync
//!
//! One-way synchronization from a document-oriented editorial content
//! store into a collection-based site CMS. The source store is the system
//! of record; target items are derived artifacts the engine creates,
//! updates and publishes to match it.
//!
//! ## Architecture
//!
//! ```text
//!                         ┌──────────────────┐
//!                         │    SyncEngine    │  phases, cascade,
//!                         │   (coordinator)  │  progress events
//!                         └────────┬─────────┘
//!              ┌───────────────────┼───────────────────┐
//!              ▼                   ▼                   ▼
//!     ┌────────────────┐  ┌────────────────┐  ┌────────────────┐
//!     │ CollectionSyncer│ │   AssetSyncer  │  │  MappingStore  │
//!     │ map → decide →  │ │ dedup, throttle│  │ identity/hash/ │
//!     │ create/update/  │ │    uploads     │  │   asset maps   │
//!     │    publish      │ └───────┬────────┘  └───────┬────────┘
//!     └───────┬────────┘          │                   │
//!             ▼                   ▼                   ▼
//!     ┌────────────────┐  ┌────────────────┐  ┌────────────────┐
//!     │   TargetApi    │  │  SourceStore   │  │  state docs in │
//!     │ (collection    │  │ (content store │  │  the source    │
//!     │     CMS)       │  │    + CDN)      │  │     store      │
//!     └────────────────┘  └────────────────┘  └────────────────┘
//! ```
//!
//! ## Core guarantees
//!
//! - **Stable identity**: each source record maps to at most one target
//!   item, via the persisted identity map. Cached ids are verified against
//!   a live listing each run; stale entries self-heal.
//! - **Adoption over duplication**: when no mapping exists, a pre-existing
//!   target item is adopted by slug, then by unique display name. An
//!   ambiguous name match skips the record rather than guess.
//! - **Change detection**: a canonical content hash (slug excluded)
//!   decides create/update/skip; when the target item is live, the
//!   comparison hash is recomputed from its current field data so
//!   out-of-band edits are overwritten, not ignored.
//! - **Dependency order**: foundation collections sync before referencing
//!   ones; a reverse-link pass repairs references pruned because their
//!   targets did not exist yet.
//! - **Partial failure tolerance**: record-scoped errors are counted and
//!   the run continues; transient failures retry with exponential backoff.
//!
//! ## Modules
//!
//! | Module | Responsibility |
//! |--------|---------------|
//! | [`config`] | Connection settings, run flags, batch limits |
//! | [`record`] | Source records, target items, rich text model |
//! | [`hash`] | Canonical content hashing and the sync decision |
//! | [`mappers`] | Pure record → field payload transforms |
//! | [`store`] | Persisted identity/hash/asset maps |
//! | [`client`] | Target CMS API client and existence index |
//! | [`source`] | Content store client and asset URL derivation |
//! | [`assets`] | Incremental asset upload with dedup |
//! | [`syncer`] | Per-collection sync state machine |
//! | [`coordinator`] | Full runs, single-record cascade, progress |
//! | [`trigger`] | HTTP endpoint for editor-initiated syncs |
//! | [`resilience`] | Retry with backoff, upload throttle |
//! | [`error`] | Error taxonomy ([`error::SyncError`]) |
//! | [`metrics`] | Counters and histograms for observability |

pub mod assets;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod hash;
pub mod mappers;
pub mod metrics;
pub mod record;
pub mod resilience;
pub mod source;
pub mod store;
pub mod syncer;
pub mod trigger;

pub use client::{ExistenceIndex, HttpTargetClient, TargetApi};
pub use config::SyncConfig;
pub use coordinator::{Phase, ProgressEvent, SyncEngine, SyncReport};
pub use error::{Result, SyncError};
pub use record::{RecordType, SourceRecord, TargetItem};
pub use source::{HttpSourceStore, SourceStore};
pub use store::{InMemoryMappingStore, MappingStore, SourceMappingStore, SyncState};
pub use syncer::{CollectionOutcome, CollectionSyncer};
