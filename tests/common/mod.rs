// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Shared test harness: in-memory mock implementations of both systems
//! and a pre-wired engine builder.

pub mod mock_api;
pub mod mock_source;

use collection_sync::config::{SyncConfig, SyncLimits};
use collection_sync::store::InMemoryMappingStore;
use collection_sync::SyncEngine;
use mock_api::MockTargetApi;
use mock_source::MockSourceStore;
use std::sync::Arc;

/// Test config: placeholder credentials, small batches, no upload delay.
pub fn test_config() -> SyncConfig {
    let mut config = SyncConfig::for_testing();
    config.limits = SyncLimits::testing();
    config
}

/// A fully wired engine plus handles to its mocks and store.
pub struct Harness {
    pub api: Arc<MockTargetApi>,
    pub source: Arc<MockSourceStore>,
    pub store: Arc<InMemoryMappingStore>,
    pub engine: SyncEngine<MockTargetApi, MockSourceStore, InMemoryMappingStore>,
}

impl Harness {
    pub fn new(config: SyncConfig) -> Self {
        Self::with_parts(
            MockTargetApi::new(),
            MockSourceStore::new(),
            InMemoryMappingStore::new(),
            config,
        )
    }

    pub fn with_parts(
        api: MockTargetApi,
        source: MockSourceStore,
        store: InMemoryMappingStore,
        config: SyncConfig,
    ) -> Self {
        let api = Arc::new(api);
        let source = Arc::new(source);
        let store = Arc::new(store);
        let engine = SyncEngine::new(
            Arc::clone(&api),
            Arc::clone(&source),
            Arc::clone(&store),
            config,
        );
        Self {
            api,
            source,
            store,
            engine,
        }
    }
}
