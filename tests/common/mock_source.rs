// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory mock of the source content store, including the reserved
//! state documents.

use collection_sync::error::BoxFuture;
use collection_sync::record::{RecordType, SourceRecord};
use collection_sync::SourceStore;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MockSourceStore {
    records: Mutex<Vec<SourceRecord>>,
    asset_bytes: Mutex<HashMap<String, Vec<u8>>>,
    state_docs: Mutex<HashMap<String, serde_json::Value>>,
}

impl MockSourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_record(&self, record: SourceRecord) {
        self.records.lock().unwrap().push(record);
    }

    /// Replace a record in place (simulates an editor saving changes).
    pub fn replace_record(&self, record: SourceRecord) {
        let mut records = self.records.lock().unwrap();
        records.retain(|r| r.id != record.id);
        records.push(record);
    }

    pub fn state_doc(&self, doc_id: &str) -> Option<serde_json::Value> {
        self.state_docs.lock().unwrap().get(doc_id).cloned()
    }
}

impl SourceStore for MockSourceStore {
    fn records_of_type<'a>(
        &'a self,
        record_type: RecordType,
        _since: Option<&'a str>,
    ) -> BoxFuture<'a, Vec<SourceRecord>> {
        Box::pin(async move {
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.record_type() == record_type)
                .cloned()
                .collect())
        })
    }

    fn records_by_ids<'a>(&'a self, ids: &'a [String]) -> BoxFuture<'a, Vec<SourceRecord>> {
        Box::pin(async move {
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| ids.contains(&r.id))
                .cloned()
                .collect())
        })
    }

    fn fetch_asset_bytes<'a>(&'a self, asset_id: &'a str) -> BoxFuture<'a, Vec<u8>> {
        Box::pin(async move {
            // Unknown assets get deterministic placeholder bytes so tests
            // need not seed every referenced image.
            Ok(self
                .asset_bytes
                .lock()
                .unwrap()
                .get(asset_id)
                .cloned()
                .unwrap_or_else(|| asset_id.as_bytes().to_vec()))
        })
    }

    fn read_state_doc<'a>(&'a self, doc_id: &'a str) -> BoxFuture<'a, Option<serde_json::Value>> {
        Box::pin(async move { Ok(self.state_doc(doc_id)) })
    }

    fn write_state_doc<'a>(
        &'a self,
        doc_id: &'a str,
        value: serde_json::Value,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.state_docs
                .lock()
                .unwrap()
                .insert(doc_id.to_string(), value);
            Ok(())
        })
    }
}
