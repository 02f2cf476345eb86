// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Change detection: stable content hashing and the create/update/skip
//! decision.
//!
//! The hash is computed over a canonical, recursively key-sorted JSON
//! serialization so field order never affects the digest. The `slug` field
//! is excluded: slugs may be adopted from the target, and a slug
//! recomputation alone must never trigger a spurious update.

use crate::record::FieldData;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Field excluded from hashing because it is identity-bearing: it may be
/// adopted from the target rather than derived from the source.
const EXCLUDED_FIELD: &str = "slug";

/// What to do with a record, per the change detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// No existing target item: create one.
    Create,
    /// Hash differs from the previous hash (or force is set): update.
    Update,
    /// Nothing changed: leave the target item alone.
    Skip,
}

/// Decide create/update/skip for a record.
///
/// `prev_hash` is the hash to compare against: either the stored hash or,
/// when the target item was confirmed live, a hash recomputed from current
/// target state (see the collection syncer).
pub fn decide(
    existing_id: Option<&str>,
    prev_hash: Option<&str>,
    new_hash: &str,
    force: bool,
) -> Decision {
    match existing_id {
        None => Decision::Create,
        Some(_) if force => Decision::Update,
        Some(_) => match prev_hash {
            Some(prev) if prev == new_hash => Decision::Skip,
            _ => Decision::Update,
        },
    }
}

/// Hash a mapped field payload, excluding the slug field.
pub fn content_hash(fields: &FieldData) -> String {
    let mut hasher = Sha256::new();
    let mut keys: Vec<&String> = fields.keys().filter(|k| *k != EXCLUDED_FIELD).collect();
    keys.sort();
    for key in keys {
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
        hasher.update(canonical_json(&fields[key]).as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

/// Hash of a live target item's field data, restricted to the keys the
/// mapper produced. The target stores fields we never write; including
/// them would make every comparison a mismatch.
pub fn content_hash_restricted(live: &FieldData, mapped: &FieldData) -> String {
    let mut restricted = FieldData::new();
    for key in mapped.keys() {
        if let Some(value) = live.get(key) {
            restricted.insert(key.clone(), value.clone());
        }
    }
    content_hash(&restricted)
}

/// Serialize a JSON value canonically: object keys recursively sorted,
/// compact separators. `serde_json` strings and numbers already have a
/// single canonical form.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let entries: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        serde_json::to_string(k).unwrap_or_default(),
                        canonical_json(&map[k])
                    )
                })
                .collect();
            format!("{{{}}}", entries.join(","))
        }
        Value::Array(items) => {
            let entries: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", entries.join(","))
        }
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}
