// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Property-based tests for the pure building blocks: content hashing and
//! slug derivation.

use collection_sync::hash::content_hash;
use collection_sync::mappers::{slugify, truncate_display_name};
use collection_sync::record::FieldData;
use proptest::prelude::*;

fn field_pairs() -> impl Strategy<Value = Vec<(String, i64)>> {
    proptest::collection::vec(("[a-z]{1,8}", any::<i64>()), 0..10)
}

proptest! {
    #[test]
    fn hash_independent_of_insertion_order(pairs in field_pairs()) {
        let mut forward = FieldData::new();
        for (k, v) in &pairs {
            forward.insert(k.clone(), serde_json::json!(v));
        }
        let mut reverse = FieldData::new();
        for (k, v) in pairs.iter().rev() {
            reverse.insert(k.clone(), serde_json::json!(v));
        }
        prop_assert_eq!(content_hash(&forward), content_hash(&reverse));
    }

    #[test]
    fn hash_ignores_slug_value(slug in ".*") {
        let mut a = FieldData::new();
        a.insert("name".to_string(), serde_json::json!("x"));
        a.insert("slug".to_string(), serde_json::json!(slug));
        let mut b = FieldData::new();
        b.insert("name".to_string(), serde_json::json!("x"));
        prop_assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn slugify_is_idempotent(text in ".{0,64}") {
        let once = slugify(&text);
        prop_assert_eq!(slugify(&once), once);
    }

    #[test]
    fn slugify_output_is_url_safe(text in ".{0,64}") {
        let slug = slugify(&text);
        prop_assert!(!slug.starts_with('-'));
        prop_assert!(!slug.ends_with('-'));
        prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        prop_assert!(!slug.contains("--"));
    }

    #[test]
    fn truncation_respects_char_limit(text in ".{0,512}", max in 1usize..300) {
        let truncated = truncate_display_name(&text, max);
        prop_assert!(truncated.chars().count() <= max);
        prop_assert!(text.starts_with(&truncated));
    }
}
