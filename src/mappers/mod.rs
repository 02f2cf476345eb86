// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Record mappers: source records → target field payloads.
//!
//! Mapping is pure. Everything a mapper needs beyond the record itself
//! (resolved identities, the confirmed-existence set, the order index,
//! the asset map) arrives through [`MapperContext`]; mappers never touch
//! the network. Asset uploads happen before mapping so the asset map already
//! holds every image the record references.
//!
//! References resolve only when the referenced record has a mapped target
//! id AND that id is confirmed to exist in the current run. Anything else
//! is dropped from the payload (dangling references are invalid on the
//! target); the reverse-link pass repairs drops caused by same-pass
//! ordering.

mod artist;
mod artwork;
mod exhibition;
pub mod rich_text;

use crate::config::SyncLimits;
use crate::error::{Result, SyncError};
use crate::record::{
    FieldData, ImageRef, LocalizedText, RecordBody, RecordRef, RecordType, SourceRecord,
};
use crate::source::derive_asset_url;
use crate::store::SyncState;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::debug;

/// Read-only view the mappers resolve against.
pub struct MapperContext<'a> {
    /// Run state: identity map, asset map, order index.
    pub state: &'a SyncState,
    /// Target ids confirmed to exist (full listing plus this run's
    /// creations). Identities outside this set are treated as unmapped.
    pub confirmed: &'a HashSet<String>,
    pub limits: &'a SyncLimits,
    /// Base URL image URLs are derived from.
    pub asset_base_url: &'a str,
}

impl MapperContext<'_> {
    /// Resolve a record reference to a confirmed target id.
    pub fn resolve(&self, record_type: RecordType, reference: &RecordRef) -> Option<String> {
        let target_id = self
            .state
            .identity_get(record_type.collection(), &reference.id)?;
        if self.confirmed.contains(target_id) {
            Some(target_id.to_string())
        } else {
            debug!(
                source_id = %reference.id,
                target_id,
                "reference target not confirmed, dropping"
            );
            None
        }
    }

    /// Build the target's image field value for an already-synced asset.
    /// Returns `None` when the asset was never uploaded (its sync failed).
    pub fn image_value(&self, image: &ImageRef) -> Option<serde_json::Value> {
        let entry = self.state.assets.get(&image.asset_id)?;
        Some(json!({
            "fileId": entry.target_asset_id,
            "url": derive_asset_url(self.asset_base_url, &image.asset_id),
            "alt": image.alt.primary(),
        }))
    }

    /// 1-based position from the order index, if the record appears in an
    /// ordered parent array.
    pub fn order_position(&self, source_id: &str) -> Option<u32> {
        self.state.order_index.get(source_id).copied()
    }
}

/// Map a record to its target field payload.
pub fn map_record(record: &SourceRecord, ctx: &MapperContext<'_>) -> Result<FieldData> {
    let mut fields = base_fields(record, ctx)?;
    match &record.body {
        RecordBody::Artist(f) => artist::map(f, ctx, &mut fields),
        RecordBody::Artwork(f) => artwork::map(&record.id, f, ctx, &mut fields),
        RecordBody::Exhibition(f) => exhibition::map(f, ctx, &mut fields),
    }
    Ok(fields)
}

/// Fields shared by every record type: display name, localized variant,
/// slug.
fn base_fields(record: &SourceRecord, ctx: &MapperContext<'_>) -> Result<FieldData> {
    let name = record
        .title
        .primary()
        .ok_or_else(|| SyncError::Validation {
            record_id: record.id.clone(),
            message: "record has no title in any language".to_string(),
        })?;

    let mut fields = FieldData::new();
    fields.insert(
        "name".to_string(),
        json!(truncate_display_name(name, ctx.limits.display_name_max)),
    );
    if let Some(fr) = secondary(&record.title) {
        fields.insert(
            "name-fr".to_string(),
            json!(truncate_display_name(fr, ctx.limits.display_name_max)),
        );
    }

    let mut slug = record
        .slug
        .clone()
        .unwrap_or_else(|| slugify(name));
    if slug.is_empty() {
        slug = fallback_slug(&record.id);
    }
    fields.insert("slug".to_string(), json!(slug));
    Ok(fields)
}

/// Slug of last resort for titles with no ASCII alphanumerics (CJK-only
/// titles, emoji). Derived from the record id so it is stable across runs
/// and distinct within a create batch.
fn fallback_slug(record_id: &str) -> String {
    let from_id = slugify(record_id);
    if !from_id.is_empty() {
        return from_id;
    }
    let digest = Sha256::digest(record_id.as_bytes());
    let hex = format!("{digest:x}");
    format!("record-{}", &hex[..12])
}

/// The non-primary translation, when it differs from the primary.
fn secondary(text: &LocalizedText) -> Option<&str> {
    match (text.en.as_deref(), text.fr.as_deref()) {
        (Some(en), Some(fr)) if en != fr => Some(fr),
        _ => None,
    }
}

/// URL-safe slug: lowercase ASCII alphanumerics with single hyphens, no
/// leading or trailing separator. Non-ASCII letters are dropped rather
/// than transliterated; editors set an explicit slug when that matters.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_separator = false;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }
    slug
}

/// Truncate to the target's display name limit on a char boundary.
pub fn truncate_display_name(name: &str, max_chars: usize) -> String {
    if name.chars().count() <= max_chars {
        return name.to_string();
    }
    name.chars().take(max_chars).collect()
}

/// Flatten localized text into `key` / `key-fr` entries. Skips keys whose
/// text is absent.
pub(crate) fn insert_localized(fields: &mut FieldData, key: &str, text: &LocalizedText) {
    if let Some(primary) = text.primary() {
        fields.insert(key.to_string(), json!(primary));
    }
    if let Some(fr) = secondary(text) {
        fields.insert(format!("{key}-fr"), json!(fr));
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Context over the given state with everything confirmed that the
    /// identity map names.
    pub fn confirm_all(state: &SyncState) -> HashSet<String> {
        state
            .identity
            .values()
            .flat_map(|m| m.values().cloned())
            .collect()
    }

    pub fn ctx<'a>(
        state: &'a SyncState,
        confirmed: &'a HashSet<String>,
        limits: &'a SyncLimits,
    ) -> MapperContext<'a> {
        MapperContext {
            state,
            confirmed,
            limits,
            asset_base_url: "https://cdn.test/images",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{confirm_all, ctx};
    use super::*;
    use crate::record::{ArtworkFields, ExhibitionFields};
    use crate::store::AssetEntry;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Blue Composition #4"), "blue-composition-4");
        assert_eq!(slugify("  edges  "), "edges");
        assert_eq!(slugify("déjà vu"), "dj-vu");
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn test_slugify_idempotent() {
        let once = slugify("Winter Show / 2026");
        assert_eq!(slugify(&once), once);
    }

    #[test]
    fn test_truncate_char_boundary() {
        assert_eq!(truncate_display_name("héllo", 3), "hél");
        assert_eq!(truncate_display_name("short", 256), "short");
    }

    #[test]
    fn test_base_fields_explicit_slug_wins() {
        let mut record = SourceRecord::artist("ar-1", "Ana Marín");
        record.slug = Some("ana-marin".to_string());
        let state = SyncState::default();
        let confirmed = HashSet::new();
        let limits = SyncLimits::testing();
        let fields = map_record(&record, &ctx(&state, &confirmed, &limits)).unwrap();
        assert_eq!(fields["slug"], json!("ana-marin"));
    }

    #[test]
    fn test_base_fields_unsluggable_title_uses_id_slug() {
        // "北京" slugifies to nothing; the record id stands in.
        let record = SourceRecord::artist("ar-7", "北京");
        let state = SyncState::default();
        let confirmed = HashSet::new();
        let limits = SyncLimits::testing();
        let fields = map_record(&record, &ctx(&state, &confirmed, &limits)).unwrap();
        assert_eq!(fields["slug"], json!("ar-7"));
    }

    #[test]
    fn test_fallback_slug_is_stable_and_distinct() {
        let a = fallback_slug("北京");
        let b = fallback_slug("東京");
        assert!(a.starts_with("record-"));
        assert_eq!(a, fallback_slug("北京"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_untitled_record_is_validation_error() {
        let mut record = SourceRecord::artist("ar-1", "x");
        record.title = LocalizedText::default();
        let state = SyncState::default();
        let confirmed = HashSet::new();
        let limits = SyncLimits::testing();
        let err = map_record(&record, &ctx(&state, &confirmed, &limits)).unwrap_err();
        assert!(matches!(err, SyncError::Validation { .. }));
    }

    #[test]
    fn test_bilingual_name_flattened() {
        let mut record = SourceRecord::artist("ar-1", "Winter Show");
        record.title = LocalizedText::bilingual("Winter Show", "Exposition d'hiver");
        let state = SyncState::default();
        let confirmed = HashSet::new();
        let limits = SyncLimits::testing();
        let fields = map_record(&record, &ctx(&state, &confirmed, &limits)).unwrap();
        assert_eq!(fields["name"], json!("Winter Show"));
        assert_eq!(fields["name-fr"], json!("Exposition d'hiver"));
    }

    #[test]
    fn test_resolve_requires_confirmation() {
        let mut state = SyncState::default();
        state.identity_set("artists", "ar-1", "t-1");
        let limits = SyncLimits::testing();

        // Mapped but not confirmed: dropped
        let empty = HashSet::new();
        let c = ctx(&state, &empty, &limits);
        assert_eq!(c.resolve(RecordType::Artist, &RecordRef::new("ar-1")), None);

        // Mapped and confirmed: resolves
        let confirmed = confirm_all(&state);
        let c = ctx(&state, &confirmed, &limits);
        assert_eq!(
            c.resolve(RecordType::Artist, &RecordRef::new("ar-1")),
            Some("t-1".to_string())
        );

        // Never mapped
        assert_eq!(c.resolve(RecordType::Artist, &RecordRef::new("ar-9")), None);
    }

    #[test]
    fn test_artwork_payload_with_resolved_artist() {
        let mut state = SyncState::default();
        state.identity_set("artists", "ar-1", "t-artist");
        state.order_index.insert("aw-1".to_string(), 3);
        state.assets.insert(
            "image-ab-10x10-jpg".to_string(),
            AssetEntry {
                target_asset_id: "ta-1".to_string(),
                alt_text: None,
                filename: "ab-10x10.jpg".to_string(),
                url: "https://cdn.test/images/ab-10x10.jpg".to_string(),
                last_updated: 0,
            },
        );
        let confirmed = confirm_all(&state);
        let limits = SyncLimits::testing();

        let record = SourceRecord::artwork(
            "aw-1",
            "Red",
            ArtworkFields {
                artist: Some(RecordRef::new("ar-1")),
                year: Some(1998),
                images: vec![ImageRef::new("image-ab-10x10-jpg")],
                ..Default::default()
            },
        );
        let fields = map_record(&record, &ctx(&state, &confirmed, &limits)).unwrap();
        assert_eq!(fields["artist"], json!("t-artist"));
        assert_eq!(fields["year"], json!(1998));
        assert_eq!(fields["sort-order"], json!(3));
        let images = fields["images"].as_array().unwrap();
        assert_eq!(images[0]["fileId"], json!("ta-1"));
    }

    #[test]
    fn test_artwork_unconfirmed_artist_dropped() {
        let mut state = SyncState::default();
        state.identity_set("artists", "ar-1", "t-artist");
        let confirmed = HashSet::new(); // nothing confirmed
        let limits = SyncLimits::testing();

        let record = SourceRecord::artwork(
            "aw-1",
            "Red",
            ArtworkFields {
                artist: Some(RecordRef::new("ar-1")),
                ..Default::default()
            },
        );
        let fields = map_record(&record, &ctx(&state, &confirmed, &limits)).unwrap();
        assert!(!fields.contains_key("artist"));
    }

    #[test]
    fn test_exhibition_artwork_list_preserves_order_and_drops_unmapped() {
        let mut state = SyncState::default();
        state.identity_set("artworks", "aw-1", "t-1");
        state.identity_set("artworks", "aw-2", "t-2");
        let confirmed = confirm_all(&state);
        let limits = SyncLimits::testing();

        let record = SourceRecord::exhibition(
            "ex-1",
            "Show",
            ExhibitionFields {
                artworks: vec![
                    RecordRef::new("aw-2"),
                    RecordRef::new("aw-missing"),
                    RecordRef::new("aw-1"),
                ],
                start_date: Some("2026-01-10".to_string()),
                ..Default::default()
            },
        );
        let fields = map_record(&record, &ctx(&state, &confirmed, &limits)).unwrap();
        assert_eq!(fields["artworks"], json!(["t-2", "t-1"]));
        assert_eq!(fields["start-date"], json!("2026-01-10"));
    }

    #[test]
    fn test_image_value_missing_asset_entry() {
        let state = SyncState::default();
        let confirmed = HashSet::new();
        let limits = SyncLimits::testing();
        let c = ctx(&state, &confirmed, &limits);
        assert!(c.image_value(&ImageRef::new("image-never-synced-jpg")).is_none());
    }
}
