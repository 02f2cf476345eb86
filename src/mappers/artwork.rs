// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Artwork mapper. Resolves the artist reference and derives the sort
//! order from the run's order index.

use super::{insert_localized, rich_text, MapperContext};
use crate::record::{ArtworkFields, FieldData, RecordType};
use serde_json::json;
use tracing::debug;

pub(super) fn map(
    record_id: &str,
    fields: &ArtworkFields,
    ctx: &MapperContext<'_>,
    out: &mut FieldData,
) {
    match fields.artist.as_ref() {
        Some(reference) => match ctx.resolve(RecordType::Artist, reference) {
            Some(target_id) => {
                out.insert("artist".to_string(), json!(target_id));
            }
            None => {
                debug!(record_id, artist = %reference.id, "artist unmapped, omitting");
            }
        },
        None => {}
    }

    if let Some(year) = fields.year {
        out.insert("year".to_string(), json!(year));
    }
    insert_localized(out, "materials", &fields.materials);
    if let Some(dimensions) = &fields.dimensions {
        out.insert("dimensions".to_string(), json!(dimensions));
    }

    let images: Vec<serde_json::Value> = fields
        .images
        .iter()
        .filter_map(|i| ctx.image_value(i))
        .collect();
    if !images.is_empty() {
        out.insert("images".to_string(), json!(images));
    }

    let description = rich_text::to_html(&fields.description);
    if !description.is_empty() {
        out.insert("description".to_string(), json!(description));
    }

    if let Some(position) = ctx.order_position(record_id) {
        out.insert("sort-order".to_string(), json!(position));
    }
}
