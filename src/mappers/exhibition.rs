// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Exhibition mapper. The artwork list keeps source order; unmapped or
//! unconfirmed artworks are dropped and picked up again by the
//! reverse-link pass once they exist on the target.

use super::{rich_text, MapperContext};
use crate::record::{ExhibitionFields, FieldData, RecordType};
use serde_json::json;

pub(super) fn map(fields: &ExhibitionFields, ctx: &MapperContext<'_>, out: &mut FieldData) {
    if let Some(start) = &fields.start_date {
        out.insert("start-date".to_string(), json!(start));
    }
    if let Some(end) = &fields.end_date {
        out.insert("end-date".to_string(), json!(end));
    }

    let artworks: Vec<String> = fields
        .artworks
        .iter()
        .filter_map(|r| ctx.resolve(RecordType::Artwork, r))
        .collect();
    out.insert("artworks".to_string(), json!(artworks));

    let images: Vec<serde_json::Value> = fields
        .images
        .iter()
        .filter_map(|i| ctx.image_value(i))
        .collect();
    if !images.is_empty() {
        out.insert("images".to_string(), json!(images));
    }

    let intro = rich_text::to_html(&fields.intro);
    if !intro.is_empty() {
        out.insert("intro".to_string(), json!(intro));
    }
}
