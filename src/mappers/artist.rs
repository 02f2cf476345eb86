// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Artist mapper. Foundation type: no record references to resolve.

use super::{rich_text, MapperContext};
use crate::record::{ArtistFields, FieldData};
use serde_json::json;

pub(super) fn map(fields: &ArtistFields, ctx: &MapperContext<'_>, out: &mut FieldData) {
    let bio = rich_text::to_html(&fields.bio);
    if !bio.is_empty() {
        out.insert("bio".to_string(), json!(bio));
    }
    if let Some(website) = &fields.website {
        out.insert("website".to_string(), json!(website));
    }
    if let Some(image) = fields.portrait.as_ref().and_then(|p| ctx.image_value(p)) {
        out.insert("portrait".to_string(), image);
    }
}
