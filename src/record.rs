// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Data model: source records, target items, and the types shared between
//! the mappers and the syncer.
//!
//! Source records are owned and mutated by editors; the synchronizer only
//! reads them. Each record type carries a concrete typed field struct and
//! dispatch happens on the [`RecordBody`] variant; field presence is never
//! inspected at runtime.
//!
//! # Record types and their collections
//!
//! | RecordType   | Collection    | Outbound references                |
//! |--------------|---------------|-------------------------------------|
//! | `Artist`     | `artists`     | none (foundation type)              |
//! | `Artwork`    | `artworks`    | artist, images                      |
//! | `Exhibition` | `exhibitions` | artworks (ordered), images          |

use serde::{Deserialize, Serialize};

/// The record types the synchronizer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Artist,
    Artwork,
    Exhibition,
}

impl RecordType {
    /// All types in dependency order: foundation types first.
    pub const ALL: [RecordType; 3] = [
        RecordType::Artist,
        RecordType::Artwork,
        RecordType::Exhibition,
    ];

    /// The target collection key for this record type.
    pub fn collection(&self) -> &'static str {
        match self {
            RecordType::Artist => "artists",
            RecordType::Artwork => "artworks",
            RecordType::Exhibition => "exhibitions",
        }
    }

    /// Foundation types have no outbound record references and sync first.
    pub fn is_foundation(&self) -> bool {
        matches!(self, RecordType::Artist)
    }

    /// Types whose reference fields may only become fully mappable after
    /// later creations; these get a second pass at the end of the run.
    pub fn needs_reverse_link_pass(&self) -> bool {
        matches!(self, RecordType::Exhibition)
    }

    /// Record types this type references, in dependency order.
    pub fn referenced_types(&self) -> &'static [RecordType] {
        match self {
            RecordType::Artist => &[],
            RecordType::Artwork => &[RecordType::Artist],
            RecordType::Exhibition => &[RecordType::Artwork],
        }
    }

    /// Parse a type name as sent by the interactive trigger.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "artist" => Some(RecordType::Artist),
            "artwork" => Some(RecordType::Artwork),
            "exhibition" => Some(RecordType::Exhibition),
            _ => None,
        }
    }

    /// Look up a type by its target collection key.
    pub fn from_collection(collection: &str) -> Option<Self> {
        RecordType::ALL
            .into_iter()
            .find(|t| t.collection() == collection)
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordType::Artist => write!(f, "artist"),
            RecordType::Artwork => write!(f, "artwork"),
            RecordType::Exhibition => write!(f, "exhibition"),
        }
    }
}

/// Bilingual text as stored in the source.
///
/// The target has no localization support, so mappers flatten these into
/// separate flat keys (`name`, `name-fr`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedText {
    #[serde(default)]
    pub en: Option<String>,
    #[serde(default)]
    pub fr: Option<String>,
}

impl LocalizedText {
    pub fn new(en: impl Into<String>) -> Self {
        Self {
            en: Some(en.into()),
            fr: None,
        }
    }

    pub fn bilingual(en: impl Into<String>, fr: impl Into<String>) -> Self {
        Self {
            en: Some(en.into()),
            fr: Some(fr.into()),
        }
    }

    /// The primary (English) text, falling back to French.
    pub fn primary(&self) -> Option<&str> {
        self.en.as_deref().or(self.fr.as_deref())
    }
}

/// A reference from one source record to another.
///
/// `position` is set when the containing array is itself ordered
/// (an exhibition's ordered artwork list); it is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRef {
    #[serde(rename = "ref")]
    pub id: String,
    #[serde(default)]
    pub position: Option<u32>,
}

impl RecordRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            position: None,
        }
    }

    pub fn at(id: impl Into<String>, position: u32) -> Self {
        Self {
            id: id.into(),
            position: Some(position),
        }
    }
}

/// A reference to a binary image asset in the source asset subsystem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub asset_id: String,
    #[serde(default)]
    pub alt: LocalizedText,
}

impl ImageRef {
    pub fn new(asset_id: impl Into<String>) -> Self {
        Self {
            asset_id: asset_id.into(),
            alt: LocalizedText::default(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Rich text: structured blocks → inline-HTML-like strings in the mappers
// ═══════════════════════════════════════════════════════════════════════════════

/// Inline formatting marks. Only bold, italic and links survive the
/// conversion to the target's representation; anything else is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Mark {
    Bold,
    Italic,
    Link { href: String },
    #[serde(other)]
    Other,
}

/// A run of text with a set of marks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub text: String,
    #[serde(default)]
    pub marks: Vec<Mark>,
}

impl Span {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            marks: Vec::new(),
        }
    }
}

/// A paragraph-level block of rich text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichTextBlock {
    pub spans: Vec<Span>,
}

impl RichTextBlock {
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self {
            spans: vec![Span::plain(text)],
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Per-type field structs and the source record itself
// ═══════════════════════════════════════════════════════════════════════════════

/// Artist fields. No outbound record references (foundation type).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtistFields {
    #[serde(default)]
    pub bio: Vec<RichTextBlock>,
    #[serde(default)]
    pub portrait: Option<ImageRef>,
    #[serde(default)]
    pub website: Option<String>,
}

/// Artwork fields. References its artist and carries an image list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtworkFields {
    #[serde(default)]
    pub artist: Option<RecordRef>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub materials: LocalizedText,
    #[serde(default)]
    pub dimensions: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageRef>,
    #[serde(default)]
    pub description: Vec<RichTextBlock>,
}

/// Exhibition fields. The artwork list is ordered; positions feed the
/// order index rebuilt at the start of each run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExhibitionFields {
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub artworks: Vec<RecordRef>,
    #[serde(default)]
    pub images: Vec<ImageRef>,
    #[serde(default)]
    pub intro: Vec<RichTextBlock>,
}

/// Tagged per-type payload. Dispatch on the variant, never on field
/// presence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "_type", rename_all = "lowercase")]
pub enum RecordBody {
    Artist(ArtistFields),
    Artwork(ArtworkFields),
    Exhibition(ExhibitionFields),
}

/// An editorial content entity in the system of record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    #[serde(rename = "_id")]
    pub id: String,

    /// Title-like field; slugs are derived from this when no explicit
    /// slug exists.
    pub title: LocalizedText,

    /// Explicit slug, if the editors set one.
    #[serde(default)]
    pub slug: Option<String>,

    /// Target item id stored directly on the source record, if a previous
    /// integration wrote one. Used as a fallback when the identity map has
    /// no entry.
    #[serde(default)]
    pub target_item_id: Option<String>,

    #[serde(flatten)]
    pub body: RecordBody,
}

impl SourceRecord {
    pub fn record_type(&self) -> RecordType {
        match self.body {
            RecordBody::Artist(_) => RecordType::Artist,
            RecordBody::Artwork(_) => RecordType::Artwork,
            RecordBody::Exhibition(_) => RecordType::Exhibition,
        }
    }

    /// All outbound record references, paired with the referenced type.
    pub fn references(&self) -> Vec<(RecordType, &RecordRef)> {
        match &self.body {
            RecordBody::Artist(_) => Vec::new(),
            RecordBody::Artwork(f) => f
                .artist
                .iter()
                .map(|r| (RecordType::Artist, r))
                .collect(),
            RecordBody::Exhibition(f) => f
                .artworks
                .iter()
                .map(|r| (RecordType::Artwork, r))
                .collect(),
        }
    }

    /// All image references on this record.
    pub fn images(&self) -> Vec<&ImageRef> {
        match &self.body {
            RecordBody::Artist(f) => f.portrait.iter().collect(),
            RecordBody::Artwork(f) => f.images.iter().collect(),
            RecordBody::Exhibition(f) => f.images.iter().collect(),
        }
    }

    /// Ordered reference arrays (currently only exhibition artwork lists),
    /// used to rebuild the order index each run.
    pub fn ordered_references(&self) -> &[RecordRef] {
        match &self.body {
            RecordBody::Exhibition(f) => &f.artworks,
            _ => &[],
        }
    }

    // Convenience constructors, used heavily by tests.

    pub fn artist(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: LocalizedText::new(name),
            slug: None,
            target_item_id: None,
            body: RecordBody::Artist(ArtistFields::default()),
        }
    }

    pub fn artwork(id: impl Into<String>, name: impl Into<String>, fields: ArtworkFields) -> Self {
        Self {
            id: id.into(),
            title: LocalizedText::new(name),
            slug: None,
            target_item_id: None,
            body: RecordBody::Artwork(fields),
        }
    }

    pub fn exhibition(
        id: impl Into<String>,
        name: impl Into<String>,
        fields: ExhibitionFields,
    ) -> Self {
        Self {
            id: id.into(),
            title: LocalizedText::new(name),
            slug: None,
            target_item_id: None,
            body: RecordBody::Exhibition(fields),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Target side
// ═══════════════════════════════════════════════════════════════════════════════

/// Field payload sent to / received from the target CMS.
pub type FieldData = serde_json::Map<String, serde_json::Value>;

/// An item in the target collection CMS. Identity is assigned by the
/// target at creation time and is otherwise opaque.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetItem {
    pub id: String,
    #[serde(rename = "fieldData")]
    pub field_data: FieldData,
}

impl TargetItem {
    pub fn new(id: impl Into<String>, field_data: FieldData) -> Self {
        Self {
            id: id.into(),
            field_data,
        }
    }

    /// The item's slug field, if present.
    pub fn slug(&self) -> Option<&str> {
        self.field_data.get("slug").and_then(|v| v.as_str())
    }

    /// The item's display name field, if present.
    pub fn name(&self) -> Option<&str> {
        self.field_data.get("name").and_then(|v| v.as_str())
    }
}

/// Upload credentials returned by the target's asset-metadata endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetUploadTicket {
    /// The target-side asset id, assigned at metadata creation.
    pub asset_id: String,
    /// Presigned destination for the binary upload.
    pub upload_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_type_collections() {
        assert_eq!(RecordType::Artist.collection(), "artists");
        assert_eq!(RecordType::Artwork.collection(), "artworks");
        assert_eq!(RecordType::Exhibition.collection(), "exhibitions");
    }

    #[test]
    fn test_record_type_dependency_order() {
        assert!(RecordType::Artist.is_foundation());
        assert!(!RecordType::Artwork.is_foundation());
        assert_eq!(RecordType::Artwork.referenced_types(), &[RecordType::Artist]);
        assert_eq!(
            RecordType::Exhibition.referenced_types(),
            &[RecordType::Artwork]
        );
        assert!(RecordType::Exhibition.needs_reverse_link_pass());
        assert!(!RecordType::Artwork.needs_reverse_link_pass());
    }

    #[test]
    fn test_record_type_parse_and_display() {
        for t in RecordType::ALL {
            assert_eq!(RecordType::parse(&t.to_string()), Some(t));
            assert_eq!(RecordType::from_collection(t.collection()), Some(t));
        }
        assert_eq!(RecordType::parse("plugin"), None);
        assert_eq!(RecordType::from_collection("widgets"), None);
    }

    #[test]
    fn test_localized_primary_fallback() {
        let text = LocalizedText {
            en: None,
            fr: Some("Sans titre".to_string()),
        };
        assert_eq!(text.primary(), Some("Sans titre"));

        let both = LocalizedText::bilingual("Untitled", "Sans titre");
        assert_eq!(both.primary(), Some("Untitled"));

        assert_eq!(LocalizedText::default().primary(), None);
    }

    #[test]
    fn test_artwork_references() {
        let record = SourceRecord::artwork(
            "aw-1",
            "Blue Composition",
            ArtworkFields {
                artist: Some(RecordRef::new("ar-1")),
                ..Default::default()
            },
        );
        let refs = record.references();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].0, RecordType::Artist);
        assert_eq!(refs[0].1.id, "ar-1");
    }

    #[test]
    fn test_exhibition_ordered_references() {
        let record = SourceRecord::exhibition(
            "ex-1",
            "Winter Show",
            ExhibitionFields {
                artworks: vec![RecordRef::at("aw-2", 1), RecordRef::at("aw-1", 2)],
                ..Default::default()
            },
        );
        let ordered = record.ordered_references();
        assert_eq!(ordered.len(), 2);
        assert_eq!(ordered[0].id, "aw-2");
        assert_eq!(ordered[0].position, Some(1));

        // An artist has no ordered reference arrays
        let artist = SourceRecord::artist("ar-1", "Someone");
        assert!(artist.ordered_references().is_empty());
    }

    #[test]
    fn test_images_per_type() {
        let mut artist = SourceRecord::artist("ar-1", "Someone");
        assert!(artist.images().is_empty());
        if let RecordBody::Artist(ref mut f) = artist.body {
            f.portrait = Some(ImageRef::new("img-1"));
        }
        assert_eq!(artist.images().len(), 1);
    }

    #[test]
    fn test_source_record_deserialize_tagged() {
        let record: SourceRecord = serde_json::from_value(json!({
            "_id": "aw-9",
            "_type": "artwork",
            "title": {"en": "Red Square"},
            "artist": {"ref": "ar-4"},
            "year": 1998
        }))
        .unwrap();
        assert_eq!(record.record_type(), RecordType::Artwork);
        assert_eq!(record.id, "aw-9");
        match record.body {
            RecordBody::Artwork(f) => {
                assert_eq!(f.artist.unwrap().id, "ar-4");
                assert_eq!(f.year, Some(1998));
            }
            _ => panic!("expected artwork body"),
        }
    }

    #[test]
    fn test_unknown_mark_deserializes_to_other() {
        let span: Span = serde_json::from_value(json!({
            "text": "hello",
            "marks": [{"type": "underline"}, {"type": "bold"}]
        }))
        .unwrap();
        assert_eq!(span.marks, vec![Mark::Other, Mark::Bold]);
    }

    #[test]
    fn test_target_item_accessors() {
        let mut fields = FieldData::new();
        fields.insert("name".to_string(), json!("Blue Composition"));
        fields.insert("slug".to_string(), json!("blue-composition"));
        let item = TargetItem::new("t-1", fields);
        assert_eq!(item.name(), Some("Blue Composition"));
        assert_eq!(item.slug(), Some("blue-composition"));
    }
}
