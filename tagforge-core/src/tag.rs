// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `TagData` is the format-neutral in-memory tag every codec reads into and writes from, plus
//! the upsert/delete/merge semantics a write path needs that a read-only tag model never did.

use std::collections::{BTreeMap, BTreeSet};

/// The small set of fields every supported format has *some* notion of.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SupportedField {
    GeneralDescription,
    Title,
    Artist,
    Composer,
    Comment,
    Genre,
    Album,
    ReleaseDate,
    ReleaseYear,
    TrackNumber,
    DiscNumber,
    Rating,
    OriginalArtist,
    OriginalAlbum,
    Copyright,
    Publisher,
    AlbumArtist,
    Conductor,
}

/// Identifies which codec produced or owns an [`AdditionalField`] or [`Picture`]. Distinct codecs
/// may coexist on one file (e.g. ID3v2 + APEv2), so additional fields must disambiguate by origin
/// as well as by native code.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TagType {
    VorbisComment,
    Flac,
    Id3v1,
    Id3v2,
    Ape,
    Spc,
}

/// A field the underlying format supports but which has no [`SupportedField`] counterpart (an
/// unrecognized Vorbis comment key, an unknown ID3v2 frame, an xid6 item with no standard
/// meaning, ...). Carried verbatim so a read/write cycle never drops data silently.
#[derive(Clone, Debug)]
pub struct AdditionalField {
    pub tag_type: TagType,
    pub native_code: String,
    pub value: FieldValue,
    pub stream_number: Option<u32>,
    pub language: Option<String>,
    pub zone_name: Option<String>,
    pub marked_for_deletion: bool,
}

impl AdditionalField {
    pub fn new(tag_type: TagType, native_code: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        AdditionalField {
            tag_type,
            native_code: native_code.into(),
            value: value.into(),
            stream_number: None,
            language: None,
            zone_name: None,
            marked_for_deletion: false,
        }
    }

    pub fn key(&self) -> (TagType, &str) {
        (self.tag_type, self.native_code.as_str())
    }
}

/// The value carried by an [`AdditionalField`]. Most formats only ever produce `Text`, but
/// FLAC's CUESHEET/APPLICATION blocks and SPC's raw xid6 items round-trip as opaque `Binary`.
#[derive(Clone, Debug)]
pub enum FieldValue {
    Text(String),
    Binary(Vec<u8>),
    Unsigned(u64),
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(v: Vec<u8>) -> Self {
        FieldValue::Binary(v)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Unsigned(v)
    }
}

/// Format-neutral classification of an embedded picture, modeled after the ID3v2 APIC picture
/// type byte (the widest vocabulary among the supported formats).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PictureType {
    Other,
    FileIcon,
    OtherIcon,
    Front,
    Back,
    Leaflet,
    Media,
    LeadArtist,
    Artist,
    Conductor,
    Band,
    Composer,
    Lyricist,
    RecordingLocation,
    DuringRecording,
    DuringPerformance,
    ScreenCapture,
    BrightFish,
    Illustration,
    BandLogo,
    PublisherLogo,
    /// The format has no enumerated slot for this picture; `native_code` on [`Picture`] carries
    /// the format-specific type byte so it survives round-trip.
    Unsupported,
}

/// An embedded image, carried as an opaque byte blob plus a MIME/format hint. The core never
/// decodes picture bytes (see DESIGN.md: "picture decoding dependency").
#[derive(Clone, Debug)]
pub struct Picture {
    pub picture_type: PictureType,
    /// The format-specific type byte, preserved when `picture_type` is `Unsupported` (and best
    /// effort for other cases, since FLAC and ID3v2 do not share numbering).
    pub native_code: u8,
    pub mime: String,
    pub description: String,
    pub data: Vec<u8>,
    pub marked_for_deletion: bool,
}

impl Picture {
    /// The identity used for upsert/delete matching (§3 invariant 5).
    pub fn identity(&self) -> (Option<PictureType>, u8) {
        if self.picture_type == PictureType::Unsupported {
            (None, self.native_code)
        } else {
            (Some(self.picture_type), self.native_code)
        }
    }
}

/// A chapter marker. `end_ms` is optional since several formats (Vorbis's Auphonic convention)
/// only ever specify a start.
#[derive(Clone, Debug, PartialEq)]
pub struct Chapter {
    pub start_ms: u64,
    pub end_ms: Option<u64>,
    pub title: String,
    pub url: String,
    pub subtitle: String,
}

/// The format-neutral document every codec reads into and serializes from.
#[derive(Clone, Debug, Default)]
pub struct TagData {
    supported_fields: BTreeMap<SupportedField, String>,
    /// Fields a delta sets to "" (§4.1: "An empty string in the delta means erase this field").
    /// Kept apart from `supported_fields` since that map can't itself carry a present-but-empty
    /// entry to distinguish "erase" from "never mentioned".
    cleared_supported_fields: BTreeSet<SupportedField>,
    additional_fields: Vec<AdditionalField>,
    pictures: Vec<Picture>,
    chapters: Option<Vec<Chapter>>,
}

impl TagData {
    pub fn new() -> Self {
        TagData::default()
    }

    pub fn get(&self, field: SupportedField) -> Option<&str> {
        self.supported_fields.get(&field).map(String::as_str)
    }

    /// Sets a supported field. Per §3 invariant 4, setting an empty string removes the field
    /// instead of storing an empty value; in a delta, it marks the field for erasure on merge
    /// (§4.1) rather than leaving `current`'s value untouched.
    pub fn set(&mut self, field: SupportedField, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            self.supported_fields.remove(&field);
            self.cleared_supported_fields.insert(field);
        } else {
            self.supported_fields.insert(field, value);
            self.cleared_supported_fields.remove(&field);
        }
    }

    pub fn supported_fields(&self) -> impl Iterator<Item = (SupportedField, &str)> {
        self.supported_fields.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn additional_fields(&self) -> &[AdditionalField] {
        &self.additional_fields
    }

    pub fn additional_fields_mut(&mut self) -> &mut Vec<AdditionalField> {
        &mut self.additional_fields
    }

    /// Upserts an additional field by `(tag_type, native_code)`, replacing any earlier entry with
    /// the same key (§3: "Duplicate (tag-type, native-code) pairs are not allowed").
    pub fn upsert_additional_field(&mut self, field: AdditionalField) {
        let key = (field.tag_type, field.native_code.clone());
        self.additional_fields.retain(|f| (f.tag_type, f.native_code.clone()) != key);
        self.additional_fields.push(field);
    }

    pub fn pictures(&self) -> &[Picture] {
        &self.pictures
    }

    pub fn pictures_mut(&mut self) -> &mut Vec<Picture> {
        &mut self.pictures
    }

    pub fn add_picture(&mut self, picture: Picture) {
        self.pictures.push(picture);
    }

    pub fn chapters(&self) -> Option<&[Chapter]> {
        self.chapters.as_deref()
    }

    pub fn set_chapters(&mut self, chapters: Vec<Chapter>) {
        self.chapters = Some(chapters);
    }

    /// Applies `self` as a write-delta on top of `current`, producing the merged tag to
    /// serialize, per §4.1.
    pub fn merge_onto(&self, current: &TagData) -> TagData {
        let mut merged = current.clone();

        for (field, value) in self.supported_fields() {
            merged.set(field, value);
        }
        for &field in &self.cleared_supported_fields {
            merged.supported_fields.remove(&field);
            merged.cleared_supported_fields.remove(&field);
        }

        for delta_field in &self.additional_fields {
            if delta_field.marked_for_deletion {
                let key = (delta_field.tag_type, delta_field.native_code.clone());
                merged
                    .additional_fields
                    .retain(|f| (f.tag_type, f.native_code.clone()) != key);
            } else {
                let mut kept = delta_field.clone();
                kept.marked_for_deletion = false;
                merged.upsert_additional_field(kept);
            }
        }

        for delta_pic in &self.pictures {
            if delta_pic.marked_for_deletion {
                let id = delta_pic.identity();
                merged.pictures.retain(|p| p.identity() != id);
            } else {
                let mut kept = delta_pic.clone();
                kept.marked_for_deletion = false;
                merged.pictures.push(kept);
            }
        }

        if let Some(chapters) = &self.chapters {
            merged.chapters = Some(chapters.clone());
        }

        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setting_empty_string_removes_field() {
        let mut tag = TagData::new();
        tag.set(SupportedField::Title, "Hello");
        assert_eq!(tag.get(SupportedField::Title), Some("Hello"));
        tag.set(SupportedField::Title, "");
        assert_eq!(tag.get(SupportedField::Title), None);
    }

    #[test]
    fn additional_field_upsert_replaces_by_key() {
        let mut tag = TagData::new();
        tag.upsert_additional_field(AdditionalField::new(TagType::VorbisComment, "MOOD", "Happy"));
        tag.upsert_additional_field(AdditionalField::new(TagType::VorbisComment, "MOOD", "Sad"));
        assert_eq!(tag.additional_fields().len(), 1);
    }

    #[test]
    fn merge_delta_onto_current_upserts_and_deletes() {
        let mut current = TagData::new();
        current.set(SupportedField::Title, "Old Title");
        current.upsert_additional_field(AdditionalField::new(TagType::VorbisComment, "MOOD", "Happy"));

        let mut delta = TagData::new();
        delta.set(SupportedField::Title, "New Title");
        let mut del = AdditionalField::new(TagType::VorbisComment, "MOOD", "");
        del.marked_for_deletion = true;
        delta.upsert_additional_field(del);

        let merged = delta.merge_onto(&current);
        assert_eq!(merged.get(SupportedField::Title), Some("New Title"));
        assert!(merged.additional_fields().is_empty());
    }

    #[test]
    fn merge_delta_erases_field_present_only_in_current() {
        let mut current = TagData::new();
        current.set(SupportedField::Conductor, "Karajan");

        let mut delta = TagData::new();
        delta.set(SupportedField::Conductor, "");

        let merged = delta.merge_onto(&current);
        assert_eq!(merged.get(SupportedField::Conductor), None);
    }

    #[test]
    fn picture_identity_uses_native_code_when_unsupported() {
        let pic = Picture {
            picture_type: PictureType::Unsupported,
            native_code: 0x0a,
            mime: "image/jpeg".into(),
            description: String::new(),
            data: vec![],
            marked_for_deletion: false,
        };
        assert_eq!(pic.identity(), (None, 0x0a));
    }
}
