// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Vorbis Comment codec (§4.3): shared between the Ogg and FLAC container codecs, which each
//! own the framing around this payload (Ogg adds a trailing framing bit and page structure; FLAC
//! wraps it in a metadata block header). Neither framing detail belongs here.

use std::collections::BTreeMap;

use lazy_static::lazy_static;

use tagforge_core::io::{ReadBytes, WriteBytes};
use tagforge_core::tag::{AdditionalField, Chapter, FieldValue, TagData, TagType};
use tagforge_core::{errors, Result};

use crate::base64;
use crate::flac::picture as flac_picture;

use tagforge_core::tag::SupportedField::{
    Album, AlbumArtist, Artist, Comment, Composer, Conductor, Copyright, DiscNumber, Genre,
    Publisher, ReleaseDate, Title, TrackNumber,
};
use tagforge_core::tag::SupportedField;

const VENDOR_KEY: &str = "VENDOR";
const PICTURE_KEY: &str = "METADATA_BLOCK_PICTURE";

lazy_static! {
    static ref KEY_TO_FIELD: BTreeMap<&'static str, SupportedField> = {
        let mut m = BTreeMap::new();
        m.insert("TITLE", Title);
        m.insert("ARTIST", Artist);
        m.insert("ALBUM", Album);
        m.insert("ALBUMARTIST", AlbumArtist);
        m.insert("COMMENT", Comment);
        m.insert("DESCRIPTION", Comment);
        m.insert("DATE", ReleaseDate);
        m.insert("TRACKNUMBER", TrackNumber);
        m.insert("DISCNUMBER", DiscNumber);
        m.insert("GENRE", Genre);
        m.insert("COMPOSER", Composer);
        m.insert("COPYRIGHT", Copyright);
        m.insert("CONDUCTOR", Conductor);
        m.insert("PUBLISHER", Publisher);
        m
    };
    static ref FIELD_TO_KEY: BTreeMap<SupportedField, &'static str> = {
        let mut m = BTreeMap::new();
        m.insert(Title, "TITLE");
        m.insert(Artist, "ARTIST");
        m.insert(Album, "ALBUM");
        m.insert(AlbumArtist, "ALBUMARTIST");
        m.insert(Comment, "COMMENT");
        m.insert(ReleaseDate, "DATE");
        m.insert(TrackNumber, "TRACKNUMBER");
        m.insert(DiscNumber, "DISCNUMBER");
        m.insert(Genre, "GENRE");
        m.insert(Composer, "COMPOSER");
        m.insert(Copyright, "COPYRIGHT");
        m.insert(Conductor, "CONDUCTOR");
        m.insert(Publisher, "PUBLISHER");
        m
    };
}

/// Parses a Vorbis Comment payload (vendor string, count, `KEY=VALUE` entries), without any
/// surrounding framing. `VENDOR` is surfaced as an additional field so it round-trips; pictures
/// embedded via `METADATA_BLOCK_PICTURE` and chapters via the Auphonic convention are decoded into
/// their own [`TagData`] slots.
pub fn parse_payload(mut data: &[u8]) -> Result<TagData> {
    let mut tag = TagData::new();

    let vendor_len = data.read_u32_le()? as usize;
    let vendor = decode_field_text(&data.read_boxed_slice_exact(vendor_len)?)?;
    tag.upsert_additional_field(AdditionalField::new(TagType::VorbisComment, VENDOR_KEY, vendor));

    let count = data.read_u32_le()?;
    let mut chapters: BTreeMap<u32, ChapterBuilder> = BTreeMap::new();

    for _ in 0..count {
        let entry_len = data.read_u32_le()? as usize;
        let raw = data.read_boxed_slice_exact(entry_len)?;
        let entry = decode_field_text(&raw)?;

        let Some(eq) = entry.find('=') else {
            continue;
        };
        let (key, value) = (entry[..eq].to_ascii_uppercase(), &entry[eq + 1..]);

        if key == PICTURE_KEY {
            if let Some(bytes) = base64::decode(value) {
                match flac_picture::decode(&bytes) {
                    Ok(picture) => tag.add_picture(picture),
                    Err(e) => log::warn!("dropping malformed METADATA_BLOCK_PICTURE: {e}"),
                }
            } else {
                log::warn!("dropping METADATA_BLOCK_PICTURE with invalid base64");
            }
            continue;
        }

        if let Some((idx, suffix)) = parse_chapter_key(&key) {
            let entry = chapters.entry(idx).or_default();
            match suffix {
                ChapterSuffix::Time => entry.start_ms = parse_timestamp(value),
                ChapterSuffix::Name => entry.title = value.to_string(),
                ChapterSuffix::Url => entry.url = value.to_string(),
            }
            continue;
        }

        if let Some(&field) = KEY_TO_FIELD.get(key.as_str()) {
            tag.set(field, value);
        } else {
            tag.upsert_additional_field(AdditionalField::new(TagType::VorbisComment, key, value));
        }
    }

    if !chapters.is_empty() {
        let mut list: Vec<Chapter> = chapters
            .into_values()
            .map(|c| Chapter {
                start_ms: c.start_ms.unwrap_or(0),
                end_ms: None,
                title: c.title,
                url: c.url,
                subtitle: String::new(),
            })
            .collect();
        list.sort_by_key(|c| c.start_ms);
        tag.set_chapters(list);
    }

    Ok(tag)
}

/// Serializes a [`TagData`] back into a Vorbis Comment payload (no trailing framing bit).
pub fn serialize_payload(tag: &TagData) -> Vec<u8> {
    let mut entries: Vec<String> = Vec::new();

    for (field, value) in tag.supported_fields() {
        if let Some(&key) = FIELD_TO_KEY.get(&field) {
            entries.push(format!("{key}={value}"));
        }
    }

    for field in tag.additional_fields() {
        if field.tag_type != TagType::VorbisComment || field.native_code == VENDOR_KEY {
            continue;
        }
        if let FieldValue::Text(value) = &field.value {
            entries.push(format!("{}={value}", field.native_code.to_ascii_uppercase()));
        }
    }

    for picture in tag.pictures() {
        let body = flac_picture::encode(picture);
        entries.push(format!("{PICTURE_KEY}={}", base64::encode(&body)));
    }

    if let Some(chapters) = tag.chapters() {
        let mut sorted: Vec<&Chapter> = chapters.iter().collect();
        sorted.sort_by_key(|c| c.start_ms);
        for (i, chapter) in sorted.iter().enumerate() {
            let idx = format!("{i:03}");
            entries.push(format!("CHAPTER{idx}={}", format_timestamp(chapter.start_ms)));
            if !chapter.title.is_empty() {
                entries.push(format!("CHAPTER{idx}NAME={}", chapter.title));
            }
            if !chapter.url.is_empty() {
                entries.push(format!("CHAPTER{idx}URL={}", chapter.url));
            }
        }
    }

    let vendor = tag
        .additional_fields()
        .iter()
        .find(|f| f.tag_type == TagType::VorbisComment && f.native_code == VENDOR_KEY)
        .and_then(|f| match &f.value {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        })
        .unwrap_or("");

    let mut out = Vec::with_capacity(8 + vendor.len() + entries.iter().map(|e| e.len() + 4).sum::<usize>());
    out.write_u32_le(vendor.len() as u32).unwrap();
    out.write_buf(vendor.as_bytes()).unwrap();
    out.write_u32_le(entries.len() as u32).unwrap();
    for entry in &entries {
        out.write_u32_le(entry.len() as u32).unwrap();
        out.write_buf(entry.as_bytes()).unwrap();
    }

    out
}

fn decode_field_text(bytes: &[u8]) -> Result<String> {
    match String::from_utf8(bytes.to_vec()) {
        Ok(s) => Ok(s),
        Err(_) => errors::malformed("vorbis comment", "field is not UTF-8"),
    }
}

#[derive(Default)]
struct ChapterBuilder {
    start_ms: Option<u64>,
    title: String,
    url: String,
}

enum ChapterSuffix {
    Time,
    Name,
    Url,
}

/// Recognizes `CHAPTERxxx`, `CHAPTERxxxNAME`, `CHAPTERxxxURL` (Auphonic convention, §4.3).
fn parse_chapter_key(key: &str) -> Option<(u32, ChapterSuffix)> {
    let rest = key.strip_prefix("CHAPTER")?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let idx: u32 = digits.parse().ok()?;
    let suffix = &rest[digits.len()..];
    let suffix = match suffix {
        "" => ChapterSuffix::Time,
        "NAME" => ChapterSuffix::Name,
        "URL" => ChapterSuffix::Url,
        _ => return None,
    };
    Some((idx, suffix))
}

/// Parses `hh:mm:ss.sss` into milliseconds. Malformed timestamps decode to 0 rather than failing
/// the whole comment block, matching how unrecognized fields are tolerated elsewhere in this
/// codec.
fn parse_timestamp(s: &str) -> Option<u64> {
    let (hms, millis) = match s.split_once('.') {
        Some((hms, frac)) => (hms, frac),
        None => (s, "0"),
    };
    let parts: Vec<&str> = hms.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let h: u64 = parts[0].parse().ok()?;
    let m: u64 = parts[1].parse().ok()?;
    let sec: u64 = parts[2].parse().ok()?;
    let ms: u64 = format!("{millis:0<3}")[..3].parse().ok()?;
    Some(((h * 3600 + m * 60 + sec) * 1000) + ms)
}

fn format_timestamp(ms: u64) -> String {
    let total_sec = ms / 1000;
    let frac = ms % 1000;
    let h = total_sec / 3600;
    let m = (total_sec % 3600) / 60;
    let s = total_sec % 60;
    format!("{h:02}:{m:02}:{s:02}.{frac:03}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagforge_core::tag::{Picture, SupportedField};

    fn payload(vendor: &str, entries: &[&str]) -> Vec<u8> {
        let mut out = Vec::new();
        out.write_u32_le(vendor.len() as u32).unwrap();
        out.write_buf(vendor.as_bytes()).unwrap();
        out.write_u32_le(entries.len() as u32).unwrap();
        for e in entries {
            out.write_u32_le(e.len() as u32).unwrap();
            out.write_buf(e.as_bytes()).unwrap();
        }
        out
    }

    #[test]
    fn parses_known_and_unknown_fields() {
        let data = payload("libvorbis", &["TITLE=Song", "artist=Band", "MOOD=Happy"]);
        let tag = parse_payload(&data).unwrap();
        assert_eq!(tag.get(SupportedField::Title), Some("Song"));
        assert_eq!(tag.get(SupportedField::Artist), Some("Band"));
        assert!(tag.additional_fields().iter().any(|f| f.native_code == "MOOD"));
    }

    #[test]
    fn round_trips_vendor_and_chapters() {
        let data = payload(
            "libvorbis",
            &["CHAPTER000=00:00:00.000", "CHAPTER000NAME=Intro", "CHAPTER001=00:01:30.500"],
        );
        let tag = parse_payload(&data).unwrap();
        let chapters = tag.chapters().unwrap();
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].title, "Intro");
        assert_eq!(chapters[1].start_ms, 90_500);

        let out = serialize_payload(&tag);
        let reparsed = parse_payload(&out).unwrap();
        assert_eq!(reparsed.chapters().unwrap().len(), 2);
    }

    #[test]
    fn metadata_block_picture_round_trips() {
        let pic = Picture {
            picture_type: tagforge_core::tag::PictureType::Front,
            native_code: 3,
            mime: "image/jpeg".into(),
            description: String::new(),
            data: vec![0xff, 0xd8, 0xff],
            marked_for_deletion: false,
        };
        let mut tag = TagData::new();
        tag.add_picture(pic);

        let data = serialize_payload(&tag);
        let reparsed = parse_payload(&data).unwrap();
        assert_eq!(reparsed.pictures().len(), 1);
        assert_eq!(reparsed.pictures()[0].data, vec![0xff, 0xd8, 0xff]);
    }
}
