// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The APEv2 codec (§4.7). The tag lives at the end of the file, optionally followed by a
//! trailing ID3v1 tag; header and footer are each 32 bytes and bracket a run of variable-length
//! items.

use std::collections::BTreeMap;
use std::io::SeekFrom;

use lazy_static::lazy_static;

use tagforge_core::io::{DynStream, ReadBytes, WriteBytes};
use tagforge_core::settings::Settings;
use tagforge_core::tag::{AdditionalField, FieldValue, SupportedField, TagData, TagType};
use tagforge_core::{errors, Result};

use crate::base::{MetaDataIo, ReadOptions, ReadOutcome};

const MAGIC: &[u8; 8] = b"APETAGEX";
const FOOTER_SIZE: u64 = 32;
const ID3V1_SIZE: u64 = 128;
const HAS_HEADER_FLAG: u32 = 1 << 31;
const IS_HEADER_FLAG: u32 = 1 << 29;
const ITEM_TYPE_MASK: u32 = 0b110;

lazy_static! {
    static ref KEY_TO_FIELD: BTreeMap<&'static str, SupportedField> = {
        use SupportedField::*;
        let mut m = BTreeMap::new();
        m.insert("TITLE", Title);
        m.insert("ARTIST", Artist);
        m.insert("ALBUM", Album);
        m.insert("ALBUM ARTIST", AlbumArtist);
        m.insert("COMPOSER", Composer);
        m.insert("COPYRIGHT", Copyright);
        m.insert("PUBLISHER", Publisher);
        m.insert("CONDUCTOR", Conductor);
        m.insert("COMMENT", Comment);
        m.insert("GENRE", Genre);
        m.insert("YEAR", ReleaseYear);
        m.insert("TRACK", TrackNumber);
        m.insert("DISC", DiscNumber);
        m
    };
    static ref FIELD_TO_KEY: BTreeMap<SupportedField, &'static str> = {
        use SupportedField::*;
        let mut m = BTreeMap::new();
        m.insert(Title, "Title");
        m.insert(Artist, "Artist");
        m.insert(Album, "Album");
        m.insert(AlbumArtist, "Album Artist");
        m.insert(Composer, "Composer");
        m.insert(Copyright, "Copyright");
        m.insert(Publisher, "Publisher");
        m.insert(Conductor, "Conductor");
        m.insert(Comment, "Comment");
        m.insert(Genre, "Genre");
        m.insert(ReleaseYear, "Year");
        m.insert(TrackNumber, "Track");
        m.insert(DiscNumber, "Disc");
        m
    };
}

pub struct ApeCodec;

struct RawItem {
    flags: u32,
    key: String,
    value: Vec<u8>,
}

/// Locates the APEv2 footer, accounting for a trailing ID3v1 tag. Returns the footer's offset.
fn find_footer(stream: &mut DynStream) -> Result<Option<u64>> {
    let len = stream.len()?;
    if len < FOOTER_SIZE {
        return Ok(None);
    }

    let mut end = len;
    if len >= ID3V1_SIZE {
        stream.seek(SeekFrom::Start(len - ID3V1_SIZE))?;
        let mut magic = [0u8; 3];
        stream.read_buf_exact(&mut magic)?;
        if &magic == b"TAG" {
            end = len - ID3V1_SIZE;
        }
    }

    if end < FOOTER_SIZE {
        return Ok(None);
    }

    let footer_offset = end - FOOTER_SIZE;
    stream.seek(SeekFrom::Start(footer_offset))?;
    let mut magic = [0u8; 8];
    stream.read_buf_exact(&mut magic)?;
    if &magic == MAGIC {
        Ok(Some(footer_offset))
    } else {
        Ok(None)
    }
}

struct Footer {
    offset: u64,
    size: u32,
    item_count: u32,
    flags: u32,
}

fn read_footer(stream: &mut DynStream, offset: u64) -> Result<Footer> {
    stream.seek(SeekFrom::Start(offset + 8))?;
    let _version = stream.read_u32_le()?;
    let size = stream.read_u32_le()?;
    let item_count = stream.read_u32_le()?;
    let flags = stream.read_u32_le()?;
    Ok(Footer { offset, size, item_count, flags })
}

fn read_items(stream: &mut DynStream, start: u64, count: u32) -> Result<Vec<RawItem>> {
    stream.seek(SeekFrom::Start(start))?;
    let mut items = Vec::with_capacity(count as usize);

    for _ in 0..count {
        let value_len = stream.read_u32_le()?;
        let flags = stream.read_u32_le()?;

        let mut key_bytes = Vec::new();
        loop {
            let b = stream.read_byte()?;
            if b == 0 {
                break;
            }
            key_bytes.push(b);
        }
        let key = match String::from_utf8(key_bytes) {
            Ok(k) => k,
            Err(_) => return errors::malformed("ape item key", "not ASCII"),
        };

        let value = stream.read_boxed_slice_exact(value_len as usize)?.into_vec();
        items.push(RawItem { flags, key, value });
    }

    Ok(items)
}

impl MetaDataIo for ApeCodec {
    fn tag_type(&self) -> TagType {
        TagType::Ape
    }

    fn probe(&self, stream: &mut DynStream) -> Result<bool> {
        Ok(find_footer(stream)?.is_some())
    }

    fn read(&self, stream: &mut DynStream, _opts: &ReadOptions) -> Result<ReadOutcome> {
        let Some(footer_offset) = find_footer(stream)? else {
            return Ok(ReadOutcome::absent());
        };

        let footer = read_footer(stream, footer_offset)?;
        // `size` covers the items plus this footer, but never the (optional) preceding header.
        let items_start = footer_offset.saturating_sub(u64::from(footer.size) - FOOTER_SIZE);

        let items = read_items(stream, items_start, footer.item_count)?;

        let mut tag = TagData::new();
        for item in items {
            let value_type = (item.flags & ITEM_TYPE_MASK) >> 1;
            let key_upper = item.key.to_ascii_uppercase();

            if value_type == 1 {
                tag.upsert_additional_field(AdditionalField::new(
                    TagType::Ape,
                    item.key,
                    FieldValue::Binary(item.value),
                ));
                continue;
            }

            let text = match String::from_utf8(item.value) {
                Ok(s) => s,
                Err(_) => continue,
            };

            if let Some(&field) = KEY_TO_FIELD.get(key_upper.as_str()) {
                tag.set(field, text);
            } else {
                tag.upsert_additional_field(AdditionalField::new(TagType::Ape, item.key, text));
            }
        }

        Ok(ReadOutcome { exists: true, parse_error: None, tag })
    }

    fn write(
        &self,
        stream: &mut DynStream,
        current: &TagData,
        delta: &TagData,
        _settings: &Settings,
    ) -> Result<()> {
        let merged = delta.merge_onto(current);

        let existing_footer = find_footer(stream)?;
        let id3v1_tail = {
            let len = stream.len()?;
            if len >= ID3V1_SIZE {
                stream.seek(SeekFrom::Start(len - ID3V1_SIZE))?;
                let mut magic = [0u8; 3];
                stream.read_buf_exact(&mut magic)?;
                if &magic == b"TAG" {
                    Some(stream.read_boxed_slice_exact((ID3V1_SIZE - 3) as usize)?.into_vec())
                } else {
                    None
                }
            } else {
                None
            }
        };

        let mut items: Vec<(String, u32, Vec<u8>)> = Vec::new();
        for (field, value) in merged.supported_fields() {
            if let Some(&key) = FIELD_TO_KEY.get(&field) {
                items.push((key.to_string(), 0, value.as_bytes().to_vec()));
            }
        }
        for field in merged.additional_fields() {
            if field.tag_type != TagType::Ape {
                continue;
            }
            match &field.value {
                FieldValue::Text(s) => items.push((field.native_code.clone(), 0, s.as_bytes().to_vec())),
                FieldValue::Binary(b) => items.push((field.native_code.clone(), 1 << 1, b.clone())),
                FieldValue::Unsigned(n) => {
                    items.push((field.native_code.clone(), 0, n.to_string().into_bytes()))
                }
            }
        }

        let mut body = Vec::new();
        for (key, flags, value) in &items {
            body.write_u32_le(value.len() as u32).unwrap();
            body.write_u32_le(*flags).unwrap();
            body.write_buf(key.as_bytes()).unwrap();
            body.write_byte(0).unwrap();
            body.write_buf(value).unwrap();
        }

        let tag_truncate_at = match existing_footer {
            Some(footer_offset) => {
                let footer = read_footer(stream, footer_offset)?;
                let has_header = footer.flags & HAS_HEADER_FLAG != 0;
                let tag_start = footer_offset - (u64::from(footer.size) - FOOTER_SIZE)
                    - if has_header { FOOTER_SIZE } else { 0 };
                tag_start
            }
            None => stream.len()? - id3v1_tail.as_ref().map(|_| ID3V1_SIZE).unwrap_or(0),
        };

        stream.set_len(tag_truncate_at)?;
        stream.seek(SeekFrom::Start(tag_truncate_at))?;

        let footer_size = body.len() as u32 + FOOTER_SIZE as u32;

        write_ape_frame(stream, footer_size, items.len() as u32, HAS_HEADER_FLAG | IS_HEADER_FLAG)?;
        stream.write_buf(&body)?;
        write_ape_frame(stream, footer_size, items.len() as u32, HAS_HEADER_FLAG)?;

        if let Some(tail) = id3v1_tail {
            stream.write_buf(b"TAG")?;
            stream.write_buf(&tail)?;
        }

        Ok(())
    }

    fn remove(&self, stream: &mut DynStream, _settings: &Settings) -> Result<()> {
        let Some(footer_offset) = find_footer(stream)? else { return Ok(()) };
        let footer = read_footer(stream, footer_offset)?;
        let has_header = footer.flags & HAS_HEADER_FLAG != 0;
        let tag_start =
            footer_offset - (u64::from(footer.size) - FOOTER_SIZE) - if has_header { FOOTER_SIZE } else { 0 };

        let len = stream.len()?;
        let tail_len = len - (footer_offset + FOOTER_SIZE);
        if tail_len > 0 {
            let tail = {
                stream.seek(SeekFrom::Start(footer_offset + FOOTER_SIZE))?;
                stream.read_boxed_slice_exact(tail_len as usize)?.into_vec()
            };
            stream.set_len(tag_start)?;
            stream.seek(SeekFrom::Start(tag_start))?;
            stream.write_buf(&tail)?;
        } else {
            stream.set_len(tag_start)?;
        }
        Ok(())
    }
}

/// Writes a 32-byte header/footer frame; the byte layout is identical between the two, they
/// differ only in which flag bits the caller sets.
fn write_ape_frame(stream: &mut DynStream, size: u32, item_count: u32, flags: u32) -> Result<()> {
    stream.write_buf(MAGIC)?;
    stream.write_u32_le(2000)?; // version 2.000
    stream.write_u32_le(size)?;
    stream.write_u32_le(item_count)?;
    stream.write_u32_le(flags)?;
    stream.write_buf(&[0u8; 8])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagforge_core::io::{Cursor, MemoryStream, SeekableStream};

    fn dyn_stream(data: Vec<u8>) -> DynStream {
        Cursor::new(Box::new(MemoryStream::new(data)) as Box<dyn SeekableStream>)
    }

    #[test]
    fn writes_then_reads_back_supported_and_unknown_fields() {
        let codec = ApeCodec;
        let mut stream = dyn_stream(b"AUDIODATA".to_vec());

        let mut delta = TagData::new();
        delta.set(SupportedField::Title, "Song");
        delta.set(SupportedField::Artist, "Band");
        delta.upsert_additional_field(AdditionalField::new(TagType::Ape, "MyKey", "value"));

        codec.write(&mut stream, &TagData::new(), &delta, &Settings::default()).unwrap();

        let outcome = codec.read(&mut stream, &ReadOptions::default()).unwrap();
        assert!(outcome.exists);
        assert_eq!(outcome.tag.get(SupportedField::Title), Some("Song"));
        assert_eq!(outcome.tag.get(SupportedField::Artist), Some("Band"));
        assert!(outcome
            .tag
            .additional_fields()
            .iter()
            .any(|f| f.native_code.eq_ignore_ascii_case("mykey")));
    }

    #[test]
    fn remove_drops_tag_and_keeps_audio() {
        let codec = ApeCodec;
        let mut stream = dyn_stream(b"AUDIODATA".to_vec());
        let mut delta = TagData::new();
        delta.set(SupportedField::Title, "Song");
        codec.write(&mut stream, &TagData::new(), &delta, &Settings::default()).unwrap();
        codec.remove(&mut stream, &Settings::default()).unwrap();
        assert_eq!(stream.len().unwrap(), 9);
    }
}
