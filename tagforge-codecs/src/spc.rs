// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The SPC700/ID666/xid6 codec (§4.9). Metadata lives in two places: a fixed-width ID666 header
//! immediately after the emulator register dump, and an optional `xid6` chunk appended after the
//! 64 KiB + 256-byte RAM/DSP region. Fields that fit in the header are also mirrored there on
//! write; fields with no header slot (publisher, disc/track, playback-control) only ever live in
//! `xid6`.

use std::collections::BTreeMap;
use std::io::SeekFrom;

use lazy_static::lazy_static;

use tagforge_core::io::{decode_iso8859_1, encode_iso8859_1, DynStream, ReadBytes, WriteBytes};
use tagforge_core::settings::Settings;
use tagforge_core::tag::{AdditionalField, FieldValue, SupportedField, TagData, TagType};
use tagforge_core::{errors, Result};

use crate::base::{MetaDataIo, ReadOptions, ReadOutcome};

const FORMAT_TAG_LEN: u64 = 33;
const VERSION_MARKER_LEN: u64 = 8;
const TAG_IN_HEADER_OFFSET: u64 = FORMAT_TAG_LEN + VERSION_MARKER_LEN;
const REGISTERS_LEN: u64 = 9;
/// One byte for `tag-in-header`, one for the version byte, then the CPU register dump.
const ID666_OFFSET: u64 = TAG_IN_HEADER_OFFSET + 1 + 1 + REGISTERS_LEN;

const TITLE_LEN: usize = 32;
const ALBUM_LEN: usize = 32;
const DUMPER_LEN: usize = 16;
const COMMENT_LEN: usize = 32;
const DATE_LEN: usize = 11;
const SONG_LEN: usize = 3;
const FADE_LEN: usize = 5;
const ARTIST_LEN: usize = 32;
const ID666_TAIL_UNUSED: usize = 14;
const ID666_LEN: u64 =
    (TITLE_LEN + ALBUM_LEN + DUMPER_LEN + COMMENT_LEN + DATE_LEN + SONG_LEN + FADE_LEN + ARTIST_LEN + ID666_TAIL_UNUSED)
        as u64;

const HEADER_TOTAL_LEN: u64 = 256;
const RAM_LEN: u64 = 65536;
const DSP_REGS_LEN: u64 = 256;
/// Offset of whatever follows the fixed header + audio RAM + DSP register dump.
const SPC_RAW_LENGTH: u64 = HEADER_TOTAL_LEN + RAM_LEN + DSP_REGS_LEN;

const XID6_MAGIC: &[u8; 4] = b"xid6";
const TAG_IN_HEADER_YES: u8 = 0x1A;

lazy_static! {
    /// xid6 playback-control ids (§4.9): these survive `remove` because they are part of the
    /// audio contract, not metadata.
    static ref PLAYBACK_FIELD_NAMES: BTreeMap<u8, &'static str> = {
        let mut m = BTreeMap::new();
        m.insert(0x30, "XID6_INTRO");
        m.insert(0x31, "XID6_LOOP");
        m.insert(0x32, "XID6_END");
        m.insert(0x33, "XID6_FADE");
        m.insert(0x34, "XID6_MUTE");
        m.insert(0x35, "XID6_LOOPX");
        m.insert(0x36, "XID6_AMP");
    };
}

pub struct SpcCodec;

#[derive(Copy, Clone, PartialEq, Eq)]
enum FieldClass {
    Text,
    Empty,
    Binary,
}

fn classify(bytes: &[u8]) -> FieldClass {
    if bytes.iter().all(|&b| b == 0) {
        FieldClass::Empty
    } else if bytes.iter().all(|&b| b == 0 || b == b'/' || b.is_ascii_digit()) {
        FieldClass::Text
    } else {
        FieldClass::Binary
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Mode {
    Text,
    Binary,
}

/// Text/binary ID666 mode is ambiguous from the header alone; this walks the disambiguation rules
/// in order. The last two rules both resolve to `Binary` but are kept as separate cases rather
/// than collapsed, since each checks a different field.
fn detect_mode(date: &[u8], song: &[u8], fade: &[u8]) -> Mode {
    let date_c = classify(date);
    let song_c = classify(song);
    let fade_c = classify(fade);

    if song_c == FieldClass::Text && fade_c == FieldClass::Text && date_c == FieldClass::Text {
        Mode::Text
    } else if date_c == FieldClass::Empty {
        Mode::Binary
    } else {
        Mode::Binary
    }
}

#[derive(Clone)]
enum XidValue {
    /// Type 0: the value lives in the item's own size field.
    Inline(u16),
    /// Type 1: a latin-1 string, null-terminated and padded to an even length.
    Text(String),
    /// Type 4: a 32-bit little-endian integer.
    Dword(u32),
}

struct XidItem {
    id: u8,
    value: XidValue,
}

fn read_xid6_items(bytes: &[u8]) -> Vec<XidItem> {
    let mut items = Vec::new();
    let mut pos = 0usize;

    while pos + 4 <= bytes.len() {
        let id = bytes[pos];
        let kind = bytes[pos + 1];
        let size = u16::from_le_bytes([bytes[pos + 2], bytes[pos + 3]]);
        pos += 4;

        match kind {
            0 => items.push(XidItem { id, value: XidValue::Inline(size) }),
            1 => {
                let len = size as usize;
                if pos + len > bytes.len() {
                    log::debug!("spc: xid6 item {id:#04x} string overruns chunk, stopping");
                    break;
                }
                let text = decode_iso8859_1(&bytes[pos..pos + len]);
                items.push(XidItem { id, value: XidValue::Text(text) });
                pos += if len % 2 == 1 { len + 1 } else { len };
            }
            4 => {
                if pos + 4 > bytes.len() {
                    log::debug!("spc: xid6 item {id:#04x} dword overruns chunk, stopping");
                    break;
                }
                let v = u32::from_le_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]]);
                items.push(XidItem { id, value: XidValue::Dword(v) });
                pos += 4;
            }
            other => {
                log::debug!("spc: unrecognized xid6 item type {other}, stopping");
                break;
            }
        }
    }

    items
}

fn write_xid6_item(out: &mut Vec<u8>, id: u8, value: &XidValue) {
    match value {
        XidValue::Inline(v) => {
            out.push(id);
            out.push(0);
            out.extend_from_slice(&v.to_le_bytes());
        }
        XidValue::Text(s) => {
            let mut bytes = encode_iso8859_1(s);
            bytes.push(0);
            let size = bytes.len() as u16;
            out.push(id);
            out.push(1);
            out.extend_from_slice(&size.to_le_bytes());
            out.extend_from_slice(&bytes);
            if bytes.len() % 2 == 1 {
                out.push(0);
            }
        }
        XidValue::Dword(v) => {
            out.push(id);
            out.push(4);
            out.extend_from_slice(&4u16.to_le_bytes());
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
}

fn apply_xid6_items(tag: &mut TagData, items: &[XidItem]) {
    for item in items {
        match (item.id, &item.value) {
            (0x01, XidValue::Text(s)) => tag.set(SupportedField::Title, s.as_str()),
            (0x02, XidValue::Text(s)) => tag.set(SupportedField::Album, s.as_str()),
            (0x03, XidValue::Text(s)) => tag.set(SupportedField::Artist, s.as_str()),
            (0x04, XidValue::Text(s)) => {
                tag.upsert_additional_field(AdditionalField::new(TagType::Spc, "DUMPER", s.as_str()))
            }
            (0x05, XidValue::Text(s)) => {
                tag.upsert_additional_field(AdditionalField::new(TagType::Spc, "DATE", s.as_str()))
            }
            (0x06, XidValue::Text(s)) => {
                tag.upsert_additional_field(AdditionalField::new(TagType::Spc, "EMULATOR", s.as_str()))
            }
            (0x07, XidValue::Text(s)) => tag.set(SupportedField::Comment, s.as_str()),
            (0x10, XidValue::Text(s)) => {
                tag.upsert_additional_field(AdditionalField::new(TagType::Spc, "OST", s.as_str()))
            }
            (0x11, XidValue::Inline(v)) => tag.set(SupportedField::DiscNumber, v.to_string()),
            (0x12, XidValue::Inline(v)) => {
                let track = (*v >> 8) as u8;
                tag.set(SupportedField::TrackNumber, track.to_string());
                let suffix = (*v & 0xff) as u8;
                if suffix > 0x20 {
                    tag.upsert_additional_field(AdditionalField::new(
                        TagType::Spc,
                        "TRACK_SUFFIX",
                        (suffix as char).to_string(),
                    ));
                }
            }
            (0x13, XidValue::Text(s)) => tag.set(SupportedField::Publisher, s.as_str()),
            (0x14, XidValue::Inline(v)) => tag.upsert_additional_field(AdditionalField::new(
                TagType::Spc,
                "COPYRIGHT_YEAR",
                u64::from(*v),
            )),
            (id, value) => {
                if let Some(&name) = PLAYBACK_FIELD_NAMES.get(&id) {
                    let value = match value {
                        XidValue::Inline(v) => Some(u64::from(*v)),
                        XidValue::Dword(v) => Some(u64::from(*v)),
                        XidValue::Text(_) => None,
                    };
                    if let Some(value) = value {
                        tag.upsert_additional_field(AdditionalField::new(TagType::Spc, name, value));
                    }
                } else {
                    log::debug!("spc: unrecognized xid6 id {id:#04x}");
                }
            }
        }
    }
}

fn additional_text(tag: &TagData, code: &str) -> Option<String> {
    tag.additional_fields()
        .iter()
        .find(|f| f.tag_type == TagType::Spc && f.native_code == code)
        .and_then(|f| match &f.value {
            FieldValue::Text(s) => Some(s.clone()),
            _ => None,
        })
}

fn additional_unsigned(tag: &TagData, code: &str) -> Option<u64> {
    tag.additional_fields()
        .iter()
        .find(|f| f.tag_type == TagType::Spc && f.native_code == code)
        .and_then(|f| match &f.value {
            FieldValue::Unsigned(n) => Some(*n),
            _ => None,
        })
}

fn fixed_width(s: &str, width: usize) -> Vec<u8> {
    let mut bytes = encode_iso8859_1(s);
    bytes.truncate(width);
    bytes.resize(width, 0);
    bytes
}

/// Header-only duration (§4.9): whole seconds, since the header only carries second/ms
/// resolution. `None` when no song length was recorded.
pub fn header_duration_seconds(song_seconds: u32, fade_ms: u32) -> Option<u64> {
    if song_seconds == 0 {
        return None;
    }
    Some(u64::from(song_seconds) + (u64::from(fade_ms) + 500) / 1000)
}

/// xid6 playback-field duration, in milliseconds, at 64000 ticks/second (§4.9). `loopx` of 0
/// zeroes the loop contribution entirely rather than being treated as 1.
pub fn xid6_duration_ms(intro: u32, loop_ticks: u32, end: u32, fade: u32, loopx: u32) -> u64 {
    let loopx = loopx.min(9);
    let loop_total = (u64::from(loop_ticks) * u64::from(loopx)).min(383_999_999);
    let ticks = u64::from(intro) + loop_total + u64::from(end) + u64::from(fade);
    ticks * 1000 / 64000
}

/// Computes duration in milliseconds from whatever fields are present on `tag`: xid6
/// playback-control fields take precedence, falling back to the header song length/fade.
pub fn duration_ms(tag: &TagData) -> Option<u64> {
    let intro = additional_unsigned(tag, "XID6_INTRO");
    let loop_ticks = additional_unsigned(tag, "XID6_LOOP");
    let end = additional_unsigned(tag, "XID6_END");
    let fade = additional_unsigned(tag, "XID6_FADE");

    if let (Some(intro), Some(loop_ticks), Some(end), Some(fade)) = (intro, loop_ticks, end, fade) {
        let loopx = additional_unsigned(tag, "XID6_LOOPX").unwrap_or(1) as u32;
        return Some(xid6_duration_ms(intro as u32, loop_ticks as u32, end as u32, fade as u32, loopx));
    }

    let song_seconds = additional_unsigned(tag, "SONG_LENGTH_SECONDS")? as u32;
    let fade_ms = additional_unsigned(tag, "FADE_MS").unwrap_or(0) as u32;
    header_duration_seconds(song_seconds, fade_ms).map(|secs| secs * 1000)
}

fn push_if_overflows_header(items: &mut Vec<(u8, XidValue)>, id: u8, text: &str, width: usize) {
    if !text.is_empty() && encode_iso8859_1(text).len() > width {
        items.push((id, XidValue::Text(text.to_string())));
    }
}

impl MetaDataIo for SpcCodec {
    fn tag_type(&self) -> TagType {
        TagType::Spc
    }

    fn probe(&self, stream: &mut DynStream) -> Result<bool> {
        stream.seek(SeekFrom::Start(0))?;
        let mut magic = [0u8; FORMAT_TAG_LEN as usize];
        if stream.read_buf_exact(&mut magic).is_err() {
            return Ok(false);
        }
        Ok(magic.starts_with(b"SNES-SPC700 Sound File Data"))
    }

    fn read(&self, stream: &mut DynStream, _opts: &ReadOptions) -> Result<ReadOutcome> {
        if !self.probe(stream)? {
            return Ok(ReadOutcome::absent());
        }

        let len = stream.len()?;
        if len < SPC_RAW_LENGTH {
            return errors::malformed("spc stream", "shorter than the fixed header + RAM + DSP region");
        }

        let mut tag = TagData::new();

        stream.seek(SeekFrom::Start(TAG_IN_HEADER_OFFSET))?;
        let tag_in_header = stream.read_byte()?;

        if tag_in_header == TAG_IN_HEADER_YES {
            stream.seek(SeekFrom::Start(ID666_OFFSET))?;
            let title = stream.read_boxed_slice_exact(TITLE_LEN)?;
            let album = stream.read_boxed_slice_exact(ALBUM_LEN)?;
            let dumper = stream.read_boxed_slice_exact(DUMPER_LEN)?;
            let comment = stream.read_boxed_slice_exact(COMMENT_LEN)?;
            let date = stream.read_boxed_slice_exact(DATE_LEN)?;
            let song = stream.read_boxed_slice_exact(SONG_LEN)?;
            let fade = stream.read_boxed_slice_exact(FADE_LEN)?;
            let artist = stream.read_boxed_slice_exact(ARTIST_LEN)?;

            tag.set(SupportedField::Title, decode_iso8859_1(&title));
            tag.set(SupportedField::Album, decode_iso8859_1(&album));
            tag.set(SupportedField::Artist, decode_iso8859_1(&artist));
            tag.set(SupportedField::Comment, decode_iso8859_1(&comment));

            let dumper_text = decode_iso8859_1(&dumper);
            if !dumper_text.is_empty() {
                tag.upsert_additional_field(AdditionalField::new(TagType::Spc, "DUMPER", dumper_text));
            }

            let mode = detect_mode(&date, &song, &fade);
            let (song_seconds, fade_ms) = match mode {
                Mode::Text => (
                    decode_iso8859_1(&song).trim().parse::<u32>().unwrap_or(0),
                    decode_iso8859_1(&fade).trim().parse::<u32>().unwrap_or(0),
                ),
                Mode::Binary => (
                    u32::from(u16::from_le_bytes([song[0], song[1]])).min(959),
                    u32::from_le_bytes([fade[0], fade[1], fade[2], fade[3]]).min(59999),
                ),
            };
            tag.upsert_additional_field(AdditionalField::new(
                TagType::Spc,
                "SONG_LENGTH_SECONDS",
                u64::from(song_seconds),
            ));
            tag.upsert_additional_field(AdditionalField::new(TagType::Spc, "FADE_MS", u64::from(fade_ms)));

            if mode == Mode::Text {
                let date_text = decode_iso8859_1(&date);
                if !date_text.is_empty() {
                    tag.upsert_additional_field(AdditionalField::new(TagType::Spc, "DATE", date_text));
                }
            }
        }

        if len > SPC_RAW_LENGTH {
            stream.seek(SeekFrom::Start(SPC_RAW_LENGTH))?;
            let mut xmagic = [0u8; 4];
            stream.read_buf_exact(&mut xmagic)?;
            if &xmagic == XID6_MAGIC {
                let chunk_size = stream.read_u32_le()?;
                let body = stream.read_boxed_slice_exact(chunk_size as usize)?.into_vec();
                let items = read_xid6_items(&body);
                apply_xid6_items(&mut tag, &items);
            } else {
                log::debug!("spc: trailing data past the RAM/DSP region has no xid6 magic, ignoring");
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

        if !self.probe(stream)? {
            return errors::malformed("spc header", "missing SNES-SPC700 format tag");
        }
        let len = stream.len()?;
        if len < SPC_RAW_LENGTH {
            return errors::malformed("spc stream", "shorter than the fixed header + RAM + DSP region");
        }

        let title = merged.get(SupportedField::Title).unwrap_or("");
        let album = merged.get(SupportedField::Album).unwrap_or("");
        let artist = merged.get(SupportedField::Artist).unwrap_or("");
        let comment = merged.get(SupportedField::Comment).unwrap_or("");
        let dumper = additional_text(&merged, "DUMPER").unwrap_or_default();
        let date = additional_text(&merged, "DATE").unwrap_or_default();
        let song_seconds = (additional_unsigned(&merged, "SONG_LENGTH_SECONDS").unwrap_or(0) as u32).min(959);
        let fade_ms = (additional_unsigned(&merged, "FADE_MS").unwrap_or(0) as u32).min(59999);

        stream.seek(SeekFrom::Start(TAG_IN_HEADER_OFFSET))?;
        stream.write_byte(TAG_IN_HEADER_YES)?;

        stream.seek(SeekFrom::Start(ID666_OFFSET))?;
        stream.write_buf(&fixed_width(title, TITLE_LEN))?;
        stream.write_buf(&fixed_width(album, ALBUM_LEN))?;
        stream.write_buf(&fixed_width(&dumper, DUMPER_LEN))?;
        stream.write_buf(&fixed_width(comment, COMMENT_LEN))?;
        stream.write_buf(&fixed_width(&date, DATE_LEN))?;

        let mut song_bytes = [0u8; SONG_LEN];
        song_bytes[..2].copy_from_slice(&(song_seconds as u16).to_le_bytes());
        stream.write_buf(&song_bytes)?;

        let mut fade_bytes = [0u8; FADE_LEN];
        fade_bytes[..4].copy_from_slice(&fade_ms.to_le_bytes());
        stream.write_buf(&fade_bytes)?;

        stream.write_buf(&fixed_width(artist, ARTIST_LEN))?;
        stream.write_buf(&[0u8; ID666_TAIL_UNUSED])?;
        stream.write_buf(&vec![0u8; (HEADER_TOTAL_LEN - ID666_OFFSET - ID666_LEN) as usize])?;

        let mut items: Vec<(u8, XidValue)> = Vec::new();
        push_if_overflows_header(&mut items, 0x01, title, TITLE_LEN);
        push_if_overflows_header(&mut items, 0x02, album, ALBUM_LEN);
        push_if_overflows_header(&mut items, 0x03, artist, ARTIST_LEN);
        push_if_overflows_header(&mut items, 0x07, comment, COMMENT_LEN);
        push_if_overflows_header(&mut items, 0x04, &dumper, DUMPER_LEN);

        if let Some(s) = additional_text(&merged, "EMULATOR") {
            items.push((0x06, XidValue::Text(s)));
        }
        if let Some(s) = additional_text(&merged, "OST") {
            items.push((0x10, XidValue::Text(s)));
        }
        if let Some(n) = merged.get(SupportedField::DiscNumber).and_then(|s| s.parse::<u16>().ok()) {
            items.push((0x11, XidValue::Inline(n)));
        }
        if let Some(track) = merged.get(SupportedField::TrackNumber).and_then(|s| s.parse::<u8>().ok()) {
            let suffix = additional_text(&merged, "TRACK_SUFFIX")
                .and_then(|s| s.chars().next())
                .map(|c| c as u16)
                .unwrap_or(0);
            items.push((0x12, XidValue::Inline((u16::from(track) << 8) | suffix)));
        }
        if let Some(s) = merged.get(SupportedField::Publisher) {
            items.push((0x13, XidValue::Text(s.to_string())));
        }
        if let Some(year) = additional_unsigned(&merged, "COPYRIGHT_YEAR") {
            items.push((0x14, XidValue::Inline(year as u16)));
        }
        for (&id, &name) in PLAYBACK_FIELD_NAMES.iter() {
            if let Some(v) = additional_unsigned(&merged, name) {
                let value = if id == 0x34 || id == 0x35 { XidValue::Inline(v as u16) } else { XidValue::Dword(v as u32) };
                items.push((id, value));
            }
        }

        let mut body = Vec::new();
        for (id, value) in &items {
            write_xid6_item(&mut body, *id, value);
        }

        splice_xid6(stream, len, &body)?;

        Ok(())
    }

    fn remove(&self, stream: &mut DynStream, _settings: &Settings) -> Result<()> {
        if !self.probe(stream)? {
            return Ok(());
        }
        let len = stream.len()?;
        if len < SPC_RAW_LENGTH {
            return Ok(());
        }

        // Playback-control fields and the header song-length/fade survive removal: they affect
        // how the audio plays back, not what it is labeled as.
        let current = self.read(stream, &ReadOptions::default())?.tag;
        let song_seconds = (additional_unsigned(&current, "SONG_LENGTH_SECONDS").unwrap_or(0) as u32).min(959);
        let fade_ms = (additional_unsigned(&current, "FADE_MS").unwrap_or(0) as u32).min(59999);

        stream.seek(SeekFrom::Start(TAG_IN_HEADER_OFFSET))?;
        stream.write_byte(TAG_IN_HEADER_YES)?;

        stream.seek(SeekFrom::Start(ID666_OFFSET))?;
        stream.write_buf(&[0u8; TITLE_LEN])?;
        stream.write_buf(&[0u8; ALBUM_LEN])?;
        stream.write_buf(&[0u8; DUMPER_LEN])?;
        stream.write_buf(&[0u8; COMMENT_LEN])?;
        stream.write_buf(&[0u8; DATE_LEN])?;

        let mut song_bytes = [0u8; SONG_LEN];
        song_bytes[..2].copy_from_slice(&(song_seconds as u16).to_le_bytes());
        stream.write_buf(&song_bytes)?;

        let mut fade_bytes = [0u8; FADE_LEN];
        fade_bytes[..4].copy_from_slice(&fade_ms.to_le_bytes());
        stream.write_buf(&fade_bytes)?;

        stream.write_buf(&[0u8; ARTIST_LEN])?;
        stream.write_buf(&[0u8; ID666_TAIL_UNUSED])?;
        stream.write_buf(&vec![0u8; (HEADER_TOTAL_LEN - ID666_OFFSET - ID666_LEN) as usize])?;

        let mut body = Vec::new();
        for (&id, &name) in PLAYBACK_FIELD_NAMES.iter() {
            if let Some(v) = additional_unsigned(&current, name) {
                let value = if id == 0x34 || id == 0x35 { XidValue::Inline(v as u16) } else { XidValue::Dword(v as u32) };
                write_xid6_item(&mut body, id, &value);
            }
        }

        splice_xid6(stream, len, &body)?;

        Ok(())
    }
}

/// Resizes the region past `SPC_RAW_LENGTH` to hold `body` (or nothing, if empty), preserving
/// everything before it.
fn splice_xid6(stream: &mut DynStream, old_len: u64, body: &[u8]) -> Result<()> {
    let new_len = if body.is_empty() { SPC_RAW_LENGTH } else { SPC_RAW_LENGTH + 8 + body.len() as u64 };

    if new_len > old_len {
        tagforge_core::io::lengthen(stream, old_len, new_len - old_len)?;
    } else if new_len < old_len {
        tagforge_core::io::shorten(stream, new_len, old_len - new_len)?;
    }

    if !body.is_empty() {
        stream.seek(SeekFrom::Start(SPC_RAW_LENGTH))?;
        stream.write_buf(XID6_MAGIC)?;
        stream.write_u32_le(body.len() as u32)?;
        stream.write_buf(body)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagforge_core::io::{Cursor, MemoryStream, SeekableStream};

    fn dyn_stream(data: Vec<u8>) -> DynStream {
        Cursor::new(Box::new(MemoryStream::new(data)) as Box<dyn SeekableStream>)
    }

    fn fixture_binary_mode(title: &str, song_seconds: u16, fade_ms: u32) -> Vec<u8> {
        let mut out = vec![0u8; SPC_RAW_LENGTH as usize];
        let magic = b"SNES-SPC700 Sound File Data v0.30";
        out[..magic.len().min(FORMAT_TAG_LEN as usize)]
            .copy_from_slice(&magic[..magic.len().min(FORMAT_TAG_LEN as usize)]);
        out[TAG_IN_HEADER_OFFSET as usize] = TAG_IN_HEADER_YES;

        let title_bytes = fixed_width(title, TITLE_LEN);
        let title_off = ID666_OFFSET as usize;
        out[title_off..title_off + TITLE_LEN].copy_from_slice(&title_bytes);

        let song_off = ID666_OFFSET as usize + TITLE_LEN + ALBUM_LEN + DUMPER_LEN + COMMENT_LEN + DATE_LEN;
        out[song_off..song_off + 2].copy_from_slice(&song_seconds.to_le_bytes());
        let fade_off = song_off + SONG_LEN;
        out[fade_off..fade_off + 4].copy_from_slice(&fade_ms.to_le_bytes());

        out
    }

    #[test]
    fn xid6_duration_zero_loopx_drops_loop_contribution() {
        assert_eq!(xid6_duration_ms(1000, 2_000_000, 500, 64_000, 0), xid6_duration_ms(1000, 0, 500, 64_000, 1));
    }

    #[test]
    fn reads_header_fields_and_computes_duration() {
        let codec = SpcCodec;
        let mut stream = dyn_stream(fixture_binary_mode("Corridors of Time", 185, 2000));

        let outcome = codec.read(&mut stream, &ReadOptions::default()).unwrap();
        assert!(outcome.exists);
        assert_eq!(outcome.tag.get(SupportedField::Title), Some("Corridors of Time"));
        assert_eq!(duration_ms(&outcome.tag), Some(187_000));
    }

    #[test]
    fn write_then_read_round_trips_title_and_playback_fields() {
        let codec = SpcCodec;
        let mut stream = dyn_stream(fixture_binary_mode("Old Title", 10, 0));

        let mut delta = TagData::new();
        delta.set(SupportedField::Title, "New Title");
        delta.upsert_additional_field(AdditionalField::new(TagType::Spc, "XID6_INTRO", 1000u64));
        delta.upsert_additional_field(AdditionalField::new(TagType::Spc, "XID6_LOOP", 2_000_000u64));
        delta.upsert_additional_field(AdditionalField::new(TagType::Spc, "XID6_END", 500u64));
        delta.upsert_additional_field(AdditionalField::new(TagType::Spc, "XID6_FADE", 64_000u64));
        delta.upsert_additional_field(AdditionalField::new(TagType::Spc, "XID6_LOOPX", 2u64));

        codec.write(&mut stream, &TagData::new(), &delta, &Settings::default()).unwrap();

        let outcome = codec.read(&mut stream, &ReadOptions::default()).unwrap();
        assert_eq!(outcome.tag.get(SupportedField::Title), Some("New Title"));
        assert_eq!(
            duration_ms(&outcome.tag),
            Some(xid6_duration_ms(1000, 2_000_000, 500, 64_000, 2))
        );
    }

    #[test]
    fn remove_clears_text_but_keeps_playback_and_song_length() {
        let codec = SpcCodec;
        let mut stream = dyn_stream(fixture_binary_mode("Some Title", 120, 3000));

        let mut delta = TagData::new();
        delta.upsert_additional_field(AdditionalField::new(TagType::Spc, "XID6_INTRO", 100u64));
        delta.upsert_additional_field(AdditionalField::new(TagType::Spc, "XID6_LOOP", 50u64));
        delta.upsert_additional_field(AdditionalField::new(TagType::Spc, "XID6_END", 10u64));
        delta.upsert_additional_field(AdditionalField::new(TagType::Spc, "XID6_FADE", 5u64));
        codec.write(&mut stream, &TagData::new(), &delta, &Settings::default()).unwrap();

        codec.remove(&mut stream, &Settings::default()).unwrap();

        let outcome = codec.read(&mut stream, &ReadOptions::default()).unwrap();
        assert_eq!(outcome.tag.get(SupportedField::Title), None);
        assert_eq!(
            outcome.tag.additional_fields().iter().find(|f| f.native_code == "SONG_LENGTH_SECONDS").and_then(
                |f| match &f.value {
                    FieldValue::Unsigned(n) => Some(*n),
                    _ => None,
                }
            ),
            Some(120)
        );
        assert!(outcome.tag.additional_fields().iter().any(|f| f.native_code == "XID6_INTRO"));
    }
}
