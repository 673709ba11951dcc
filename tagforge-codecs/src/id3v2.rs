// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The ID3v2 codec (§4.6): header + frames at the start of the file. Versions 2.2 through 2.4 are
//! all readable; writes always target the version in [`Settings::default_id3v2_version`] (2.2 is
//! never a write target — its 3-byte frame ids are a read-only legacy accommodation).

use std::collections::BTreeMap;
use std::io::SeekFrom;

use lazy_static::lazy_static;

use tagforge_core::io::{
    decode_iso8859_1, decode_utf16, decode_syncsafe, encode_iso8859_1, encode_syncsafe,
    DynStream, ReadBytes, WriteBytes,
};
use tagforge_core::settings::{Id3v2Version, Settings};
use tagforge_core::tag::{
    AdditionalField, FieldValue, Picture, PictureType, SupportedField, TagData, TagType,
};
use tagforge_core::{errors, Result};

use crate::base::{MetaDataIo, ReadOptions, ReadOutcome};
use crate::flac::picture::{native_from_picture_type, picture_type_from_native};

const MAGIC: &[u8; 3] = b"ID3";

const FLAG_EXT_HEADER: u8 = 0x40;

lazy_static! {
    static ref FRAME_TO_FIELD: BTreeMap<&'static str, SupportedField> = {
        use SupportedField::*;
        let mut m = BTreeMap::new();
        m.insert("TIT2", Title);
        m.insert("TPE1", Artist);
        m.insert("TALB", Album);
        m.insert("TPE2", AlbumArtist);
        m.insert("TCOM", Composer);
        m.insert("TCON", Genre);
        m.insert("TDRC", ReleaseDate);
        m.insert("TYER", ReleaseYear);
        m.insert("TRCK", TrackNumber);
        m.insert("TPOS", DiscNumber);
        m.insert("TCOP", Copyright);
        m.insert("TPUB", Publisher);
        m.insert("TPE3", Conductor);
        m.insert("TOPE", OriginalArtist);
        m.insert("TOAL", OriginalAlbum);
        m
    };
    static ref FIELD_TO_FRAME: BTreeMap<SupportedField, &'static str> = {
        use SupportedField::*;
        let mut m = BTreeMap::new();
        m.insert(Title, "TIT2");
        m.insert(Artist, "TPE1");
        m.insert(Album, "TALB");
        m.insert(AlbumArtist, "TPE2");
        m.insert(Composer, "TCOM");
        m.insert(Genre, "TCON");
        m.insert(ReleaseDate, "TDRC");
        m.insert(ReleaseYear, "TYER");
        m.insert(TrackNumber, "TRCK");
        m.insert(DiscNumber, "TPOS");
        m.insert(Copyright, "TCOP");
        m.insert(Publisher, "TPUB");
        m.insert(Conductor, "TPE3");
        m.insert(OriginalArtist, "TOPE");
        m.insert(OriginalAlbum, "TOAL");
        m
    };
}

pub struct Id3v2Codec;

struct Header {
    version: Id3v2Version,
    flags: u8,
    tag_size: u32,
}

fn read_header(stream: &mut DynStream) -> Result<Option<Header>> {
    stream.seek(SeekFrom::Start(0))?;
    let mut magic = [0u8; 3];
    stream.read_buf_exact(&mut magic)?;
    if &magic != MAGIC {
        return Ok(None);
    }

    let major = stream.read_byte()?;
    let _revision = stream.read_byte()?;
    let flags = stream.read_byte()?;
    let size_bytes = {
        let mut buf = [0u8; 4];
        stream.read_buf_exact(&mut buf)?;
        buf
    };
    let tag_size = decode_syncsafe(&size_bytes);

    let version = match major {
        2 => Id3v2Version::V2_2,
        3 => Id3v2Version::V2_3,
        4 => Id3v2Version::V2_4,
        _ => return errors::unsupported("id3v2 major version"),
    };

    Ok(Some(Header { version, flags, tag_size }))
}

struct Frame {
    id: String,
    payload: Vec<u8>,
}

fn read_frames(stream: &mut DynStream, header: &Header) -> Result<Vec<Frame>> {
    let mut body_start = 10u64;
    if header.flags & FLAG_EXT_HEADER != 0 {
        stream.seek(SeekFrom::Start(body_start))?;
        let mut size_buf = [0u8; 4];
        stream.read_buf_exact(&mut size_buf)?;
        let ext_size = if header.version == Id3v2Version::V2_4 {
            decode_syncsafe(&size_buf)
        } else {
            u32::from_be_bytes(size_buf)
        };
        body_start += u64::from(ext_size);
    }

    let body_end = 10 + u64::from(header.tag_size);
    let mut pos = body_start;
    let mut frames = Vec::new();

    while pos + frame_header_len(header.version) <= body_end {
        stream.seek(SeekFrom::Start(pos))?;

        let (id, size, consumed_header) = match header.version {
            Id3v2Version::V2_2 => {
                let mut id_bytes = [0u8; 3];
                stream.read_buf_exact(&mut id_bytes)?;
                if id_bytes == [0, 0, 0] {
                    break;
                }
                let size = stream.read_u24_be()?;
                (String::from_utf8_lossy(&id_bytes).to_string(), size, 6)
            }
            Id3v2Version::V2_3 => {
                let mut id_bytes = [0u8; 4];
                stream.read_buf_exact(&mut id_bytes)?;
                if id_bytes == [0, 0, 0, 0] {
                    break;
                }
                let size = stream.read_u32_be()?;
                let _flags = stream.read_u16_be()?;
                (String::from_utf8_lossy(&id_bytes).to_string(), size, 10)
            }
            Id3v2Version::V2_4 => {
                let mut id_bytes = [0u8; 4];
                stream.read_buf_exact(&mut id_bytes)?;
                if id_bytes == [0, 0, 0, 0] {
                    break;
                }
                let mut size_buf = [0u8; 4];
                stream.read_buf_exact(&mut size_buf)?;
                let size = decode_syncsafe(&size_buf);
                let _flags = stream.read_u16_be()?;
                (String::from_utf8_lossy(&id_bytes).to_string(), size, 10)
            }
        };

        let payload = stream.read_boxed_slice_exact(size as usize)?.into_vec();
        frames.push(Frame { id, payload });
        pos += consumed_header + u64::from(size);
    }

    Ok(frames)
}

fn frame_header_len(version: Id3v2Version) -> u64 {
    match version {
        Id3v2Version::V2_2 => 6,
        Id3v2Version::V2_3 | Id3v2Version::V2_4 => 10,
    }
}

/// Splits a declared-encoding text buffer at its first terminator, returning (before, after).
/// For UTF-16 the terminator is a 2-byte `0x0000` on an even boundary.
fn split_at_terminator(buf: &[u8], encoding: u8) -> (&[u8], &[u8]) {
    if encoding == 1 || encoding == 2 {
        let mut i = 0;
        while i + 1 < buf.len() {
            if buf[i] == 0 && buf[i + 1] == 0 {
                return (&buf[..i], &buf[i + 2..]);
            }
            i += 2;
        }
        (buf, &[])
    } else {
        match buf.iter().position(|&b| b == 0) {
            Some(i) => (&buf[..i], &buf[i + 1..]),
            None => (buf, &[]),
        }
    }
}

fn decode_text(buf: &[u8], encoding: u8) -> String {
    match encoding {
        0 => decode_iso8859_1(buf),
        1 => decode_utf16(buf, false),
        2 => decode_utf16(buf, true),
        3 => String::from_utf8_lossy(buf).trim_end_matches('\0').to_string(),
        _ => decode_iso8859_1(buf),
    }
}

/// Picks the narrowest encoding byte that can represent `s` without loss, honoring the version's
/// capabilities (UTF-8 is 2.4-only).
fn choose_encoding(s: &str, version: Id3v2Version) -> u8 {
    if s.chars().all(|c| (c as u32) <= 0xff) {
        0
    } else if version == Id3v2Version::V2_4 {
        3
    } else {
        1
    }
}

fn encode_text(s: &str, encoding: u8) -> Vec<u8> {
    match encoding {
        0 => encode_iso8859_1(s),
        1 => {
            let mut out = vec![0xff, 0xfe];
            for u in s.encode_utf16() {
                out.extend_from_slice(&u.to_le_bytes());
            }
            out
        }
        2 => {
            let mut out = Vec::new();
            for u in s.encode_utf16() {
                out.extend_from_slice(&u.to_be_bytes());
            }
            out
        }
        _ => s.as_bytes().to_vec(),
    }
}

fn decode_frame(tag: &mut TagData, frame: &Frame) {
    let id = frame.id.as_str();

    if id == "APIC" || id == "PIC" {
        decode_picture_frame(tag, frame);
        return;
    }

    if id == "COMM" {
        decode_comm_frame(tag, frame);
        return;
    }

    if id == "TXXX" {
        decode_txxx_frame(tag, frame);
        return;
    }

    if id == "WXXX" {
        decode_wxxx_frame(tag, frame);
        return;
    }

    if id.starts_with('T') {
        let Some(&encoding) = frame.payload.first() else { return };
        let (value, _) = split_at_terminator(&frame.payload[1..], encoding);
        let text = decode_text(value, encoding);

        if let Some(&field) = FRAME_TO_FIELD.get(id) {
            tag.set(field, text);
        } else {
            tag.upsert_additional_field(AdditionalField::new(TagType::Id3v2, id, text));
        }
        return;
    }

    if id.starts_with('W') {
        let text = decode_iso8859_1(&frame.payload);
        tag.upsert_additional_field(AdditionalField::new(TagType::Id3v2, id, text));
        return;
    }

    tag.upsert_additional_field(AdditionalField::new(
        TagType::Id3v2,
        id,
        FieldValue::Binary(frame.payload.clone()),
    ));
}

fn decode_comm_frame(tag: &mut TagData, frame: &Frame) {
    if frame.payload.len() < 5 {
        return;
    }
    let encoding = frame.payload[0];
    let rest = &frame.payload[4..];
    let (description, text) = split_at_terminator(rest, encoding);
    let description = decode_text(description, encoding);
    let text = decode_text(text, encoding);

    if description.is_empty() {
        tag.set(SupportedField::Comment, text);
    } else {
        let key = format!("COMM:{description}");
        tag.upsert_additional_field(AdditionalField::new(TagType::Id3v2, key, text));
    }
}

fn decode_txxx_frame(tag: &mut TagData, frame: &Frame) {
    if frame.payload.is_empty() {
        return;
    }
    let encoding = frame.payload[0];
    let (description, value) = split_at_terminator(&frame.payload[1..], encoding);
    let description = decode_text(description, encoding);
    let value = decode_text(value, encoding);
    let key = format!("TXXX:{description}");
    tag.upsert_additional_field(AdditionalField::new(TagType::Id3v2, key, value));
}

fn decode_wxxx_frame(tag: &mut TagData, frame: &Frame) {
    if frame.payload.is_empty() {
        return;
    }
    let encoding = frame.payload[0];
    let (description, url) = split_at_terminator(&frame.payload[1..], encoding);
    let description = decode_text(description, encoding);
    let url = decode_iso8859_1(url);
    let key = format!("WXXX:{description}");
    tag.upsert_additional_field(AdditionalField::new(TagType::Id3v2, key, url));
}

fn decode_picture_frame(tag: &mut TagData, frame: &Frame) {
    if frame.payload.is_empty() {
        return;
    }
    let encoding = frame.payload[0];
    let mut rest = &frame.payload[1..];

    let mime = if frame.id == "PIC" {
        if rest.len() < 3 {
            return;
        }
        let (fmt, tail) = rest.split_at(3);
        rest = tail;
        match fmt {
            b"PNG" => "image/png".to_string(),
            b"JPG" => "image/jpeg".to_string(),
            other => format!("image/{}", String::from_utf8_lossy(other).to_lowercase()),
        }
    } else {
        let (mime, tail) = split_at_terminator(rest, 0);
        rest = tail;
        decode_iso8859_1(mime)
    };

    if rest.is_empty() {
        return;
    }
    let native_code = rest[0];
    rest = &rest[1..];

    let (description, data) = split_at_terminator(rest, encoding);
    let description = decode_text(description, encoding);

    tag.add_picture(Picture {
        picture_type: picture_type_from_native(native_code),
        native_code,
        mime,
        description,
        data: data.to_vec(),
        marked_for_deletion: false,
    });
}

fn encode_frames(tag: &TagData, version: Id3v2Version) -> Vec<u8> {
    let mut out = Vec::new();

    for (field, value) in tag.supported_fields() {
        if field == SupportedField::Comment {
            continue;
        }
        if let Some(&id) = FIELD_TO_FRAME.get(&field) {
            let encoding = choose_encoding(value, version);
            let mut payload = vec![encoding];
            payload.extend(encode_text(value, encoding));
            write_frame(&mut out, id, &payload, version);
        }
    }

    if let Some(comment) = tag.get(SupportedField::Comment) {
        let encoding = choose_encoding(comment, version);
        let mut payload = vec![encoding];
        payload.extend_from_slice(b"eng");
        payload.extend(terminator(encoding)); // empty description
        payload.extend(encode_text(comment, encoding));
        write_frame(&mut out, "COMM", &payload, version);
    }

    for field in tag.additional_fields() {
        if field.tag_type != TagType::Id3v2 {
            continue;
        }
        encode_additional_field(&mut out, field, version);
    }

    for picture in tag.pictures() {
        encode_picture_frame(&mut out, picture, version);
    }

    out
}

fn terminator(encoding: u8) -> Vec<u8> {
    if encoding == 1 || encoding == 2 { vec![0, 0] } else { vec![0] }
}

fn encode_additional_field(out: &mut Vec<u8>, field: &AdditionalField, version: Id3v2Version) {
    if let Some(description) = field.native_code.strip_prefix("TXXX:") {
        if let FieldValue::Text(value) = &field.value {
            let encoding = choose_encoding(value, version);
            let mut payload = vec![encoding];
            payload.extend(encode_text(description, encoding));
            payload.extend(terminator(encoding));
            payload.extend(encode_text(value, encoding));
            write_frame(out, "TXXX", &payload, version);
        }
        return;
    }

    if let Some(description) = field.native_code.strip_prefix("WXXX:") {
        if let FieldValue::Text(url) = &field.value {
            let encoding = choose_encoding(description, version);
            let mut payload = vec![encoding];
            payload.extend(encode_text(description, encoding));
            payload.extend(terminator(encoding));
            payload.extend(encode_iso8859_1(url));
            write_frame(out, "WXXX", &payload, version);
        }
        return;
    }

    if let Some(description) = field.native_code.strip_prefix("COMM:") {
        if let FieldValue::Text(value) = &field.value {
            let encoding = choose_encoding(value, version);
            let mut payload = vec![encoding];
            payload.extend_from_slice(b"eng");
            payload.extend(encode_text(description, encoding));
            payload.extend(terminator(encoding));
            payload.extend(encode_text(value, encoding));
            write_frame(out, "COMM", &payload, version);
        }
        return;
    }

    match &field.value {
        FieldValue::Text(s) => {
            let encoding = choose_encoding(s, version);
            let mut payload = vec![encoding];
            payload.extend(encode_text(s, encoding));
            write_frame(out, &field.native_code, &payload, version);
        }
        FieldValue::Binary(b) => write_frame(out, &field.native_code, b, version),
        FieldValue::Unsigned(n) => write_frame(out, &field.native_code, n.to_string().as_bytes(), version),
    }
}

fn encode_picture_frame(out: &mut Vec<u8>, picture: &Picture, version: Id3v2Version) {
    let encoding = choose_encoding(&picture.description, version);
    let native_code = if picture.picture_type == PictureType::Unsupported {
        picture.native_code
    } else {
        native_from_picture_type(picture.picture_type)
    };

    let mut payload = vec![encoding];
    payload.extend(encode_iso8859_1(&picture.mime));
    payload.push(0);
    payload.push(native_code);
    payload.extend(encode_text(&picture.description, encoding));
    payload.extend(terminator(encoding));
    payload.extend_from_slice(&picture.data);

    write_frame(out, "APIC", &payload, version);
}

fn write_frame(out: &mut Vec<u8>, id: &str, payload: &[u8], version: Id3v2Version) {
    out.extend_from_slice(id.as_bytes());
    match version {
        Id3v2Version::V2_4 => out.extend_from_slice(&encode_syncsafe(payload.len() as u32)),
        _ => out.extend_from_slice(&(payload.len() as u32).to_be_bytes()),
    }
    out.extend_from_slice(&[0, 0]); // frame flags
    out.extend_from_slice(payload);
}

impl MetaDataIo for Id3v2Codec {
    fn tag_type(&self) -> TagType {
        TagType::Id3v2
    }

    fn probe(&self, stream: &mut DynStream) -> Result<bool> {
        Ok(read_header(stream)?.is_some())
    }

    fn read(&self, stream: &mut DynStream, _opts: &ReadOptions) -> Result<ReadOutcome> {
        let Some(header) = read_header(stream)? else { return Ok(ReadOutcome::absent()) };

        let frames = read_frames(stream, &header)?;
        let mut tag = TagData::new();
        for frame in &frames {
            decode_frame(&mut tag, frame);
        }

        Ok(ReadOutcome { exists: true, parse_error: None, tag })
    }

    fn write(
        &self,
        stream: &mut DynStream,
        current: &TagData,
        delta: &TagData,
        settings: &Settings,
    ) -> Result<()> {
        let merged = delta.merge_onto(current);
        // v2.2's 3-byte frame ids are a read-only legacy accommodation; writes never target it.
        let version = match settings.default_id3v2_version {
            Id3v2Version::V2_2 => Id3v2Version::V2_3,
            v => v,
        };
        let frame_bytes = encode_frames(&merged, version);

        let old_tag_len = match read_header(stream)? {
            Some(h) => 10 + u64::from(h.tag_size),
            None => 0,
        };

        let old_body_len = old_tag_len.saturating_sub(10);
        let new_body_len = if settings.enable_padding && old_body_len >= frame_bytes.len() as u64 {
            old_body_len
        } else {
            frame_bytes.len() as u64
        };

        let new_tag_len = 10 + new_body_len;

        if new_tag_len > old_tag_len {
            tagforge_core::io::lengthen(stream, old_tag_len, new_tag_len - old_tag_len)?;
        } else if new_tag_len < old_tag_len {
            tagforge_core::io::shorten(stream, new_tag_len, old_tag_len - new_tag_len)?;
        }

        stream.seek(SeekFrom::Start(0))?;
        stream.write_buf(MAGIC)?;
        let major = match version {
            Id3v2Version::V2_2 => 2,
            Id3v2Version::V2_3 => 3,
            Id3v2Version::V2_4 => 4,
        };
        stream.write_byte(major)?;
        stream.write_byte(0)?; // revision
        stream.write_byte(0)?; // flags
        stream.write_buf(&encode_syncsafe(new_body_len as u32))?;
        stream.write_buf(&frame_bytes)?;

        let padding = new_body_len as usize - frame_bytes.len();
        stream.write_buf(&vec![0u8; padding])?;

        Ok(())
    }

    fn remove(&self, stream: &mut DynStream, _settings: &Settings) -> Result<()> {
        let Some(header) = read_header(stream)? else { return Ok(()) };
        let tag_len = 10 + u64::from(header.tag_size);
        tagforge_core::io::shorten(stream, 0, tag_len)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagforge_core::io::{Cursor, MemoryStream, SeekableStream};

    fn dyn_stream(data: Vec<u8>) -> DynStream {
        Cursor::new(Box::new(MemoryStream::new(data)) as Box<dyn SeekableStream>)
    }

    #[test]
    fn writes_v2_3_and_reads_back_title() {
        let codec = Id3v2Codec;
        let mut stream = dyn_stream(b"AUDIODATA".to_vec());

        let mut delta = TagData::new();
        delta.set(SupportedField::Title, "Song");
        delta.set(SupportedField::Artist, "Band");
        codec.write(&mut stream, &TagData::new(), &delta, &Settings::default()).unwrap();

        let outcome = codec.read(&mut stream, &ReadOptions::default()).unwrap();
        assert!(outcome.exists);
        assert_eq!(outcome.tag.get(SupportedField::Title), Some("Song"));
        assert_eq!(outcome.tag.get(SupportedField::Artist), Some("Band"));
    }

    #[test]
    fn comm_frame_with_description_becomes_additional_field() {
        let codec = Id3v2Codec;
        let mut stream = dyn_stream(b"AUDIODATA".to_vec());

        let mut delta = TagData::new();
        delta.upsert_additional_field(AdditionalField::new(TagType::Id3v2, "COMM:mood", "Happy"));
        codec.write(&mut stream, &TagData::new(), &delta, &Settings::default()).unwrap();

        let outcome = codec.read(&mut stream, &ReadOptions::default()).unwrap();
        assert!(outcome
            .tag
            .additional_fields()
            .iter()
            .any(|f| f.native_code == "COMM:mood"));
    }

    #[test]
    fn remove_restores_audio_only() {
        let codec = Id3v2Codec;
        let mut stream = dyn_stream(b"AUDIODATA".to_vec());
        let mut delta = TagData::new();
        delta.set(SupportedField::Title, "Song");
        codec.write(&mut stream, &TagData::new(), &delta, &Settings::default()).unwrap();
        codec.remove(&mut stream, &Settings::default()).unwrap();

        let mut data = vec![0u8; 9];
        stream.seek(SeekFrom::Start(0)).unwrap();
        stream.read_buf_exact(&mut data).unwrap();
        assert_eq!(&data, b"AUDIODATA");
    }
}
