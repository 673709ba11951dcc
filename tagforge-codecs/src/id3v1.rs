// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The ID3v1/ID3v1.1 codec (§4.8): a fixed 128-byte trailer, supported fields only. No
//! additional fields, no pictures — the format has no room for either.

use std::io::SeekFrom;

use tagforge_core::io::{decode_iso8859_1, encode_iso8859_1, DynStream, ReadBytes, WriteBytes};
use tagforge_core::settings::Settings;
use tagforge_core::tag::{SupportedField, TagData, TagType};
use tagforge_core::Result;

use crate::base::{MetaDataIo, ReadOptions, ReadOutcome};

const TAG_SIZE: u64 = 128;
const MAGIC: &[u8; 3] = b"TAG";

pub struct Id3v1Codec;

fn pad(s: &str, len: usize) -> Vec<u8> {
    let mut bytes = encode_iso8859_1(s);
    bytes.truncate(len);
    bytes.resize(len, 0);
    bytes
}

impl MetaDataIo for Id3v1Codec {
    fn tag_type(&self) -> TagType {
        TagType::Id3v1
    }

    fn probe(&self, stream: &mut DynStream) -> Result<bool> {
        let len = stream.len()?;
        if len < TAG_SIZE {
            return Ok(false);
        }
        stream.seek(SeekFrom::Start(len - TAG_SIZE))?;
        let mut magic = [0u8; 3];
        stream.read_buf_exact(&mut magic)?;
        Ok(&magic == MAGIC)
    }

    fn read(&self, stream: &mut DynStream, _opts: &ReadOptions) -> Result<ReadOutcome> {
        if !self.probe(stream)? {
            return Ok(ReadOutcome::absent());
        }

        let len = stream.len()?;
        stream.seek(SeekFrom::Start(len - TAG_SIZE + 3))?;

        let title = decode_iso8859_1(&stream.read_boxed_slice_exact(30)?);
        let artist = decode_iso8859_1(&stream.read_boxed_slice_exact(30)?);
        let album = decode_iso8859_1(&stream.read_boxed_slice_exact(30)?);
        let year = decode_iso8859_1(&stream.read_boxed_slice_exact(4)?);
        let comment = stream.read_boxed_slice_exact(30)?;
        let genre = stream.read_byte()?;

        let mut tag = TagData::new();
        tag.set(SupportedField::Title, title.trim());
        tag.set(SupportedField::Artist, artist.trim());
        tag.set(SupportedField::Album, album.trim());
        tag.set(SupportedField::ReleaseYear, year.trim());

        // ID3v1.1: byte 28 of the comment field is 0x00 and byte 29 is the track number.
        if comment[28] == 0 && comment[29] != 0 {
            tag.set(SupportedField::Comment, decode_iso8859_1(&comment[..28]).trim());
            tag.set(SupportedField::TrackNumber, comment[29].to_string());
        } else {
            tag.set(SupportedField::Comment, decode_iso8859_1(&comment).trim());
        }

        if genre != 0xff {
            tag.set(SupportedField::Genre, genre.to_string());
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

        let has_tag = self.probe(stream)?;
        let base = if has_tag { stream.len()? - TAG_SIZE } else { stream.len()? };
        if !has_tag {
            stream.set_len(base + TAG_SIZE)?;
        }

        stream.seek(SeekFrom::Start(base))?;
        stream.write_buf(MAGIC)?;
        stream.write_buf(&pad(merged.get(SupportedField::Title).unwrap_or(""), 30))?;
        stream.write_buf(&pad(merged.get(SupportedField::Artist).unwrap_or(""), 30))?;
        stream.write_buf(&pad(merged.get(SupportedField::Album).unwrap_or(""), 30))?;
        stream.write_buf(&pad(merged.get(SupportedField::ReleaseYear).unwrap_or(""), 4))?;

        let mut comment = pad(merged.get(SupportedField::Comment).unwrap_or(""), 28);
        match merged.get(SupportedField::TrackNumber).and_then(|s| s.parse::<u8>().ok()) {
            Some(track) => {
                comment.push(0);
                comment.push(track);
            }
            None => {
                comment = pad(merged.get(SupportedField::Comment).unwrap_or(""), 30);
            }
        }
        stream.write_buf(&comment)?;

        let genre = merged
            .get(SupportedField::Genre)
            .and_then(|s| s.parse::<u8>().ok())
            .unwrap_or(0xff);
        stream.write_byte(genre)?;

        Ok(())
    }

    fn remove(&self, stream: &mut DynStream, _settings: &Settings) -> Result<()> {
        if !self.probe(stream)? {
            return Ok(());
        }
        let len = stream.len()?;
        stream.set_len(len - TAG_SIZE)?;
        Ok(())
    }
}
