// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The FLAC container codec (§4.4): `fLaC` magic, a sequence of metadata blocks, then audio
//! frames. The PICTURE block body format lives in [`picture`] since it is reused verbatim by
//! Ogg Vorbis's `METADATA_BLOCK_PICTURE` comment (§4.3).

pub mod picture;

use std::io::SeekFrom;

use tagforge_core::io::{DynStream, ReadBytes, WriteBytes};
use tagforge_core::settings::Settings;
use tagforge_core::tag::{AdditionalField, FieldValue, TagData, TagType};
use tagforge_core::{errors, Result};

use crate::base::{MetaDataIo, ReadOptions, ReadOutcome};
use crate::vorbis;

const MAGIC: &[u8; 4] = b"fLaC";

const BLOCK_STREAMINFO: u8 = 0;
const BLOCK_PADDING: u8 = 1;
const BLOCK_APPLICATION: u8 = 2;
const BLOCK_SEEKTABLE: u8 = 3;
const BLOCK_VORBIS_COMMENT: u8 = 4;
const BLOCK_CUESHEET: u8 = 5;
const BLOCK_PICTURE: u8 = 6;

pub struct FlacCodec;

/// The decoded contents of a STREAMINFO block: 18 bytes of packed parameters plus a 16-byte MD5
/// signature (§4.4). Used by the facade to derive duration, not by the tag read/write path itself.
#[derive(Copy, Clone, Debug)]
pub struct StreamInfo {
    pub min_block_size: u16,
    pub max_block_size: u16,
    pub min_frame_size: u32,
    pub max_frame_size: u32,
    pub sample_rate: u32,
    pub channels: u8,
    pub bits_per_sample: u8,
    pub total_samples: u64,
}

/// Unpacks a raw STREAMINFO block body (§4.4: "18 bytes of parameters + 16-byte MD5").
pub fn parse_stream_info(body: &[u8]) -> Result<StreamInfo> {
    if body.len() < 34 {
        return errors::malformed("flac streaminfo", "block shorter than 34 bytes");
    }

    let min_block_size = u16::from_be_bytes([body[0], body[1]]);
    let max_block_size = u16::from_be_bytes([body[2], body[3]]);
    let min_frame_size = u32::from(body[4]) << 16 | u32::from(body[5]) << 8 | u32::from(body[6]);
    let max_frame_size = u32::from(body[7]) << 16 | u32::from(body[8]) << 8 | u32::from(body[9]);

    // Packed 64 bits: 20-bit sample rate, 3-bit channels-1, 5-bit bits_per_sample-1, 36-bit
    // total sample count.
    let mut packed = 0u64;
    for &b in &body[10..18] {
        packed = (packed << 8) | u64::from(b);
    }

    let sample_rate = ((packed >> 44) & 0xf_ffff) as u32;
    let channels = (((packed >> 41) & 0x7) + 1) as u8;
    let bits_per_sample = (((packed >> 36) & 0x1f) + 1) as u8;
    let total_samples = packed & 0xf_ffff_ffff;

    Ok(StreamInfo {
        min_block_size,
        max_block_size,
        min_frame_size,
        max_frame_size,
        sample_rate,
        channels,
        bits_per_sample,
        total_samples,
    })
}

/// Reads and unpacks just the STREAMINFO block, without decoding the rest of the tag (used by the
/// facade to derive duration/sample parameters independent of a full `read`).
pub fn read_stream_info(stream: &mut DynStream) -> Result<StreamInfo> {
    stream.seek(SeekFrom::Start(0))?;
    let blocks = read_blocks(stream)?;
    let Some(block) = blocks.iter().find(|b| b.block_type == BLOCK_STREAMINFO) else {
        return errors::malformed("flac stream", "missing STREAMINFO block");
    };
    parse_stream_info(&block.body)
}

struct BlockHeader {
    is_last: bool,
    block_type: u8,
    length: u32,
}

fn read_block_header(stream: &mut DynStream) -> Result<BlockHeader> {
    let raw = stream.read_u32_be()?;
    Ok(BlockHeader {
        is_last: raw & 0x8000_0000 != 0,
        block_type: ((raw >> 24) & 0x7f) as u8,
        length: raw & 0x00ff_ffff,
    })
}

fn write_block_header(stream: &mut DynStream, is_last: bool, block_type: u8, length: u32) -> Result<()> {
    let mut raw = (u32::from(block_type) << 24) | (length & 0x00ff_ffff);
    if is_last {
        raw |= 0x8000_0000;
    }
    stream.write_u32_be(raw)
}

struct Block {
    header_offset: u64,
    block_type: u8,
    body: Vec<u8>,
}

fn read_blocks(stream: &mut DynStream) -> Result<Vec<Block>> {
    let mut magic = [0u8; 4];
    stream.read_buf_exact(&mut magic)?;
    if &magic != MAGIC {
        return errors::malformed("flac magic", "missing fLaC marker");
    }

    let mut blocks = Vec::new();
    loop {
        let header_offset = stream.pos()?;
        let header = read_block_header(stream)?;
        let body = stream.read_boxed_slice_exact(header.length as usize)?.into_vec();
        let is_last = header.is_last;
        blocks.push(Block { header_offset, block_type: header.block_type, body });
        if is_last {
            break;
        }
    }

    Ok(blocks)
}

impl MetaDataIo for FlacCodec {
    fn tag_type(&self) -> TagType {
        TagType::Flac
    }

    fn probe(&self, stream: &mut DynStream) -> Result<bool> {
        stream.seek(SeekFrom::Start(0))?;
        let mut magic = [0u8; 4];
        if stream.read_buf_exact(&mut magic).is_err() {
            return Ok(false);
        }
        Ok(&magic == MAGIC)
    }

    fn read(&self, stream: &mut DynStream, _opts: &ReadOptions) -> Result<ReadOutcome> {
        stream.seek(SeekFrom::Start(0))?;
        let blocks = read_blocks(stream)?;

        let mut tag = TagData::new();
        let mut saw_streaminfo = false;

        for block in &blocks {
            match block.block_type {
                BLOCK_STREAMINFO => saw_streaminfo = true,
                BLOCK_VORBIS_COMMENT => {
                    let parsed = vorbis::parse_payload(&block.body)?;
                    tag = parsed;
                }
                BLOCK_PICTURE => match picture::decode(&block.body) {
                    Ok(pic) => tag.add_picture(pic),
                    Err(e) => log::warn!("dropping malformed PICTURE block: {e}"),
                },
                BLOCK_CUESHEET => {
                    tag.upsert_additional_field(AdditionalField::new(
                        TagType::Flac,
                        "CUESHEET",
                        FieldValue::Binary(block.body.clone()),
                    ));
                }
                BLOCK_APPLICATION => {
                    tag.upsert_additional_field(AdditionalField::new(
                        TagType::Flac,
                        "APPLICATION",
                        FieldValue::Binary(block.body.clone()),
                    ));
                }
                BLOCK_SEEKTABLE => {
                    tag.upsert_additional_field(AdditionalField::new(
                        TagType::Flac,
                        "SEEKTABLE",
                        FieldValue::Binary(block.body.clone()),
                    ));
                }
                BLOCK_PADDING => {}
                other => log::debug!("skipping unrecognized FLAC block type {other}"),
            }
        }

        if !saw_streaminfo {
            return errors::malformed("flac stream", "missing STREAMINFO block");
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

        stream.seek(SeekFrom::Start(0))?;
        let blocks = read_blocks(stream)?;

        let Some(streaminfo) = blocks.iter().find(|b| b.block_type == BLOCK_STREAMINFO) else {
            return errors::malformed("flac stream", "missing STREAMINFO block");
        };

        let old_region_end = {
            let last = blocks.last().unwrap();
            last.header_offset + 4 + last.body.len() as u64
        };

        let comment_body = vorbis::serialize_payload(&merged);
        let picture_bodies: Vec<Vec<u8>> = merged.pictures().iter().map(picture::encode).collect();

        let mut opaque_blocks: Vec<(u8, Vec<u8>)> = Vec::new();
        for field in merged.additional_fields() {
            if field.tag_type != TagType::Flac {
                continue;
            }
            if let FieldValue::Binary(bytes) = &field.value {
                let block_type = match field.native_code.as_str() {
                    "CUESHEET" => Some(BLOCK_CUESHEET),
                    "APPLICATION" => Some(BLOCK_APPLICATION),
                    "SEEKTABLE" => Some(BLOCK_SEEKTABLE),
                    _ => None,
                };
                if let Some(block_type) = block_type {
                    opaque_blocks.push((block_type, bytes.clone()));
                }
            }
        }

        let mut new_blocks_body: Vec<(u8, Vec<u8>)> = Vec::new();
        new_blocks_body.push((BLOCK_STREAMINFO, streaminfo.body.clone()));
        new_blocks_body.push((BLOCK_VORBIS_COMMENT, comment_body));
        for (block_type, body) in opaque_blocks {
            new_blocks_body.push((block_type, body));
        }
        for body in &picture_bodies {
            new_blocks_body.push((BLOCK_PICTURE, body.clone()));
        }

        let mut non_padding_size: u64 = new_blocks_body.iter().map(|(_, b)| 4 + b.len() as u64).sum();
        let old_total_size = old_region_end - 4; // minus the fLaC magic

        // Prefer absorbing the size change into the padding block over splicing the audio.
        let new_total_size = if settings.enable_padding && old_total_size >= non_padding_size {
            old_total_size
        } else {
            non_padding_size
        };

        let padding_len = new_total_size.saturating_sub(non_padding_size);
        if padding_len > 0 {
            new_blocks_body.push((BLOCK_PADDING, vec![0u8; padding_len as usize]));
        }
        non_padding_size += 4 + padding_len; // header + body for the padding block itself, if any

        let new_region_len = 4 + non_padding_size; // + fLaC magic
        let old_region_len = old_region_end;

        if new_region_len > old_region_len {
            tagforge_core::io::lengthen(stream, old_region_len, new_region_len - old_region_len)?;
        } else if new_region_len < old_region_len {
            tagforge_core::io::shorten(stream, new_region_len, old_region_len - new_region_len)?;
        }

        stream.seek(SeekFrom::Start(0))?;
        stream.write_buf(MAGIC)?;

        let count = new_blocks_body.len();
        for (i, (block_type, body)) in new_blocks_body.iter().enumerate() {
            write_block_header(stream, i + 1 == count, *block_type, body.len() as u32)?;
            stream.write_buf(body)?;
        }

        Ok(())
    }

    fn remove(&self, stream: &mut DynStream, _settings: &Settings) -> Result<()> {
        stream.seek(SeekFrom::Start(0))?;
        let blocks = read_blocks(stream)?;
        let Some(streaminfo) = blocks.iter().find(|b| b.block_type == BLOCK_STREAMINFO) else {
            return errors::malformed("flac stream", "missing STREAMINFO block");
        };

        let old_region_end = {
            let last = blocks.last().unwrap();
            last.header_offset + 4 + last.body.len() as u64
        };
        let old_region_len = old_region_end;

        let new_region_len = 4 + 4 + streaminfo.body.len() as u64; // magic + one block header + body

        if new_region_len < old_region_len {
            tagforge_core::io::shorten(stream, new_region_len, old_region_len - new_region_len)?;
        } else if new_region_len > old_region_len {
            tagforge_core::io::lengthen(stream, old_region_len, new_region_len - old_region_len)?;
        }

        stream.seek(SeekFrom::Start(0))?;
        stream.write_buf(MAGIC)?;
        write_block_header(stream, true, BLOCK_STREAMINFO, streaminfo.body.len() as u32)?;
        stream.write_buf(&streaminfo.body)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagforge_core::io::{Cursor, MemoryStream, SeekableStream};
    use tagforge_core::tag::SupportedField;

    fn raw_block(is_last: bool, block_type: u8, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut raw = (u32::from(block_type) << 24) | (body.len() as u32 & 0x00ff_ffff);
        if is_last {
            raw |= 0x8000_0000;
        }
        out.extend_from_slice(&raw.to_be_bytes());
        out.extend_from_slice(body);
        out
    }

    fn fixture() -> Vec<u8> {
        let streaminfo_body = vec![0u8; 34];
        let mut tag = TagData::new();
        tag.set(SupportedField::Title, "Song");
        let comment_body = vorbis::serialize_payload(&tag);

        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&raw_block(false, BLOCK_STREAMINFO, &streaminfo_body));
        out.extend_from_slice(&raw_block(true, BLOCK_VORBIS_COMMENT, &comment_body));
        out.extend_from_slice(b"AUDIO_FRAMES_GO_HERE");
        out
    }

    fn dyn_stream(data: Vec<u8>) -> DynStream {
        Cursor::new(Box::new(MemoryStream::new(data)) as Box<dyn SeekableStream>)
    }

    #[test]
    fn parses_streaminfo_sample_parameters() {
        // 44100 Hz, 2 channels, 16 bits/sample, 1_000_000 total samples, packed per §4.4.
        let sample_rate: u64 = 44100;
        let channels_minus_1: u64 = 1;
        let bits_minus_1: u64 = 15;
        let total_samples: u64 = 1_000_000;
        let packed = (sample_rate << 44) | (channels_minus_1 << 41) | (bits_minus_1 << 36) | total_samples;

        let mut body = vec![0u8; 34];
        body[10..18].copy_from_slice(&packed.to_be_bytes());

        let info = parse_stream_info(&body).unwrap();
        assert_eq!(info.sample_rate, 44100);
        assert_eq!(info.channels, 2);
        assert_eq!(info.bits_per_sample, 16);
        assert_eq!(info.total_samples, 1_000_000);
    }

    #[test]
    fn reads_streaminfo_and_vorbis_comment() {
        let codec = FlacCodec;
        let mut stream = dyn_stream(fixture());
        let outcome = codec.read(&mut stream, &ReadOptions::default()).unwrap();
        assert!(outcome.exists);
        assert_eq!(outcome.tag.get(SupportedField::Title), Some("Song"));
    }

    #[test]
    fn write_preserves_audio_and_updates_title() {
        let codec = FlacCodec;
        let mut stream = dyn_stream(fixture());

        let mut delta = TagData::new();
        delta.set(SupportedField::Title, "New Title");
        let settings = Settings { enable_padding: false, ..Settings::default() };
        codec.write(&mut stream, &TagData::new(), &delta, &settings).unwrap();

        let outcome = codec.read(&mut stream, &ReadOptions::default()).unwrap();
        assert_eq!(outcome.tag.get(SupportedField::Title), Some("New Title"));

        let data = stream.into_inner().into_inner();
        assert!(data.ends_with(b"AUDIO_FRAMES_GO_HERE"));
    }

    #[test]
    fn write_preserves_seektable() {
        let streaminfo_body = vec![0u8; 34];
        let seektable_body = vec![0xabu8; 18]; // one seek point

        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&raw_block(false, BLOCK_STREAMINFO, &streaminfo_body));
        out.extend_from_slice(&raw_block(false, BLOCK_SEEKTABLE, &seektable_body));
        out.extend_from_slice(&raw_block(true, BLOCK_VORBIS_COMMENT, &[]));
        out.extend_from_slice(b"AUDIO_FRAMES_GO_HERE");

        let codec = FlacCodec;
        let mut stream = dyn_stream(out);

        let mut delta = TagData::new();
        delta.set(SupportedField::Title, "New Title");
        let settings = Settings { enable_padding: false, ..Settings::default() };
        codec.write(&mut stream, &TagData::new(), &delta, &settings).unwrap();

        let outcome = codec.read(&mut stream, &ReadOptions::default()).unwrap();
        let seektable = outcome
            .tag
            .additional_fields()
            .iter()
            .find(|f| f.tag_type == TagType::Flac && f.native_code == "SEEKTABLE")
            .unwrap();
        assert!(matches!(&seektable.value, FieldValue::Binary(b) if b == &seektable_body));
    }

    #[test]
    fn remove_keeps_only_streaminfo() {
        let codec = FlacCodec;
        let mut stream = dyn_stream(fixture());
        codec.remove(&mut stream, &Settings::default()).unwrap();

        let outcome = codec.read(&mut stream, &ReadOptions::default()).unwrap();
        assert!(outcome.tag.get(SupportedField::Title).is_none());

        let data = stream.into_inner().into_inner();
        assert!(data.ends_with(b"AUDIO_FRAMES_GO_HERE"));
    }
}
