// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Zones track which byte ranges of a file a codec owns while reading in "prepare-for-writing"
//! mode, and the anchors (size fields, length prefixes) whose encoded values depend on a zone's
//! size. `StructureHelper` replays the size deltas a codec produced during `write` against the
//! underlying stream via [`crate::io::lengthen`]/[`crate::io::shorten`].

use std::io::SeekFrom;

use crate::errors::Result;
use crate::io::cursor::{Cursor, SeekableStream};
use crate::io::{lengthen, shorten};

/// A named contiguous byte range in the file, owned by a codec for the duration of one
/// read/write cycle.
#[derive(Clone, Debug)]
pub struct Zone {
    pub name: String,
    pub offset: u64,
    pub size: u64,
    /// Bytes that must be written in the zone's place if it shrinks to nothing, so the
    /// container remains structurally valid (e.g. a FLAC block header with length 0).
    pub core_signature: Option<Vec<u8>>,
    pub flag: u32,
}

impl Zone {
    pub fn new(name: impl Into<String>, offset: u64, size: u64) -> Self {
        Zone { name: name.into(), offset, size, core_signature: None, flag: 0 }
    }

    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// How an anchor's value is encoded in the stream. Each anchor is re-derived from its zone's
/// current size/offset and rewritten in place after a splice.
#[derive(Clone, Copy, Debug)]
pub enum AnchorWidth {
    U8,
    U16Be,
    U24Be,
    U32Be,
    U32Le,
    SyncSafeU32,
}

/// What quantity of the referenced zone an anchor encodes.
#[derive(Clone, Copy, Debug)]
pub enum AnchorValue {
    /// The zone's size in bytes.
    Size,
    /// The zone's size in bytes, plus a fixed constant (e.g. a length field that also counts a
    /// trailing framing byte).
    SizePlus(i64),
}

/// A byte location whose encoded value tracks a zone's size.
#[derive(Clone, Debug)]
pub struct Anchor {
    pub offset: u64,
    pub width: AnchorWidth,
    pub value: AnchorValue,
    pub zone_name: String,
}

/// Tracks the zones and anchors a codec registered during read, and replays resize deltas
/// against the underlying stream during write.
#[derive(Default)]
pub struct StructureHelper {
    zones: Vec<Zone>,
    anchors: Vec<Anchor>,
}

impl StructureHelper {
    pub fn new() -> Self {
        StructureHelper::default()
    }

    pub fn add_zone(&mut self, zone: Zone) {
        self.zones.push(zone);
    }

    pub fn add_anchor(&mut self, anchor: Anchor) {
        self.anchors.push(anchor);
    }

    pub fn zone(&self, name: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.name == name)
    }

    /// Resizes the named zone to `new_size`, splicing the underlying stream and shifting every
    /// zone that starts after it by the same delta, per §4.2. Anchors referencing the resized
    /// zone (or any zone whose offset moved) are rewritten afterwards by the caller via
    /// [`StructureHelper::fix_up_anchors`].
    pub fn resize_zone<S: SeekableStream>(
        &mut self,
        cur: &mut Cursor<S>,
        name: &str,
        new_size: u64,
    ) -> Result<()> {
        let idx = self.zones.iter().position(|z| z.name == name);
        let Some(idx) = idx else { return Ok(()) };

        let old_size = self.zones[idx].size;
        let zone_end = self.zones[idx].end();

        if new_size > old_size {
            lengthen(cur, zone_end, new_size - old_size)?;
        } else if new_size < old_size {
            shorten(cur, zone_end - (old_size - new_size), old_size - new_size)?;
        }

        let delta = new_size as i64 - old_size as i64;
        self.zones[idx].size = new_size;

        for zone in self.zones.iter_mut().skip(idx + 1) {
            zone.offset = (zone.offset as i64 + delta) as u64;
        }
        for anchor in self.anchors.iter_mut() {
            if self.zones[idx].name != anchor.zone_name
                && self.zone_offset(&anchor.zone_name).unwrap_or(0) > zone_end
            {
                anchor.offset = (anchor.offset as i64 + delta) as u64;
            }
        }

        Ok(())
    }

    fn zone_offset(&self, name: &str) -> Option<u64> {
        self.zones.iter().find(|z| z.name == name).map(|z| z.offset)
    }

    /// Rewrites every anchor referencing `zone_name` with that zone's current size.
    pub fn fix_up_anchors<S: SeekableStream>(
        &self,
        cur: &mut Cursor<S>,
        zone_name: &str,
    ) -> Result<()> {
        let size = match self.zone(zone_name) {
            Some(z) => z.size,
            None => return Ok(()),
        };

        for anchor in self.anchors.iter().filter(|a| a.zone_name == zone_name) {
            let value = match anchor.value {
                AnchorValue::Size => size as i64,
                AnchorValue::SizePlus(n) => size as i64 + n,
            };
            let value = value.max(0) as u64;

            cur.seek(SeekFrom::Start(anchor.offset))?;
            write_anchor(cur, anchor.width, value)?;
        }

        Ok(())
    }
}

fn write_anchor<S: SeekableStream>(
    cur: &mut Cursor<S>,
    width: AnchorWidth,
    value: u64,
) -> Result<()> {
    use crate::io::WriteBytes;

    match width {
        AnchorWidth::U8 => cur.write_byte(value as u8),
        AnchorWidth::U16Be => cur.write_u16_be(value as u16),
        AnchorWidth::U24Be => cur.write_u24_be(value as u32),
        AnchorWidth::U32Be => cur.write_u32_be(value as u32),
        AnchorWidth::U32Le => cur.write_u32_le(value as u32),
        AnchorWidth::SyncSafeU32 => cur.write_syncsafe_u32(value as u32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::cursor::MemoryStream;

    #[test]
    fn resize_zone_shifts_trailing_zones() {
        let mut cur = Cursor::new(MemoryStream::new(b"HEADtagsAUDIO".to_vec()));
        let mut helper = StructureHelper::new();
        helper.add_zone(Zone::new("tag", 4, 4));
        helper.add_zone(Zone::new("audio", 8, 5));

        helper.resize_zone(&mut cur, "tag", 9).unwrap();

        assert_eq!(helper.zone("audio").unwrap().offset, 13);
        let data = cur.into_inner().into_inner();
        assert_eq!(&data[..4], b"HEAD");
        assert_eq!(&data[13..], b"AUDIO");
    }

    #[test]
    fn shrinking_zone_to_nothing_keeps_signature_available() {
        let zone = Zone { core_signature: Some(b"SIG0".to_vec()), ..Zone::new("tag", 4, 8) };
        assert_eq!(zone.core_signature.as_deref(), Some(&b"SIG0"[..]));
    }
}
