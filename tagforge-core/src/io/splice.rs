// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! File splice primitives: grow or shrink a region of a stream in place, shifting everything
//! after it. These are the mechanism [`crate::zones::StructureHelper`] uses when a zone's new
//! size does not fit in its old size and no padding is available to absorb the difference.

use std::io::SeekFrom;

use crate::errors::Result;
use crate::io::cursor::{Cursor, SeekableStream};

/// Copy chunk size used when shifting the tail of a stream. Kept small and fixed so memory use
/// does not scale with file size.
const CHUNK: usize = 64 * 1024;

/// Inserts `n` undefined bytes at `at_offset`, shifting everything from `at_offset` to the end
/// of the stream forward by `n` bytes. The stream grows by exactly `n` bytes.
///
/// Copies the suffix forward in fixed-size chunks from the end of the stream towards the front
/// so that source and destination ranges never overlap incorrectly.
pub fn lengthen<S: SeekableStream>(cur: &mut Cursor<S>, at_offset: u64, n: u64) -> Result<()> {
    if n == 0 {
        return Ok(());
    }

    let old_len = cur.len()?;
    debug_assert!(at_offset <= old_len);

    cur.set_len(old_len + n)?;

    let mut remaining = old_len - at_offset;
    let mut buf = vec![0u8; CHUNK.min(remaining.max(1) as usize)];

    while remaining > 0 {
        let take = remaining.min(buf.len() as u64);
        let src_start = at_offset + remaining - take;
        let dst_start = src_start + n;

        cur.seek(SeekFrom::Start(src_start))?;
        cur.read_buf_exact(&mut buf[..take as usize])?;

        cur.seek(SeekFrom::Start(dst_start))?;
        cur.write_buf(&buf[..take as usize])?;

        remaining -= take;
    }

    Ok(())
}

/// Removes `n` bytes starting at `at_offset`, shifting everything after the removed region
/// backward by `n` bytes. The stream shrinks by exactly `n` bytes.
///
/// Copies the suffix backward in fixed-size chunks from the front of the removed region towards
/// the end so that source and destination ranges never overlap incorrectly.
pub fn shorten<S: SeekableStream>(cur: &mut Cursor<S>, at_offset: u64, n: u64) -> Result<()> {
    if n == 0 {
        return Ok(());
    }

    let old_len = cur.len()?;
    debug_assert!(at_offset + n <= old_len);

    let tail_len = old_len - (at_offset + n);
    let mut copied = 0u64;
    let mut buf = vec![0u8; CHUNK.min(tail_len.max(1) as usize)];

    while copied < tail_len {
        let take = (tail_len - copied).min(buf.len() as u64);
        let src_start = at_offset + n + copied;
        let dst_start = at_offset + copied;

        cur.seek(SeekFrom::Start(src_start))?;
        cur.read_buf_exact(&mut buf[..take as usize])?;

        cur.seek(SeekFrom::Start(dst_start))?;
        cur.write_buf(&buf[..take as usize])?;

        copied += take;
    }

    cur.set_len(old_len - n)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::cursor::MemoryStream;

    #[test]
    fn lengthen_shifts_tail_forward() {
        let mut cur = Cursor::new(MemoryStream::new(b"HEADaudio".to_vec()));
        lengthen(&mut cur, 4, 3).unwrap();
        let data = cur.into_inner().into_inner();
        assert_eq!(&data[..4], b"HEAD");
        assert_eq!(&data[7..], b"audio");
        assert_eq!(data.len(), 12);
    }

    #[test]
    fn shorten_shifts_tail_backward() {
        let mut cur = Cursor::new(MemoryStream::new(b"HEADxxxaudio".to_vec()));
        shorten(&mut cur, 4, 3).unwrap();
        let data = cur.into_inner().into_inner();
        assert_eq!(data, b"HEADaudio");
    }

    #[test]
    fn lengthen_then_shorten_is_identity() {
        let original = b"0123456789ABCDEF".to_vec();
        let mut cur = Cursor::new(MemoryStream::new(original.clone()));
        lengthen(&mut cur, 6, 5).unwrap();
        shorten(&mut cur, 6, 5).unwrap();
        assert_eq!(cur.into_inner().into_inner(), original);
    }
}
