// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reads just enough of a JPEG/PNG/GIF/BMP header to report its dimensions. Test-only: nothing in
//! the core read/write path depends on this crate (DESIGN.md: "picture decoding dependency").
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

/// The outcome of [`probe`]: the detected format plus pixel dimensions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Cursor { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return None;
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Some(slice)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    fn be_u16(&mut self) -> Option<u16> {
        self.take(2).map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    fn le_u16(&mut self) -> Option<u16> {
        self.take(2).map(|b| u16::from_le_bytes([b[0], b[1]]))
    }

    fn be_u32(&mut self) -> Option<u32> {
        self.take(4).map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn le_i32(&mut self) -> Option<i32> {
        self.take(4).map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn skip(&mut self, n: usize) -> Option<()> {
        self.take(n).map(|_| ())
    }
}

/// Detects the format of `buf` by its leading magic bytes and parses just enough of its header to
/// report dimensions. Returns `None` for unrecognized or malformed input.
pub fn probe(buf: &[u8]) -> Option<ImageInfo> {
    if buf.starts_with(&[0xff, 0xd8]) {
        parse_jpeg(buf)
    } else if buf.starts_with(b"\x89PNG\r\n\x1a\n") {
        parse_png(buf)
    } else if buf.starts_with(b"GIF87a") || buf.starts_with(b"GIF89a") {
        parse_gif(buf)
    } else if buf.starts_with(b"BM") {
        parse_bitmap(buf)
    } else {
        None
    }
}

fn parse_jpeg(buf: &[u8]) -> Option<ImageInfo> {
    let mut c = Cursor::new(&buf[2..]);
    loop {
        if c.u8()? != 0xff {
            return None;
        }
        let chunk_type = c.u8()?;

        if (0xd0..=0xd9).contains(&chunk_type) {
            continue;
        }

        let chunk_len = c.be_u16()?;
        if chunk_len < 2 {
            return None;
        }

        // Baseline (SOF0) and progressive (SOF2) DCT frame markers carry the dimensions.
        if chunk_type == 0xc0 || chunk_type == 0xc2 {
            c.skip(1)?;
            let height = c.be_u16()?;
            let width = c.be_u16()?;
            return Some(ImageInfo { format: ImageFormat::Jpeg, width: u32::from(width), height: u32::from(height) });
        }

        c.skip(usize::from(chunk_len) - 2)?;
    }
}

fn parse_png(buf: &[u8]) -> Option<ImageInfo> {
    let mut c = Cursor::new(&buf[8..]);
    c.skip(4)?; // IHDR chunk length
    if c.take(4)? != b"IHDR" {
        return None;
    }
    let width = c.be_u32()?;
    let height = c.be_u32()?;
    Some(ImageInfo { format: ImageFormat::Png, width, height })
}

fn parse_gif(buf: &[u8]) -> Option<ImageInfo> {
    let mut c = Cursor::new(&buf[6..]);
    let width = c.le_u16()?;
    let height = c.le_u16()?;
    Some(ImageInfo { format: ImageFormat::Gif, width: u32::from(width), height: u32::from(height) })
}

fn parse_bitmap(buf: &[u8]) -> Option<ImageInfo> {
    let mut c = Cursor::new(&buf[14..]);
    let header_size = c.le_i32()?;
    if ![40, 52, 56, 108, 124].contains(&header_size) {
        return None;
    }
    let width = c.le_i32()?.unsigned_abs();
    let height = c.le_i32()?.unsigned_abs();
    Some(ImageInfo { format: ImageFormat::Bmp, width, height })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_fixture(width: u32, height: u32) -> Vec<u8> {
        let mut out = b"\x89PNG\r\n\x1a\n".to_vec();
        out.extend_from_slice(&13u32.to_be_bytes());
        out.extend_from_slice(b"IHDR");
        out.extend_from_slice(&width.to_be_bytes());
        out.extend_from_slice(&height.to_be_bytes());
        out.extend_from_slice(&[8, 2, 0, 0, 0]); // 8-bit truecolor, no interlace
        out
    }

    fn gif_fixture(width: u16, height: u16) -> Vec<u8> {
        let mut out = b"GIF89a".to_vec();
        out.extend_from_slice(&width.to_le_bytes());
        out.extend_from_slice(&height.to_le_bytes());
        out.push(0); // no global color table
        out
    }

    fn jpeg_fixture(width: u16, height: u16) -> Vec<u8> {
        let mut out = vec![0xff, 0xd8]; // SOI
        out.extend_from_slice(&[0xff, 0xc0]); // SOF0
        let len = 2 + 1 + 2 + 2 + 1; // length field + precision + height + width + components(0)
        out.extend_from_slice(&(len as u16).to_be_bytes());
        out.push(8); // precision
        out.extend_from_slice(&height.to_be_bytes());
        out.extend_from_slice(&width.to_be_bytes());
        out.push(0);
        out
    }

    #[test]
    fn detects_png_dimensions() {
        let info = probe(&png_fixture(640, 480)).unwrap();
        assert_eq!(info, ImageInfo { format: ImageFormat::Png, width: 640, height: 480 });
    }

    #[test]
    fn detects_gif_dimensions() {
        let info = probe(&gif_fixture(100, 50)).unwrap();
        assert_eq!(info, ImageInfo { format: ImageFormat::Gif, width: 100, height: 50 });
    }

    #[test]
    fn detects_jpeg_dimensions() {
        let info = probe(&jpeg_fixture(320, 240)).unwrap();
        assert_eq!(info, ImageInfo { format: ImageFormat::Jpeg, width: 320, height: 240 });
    }

    #[test]
    fn unrecognized_data_returns_none() {
        assert!(probe(b"not an image").is_none());
    }
}
