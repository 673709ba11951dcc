// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Text codecs for the encodings used across ID3v1, ID3v2, APEv2, and SPC: Latin-1 (ISO-8859-1,
//! every byte value is a valid code point) and the UTF-16 variants ID3v2 text frames may use.

/// Decodes a Latin-1 (ISO-8859-1) buffer. Every byte maps directly to the Unicode code point of
/// the same value, so this never fails; trailing NUL/space padding is trimmed.
pub fn decode_iso8859_1(buf: &[u8]) -> String {
    let trimmed_len =
        buf.iter().rposition(|&b| b != 0 && b != b' ').map(|i| i + 1).unwrap_or(0);
    buf[..trimmed_len].iter().map(|&b| b as char).collect()
}

/// Encodes a string as Latin-1, clamping each code point above 0xFF to `?`.
pub fn encode_iso8859_1(s: &str) -> Vec<u8> {
    s.chars().map(|c| if (c as u32) <= 0xFF { c as u8 } else { b'?' }).collect()
}

/// Decodes a UTF-16 buffer, consuming a leading BOM if present and otherwise assuming
/// little-endian (ID3v2 encoding 1) or the caller-specified endianness (ID3v2 encoding 2).
pub fn decode_utf16(buf: &[u8], default_big_endian: bool) -> String {
    if buf.len() < 2 {
        return String::new();
    }

    let (big_endian, body) = match &buf[..2] {
        [0xFF, 0xFE] => (false, &buf[2..]),
        [0xFE, 0xFF] => (true, &buf[2..]),
        _ => (default_big_endian, buf),
    };

    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|c| {
            if big_endian {
                u16::from_be_bytes([c[0], c[1]])
            } else {
                u16::from_le_bytes([c[0], c[1]])
            }
        })
        .collect();

    String::from_utf16_lossy(&units)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso8859_1_round_trips_ascii() {
        let encoded = encode_iso8859_1("Hello");
        assert_eq!(decode_iso8859_1(&encoded), "Hello");
    }

    #[test]
    fn iso8859_1_trims_padding() {
        let mut buf = b"Artist".to_vec();
        buf.resize(30, 0);
        assert_eq!(decode_iso8859_1(&buf), "Artist");
    }

    #[test]
    fn utf16_with_bom() {
        let mut buf = vec![0xFF, 0xFE];
        for u in "hi".encode_utf16() {
            buf.extend_from_slice(&u.to_le_bytes());
        }
        assert_eq!(decode_utf16(&buf, false), "hi");
    }
}
