// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The PICTURE block body format (§4.4), shared verbatim by the FLAC container codec and by
//! Ogg Vorbis's `METADATA_BLOCK_PICTURE` comment (§4.3), which carries this exact payload
//! base64-encoded.

use tagforge_core::io::{ReadBytes, WriteBytes};
use tagforge_core::tag::{Picture, PictureType};
use tagforge_core::{errors, Result};

/// Maps a FLAC/Vorbis picture-type byte (0-20, identical numbering to ID3v2 APIC) onto the
/// format-neutral enum.
pub fn picture_type_from_native(code: u8) -> PictureType {
    match code {
        0 => PictureType::Other,
        1 => PictureType::FileIcon,
        2 => PictureType::OtherIcon,
        3 => PictureType::Front,
        4 => PictureType::Back,
        5 => PictureType::Leaflet,
        6 => PictureType::Media,
        7 => PictureType::LeadArtist,
        8 => PictureType::Artist,
        9 => PictureType::Conductor,
        10 => PictureType::Band,
        11 => PictureType::Composer,
        12 => PictureType::Lyricist,
        13 => PictureType::RecordingLocation,
        14 => PictureType::DuringRecording,
        15 => PictureType::DuringPerformance,
        16 => PictureType::ScreenCapture,
        17 => PictureType::BrightFish,
        18 => PictureType::Illustration,
        19 => PictureType::BandLogo,
        20 => PictureType::PublisherLogo,
        _ => PictureType::Unsupported,
    }
}

/// The inverse of [`picture_type_from_native`], used when a picture without a stored
/// `native_code` (e.g. one constructed programmatically by a caller) is serialized.
pub fn native_from_picture_type(picture_type: PictureType) -> u8 {
    match picture_type {
        PictureType::Other => 0,
        PictureType::FileIcon => 1,
        PictureType::OtherIcon => 2,
        PictureType::Front => 3,
        PictureType::Back => 4,
        PictureType::Leaflet => 5,
        PictureType::Media => 6,
        PictureType::LeadArtist => 7,
        PictureType::Artist => 8,
        PictureType::Conductor => 9,
        PictureType::Band => 10,
        PictureType::Composer => 11,
        PictureType::Lyricist => 12,
        PictureType::RecordingLocation => 13,
        PictureType::DuringRecording => 14,
        PictureType::DuringPerformance => 15,
        PictureType::ScreenCapture => 16,
        PictureType::BrightFish => 17,
        PictureType::Illustration => 18,
        PictureType::BandLogo => 19,
        PictureType::PublisherLogo => 20,
        PictureType::Unsupported => 0,
    }
}

/// Decodes a PICTURE block body: big-endian type, MIME, description, width, height, depth,
/// colors-used, then the image bytes.
pub fn decode(mut body: &[u8]) -> Result<Picture> {
    let native_code = {
        let raw = body.read_u32_be()?;
        if raw > 0xff {
            return errors::malformed("flac picture", "picture type out of range");
        }
        raw as u8
    };

    let mime_len = body.read_u32_be()? as usize;
    let mime = match String::from_utf8(body.read_boxed_slice_exact(mime_len)?.into_vec()) {
        Ok(s) => s,
        Err(_) => return errors::malformed("flac picture", "MIME is not UTF-8"),
    };

    let desc_len = body.read_u32_be()? as usize;
    let description = match String::from_utf8(body.read_boxed_slice_exact(desc_len)?.into_vec()) {
        Ok(s) => s,
        Err(_) => return errors::malformed("flac picture", "description is not UTF-8"),
    };

    let _width = body.read_u32_be()?;
    let _height = body.read_u32_be()?;
    let _depth = body.read_u32_be()?;
    let _colors_used = body.read_u32_be()?;

    let data_len = body.read_u32_be()? as usize;
    let data = body.read_boxed_slice_exact(data_len)?.into_vec();

    Ok(Picture {
        picture_type: picture_type_from_native(native_code),
        native_code,
        mime,
        description,
        data,
        marked_for_deletion: false,
    })
}

/// Encodes a picture as a PICTURE block body. Width/height/depth/colors-used are written as zero
/// since the core never decodes image bytes to discover them (§4.4: "may be zero on write if
/// unknown").
pub fn encode(picture: &Picture) -> Vec<u8> {
    let mut out = Vec::with_capacity(32 + picture.mime.len() + picture.description.len() + picture.data.len());

    let native_code = if picture.picture_type == PictureType::Unsupported {
        picture.native_code
    } else {
        native_from_picture_type(picture.picture_type)
    };

    out.write_u32_be(u32::from(native_code)).unwrap();
    out.write_u32_be(picture.mime.len() as u32).unwrap();
    out.write_buf(picture.mime.as_bytes()).unwrap();
    out.write_u32_be(picture.description.len() as u32).unwrap();
    out.write_buf(picture.description.as_bytes()).unwrap();
    out.write_u32_be(0).unwrap(); // width
    out.write_u32_be(0).unwrap(); // height
    out.write_u32_be(0).unwrap(); // depth
    out.write_u32_be(0).unwrap(); // colors used
    out.write_u32_be(picture.data.len() as u32).unwrap();
    out.write_buf(&picture.data).unwrap();

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Picture {
        Picture {
            picture_type: PictureType::Front,
            native_code: 3,
            mime: "image/png".into(),
            description: "cover".into(),
            data: vec![1, 2, 3, 4],
            marked_for_deletion: false,
        }
    }

    #[test]
    fn round_trips_through_encode_decode() {
        let pic = sample();
        let encoded = encode(&pic);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.picture_type, PictureType::Front);
        assert_eq!(decoded.mime, "image/png");
        assert_eq!(decoded.description, "cover");
        assert_eq!(decoded.data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn unsupported_type_preserves_native_code() {
        let mut pic = sample();
        pic.picture_type = PictureType::Unsupported;
        pic.native_code = 0x7f;
        let encoded = encode(&pic);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.picture_type, PictureType::Unsupported);
        assert_eq!(decoded.native_code, 0x7f);
    }
}
