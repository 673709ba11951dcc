// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `AudioFile` is the facade's entry point (§4.10, §6): given a path, it probes every known tag
//! codec, exposes a read-only snapshot of whatever is present, and dispatches `update`/`remove`
//! calls to the right codec. Duration/sample-parameter fields are "incidental" (§1): they're
//! filled in only where a tag codec already parsed the data needed (FLAC's STREAMINFO, SPC's
//! header/xid6 fields), never by decoding audio frames.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::SeekFrom;
use std::path::Path;

use tagforge_codecs::base::{MetaDataIo, ReadOptions};
use tagforge_codecs::{ape, flac, id3v1, id3v2, ogg, spc};
use tagforge_core::io::{Cursor, DynStream, SeekableStream};
use tagforge_core::settings::Settings;
use tagforge_core::tag::{AdditionalField, Chapter, FieldValue, PictureType, SupportedField, TagData, TagType};
use tagforge_core::Result;

/// A description of one embedded picture, without its byte payload. Picture bytes themselves are
/// only ever handed to the caller's `picture_sink`, never held in a `TagSnapshot` (§6, §9).
#[derive(Clone, Debug)]
pub struct PictureMeta {
    pub picture_type: PictureType,
    pub native_code: u8,
    pub mime: String,
    pub description: String,
    pub size_bytes: usize,
}

/// A read-only snapshot of one tag type's contents (§6: `TagSnapshot`).
#[derive(Clone, Debug, Default)]
pub struct TagSnapshot {
    pub supported_fields: Vec<(SupportedField, String)>,
    pub additional_fields: Vec<AdditionalField>,
    pub pictures_meta: Vec<PictureMeta>,
    pub chapters: Option<Vec<Chapter>>,
    pub vendor: Option<String>,
}

impl TagSnapshot {
    fn from_tag(tag: &TagData) -> Self {
        let vendor = tag.additional_fields().iter().find(|f| f.native_code == "VENDOR").and_then(|f| {
            match &f.value {
                FieldValue::Text(s) => Some(s.clone()),
                _ => None,
            }
        });

        TagSnapshot {
            supported_fields: tag.supported_fields().map(|(f, v)| (f, v.to_string())).collect(),
            additional_fields: tag.additional_fields().to_vec(),
            pictures_meta: tag
                .pictures()
                .iter()
                .map(|p| PictureMeta {
                    picture_type: p.picture_type,
                    native_code: p.native_code,
                    mime: p.mime.clone(),
                    description: p.description.clone(),
                    size_bytes: p.data.len(),
                })
                .collect(),
            chapters: tag.chapters().map(|c| c.to_vec()),
            vendor,
        }
    }
}

/// What a single `read` call returns (§6): incidental audio parameters plus one `TagSnapshot` per
/// tag format actually present in the file.
#[derive(Clone, Debug, Default)]
pub struct ReadResult {
    pub format: String,
    pub duration_seconds: Option<f64>,
    pub bitrate_kbps: Option<u32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u8>,
    pub bits_per_sample: Option<u8>,
    pub tags: BTreeMap<TagType, TagSnapshot>,
}

fn codec_for(tag_type: TagType) -> Box<dyn MetaDataIo> {
    match tag_type {
        TagType::VorbisComment => Box::new(ogg::OggCodec),
        TagType::Flac => Box::new(flac::FlacCodec),
        TagType::Id3v1 => Box::new(id3v1::Id3v1Codec),
        TagType::Id3v2 => Box::new(id3v2::Id3v2Codec),
        TagType::Ape => Box::new(ape::ApeCodec),
        TagType::Spc => Box::new(spc::SpcCodec),
    }
}

/// Probe order: container formats first, so `format` favors the more informative name when a
/// pure-tag format (ID3v2, APEv2, ID3v1) rides alongside one.
const PROBE_ORDER: [TagType; 6] = [
    TagType::Flac,
    TagType::VorbisComment,
    TagType::Spc,
    TagType::Id3v2,
    TagType::Ape,
    TagType::Id3v1,
];

/// An open audio file, ready for tag reads and writes (§6).
pub struct AudioFile {
    stream: DynStream,
}

impl AudioFile {
    /// Opens `path` for both reading and writing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::options().read(true).write(true).open(path)?;
        Ok(AudioFile { stream: Cursor::new(Box::new(file) as Box<dyn SeekableStream>) })
    }

    /// Wraps an already-open stream. Used by tests, and by callers with a non-filesystem source.
    pub fn from_stream(stream: DynStream) -> Self {
        AudioFile { stream }
    }

    pub fn into_stream(self) -> DynStream {
        self.stream
    }

    fn probe_all(&mut self) -> Result<Vec<TagType>> {
        let mut present = Vec::new();
        for &tag_type in &PROBE_ORDER {
            self.stream.seek(SeekFrom::Start(0))?;
            if codec_for(tag_type).probe(&mut self.stream)? {
                present.push(tag_type);
            }
        }
        Ok(present)
    }

    /// Reads every tag format present. When `include_all_meta` is set, embedded picture bytes are
    /// streamed to `picture_sink` as they're found rather than held in the returned snapshots.
    pub fn read(
        &mut self,
        include_all_meta: bool,
        mut picture_sink: Option<&mut dyn FnMut(&[u8], PictureType, u8)>,
    ) -> Result<ReadResult> {
        let present = self.probe_all()?;
        if present.is_empty() {
            return Err(tagforge_core::errors::Error::NotRecognized);
        }

        let format = present
            .iter()
            .find_map(|&t| match t {
                TagType::Flac => Some("FLAC"),
                TagType::VorbisComment => Some("Ogg Vorbis"),
                TagType::Spc => Some("SPC700"),
                _ => None,
            })
            .unwrap_or("tagged audio (container format not probed)")
            .to_string();

        let mut sample_rate = None;
        let mut channels = None;
        let mut bits_per_sample = None;
        let mut duration_seconds = None;

        if present.contains(&TagType::Flac) {
            self.stream.seek(SeekFrom::Start(0))?;
            if let Ok(info) = flac::read_stream_info(&mut self.stream) {
                sample_rate = Some(info.sample_rate);
                channels = Some(info.channels);
                bits_per_sample = Some(info.bits_per_sample);
                if info.sample_rate > 0 {
                    duration_seconds = Some(info.total_samples as f64 / f64::from(info.sample_rate));
                }
            }
        }

        let mut tags = BTreeMap::new();
        for &tag_type in &present {
            self.stream.seek(SeekFrom::Start(0))?;
            let outcome = codec_for(tag_type).read(&mut self.stream, &ReadOptions::default())?;
            if !outcome.exists {
                continue;
            }

            if tag_type == TagType::Spc {
                if let Some(ms) = spc::duration_ms(&outcome.tag) {
                    duration_seconds = Some(ms as f64 / 1000.0);
                }
            }

            if include_all_meta {
                if let Some(sink) = picture_sink.as_deref_mut() {
                    for pic in outcome.tag.pictures() {
                        sink(&pic.data, pic.picture_type, pic.native_code);
                    }
                }
            }

            tags.insert(tag_type, TagSnapshot::from_tag(&outcome.tag));
        }

        Ok(ReadResult { format, duration_seconds, bitrate_kbps: None, sample_rate, channels, bits_per_sample, tags })
    }

    /// Merges `tag` onto the current contents of `tag_type` and writes the result back (§4.10).
    pub fn update(&mut self, tag: &TagData, tag_type: TagType, settings: &Settings) -> Result<()> {
        let codec = codec_for(tag_type);
        self.stream.seek(SeekFrom::Start(0))?;
        let opts = ReadOptions { prepare_for_writing: true };
        let current = codec.read(&mut self.stream, &opts)?.tag;
        self.stream.seek(SeekFrom::Start(0))?;
        codec.write(&mut self.stream, &current, tag, settings)
    }

    /// Clears `tag_type`'s tag entirely, modulo anything its format says must survive removal.
    pub fn remove(&mut self, tag_type: TagType, settings: &Settings) -> Result<()> {
        let codec = codec_for(tag_type);
        self.stream.seek(SeekFrom::Start(0))?;
        codec.remove(&mut self.stream, settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagforge_codecs::vorbis;
    use tagforge_core::io::MemoryStream;
    use tagforge_core::tag::TagData;

    fn dyn_stream(data: Vec<u8>) -> DynStream {
        Cursor::new(Box::new(MemoryStream::new(data)) as Box<dyn SeekableStream>)
    }

    fn flac_fixture() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"fLaC");

        // STREAMINFO: 44100 Hz, 2 channels, 16 bits/sample, 88200 total samples (= 2.0s).
        let packed: u64 = (44_100u64 << 44) | (1u64 << 41) | (15u64 << 36) | 88_200;
        let mut streaminfo = vec![0u8; 34];
        streaminfo[10..18].copy_from_slice(&packed.to_be_bytes());

        let header = (34u32) & 0x00ff_ffff; // type 0 (STREAMINFO), not last
        out.extend_from_slice(&header.to_be_bytes());
        out.extend_from_slice(&streaminfo);

        let mut tag = TagData::new();
        tag.set(tagforge_core::tag::SupportedField::Title, "Song");
        let comment = vorbis::serialize_payload(&tag);
        let header = 0x8000_0000u32 | (4u32 << 24) | (comment.len() as u32 & 0x00ff_ffff);
        out.extend_from_slice(&header.to_be_bytes());
        out.extend_from_slice(&comment);

        out.extend_from_slice(b"AUDIO");
        out
    }

    #[test]
    fn read_reports_flac_format_and_duration() {
        let mut file = AudioFile::from_stream(dyn_stream(flac_fixture()));
        let result = file.read(false, None).unwrap();
        assert_eq!(result.format, "FLAC");
        assert_eq!(result.sample_rate, Some(44_100));
        assert_eq!(result.channels, Some(2));
        assert_eq!(result.duration_seconds, Some(2.0));
        assert_eq!(
            result.tags.get(&TagType::Flac).and_then(|s| {
                s.supported_fields.iter().find(|(f, _)| *f == SupportedField::Title).map(|(_, v)| v.clone())
            }),
            Some("Song".to_string())
        );
    }

    #[test]
    fn read_on_unrecognized_stream_errors() {
        let mut file = AudioFile::from_stream(dyn_stream(b"not an audio file".to_vec()));
        let err = file.read(false, None).unwrap_err();
        assert!(matches!(err, tagforge_core::errors::Error::NotRecognized));
    }

    #[test]
    fn update_and_remove_round_trip_through_the_facade() {
        let mut file = AudioFile::from_stream(dyn_stream(flac_fixture()));

        let mut delta = TagData::new();
        delta.set(SupportedField::Title, "Updated");
        file.update(&delta, TagType::Flac, &Settings::default()).unwrap();

        let result = file.read(false, None).unwrap();
        assert_eq!(
            result.tags.get(&TagType::Flac).and_then(|s| {
                s.supported_fields.iter().find(|(f, _)| *f == SupportedField::Title).map(|(_, v)| v.clone())
            }),
            Some("Updated".to_string())
        );

        file.remove(TagType::Flac, &Settings::default()).unwrap();
        let result = file.read(false, None).unwrap();
        assert!(result
            .tags
            .get(&TagType::Flac)
            .map(|s| s.supported_fields.is_empty())
            .unwrap_or(true));
    }
}
