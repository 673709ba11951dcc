// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `tagforge` reads and writes embedded metadata tags across Ogg Vorbis, FLAC, ID3v1/ID3v1.1,
//! ID3v2.2/2.3/2.4, APEv2, and SPC700/xid6 files, through one format-neutral API (§6).
//!
//! ```no_run
//! use tagforge::{open, Settings, SupportedField, TagData, TagType};
//!
//! # fn main() -> tagforge::Result<()> {
//! let mut file = open("track.flac")?;
//! let result = file.read(false, None)?;
//! println!("{} ({:?}s)", result.format, result.duration_seconds);
//!
//! let mut delta = TagData::new();
//! delta.set(SupportedField::Title, "New Title");
//! file.update(&delta, TagType::Flac, &Settings::default())?;
//! # Ok(())
//! # }
//! ```
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod manager;
pub mod picture;

pub use manager::{AudioFile, PictureMeta, ReadResult, TagSnapshot};
pub use tagforge_core::errors::{Error, Result};
pub use tagforge_core::settings::{DefaultTextEncoding, Id3v2Version, Settings};
pub use tagforge_core::tag::{
    AdditionalField, Chapter, FieldValue, Picture, PictureType, SupportedField, TagData, TagType,
};

use std::path::Path;

/// Opens a file for tag reading and writing (§6).
pub fn open<P: AsRef<Path>>(path: P) -> Result<AudioFile> {
    AudioFile::open(path)
}
