// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Format-specific tag codecs, each implementing [`base::MetaDataIo`].

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]
#![allow(clippy::comparison_chain, clippy::identity_op, clippy::manual_range_contains)]

mod base64;

pub mod ape;
pub mod base;
pub mod flac;
pub mod id3v1;
pub mod id3v2;
pub mod ogg;
pub mod spc;
pub mod vorbis;

pub use base::{MetaDataIo, ReadOptions, ReadOutcome};
