// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `MetaDataIo` is the common read/write/remove lifecycle every format codec implements. Avoid
//! an inheritance chain here: codecs share algorithms by composition (the Vorbis Comment codec is
//! reused by both the FLAC and Ogg codecs), not by a shared base class.

use tagforge_core::io::DynStream;
use tagforge_core::settings::Settings;
use tagforge_core::tag::{TagData, TagType};
use tagforge_core::Result;

/// Options that apply uniformly across every codec's `read`.
#[derive(Clone, Debug, Default)]
pub struct ReadOptions {
    /// When true, the codec records [`tagforge_core::zones::Zone`]s as it reads, so a subsequent
    /// `write` call on the same stream knows what to resize (§4.10: "prepare-for-writing" mode).
    pub prepare_for_writing: bool,
}

/// The result of a single codec's `read`: whether its tag was present, and if so, what was
/// decoded (or what went wrong decoding it).
#[derive(Debug)]
pub struct ReadOutcome {
    pub exists: bool,
    pub parse_error: Option<String>,
    pub tag: TagData,
}

impl ReadOutcome {
    pub fn absent() -> Self {
        ReadOutcome { exists: false, parse_error: None, tag: TagData::new() }
    }
}

/// The read/modify/write/remove lifecycle a single format's codec implements.
pub trait MetaDataIo {
    /// Which [`TagType`] this codec owns.
    fn tag_type(&self) -> TagType;

    /// Quickly checks whether the stream is plausibly this codec's format, without fully
    /// decoding it (used by `AudioDataManager`'s probe, §4.10).
    fn probe(&self, stream: &mut DynStream) -> Result<bool>;

    /// Parses the tag region(s) out of `stream`. When `opts.prepare_for_writing` is set, the
    /// codec also records its zones/anchors so a later `write` call can resize them.
    fn read(&self, stream: &mut DynStream, opts: &ReadOptions) -> Result<ReadOutcome>;

    /// Merges `delta` onto a just-read `current` (§4.1) and serializes the result back into
    /// `stream`, resizing zones as necessary (§4.2). `stream` must have just been read with
    /// `prepare_for_writing` set.
    fn write(
        &self,
        stream: &mut DynStream,
        current: &TagData,
        delta: &TagData,
        settings: &Settings,
    ) -> Result<()>;

    /// Clears this codec's tag, preserving anything the format spec says must survive removal
    /// (e.g. SPC playback-control fields, §4.9).
    fn remove(&self, stream: &mut DynStream, settings: &Settings) -> Result<()>;
}
