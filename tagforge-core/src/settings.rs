// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `Settings` is read-mostly configuration threaded explicitly through read/write option
//! records. The source project keeps the equivalent as a process-wide global; this crate
//! threads it through call boundaries instead (see DESIGN.md, "Global state").

/// The minimal text encoding a codec is allowed to fall back to when writing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DefaultTextEncoding {
    Iso8859_1,
    Utf16,
    Utf8,
}

/// The ID3v2 major version a write defaults to when creating a new tag from scratch.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Id3v2Version {
    V2_2,
    V2_3,
    V2_4,
}

#[derive(Clone, Debug)]
pub struct Settings {
    /// When true, codecs prefer growing/shrinking an existing padding region over splicing the
    /// audio payload (§4.2).
    pub enable_padding: bool,
    pub default_text_encoding: DefaultTextEncoding,
    pub default_id3v2_version: Id3v2Version,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            enable_padding: true,
            default_text_encoding: DefaultTextEncoding::Utf8,
            default_id3v2_version: Id3v2Version::V2_3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_match_the_documented_defaults() {
        let s = Settings::default();
        assert!(s.enable_padding);
        assert_eq!(s.default_id3v2_version, Id3v2Version::V2_3);
    }
}
