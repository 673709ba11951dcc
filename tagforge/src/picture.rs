// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Helpers for building picture entries to put in a write delta. The core never decodes image
//! bytes (DESIGN.md: "picture decoding dependency") — these are thin constructors, not a codec.

use tagforge_core::tag::{Picture, PictureType};

/// Builds a `Picture` from raw bytes plus a MIME/format hint, ready to add to a delta via
/// [`tagforge_core::tag::TagData::add_picture`].
pub fn new_picture(
    picture_type: PictureType,
    native_code: u8,
    mime: impl Into<String>,
    description: impl Into<String>,
    data: Vec<u8>,
) -> Picture {
    Picture {
        picture_type,
        native_code,
        mime: mime.into(),
        description: description.into(),
        data,
        marked_for_deletion: false,
    }
}

/// Builds a tombstone picture that, merged as part of a write delta, deletes the picture matching
/// `(picture_type, native_code)` by identity (§3 invariant 5).
pub fn delete_picture(picture_type: PictureType, native_code: u8) -> Picture {
    Picture {
        picture_type,
        native_code,
        mime: String::new(),
        description: String::new(),
        data: Vec::new(),
        marked_for_deletion: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_picture_is_marked_and_matches_identity_of_a_real_picture() {
        let real = new_picture(PictureType::Front, 3, "image/jpeg", "cover", vec![1, 2, 3]);
        let tombstone = delete_picture(PictureType::Front, 3);
        assert!(tombstone.marked_for_deletion);
        assert_eq!(real.identity(), tombstone.identity());
    }
}
