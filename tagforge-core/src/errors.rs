// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the common error type shared by every codec and by the facade.

use std::error::Error as StdError;
use std::fmt;

/// `Error` enumerates every way a read, update, or remove call can fail.
#[derive(Debug)]
pub enum Error {
    /// The file's magic bytes did not match any known codec.
    NotRecognized,
    /// The stream violated the structural rules of its format. `where_` names the region
    /// (e.g. "flac block header"), `why` describes the violation.
    Malformed { where_: &'static str, why: String },
    /// A feature of the format was encountered that this codec does not implement.
    Unsupported(&'static str),
    /// The underlying stream failed. If encountered mid-write, the file is left in an
    /// undefined state; callers that need atomicity should write to a temporary file first.
    Io(std::io::Error),
    /// The caller's request does not apply to this file (wrong tag type, oversized picture, ...).
    InvalidArgument(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotRecognized => write!(f, "file format not recognized"),
            Error::Malformed { where_, why } => write!(f, "malformed {where_}: {why}"),
            Error::Unsupported(feature) => write!(f, "unsupported feature: {feature}"),
            Error::Io(err) => write!(f, "io error: {err}"),
            Error::InvalidArgument(why) => write!(f, "invalid argument: {why}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Convenience constructor for a malformed-stream error.
pub fn malformed<T>(where_: &'static str, why: impl Into<String>) -> Result<T> {
    Err(Error::Malformed { where_, why: why.into() })
}

/// Convenience constructor for an unsupported-feature error.
pub fn unsupported<T>(feature: &'static str) -> Result<T> {
    Err(Error::Unsupported(feature))
}

/// Convenience constructor for an invalid-argument error.
pub fn invalid_argument<T>(why: &'static str) -> Result<T> {
    Err(Error::InvalidArgument(why))
}
