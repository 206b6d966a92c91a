//! Errors of the filesystem API.
//!
//! Every variant carries a stable numeric code, negative so that callers
//! multiplexing byte counts and errors over a single integer can tell them
//! apart.

use log::debug;
use std::io;
use thiserror::Error;

/// Result alias for filesystem operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An error returned by a filesystem operation.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum Error {
    /// No free data blocks are left on the image.
    #[error("no space left on the image")]
    DiskFull,
    /// No free inodes are left on the image.
    #[error("maximum number of files reached")]
    MaxFiles,
    /// The target path already exists.
    #[error("file already exists")]
    FileExists,
    /// The requested block lies past the maximum file size.
    #[error("offset past the maximum file size")]
    PastEnd,
    /// The target path does not exist.
    #[error("file not found")]
    FileNotFound,
    /// The path is empty, has an invalid component, or its parent cannot be
    /// resolved.
    #[error("invalid path")]
    InvalidPath,
    /// The open-file table is full.
    #[error("too many open files")]
    TooManyFilesOpen,
    /// The handle does not refer to an open file.
    #[error("file is not open")]
    FileNotOpen,
    /// A block I/O operation on the image failed.
    #[error("I/O error on the image")]
    Internal,
    /// The requested image size is below the minimum.
    #[error("an image must have at least 32 blocks")]
    MinBlocks,
    /// The seek command is not one of current/absolute/end.
    #[error("invalid seek command")]
    InvalidLseekCmd,
    /// The seek offset resolves to a negative position.
    #[error("invalid seek offset")]
    InvalidLseekOffset,
    /// The target is a directory.
    #[error("not a regular file")]
    NotAFile,
    /// The target is not a directory.
    #[error("not a directory")]
    NotADir,
    /// The image's superblock does not carry the expected signature.
    #[error("not a valid filesystem image")]
    InvalidDiskFile,
}

impl Error {
    /// Returns the stable numeric code of the error.
    pub fn code(self) -> i32 {
        match self {
            Self::DiskFull => -1,
            Self::MaxFiles => -2,
            Self::FileExists => -3,
            Self::PastEnd => -4,
            Self::FileNotFound => -5,
            Self::InvalidPath => -6,
            Self::TooManyFilesOpen => -7,
            Self::FileNotOpen => -8,
            Self::Internal => -20,
            Self::MinBlocks => -21,
            Self::InvalidLseekCmd => -22,
            Self::InvalidLseekOffset => -23,
            Self::NotAFile => -25,
            Self::NotADir => -26,
            Self::InvalidDiskFile => -27,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        debug!("image I/O failure: {err}");
        Self::Internal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_codes() {
        assert_eq!(Error::DiskFull.code(), -1);
        assert_eq!(Error::FileNotOpen.code(), -8);
        assert_eq!(Error::Internal.code(), -20);
        assert_eq!(Error::InvalidDiskFile.code(), -27);
    }
}
