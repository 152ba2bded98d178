use std::io;

use thiserror::Error;

/// Convenience alias used throughout the disk module.
pub type Result<T> = std::result::Result<T, DiskError>;

/// Errors that can be returned from disk image operations.
///
/// A failed mutation never leaves the parsed header/BAM/directory caches in a
/// half-updated state: allocations are computed before anything is marked, and
/// cache updates happen only once every fallible step has succeeded.
#[derive(Error, Debug)]
pub enum DiskError {
    /// The image bytes cannot be interpreted: bad container signature,
    /// truncated buffer, unknown device or extension, unparseable layout.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// A track/sector pair outside the addressable range of the geometry.
    #[error("no such block ({track},{sector})")]
    GeometryError { track: u16, sector: u8 },

    /// An active directory entry with this filename already exists.
    #[error("file exists: \"{0}\"")]
    NameExists(String),

    /// The directory has no free slot and no room to grow.
    #[error("no free directory entry")]
    NoFreeDirEntry,

    /// The BAM cannot satisfy the requested allocation count.
    #[error("not enough free blocks ({needed} needed, {free} free)")]
    NoFreeBlocks { needed: usize, free: usize },

    /// An attempt to mark a block as used found it already used.
    #[error("block ({track},{sector}) is already allocated")]
    DoubleAlloc { track: u16, sector: u8 },

    /// Filename or index lookup miss.
    #[error("not found: \"{0}\"")]
    NotFound(String),

    /// A zero-length file would occupy zero blocks and cannot be stored.
    #[error("zero-length file")]
    EmptyFile,

    /// Underlying file read or write failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}
