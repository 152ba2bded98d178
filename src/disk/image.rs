use std::fs;
use std::path::Path;

use crate::disk::error::{DiskError, Result};

/// Backing storage for a disk image: a flat, linearly-addressable byte
/// buffer.  The buffer may be longer than the geometry requires (some images
/// carry an appended error table); the extra bytes are carried along
/// untouched and written back on save.
pub struct Image {
    data: Vec<u8>,
}

impl Image {
    /// A zero-filled in-memory image.
    pub fn open_memory(length: usize) -> Image {
        Image {
            data: vec![0; length],
        }
    }

    pub fn from_vec(data: Vec<u8>) -> Image {
        Image { data }
    }

    /// Read an image file in its entirety.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Image> {
        Ok(Image {
            data: fs::read(path)?,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn check_bounds(&self, offset: usize, length: usize) -> Result<()> {
        if offset + length > self.data.len() {
            Err(DiskError::InvalidImage(format!(
                "access beyond end of image ({} + {} > {})",
                offset,
                length,
                self.data.len()
            )))
        } else {
            Ok(())
        }
    }

    pub fn slice(&self, offset: usize, length: usize) -> Result<&[u8]> {
        self.check_bounds(offset, length)?;
        Ok(&self.data[offset..offset + length])
    }

    pub fn slice_mut(&mut self, offset: usize, length: usize) -> Result<&mut [u8]> {
        self.check_bounds(offset, length)?;
        Ok(&mut self.data[offset..offset + length])
    }
}
