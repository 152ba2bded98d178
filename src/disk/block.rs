use std::fmt;

use crate::disk::error::{DiskError, Result};
use crate::disk::geometry::Geometry;
use crate::disk::image::Image;

pub const BLOCK_SIZE: usize = 256;

/// A track and sector pair.  CBM DOS numbers tracks from 1; the 9000-series
/// drives go past 255 tracks, hence the 16-bit track number.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, PartialOrd, Ord, Default)]
pub struct Location(pub u16, pub u8);

impl Location {
    #[inline]
    pub fn new(track: u16, sector: u8) -> Location {
        Location(track, sector)
    }

    #[inline]
    pub fn track(&self) -> u16 {
        self.0
    }

    #[inline]
    pub fn sector(&self) -> u8 {
        self.1
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({},{})", self.0, self.1)
    }
}

/// Encode a T/S link as the two raw bytes stored at the head of a block.
///
/// For packed-track layouts the track number is 10 bits wide: the low 8 bits
/// go in the track byte and bits 8-9 ride in the top 2 bits of the sector
/// byte, leaving 6 bits for the sector number.
pub(crate) fn encode_link(geometry: &Geometry, location: Location) -> [u8; 2] {
    let Location(track, sector) = location;
    if geometry.packed_links() {
        [
            (track & 0xFF) as u8,
            (sector & 0x3F) | ((((track >> 8) & 0x03) as u8) << 6),
        ]
    } else {
        [track as u8, sector]
    }
}

/// Decode the two raw link bytes at the head of a block into a T/S pair.
/// The inverse of `encode_link`.
pub(crate) fn decode_link(geometry: &Geometry, raw: [u8; 2]) -> Location {
    if geometry.packed_links() {
        let track = raw[0] as u16 | (((raw[1] >> 6) as u16) << 8);
        Location(track, raw[1] & 0x3F)
    } else {
        Location(raw[0] as u16, raw[1])
    }
}

/// Divides the image buffer into 256-byte blocks addressed by track and
/// sector, according to a `Geometry`.  All sector-level reads and writes go
/// through here, including the T/S link bytes at the head of each block, so
/// the packed-track adjustment happens in exactly one place.
pub struct BlockMap {
    image: Image,
    geometry: Geometry,
}

impl BlockMap {
    /// Wrap an existing buffer.  The buffer must hold at least one full
    /// image for the geometry; extra trailing bytes (an error table) are
    /// tolerated and preserved.
    pub fn new(image: Image, geometry: Geometry) -> Result<BlockMap> {
        if image.len() < geometry.byte_size() {
            return Err(DiskError::InvalidImage(format!(
                "{} bytes is too small for a {} image ({} required)",
                image.len(),
                geometry.format_tag,
                geometry.byte_size()
            )));
        }
        Ok(BlockMap { image, geometry })
    }

    /// A zero-filled image of exactly the geometry's size.
    pub fn blank(geometry: Geometry) -> BlockMap {
        BlockMap {
            image: Image::open_memory(geometry.byte_size()),
            geometry,
        }
    }

    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        self.image.as_bytes()
    }

    fn offset(&self, location: Location) -> Result<usize> {
        Ok(self.geometry.sector_offset(location)? * BLOCK_SIZE)
    }

    /// Borrow the 256 bytes of a block.
    pub fn block(&self, location: Location) -> Result<&[u8]> {
        let offset = self.offset(location)?;
        self.image.slice(offset, BLOCK_SIZE)
    }

    pub fn block_mut(&mut self, location: Location) -> Result<&mut [u8]> {
        let offset = self.offset(location)?;
        self.image.slice_mut(offset, BLOCK_SIZE)
    }

    /// Copy of a block's contents.
    pub fn block_owned(&self, location: Location) -> Result<Vec<u8>> {
        Ok(self.block(location)?.to_vec())
    }

    /// Replace a full block.
    pub fn write_block(&mut self, location: Location, data: &[u8]) -> Result<()> {
        if data.len() != BLOCK_SIZE {
            return Err(DiskError::InvalidImage(format!(
                "block write of {} bytes at {}",
                data.len(),
                location
            )));
        }
        self.block_mut(location)?.copy_from_slice(data);
        Ok(())
    }

    /// Splice an arbitrary byte run into the buffer.  The buffer length is
    /// preserved; out-of-bounds writes are rejected.
    pub fn write_bytes(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        self.image.slice_mut(offset, data.len())?.copy_from_slice(data);
        Ok(())
    }

    /// Read the T/S link at the head of a block, adjusted for the geometry's
    /// link encoding.  A zero track byte marks a chain tail; the second byte
    /// is then the last used byte offset, not a sector number, and is
    /// returned unadjusted.  Packed track numbers that would encode to a
    /// zero byte (256, 512, 768) are therefore never linked to; the
    /// allocator keeps those tracks out of file chains.
    pub fn read_link(&self, location: Location) -> Result<Location> {
        let block = self.block(location)?;
        if block[0] == 0 {
            return Ok(Location(0, block[1]));
        }
        Ok(decode_link(&self.geometry, [block[0], block[1]]))
    }

    /// Write the T/S link at the head of a block, applying the reverse link
    /// adjustment when the geometry calls for it.
    pub fn write_link(&mut self, location: Location, next: Location) -> Result<()> {
        let raw = encode_link(&self.geometry, next);
        let block = self.block_mut(location)?;
        block[0] = raw[0];
        block[1] = raw[1];
        Ok(())
    }

    /// Write a tail marker: track 0 plus the last used byte offset.
    pub fn write_tail(&mut self, location: Location, last_used: u8) -> Result<()> {
        let block = self.block_mut(location)?;
        block[0] = 0;
        block[1] = last_used;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::geometry::{GEOMETRY_1541, GEOMETRY_9090};

    #[test]
    fn test_block_offsets_match_layout_documents() {
        // Spot values from the D64 format documents.
        let blocks = BlockMap::blank(GEOMETRY_1541);
        assert_eq!(blocks.offset(Location(1, 0)).unwrap(), 0x00000);
        assert_eq!(blocks.offset(Location(18, 0)).unwrap(), 0x16500);
        assert_eq!(blocks.offset(Location(35, 0)).unwrap(), 0x29A00);
        assert!(blocks.block(Location(35, 17)).is_err());
    }

    #[test]
    fn test_write_block_round_trip() {
        let mut blocks = BlockMap::blank(GEOMETRY_1541);
        let mut data = [0u8; BLOCK_SIZE];
        for (i, b) in data.iter_mut().enumerate() {
            *b = i as u8;
        }
        blocks.write_block(Location(5, 3), &data).unwrap();
        assert_eq!(blocks.block(Location(5, 3)).unwrap(), &data[..]);
        assert!(blocks.write_block(Location(5, 3), &data[..10]).is_err());
    }

    #[test]
    fn test_write_bytes_preserves_length() {
        let mut blocks = BlockMap::blank(GEOMETRY_1541);
        let len = blocks.bytes().len();
        blocks.write_bytes(0x100, &[1, 2, 3]).unwrap();
        assert_eq!(blocks.bytes().len(), len);
        assert_eq!(&blocks.bytes()[0x100..0x103], &[1, 2, 3]);
        assert!(blocks.write_bytes(len - 1, &[1, 2]).is_err());
    }

    #[test]
    fn test_plain_links() {
        let mut blocks = BlockMap::blank(GEOMETRY_1541);
        blocks
            .write_link(Location(1, 0), Location(17, 12))
            .unwrap();
        assert_eq!(blocks.block(Location(1, 0)).unwrap()[..2], [17, 12]);
        assert_eq!(blocks.read_link(Location(1, 0)).unwrap(), Location(17, 12));
    }

    #[test]
    fn test_packed_links() {
        // A track above 255 packs its top bits into the sector byte.
        let mut blocks = BlockMap::blank(GEOMETRY_9090);
        blocks.write_link(Location(1, 0), Location(300, 5)).unwrap();
        let raw = &blocks.block(Location(1, 0)).unwrap()[..2];
        assert_eq!(raw, [0x2C, 0x45]);
        assert_eq!(blocks.read_link(Location(1, 0)).unwrap(), Location(300, 5));

        // A small track leaves the sector byte untouched.
        blocks.write_link(Location(1, 1), Location(200, 3)).unwrap();
        let raw = &blocks.block(Location(1, 1)).unwrap()[..2];
        assert_eq!(raw, [0xC8, 0x03]);
        assert_eq!(blocks.read_link(Location(1, 1)).unwrap(), Location(200, 3));
    }

    #[test]
    fn test_packed_link_codec_is_lossless() {
        for &track in &[1u16, 63, 64, 255, 256, 511, 900, 918] {
            for &sector in &[0u8, 1, 31, 63] {
                let raw = encode_link(&GEOMETRY_9090, Location(track, sector));
                assert_eq!(
                    decode_link(&GEOMETRY_9090, raw),
                    Location(track, sector)
                );
            }
        }
    }

    #[test]
    fn test_tail_marker() {
        let mut blocks = BlockMap::blank(GEOMETRY_1541);
        blocks.write_tail(Location(2, 0), 41).unwrap();
        assert_eq!(blocks.block(Location(2, 0)).unwrap()[..2], [0, 41]);
        assert_eq!(blocks.read_link(Location(2, 0)).unwrap(), Location(0, 41));
    }
}
