use std::fmt;

use crate::disk::block::BlockMap;
use crate::disk::error::Result;
use crate::disk::Id;
use crate::petscii::{Petscii, PADDING_BYTE};

/// Length of the disk label field.
pub const LABEL_SIZE: usize = 16;

/// The parsed disk header: label, disk ID, and DOS type.
///
/// On disk these live in the header sector at the geometry's label offset,
/// laid out as `label(16) A0 A0 id(2) A0 dos_type(2)`.  The label is stored
/// in PETSCII and padded with 0xA0; the parsed copy here is the trimmed
/// form.
#[derive(Clone, PartialEq, Debug)]
pub struct Header {
    pub label: Petscii,
    pub id: Id,
    pub dos_type: Id,
}

impl Header {
    /// A fresh header for a newly created image.
    pub fn new(label: &str, id: &str, dos_type: [u8; 2]) -> Header {
        let mut header = Header {
            label: Petscii::default(),
            id: Id::default(),
            dos_type: Id::from_bytes(&dos_type),
        };
        header.set_label(label, id, None);
        header
    }

    /// Read the header fields out of the header sector.
    pub fn parse(blocks: &BlockMap) -> Result<Header> {
        let geometry = blocks.geometry();
        let block = blocks.block(geometry.header_location())?;
        let offset = geometry.header_label_offset;
        Ok(Header {
            label: Petscii::from_padded_bytes(&block[offset..offset + LABEL_SIZE], PADDING_BYTE),
            id: Id::from_bytes(&block[offset + 18..offset + 20]),
            dos_type: Id::from_bytes(&block[offset + 21..offset + 23]),
        })
    }

    /// Write the header fields back into the header sector, restoring the
    /// padding bytes around them.  Without the padding, directory listings
    /// shown by a real drive come out garbled.
    pub fn sync(&self, blocks: &mut BlockMap) -> Result<()> {
        let geometry = *blocks.geometry();
        let offset = geometry.header_label_offset;
        let block = blocks.block_mut(geometry.header_location())?;
        self.label
            .write_bytes_with_padding(&mut block[offset..offset + LABEL_SIZE], PADDING_BYTE);
        block[offset + 16] = PADDING_BYTE;
        block[offset + 17] = PADDING_BYTE;
        block[offset + 18] = self.id.as_bytes()[0];
        block[offset + 19] = self.id.as_bytes()[1];
        block[offset + 20] = PADDING_BYTE;
        block[offset + 21] = self.dos_type.as_bytes()[0];
        block[offset + 22] = self.dos_type.as_bytes()[1];
        Ok(())
    }

    /// Replace label and ID (and optionally the DOS type), normalizing to
    /// upper-case PETSCII at this boundary.  Overlong labels are truncated
    /// to the field width.
    pub fn set_label(&mut self, label: &str, id: &str, dos_type: Option<&str>) {
        self.label = Petscii::from_str(label).truncated(LABEL_SIZE);
        self.id = Id::from_petscii(&Petscii::from_str(id));
        if let Some(dos_type) = dos_type {
            self.dos_type = Id::from_petscii(&Petscii::from_str(dos_type));
        }
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "0 \"{:16}\" {} {}",
            self.label, self.id, self.dos_type
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::geometry::{GEOMETRY_1541, GEOMETRY_1581};

    #[test]
    fn test_parse_inverts_sync() {
        for geometry in &[GEOMETRY_1541, GEOMETRY_1581] {
            let mut blocks = BlockMap::blank(*geometry);
            let header = Header::new("demos", "dm", geometry.dos_type);
            header.sync(&mut blocks).unwrap();
            assert_eq!(Header::parse(&blocks).unwrap(), header);
        }
    }

    #[test]
    fn test_on_disk_layout() {
        // The label region of a 1541 header sector, per the D64 documents:
        // name at 0x90, id at 0xA2, DOS type "2A" at 0xA5, padding between.
        let mut blocks = BlockMap::blank(GEOMETRY_1541);
        let header = Header::new("TEST", "01", *b"2A");
        header.sync(&mut blocks).unwrap();
        let block = blocks
            .block(crate::disk::block::Location(18, 0))
            .unwrap();
        assert_eq!(&block[0x90..0x94], b"TEST");
        assert!(block[0x94..0xA2].iter().all(|&b| b == PADDING_BYTE));
        assert_eq!(&block[0xA2..0xA4], b"01");
        assert_eq!(block[0xA4], PADDING_BYTE);
        assert_eq!(&block[0xA5..0xA7], b"2A");
    }

    #[test]
    fn test_set_label_normalizes() {
        let mut header = Header::new("x", "y", *b"2A");
        header.set_label("games november", "a9", None);
        assert_eq!(header.label.as_bytes(), b"GAMES NOVEMBER");
        assert_eq!(header.id.as_bytes(), b"A9");
        header.set_label("a very much too long label", "zz", Some("3d"));
        assert_eq!(header.label.len(), LABEL_SIZE);
        assert_eq!(header.dos_type.as_bytes(), b"3D");
    }
}
