//! CBM DOS directories.
//!
//! The directory is itself a sector chain on the header track, each block
//! holding eight 32-byte entries.  Only the first entry of each block
//! carries a meaningful next-block pointer; the other seven leave those two
//! bytes unused.  The parsed entry list is the authoritative copy; `sync`
//! rebuilds the on-disk blocks from it and keeps the BAM's picture of the
//! directory region in step.

use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use log::warn;

use crate::disk::bam::Bam;
use crate::disk::block::{decode_link, encode_link, BlockMap, Location, BLOCK_SIZE};
use crate::disk::chain;
use crate::disk::error::{DiskError, Result};
use crate::disk::geometry::{BamPlacement, Geometry};
use crate::petscii::{Petscii, PADDING_BYTE};

pub const ENTRY_SIZE: usize = 32;
pub const ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / ENTRY_SIZE;

pub const FILENAME_SIZE: usize = 16;

const TYPE_OFFSET: usize = 0x02;
const FIRST_SECTOR_OFFSET: usize = 0x03;
const FILENAME_OFFSET: usize = 0x05;
const SIDE_SECTOR_OFFSET: usize = 0x15;
const RECORD_LENGTH_OFFSET: usize = 0x17;
const LSU_OFFSET: usize = 0x18;
const DATE_OFFSET: usize = 0x19;
const SIZE_OFFSET: usize = 0x1E;

/// File types as stored in the directory entry type byte.  Values below
/// 0x80 mark unused (or scratched) slots.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FileType {
    Del,
    Seq,
    Prg,
    Usr,
    Rel,
    Cbm,
    Dir,
}

impl FileType {
    pub fn from_type_byte(byte: u8) -> Option<FileType> {
        match byte {
            0x80 => Some(FileType::Del),
            0x81 => Some(FileType::Seq),
            0x82 => Some(FileType::Prg),
            0x83 => Some(FileType::Usr),
            0x84 => Some(FileType::Rel),
            0x85 => Some(FileType::Cbm),
            0x86 => Some(FileType::Dir),
            _ => None,
        }
    }

    pub fn type_byte(self) -> u8 {
        match self {
            FileType::Del => 0x80,
            FileType::Seq => 0x81,
            FileType::Prg => 0x82,
            FileType::Usr => 0x83,
            FileType::Rel => 0x84,
            FileType::Cbm => 0x85,
            FileType::Dir => 0x86,
        }
    }

    /// The upper-case tag used in directory listings and extracted-file
    /// names.
    pub fn tag(self) -> &'static str {
        match self {
            FileType::Del => "DEL",
            FileType::Seq => "SEQ",
            FileType::Prg => "PRG",
            FileType::Usr => "USR",
            FileType::Rel => "REL",
            FileType::Cbm => "CBM",
            FileType::Dir => "DIR",
        }
    }

    pub fn from_tag(tag: &str) -> Option<FileType> {
        match tag.to_uppercase().as_str() {
            "DEL" => Some(FileType::Del),
            "SEQ" => Some(FileType::Seq),
            "PRG" => Some(FileType::Prg),
            "USR" => Some(FileType::Usr),
            "REL" => Some(FileType::Rel),
            "CBM" => Some(FileType::Cbm),
            "DIR" => Some(FileType::Dir),
            _ => None,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            FileType::Del => "del",
            FileType::Seq => "seq",
            FileType::Prg => "prg",
            FileType::Usr => "usr",
            FileType::Rel => "rel",
            FileType::Cbm => "cbm",
            FileType::Dir => "dir",
        })
    }
}

/// One 32-byte directory slot.
///
/// A slot's lifecycle: free (type 0, no blocks), then reserved by the
/// allocator, then active once a type byte is written.  Writing the type
/// back to zero leaves a tombstone whose blocks stay allocated until a
/// revalidation pass reclaims them.
#[derive(Clone, PartialEq, Debug)]
pub struct DirEntry {
    /// Next directory block, kept only on the first slot of each block and
    /// only when its sector byte is nonzero.
    pub next: Option<Location>,
    pub type_byte: u8,
    pub first: Location,
    pub name: Petscii,
    /// First side sector, for REL files.
    pub side_sector: Location,
    /// Record length, for REL files.
    pub record_length: u8,
    /// Last-sector-used byte: the number of payload bytes in the file's
    /// final block, plus one.  Mirrors the final block's tail byte.
    pub lsu: u8,
    /// Offset from 1900.
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub blocks: u16,
}

impl DirEntry {
    /// A free slot.
    pub fn free() -> DirEntry {
        DirEntry {
            next: None,
            type_byte: 0,
            first: Location(0, 0),
            name: Petscii::default(),
            side_sector: Location(0, 0),
            record_length: 0,
            lsu: 0,
            year: 0,
            month: 0,
            day: 0,
            hour: 0,
            minute: 0,
            blocks: 0,
        }
    }

    fn parse(slot: &[u8], geometry: &Geometry, first_in_block: bool) -> DirEntry {
        let next = if first_in_block && slot[1] != 0 {
            if slot[0] == 0 {
                Some(Location(0, slot[1]))
            } else {
                Some(decode_link(geometry, [slot[0], slot[1]]))
            }
        } else {
            None
        };
        DirEntry {
            next,
            type_byte: slot[TYPE_OFFSET],
            first: decode_link(
                geometry,
                [slot[FIRST_SECTOR_OFFSET], slot[FIRST_SECTOR_OFFSET + 1]],
            ),
            name: Petscii::from_padded_bytes(
                &slot[FILENAME_OFFSET..FILENAME_OFFSET + FILENAME_SIZE],
                PADDING_BYTE,
            ),
            side_sector: decode_link(
                geometry,
                [slot[SIDE_SECTOR_OFFSET], slot[SIDE_SECTOR_OFFSET + 1]],
            ),
            record_length: slot[RECORD_LENGTH_OFFSET],
            lsu: slot[LSU_OFFSET],
            year: slot[DATE_OFFSET],
            month: slot[DATE_OFFSET + 1],
            day: slot[DATE_OFFSET + 2],
            hour: slot[DATE_OFFSET + 3],
            minute: slot[DATE_OFFSET + 4],
            blocks: u16::from_le_bytes([slot[SIZE_OFFSET], slot[SIZE_OFFSET + 1]]),
        }
    }

    /// Pack the 30-byte entry payload into the slot.  The first two bytes
    /// (the next-directory link) belong to the block, not the entry, and
    /// are left alone.
    pub(crate) fn write(&self, slot: &mut [u8], geometry: &Geometry) {
        slot[TYPE_OFFSET] = self.type_byte;
        let first = encode_link(geometry, self.first);
        slot[FIRST_SECTOR_OFFSET] = first[0];
        slot[FIRST_SECTOR_OFFSET + 1] = first[1];
        self.name.write_bytes_with_padding(
            &mut slot[FILENAME_OFFSET..FILENAME_OFFSET + FILENAME_SIZE],
            PADDING_BYTE,
        );
        let side = encode_link(geometry, self.side_sector);
        slot[SIDE_SECTOR_OFFSET] = side[0];
        slot[SIDE_SECTOR_OFFSET + 1] = side[1];
        slot[RECORD_LENGTH_OFFSET] = self.record_length;
        slot[LSU_OFFSET] = self.lsu;
        slot[DATE_OFFSET] = self.year;
        slot[DATE_OFFSET + 1] = self.month;
        slot[DATE_OFFSET + 2] = self.day;
        slot[DATE_OFFSET + 3] = self.hour;
        slot[DATE_OFFSET + 4] = self.minute;
        let size = self.blocks.to_le_bytes();
        slot[SIZE_OFFSET] = size[0];
        slot[SIZE_OFFSET + 1] = size[1];
    }

    /// Active entries hold live files; DEL entries and tombstones are not
    /// active.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.type_byte > 0x80
    }

    /// Present entries appear in listings (active files plus DEL entries).
    #[inline]
    pub fn is_present(&self) -> bool {
        self.type_byte >= 0x80
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.type_byte == 0 && self.blocks == 0
    }

    /// A scratched entry whose blocks have not been reclaimed yet.
    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.type_byte == 0 && self.blocks > 0
    }

    pub fn file_type(&self) -> Option<FileType> {
        FileType::from_type_byte(self.type_byte)
    }

    pub fn date(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(
            1900 + self.year as i32,
            self.month as u32,
            self.day as u32,
        )
        .and_then(|d| d.and_hms_opt(self.hour as u32, self.minute as u32, 0))
    }

    /// Store a timestamp in the entry's five date bytes.  Years are kept as
    /// an offset from 1900, covering 1900-2155.
    pub fn set_date(&mut self, date: &NaiveDateTime) {
        let year = date.year();
        self.year = if year > 255 { year - 1900 } else { year }.clamp(0, 255) as u8;
        self.month = date.month() as u8;
        self.day = date.day() as u8;
        self.hour = date.hour() as u8;
        self.minute = date.minute() as u8;
    }

    fn matches_name(&self, name: &Petscii) -> bool {
        self.name == *name || self.name.to_ascii() == name.to_ascii()
    }
}

impl fmt::Display for DirEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:<4} {:18} {}",
            self.blocks,
            format!("\"{}\"", self.name),
            match self.file_type() {
                Some(t) => t.to_string(),
                None => format!("?{:02x}", self.type_byte),
            }
        )
    }
}

/// The parsed directory cache.
#[derive(Clone, PartialEq, Debug)]
pub struct Directory {
    geometry: Geometry,
    entries: Vec<DirEntry>,
}

impl Directory {
    /// A fresh directory: one block's worth of free slots, which is what a
    /// newly formatted disk parses back as.
    pub fn new(geometry: &Geometry) -> Directory {
        Directory {
            geometry: *geometry,
            entries: (0..ENTRIES_PER_BLOCK).map(|_| DirEntry::free()).collect(),
        }
    }

    /// Read the whole directory chain starting at the first directory
    /// sector, eight slots per block.
    pub fn parse(blocks: &BlockMap) -> Result<Directory> {
        let geometry = *blocks.geometry();
        let locations = chain::walk(blocks, geometry.first_dir_location(), None)?;
        let mut entries = Vec::with_capacity(locations.len() * ENTRIES_PER_BLOCK);
        for location in locations {
            let block = blocks.block(location)?;
            for slot in 0..ENTRIES_PER_BLOCK {
                entries.push(DirEntry::parse(
                    &block[slot * ENTRY_SIZE..(slot + 1) * ENTRY_SIZE],
                    &geometry,
                    slot == 0,
                ));
            }
        }
        Ok(Directory { geometry, entries })
    }

    #[inline]
    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Result<&DirEntry> {
        self.entries
            .get(index)
            .ok_or_else(|| DiskError::NotFound(format!("directory entry {}", index)))
    }

    pub fn entry_mut(&mut self, index: usize) -> Result<&mut DirEntry> {
        self.entries
            .get_mut(index)
            .ok_or_else(|| DiskError::NotFound(format!("directory entry {}", index)))
    }

    /// Entries that show up in a listing, with their indices.
    pub fn present(&self) -> impl Iterator<Item = (usize, &DirEntry)> {
        self.entries.iter().enumerate().filter(|(_, e)| e.is_present())
    }

    /// Find the first entry whose type byte is strictly above `low_type`
    /// and whose filename matches either the raw PETSCII bytes or the ASCII
    /// projection of `name`.
    pub fn find(&self, name: &Petscii, low_type: u8) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.type_byte > low_type && e.matches_name(name))
    }

    /// The directory block and slot a given entry index maps to.
    fn slot_location(&self, index: usize) -> (Location, usize) {
        let geometry = &self.geometry;
        let spt = geometry.sectors_per_track(geometry.header_track);
        let block_index = (index / ENTRIES_PER_BLOCK) as u16;
        let mut sector =
            (1 + block_index * geometry.dir_interleave as u16) % spt;
        if geometry.bam_placement == BamPlacement::FollowsHeader {
            sector += geometry.bam_sectors as u16;
        }
        (
            Location(geometry.header_track, sector as u8),
            index % ENTRIES_PER_BLOCK,
        )
    }

    /// Reserve a directory slot for `name`.
    ///
    /// With `at` given, only the slots of that directory block are
    /// considered, failing with `NoFreeDirEntry` when all eight are taken.
    /// Otherwise the first free slot wins and the directory grows by one
    /// block when no slot is free.  Crossing into a fresh block allocates
    /// its sector in the BAM when the BAM still shows it free.
    pub fn allocate(&mut self, bam: &mut Bam, name: &Petscii, at: Option<Location>) -> Result<usize> {
        if self.find(name, 0x80).is_some() {
            return Err(DiskError::NameExists(name.to_ascii()));
        }

        let index = match at {
            Some(location) => self
                .entries
                .iter()
                .enumerate()
                .position(|(i, e)| e.is_free() && self.slot_location(i).0 == location)
                .ok_or(DiskError::NoFreeDirEntry)?,
            None => match self.entries.iter().position(|e| e.is_free()) {
                Some(index) => index,
                None => {
                    let index = self.entries.len();
                    self.entries
                        .extend((0..ENTRIES_PER_BLOCK).map(|_| DirEntry::free()));
                    index
                }
            },
        };

        if index % ENTRIES_PER_BLOCK == 0 {
            let (location, _) = self.slot_location(index);
            if self.geometry.contains(location) {
                if bam.block_available(location)? {
                    bam.set_block(location, false)?;
                }
            } else {
                warn!(
                    "directory slot {} maps to {} outside the header track layout",
                    index, location
                );
            }
        }
        Ok(index)
    }

    /// Rename a file in place.  The change reaches the disk bytes on the
    /// next sync.
    pub fn rename(&mut self, from: &Petscii, to: &Petscii) -> Result<()> {
        if self.find(to, 0x80).is_some() {
            return Err(DiskError::NameExists(to.to_ascii()));
        }
        let index = self
            .find(from, 0x80)
            .ok_or_else(|| DiskError::NotFound(from.to_ascii()))?;
        self.entries[index].name = to.truncated(FILENAME_SIZE);
        Ok(())
    }

    /// The sequence of directory block locations sync writes: a forward
    /// walk by the directory interleave that stays on the header track and
    /// wraps at its sector count.
    fn block_sequence(&self, count: usize) -> Vec<Location> {
        let geometry = &self.geometry;
        let spt = geometry.sectors_per_track(geometry.header_track);
        let mut sequence = Vec::with_capacity(count);
        let mut sector = geometry.dir_sector_offset() as u16;
        for _ in 0..count {
            sequence.push(Location(geometry.header_track, sector as u8));
            sector = (sector + geometry.dir_interleave as u16) % spt;
        }
        sequence
    }

    /// The directory blocks the current entry list occupies (the same
    /// sequence sync writes).
    pub(crate) fn occupied_block_locations(&self) -> Vec<Location> {
        let count = (self.entries.len() + ENTRIES_PER_BLOCK - 1) / ENTRIES_PER_BLOCK;
        self.block_sequence(count.max(1))
    }

    /// Rebuild the directory blocks from the in-memory entries.
    ///
    /// The BAM's directory region is cleared first, then each written block
    /// is re-allocated, so directory growth is visible to the BAM before
    /// the BAM itself serializes.
    pub fn sync(&mut self, blocks: &mut BlockMap, bam: &mut Bam) -> Result<()> {
        let geometry = self.geometry;
        let header_location = geometry.header_location();

        // Clear the directory region: everything on the header track except
        // the header sector and any BAM sectors that live there.
        let bam_locations = geometry.bam_sector_locations();
        let spt = geometry.sectors_per_track(geometry.header_track);
        for sector in 0..spt {
            let location = Location(geometry.header_track, sector as u8);
            if location != header_location && !bam_locations.contains(&location) {
                bam.set_block(location, true)?;
            }
        }

        let count = (self.entries.len() + ENTRIES_PER_BLOCK - 1) / ENTRIES_PER_BLOCK;
        let count = count.max(1);
        let sequence = self.block_sequence(count);

        for (i, location) in sequence.iter().enumerate() {
            if *location == header_location {
                // The interleave walk has wrapped onto the header sector;
                // large directories are not chained past this point.
                warn!("directory sync overran the header track at block {}", i);
            }
            let mut block = [0u8; BLOCK_SIZE];
            let next = if i + 1 < count {
                let next = sequence[i + 1];
                let raw = encode_link(&geometry, next);
                block[0] = raw[0];
                block[1] = raw[1];
                if next.1 != 0 {
                    Some(next)
                } else {
                    None
                }
            } else {
                block[0] = 0x00;
                block[1] = 0xFF;
                Some(Location(0, 0xFF))
            };
            for slot in 0..ENTRIES_PER_BLOCK {
                let index = i * ENTRIES_PER_BLOCK + slot;
                if index >= self.entries.len() {
                    break;
                }
                self.entries[index].next = if slot == 0 { next } else { None };
                self.entries[index]
                    .write(&mut block[slot * ENTRY_SIZE..(slot + 1) * ENTRY_SIZE], &geometry);
            }
            blocks.write_block(*location, &block)?;
            if location != &header_location && !bam_locations.contains(location) {
                bam.set_block(*location, false)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::bam::Bam;
    use crate::disk::geometry::{GEOMETRY_1541, GEOMETRY_1581};

    fn sample_entry() -> DirEntry {
        let mut entry = DirEntry::free();
        entry.type_byte = FileType::Prg.type_byte();
        entry.first = Location(17, 0);
        entry.name = Petscii::from_str("ASCII CODES");
        entry.lsu = 41;
        entry.blocks = 6;
        entry.set_date(
            &NaiveDate::from_ymd_opt(1986, 9, 3)
                .unwrap()
                .and_hms_opt(12, 30, 0)
                .unwrap(),
        );
        entry
    }

    #[test]
    fn test_entry_layout() {
        let entry = sample_entry();
        let mut slot = [0u8; ENTRY_SIZE];
        entry.write(&mut slot, &GEOMETRY_1541);
        assert_eq!(slot[0x02], 0x82);
        assert_eq!(slot[0x03..0x05], [17, 0]);
        assert_eq!(&slot[0x05..0x10], b"ASCII CODES");
        assert!(slot[0x10..0x15].iter().all(|&b| b == PADDING_BYTE));
        assert_eq!(slot[0x18], 41);
        assert_eq!(slot[0x19..0x1E], [86, 9, 3, 12, 30]);
        assert_eq!(slot[0x1E..0x20], [6, 0]);

        let reread = DirEntry::parse(&slot, &GEOMETRY_1541, false);
        assert_eq!(reread, entry);
        assert_eq!(
            reread.date().unwrap(),
            NaiveDate::from_ymd_opt(1986, 9, 3)
                .unwrap()
                .and_hms_opt(12, 30, 0)
                .unwrap()
        );
    }

    #[test]
    fn test_entry_states() {
        let mut entry = sample_entry();
        assert!(entry.is_active() && entry.is_present());
        entry.type_byte = 0;
        assert!(entry.is_tombstone() && !entry.is_free() && !entry.is_present());
        entry.blocks = 0;
        assert!(entry.is_free());
        entry.type_byte = FileType::Del.type_byte();
        assert!(entry.is_present() && !entry.is_active());
    }

    #[test]
    fn test_find_matches_raw_and_ascii() {
        let mut directory = Directory::new(&GEOMETRY_1541);
        directory.entries[0] = sample_entry();
        assert_eq!(directory.find(&Petscii::from_str("ascii codes"), 0x80), Some(0));
        assert_eq!(
            directory.find(&Petscii::from_bytes(b"ASCII CODES"), 0x80),
            Some(0)
        );
        assert_eq!(directory.find(&Petscii::from_str("other"), 0x80), None);
        // A DEL entry is skipped with the default threshold.
        directory.entries[0].type_byte = FileType::Del.type_byte();
        assert_eq!(directory.find(&Petscii::from_str("ascii codes"), 0x80), None);
        assert_eq!(
            directory.find(&Petscii::from_str("ascii codes"), 0x7F),
            Some(0)
        );
    }

    #[test]
    fn test_allocate_collision_and_growth() {
        let mut directory = Directory::new(&GEOMETRY_1541);
        let mut bam = Bam::initialize(&GEOMETRY_1541);

        let first = directory
            .allocate(&mut bam, &Petscii::from_str("one"), None)
            .unwrap();
        assert_eq!(first, 0);
        // The first directory sector is now spoken for.
        assert!(!bam.block_available(Location(18, 1)).unwrap());
        directory.entries[0] = sample_entry();

        match directory.allocate(&mut bam, &Petscii::from_str("ascii codes"), None) {
            Err(DiskError::NameExists(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }

        // Fill the remaining seven slots of the first block.
        for i in 1..ENTRIES_PER_BLOCK {
            let index = directory
                .allocate(&mut bam, &Petscii::from_str(&format!("f{}", i)), None)
                .unwrap();
            assert_eq!(index, i);
            directory.entries[index].type_byte = FileType::Prg.type_byte();
            directory.entries[index].name = Petscii::from_str(&format!("f{}", i));
            directory.entries[index].blocks = 1;
        }

        // The ninth entry crosses a block boundary: the directory grows and
        // the new sector (18,4) appears in the BAM as used.
        assert!(bam.block_available(Location(18, 4)).unwrap());
        let ninth = directory
            .allocate(&mut bam, &Petscii::from_str("nine"), None)
            .unwrap();
        assert_eq!(ninth, 8);
        assert_eq!(directory.entries.len(), 2 * ENTRIES_PER_BLOCK);
        assert!(!bam.block_available(Location(18, 4)).unwrap());
    }

    #[test]
    fn test_allocate_at_specific_block() {
        let mut directory = Directory::new(&GEOMETRY_1541);
        let mut bam = Bam::initialize(&GEOMETRY_1541);
        for i in 0..ENTRIES_PER_BLOCK {
            let index = directory
                .allocate(&mut bam, &Petscii::from_str(&format!("f{}", i)), Some(Location(18, 1)))
                .unwrap();
            directory.entries[index].type_byte = FileType::Prg.type_byte();
            directory.entries[index].name = Petscii::from_str(&format!("f{}", i));
            directory.entries[index].blocks = 1;
        }
        match directory.allocate(&mut bam, &Petscii::from_str("overflow"), Some(Location(18, 1))) {
            Err(DiskError::NoFreeDirEntry) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_sync_parse_round_trip() {
        for geometry in &[GEOMETRY_1541, GEOMETRY_1581] {
            let mut blocks = BlockMap::blank(*geometry);
            let mut bam = Bam::initialize(geometry);
            let mut directory = Directory::new(geometry);
            for i in 0..12 {
                let name = Petscii::from_str(&format!("file {}", i));
                let index = directory.allocate(&mut bam, &name, None).unwrap();
                let entry = directory.entry_mut(index).unwrap();
                entry.type_byte = FileType::Seq.type_byte();
                entry.name = name;
                entry.first = Location(1, i as u8);
                entry.blocks = 1;
                entry.lsu = 255;
            }
            directory.sync(&mut blocks, &mut bam).unwrap();
            let reread = Directory::parse(&blocks).unwrap();
            assert_eq!(reread, directory);
        }
    }

    #[test]
    fn test_sync_writes_chain_links() {
        let mut blocks = BlockMap::blank(GEOMETRY_1541);
        let mut bam = Bam::initialize(&GEOMETRY_1541);
        let mut directory = Directory::new(&GEOMETRY_1541);
        for i in 0..9 {
            let name = Petscii::from_str(&format!("file {}", i));
            let index = directory.allocate(&mut bam, &name, None).unwrap();
            let entry = directory.entry_mut(index).unwrap();
            entry.type_byte = FileType::Prg.type_byte();
            entry.name = name;
            entry.blocks = 1;
        }
        directory.sync(&mut blocks, &mut bam).unwrap();
        // Two blocks: (18,1) links to (18,4); (18,4) is the tail.
        assert_eq!(blocks.block(Location(18, 1)).unwrap()[..2], [18, 4]);
        assert_eq!(blocks.block(Location(18, 4)).unwrap()[..2], [0, 0xFF]);
        assert!(!bam.block_available(Location(18, 1)).unwrap());
        assert!(!bam.block_available(Location(18, 4)).unwrap());
    }

    #[test]
    fn test_rename() {
        let mut directory = Directory::new(&GEOMETRY_1541);
        directory.entries[0] = sample_entry();
        directory
            .rename(&Petscii::from_str("ascii codes"), &Petscii::from_str("petscii codes"))
            .unwrap();
        assert_eq!(directory.entries[0].name.as_bytes(), b"PETSCII CODES");
        match directory.rename(&Petscii::from_str("gone"), &Petscii::from_str("x")) {
            Err(DiskError::NotFound(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
