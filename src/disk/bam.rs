//! The Block Availability Map.
//!
//! The BAM is a free-space bitmap spread across one or more sectors.  Each
//! track contributes one row: a free-sector-count byte followed by a bitmap,
//! LSB first, one bit per sector, where a set bit means free.  The row
//! stride and the number of rows per sector come from the geometry, which is
//! how the same parser covers everything from the 1541's single co-located
//! BAM sector to the 9090's nineteen.

use std::fmt;
use std::fmt::Write;

use log::warn;

use crate::disk::block::{BlockMap, Location};
use crate::disk::error::{DiskError, Result};
use crate::disk::geometry::{BamPlacement, Geometry};

/// One track's worth of BAM state.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BamEntry {
    pub track: u16,
    /// The free-sector count as stored on disk.  Kept separate from the
    /// bitmap because loaded images may disagree with their own bitmaps.
    free_sectors: u16,
    sectors: u16,
    /// LSB-first bitmap; a set bit marks a free sector.
    map: Vec<u8>,
}

impl BamEntry {
    fn fresh(track: u16, sectors: u16, map_bytes: usize) -> BamEntry {
        let mut map = vec![0u8; map_bytes];
        for sector in 0..sectors {
            map[(sector / 8) as usize] |= 1 << (sector % 8);
        }
        BamEntry {
            track,
            free_sectors: sectors,
            sectors,
            map,
        }
    }

    fn from_row(track: u16, sectors: u16, row: &[u8]) -> BamEntry {
        BamEntry {
            track,
            free_sectors: row[0] as u16,
            sectors,
            map: row[1..].to_vec(),
        }
    }

    fn write_row(&self, row: &mut [u8]) {
        row[0] = self.free_sectors.min(0xFF) as u8;
        row[1..].copy_from_slice(&self.map);
    }

    #[inline]
    pub fn free_sectors(&self) -> u16 {
        self.free_sectors
    }

    #[inline]
    pub fn sectors(&self) -> u16 {
        self.sectors
    }

    #[inline]
    pub fn is_free(&self, sector: u8) -> bool {
        let sector = sector as usize;
        sector < self.sectors as usize && self.map[sector / 8] & (1 << (sector % 8)) != 0
    }

    fn set(&mut self, sector: u8, free: bool) {
        if self.is_free(sector) == free {
            return;
        }
        let bit = 1u8 << (sector % 8);
        if free {
            self.map[sector as usize / 8] |= bit;
            self.free_sectors += 1;
        } else {
            self.map[sector as usize / 8] &= !bit;
            self.free_sectors -= 1;
        }
    }

    /// Number of set bits within the track's sector range.
    pub fn popcount(&self) -> u16 {
        (0..self.sectors).filter(|&s| self.is_free(s as u8)).count() as u16
    }
}

/// The parsed BAM cache.  Authoritative once parsed; the on-disk bytes are
/// only updated by `sync`.
#[derive(Clone, PartialEq, Debug)]
pub struct Bam {
    geometry: Geometry,
    entries: Vec<BamEntry>,
}

impl Bam {
    /// A freshly initialized BAM: every sector free except the header sector
    /// and, when they are separate from it, the BAM sectors themselves.
    pub fn initialize(geometry: &Geometry) -> Bam {
        let map_bytes = geometry.bam_sector_bytes();
        let entries = (1..=geometry.track_count())
            .map(|t| BamEntry::fresh(t, geometry.sectors_per_track(t), map_bytes))
            .collect();
        let mut bam = Bam {
            geometry: *geometry,
            entries,
        };
        let reserved = bam.reserved_locations();
        for location in reserved {
            // Reserved locations are always in range for a valid geometry.
            let _ = bam.set_block(location, false);
        }
        bam
    }

    /// The sectors a fresh image keeps out of circulation.
    fn reserved_locations(&self) -> Vec<Location> {
        let mut locations = vec![self.geometry.header_location()];
        if self.geometry.bam_placement != BamPlacement::InHeader {
            locations.extend(self.geometry.bam_sector_locations());
        }
        locations.sort();
        locations.dedup();
        locations
    }

    /// Parse the BAM sectors of an image.  The sector list is computed from
    /// the geometry rather than followed by chain link, since several
    /// formats leave the links zeroed.
    pub fn parse(blocks: &BlockMap) -> Result<Bam> {
        let geometry = *blocks.geometry();
        if geometry.bam_placement == BamPlacement::SecondSide {
            warn!(
                "{}: spill-over BAM layout is approximated; back-side availability may be wrong",
                geometry.format_tag
            );
        }
        let stride = geometry.bam_sector_bytes() + 1;
        let rows_per_sector = geometry
            .tracks_per_bam_sector_or_all()
            .min((256 - geometry.bam_label_offset) / stride);
        let track_count = geometry.track_count();

        let mut entries = Vec::with_capacity(track_count as usize);
        let mut track = 1u16;
        for location in geometry.bam_sector_locations() {
            let block = blocks.block(location)?;
            for row in 0..rows_per_sector {
                if track > track_count {
                    break;
                }
                let offset = geometry.bam_label_offset + row * stride;
                entries.push(BamEntry::from_row(
                    track,
                    geometry.sectors_per_track(track),
                    &block[offset..offset + stride],
                ));
                track += 1;
            }
        }
        if track <= track_count {
            return Err(DiskError::InvalidImage(format!(
                "BAM sectors describe only {} of {} tracks",
                track - 1,
                track_count
            )));
        }
        Ok(Bam { geometry, entries })
    }

    /// Serialize the BAM rows back into the image, chaining the BAM sectors
    /// together when the format interleaves them.
    pub fn sync(&self, blocks: &mut BlockMap) -> Result<()> {
        let geometry = &self.geometry;
        if geometry.bam_placement == BamPlacement::SecondSide {
            warn!(
                "{}: spill-over BAM may not save correctly",
                geometry.format_tag
            );
        }
        let stride = geometry.bam_sector_bytes() + 1;
        let rows_per_sector = geometry
            .tracks_per_bam_sector_or_all()
            .min((256 - geometry.bam_label_offset) / stride);
        let locations = geometry.bam_sector_locations();

        let mut index = 0usize;
        for (k, location) in locations.iter().enumerate() {
            {
                let block = blocks.block_mut(*location)?;
                for row in 0..rows_per_sector {
                    if index >= self.entries.len() {
                        break;
                    }
                    let offset = geometry.bam_label_offset + row * stride;
                    self.entries[index].write_row(&mut block[offset..offset + stride]);
                    index += 1;
                }
            }
            if geometry.bam_interleave > 0 {
                match locations.get(k + 1) {
                    Some(next) => blocks.write_link(*location, *next)?,
                    None => blocks.write_tail(*location, 0)?,
                }
            }
        }
        Ok(())
    }

    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn entry(&self, track: u16) -> Result<&BamEntry> {
        if track == 0 || track > self.entries.len() as u16 {
            return Err(DiskError::GeometryError { track, sector: 0 });
        }
        Ok(&self.entries[(track - 1) as usize])
    }

    fn entry_mut(&mut self, track: u16) -> Result<&mut BamEntry> {
        if track == 0 || track > self.entries.len() as u16 {
            return Err(DiskError::GeometryError { track, sector: 0 });
        }
        Ok(&mut self.entries[(track - 1) as usize])
    }

    pub fn entries(&self) -> &[BamEntry] {
        &self.entries
    }

    /// Is the block free?
    pub fn block_available(&self, location: Location) -> Result<bool> {
        let Location(track, sector) = location;
        if !self.geometry.contains(location) {
            return Err(DiskError::GeometryError { track, sector });
        }
        Ok(self.entry(track)?.is_free(sector))
    }

    /// Total number of addressable blocks.
    pub fn blocks_total(&self) -> usize {
        self.geometry.sector_count()
    }

    /// Free blocks as counted by the per-track free-sector counts, leaving
    /// out the header track.  This matches the "blocks free" figure a
    /// directory listing shows.
    pub fn blocks_free(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.track != self.geometry.header_track)
            .map(|e| e.free_sectors as usize)
            .sum()
    }

    /// Tracks eligible for file data, in ascending order: everything except
    /// the header track, and on packed-track layouts also excepting tracks
    /// whose number would encode to a zero link byte.
    fn candidate_tracks(&self) -> Vec<u16> {
        (1..=self.geometry.track_count())
            .filter(|&t| t != self.geometry.header_track)
            .filter(|&t| !self.geometry.packed_links() || t & 0xFF != 0)
            .collect()
    }

    /// The write-preferred visiting order, as 1-based positions into the
    /// candidate track list.  Starting mid-disk and covering the outer
    /// quarters last keeps head travel short for typical fills.
    fn preferred_positions(n: usize) -> Vec<usize> {
        if n == 0 {
            return vec![];
        }
        let mid = n / 2 + 1;
        let q1 = mid / 2;
        let q3 = 3 * q1;
        if q1 == 0 {
            return (1..=n).collect();
        }
        let mut order = Vec::with_capacity(n);
        order.extend(q1..mid);
        order.extend(mid..q3.min(n + 1));
        order.extend(1..q1);
        if q3 <= n {
            order.extend(q3..=n);
        }
        order
    }

    /// Find `count` free blocks in the write-preferred order without
    /// marking them.  Fails with `NoFreeBlocks`, reporting how many blocks
    /// were actually available, when the request cannot be met.
    pub fn find_free(&self, count: usize) -> Result<Vec<Location>> {
        let candidates = self.candidate_tracks();
        let mut found = Vec::with_capacity(count);
        for position in Self::preferred_positions(candidates.len()) {
            let track = candidates[position - 1];
            let entry = self.entry(track)?;
            for sector in 0..entry.sectors() {
                if found.len() == count {
                    return Ok(found);
                }
                if entry.is_free(sector as u8) {
                    found.push(Location(track, sector as u8));
                }
            }
        }
        if found.len() < count {
            // Keep counting what remains so the error is informative.
            return Err(DiskError::NoFreeBlocks {
                needed: count,
                free: found.len(),
            });
        }
        Ok(found)
    }

    /// Reserve `count` blocks: the first `count` candidates have their map
    /// bits cleared and their track counts decremented.  The BAM is left
    /// unchanged on failure.
    pub fn allocate(&mut self, count: usize) -> Result<Vec<Location>> {
        let found = self.find_free(count)?;
        self.mark(&found, false)?;
        Ok(found)
    }

    /// Mark every listed block free or used, updating bitmap and
    /// free-sector counts together.  Marking a block used when it is
    /// already used rejects the whole operation without mutating anything;
    /// freeing a free block is a no-op.
    pub fn mark(&mut self, locations: &[Location], free: bool) -> Result<()> {
        for &location in locations {
            let Location(track, sector) = location;
            if !self.geometry.contains(location) {
                return Err(DiskError::GeometryError { track, sector });
            }
            if !free && !self.entry(track)?.is_free(sector) {
                return Err(DiskError::DoubleAlloc { track, sector });
            }
        }
        for &location in locations {
            self.entry_mut(location.0)?.set(location.1, free);
        }
        Ok(())
    }

    /// Set a single block's state without the double-allocation check.
    /// Used by directory sync and revalidation, which rebuild regions
    /// wholesale.
    pub(crate) fn set_block(&mut self, location: Location, free: bool) -> Result<()> {
        let Location(track, sector) = location;
        if !self.geometry.contains(location) {
            return Err(DiskError::GeometryError { track, sector });
        }
        self.entry_mut(track)?.set(sector, free);
        Ok(())
    }
}

impl fmt::Display for Bam {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for entry in &self.entries {
            write!(
                f,
                "t{:03}: [{:02}/{:02}] ",
                entry.track,
                entry.free_sectors(),
                entry.sectors()
            )?;
            for sector in 0..entry.sectors() {
                f.write_char(if entry.is_free(sector as u8) { '.' } else { 'x' })?;
            }
            f.write_char('\n')?;
        }
        writeln!(f, "{} blocks free.", self.blocks_free())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::geometry::{GEOMETRY_1541, GEOMETRY_1581, GEOMETRY_8050};

    fn check_invariants(bam: &Bam) {
        for entry in bam.entries() {
            assert_eq!(entry.free_sectors(), entry.popcount(), "track {}", entry.track);
        }
    }

    #[test]
    fn test_initialize_1541() {
        let bam = Bam::initialize(&GEOMETRY_1541);
        check_invariants(&bam);
        assert_eq!(bam.blocks_total(), 683);
        assert_eq!(bam.blocks_free(), 664);
        // Header sector is reserved, the rest of track 18 is free.
        assert!(!bam.block_available(Location(18, 0)).unwrap());
        for sector in 1..19 {
            assert!(bam.block_available(Location(18, sector)).unwrap());
        }
        assert_eq!(bam.entry(18).unwrap().free_sectors(), 18);
    }

    #[test]
    fn test_initialize_reserves_separate_bam_sectors() {
        let bam = Bam::initialize(&GEOMETRY_8050);
        check_invariants(&bam);
        assert!(!bam.block_available(Location(39, 0)).unwrap());
        assert!(!bam.block_available(Location(38, 0)).unwrap());
        assert!(!bam.block_available(Location(38, 3)).unwrap());
        assert!(bam.block_available(Location(38, 1)).unwrap());
        // 2083 total, minus the header track (29), minus two BAM sectors.
        assert_eq!(bam.blocks_free(), 2083 - 29 - 2);
    }

    #[test]
    fn test_preferred_order_starts_mid_disk() {
        let bam = Bam::initialize(&GEOMETRY_1541);
        let first = bam.find_free(1).unwrap();
        assert_eq!(first, vec![Location(9, 0)]);
    }

    #[test]
    fn test_preferred_positions_cover_everything_once() {
        for n in 1..200 {
            let mut positions = Bam::preferred_positions(n);
            positions.sort_unstable();
            assert_eq!(positions, (1..=n).collect::<Vec<_>>(), "n={}", n);
        }
    }

    #[test]
    fn test_allocate_and_exhaust() {
        let mut bam = Bam::initialize(&GEOMETRY_1541);
        let some = bam.allocate(10).unwrap();
        assert_eq!(some.len(), 10);
        check_invariants(&bam);
        assert_eq!(bam.blocks_free(), 654);

        // Asking for more than remains must fail without mutating.
        let before = bam.clone();
        match bam.allocate(655) {
            Err(DiskError::NoFreeBlocks { needed: 655, free: 654 }) => {}
            other => panic!("unexpected result: {:?}", other.map(|v| v.len())),
        }
        assert_eq!(bam, before);

        let rest = bam.allocate(654).unwrap();
        assert_eq!(rest.len(), 654);
        assert_eq!(bam.blocks_free(), 0);
        check_invariants(&bam);
    }

    #[test]
    fn test_mark_rejects_double_allocation() {
        let mut bam = Bam::initialize(&GEOMETRY_1541);
        let list = vec![Location(1, 0), Location(1, 1)];
        bam.mark(&list, false).unwrap();
        let before = bam.clone();
        // One of the blocks is fresh, but the other is already used; the
        // whole operation must be rejected.
        match bam.mark(&[Location(1, 2), Location(1, 1)], false) {
            Err(DiskError::DoubleAlloc { track: 1, sector: 1 }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(bam, before);
    }

    #[test]
    fn test_mark_free_then_used_restores() {
        let mut bam = Bam::initialize(&GEOMETRY_1541);
        let before = bam.clone();
        let list = bam.find_free(7).unwrap();
        bam.mark(&list, false).unwrap();
        assert_ne!(bam, before);
        bam.mark(&list, true).unwrap();
        assert_eq!(bam, before);
        check_invariants(&bam);
    }

    #[test]
    fn test_sync_parse_round_trip() {
        let mut blocks = BlockMap::blank(GEOMETRY_1541);
        let mut bam = Bam::initialize(&GEOMETRY_1541);
        bam.allocate(20).unwrap();
        bam.sync(&mut blocks).unwrap();
        let reread = Bam::parse(&blocks).unwrap();
        assert_eq!(reread, bam);
    }

    #[test]
    fn test_sync_chains_interleaved_bam_sectors() {
        let mut blocks = BlockMap::blank(GEOMETRY_1581);
        let bam = Bam::initialize(&GEOMETRY_1581);
        bam.sync(&mut blocks).unwrap();
        // First BAM sector links to the second; the final link is cleared.
        assert_eq!(blocks.block(Location(40, 1)).unwrap()[..2], [40, 2]);
        assert_eq!(blocks.block(Location(40, 2)).unwrap()[..2], [0, 0]);
        let reread = Bam::parse(&blocks).unwrap();
        assert_eq!(reread, bam);
    }
}
