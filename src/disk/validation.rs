//! BAM revalidation.
//!
//! The library analogue of the CBM DOS "v0:" validate command: rebuild the
//! BAM from what is actually reachable — the reserved system sectors, the
//! directory blocks, and every live file chain — and clear out tombstoned
//! directory slots.  Blocks that belonged to scratched files fall out of
//! the rebuilt map and become free again.

use log::warn;

use crate::disk::bam::Bam;
use crate::disk::block::BlockMap;
use crate::disk::chain;
use crate::disk::directory::{DirEntry, Directory};
use crate::disk::error::Result;

/// Rebuild the BAM and clear tombstones.  Returns the number of blocks
/// reclaimed (negative differences, from sectors that were occupied but
/// unallocated, count as zero).
pub fn revalidate(
    blocks: &BlockMap,
    directory: &mut Directory,
    bam: &mut Bam,
) -> Result<usize> {
    let geometry = blocks.geometry();
    let mut fresh = Bam::initialize(geometry);

    // The directory region, as the cache lays it out.
    for location in directory.occupied_block_locations() {
        if geometry.contains(location) {
            fresh.set_block(location, false)?;
        }
    }

    // Every chain reachable from a present entry.  A file whose chain
    // cannot be walked keeps its directory entry but contributes nothing to
    // the map; the error is surfaced as a diagnostic, as a real validate
    // would drop the file.
    for index in 0..directory.entries().len() {
        let entry = directory.entry(index)?;
        if !entry.is_present() {
            continue;
        }
        let mut starts = vec![];
        if entry.first.0 != 0 {
            starts.push(entry.first);
        }
        if entry.side_sector.0 != 0 {
            starts.push(entry.side_sector);
        }
        let name = entry.name.clone();
        for start in starts {
            match chain::walk(blocks, start, None) {
                Ok(locations) => {
                    for location in locations {
                        fresh.set_block(location, false)?;
                    }
                }
                Err(e) => warn!("validate: cannot scan {:?}: {}", name, e),
            }
        }
    }

    // Tombstones lose their slots once their blocks are reclaimed.
    for index in 0..directory.entries().len() {
        if directory.entry(index)?.is_tombstone() {
            *directory.entry_mut(index)? = DirEntry::free();
        }
    }

    let reclaimed = fresh.blocks_free().saturating_sub(bam.blocks_free());
    *bam = fresh;
    Ok(reclaimed)
}
