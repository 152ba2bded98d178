//! Walking and building T/S link chains.
//!
//! Files and directories are linked lists of sectors: the first two bytes of
//! every block either point at the next block or, when the track byte is
//! zero, mark the tail and say how much of the final block is used.  A tail
//! byte of L means offsets 2..=L are valid, so the final payload is L-1
//! bytes long.

use std::collections::HashSet;

use crate::disk::block::{BlockMap, Location, BLOCK_SIZE};
use crate::disk::error::{DiskError, Result};

/// Payload bytes per block, after the two link bytes.
pub const PAYLOAD_SIZE: usize = BLOCK_SIZE - 2;

/// Follow T/S links from `start`, returning the ordered block list.  The
/// final block (the one whose own next-track byte is zero) is included.
/// Walking stops early once `max` blocks have been collected.
pub fn walk(blocks: &BlockMap, start: Location, max: Option<usize>) -> Result<Vec<Location>> {
    let mut locations = Vec::new();
    let mut visited = HashSet::new();
    let mut current = start;
    loop {
        if let Some(max) = max {
            if locations.len() == max {
                return Ok(locations);
            }
        }
        if !visited.insert(current) {
            return Err(DiskError::InvalidImage(format!(
                "cyclic sector chain at {}",
                current
            )));
        }
        let link = blocks.read_link(current)?;
        locations.push(current);
        if link.0 == 0 {
            return Ok(locations);
        }
        current = link;
    }
}

/// Follow a file chain from `start` and return the concatenated payload.
/// Full blocks contribute 254 bytes; the final block is truncated to its
/// tail byte minus one.
pub fn read_data(blocks: &BlockMap, start: Location, max: Option<usize>) -> Result<Vec<u8>> {
    let locations = walk(blocks, start, max)?;
    let mut data = Vec::with_capacity(locations.len() * PAYLOAD_SIZE);
    for (i, location) in locations.iter().enumerate() {
        let block = blocks.block(*location)?;
        let used = if i + 1 == locations.len() {
            let tail = blocks.read_link(*location)?;
            if tail.0 != 0 {
                // `max` stopped the walk mid-chain; take the whole block.
                PAYLOAD_SIZE
            } else {
                if tail.1 < 1 {
                    return Err(DiskError::InvalidImage(format!(
                        "bad chain tail byte at {}",
                        location
                    )));
                }
                tail.1 as usize - 1
            }
        } else {
            PAYLOAD_SIZE
        };
        data.extend_from_slice(&block[2..2 + used]);
    }
    Ok(data)
}

/// Split a byte payload into the per-block chunks a new chain will store.
/// The last chunk may be shorter; an empty payload yields no chunks.
pub fn split_payload(data: &[u8]) -> Vec<&[u8]> {
    data.chunks(PAYLOAD_SIZE).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::geometry::GEOMETRY_1541;

    fn chained_blocks() -> BlockMap {
        let mut blocks = BlockMap::blank(GEOMETRY_1541);
        // (1,0) -> (1,10) -> (2,5), tail using 41 bytes of payload.
        blocks.write_link(Location(1, 0), Location(1, 10)).unwrap();
        blocks.write_link(Location(1, 10), Location(2, 5)).unwrap();
        blocks.write_tail(Location(2, 5), 42).unwrap();
        for (i, location) in [Location(1, 0), Location(1, 10), Location(2, 5)]
            .iter()
            .enumerate()
        {
            let block = blocks.block_mut(*location).unwrap();
            for b in block[2..].iter_mut() {
                *b = (i + 1) as u8;
            }
        }
        blocks
    }

    #[test]
    fn test_walk() {
        let blocks = chained_blocks();
        assert_eq!(
            walk(&blocks, Location(1, 0), None).unwrap(),
            vec![Location(1, 0), Location(1, 10), Location(2, 5)]
        );
        assert_eq!(
            walk(&blocks, Location(1, 0), Some(2)).unwrap(),
            vec![Location(1, 0), Location(1, 10)]
        );
        assert_eq!(
            walk(&blocks, Location(2, 5), None).unwrap(),
            vec![Location(2, 5)]
        );
    }

    #[test]
    fn test_walk_detects_loops() {
        let mut blocks = chained_blocks();
        blocks.write_link(Location(2, 5), Location(1, 0)).unwrap();
        assert!(walk(&blocks, Location(1, 0), None).is_err());
    }

    #[test]
    fn test_read_data_truncates_tail() {
        let blocks = chained_blocks();
        let data = read_data(&blocks, Location(1, 0), None).unwrap();
        assert_eq!(data.len(), PAYLOAD_SIZE * 2 + 41);
        assert!(data[..PAYLOAD_SIZE].iter().all(|&b| b == 1));
        assert!(data[PAYLOAD_SIZE..PAYLOAD_SIZE * 2].iter().all(|&b| b == 2));
        assert!(data[PAYLOAD_SIZE * 2..].iter().all(|&b| b == 3));
    }

    #[test]
    fn test_read_data_rejects_zero_tail() {
        let mut blocks = chained_blocks();
        blocks.write_tail(Location(2, 5), 0).unwrap();
        assert!(read_data(&blocks, Location(1, 0), None).is_err());
    }

    #[test]
    fn test_split_payload() {
        assert!(split_payload(&[]).is_empty());
        let data = vec![0u8; PAYLOAD_SIZE * 2 + 1];
        let chunks = split_payload(&data);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), PAYLOAD_SIZE);
        assert_eq!(chunks[2].len(), 1);
        let exact = vec![0u8; PAYLOAD_SIZE];
        assert_eq!(split_payload(&exact).len(), 1);
    }
}
