//! Parametric drive geometries.
//!
//! Where earlier CBM tooling hard-wired one module per drive model, every
//! layout handled here is described by the same small set of parameters:
//! up to four track zones (each with its own sectors-per-track count), the
//! header/directory track, the BAM placement policy, interleave constants,
//! and the DOS type tag.  A dozen drive variants then collapse into a table
//! of constants, and the X64 container's "custom" layout is just one more
//! `Geometry` value whose parameters were read out of the container header
//! instead of this table.
//!
//! The per-track sector counts and header/BAM offsets below follow Peter
//! Schepers' format documents (D64.TXT, D71.TXT, D81.TXT and friends); the
//! 9000-series parameters follow the drive's published capacity.

use std::path::Path;

use crate::disk::block::Location;
use crate::disk::error::{DiskError, Result};

/// Drive models with a native image format, plus the X64 custom layout.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Device {
    Cbm1541,
    Cbm1571,
    Cbm1581,
    Cbm2040,
    Cbm8050,
    Cbm8250,
    Cbm9030,
    Cbm9060,
    Cbm9090,
    Custom,
}

/// Where a format keeps its Block Availability Map, relative to the header
/// sector.  The discriminants are the flag values used in X64 container
/// headers.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BamPlacement {
    /// BAM shares the header sector (1541 style).
    InHeader,
    /// BAM occupies the sectors immediately after the header sector on the
    /// same track (1581 style).
    FollowsHeader,
    /// BAM occupies sector 0 of the track preceding the header track
    /// (8050/8250 style).
    BeforeHeader,
    /// 1571 style: the second half of the BAM spills onto the reverse side.
    SecondSide,
    /// 9000-series: tracks outgrow a byte, so every T/S link carries a
    /// 10-bit track number with its top two bits packed into the sector
    /// byte.  The BAM sits on the track before the header track.
    PackedTracks,
}

impl BamPlacement {
    pub fn from_flag(flag: u8) -> Option<BamPlacement> {
        match flag {
            0x00 => Some(BamPlacement::InHeader),
            0x01 => Some(BamPlacement::FollowsHeader),
            0x02 => Some(BamPlacement::BeforeHeader),
            0x47 => Some(BamPlacement::SecondSide),
            0x5A => Some(BamPlacement::PackedTracks),
            _ => None,
        }
    }

    pub fn flag(self) -> u8 {
        match self {
            BamPlacement::InHeader => 0x00,
            BamPlacement::FollowsHeader => 0x01,
            BamPlacement::BeforeHeader => 0x02,
            BamPlacement::SecondSide => 0x47,
            BamPlacement::PackedTracks => 0x5A,
        }
    }
}

/// A contiguous range of tracks sharing one sectors-per-track count.  The
/// range ends at `last_track` inclusive; a zone with `last_track == 0` is
/// absent.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Zone {
    pub last_track: u16,
    pub sectors: u16,
}

/// The full parameter set describing one disk layout.  Immutable once
/// chosen; every image owns a copy and threads it into each operation.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Geometry {
    pub device: Device,
    pub format_tag: &'static str,
    /// Double-sided layouts mirror the zone table onto the second side.
    pub double_sided: bool,
    /// Two ASCII characters, e.g. "2A".
    pub dos_type: [u8; 2],
    pub header_track: u16,
    /// Offset of the disk label within the header sector.
    pub header_label_offset: usize,
    pub dir_interleave: u8,
    pub file_interleave: u8,
    /// Bytes of prefix (T/S link plus drive-specific bytes) at the start of
    /// each BAM sector, before the per-track rows begin.
    pub bam_label_offset: usize,
    pub zones: [Zone; 4],
    pub bam_interleave: u8,
    pub bam_placement: BamPlacement,
    /// Number of BAM sectors when they are separate from the header sector.
    /// Zero means the BAM is co-located on the header sector.
    pub bam_sectors: u8,
    /// Tracks described by each BAM sector; zero means all of them.
    pub tracks_per_bam_sector: u8,
    pub boot_track: u8,
}

impl Geometry {
    /// Number of tracks described by the zone table (one side).
    fn side_tracks(&self) -> u16 {
        self.zones
            .iter()
            .filter(|z| z.last_track != 0)
            .map(|z| z.last_track)
            .max()
            .unwrap_or(0)
    }

    /// Highest addressable track.
    pub fn track_count(&self) -> u16 {
        if self.double_sided {
            self.side_tracks() * 2
        } else {
            self.side_tracks()
        }
    }

    /// Sectors on the given track, or 0 if the track is out of range.
    pub fn sectors_per_track(&self, track: u16) -> u16 {
        let side = self.side_tracks();
        if track == 0 || track > self.track_count() {
            return 0;
        }
        // Fold second-side tracks back onto the zone table.
        let track = if track > side { track - side } else { track };
        for zone in self.zones.iter().filter(|z| z.last_track != 0) {
            if track <= zone.last_track {
                return zone.sectors;
            }
        }
        0
    }

    /// Total number of 256-byte sectors in the image.
    pub fn sector_count(&self) -> usize {
        (1..=self.track_count())
            .map(|t| self.sectors_per_track(t) as usize)
            .sum()
    }

    /// Image size in bytes, without any appended error table.
    pub fn byte_size(&self) -> usize {
        self.sector_count() * crate::disk::block::BLOCK_SIZE
    }

    pub fn max_sectors_in_track(&self) -> u16 {
        (1..=self.track_count())
            .map(|t| self.sectors_per_track(t))
            .max()
            .unwrap_or(0)
    }

    /// Bytes per track bitmap, excluding the leading free-sector-count byte.
    pub fn bam_sector_bytes(&self) -> usize {
        (self.max_sectors_in_track() as usize + 7) / 8
    }

    /// Total size of the serialized BAM rows across all tracks.
    pub fn bam_size(&self) -> usize {
        self.track_count() as usize * (self.bam_sector_bytes() + 1)
    }

    /// Location of the first BAM sector, per the placement policy.
    pub fn bam_position(&self) -> Location {
        match self.bam_placement {
            BamPlacement::InHeader => Location(self.header_track, 0),
            BamPlacement::FollowsHeader => Location(self.header_track, 1),
            BamPlacement::BeforeHeader => Location(self.header_track - 1, 0),
            BamPlacement::SecondSide => Location(self.header_track, 0),
            BamPlacement::PackedTracks => Location(self.header_track - 1, 0),
        }
    }

    /// How many sectors the BAM actually occupies (a co-located BAM still
    /// occupies its one header sector).
    pub fn bam_sector_count(&self) -> usize {
        (self.bam_sectors as usize).max(1)
    }

    /// The sectors holding BAM rows, in row order.
    pub fn bam_sector_locations(&self) -> Vec<Location> {
        let Location(track, first) = self.bam_position();
        (0..self.bam_sector_count())
            .map(|k| Location(track, first + (k as u8) * self.bam_interleave))
            .collect()
    }

    pub fn tracks_per_bam_sector_or_all(&self) -> usize {
        if self.tracks_per_bam_sector == 0 {
            self.track_count() as usize
        } else {
            self.tracks_per_bam_sector as usize
        }
    }

    /// First directory sector on the header track: right after the BAM when
    /// the BAM follows the header, otherwise sector 1.
    pub fn dir_sector_offset(&self) -> u8 {
        match self.bam_placement {
            BamPlacement::FollowsHeader => 1 + self.bam_sectors,
            _ => 1,
        }
    }

    pub fn first_dir_location(&self) -> Location {
        Location(self.header_track, self.dir_sector_offset())
    }

    pub fn header_location(&self) -> Location {
        Location(self.header_track, 0)
    }

    /// True when T/S links carry 10-bit tracks packed into the sector byte.
    #[inline]
    pub fn packed_links(&self) -> bool {
        self.bam_placement == BamPlacement::PackedTracks
    }

    #[inline]
    pub fn contains(&self, location: Location) -> bool {
        location.0 >= 1 && (location.1 as u16) < self.sectors_per_track(location.0)
    }

    /// Linear sector index of `(track, sector)`: the cumulative zone extents
    /// up to but not including the track, plus the sector number.
    pub fn sector_offset(&self, location: Location) -> Result<usize> {
        let Location(track, sector) = location;
        if !self.contains(location) {
            return Err(DiskError::GeometryError { track, sector });
        }
        let mut offset = 0usize;
        for t in 1..track {
            offset += self.sectors_per_track(t) as usize;
        }
        Ok(offset + sector as usize)
    }

    /// Select a geometry from an image filename extension.  `.x64` files
    /// carry their own geometry and are handled by the container code.
    pub fn from_extension<P: AsRef<Path>>(path: P) -> Option<&'static Geometry> {
        let extension = path
            .as_ref()
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase())?;
        match extension.as_str() {
            "d64" => Some(&GEOMETRY_1541),
            "d71" => Some(&GEOMETRY_1571),
            "d81" => Some(&GEOMETRY_1581),
            "d67" | "d40" => Some(&GEOMETRY_2040),
            "d80" => Some(&GEOMETRY_8050),
            "d82" => Some(&GEOMETRY_8250),
            "d93" => Some(&GEOMETRY_9030),
            "d96" => Some(&GEOMETRY_9060),
            "d99" => Some(&GEOMETRY_9090),
            _ => None,
        }
    }

    /// Select a geometry from an X64 container device byte.
    pub fn from_device_byte(device: u8) -> Option<&'static Geometry> {
        match device {
            0x00 | 0x01 | 0x02 | 0x03 => Some(&GEOMETRY_1541),
            0x05 | 0x06 => Some(&GEOMETRY_1571),
            0x08 => Some(&GEOMETRY_1581),
            0x10 | 0x11 => Some(&GEOMETRY_2040),
            0x20 | 0x21 => Some(&GEOMETRY_8050),
            0x30 | 0x31 => Some(&GEOMETRY_8250),
            0x40 => Some(&GEOMETRY_9030),
            0x41 => Some(&GEOMETRY_9060),
            0x42 => Some(&GEOMETRY_9090),
            _ => None,
        }
    }

    /// The canonical X64 device byte for this geometry.
    pub fn device_byte(&self) -> u8 {
        match self.device {
            Device::Cbm1541 => 0x01,
            Device::Cbm1571 => 0x05,
            Device::Cbm1581 => 0x08,
            Device::Cbm2040 => 0x11,
            Device::Cbm8050 => 0x20,
            Device::Cbm8250 => 0x31,
            Device::Cbm9030 => 0x40,
            Device::Cbm9060 => 0x41,
            Device::Cbm9090 => 0x42,
            Device::Custom => 0xFF,
        }
    }

    /// The DOS type pair as a single byte, e.g. "2A" -> 0x2A.  This is the
    /// encoding used in X64 container headers.
    pub fn dos_type_byte(&self) -> u8 {
        let nibble = |c: u8| (c as char).to_digit(16).unwrap_or(0) as u8;
        (nibble(self.dos_type[0]) << 4) | nibble(self.dos_type[1])
    }

    pub(crate) fn dos_type_from_byte(byte: u8) -> [u8; 2] {
        const HEX: &[u8; 16] = b"0123456789ABCDEF";
        [HEX[(byte >> 4) as usize], HEX[(byte & 0x0F) as usize]]
    }
}

pub static GEOMETRY_1541: Geometry = Geometry {
    device: Device::Cbm1541,
    format_tag: "D64",
    double_sided: false,
    dos_type: *b"2A",
    header_track: 18,
    header_label_offset: 0x90,
    dir_interleave: 3,
    file_interleave: 10,
    bam_label_offset: 4,
    zones: [
        Zone { last_track: 17, sectors: 21 },
        Zone { last_track: 24, sectors: 19 },
        Zone { last_track: 30, sectors: 18 },
        Zone { last_track: 35, sectors: 17 },
    ],
    bam_interleave: 0,
    bam_placement: BamPlacement::InHeader,
    bam_sectors: 0,
    tracks_per_bam_sector: 35,
    boot_track: 0,
};

pub static GEOMETRY_1571: Geometry = Geometry {
    device: Device::Cbm1571,
    format_tag: "D71",
    double_sided: true,
    dos_type: *b"2A",
    header_track: 18,
    header_label_offset: 0x90,
    dir_interleave: 3,
    file_interleave: 6,
    bam_label_offset: 4,
    zones: [
        Zone { last_track: 17, sectors: 21 },
        Zone { last_track: 24, sectors: 19 },
        Zone { last_track: 30, sectors: 18 },
        Zone { last_track: 35, sectors: 17 },
    ],
    bam_interleave: 0,
    bam_placement: BamPlacement::SecondSide,
    bam_sectors: 2,
    tracks_per_bam_sector: 35,
    boot_track: 0,
};

pub static GEOMETRY_1581: Geometry = Geometry {
    device: Device::Cbm1581,
    format_tag: "D81",
    double_sided: false,
    dos_type: *b"3D",
    header_track: 40,
    header_label_offset: 0x04,
    dir_interleave: 1,
    file_interleave: 1,
    bam_label_offset: 16,
    zones: [
        Zone { last_track: 80, sectors: 40 },
        Zone { last_track: 0, sectors: 0 },
        Zone { last_track: 0, sectors: 0 },
        Zone { last_track: 0, sectors: 0 },
    ],
    bam_interleave: 1,
    bam_placement: BamPlacement::FollowsHeader,
    bam_sectors: 2,
    tracks_per_bam_sector: 40,
    boot_track: 0,
};

pub static GEOMETRY_2040: Geometry = Geometry {
    device: Device::Cbm2040,
    format_tag: "D67",
    double_sided: false,
    dos_type: *b"2A",
    header_track: 18,
    header_label_offset: 0x90,
    dir_interleave: 3,
    file_interleave: 10,
    bam_label_offset: 4,
    zones: [
        Zone { last_track: 17, sectors: 21 },
        Zone { last_track: 24, sectors: 20 },
        Zone { last_track: 30, sectors: 18 },
        Zone { last_track: 35, sectors: 17 },
    ],
    bam_interleave: 0,
    bam_placement: BamPlacement::InHeader,
    bam_sectors: 0,
    tracks_per_bam_sector: 35,
    boot_track: 0,
};

pub static GEOMETRY_8050: Geometry = Geometry {
    device: Device::Cbm8050,
    format_tag: "D80",
    double_sided: false,
    dos_type: *b"2C",
    header_track: 39,
    header_label_offset: 0x06,
    dir_interleave: 3,
    file_interleave: 5,
    bam_label_offset: 6,
    zones: [
        Zone { last_track: 39, sectors: 29 },
        Zone { last_track: 53, sectors: 27 },
        Zone { last_track: 64, sectors: 25 },
        Zone { last_track: 77, sectors: 23 },
    ],
    bam_interleave: 3,
    bam_placement: BamPlacement::BeforeHeader,
    bam_sectors: 2,
    tracks_per_bam_sector: 50,
    boot_track: 0,
};

pub static GEOMETRY_8250: Geometry = Geometry {
    device: Device::Cbm8250,
    format_tag: "D82",
    double_sided: true,
    dos_type: *b"2C",
    header_track: 39,
    header_label_offset: 0x06,
    dir_interleave: 3,
    file_interleave: 5,
    bam_label_offset: 6,
    zones: [
        Zone { last_track: 39, sectors: 29 },
        Zone { last_track: 53, sectors: 27 },
        Zone { last_track: 64, sectors: 25 },
        Zone { last_track: 77, sectors: 23 },
    ],
    bam_interleave: 3,
    bam_placement: BamPlacement::BeforeHeader,
    bam_sectors: 4,
    tracks_per_bam_sector: 50,
    boot_track: 0,
};

pub static GEOMETRY_9030: Geometry = Geometry {
    device: Device::Cbm9030,
    format_tag: "D93",
    double_sided: false,
    dos_type: *b"3A",
    header_track: 153,
    header_label_offset: 0x06,
    dir_interleave: 3,
    file_interleave: 10,
    bam_label_offset: 6,
    zones: [
        Zone { last_track: 306, sectors: 32 },
        Zone { last_track: 0, sectors: 0 },
        Zone { last_track: 0, sectors: 0 },
        Zone { last_track: 0, sectors: 0 },
    ],
    bam_interleave: 1,
    bam_placement: BamPlacement::PackedTracks,
    bam_sectors: 7,
    tracks_per_bam_sector: 50,
    boot_track: 0,
};

pub static GEOMETRY_9060: Geometry = Geometry {
    device: Device::Cbm9060,
    format_tag: "D96",
    double_sided: false,
    dos_type: *b"3A",
    header_track: 306,
    header_label_offset: 0x06,
    dir_interleave: 3,
    file_interleave: 10,
    bam_label_offset: 6,
    zones: [
        Zone { last_track: 612, sectors: 32 },
        Zone { last_track: 0, sectors: 0 },
        Zone { last_track: 0, sectors: 0 },
        Zone { last_track: 0, sectors: 0 },
    ],
    bam_interleave: 1,
    bam_placement: BamPlacement::PackedTracks,
    bam_sectors: 13,
    tracks_per_bam_sector: 50,
    boot_track: 0,
};

pub static GEOMETRY_9090: Geometry = Geometry {
    device: Device::Cbm9090,
    format_tag: "D99",
    double_sided: false,
    dos_type: *b"3A",
    header_track: 459,
    header_label_offset: 0x06,
    dir_interleave: 3,
    file_interleave: 10,
    bam_label_offset: 6,
    zones: [
        Zone { last_track: 918, sectors: 32 },
        Zone { last_track: 0, sectors: 0 },
        Zone { last_track: 0, sectors: 0 },
        Zone { last_track: 0, sectors: 0 },
    ],
    bam_interleave: 1,
    bam_placement: BamPlacement::PackedTracks,
    bam_sectors: 19,
    tracks_per_bam_sector: 50,
    boot_track: 0,
};

/// The layout parameters a caller supplies to create a custom image.  These
/// are exactly the parameters that travel in the X64 container header, so a
/// custom image re-opens with the same geometry it was created with.
#[derive(Clone, Copy, Debug)]
pub struct CustomLayout {
    /// DOS type pair as a byte, e.g. 0x2A for "2A".
    pub dos_type: u8,
    pub header_track: u8,
    pub header_label_offset: u8,
    pub dir_interleave: u8,
    pub file_interleave: u8,
    pub bam_label_offset: u8,
    pub zones: [Zone; 4],
    pub bam_interleave: u8,
    pub bam_placement: BamPlacement,
    pub bam_sectors: u8,
    pub tracks_per_bam_sector: u8,
    pub boot_track: u8,
    pub double_sided: bool,
}

impl CustomLayout {
    pub fn into_geometry(self) -> Result<Geometry> {
        let geometry = Geometry {
            device: Device::Custom,
            format_tag: "X64",
            double_sided: self.double_sided,
            dos_type: Geometry::dos_type_from_byte(self.dos_type),
            header_track: self.header_track as u16,
            header_label_offset: self.header_label_offset as usize,
            dir_interleave: self.dir_interleave,
            file_interleave: self.file_interleave,
            bam_label_offset: self.bam_label_offset as usize,
            zones: self.zones,
            bam_interleave: self.bam_interleave,
            bam_placement: self.bam_placement,
            bam_sectors: self.bam_sectors,
            tracks_per_bam_sector: self.tracks_per_bam_sector,
            boot_track: self.boot_track,
        };
        if geometry.track_count() == 0 || geometry.sector_count() == 0 {
            return Err(DiskError::InvalidImage("custom layout has no tracks".into()));
        }
        if geometry.header_track == 0 || geometry.header_track > geometry.track_count() {
            return Err(DiskError::InvalidImage(
                "custom layout header track out of range".into(),
            ));
        }
        if !geometry.contains(geometry.bam_position()) {
            return Err(DiskError::InvalidImage(
                "custom layout BAM position out of range".into(),
            ));
        }
        Ok(geometry)
    }
}
