//! The X64 container format.
//!
//! An X64 file is a native disk image prefixed by a 64-byte header that
//! names the drive the image belongs to.  Device 0xFF means the header
//! itself carries a full parametric layout description, which is how images
//! with non-canonical geometries survive a save/load round trip.

use log::debug;

use crate::disk::error::{DiskError, Result};
use crate::disk::geometry::{BamPlacement, CustomLayout, Geometry, Zone};

pub const HEADER_SIZE: usize = 64;
pub const SIGNATURE: [u8; 4] = [0x43, 0x15, 0x41, 0x64];

const VERSION_MAJOR_OFFSET: usize = 4;
const VERSION_MINOR_OFFSET: usize = 5;
const DEVICE_OFFSET: usize = 6;
const TRACKS_OFFSET: usize = 7;
const SIDES_OFFSET: usize = 8;
const ERROR_DATA_OFFSET: usize = 9;
/// The custom geometry parameter block occupies bytes 10..32.
const PARAMS_OFFSET: usize = 10;

const CUSTOM_DEVICE: u8 = 0xFF;

/// Does the buffer start with the X64 signature?
pub fn has_signature(bytes: &[u8]) -> bool {
    bytes.len() >= SIGNATURE.len() && bytes[..SIGNATURE.len()] == SIGNATURE
}

/// Parse an X64 header, returning the geometry it selects and the offset of
/// the first image byte.
pub fn unwrap(bytes: &[u8]) -> Result<(Geometry, usize)> {
    if bytes.len() < HEADER_SIZE {
        return Err(DiskError::InvalidImage(
            "container shorter than its own header".into(),
        ));
    }
    if !has_signature(bytes) {
        return Err(DiskError::InvalidImage("bad container signature".into()));
    }
    if bytes[VERSION_MAJOR_OFFSET] != 1 || bytes[VERSION_MINOR_OFFSET] < 1 {
        return Err(DiskError::InvalidImage(format!(
            "unsupported container version {}.{}",
            bytes[VERSION_MAJOR_OFFSET], bytes[VERSION_MINOR_OFFSET]
        )));
    }
    if bytes[ERROR_DATA_OFFSET] != 0 {
        // Read but not acted upon; error tables ride along as trailing
        // bytes.
        debug!("container flags error data present");
    }
    let device = bytes[DEVICE_OFFSET];
    let geometry = if device == CUSTOM_DEVICE {
        decode_custom(bytes)?
    } else {
        *Geometry::from_device_byte(device).ok_or_else(|| {
            DiskError::InvalidImage(format!("unknown container device 0x{:02X}", device))
        })?
    };
    Ok((geometry, HEADER_SIZE))
}

/// Prefix an image with an X64 header describing its geometry.
pub fn wrap(geometry: &Geometry, body: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0u8; HEADER_SIZE + body.len()];
    bytes[..SIGNATURE.len()].copy_from_slice(&SIGNATURE);
    bytes[VERSION_MAJOR_OFFSET] = 1;
    bytes[VERSION_MINOR_OFFSET] = 1;
    bytes[DEVICE_OFFSET] = geometry.device_byte();
    bytes[TRACKS_OFFSET] = geometry.track_count().min(255) as u8;
    bytes[SIDES_OFFSET] = if geometry.double_sided { 2 } else { 1 };
    bytes[ERROR_DATA_OFFSET] = 0;
    if geometry.device_byte() == CUSTOM_DEVICE {
        encode_custom(geometry, &mut bytes);
    } else {
        bytes[PARAMS_OFFSET] = geometry.dos_type_byte();
    }
    bytes[HEADER_SIZE..].copy_from_slice(body);
    bytes
}

/// Decode the 22-byte custom geometry parameter block.
fn decode_custom(header: &[u8]) -> Result<Geometry> {
    let p = &header[PARAMS_OFFSET..PARAMS_OFFSET + 22];
    let placement = BamPlacement::from_flag(p[15]).ok_or_else(|| {
        DiskError::InvalidImage(format!("unknown BAM location flag 0x{:02X}", p[15]))
    })?;
    let mut zones = [Zone::default(); 4];
    for (i, zone) in zones.iter_mut().enumerate() {
        *zone = decode_zone(p[6 + i * 2], p[7 + i * 2], placement);
    }
    CustomLayout {
        dos_type: p[0],
        header_track: p[1],
        header_label_offset: p[2],
        dir_interleave: p[3],
        file_interleave: p[4],
        bam_label_offset: p[5],
        zones,
        bam_interleave: p[14],
        bam_placement: placement,
        bam_sectors: p[16],
        tracks_per_bam_sector: p[17],
        boot_track: p[21],
        double_sided: header[SIDES_OFFSET] == 2,
    }
    .into_geometry()
}

/// Encode the custom geometry parameter block into a header buffer.
fn encode_custom(geometry: &Geometry, header: &mut [u8]) {
    let placement = geometry.bam_placement;
    {
        let p = &mut header[PARAMS_OFFSET..PARAMS_OFFSET + 22];
        p[0] = geometry.dos_type_byte();
        p[1] = geometry.header_track as u8;
        p[2] = geometry.header_label_offset as u8;
        p[3] = geometry.dir_interleave;
        p[4] = geometry.file_interleave;
        p[5] = geometry.bam_label_offset as u8;
        for (i, zone) in geometry.zones.iter().enumerate() {
            let (track, sectors) = encode_zone(zone, placement);
            p[6 + i * 2] = track;
            p[7 + i * 2] = sectors;
        }
        p[14] = geometry.bam_interleave;
        p[15] = placement.flag();
        p[16] = geometry.bam_sectors;
        p[17] = geometry.tracks_per_bam_sector;
        p[18] = 0;
        p[19] = 0;
        p[20] = 0;
        p[21] = geometry.boot_track;
    }
}

/// A zone travels as two bytes.  Under the packed-tracks flag the high two
/// bits of the sector byte extend the track number to 10 bits; otherwise a
/// zero sector byte on a populated zone means 256 sectors per track.
fn decode_zone(track_byte: u8, sectors_byte: u8, placement: BamPlacement) -> Zone {
    if placement == BamPlacement::PackedTracks {
        Zone {
            last_track: track_byte as u16 + (((sectors_byte >> 6) as u16) << 8),
            sectors: (sectors_byte & 0x3F) as u16,
        }
    } else {
        let sectors = if sectors_byte == 0 && track_byte != 0 {
            256
        } else {
            sectors_byte as u16
        };
        Zone {
            last_track: track_byte as u16,
            sectors,
        }
    }
}

fn encode_zone(zone: &Zone, placement: BamPlacement) -> (u8, u8) {
    if placement == BamPlacement::PackedTracks {
        (
            (zone.last_track & 0xFF) as u8,
            (zone.sectors as u8 & 0x3F) | ((((zone.last_track >> 8) & 0x03) as u8) << 6),
        )
    } else {
        let sectors = if zone.sectors == 256 {
            0
        } else {
            zone.sectors as u8
        };
        (zone.last_track as u8, sectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::geometry::{Device, GEOMETRY_1581};

    fn weird_layout() -> CustomLayout {
        CustomLayout {
            dos_type: 0x3A,
            header_track: 1,
            header_label_offset: 0x90,
            dir_interleave: 1,
            file_interleave: 11,
            bam_label_offset: 4,
            zones: [
                Zone { last_track: 35, sectors: 17 },
                Zone::default(),
                Zone::default(),
                Zone::default(),
            ],
            bam_interleave: 0,
            bam_placement: BamPlacement::InHeader,
            bam_sectors: 0,
            tracks_per_bam_sector: 0,
            boot_track: 0,
            double_sided: false,
        }
    }

    #[test]
    fn test_signature_detection() {
        assert!(has_signature(&[0x43, 0x15, 0x41, 0x64, 0, 0]));
        assert!(!has_signature(&[0x43, 0x15, 0x41]));
        assert!(!has_signature(b"C15Ad..."));
    }

    #[test]
    fn test_custom_round_trip() {
        let geometry = weird_layout().into_geometry().unwrap();
        let body = vec![0u8; geometry.byte_size()];
        let wrapped = wrap(&geometry, &body);
        assert_eq!(wrapped.len(), HEADER_SIZE + body.len());
        let (reread, offset) = unwrap(&wrapped).unwrap();
        assert_eq!(offset, HEADER_SIZE);
        assert_eq!(reread, geometry);
    }

    #[test]
    fn test_standard_device_selection() {
        let body = vec![0u8; GEOMETRY_1581.byte_size()];
        let wrapped = wrap(&GEOMETRY_1581, &body);
        assert_eq!(wrapped[DEVICE_OFFSET], 0x08);
        assert_eq!(wrapped[PARAMS_OFFSET], 0x3D);
        let (geometry, _) = unwrap(&wrapped).unwrap();
        assert_eq!(geometry.device, Device::Cbm1581);
    }

    #[test]
    fn test_packed_zone_reinterpretation() {
        // 918 tracks does not fit a byte: the top bits travel in the sector
        // byte under the packed-tracks flag.
        let zone = Zone { last_track: 918, sectors: 32 };
        let (t, s) = encode_zone(&zone, BamPlacement::PackedTracks);
        assert_eq!(t, 0x96);
        assert_eq!(s, 0xE0);
        assert_eq!(decode_zone(t, s, BamPlacement::PackedTracks), zone);
    }

    #[test]
    fn test_zone_spt_zero_means_256() {
        let zone = decode_zone(10, 0, BamPlacement::InHeader);
        assert_eq!(zone.sectors, 256);
        assert_eq!(encode_zone(&zone, BamPlacement::InHeader), (10, 0));
        // An absent zone stays absent.
        assert_eq!(
            decode_zone(0, 0, BamPlacement::InHeader),
            Zone::default()
        );
    }

    #[test]
    fn test_rejects_bad_headers() {
        let geometry = weird_layout().into_geometry().unwrap();
        let mut wrapped = wrap(&geometry, &vec![0u8; geometry.byte_size()]);
        wrapped[0] = 0x44;
        assert!(unwrap(&wrapped).is_err());
        wrapped[0] = 0x43;
        wrapped[VERSION_MAJOR_OFFSET] = 2;
        assert!(unwrap(&wrapped).is_err());
        wrapped[VERSION_MAJOR_OFFSET] = 1;
        wrapped[PARAMS_OFFSET + 15] = 0x33; // bogus BAM location flag
        assert!(unwrap(&wrapped).is_err());
        assert!(unwrap(&wrapped[..32]).is_err());
    }
}
