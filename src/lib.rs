//! This is a Rust library for reading, writing, creating, and mutating the
//! disk image files used by Commodore Business Machines (CBM) drives, from
//! the ubiquitous 1541 through the IEEE-488 floppy drives to the 9000-series
//! hard disk units.
//!
//! Features:
//!
//! * Create blank, formatted D64, D71, D81, D67, D80, D82, D93, D96, and
//!   D99 images, and load existing ones.
//! * One parametric geometry model covers every drive variant: track zones,
//!   BAM placement, interleaves, and the DOS type tag are data, not code.
//! * List directories, look files up by name or index, and extract or
//!   inject files as chains of 254-byte payload blocks.
//! * Allocate and free blocks in the Block Availability Map with the
//!   write-preferred track ordering, keeping the per-track free-sector
//!   counts consistent with the bitmaps.
//! * Rename and scratch files, create subdirectories, and rebuild the BAM
//!   with a validate pass that reclaims tombstoned blocks.
//! * Wrap and unwrap X64 containers, including fully custom layouts whose
//!   parameters are embedded in the 64-byte container header.
//! * Convert between PETSCII and ASCII for labels and filenames.
//!
//! Current shortcomings:
//!
//! * Relative (REL) file contents are not interpreted; their directory
//!   metadata is preserved verbatim.
//! * The 1571's spill-over BAM is approximated and flagged with a warning
//!   rather than written exactly.
//! * Error tables appended to images are carried along but not used.
//!
//! # Example
//!
//! The following creates a blank 1541 image, stores a program on it, and
//! reads it back:
//!
//! ```no_run
//! use cbmdisk::disk::file::Program;
//! use cbmdisk::disk::directory::FileType;
//! use cbmdisk::disk::geometry::GEOMETRY_1541;
//! use cbmdisk::disk::DiskImage;
//!
//! # fn main() -> cbmdisk::disk::Result<()> {
//! let mut disk = DiskImage::create("games.d64", &GEOMETRY_1541, "GAMES", "01")?;
//! let program = Program::new(
//!     "HELLO",
//!     FileType::Prg,
//!     chrono::Local::now().naive_local(),
//!     vec![0x01, 0x08, 0x0b, 0x08],
//! );
//! disk.write_program(&program)?;
//! assert_eq!(disk.read_program("HELLO")?.data, program.data);
//! disk.save()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Design of disk image access
//!
//! Support for disk images is layered:
//!
//! 1. `Image` provides the flat byte buffer backing a disk image.
//! 2. `BlockMap` divides the buffer into 256-byte blocks addressed by
//!    track and sector according to a `Geometry`, and owns the single
//!    site where 9000-series packed track links are encoded and decoded.
//! 3. `Header`, `Bam`, and `Directory` parse the metadata structures into
//!    caches which stay authoritative until `sync` writes them back.
//! 4. `DiskImage` ties the layers together and exposes the high-level
//!    operations.
//!
//! Everything is single-threaded and synchronous: an image is created or
//! loaded, mutated in place through `&mut`, and serialized by `save`.
//!
//! # License
//!
//! Distributed under the terms of both the MIT license and the Apache
//! License (Version 2.0).

pub mod disk;

mod petscii;

pub use crate::petscii::Petscii;
