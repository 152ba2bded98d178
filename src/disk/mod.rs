//! Traits, structs, and functions relating to CBM disk images.
//!
//! This module supports the byte-for-byte image formats written by the
//! Commodore drive families:
//!
//! 1. **D64/D71/D81** — the 1541, 1571, and 1581 serial-bus drives.
//! 2. **D67/D80/D82** — the IEEE-488 floppy drives (2040, 8050, 8250).
//! 3. **D93/D96/D99** — the 9030/9060/9090 hard disk units, whose track
//!    numbers outgrow a byte and get the packed-track link treatment.
//! 4. **X64** — any of the above wrapped in a 64-byte container header,
//!    including fully parametric custom layouts.
//!
//! Access is layered the same way the formats are:
//!
//! 1. [`Image`] is the flat byte buffer.
//! 2. [`BlockMap`](block::BlockMap) divides it into 256-byte blocks
//!    addressed by track and sector according to a
//!    [`Geometry`](geometry::Geometry).
//! 3. [`Header`](header::Header), [`Bam`](bam::Bam), and
//!    [`Directory`](directory::Directory) are the parsed caches of the
//!    three metadata structures.  They are authoritative once parsed; the
//!    buffer reflects them again only after `sync`.
//! 4. [`DiskImage`] owns all of the above and carries the high-level
//!    operations: create, load, save, read and write stored files, rename,
//!    scratch, validate.
//!
//! CBM DOS numbers tracks from 1, which causes no end of implementation
//! confusion; the API keeps the 1-based convention throughout.

pub mod bam;
pub mod block;
pub mod chain;
pub mod directory;
pub mod file;
pub mod geometry;
pub mod header;
pub mod validation;
pub mod x64;

mod error;
mod image;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use log::info;

use crate::disk::bam::Bam;
use crate::disk::block::{encode_link, BlockMap, BLOCK_SIZE};
use crate::disk::directory::{DirEntry, Directory, FileType, ENTRY_SIZE, FILENAME_SIZE};
use crate::disk::file::Program;
use crate::disk::geometry::{CustomLayout, Device, Geometry};
use crate::disk::header::Header;
use crate::petscii::Petscii;

pub use self::block::Location;
pub use self::error::{DiskError, Result};
pub use self::image::Image;

/// Two-byte identifiers (disk ID, DOS type) shown as PETSCII strings.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Id([u8; 2]);

impl Id {
    /// Best-effort: the first two bytes, zero-filled when short.
    pub fn from_bytes(bytes: &[u8]) -> Id {
        Id([
            bytes.first().copied().unwrap_or(0),
            bytes.get(1).copied().unwrap_or(0),
        ])
    }

    pub fn from_petscii(petscii: &Petscii) -> Id {
        Id::from_bytes(petscii.as_bytes())
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; 2] {
        &self.0
    }
}

impl From<&str> for Id {
    fn from(string: &str) -> Id {
        Id::from_petscii(&Petscii::from_str(string))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", Petscii::from_bytes(&self.0))
    }
}

/// A mutable disk image: the backing byte buffer plus the parsed header,
/// BAM, and directory caches.
///
/// The caches are the authoritative state between `load`/`create` and
/// `save`; mutations never re-parse the buffer.  `sync` writes the caches
/// back in the order header, directory, BAM — directory sync may allocate
/// fresh directory blocks, and those must be visible before the BAM
/// serializes.
pub struct DiskImage {
    path: Option<PathBuf>,
    blocks: BlockMap,
    header: Header,
    bam: Bam,
    directory: Directory,
}

impl DiskImage {
    /// Create a blank, formatted image for the given geometry.  Nothing is
    /// written to disk until `save`.
    pub fn create<P: AsRef<Path>>(
        path: P,
        geometry: &Geometry,
        label: &str,
        id: &str,
    ) -> Result<DiskImage> {
        let mut blocks = BlockMap::blank(*geometry);

        // A few native touches outside the parsed fields, so a fresh image
        // matches what a drive formats: the header sector points at the
        // first directory sector and carries the diskette format type, and
        // the first directory block is an empty, fully-used tail.
        let header_location = geometry.header_location();
        blocks.write_link(header_location, geometry.first_dir_location())?;
        blocks.block_mut(header_location)?[2] = geometry.dos_type[1];
        blocks.write_tail(geometry.first_dir_location(), 0xFF)?;

        let mut disk = DiskImage {
            path: Some(path.as_ref().to_path_buf()),
            blocks,
            header: Header::new(label, id, geometry.dos_type),
            bam: Bam::initialize(geometry),
            directory: Directory::new(geometry),
        };
        disk.sync()?;
        info!(
            "created blank {} image ({} blocks)",
            geometry.format_tag,
            disk.bam.blocks_total()
        );
        Ok(disk)
    }

    /// Create a blank image with a caller-supplied layout.  The layout is
    /// preserved by wrapping the image in an X64 container on save.
    pub fn create_custom<P: AsRef<Path>>(
        path: P,
        label: &str,
        id: &str,
        layout: CustomLayout,
    ) -> Result<DiskImage> {
        let geometry = layout.into_geometry()?;
        Self::create(path, &geometry, label, id)
    }

    /// Load an image file: unwrap the X64 container if present, select the
    /// geometry by container device or filename extension, and parse the
    /// header, BAM, and directory.  Nothing is returned on failure.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<DiskImage> {
        let path = path.as_ref();
        let raw = Image::open(path)?;
        let (geometry, body_offset) = if x64::has_signature(raw.as_bytes()) {
            x64::unwrap(raw.as_bytes())?
        } else {
            let geometry = Geometry::from_extension(path).ok_or_else(|| {
                DiskError::InvalidImage(format!(
                    "cannot determine the image type of {}",
                    path.display()
                ))
            })?;
            (*geometry, 0)
        };
        let body = raw.as_bytes()[body_offset..].to_vec();
        let blocks = BlockMap::new(Image::from_vec(body), geometry)?;
        let header = Header::parse(&blocks)?;
        let bam = Bam::parse(&blocks)?;
        let directory = Directory::parse(&blocks)?;
        info!(
            "loaded {} image from {}",
            geometry.format_tag,
            path.display()
        );
        Ok(DiskImage {
            path: Some(path.to_path_buf()),
            blocks,
            header,
            bam,
            directory,
        })
    }

    /// Write the parsed caches back into the byte buffer, in the order
    /// header, directory, BAM.
    pub fn sync(&mut self) -> Result<()> {
        self.header.sync(&mut self.blocks)?;
        self.directory.sync(&mut self.blocks, &mut self.bam)?;
        self.bam.sync(&mut self.blocks)?;
        Ok(())
    }

    /// Sync and serialize, wrapping custom layouts in an X64 container.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        self.sync()?;
        if self.geometry().device == Device::Custom {
            Ok(x64::wrap(self.geometry(), self.blocks.bytes()))
        } else {
            Ok(self.blocks.bytes().to_vec())
        }
    }

    /// Save to the file the image was created from or loaded from.
    pub fn save(&mut self) -> Result<()> {
        let path = self.path.clone().ok_or_else(|| {
            DiskError::InvalidImage("image has no backing file".into())
        })?;
        self.save_as(path)
    }

    /// Save to a specific file, which becomes the image's backing file.
    pub fn save_as<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let bytes = self.to_bytes()?;
        fs::write(path.as_ref(), &bytes)?;
        self.path = Some(path.as_ref().to_path_buf());
        Ok(())
    }

    #[inline]
    pub fn geometry(&self) -> &Geometry {
        self.blocks.geometry()
    }

    #[inline]
    pub fn blocks(&self) -> &BlockMap {
        &self.blocks
    }

    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    #[inline]
    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    #[inline]
    pub fn bam(&self) -> &Bam {
        &self.bam
    }

    #[inline]
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    #[inline]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn blocks_free(&self) -> usize {
        self.bam.blocks_free()
    }

    pub fn blocks_total(&self) -> usize {
        self.bam.blocks_total()
    }

    /// Replace the disk label and ID (and optionally the DOS type).
    pub fn set_label(&mut self, label: &str, id: &str, dos_type: Option<&str>) {
        self.header.set_label(label, id, dos_type);
    }

    /// Store a program on the image.  Returns the directory entry index.
    ///
    /// The blocks are found before anything is marked, so a full disk or a
    /// name collision leaves the image untouched.
    pub fn write_program(&mut self, program: &Program) -> Result<usize> {
        let chunks = chain::split_payload(&program.data);
        if chunks.is_empty() {
            return Err(DiskError::EmptyFile);
        }
        let locations = self.bam.find_free(chunks.len())?;
        let index = self
            .directory
            .allocate(&mut self.bam, &program.name, None)?;
        self.bam.mark(&locations, false)?;

        for (i, chunk) in chunks.iter().enumerate() {
            let mut block = [0u8; BLOCK_SIZE];
            if i + 1 < locations.len() {
                let raw = encode_link(self.blocks.geometry(), locations[i + 1]);
                block[0] = raw[0];
                block[1] = raw[1];
            } else {
                block[0] = 0;
                block[1] = (chunk.len() + 1) as u8;
            }
            block[2..2 + chunk.len()].copy_from_slice(chunk);
            self.blocks.write_block(locations[i], &block)?;
        }

        let lsu = (chunks[chunks.len() - 1].len() + 1) as u8;
        let entry = self.directory.entry_mut(index)?;
        entry.type_byte = program.file_type.type_byte();
        entry.first = locations[0];
        entry.name = program.name.truncated(FILENAME_SIZE);
        entry.lsu = lsu;
        entry.set_date(&program.date);
        entry.blocks = locations.len() as u16;
        Ok(index)
    }

    /// Read a stored file by name.
    pub fn read_program(&self, name: &str) -> Result<Program> {
        let index = self
            .directory
            .find(&Petscii::from_str(name), 0x80)
            .ok_or_else(|| DiskError::NotFound(name.to_string()))?;
        self.read_program_at(index)
    }

    /// Read a stored file by directory entry index.
    pub fn read_program_at(&self, index: usize) -> Result<Program> {
        let entry = self.directory.entry(index)?;
        if !entry.is_present() {
            return Err(DiskError::NotFound(format!("directory entry {}", index)));
        }
        let data = chain::read_data(&self.blocks, entry.first, None)?;
        let epoch = || {
            NaiveDate::from_ymd_opt(1900, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap_or_default()
        };
        Ok(Program {
            name: entry.name.clone(),
            file_type: entry.file_type().unwrap_or(FileType::Prg),
            date: entry.date().unwrap_or_else(epoch),
            data,
        })
    }

    /// Extract a stored file into a host directory, named by the
    /// `<NAME>.<date>.<TYPE>` convention.  Returns the path written.
    pub fn export_program<P: AsRef<Path>>(&self, index: usize, directory: P) -> Result<PathBuf> {
        self.read_program_at(index)?.export(directory)
    }

    /// Store a host file, deriving name, type, and date from its filename.
    pub fn import_program<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let program = Program::import(path)?;
        self.write_program(&program)
    }

    /// Rename a stored file.  The change reaches the bytes on sync/save.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        self.directory
            .rename(&Petscii::from_str(from), &Petscii::from_str(to))
    }

    /// Scratch a file: its type byte goes to zero and the slot becomes a
    /// tombstone.  The file's blocks stay allocated until `validate`
    /// reclaims them.
    pub fn scratch(&mut self, name: &str) -> Result<()> {
        let index = self
            .directory
            .find(&Petscii::from_str(name), 0x80)
            .ok_or_else(|| DiskError::NotFound(name.to_string()))?;
        self.directory.entry_mut(index)?.type_byte = 0;
        Ok(())
    }

    /// Create a subdirectory: one data block holding a `..` back-reference
    /// entry, plus a DIR-typed entry in the root directory pointing at it.
    pub fn make_directory(&mut self, name: &str) -> Result<Location> {
        let name = Petscii::from_str(name);
        if self.directory.find(&name, 0x80).is_some() {
            return Err(DiskError::NameExists(name.to_ascii()));
        }
        let location = self.bam.allocate(1)?[0];
        let index = self.directory.allocate(&mut self.bam, &name, None)?;
        let now = Local::now().naive_local();

        let mut block = [0u8; BLOCK_SIZE];
        block[0] = 0;
        block[1] = 0xFF;
        let mut back = DirEntry::free();
        back.type_byte = FileType::Dir.type_byte();
        back.name = Petscii::from_str("..");
        back.first = self.geometry().first_dir_location();
        back.lsu = 0xFF;
        back.set_date(&now);
        back.blocks = 1;
        back.write(&mut block[..ENTRY_SIZE], self.blocks.geometry());
        self.blocks.write_block(location, &block)?;

        let entry = self.directory.entry_mut(index)?;
        entry.type_byte = FileType::Dir.type_byte();
        entry.first = location;
        entry.name = name.truncated(FILENAME_SIZE);
        entry.lsu = 0xFF;
        entry.set_date(&now);
        entry.blocks = 1;
        Ok(location)
    }

    /// Rebuild the BAM from the reachable chains and clear tombstones,
    /// returning the number of blocks reclaimed.
    pub fn validate(&mut self) -> Result<usize> {
        validation::revalidate(&self.blocks, &mut self.directory, &mut self.bam)
    }

    /// The classic directory listing: header line, one line per entry with
    /// block counts from walking the chains, and the BAM's free total.
    pub fn listing(&self) -> String {
        use std::fmt::Write as _;
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.header);
        for (_, entry) in self.directory.present() {
            let blocks = chain::walk(&self.blocks, entry.first, None)
                .map(|c| c.len())
                .unwrap_or(entry.blocks as usize);
            let type_tag = match entry.file_type() {
                Some(t) => t.to_string(),
                None => format!("?{:02x}", entry.type_byte),
            };
            let _ = writeln!(
                out,
                "{:<4} {:18} {}",
                blocks,
                format!("\"{}\"", entry.name),
                type_tag
            );
        }
        let _ = writeln!(out, "{} blocks free.", self.bam.blocks_free());
        out
    }
}

impl fmt::Display for DiskImage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} ({}/{} blocks free)",
            self.geometry().format_tag,
            self.header,
            self.bam.blocks_free(),
            self.bam.blocks_total()
        )
    }
}
