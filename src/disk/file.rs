//! Moving stored files between disk images and the host filesystem.
//!
//! A `Program` is the in-memory carrier for one stored file: its name, CBM
//! file type, timestamp, and payload bytes.  Extracted files are named
//! `<NAME>.<YYYY>-<MM>-<DD>-<HH>-<MM>.<TYPE>` so the metadata survives a
//! round trip through a host directory; import parses the same convention
//! and falls back to `<NAME>.<TYPE>` with the current time.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use log::debug;

use crate::disk::chain::PAYLOAD_SIZE;
use crate::disk::directory::FileType;
use crate::disk::error::Result;
use crate::petscii::Petscii;

const DATE_FORMAT: &str = "%Y-%m-%d-%H-%M";

/// One stored file, detached from any image.
#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub name: Petscii,
    pub file_type: FileType,
    pub date: NaiveDateTime,
    pub data: Vec<u8>,
}

impl Program {
    pub fn new(name: &str, file_type: FileType, date: NaiveDateTime, data: Vec<u8>) -> Program {
        Program {
            name: Petscii::from_str(name),
            file_type,
            date,
            data,
        }
    }

    /// Number of 254-byte blocks the payload occupies on disk.
    pub fn block_count(&self) -> usize {
        (self.data.len() + PAYLOAD_SIZE - 1) / PAYLOAD_SIZE
    }

    /// The host-side file name for this program.  Slashes and spaces in the
    /// stored name become underscores.
    pub fn host_file_name(&self) -> String {
        let name: String = self
            .name
            .to_ascii()
            .chars()
            .map(|c| if c == '/' || c == ' ' { '_' } else { c })
            .collect();
        format!(
            "{}.{}.{}",
            name,
            self.date.format(DATE_FORMAT),
            self.file_type.tag()
        )
    }

    /// Write the payload into `directory` under the naming convention,
    /// returning the path written.
    pub fn export<P: AsRef<Path>>(&self, directory: P) -> Result<PathBuf> {
        let path = directory.as_ref().join(self.host_file_name());
        fs::write(&path, &self.data)?;
        Ok(path)
    }

    /// Read a host file written by `export` (or any file named
    /// `<NAME>.<TYPE>`).  An unrecognized name keeps the whole file name,
    /// defaults to PRG, and stamps the current time.
    pub fn import<P: AsRef<Path>>(path: P) -> Result<Program> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        let parts: Vec<&str> = file_name.split('.').collect();
        let mut name = file_name;
        let mut file_type = FileType::Prg;
        let mut date = None;
        if parts.len() >= 2 {
            if let Some(parsed) = FileType::from_tag(parts[parts.len() - 1]) {
                file_type = parsed;
                let mut name_end = parts.len() - 1;
                if parts.len() >= 3 {
                    if let Ok(parsed) =
                        NaiveDateTime::parse_from_str(parts[parts.len() - 2], DATE_FORMAT)
                    {
                        date = Some(parsed);
                        name_end -= 1;
                    }
                }
                name = &file_name[..parts[..name_end].iter().map(|p| p.len() + 1).sum::<usize>() - 1];
            } else {
                debug!("{}: no file type suffix, storing as PRG", file_name);
            }
        }
        let date = date.unwrap_or_else(|| Local::now().naive_local());
        Ok(Program {
            name: Petscii::from_str(name),
            file_type,
            date,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn noon(year: i32, month: u32, day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_host_file_name() {
        let program = Program::new("demo", FileType::Prg, noon(2024, 5, 1), vec![1, 2, 3]);
        assert_eq!(program.host_file_name(), "DEMO.2024-05-01-12-00.PRG");

        let program = Program::new("a/b c", FileType::Seq, noon(1986, 12, 31), vec![]);
        assert_eq!(program.host_file_name(), "A_B_C.1986-12-31-12-00.SEQ");
    }

    #[test]
    fn test_block_count() {
        assert_eq!(Program::new("x", FileType::Prg, noon(2024, 1, 1), vec![]).block_count(), 0);
        assert_eq!(
            Program::new("x", FileType::Prg, noon(2024, 1, 1), vec![0; 254]).block_count(),
            1
        );
        assert_eq!(
            Program::new("x", FileType::Prg, noon(2024, 1, 1), vec![0; 255]).block_count(),
            2
        );
    }

    #[test]
    fn test_export_import_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let program = Program::new("hello", FileType::Usr, noon(2001, 2, 3), vec![9; 300]);
        let path = program.export(dir.path()).unwrap();
        assert!(path.ends_with("HELLO.2001-02-03-12-00.USR"));
        let reread = Program::import(&path).unwrap();
        assert_eq!(reread, program);
    }

    #[test]
    fn test_import_fallbacks() {
        let dir = tempfile::tempdir().unwrap();

        // <NAME>.<TYPE> without a timestamp.
        let path = dir.path().join("GAME.SEQ");
        fs::write(&path, b"abc").unwrap();
        let program = Program::import(&path).unwrap();
        assert_eq!(program.name.as_bytes(), b"GAME");
        assert_eq!(program.file_type, FileType::Seq);
        assert_eq!(program.data, b"abc");

        // A dotted name that is not a type tag stays whole.
        let path = dir.path().join("NOTES.TXT");
        fs::write(&path, b"x").unwrap();
        let program = Program::import(&path).unwrap();
        assert_eq!(program.name.as_bytes(), b"NOTES.TXT");
        assert_eq!(program.file_type, FileType::Prg);
    }
}
