//! Conversion between Petscii and ASCII/Unicode strings.
//!
//! Disk names, disk IDs, and filenames are all stored on CBM disks in
//! PETSCII, padded out to their field width with shifted-space (`0xA0`)
//! bytes.  This module provides a small value type that keeps the raw
//! PETSCII bytes intact (so images can be reproduced exactly) while offering
//! an ASCII projection for display and lookup.

use std::fmt;

/// The byte used to pad filenames, disk names, etc.
pub const PADDING_BYTE: u8 = 0xA0;

/// A string of PETSCII bytes.
///
/// Comparisons are on the raw bytes.  The ASCII projection maps `0xA0` and
/// `0x00` to space and trims trailing whitespace, so a padded on-disk field
/// projects back to the string it was created from.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Petscii(Vec<u8>);

impl Petscii {
    /// Wrap raw PETSCII bytes verbatim.
    pub fn from_bytes(bytes: &[u8]) -> Petscii {
        Petscii(bytes.to_vec())
    }

    /// Read a padded field (e.g. a 16-byte filename), stripping the trailing
    /// run of padding bytes.
    pub fn from_padded_bytes(bytes: &[u8], padding: u8) -> Petscii {
        let mut end = bytes.len();
        while end > 0 && bytes[end - 1] == padding {
            end -= 1;
        }
        Petscii(bytes[..end].to_vec())
    }

    /// Convert from ASCII/Unicode.  Lowercase letters are upper-cased at this
    /// boundary, which matches how CBM DOS stores names typed at the console.
    /// Characters without a PETSCII counterpart become '?'.
    pub fn from_str(string: &str) -> Petscii {
        let mut bytes = Vec::with_capacity(string.len());
        for c in string.chars() {
            bytes.push(match c {
                ' '..='_' => c.to_ascii_uppercase() as u8,
                'a'..='z' => c.to_ascii_uppercase() as u8,
                _ => b'?',
            });
        }
        Petscii(bytes)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Return a copy truncated to `len` bytes.
    pub fn truncated(&self, len: usize) -> Petscii {
        Petscii(self.0.iter().cloned().take(len).collect())
    }

    /// Write this string into a fixed-width field, padding the remainder.
    /// Bytes beyond the field width are dropped.
    pub fn write_bytes_with_padding(&self, field: &mut [u8], padding: u8) {
        for (i, slot) in field.iter_mut().enumerate() {
            *slot = if i < self.0.len() { self.0[i] } else { padding };
        }
    }

    /// The ASCII projection: padding and NUL bytes render as space, shifted
    /// letters map back to their unshifted forms, trailing whitespace is
    /// trimmed.
    pub fn to_ascii(&self) -> String {
        let mut s = String::with_capacity(self.0.len());
        for &b in &self.0 {
            s.push(match b {
                0x00 | PADDING_BYTE => ' ',
                0x20..=0x5F => b as char,
                // Shifted letters occupy 0xC1-0xDA.
                0xC1..=0xDA => (b - 0x80) as char,
                _ => '?',
            });
        }
        s.truncate(s.trim_end().len());
        s
    }
}

impl From<&str> for Petscii {
    fn from(string: &str) -> Petscii {
        Petscii::from_str(string)
    }
}

impl From<String> for Petscii {
    fn from(string: String) -> Petscii {
        Petscii::from_str(&string)
    }
}

impl From<Petscii> for String {
    fn from(petscii: Petscii) -> String {
        petscii.to_ascii()
    }
}

impl fmt::Display for Petscii {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.pad(&self.to_ascii())
    }
}

impl fmt::Debug for Petscii {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"{}\"", self.to_ascii())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_round_trip() {
        // Projecting a 0xA0-padded field recovers the trimmed original.
        let name = Petscii::from_str("hello");
        let mut field = [0u8; 16];
        name.write_bytes_with_padding(&mut field, PADDING_BYTE);
        assert_eq!(&field[..5], b"HELLO");
        assert!(field[5..].iter().all(|&b| b == PADDING_BYTE));
        let read_back = Petscii::from_padded_bytes(&field, PADDING_BYTE);
        assert_eq!(read_back, Petscii::from_str("HELLO"));
        assert_eq!(read_back.to_ascii(), "HELLO");
    }

    #[test]
    fn test_projection_trims_and_spaces() {
        let raw = Petscii::from_bytes(&[b'A', 0x00, b'B', PADDING_BYTE, PADDING_BYTE]);
        assert_eq!(raw.to_ascii(), "A B");
    }

    #[test]
    fn test_upper_cases_at_boundary() {
        assert_eq!(Petscii::from_str("Test/01").as_bytes(), b"TEST/01");
    }

    #[test]
    fn test_field_truncation() {
        let long = Petscii::from_str("ABCDEFGHIJKLMNOPQRSTUVWX");
        let mut field = [0u8; 16];
        long.write_bytes_with_padding(&mut field, PADDING_BYTE);
        assert_eq!(&field, b"ABCDEFGHIJKLMNOP");
    }
}
