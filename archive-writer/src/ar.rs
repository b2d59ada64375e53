// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! System V ar archive reading and writing.
//!
//! This is the outer container format of `.deb` packages. Member names
//! are stored in the SysV style with a trailing `/` and members are
//! aligned to 2 byte boundaries with a `\n` pad byte.

use {
    crate::{Error, Result},
    std::io::{Read, Write},
};

/// Magic at the start of every ar archive.
pub const AR_MAGIC: &[u8] = b"!<arch>\n";

const HEADER_SIZE: usize = 60;

/// Metadata for a single ar archive member.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ArHeader {
    pub name: String,
    pub mtime: u64,
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub size: u64,
}

impl ArHeader {
    /// A header with the field defaults used in deterministic output.
    pub fn new(name: impl ToString, size: u64) -> Self {
        Self {
            name: name.to_string(),
            mtime: 0,
            uid: 0,
            gid: 0,
            mode: 0o644,
            size,
        }
    }
}

/// Writes System V ar archives.
pub struct ArWriter<W: Write> {
    writer: W,
}

impl<W: Write> ArWriter<W> {
    /// Construct a writer, emitting the archive magic.
    pub fn new(mut writer: W) -> Result<Self> {
        writer.write_all(AR_MAGIC)?;

        Ok(Self { writer })
    }

    /// Append a member described by `header` with content from `data`.
    ///
    /// `data` must yield exactly `header.size` bytes.
    pub fn append(&mut self, header: &ArHeader, data: &mut impl Read) -> Result<()> {
        // 16 byte SysV name, then fixed-width decimal/octal fields, then
        // the 2 byte terminator.
        write!(self.writer, "{:<16}", format!("{}/", header.name))?;
        write!(self.writer, "{:<12}", header.mtime)?;
        write!(self.writer, "{:<6}", header.uid)?;
        write!(self.writer, "{:<6}", header.gid)?;
        write!(self.writer, "{:<8}", format!("0{:o}", header.mode))?;
        write!(self.writer, "{:<10}", header.size)?;
        self.writer.write_all(b"`\n")?;

        let copied = std::io::copy(data, &mut self.writer)?;
        if copied != header.size {
            return Err(Error::ShortRead);
        }

        if copied % 2 != 0 {
            self.writer.write_all(b"\n")?;
        }

        Ok(())
    }

    /// Append a member from an in-memory buffer.
    pub fn append_data(&mut self, name: impl ToString, data: &[u8]) -> Result<()> {
        self.append(
            &ArHeader::new(name, data.len() as u64),
            &mut std::io::Cursor::new(data),
        )
    }

    /// Finish the archive, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// A member read from an ar archive.
#[derive(Clone, Debug)]
pub struct ArEntry {
    pub header: ArHeader,
    pub data: Vec<u8>,
}

/// Reads System V ar archives.
pub struct ArReader<R: Read> {
    reader: R,
    pos: u64,
}

impl<R: Read> ArReader<R> {
    /// Construct a reader, validating the archive magic.
    pub fn new(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 8];
        reader
            .read_exact(&mut magic)
            .map_err(|_| Error::BadMagic)?;
        if magic != AR_MAGIC {
            return Err(Error::BadMagic);
        }

        Ok(Self { reader, pos: 8 })
    }

    /// Read the next member. `None` at end of archive.
    ///
    /// Fewer than 60 bytes remaining counts as end of archive; some
    /// producers leave garbage after the last member.
    pub fn next_entry(&mut self) -> Result<Option<ArEntry>> {
        // Members are 2 byte aligned with a newline pad.
        if self.pos % 2 != 0 {
            let mut pad = [0u8; 1];
            if self.reader.read(&mut pad)? == 0 {
                return Ok(None);
            }
            self.pos += 1;
        }

        let mut header = [0u8; HEADER_SIZE];
        let mut filled = 0;
        while filled < HEADER_SIZE {
            let n = self.reader.read(&mut header[filled..])?;
            if n == 0 {
                return Ok(None);
            }
            filled += n;
        }
        self.pos += HEADER_SIZE as u64;

        if &header[58..60] != b"`\n" {
            return Err(Error::BadHeader(
                "missing member header terminator".to_string(),
            ));
        }

        let name = ascii_field(&header[0..16])?
            .trim_end_matches('/')
            .to_string();
        let mtime = decimal_field(&header[16..28])?;
        let uid = decimal_field(&header[28..34])? as u32;
        let gid = decimal_field(&header[34..40])? as u32;
        let mode = octal_field(&header[40..48])? as u32;
        let size = decimal_field(&header[48..58])?;

        let mut data = vec![0u8; size as usize];
        self.reader.read_exact(&mut data).map_err(|_| Error::ShortRead)?;
        self.pos += size;

        Ok(Some(ArEntry {
            header: ArHeader {
                name,
                mtime,
                uid,
                gid,
                mode,
                size,
            },
            data,
        }))
    }
}

impl<R: Read> Iterator for ArReader<R> {
    type Item = Result<ArEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

fn ascii_field(data: &[u8]) -> Result<&str> {
    std::str::from_utf8(data)
        .map(|s| s.trim_end_matches(|c| c == ' ' || c == '\0'))
        .map_err(|_| Error::BadHeader("field is not ASCII".to_string()))
}

fn decimal_field(data: &[u8]) -> Result<u64> {
    let s = ascii_field(data)?;
    s.parse::<u64>()
        .map_err(|_| Error::BadHeader(format!("bad decimal field: {:?}", s)))
}

fn octal_field(data: &[u8]) -> Result<u64> {
    let s = ascii_field(data)?;
    u64::from_str_radix(s, 8)
        .map_err(|_| Error::BadHeader(format!("bad octal field: {:?}", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_round_trip() -> Result<()> {
        let mut buffer = Vec::new();
        let mut writer = ArWriter::new(&mut buffer)?;
        writer.append_data("debian-binary", b"2.0\n")?;
        // Odd length member to exercise alignment padding.
        writer.append_data("odd", b"12345")?;
        writer.append_data("even", b"1234")?;

        let mut reader = ArReader::new(std::io::Cursor::new(buffer))?;

        let entry = reader.next_entry()?.unwrap();
        assert_eq!(entry.header.name, "debian-binary");
        assert_eq!(entry.header.mode, 0o644);
        assert_eq!(entry.header.size, 4);
        assert_eq!(entry.data, b"2.0\n");

        let entry = reader.next_entry()?.unwrap();
        assert_eq!(entry.header.name, "odd");
        assert_eq!(entry.data, b"12345");

        let entry = reader.next_entry()?.unwrap();
        assert_eq!(entry.header.name, "even");
        assert_eq!(entry.data, b"1234");

        assert!(reader.next_entry()?.is_none());

        Ok(())
    }

    #[test]
    fn test_header_layout() -> Result<()> {
        let mut buffer = Vec::new();
        let mut writer = ArWriter::new(&mut buffer)?;
        writer.append_data("control.tar.gz", b"x")?;

        assert_eq!(&buffer[0..8], AR_MAGIC);
        assert_eq!(&buffer[8..24], b"control.tar.gz/ ");
        // Mode is octal with a leading zero.
        assert_eq!(&buffer[48..56], b"0644    ");
        assert_eq!(&buffer[66..68], b"`\n");
        // Pad byte after the 1 byte member.
        assert_eq!(buffer.last(), Some(&b'\n'));

        Ok(())
    }

    #[test]
    fn test_bad_magic() {
        let res = ArReader::new(std::io::Cursor::new(b"!<arch>X".to_vec()));
        assert!(matches!(res, Err(Error::BadMagic)));
    }

    #[test]
    fn test_trailing_garbage_is_eof() -> Result<()> {
        let mut buffer = Vec::new();
        let mut writer = ArWriter::new(&mut buffer)?;
        writer.append_data("a", b"xx")?;
        buffer.extend_from_slice(b"short trailing junk");

        let mut reader = ArReader::new(std::io::Cursor::new(buffer))?;
        assert!(reader.next_entry()?.is_some());
        assert!(reader.next_entry()?.is_none());

        Ok(())
    }
}
