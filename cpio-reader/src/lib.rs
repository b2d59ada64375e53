// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Streaming cpio archive reading.

Parses the three ASCII cpio header flavors found inside RPM payloads:
the SVR4 *New ASCII* format (`070701`), its CRC sibling (`070702`), and
the *Portable ASCII* / odc format (`070707`). Entries are normalized
into [FileInfo] values; the reader works over any [Read] stream, so the
payload can arrive through a pipe without intermediate files.

The magic is re-validated per entry, the way cpio archives actually
store it. The sentinel `TRAILER!!!` entry terminates the stream and is
not emitted.
*/

pub mod newc;
pub mod odc;

pub use {newc::NewcHeader, odc::OdcHeader};

use {pkg_manifest::FileInfo, std::io::Read};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad magic value encountered")]
    BadMagic,

    #[error("value in header is not an ASCII string")]
    BadHeaderString,

    #[error("numeric value in header could not be parsed: {0}")]
    BadHeaderNumber(String),

    #[error("filename could not be decoded")]
    FilenameDecode,
}

/// Result type for this crate.
pub type CpioResult<T> = Result<T, Error>;

const TRAILER: &str = "TRAILER!!!";

const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;
const S_IFLNK: u32 = 0o120000;

pub(crate) fn read_ascii_number(
    reader: &mut impl Read,
    count: usize,
    radix: u32,
) -> CpioResult<u64> {
    let mut buffer = vec![0u8; count];
    reader.read_exact(&mut buffer)?;

    let s = std::str::from_utf8(&buffer).map_err(|_| Error::BadHeaderString)?;
    u64::from_str_radix(s, radix).map_err(|_| Error::BadHeaderNumber(s.to_string()))
}

pub(crate) fn read_name(reader: &mut impl Read, name_size: usize) -> CpioResult<String> {
    let mut data = vec![0u8; name_size];
    reader.read_exact(&mut data)?;

    let nul = data
        .iter()
        .position(|b| *b == 0)
        .ok_or(Error::FilenameDecode)?;

    String::from_utf8(data[..nul].to_vec()).map_err(|_| Error::FilenameDecode)
}

fn drain(reader: &mut impl Read, mut count: u64) -> CpioResult<()> {
    let mut buffer = [0u8; 32768];
    while count > 0 {
        let want = count.min(buffer.len() as u64) as usize;
        reader.read_exact(&mut buffer[..want])?;
        count -= want as u64;
    }

    Ok(())
}

/// A parsed cpio header of either flavor, plus the payload geometry
/// needed to advance the stream.
struct RawEntry {
    name: String,
    inode: u32,
    mode: u32,
    uid: u32,
    gid: u32,
    file_size: u64,
    /// Payload length including trailing alignment padding.
    padded_size: u64,
}

/// A streaming cpio archive reader emitting [FileInfo] values.
pub struct CpioReader<R: Read> {
    stream: R,
    seen_trailer: bool,
}

impl<R: Read> CpioReader<R> {
    /// Construct a reader over a byte stream positioned at the first
    /// entry.
    pub fn new(stream: R) -> Self {
        Self {
            stream,
            seen_trailer: false,
        }
    }

    /// Read the next entry. `Some` on another file entry, `None` at the
    /// end of the archive.
    ///
    /// Payload bytes are consumed: symlink targets are captured into
    /// [FileInfo::symlink_target], other content is skipped.
    pub fn read_next(&mut self) -> CpioResult<Option<FileInfo>> {
        if self.seen_trailer {
            return Ok(None);
        }

        let mut magic = [0u8; 6];
        match self.stream.read(&mut magic[..1]) {
            Ok(0) => return Ok(None),
            Ok(_) => {}
            Err(e) => return Err(e.into()),
        }
        self.stream.read_exact(&mut magic[1..])?;

        let raw = match &magic {
            newc::MAGIC_NEWC | newc::MAGIC_CRC => {
                NewcHeader::from_reader(&mut self.stream)?.into_raw()
            }
            odc::MAGIC => OdcHeader::from_reader(&mut self.stream)?.into_raw(),
            _ => return Err(Error::BadMagic),
        };

        if raw.name == TRAILER {
            drain(&mut self.stream, raw.padded_size)?;
            self.seen_trailer = true;
            return Ok(None);
        }

        Ok(Some(self.materialize(raw)?))
    }

    fn materialize(&mut self, raw: RawEntry) -> CpioResult<FileInfo> {
        let is_dir = raw.mode & S_IFMT == S_IFDIR;
        let is_symlink = raw.mode & S_IFMT == S_IFLNK;

        let symlink_target = if is_symlink && raw.file_size > 0 {
            let mut data = vec![0u8; raw.padded_size as usize];
            self.stream.read_exact(&mut data)?;
            data.truncate(raw.file_size as usize);
            Some(String::from_utf8_lossy(&data).to_string())
        } else {
            drain(&mut self.stream, raw.padded_size)?;
            None
        };

        Ok(FileInfo {
            path: FileInfo::normalize_path(&raw.name).to_string(),
            size: if is_dir || is_symlink { 0 } else { raw.file_size },
            mode: raw.mode,
            uid: raw.uid,
            gid: raw.gid,
            is_dir,
            is_symlink,
            symlink_target,
            inode: raw.inode,
            data_size: raw.padded_size,
        })
    }
}

impl<R: Read> Iterator for CpioReader<R> {
    type Item = CpioResult<FileInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_next() {
            Ok(Some(info)) => Some(Ok(info)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

impl NewcHeader {
    fn into_raw(self) -> RawEntry {
        RawEntry {
            // File data is padded to a 4 byte boundary.
            padded_size: (self.file_size + 3) / 4 * 4,
            name: self.name,
            inode: self.inode,
            mode: self.mode,
            uid: self.uid,
            gid: self.gid,
            file_size: self.file_size,
        }
    }
}

impl OdcHeader {
    fn into_raw(self) -> RawEntry {
        RawEntry {
            // odc has no alignment padding.
            padded_size: self.file_size,
            name: self.name,
            inode: self.inode,
            mode: self.mode,
            uid: self.uid,
            gid: self.gid,
            file_size: self.file_size,
        }
    }
}
