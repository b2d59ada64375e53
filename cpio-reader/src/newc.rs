// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! New ASCII format support.
//!
//! Covers both the plain SVR4 flavor (`070701`) and the checksummed
//! variant (`070702`), which share a layout: thirteen 8-character hex
//! fields, a NUL-terminated name, and 4 byte alignment after both the
//! name and the file data.

use {
    crate::{read_ascii_number, read_name, CpioResult},
    std::io::Read,
};

pub const MAGIC_NEWC: &[u8; 6] = b"070701";
pub const MAGIC_CRC: &[u8; 6] = b"070702";

/// Length of the fixed header including the magic.
const HEADER_LEN: usize = 110;

fn read_hex(reader: &mut impl Read) -> CpioResult<u64> {
    read_ascii_number(reader, 8, 16)
}

/// Parsed New ASCII format header.
#[derive(Clone, Debug)]
pub struct NewcHeader {
    pub inode: u32,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub mtime: u32,
    pub file_size: u64,
    pub dev_major: u32,
    pub dev_minor: u32,
    pub rdev_major: u32,
    pub rdev_minor: u32,
    pub checksum: u32,
    pub name: String,
}

impl NewcHeader {
    /// Parse a header from a reader positioned after the magic.
    pub fn from_reader(reader: &mut impl Read) -> CpioResult<Self> {
        let inode = read_hex(reader)? as u32;
        let mode = read_hex(reader)? as u32;
        let uid = read_hex(reader)? as u32;
        let gid = read_hex(reader)? as u32;
        let nlink = read_hex(reader)? as u32;
        let mtime = read_hex(reader)? as u32;
        let file_size = read_hex(reader)?;
        let dev_major = read_hex(reader)? as u32;
        let dev_minor = read_hex(reader)? as u32;
        let rdev_major = read_hex(reader)? as u32;
        let rdev_minor = read_hex(reader)? as u32;
        let name_size = read_hex(reader)? as usize;
        let checksum = read_hex(reader)? as u32;

        let name = read_name(reader, name_size)?;

        // The name is NUL padded so header plus name is a multiple of 4.
        let pad = (4 - (HEADER_LEN + name_size) % 4) % 4;
        let mut padding = vec![0u8; pad];
        reader.read_exact(&mut padding)?;

        Ok(Self {
            inode,
            mode,
            uid,
            gid,
            nlink,
            mtime,
            file_size,
            dev_major,
            dev_minor,
            rdev_major,
            rdev_minor,
            checksum,
            name,
        })
    }
}
