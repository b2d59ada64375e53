// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Portable ASCII format / old character / odc archive support.
//!
//! Fixed-width octal fields, no alignment padding. Standardized in
//! version 2 of the Single UNIX Specification.

use {
    crate::{read_ascii_number, read_name, CpioResult},
    std::io::Read,
};

pub const MAGIC: &[u8; 6] = b"070707";

fn read_octal(reader: &mut impl Read, count: usize) -> CpioResult<u64> {
    read_ascii_number(reader, count, 8)
}

/// Parsed portable ASCII format header.
#[derive(Clone, Debug)]
pub struct OdcHeader {
    pub dev: u32,
    pub inode: u32,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub rdev: u32,
    pub mtime: u32,
    pub file_size: u64,
    pub name: String,
}

impl OdcHeader {
    /// Parse a header from a reader positioned after the magic.
    pub fn from_reader(reader: &mut impl Read) -> CpioResult<Self> {
        let dev = read_octal(reader, 6)? as u32;
        let inode = read_octal(reader, 6)? as u32;
        let mode = read_octal(reader, 6)? as u32;
        let uid = read_octal(reader, 6)? as u32;
        let gid = read_octal(reader, 6)? as u32;
        let nlink = read_octal(reader, 6)? as u32;
        let rdev = read_octal(reader, 6)? as u32;
        let mtime = read_octal(reader, 11)? as u32;
        let name_size = read_octal(reader, 6)? as usize;
        let file_size = read_octal(reader, 11)?;

        let name = read_name(reader, name_size)?;

        Ok(Self {
            dev,
            inode,
            mode,
            uid,
            gid,
            nlink,
            rdev,
            mtime,
            file_size,
            name,
        })
    }
}
