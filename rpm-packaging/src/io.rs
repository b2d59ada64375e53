// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Low-level byte helpers for the RPM wire format.
//!
//! All multi-byte integers in RPM structures are network byte order.

use {
    crate::{Result, RpmError},
    std::io::Read,
};

pub fn read_u8(reader: &mut impl Read) -> Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub fn read_be_u16(reader: &mut impl Read) -> Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

pub fn read_be_u32(reader: &mut impl Read) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

/// Read a fixed-width field holding a NUL-terminated string.
///
/// The whole field is consumed; the string stops at the first NUL.
pub fn read_fixed_string(reader: &mut impl Read, width: usize) -> Result<String> {
    let mut buf = vec![0u8; width];
    reader.read_exact(&mut buf)?;

    let end = buf.iter().position(|b| *b == 0).unwrap_or(width);
    String::from_utf8(buf[..end].to_vec())
        .map_err(|_| RpmError::BadHeader("string field is not UTF-8".to_string()))
}

/// Extract a NUL-terminated UTF-8 string from a buffer at `offset`.
pub fn null_terminated_string(buf: &[u8], offset: usize) -> Result<String> {
    let tail = buf
        .get(offset..)
        .ok_or_else(|| RpmError::BadHeader("string offset outside data store".to_string()))?;

    let end = tail
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| RpmError::BadHeader("unterminated string in data store".to_string()))?;

    String::from_utf8(tail[..end].to_vec())
        .map_err(|_| RpmError::BadHeader("store string is not UTF-8".to_string()))
}

/// Read a big-endian u32 out of a buffer at `offset`.
pub fn get_be_u32(buf: &[u8], offset: usize) -> Result<u32> {
    let bytes = buf
        .get(offset..offset + 4)
        .ok_or_else(|| RpmError::BadHeader("integer offset outside data store".to_string()))?;

    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
