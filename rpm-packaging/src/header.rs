// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! RPM file structure parsing.
//!
//! An RPM file is a 96 byte legacy lead, a signature header, pad to an
//! 8 byte boundary, a main header, then the compressed cpio payload.
//! Format reference:
//! http://ftp.rpm.org/max-rpm/s1-rpm-file-format-rpm-file-format.html

use {
    crate::{
        io::{get_be_u32, null_terminated_string, read_be_u16, read_be_u32, read_fixed_string, read_u8},
        Result, RpmError,
    },
    std::io::{Read, Write},
};

pub const RPM_MAGIC: [u8; 4] = [0xed, 0xab, 0xee, 0xdb];
pub const RPM_HEADER_MAGIC: [u8; 3] = [0x8e, 0xad, 0xe8];

// Index entry data types.
pub const HEADER_INT32: u32 = 4;
pub const HEADER_STRING: u32 = 6;
pub const HEADER_STRING_ARRAY: u32 = 8;

// Tags recognized in the main header.
pub const RPMTAG_NAME: u32 = 1000;
pub const RPMTAG_VERSION: u32 = 1001;
pub const RPMTAG_RELEASE: u32 = 1002;
pub const RPMTAG_SUMMARY: u32 = 1004;
pub const RPMTAG_DESCRIPTION: u32 = 1005;
pub const RPMTAG_BUILDTIME: u32 = 1006;
pub const RPMTAG_BUILDHOST: u32 = 1007;
pub const RPMTAG_SIZE: u32 = 1009;
pub const RPMTAG_DISTRIBUTION: u32 = 1010;
pub const RPMTAG_VENDOR: u32 = 1011;
pub const RPMTAG_LICENSE: u32 = 1014;
pub const RPMTAG_OS: u32 = 1021;
pub const RPMTAG_ARCH: u32 = 1022;
pub const RPMTAG_PAYLOADCOMPRESSOR: u32 = 1125;

/// The 96 byte legacy lead at the start of every RPM.
#[derive(Clone, Debug)]
pub struct RpmLead {
    pub major: u8,
    pub minor: u8,
    pub package_type: u16,
    pub arch: u16,
    pub name: String,
    pub os: u16,
    pub signature_type: u16,
}

impl RpmLead {
    pub fn from_reader(reader: &mut impl Read) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != RPM_MAGIC {
            return Err(RpmError::BadMagic);
        }

        let major = read_u8(reader)?;
        let minor = read_u8(reader)?;
        let package_type = read_be_u16(reader)?;
        let arch = read_be_u16(reader)?;
        let name = read_fixed_string(reader, 66)?;
        let os = read_be_u16(reader)?;
        let signature_type = read_be_u16(reader)?;
        let mut reserved = [0u8; 16];
        reader.read_exact(&mut reserved)?;

        if major != 3 {
            return Err(RpmError::UnsupportedVersion(major));
        }
        if signature_type != 5 {
            return Err(RpmError::UnsupportedSignatureType(signature_type));
        }

        Ok(Self {
            major,
            minor,
            package_type,
            arch,
            name,
            os,
            signature_type,
        })
    }
}

/// One 16 byte index entry of a header section.
#[derive(Clone, Copy, Debug)]
pub struct IndexEntry {
    pub tag: u32,
    pub type_: u32,
    pub offset: u32,
    pub count: u32,
}

/// A header section: index entries plus their data store.
///
/// Both the signature header and the main header use this layout.
#[derive(Clone, Debug)]
pub struct HeaderSection {
    pub entries: Vec<IndexEntry>,
    pub store: Vec<u8>,
}

impl HeaderSection {
    pub fn from_reader(reader: &mut impl Read) -> Result<Self> {
        let mut magic = [0u8; 3];
        reader.read_exact(&mut magic)?;
        if magic != RPM_HEADER_MAGIC {
            return Err(RpmError::BadMagic);
        }

        let version = read_u8(reader)?;
        if version != 1 {
            return Err(RpmError::BadHeader(format!(
                "expected header version 1, got {}",
                version
            )));
        }

        let mut reserved = [0u8; 4];
        reader.read_exact(&mut reserved)?;

        let n_entries = read_be_u32(reader)?;
        let data_len = read_be_u32(reader)?;

        let mut entries = Vec::with_capacity(n_entries as usize);
        for _ in 0..n_entries {
            entries.push(IndexEntry {
                tag: read_be_u32(reader)?,
                type_: read_be_u32(reader)?,
                offset: read_be_u32(reader)?,
                count: read_be_u32(reader)?,
            });
        }

        let mut store = vec![0u8; data_len as usize];
        reader.read_exact(&mut store)?;

        Ok(Self { entries, store })
    }

    fn find(&self, tag: u32) -> Option<&IndexEntry> {
        self.entries.iter().find(|e| e.tag == tag)
    }

    /// The string value of a tag, if present.
    ///
    /// String arrays yield their first element.
    pub fn get_string(&self, tag: u32) -> Result<Option<String>> {
        match self.find(tag) {
            Some(entry)
                if entry.type_ == HEADER_STRING || entry.type_ == HEADER_STRING_ARRAY =>
            {
                Ok(Some(null_terminated_string(
                    &self.store,
                    entry.offset as usize,
                )?))
            }
            _ => Ok(None),
        }
    }

    /// The int32 value of a tag, if present.
    pub fn get_u32(&self, tag: u32) -> Result<Option<u32>> {
        match self.find(tag) {
            Some(entry) if entry.type_ == HEADER_INT32 => {
                Ok(Some(get_be_u32(&self.store, entry.offset as usize)?))
            }
            _ => Ok(None),
        }
    }
}

/// All structural parts of an RPM preceding the payload.
#[derive(Clone, Debug)]
pub struct RpmHeaders {
    pub lead: RpmLead,
    pub signature: HeaderSection,
    pub header: HeaderSection,
}

impl RpmHeaders {
    /// The payload compressor name, e.g. `gzip` or `xz`.
    ///
    /// Absent on very old packages, which store the cpio stream raw.
    pub fn payload_compressor(&self) -> Result<Option<String>> {
        self.header.get_string(RPMTAG_PAYLOADCOMPRESSOR)
    }

    pub fn name(&self) -> Result<Option<String>> {
        self.header.get_string(RPMTAG_NAME)
    }

    pub fn version(&self) -> Result<Option<String>> {
        self.header.get_string(RPMTAG_VERSION)
    }

    pub fn release(&self) -> Result<Option<String>> {
        self.header.get_string(RPMTAG_RELEASE)
    }

    pub fn arch(&self) -> Result<Option<String>> {
        self.header.get_string(RPMTAG_ARCH)
    }
}

/// Streaming RPM file reader.
pub struct RpmReader<R: Read> {
    stream: R,
}

impl<R: Read> RpmReader<R> {
    pub fn new(stream: R) -> Self {
        Self { stream }
    }

    /// Parse the lead, signature header, and main header, leaving the
    /// stream positioned at the compressed payload.
    pub fn read_headers(&mut self) -> Result<RpmHeaders> {
        let lead = RpmLead::from_reader(&mut self.stream)?;

        let signature = HeaderSection::from_reader(&mut self.stream)?;

        // The signature data store is padded to an 8 byte boundary;
        // the main header starts after the pad.
        let pad = (8 - signature.store.len() % 8) % 8;
        let mut padding = vec![0u8; pad];
        self.stream.read_exact(&mut padding)?;

        let header = HeaderSection::from_reader(&mut self.stream)?;

        Ok(RpmHeaders {
            lead,
            signature,
            header,
        })
    }

    /// Decompress the payload into `out` until end of stream.
    ///
    /// The decompressor is selected by the `PayloadCompressor` tag
    /// value; `None` streams the raw bytes through. Returns the number
    /// of decompressed bytes written.
    pub fn stream_payload(
        &mut self,
        compressor: Option<&str>,
        out: &mut impl Write,
    ) -> Result<u64> {
        let stream = &mut self.stream;

        let copied = match compressor.unwrap_or("") {
            "" => std::io::copy(stream, out).map_err(RpmError::Io)?,
            "gzip" => copy_decompressed(flate2::read::MultiGzDecoder::new(stream), out)?,
            "xz" | "lzma" => copy_decompressed(xz2::read::XzDecoder::new(stream), out)?,
            "bzip2" => copy_decompressed(bzip2::read::BzDecoder::new(stream), out)?,
            other => return Err(RpmError::UnknownCompressor(other.to_string())),
        };

        Ok(copied)
    }
}

/// Copy a decompression stream to a writer, mapping truncated or
/// corrupt input to [RpmError::Decompress].
fn copy_decompressed(mut decoder: impl Read, out: &mut impl Write) -> Result<u64> {
    let mut buffer = [0u8; 32768];
    let mut total = 0u64;

    loop {
        let read = match decoder.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e)
                if e.kind() == std::io::ErrorKind::UnexpectedEof
                    || e.kind() == std::io::ErrorKind::InvalidData
                    || e.kind() == std::io::ErrorKind::InvalidInput
                    || e.kind() == std::io::ErrorKind::Other =>
            {
                return Err(RpmError::Decompress(e.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        out.write_all(&buffer[0..read])?;
        total += read as u64;
    }

    Ok(total)
}
