// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Compression format selection and transparent decompression.

use {
    crate::{Error, Result},
    std::{
        fs::File,
        io::{Cursor, Read},
        path::Path,
    },
};

/// Compression formats understood by the archive builders.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Compression {
    /// No compression (no extension).
    None,

    /// Gzip compression (.gz extension).
    Gzip,

    /// Bzip2 compression (.bz2 extension).
    Bzip2,

    /// XZ compression (.xz extension).
    Xz,

    /// Legacy LZMA compression (.lzma extension).
    Lzma,
}

impl Compression {
    /// Resolve a `--compression` flag value.
    pub fn from_flag(value: &str) -> Result<Self> {
        Ok(match value {
            "" => Self::None,
            "gz" | "tgz" => Self::Gzip,
            "bz2" | "bzip2" => Self::Bzip2,
            "xz" => Self::Xz,
            "lzma" => Self::Lzma,
            other => {
                return Err(Error::Compressor(format!(
                    "unknown compression format: {}",
                    other
                )))
            }
        })
    }

    /// Resolve the compression of a file from its name.
    pub fn from_filename(name: &str) -> Self {
        if name.ends_with(".gz") || name.ends_with(".tgz") {
            Self::Gzip
        } else if name.ends_with(".bz2") {
            Self::Bzip2
        } else if name.ends_with(".xz") {
            Self::Xz
        } else if name.ends_with(".lzma") {
            Self::Lzma
        } else {
            Self::None
        }
    }

    /// Filename extension for files compressed in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Gzip => ".gz",
            Self::Bzip2 => ".bz2",
            Self::Xz => ".xz",
            Self::Lzma => ".lzma",
        }
    }
}

/// Sniff the compression format from the first bytes of a stream.
pub fn sniff_compression(magic: &[u8]) -> Compression {
    if magic.starts_with(&[0x1f, 0x8b]) {
        Compression::Gzip
    } else if magic.starts_with(b"BZh") {
        Compression::Bzip2
    } else if magic.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
        Compression::Xz
    } else if magic.len() >= 3 && magic[0] == 0x5d && magic[1] == 0 && magic[2] == 0 {
        Compression::Lzma
    } else {
        Compression::None
    }
}

/// Wrap a reader with transparent decompression.
pub fn decompress_reader(
    stream: Box<dyn Read + Send>,
    compression: Compression,
) -> Result<Box<dyn Read + Send>> {
    Ok(match compression {
        Compression::None => stream,
        Compression::Gzip => Box::new(flate2::read::MultiGzDecoder::new(stream)),
        Compression::Bzip2 => Box::new(bzip2::read::BzDecoder::new(stream)),
        Compression::Xz => Box::new(xz2::read::XzDecoder::new(stream)),
        Compression::Lzma => {
            let raw = xz2::stream::Stream::new_lzma_decoder(u64::MAX)
                .map_err(|e| Error::Compressor(format!("lzma decoder: {}", e)))?;
            Box::new(xz2::read::XzDecoder::new_stream(stream, raw))
        }
    })
}

/// Open a file with transparent decompression, sniffing the format from
/// its leading magic bytes.
pub fn open_decompressed(path: impl AsRef<Path>) -> Result<Box<dyn Read + Send>> {
    let mut file = File::open(path)?;

    let mut magic = [0u8; 6];
    let mut filled = 0;
    while filled < magic.len() {
        let n = file.read(&mut magic[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    let compression = sniff_compression(&magic[..filled]);
    let stream: Box<dyn Read + Send> =
        Box::new(Cursor::new(magic[..filled].to_vec()).chain(file));

    decompress_reader(stream, compression)
}
