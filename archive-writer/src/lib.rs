// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Deterministic archive writing.

This crate provides the archive builders used by the packaging tools:

* [ar::ArWriter] / [ar::ArReader] for System V ar archives (the outer
  container of `.deb` packages).
* [tar::TarWriter], a deterministic tar builder with parent directory
  synthesis, duplicate suppression, tar merging, and pluggable
  compression (built-in gzip/bzip2/xz/lzma or an external compressor
  subprocess).
* [zip::ZipWriter], a deterministic zip builder.

Outputs are reproducible: for fixed inputs and options the emitted bytes
are identical across runs.
*/

pub mod ar;
pub mod compression;
pub mod tar;
pub mod zip;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad magic value encountered")]
    BadMagic,

    #[error("malformed archive header: {0}")]
    BadHeader(String),

    #[error("short read from archive member")]
    ShortRead,

    #[error("operation on a closed writer")]
    WriterClosed,

    #[error("compressor failed: {0}")]
    Compressor(String),

    #[error("timestamp not representable in archive format")]
    InvalidTimestamp,
}

/// Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Fixed mtime for reproducible archives usable with non-unix OSes.
///
/// 2000-01-01 00:00:00 UTC.
pub const PORTABLE_MTIME: u64 = 946684800;
