// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! RPM file parsing and building.

Reading: [header::RpmReader] parses the legacy lead, the signature
header, and the main header of an RPM file, then streams the
decompressed cpio payload ([header::RpmReader::stream_payload]).

Building: [builder::RpmBuilder] drives an external `rpmbuild`
subprocess against a working directory it lays out, rewriting the spec
file with version/release and scriptlet substitutions and capturing the
output file `rpmbuild` reports having written.
*/

pub mod builder;
pub mod header;
pub mod io;

pub use {builder::RpmBuilder, header::RpmReader};

#[derive(Debug, thiserror::Error)]
pub enum RpmError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad magic value encountered")]
    BadMagic,

    #[error("malformed rpm header: {0}")]
    BadHeader(String),

    #[error("cannot handle RPM version {0}")]
    UnsupportedVersion(u8),

    #[error("unexpected signature type {0}")]
    UnsupportedSignatureType(u16),

    #[error("unknown payload compressor: {0}")]
    UnknownCompressor(String),

    #[error("payload decompression failed: {0}")]
    Decompress(String),

    #[error("rpmbuild is required but was not found in PATH")]
    NoRpmbuildFound,

    #[error("{0} is not an executable rpmbuild")]
    InvalidRpmbuild(String),

    #[error("rpmbuild did not produce an output file; log follows:\n{log}")]
    Subprocess { log: String },
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, RpmError>;
