// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian binary package assembly.

A `.deb` package is a System V ar archive holding, in order, a
`debian-binary` member with content `2.0\n`, a `control.tar.gz` with
package metadata and maintainer scripts, and a `data.tar.*` with the
installed files. [DebBuilder] assembles those from a control field set
and a prebuilt data tarball; [changes] emits the `.changes` upload
sidecar.
*/

pub mod builder;
pub mod changes;
pub mod control;

pub use builder::DebBuilder;

#[derive(Debug, thiserror::Error)]
pub enum DebError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] archive_writer::Error),

    #[error("mandatory control field missing: {0}")]
    MissingControlField(&'static str),

    #[error("unknown control field: {0}")]
    UnknownControlField(String),
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, DebError>;
