// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Normalized tree reading and comparison.

Every supported source — a filesystem directory, a tar archive, the
data member of a `.deb`, the cpio payload of an `.rpm`, or a saved JSON
snapshot — is exposed through the same [TreeReader] iterator yielding
normalized [FileInfo] values. [compare::compare_trees] diffs two such
trees with threshold-based size regression checks.

The deb and rpm readers run their unpacking on a producer thread that
feeds decompressed bytes through an [pipe::InProcessPipe] into the
format reader on the consuming side, so no intermediate files are
written.
*/

pub mod compare;
pub mod deb;
pub mod fs;
pub mod pipe;
pub mod rpm;
pub mod saved;
pub mod tar;

pub use pkg_manifest::FileInfo;

use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] archive_writer::Error),

    #[error("cpio error: {0}")]
    Cpio(#[from] cpio_reader::Error),

    #[error("rpm error: {0}")]
    Rpm(#[from] rpm_packaging::RpmError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("write to closed pipe")]
    PipeClosed,

    #[error("invalid filter pattern: {0}")]
    BadPattern(#[from] regex::Error),

    #[error("cannot determine input type for: {0}")]
    UnknownInput(String),

    #[error("{0} does not contain a data member")]
    NoDataMember(String),
}

/// Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// An iterator over the normalized contents of a tree.
///
/// Instances are not restartable; create a fresh reader to iterate
/// again.
pub trait TreeReader {
    /// The next entry, or `None` once the tree is exhausted.
    fn next(&mut self) -> Result<Option<FileInfo>>;

    /// Whether the reader has yielded its last entry.
    fn is_done(&self) -> bool;
}

/// Create the appropriate [TreeReader] for an input path.
///
/// Selection is by extension (`.json`, `.deb`, `.rpm`, tar variants);
/// directories get a filesystem walker.
pub fn open_tree(path: impl AsRef<Path>) -> Result<Box<dyn TreeReader>> {
    let path = path.as_ref();
    let name = path.to_string_lossy();

    if name.ends_with(".json") {
        Ok(Box::new(saved::SavedTreeReader::open(path)?))
    } else if name.ends_with(".deb") {
        Ok(Box::new(deb::DebTreeReader::open(path)?))
    } else if name.ends_with(".rpm") {
        Ok(Box::new(rpm::RpmTreeReader::open(path)?))
    } else if [".tar", ".tar.gz", ".tar.bz2", ".tar.xz", ".tar.lzma", ".tgz"]
        .iter()
        .any(|ext| name.ends_with(ext))
    {
        Ok(Box::new(tar::TarTreeReader::open(path)?))
    } else if path.is_dir() {
        Ok(Box::new(fs::FileSystemReader::new(path)?))
    } else {
        Err(Error::UnknownInput(name.to_string()))
    }
}
