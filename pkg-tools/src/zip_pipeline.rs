// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Manifest-driven zip building.

use {
    anyhow::{Context, Result},
    archive_writer::zip::ZipWriter,
    pkg_manifest::{EntryKind, ManifestEntry},
    std::path::Path,
};

/// Drives a [ZipWriter] from manifest entries.
pub struct ZipPipeline {
    writer: ZipWriter,
}

impl ZipPipeline {
    pub fn new(writer: ZipWriter) -> Self {
        Self { writer }
    }

    fn entry_mode(entry: &ManifestEntry) -> Result<Option<u32>> {
        if entry.mode.is_empty() {
            Ok(None)
        } else {
            Ok(Some(u32::from_str_radix(&entry.mode, 8).with_context(
                || format!("invalid mode for {}: {}", entry.dest, entry.mode),
            )?))
        }
    }

    /// Add one manifest entry to the archive.
    pub fn add_manifest_entry(&mut self, entry: &ManifestEntry) -> Result<()> {
        let mode = Self::entry_mode(entry)?;
        let dest = entry.dest.trim_matches('/');

        match entry.kind {
            EntryKind::File => {
                self.writer.add_file(dest, Path::new(&entry.src), mode)?;
            }
            EntryKind::Dir => {
                self.writer.add_directory(dest, mode)?;
            }
            EntryKind::Symlink | EntryKind::RawSymlink => {
                self.writer.add_symlink(dest, &entry.src, mode)?;
            }
            EntryKind::Tree => {
                self.writer.add_tree(Path::new(&entry.src), dest, mode)?;
            }
            EntryKind::EmptyFile => {
                self.writer.add_empty_file(dest, mode)?;
            }
        }

        Ok(())
    }

    /// Finish the archive.
    pub fn close(&mut self) -> Result<()> {
        self.writer.close()?;

        Ok(())
    }
}
