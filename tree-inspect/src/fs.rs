// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Filesystem directory tree reading.

use {
    crate::{FileInfo, Result, TreeReader},
    std::{
        collections::VecDeque,
        path::{Path, PathBuf},
    },
};

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

/// Walks a directory tree yielding normalized [FileInfo] values.
///
/// At each level subdirectories are yielded first, then files, both in
/// alphabetical order, before descending into each subdirectory in
/// order. Symlinks are reported with their target and never followed.
pub struct FileSystemReader {
    root: PathBuf,
    /// Directories still to list, depth first.
    to_visit: Vec<PathBuf>,
    pending: VecDeque<FileInfo>,
    done: bool,
}

impl FileSystemReader {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().canonicalize()?;

        Ok(Self {
            to_visit: vec![root.clone()],
            root,
            pending: VecDeque::new(),
            done: false,
        })
    }

    fn rel_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace(std::path::MAIN_SEPARATOR, "/")
    }

    fn stat_entry(&self, path: &Path, treat_dir_as_dir: bool) -> Result<FileInfo> {
        let metadata = std::fs::symlink_metadata(path)?;
        let is_symlink = metadata.file_type().is_symlink();

        let symlink_target = if is_symlink {
            Some(
                std::fs::read_link(path)?
                    .to_string_lossy()
                    .to_string(),
            )
        } else {
            None
        };

        #[cfg(unix)]
        let (mode, uid, gid) = (metadata.mode(), metadata.uid(), metadata.gid());
        #[cfg(not(unix))]
        let (mode, uid, gid) = (0o644u32, 0u32, 0u32);

        let is_dir = treat_dir_as_dir && !is_symlink;

        Ok(FileInfo {
            path: self.rel_path(path),
            size: if is_dir || is_symlink { 0 } else { metadata.len() },
            mode,
            uid,
            gid,
            is_dir,
            is_symlink,
            symlink_target,
            ..Default::default()
        })
    }

    /// List one directory, queueing its entries and descendants.
    fn visit(&mut self, dir: &Path) -> Result<()> {
        let mut dirs = Vec::new();
        let mut files = Vec::new();

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() && !file_type.is_symlink() {
                dirs.push(entry.path());
            } else {
                files.push(entry.path());
            }
        }

        dirs.sort();
        files.sort();

        for path in &dirs {
            let info = self.stat_entry(path, true)?;
            self.pending.push_back(info);
        }
        for path in &files {
            let info = self.stat_entry(path, false)?;
            self.pending.push_back(info);
        }

        // Depth first: the first subdirectory is listed next.
        for path in dirs.into_iter().rev() {
            self.to_visit.push(path);
        }

        Ok(())
    }
}

impl TreeReader for FileSystemReader {
    fn next(&mut self) -> Result<Option<FileInfo>> {
        loop {
            if let Some(info) = self.pending.pop_front() {
                return Ok(Some(info));
            }

            match self.to_visit.pop() {
                Some(dir) => self.visit(&dir)?,
                None => {
                    self.done = true;
                    return Ok(None);
                }
            }
        }
    }

    fn is_done(&self) -> bool {
        self.done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(reader: &mut dyn TreeReader) -> Result<Vec<FileInfo>> {
        let mut out = Vec::new();
        while let Some(info) = reader.next()? {
            out.push(info);
        }
        Ok(out)
    }

    #[test]
    fn test_walk_order() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let root = dir.path();

        std::fs::create_dir_all(root.join("b/inner"))?;
        std::fs::create_dir_all(root.join("a"))?;
        std::fs::write(root.join("top.txt"), "t")?;
        std::fs::write(root.join("a/file"), "f")?;
        std::fs::write(root.join("b/inner/deep"), "d")?;

        let mut reader = FileSystemReader::new(root)?;
        let infos = collect(&mut reader)?;
        let paths = infos.iter().map(|i| i.path.as_str()).collect::<Vec<_>>();

        // Dirs before files at each level, then depth-first descent.
        assert_eq!(
            paths,
            vec!["a", "b", "top.txt", "a/file", "b/inner", "b/inner/deep"]
        );
        assert!(reader.is_done());

        Ok(())
    }

    #[test]
    fn test_symlink_reported_not_followed() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let root = dir.path();

        std::fs::create_dir(root.join("real"))?;
        std::fs::write(root.join("real/file"), "x")?;
        std::os::unix::fs::symlink("real", root.join("lnk"))?;

        let mut reader = FileSystemReader::new(root)?;
        let infos = collect(&mut reader)?;

        let link = infos.iter().find(|i| i.path == "lnk").unwrap();
        assert!(link.is_symlink);
        assert!(!link.is_dir);
        assert_eq!(link.symlink_target.as_deref(), Some("real"));
        assert_eq!(link.size, 0);

        // The symlink was not descended into.
        assert!(!infos.iter().any(|i| i.path == "lnk/file"));
        assert!(infos.iter().any(|i| i.path == "real/file"));

        Ok(())
    }

    #[test]
    fn test_file_metadata() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        std::fs::write(dir.path().join("f"), "12345")?;

        let mut reader = FileSystemReader::new(dir.path())?;
        let infos = collect(&mut reader)?;

        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].size, 5);
        assert!(!infos[0].is_dir);
        // Regular file type bits from the raw st_mode.
        assert_eq!(infos[0].mode & 0o170000, 0o100000);

        Ok(())
    }
}
