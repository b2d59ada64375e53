// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Saved tree snapshots.
//!
//! A tree can be serialized to JSON and later replayed as the expected
//! side of a comparison. Modes are stored as octal strings; uid/gid 0
//! are omitted and restored as defaults on load.

use {
    crate::{FileInfo, Result, TreeReader},
    serde::{Deserialize, Serialize},
    std::{fs::File, io::BufWriter, path::Path},
};

#[derive(Debug, Deserialize, Serialize)]
struct SavedEntry {
    path: String,
    #[serde(default)]
    size: u64,
    mode: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    uid: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    gid: u32,
    #[serde(default)]
    is_dir: bool,
    #[serde(default)]
    is_symlink: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<String>,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

impl SavedEntry {
    fn from_info(info: &FileInfo) -> Self {
        Self {
            path: info.path.clone(),
            size: info.size,
            mode: format!("{:o}", info.mode),
            uid: info.uid,
            gid: info.gid,
            is_dir: info.is_dir,
            is_symlink: info.is_symlink,
            target: info.symlink_target.clone(),
        }
    }

    fn into_info(self) -> Result<FileInfo> {
        let mode = u32::from_str_radix(&self.mode, 8).map_err(|_| {
            crate::Error::UnknownInput(format!("bad mode in saved tree: {}", self.mode))
        })?;

        Ok(FileInfo {
            path: FileInfo::normalize_path(&self.path).to_string(),
            size: self.size,
            mode,
            uid: self.uid,
            gid: self.gid,
            is_dir: self.is_dir,
            is_symlink: self.is_symlink,
            symlink_target: self.target,
            ..Default::default()
        })
    }
}

/// Write a tree snapshot to a JSON file.
pub fn write_tree(output: impl AsRef<Path>, items: &[FileInfo]) -> Result<()> {
    let entries = items.iter().map(SavedEntry::from_info).collect::<Vec<_>>();

    let writer = BufWriter::new(File::create(output)?);
    serde_json::to_writer_pretty(writer, &entries)?;

    Ok(())
}

/// Replays a previously written snapshot, sorted by path.
pub struct SavedTreeReader {
    items: std::vec::IntoIter<FileInfo>,
    done: bool,
}

impl SavedTreeReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let raw: Vec<SavedEntry> = serde_json::from_reader(File::open(path)?)?;

        let mut items = raw
            .into_iter()
            .map(|e| e.into_info())
            .collect::<Result<Vec<_>>>()?;
        items.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(Self {
            items: items.into_iter(),
            done: false,
        })
    }
}

impl TreeReader for SavedTreeReader {
    fn next(&mut self) -> Result<Option<FileInfo>> {
        match self.items.next() {
            Some(info) => Ok(Some(info)),
            None => {
                self.done = true;
                Ok(None)
            }
        }
    }

    fn is_done(&self) -> bool {
        self.done
    }
}
