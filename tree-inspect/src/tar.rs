// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Streaming tar tree reading.

use {
    crate::{Error, FileInfo, Result, TreeReader},
    std::{io::Read, path::Path, sync::mpsc, thread},
};

/// Reads a tar stream, yielding a [FileInfo] per member.
///
/// Entries named `` or `./` are skipped. Hardlinks and symlinks both
/// surface as symlinks with their target set, so downstream comparison
/// treats them uniformly.
pub struct TarTreeReader {
    receiver: mpsc::Receiver<Result<FileInfo>>,
    done: bool,
}

impl TarTreeReader {
    /// Open a tar file, transparently decompressing it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_reader(
            archive_writer::compression::open_decompressed(path)?,
        ))
    }

    /// Read a tar stream, e.g. the consuming end of a pipe.
    ///
    /// Parsing runs on its own thread; entries arrive through a
    /// channel sized to keep the producer from racing ahead.
    pub fn from_reader(reader: Box<dyn Read + Send>) -> Self {
        let (sender, receiver) = mpsc::sync_channel(64);

        thread::spawn(move || pump_entries(reader, sender));

        Self {
            receiver,
            done: false,
        }
    }
}

fn pump_entries(reader: Box<dyn Read + Send>, sender: mpsc::SyncSender<Result<FileInfo>>) {
    let mut archive = tar::Archive::new(reader);

    let entries = match archive.entries() {
        Ok(entries) => entries,
        Err(e) => {
            let _ = sender.send(Err(e.into()));
            return;
        }
    };

    for entry in entries {
        let result = entry
            .map_err(Error::from)
            .and_then(|entry| entry_to_info(&entry));

        match result {
            Ok(Some(info)) => {
                if sender.send(Ok(info)).is_err() {
                    // Consumer went away; stop parsing.
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => {
                let _ = sender.send(Err(e));
                return;
            }
        }
    }
}

fn entry_to_info<R: Read>(entry: &tar::Entry<R>) -> Result<Option<FileInfo>> {
    let name = entry.path()?.to_string_lossy().to_string();
    if name.is_empty() || name == "./" {
        return Ok(None);
    }

    let header = entry.header();
    let entry_type = header.entry_type();

    let is_symlink =
        entry_type == tar::EntryType::Symlink || entry_type == tar::EntryType::Link;
    let is_dir = entry_type == tar::EntryType::Directory && !is_symlink;

    let symlink_target = if is_symlink {
        entry
            .link_name()?
            .map(|l| l.to_string_lossy().to_string())
    } else {
        None
    };

    Ok(Some(FileInfo {
        path: FileInfo::normalize_path(name.trim_end_matches('/')).to_string(),
        size: if is_dir || is_symlink {
            0
        } else {
            header.size()?
        },
        mode: header.mode()?,
        uid: header.uid()? as u32,
        gid: header.gid()? as u32,
        is_dir,
        is_symlink,
        symlink_target,
        ..Default::default()
    }))
}

impl TreeReader for TarTreeReader {
    fn next(&mut self) -> Result<Option<FileInfo>> {
        if self.done {
            return Ok(None);
        }

        match self.receiver.recv() {
            Ok(Ok(info)) => Ok(Some(info)),
            Ok(Err(e)) => {
                self.done = true;
                Err(e)
            }
            Err(_) => {
                self.done = true;
                Ok(None)
            }
        }
    }

    fn is_done(&self) -> bool {
        self.done
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        archive_writer::tar::{Ownership, TarWriter},
    };

    #[test]
    fn test_round_trip_with_writer() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("t.tar");

        let mut writer = TarWriter::builder()
            .root_directory("./")
            .default_mtime(archive_writer::PORTABLE_MTIME)
            .create(&path)
            .unwrap();
        let owner = Ownership {
            uid: 12,
            gid: 34,
            uname: String::new(),
            gname: String::new(),
        };
        writer
            .add_file_with_content("etc/a", b"AAAA", &owner, None, None)
            .unwrap();
        writer
            .add_symlink("usr/bin/java", "/path/to/bin/java", &owner, None, None)
            .unwrap();
        writer.close().unwrap();

        let mut reader = TarTreeReader::open(&path)?;
        let mut infos = Vec::new();
        while let Some(info) = reader.next()? {
            infos.push(info);
        }

        let paths = infos.iter().map(|i| i.path.as_str()).collect::<Vec<_>>();
        assert_eq!(paths, vec!["etc", "etc/a", "usr", "usr/bin", "usr/bin/java"]);

        let file = infos.iter().find(|i| i.path == "etc/a").unwrap();
        assert_eq!(file.size, 4);
        assert_eq!(file.mode, 0o644);
        assert_eq!(file.uid, 12);
        assert_eq!(file.gid, 34);

        let link = infos.iter().find(|i| i.path == "usr/bin/java").unwrap();
        assert!(link.is_symlink);
        assert_eq!(link.symlink_target.as_deref(), Some("/path/to/bin/java"));
        assert_eq!(link.size, 0);

        let dir_info = infos.iter().find(|i| i.path == "etc").unwrap();
        assert!(dir_info.is_dir);
        assert_eq!(dir_info.mode, 0o755);

        assert!(reader.is_done());

        Ok(())
    }

    #[test]
    fn test_gzip_tar() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("t.tar.gz");

        let mut writer = TarWriter::builder()
            .compression(archive_writer::compression::Compression::Gzip)
            .create(&path)
            .unwrap();
        writer
            .add_file_with_content("f", b"x", &Ownership::root(), None, None)
            .unwrap();
        writer.close().unwrap();

        let mut reader = TarTreeReader::open(&path)?;
        let info = reader.next()?.unwrap();
        assert_eq!(info.path, "f");
        assert!(reader.next()?.is_none());

        Ok(())
    }
}
