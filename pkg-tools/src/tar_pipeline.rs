// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Manifest-driven tar building.
//!
//! Resolves each manifest entry's effective mode and ownership from,
//! in increasing precedence, global CLI defaults, per-path CLI remaps,
//! and the manifest entry itself, then dispatches to the tar writer.

use {
    anyhow::{Context, Result},
    archive_writer::tar::{Ownership, TarMergeOptions, TarWriter},
    is_executable::IsExecutable,
    pkg_manifest::{EntryKind, ManifestEntry},
    std::{collections::HashMap, path::Path},
};

/// Effective attributes for one destination path.
#[derive(Clone, Debug)]
pub struct FileAttributes {
    pub mode: Option<u32>,
    pub ids: (u64, u64),
    pub names: (String, String),
}

/// Resolves per-path attributes from CLI defaults and remap tables.
#[derive(Clone, Debug, Default)]
pub struct AttributeResolver {
    pub default_mode: Option<u32>,
    pub mode_map: HashMap<String, u32>,
    pub default_ids: (u64, u64),
    pub ids_map: HashMap<String, (u64, u64)>,
    pub default_names: (String, String),
    pub names_map: HashMap<String, (String, String)>,
}

impl AttributeResolver {
    /// Attributes for a destination path, leading slash ignored.
    pub fn resolve(&self, path: &str) -> FileAttributes {
        let path = path.strip_prefix('/').unwrap_or(path);

        FileAttributes {
            mode: self.mode_map.get(path).copied().or(self.default_mode),
            ids: self
                .ids_map
                .get(path)
                .cloned()
                .unwrap_or(self.default_ids),
            names: self
                .names_map
                .get(path)
                .cloned()
                .unwrap_or_else(|| self.default_names.clone()),
        }
    }
}

/// Drives a [TarWriter] from manifest entries.
pub struct TarPipeline {
    writer: TarWriter,
    /// Optional directory all entries are stored under.
    directory: Option<String>,
    resolver: AttributeResolver,
}

impl TarPipeline {
    pub fn new(writer: TarWriter, directory: Option<String>, resolver: AttributeResolver) -> Self {
        let directory = directory.filter(|d| !d.is_empty() && d.as_str() != "/");

        Self {
            writer,
            directory,
            resolver,
        }
    }

    pub fn writer_mut(&mut self) -> &mut TarWriter {
        &mut self.writer
    }

    /// Join the `--directory` prefix onto a destination path.
    fn dest_path(&self, dest: &str) -> String {
        let dest = dest.trim_start_matches('/');

        match &self.directory {
            Some(directory) => format!("{}/{}", directory.trim_matches('/'), dest),
            None => dest.to_string(),
        }
    }

    /// Effective attributes for an entry: manifest values override the
    /// CLI remap, which overrides the global defaults.
    fn entry_attributes(&self, entry: &ManifestEntry) -> Result<FileAttributes> {
        let mut attrs = self.resolver.resolve(entry.dest.trim_matches('/'));

        if !entry.mode.is_empty() {
            attrs.mode = Some(
                u32::from_str_radix(&entry.mode, 8)
                    .with_context(|| format!("invalid mode for {}: {}", entry.dest, entry.mode))?,
            );
        }
        if !entry.user.is_empty() {
            if !entry.group.is_empty() {
                attrs.names = (entry.user.clone(), entry.group.clone());
            } else {
                attrs.names = (entry.user.clone(), attrs.names.1.clone());
            }
        }
        if let (Some(uid), Some(gid)) = (entry.uid, entry.gid) {
            attrs.ids = (uid as u64, gid as u64);
        }

        Ok(attrs)
    }

    /// Add one manifest entry to the archive.
    pub fn add_manifest_entry(&mut self, entry: &ManifestEntry) -> Result<()> {
        let attrs = self.entry_attributes(entry)?;
        let owner = Ownership {
            uid: attrs.ids.0,
            gid: attrs.ids.1,
            uname: attrs.names.0.clone(),
            gname: attrs.names.1.clone(),
        };
        let dest = self.dest_path(&entry.dest);

        match entry.kind {
            EntryKind::Symlink | EntryKind::RawSymlink => {
                self.writer
                    .add_symlink(&dest, &entry.src, &owner, None, attrs.mode)?;
            }
            EntryKind::Dir => {
                self.writer.add_directory(&dest, &owner, None, attrs.mode)?;
            }
            EntryKind::Tree => {
                self.writer
                    .add_tree(Path::new(&entry.src), &dest, &owner, attrs.mode)?;
            }
            EntryKind::EmptyFile => {
                self.writer
                    .add_file_with_content(&dest, b"", &owner, None, attrs.mode)?;
            }
            EntryKind::File => {
                let src = Path::new(&entry.src);
                let mode = attrs.mode.unwrap_or(if src.is_executable() {
                    0o755
                } else {
                    0o644
                });
                self.writer
                    .add_file_from_path(&dest, src, &owner, None, Some(mode))?;
            }
        }

        Ok(())
    }

    /// Merge another tar, relocating it under the `--directory` prefix.
    pub fn add_tar(&mut self, path: &Path) -> Result<()> {
        let options = TarMergeOptions {
            numeric: true,
            root: self.directory.clone(),
            ..Default::default()
        };
        self.writer.add_tar(path, &options)?;

        Ok(())
    }

    /// Merge the data member of a `.deb` package.
    pub fn add_deb(&mut self, path: &Path) -> Result<()> {
        let options = TarMergeOptions {
            numeric: true,
            root: self.directory.clone(),
            ..Default::default()
        };
        self.writer.add_deb(path, &options)?;

        Ok(())
    }

    /// Add an empty directory at the archive root.
    pub fn add_empty_root_dir(&mut self, path: &str) -> Result<()> {
        let attrs = self.resolver.resolve(path.trim_start_matches('/'));
        let owner = Ownership {
            uid: attrs.ids.0,
            gid: attrs.ids.1,
            uname: attrs.names.0.clone(),
            gname: attrs.names.1.clone(),
        };
        self.writer.add_empty_root_dir(path, &owner, attrs.mode)?;

        Ok(())
    }

    /// Finish the archive.
    pub fn close(&mut self) -> Result<()> {
        self.writer.close()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, pkg_manifest::parse_entries};

    fn read_entries(path: &Path) -> Vec<(String, u64, u32)> {
        let mut archive = tar::Archive::new(std::fs::File::open(path).unwrap());
        archive
            .entries()
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                let header = e.header();
                (
                    e.path().unwrap().to_string_lossy().to_string(),
                    header.mtime().unwrap(),
                    header.mode().unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn test_manifest_to_tar() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        std::fs::write(dir.path().join("A"), "aaa")?;
        std::fs::write(dir.path().join("B"), "bb")?;

        let manifest = format!(
            r#"[
                {{"type": "file", "dest": "etc/a", "src": "{0}/A", "mode": "", "user": "", "group": ""}},
                {{"type": "file", "dest": "etc/b", "src": "{0}/B", "mode": "", "user": "", "group": ""}},
                {{"type": "symlink", "dest": "usr/bin/java", "src": "/path/to/bin/java", "mode": "", "user": "", "group": ""}}
            ]"#,
            dir.path().display()
        );
        let entries = parse_entries(&manifest).unwrap();

        let output = dir.path().join("out.tar");
        let writer = TarWriter::builder()
            .root_directory("./")
            .default_mtime(archive_writer::PORTABLE_MTIME)
            .create(&output)
            .unwrap();

        let mut pipeline =
            TarPipeline::new(writer, None, AttributeResolver::default());
        for entry in &entries {
            pipeline.add_manifest_entry(entry)?;
        }
        pipeline.close()?;

        let contents = read_entries(&output);
        let names = contents.iter().map(|(n, _, _)| n.as_str()).collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "./etc/",
                "./etc/a",
                "./etc/b",
                "./usr/",
                "./usr/bin/",
                "./usr/bin/java",
            ]
        );

        for (name, mtime, mode) in &contents {
            assert_eq!(*mtime, archive_writer::PORTABLE_MTIME);
            if name.ends_with('/') {
                assert_eq!(*mode, 0o755);
            } else if name != "./usr/bin/java" {
                assert_eq!(*mode, 0o644);
            }
        }

        Ok(())
    }

    #[test]
    fn test_attribute_precedence() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        std::fs::write(dir.path().join("F"), "x")?;

        let resolver = AttributeResolver {
            default_mode: Some(0o640),
            mode_map: HashMap::from([("remapped".to_string(), 0o600)]),
            default_ids: (1, 1),
            ids_map: HashMap::new(),
            default_names: ("build".to_string(), "build".to_string()),
            names_map: HashMap::new(),
        };

        let manifest = format!(
            r#"[
                {{"type": "file", "dest": "plain", "src": "{0}/F", "mode": "", "user": "", "group": ""}},
                {{"type": "file", "dest": "remapped", "src": "{0}/F", "mode": "", "user": "", "group": ""}},
                {{"type": "file", "dest": "override", "src": "{0}/F", "mode": "0400", "user": "app", "group": "app"}}
            ]"#,
            dir.path().display()
        );
        let entries = parse_entries(&manifest).unwrap();

        let output = dir.path().join("out.tar");
        let writer = TarWriter::builder().create(&output).unwrap();
        let mut pipeline = TarPipeline::new(writer, None, resolver);
        for entry in &entries {
            pipeline.add_manifest_entry(entry)?;
        }
        pipeline.close()?;

        let mut archive = tar::Archive::new(std::fs::File::open(&output).unwrap());
        for entry in archive.entries().unwrap() {
            let entry = entry.unwrap();
            let header = entry.header();
            match entry.path().unwrap().to_string_lossy().as_ref() {
                "plain" => {
                    assert_eq!(header.mode().unwrap(), 0o640);
                    assert_eq!(header.uid().unwrap(), 1);
                    assert_eq!(header.username().unwrap().unwrap(), "build");
                }
                "remapped" => assert_eq!(header.mode().unwrap(), 0o600),
                "override" => {
                    assert_eq!(header.mode().unwrap(), 0o400);
                    assert_eq!(header.username().unwrap().unwrap(), "app");
                }
                other => panic!("unexpected entry {}", other),
            }
        }

        Ok(())
    }

    #[test]
    fn test_directory_prefix() -> Result<()> {
        let dir = tempfile::TempDir::new()?;

        let manifest = r#"[{"type": "dir", "dest": "/logs", "mode": "0711", "user": "", "group": ""}]"#;
        let entries = parse_entries(manifest).unwrap();

        let output = dir.path().join("out.tar");
        let writer = TarWriter::builder().create(&output).unwrap();
        let mut pipeline = TarPipeline::new(
            writer,
            Some("var".to_string()),
            AttributeResolver::default(),
        );
        for entry in &entries {
            pipeline.add_manifest_entry(entry)?;
        }
        pipeline.close()?;

        let contents = read_entries(&output);
        let names = contents.iter().map(|(n, _, _)| n.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["var/", "var/logs/"]);

        Ok(())
    }
}
