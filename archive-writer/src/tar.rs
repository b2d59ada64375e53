// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Deterministic tar archive building.
//!
//! [TarWriter] produces byte-identical output for identical inputs. It
//! synthesizes parent directory entries, suppresses duplicate members,
//! can merge existing tar archives and the data member of `.deb`
//! packages, and pipes its output through built-in compressors or an
//! external compressor command.

use {
    crate::{
        ar::ArReader,
        compression::{open_decompressed, Compression},
        Error, Result,
    },
    is_executable::IsExecutable,
    std::{
        collections::{BTreeMap, HashSet},
        fs::File,
        io::{BufWriter, Read, Write},
        path::{Path, PathBuf},
        process::{Child, Command, Stdio},
    },
};

/// Ownership applied to emitted entries.
#[derive(Clone, Debug, Default)]
pub struct Ownership {
    pub uid: u64,
    pub gid: u64,
    pub uname: String,
    pub gname: String,
}

impl Ownership {
    pub fn root() -> Self {
        Self::default()
    }
}

/// Options controlling [TarWriter::add_tar].
#[derive(Default)]
pub struct TarMergeOptions<'a> {
    /// User id to rewrite to uid 0 / `root`.
    pub rootuid: Option<u64>,
    /// Group id to rewrite to gid 0 / `root`.
    pub rootgid: Option<u64>,
    /// Erase user and group names, keeping only numeric ids.
    pub numeric: bool,
    /// Keep only entries for which this returns true.
    pub name_filter: Option<&'a dyn Fn(&str) -> bool>,
    /// Place all non-absolute entries under this directory.
    pub root: Option<String>,
}

/// The sink tar bytes are written into.
enum Sink {
    File(BufWriter<File>),
    Gzip(flate2::write::GzEncoder<BufWriter<File>>),
    Bzip2(bzip2::write::BzEncoder<BufWriter<File>>),
    Xz(xz2::write::XzEncoder<BufWriter<File>>),
    Process(std::process::ChildStdin),
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::File(w) => w.write(buf),
            Self::Gzip(w) => w.write(buf),
            Self::Bzip2(w) => w.write(buf),
            Self::Xz(w) => w.write(buf),
            Self::Process(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::File(w) => w.flush(),
            Self::Gzip(w) => w.flush(),
            Self::Bzip2(w) => w.flush(),
            Self::Xz(w) => w.flush(),
            Self::Process(w) => w.flush(),
        }
    }
}

impl Sink {
    /// Finalize the compression stream and flush everything to disk.
    fn finish(self) -> std::io::Result<()> {
        match self {
            Self::File(mut w) => w.flush(),
            Self::Gzip(w) => w.finish()?.flush(),
            Self::Bzip2(w) => w.finish()?.flush(),
            Self::Xz(w) => w.finish()?.flush(),
            // Dropping stdin delivers EOF to the compressor.
            Self::Process(_) => Ok(()),
        }
    }
}

/// Configures and opens a [TarWriter].
pub struct TarWriterBuilder {
    compression: Compression,
    compressor: Option<String>,
    root_directory: Option<String>,
    default_mtime: u64,
    preserve_tar_mtimes: bool,
}

impl Default for TarWriterBuilder {
    fn default() -> Self {
        Self {
            compression: Compression::None,
            compressor: None,
            root_directory: None,
            default_mtime: 0,
            preserve_tar_mtimes: true,
        }
    }
}

impl TarWriterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a built-in compression format.
    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Pipe the tar stream through an external command instead of a
    /// built-in compressor. Takes precedence over [Self::compression].
    pub fn compressor(mut self, command: impl ToString) -> Self {
        let command = command.to_string();
        if !command.trim().is_empty() {
            self.compressor = Some(command.trim().to_string());
        }
        self
    }

    /// Virtual root to prepend to non-absolute member names.
    pub fn root_directory(mut self, directory: &str) -> Self {
        let directory = directory.trim_end_matches('/');
        if !directory.is_empty() {
            self.root_directory = Some(format!("{}/", directory));
        }
        self
    }

    /// The mtime applied to entries that don't carry their own.
    pub fn default_mtime(mut self, mtime: u64) -> Self {
        self.default_mtime = mtime;
        self
    }

    /// Whether merged tar entries keep their original mtimes.
    pub fn preserve_tar_mtimes(mut self, preserve: bool) -> Self {
        self.preserve_tar_mtimes = preserve;
        self
    }

    /// Open the output file and construct the writer.
    pub fn create(self, path: impl AsRef<Path>) -> Result<TarWriter> {
        let path = path.as_ref();
        let file = File::create(path)?;
        let buffered = BufWriter::new(file);

        let mut child = None;
        let sink = if let Some(command) = &self.compressor {
            let parts = command.split_whitespace().collect::<Vec<_>>();
            // The output file doubles as the subprocess stdout; close our
            // own handle so the child owns it exclusively.
            drop(buffered);
            let stdout = File::create(path)?;
            let mut process = Command::new(parts[0])
                .args(&parts[1..])
                .stdin(Stdio::piped())
                .stdout(stdout)
                .spawn()
                .map_err(|e| Error::Compressor(format!("spawning {}: {}", command, e)))?;
            let stdin = process
                .stdin
                .take()
                .ok_or_else(|| Error::Compressor("compressor stdin unavailable".to_string()))?;
            child = Some(process);
            Sink::Process(stdin)
        } else {
            match self.compression {
                Compression::None => Sink::File(buffered),
                Compression::Gzip => Sink::Gzip(
                    // Deterministic output needs an explicit gzip header
                    // mtime; it defaults to the current time.
                    flate2::GzBuilder::new()
                        .mtime(self.default_mtime as u32)
                        .write(buffered, flate2::Compression::new(9)),
                ),
                Compression::Bzip2 => Sink::Bzip2(bzip2::write::BzEncoder::new(
                    buffered,
                    bzip2::Compression::best(),
                )),
                Compression::Xz => Sink::Xz(xz2::write::XzEncoder::new(buffered, 6)),
                Compression::Lzma => {
                    let options = xz2::stream::LzmaOptions::new_preset(6)
                        .map_err(|e| Error::Compressor(format!("lzma options: {}", e)))?;
                    let stream = xz2::stream::Stream::new_lzma_encoder(&options)
                        .map_err(|e| Error::Compressor(format!("lzma encoder: {}", e)))?;
                    Sink::Xz(xz2::write::XzEncoder::new_stream(buffered, stream))
                }
            }
        };

        Ok(TarWriter {
            builder: Some(tar::Builder::new(sink)),
            child,
            compressor_cmd: self.compressor,
            default_mtime: self.default_mtime,
            preserve_tar_mtimes: self.preserve_tar_mtimes,
            root_directory: self.root_directory,
            members: HashSet::new(),
            directories: HashSet::new(),
        })
    }
}

/// A deterministic tar archive writer.
pub struct TarWriter {
    builder: Option<tar::Builder<Sink>>,
    child: Option<Child>,
    compressor_cmd: Option<String>,
    default_mtime: u64,
    preserve_tar_mtimes: bool,
    root_directory: Option<String>,
    /// Names already emitted, directories with a trailing `/`.
    members: HashSet<String>,
    /// Directories already emitted, without the trailing `/`.
    directories: HashSet<String>,
}

enum Payload<'a> {
    None,
    Bytes(&'a [u8]),
    File(&'a Path),
}

impl TarWriter {
    pub fn builder() -> TarWriterBuilder {
        TarWriterBuilder::new()
    }

    /// The writer's default mtime.
    pub fn default_mtime(&self) -> u64 {
        self.default_mtime
    }

    /// Apply the root prefix to a member name.
    ///
    /// Absolute paths and paths already under the root are unchanged.
    fn rooted(&self, path: &str) -> String {
        let path = path.trim_end_matches('/');

        if let Some(root) = &self.root_directory {
            if !path.starts_with('/') && !format!("{}/", path).starts_with(root.as_str()) {
                return format!("{}{}", root, path);
            }
        }

        path.to_string()
    }

    /// Add a regular file with in-memory content.
    pub fn add_file_with_content(
        &mut self,
        name: &str,
        content: &[u8],
        owner: &Ownership,
        mtime: Option<u64>,
        mode: Option<u32>,
    ) -> Result<()> {
        self.add_entry(
            name,
            tar::EntryType::Regular,
            Payload::Bytes(content),
            None,
            owner,
            mtime,
            mode,
        )
    }

    /// Add a regular file with content from the filesystem.
    pub fn add_file_from_path(
        &mut self,
        name: &str,
        src: &Path,
        owner: &Ownership,
        mtime: Option<u64>,
        mode: Option<u32>,
    ) -> Result<()> {
        self.add_entry(
            name,
            tar::EntryType::Regular,
            Payload::File(src),
            None,
            owner,
            mtime,
            mode,
        )
    }

    /// Add a directory entry.
    pub fn add_directory(
        &mut self,
        name: &str,
        owner: &Ownership,
        mtime: Option<u64>,
        mode: Option<u32>,
    ) -> Result<()> {
        self.add_entry(
            name,
            tar::EntryType::Directory,
            Payload::None,
            None,
            owner,
            mtime,
            mode,
        )
    }

    /// Add a symbolic link pointing at `target`.
    pub fn add_symlink(
        &mut self,
        name: &str,
        target: &str,
        owner: &Ownership,
        mtime: Option<u64>,
        mode: Option<u32>,
    ) -> Result<()> {
        self.add_entry(
            name,
            tar::EntryType::Symlink,
            Payload::None,
            Some(target),
            owner,
            mtime,
            mode,
        )
    }

    /// Add a directory at the root of the archive, bypassing the root
    /// prefix.
    pub fn add_empty_root_dir(
        &mut self,
        name: &str,
        owner: &Ownership,
        mode: Option<u32>,
    ) -> Result<()> {
        let saved = self.root_directory.take();
        let destpath = name.trim_end_matches('/');
        if !destpath.is_empty() {
            self.root_directory = Some(format!("{}/", destpath));
        }
        let res = self.add_directory(name, owner, None, mode);
        self.root_directory = saved;
        res
    }

    /// Add a filesystem subtree under `destpath`.
    ///
    /// Files and intermediate directories are emitted in lexicographic
    /// destination order. Per-file mode defaults to 0o755 when the
    /// source file is executable, else 0o644.
    pub fn add_tree(
        &mut self,
        tree_top: &Path,
        destpath: &str,
        owner: &Ownership,
        mode: Option<u32>,
    ) -> Result<()> {
        let dest = destpath.trim_matches('/');

        let mut to_write: BTreeMap<String, Option<PathBuf>> = BTreeMap::new();

        for entry in walkdir::WalkDir::new(tree_top)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        {
            let entry = entry.map_err(std::io::Error::from)?;
            if entry.path() == tree_top {
                continue;
            }

            let rel = entry
                .path()
                .strip_prefix(tree_top)
                .map_err(|_| Error::BadHeader("tree walk escaped its root".to_string()))?
                .to_string_lossy()
                .replace(std::path::MAIN_SEPARATOR, "/");

            let dest_path = if dest.is_empty() {
                rel
            } else {
                format!("{}/{}", dest, rel)
            };

            if entry.file_type().is_dir() {
                to_write.insert(dest_path, None);
            } else {
                to_write.insert(dest_path, Some(entry.path().to_path_buf()));
            }
        }

        for (path, content) in to_write {
            match content {
                Some(src) => {
                    let f_mode = mode.unwrap_or(if src.is_executable() { 0o755 } else { 0o644 });
                    self.add_file_from_path(&path, &src, owner, None, Some(f_mode))?;
                }
                None => {
                    self.add_directory(&path, owner, None, mode)?;
                }
            }
        }

        Ok(())
    }

    /// Merge the contents of another tar archive into this one.
    ///
    /// The source may be compressed; the format is sniffed. Path PAX
    /// headers from the source do not survive the merge, so renames via
    /// [TarMergeOptions::root] always take effect.
    pub fn add_tar(&mut self, path: &Path, options: &TarMergeOptions) -> Result<()> {
        let root = options.root.as_ref().map(|r| {
            if !r.starts_with('/') && !r.starts_with('.') {
                format!("/{}", r)
            } else {
                r.clone()
            }
        });

        let reader = open_decompressed(path)?;
        let mut archive = tar::Archive::new(reader);

        for entry in archive.entries()? {
            let mut entry = entry?;

            let source_name = entry.path()?.to_string_lossy().to_string();
            if let Some(filter) = options.name_filter {
                if !filter(&source_name) {
                    continue;
                }
            }

            let mut header = entry.header().clone();

            if !self.preserve_tar_mtimes {
                header.set_mtime(self.default_mtime);
            }
            if let Some(rootuid) = options.rootuid {
                if header.uid()? == rootuid {
                    header.set_uid(0);
                    header.set_username("root")?;
                }
            }
            if let Some(rootgid) = options.rootgid {
                if header.gid()? == rootgid {
                    header.set_gid(0);
                    header.set_groupname("root")?;
                }
            }
            if options.numeric {
                header.set_username("")?;
                header.set_groupname("")?;
            }

            let mut name = self.rooted(&source_name);
            let mut link_override = None;

            if let Some(root) = &root {
                if name.starts_with('.') {
                    name = format!(".{}{}", root, name.trim_start_matches('.'));
                    // Add the relocation root with matching ownership.
                    // Directory deduplication makes this safe to repeat.
                    self.add_entry(
                        &format!(".{}", root),
                        tar::EntryType::Directory,
                        Payload::None,
                        None,
                        &Ownership {
                            uid: header.uid()?,
                            gid: header.gid()?,
                            uname: header.username().ok().flatten().unwrap_or("").to_string(),
                            gname: header.groupname().ok().flatten().unwrap_or("").to_string(),
                        },
                        Some(header.mtime()?),
                        Some(0o755),
                    )?;
                }

                // Internal hardlinks must move with their targets.
                if header.entry_type() == tar::EntryType::Link {
                    if let Some(link) = entry.link_name()? {
                        let link = link.to_string_lossy();
                        if link.starts_with('.') {
                            link_override =
                                Some(format!(".{}{}", root, link.trim_start_matches('.')));
                        }
                    }
                }
            }

            if let Some(link) = link_override {
                self.emit(header, &name, Some(&link), &mut entry)?;
            } else if header.entry_type() == tar::EntryType::Symlink
                || header.entry_type() == tar::EntryType::Link
            {
                let link = entry
                    .link_name()?
                    .map(|l| l.to_string_lossy().to_string())
                    .unwrap_or_default();
                self.emit(header, &name, Some(&link), &mut entry)?;
            } else {
                self.emit(header, &name, None, &mut entry)?;
            }
        }

        Ok(())
    }

    /// Merge the data member of a `.deb` package.
    pub fn add_deb(&mut self, path: &Path, options: &TarMergeOptions) -> Result<()> {
        let mut reader = ArReader::new(File::open(path)?)?;

        while let Some(entry) = reader.next_entry()? {
            if !entry.header.name.starts_with("data.") {
                continue;
            }

            let suffix = entry
                .header
                .name
                .rsplit_once('.')
                .map(|(_, ext)| format!(".{}", ext))
                .unwrap_or_default();
            let mut tmp = tempfile::Builder::new().suffix(&suffix).tempfile()?;
            tmp.write_all(&entry.data)?;

            return self.add_tar(tmp.path(), options);
        }

        Err(Error::BadHeader(format!(
            "{} does not contain a data member",
            path.display()
        )))
    }

    /// Core entry emission: normalization, root prefixing, parent
    /// directory synthesis, then the actual append.
    fn add_entry(
        &mut self,
        name: &str,
        kind: tar::EntryType,
        payload: Payload,
        link: Option<&str>,
        owner: &Ownership,
        mtime: Option<u64>,
        mode: Option<u32>,
    ) -> Result<()> {
        if name.is_empty() || name == "." {
            return Ok(());
        }

        let name = self.rooted(name.strip_prefix("./").unwrap_or(name));
        if name.is_empty() {
            return Ok(());
        }

        if kind == tar::EntryType::Directory && self.directories.contains(&name) {
            return Ok(());
        }

        let mtime = mtime.unwrap_or(self.default_mtime);

        // Synthesize missing parents, closest to the root first.
        if let Some((parent, _)) = name.rsplit_once('/') {
            self.add_entry(
                parent,
                tar::EntryType::Directory,
                Payload::None,
                None,
                owner,
                Some(mtime),
                Some(0o755),
            )?;
        }

        let mut header = tar::Header::new_gnu();
        header.set_mtime(mtime);
        header.set_uid(owner.uid);
        header.set_gid(owner.gid);
        header.set_username(&owner.uname)?;
        header.set_groupname(&owner.gname)?;
        header.set_entry_type(kind);
        header.set_mode(mode.unwrap_or(if kind == tar::EntryType::Regular {
            0o644
        } else {
            0o755
        }));

        match payload {
            Payload::None => {
                header.set_size(0);
                self.emit(header, &name, link, &mut std::io::empty())?;
            }
            Payload::Bytes(data) => {
                header.set_size(data.len() as u64);
                self.emit(header, &name, link, &mut std::io::Cursor::new(data))?;
            }
            Payload::File(path) => {
                let mut file = File::open(path)?;
                header.set_size(file.metadata()?.len());
                self.emit(header, &name, link, &mut file)?;
            }
        }

        if kind == tar::EntryType::Directory {
            self.directories.insert(name);
        }

        Ok(())
    }

    /// Append a fully-formed entry, deduplicating by name.
    fn emit(
        &mut self,
        mut header: tar::Header,
        name: &str,
        link: Option<&str>,
        data: &mut dyn Read,
    ) -> Result<()> {
        let mut key = name.to_string();
        if header.entry_type() == tar::EntryType::Directory && !key.ends_with('/') {
            key.push('/');
        }

        if self.members.contains(&key) {
            if header.entry_type() != tar::EntryType::Directory {
                log::warn!("duplicate entry in archive: {}; picking first occurrence", key);
            }
            return Ok(());
        }

        let builder = self.builder.as_mut().ok_or(Error::WriterClosed)?;

        set_entry_name(builder, &mut header, &key)?;
        if let Some(link) = link {
            set_entry_link(builder, &mut header, link)?;
        }
        header.set_cksum();
        builder.append(&header, data)?;

        self.members.insert(key);

        Ok(())
    }

    /// Close the archive, finalizing compression.
    ///
    /// A non-zero exit of the external compressor is an error. The
    /// writer cannot be used after closing.
    pub fn close(&mut self) -> Result<()> {
        let builder = self.builder.take().ok_or(Error::WriterClosed)?;
        let sink = builder.into_inner()?;
        sink.finish()?;

        if let Some(mut child) = self.child.take() {
            let status = child.wait()?;
            if !status.success() {
                return Err(Error::Compressor(format!(
                    "custom compression command \"{}\" failed",
                    self.compressor_cmd.as_deref().unwrap_or("")
                )));
            }
        }

        Ok(())
    }
}

impl Drop for TarWriter {
    fn drop(&mut self) {
        // An unclosed writer means the caller is abandoning the archive.
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Write an entry name into a header, emitting a GNU long name entry
/// when it does not fit the 100 byte field.
fn set_entry_name(
    builder: &mut tar::Builder<Sink>,
    header: &mut tar::Header,
    name: &str,
) -> Result<()> {
    // Stale path data from cloned headers must not leak through.
    if let Some(ustar) = header.as_ustar_mut() {
        ustar.prefix = [0; 155];
    }

    let bytes = name.as_bytes();
    let field = &mut header.as_old_mut().name;
    *field = [0; 100];

    if bytes.len() <= field.len() {
        field[..bytes.len()].copy_from_slice(bytes);
    } else {
        emit_gnu_long_entry(builder, bytes, tar::EntryType::new(b'L'))?;
        let truncated = &bytes[..field.len()];
        field.copy_from_slice(truncated);
    }

    Ok(())
}

/// Write an entry link name, with the same long-name treatment.
fn set_entry_link(
    builder: &mut tar::Builder<Sink>,
    header: &mut tar::Header,
    link: &str,
) -> Result<()> {
    let bytes = link.as_bytes();
    let field = &mut header.as_old_mut().linkname;
    *field = [0; 100];

    if bytes.len() <= field.len() {
        field[..bytes.len()].copy_from_slice(bytes);
    } else {
        emit_gnu_long_entry(builder, bytes, tar::EntryType::new(b'K'))?;
        let truncated = &bytes[..field.len()];
        field.copy_from_slice(truncated);
    }

    Ok(())
}

fn emit_gnu_long_entry(
    builder: &mut tar::Builder<Sink>,
    value: &[u8],
    kind: tar::EntryType,
) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    let name = b"././@LongLink";
    header.as_gnu_mut().unwrap().name[..name.len()].copy_from_slice(name);
    header.set_mode(0o644);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header.set_size(value.len() as u64 + 1);
    header.set_entry_type(kind);
    header.set_cksum();

    let mut data = value.chain(std::io::repeat(0).take(1));
    builder.append(&header, &mut data)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use {super::*, crate::PORTABLE_MTIME};

    fn read_names(path: &Path) -> Result<Vec<String>> {
        let mut archive = tar::Archive::new(open_decompressed(path)?);
        Ok(archive
            .entries()?
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect())
    }

    #[test]
    fn test_empty_tar() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("empty.tar");

        let mut writer = TarWriter::builder()
            .default_mtime(PORTABLE_MTIME)
            .create(&path)?;
        writer.close()?;

        // Just the two zero end-of-archive blocks.
        let data = std::fs::read(&path)?;
        assert_eq!(data.len(), 1024);
        assert!(data.iter().all(|b| *b == 0));

        Ok(())
    }

    #[test]
    fn test_parent_synthesis_and_order() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("out.tar");

        let mut writer = TarWriter::builder()
            .root_directory("./")
            .default_mtime(PORTABLE_MTIME)
            .create(&path)?;
        let owner = Ownership::root();
        writer.add_file_with_content("etc/a", b"A", &owner, None, None)?;
        writer.add_file_with_content("etc/b", b"B", &owner, None, None)?;
        writer.add_symlink("usr/bin/java", "/path/to/bin/java", &owner, None, None)?;
        writer.close()?;

        assert_eq!(
            read_names(&path)?,
            vec![
                "./etc/",
                "./etc/a",
                "./etc/b",
                "./usr/",
                "./usr/bin/",
                "./usr/bin/java",
            ]
        );

        let mut archive = tar::Archive::new(File::open(&path)?);
        for entry in archive.entries()? {
            let entry = entry?;
            let header = entry.header();
            assert_eq!(header.mtime()?, PORTABLE_MTIME);
            match header.entry_type() {
                tar::EntryType::Directory => assert_eq!(header.mode()?, 0o755),
                tar::EntryType::Regular => assert_eq!(header.mode()?, 0o644),
                tar::EntryType::Symlink => {
                    assert_eq!(
                        entry.link_name()?.unwrap().to_string_lossy(),
                        "/path/to/bin/java"
                    );
                }
                other => panic!("unexpected entry type {:?}", other),
            }
        }

        Ok(())
    }

    #[test]
    fn test_duplicate_suppression() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("out.tar");

        let mut writer = TarWriter::builder().create(&path)?;
        let owner = Ownership::root();
        writer.add_file_with_content("a/b", b"first", &owner, None, None)?;
        writer.add_file_with_content("a/b", b"second", &owner, None, None)?;
        writer.add_directory("a", &owner, None, None)?;
        writer.close()?;

        assert_eq!(read_names(&path)?, vec!["a/", "a/b"]);

        // The first occurrence wins.
        let mut archive = tar::Archive::new(File::open(&path)?);
        let mut entries = archive.entries()?;
        entries.next().unwrap()?;
        let mut content = String::new();
        entries.next().unwrap()?.read_to_string(&mut content)?;
        assert_eq!(content, "first");

        Ok(())
    }

    #[test]
    fn test_determinism() -> Result<()> {
        let dir = tempfile::TempDir::new()?;

        let mut outputs = Vec::new();
        for i in 0..2 {
            let path = dir.path().join(format!("out{}.tar", i));
            let mut writer = TarWriter::builder()
                .default_mtime(PORTABLE_MTIME)
                .create(&path)?;
            writer.add_file_with_content(
                "bin/tool",
                b"#!/bin/sh\n",
                &Ownership::root(),
                None,
                Some(0o755),
            )?;
            writer.close()?;
            outputs.push(std::fs::read(&path)?);
        }

        assert_eq!(outputs[0], outputs[1]);

        Ok(())
    }

    #[test]
    fn test_long_name() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("long.tar");

        let long = format!("dir/{}.txt", "x".repeat(150));
        let mut writer = TarWriter::builder().create(&path)?;
        writer.add_file_with_content(&long, b"content", &Ownership::root(), None, None)?;
        writer.close()?;

        assert_eq!(read_names(&path)?, vec!["dir/".to_string(), long]);

        Ok(())
    }

    #[test]
    fn test_add_tar_with_root() -> Result<()> {
        let dir = tempfile::TempDir::new()?;

        // Build a source archive with dotted names, the layout produced
        // by this writer with the default root directory.
        let source = dir.path().join("source.tar");
        {
            let mut writer = TarWriter::builder()
                .root_directory("./")
                .default_mtime(123)
                .create(&source)?;
            writer.add_file_with_content(
                "app/lib.so",
                b"library",
                &Ownership {
                    uid: 501,
                    gid: 501,
                    uname: "build".to_string(),
                    gname: "build".to_string(),
                },
                None,
                None,
            )?;
            writer.close()?;
        }

        let merged = dir.path().join("merged.tar");
        let mut writer = TarWriter::builder().default_mtime(0).create(&merged)?;
        writer.add_tar(
            &source,
            &TarMergeOptions {
                rootuid: Some(501),
                rootgid: Some(501),
                numeric: true,
                root: Some("opt".to_string()),
                ..Default::default()
            },
        )?;
        writer.close()?;

        assert_eq!(
            read_names(&merged)?,
            vec!["./opt/", "./opt/app/", "./opt/app/lib.so"]
        );

        let mut archive = tar::Archive::new(File::open(&merged)?);
        for entry in archive.entries()? {
            let entry = entry?;
            let header = entry.header();
            assert_eq!(header.uid()?, 0);
            assert_eq!(header.gid()?, 0);
            assert_eq!(header.username().unwrap().unwrap_or(""), "");
            // Merged entries keep their mtimes by default.
            assert_eq!(header.mtime()?, 123);
        }

        Ok(())
    }

    #[test]
    fn test_add_tree_lexicographic() -> Result<()> {
        let dir = tempfile::TempDir::new()?;

        let top = dir.path().join("tree");
        std::fs::create_dir_all(top.join("sub"))?;
        std::fs::write(top.join("b.txt"), "b")?;
        std::fs::write(top.join("a.txt"), "a")?;
        std::fs::write(top.join("sub/nested"), "n")?;

        let path = dir.path().join("tree.tar");
        let mut writer = TarWriter::builder().create(&path)?;
        writer.add_tree(&top, "data", &Ownership::root(), None)?;
        writer.close()?;

        assert_eq!(
            read_names(&path)?,
            vec![
                "data/",
                "data/a.txt",
                "data/b.txt",
                "data/sub/",
                "data/sub/nested",
            ]
        );

        Ok(())
    }

    #[test]
    fn test_gzip_output_is_deterministic() -> Result<()> {
        let dir = tempfile::TempDir::new()?;

        let mut outputs = Vec::new();
        for i in 0..2 {
            let path = dir.path().join(format!("out{}.tar.gz", i));
            let mut writer = TarWriter::builder()
                .compression(Compression::Gzip)
                .default_mtime(PORTABLE_MTIME)
                .create(&path)?;
            writer.add_file_with_content("f", b"data", &Ownership::root(), None, None)?;
            writer.close()?;
            outputs.push(std::fs::read(&path)?);
        }

        assert_eq!(outputs[0], outputs[1]);
        // Gzip magic.
        assert_eq!(&outputs[0][0..2], &[0x1f, 0x8b]);

        // Round-trips through the transparent decompressor.
        let mut archive =
            tar::Archive::new(open_decompressed(dir.path().join("out0.tar.gz"))?);
        assert_eq!(archive.entries()?.count(), 1);

        Ok(())
    }

    #[test]
    fn test_writer_closed_errors() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("closed.tar");

        let mut writer = TarWriter::builder().create(&path)?;
        writer.close()?;

        assert!(matches!(
            writer.add_file_with_content("x", b"x", &Ownership::root(), None, None),
            Err(Error::WriterClosed)
        ));
        assert!(matches!(writer.close(), Err(Error::WriterClosed)));

        Ok(())
    }

    #[test]
    fn test_add_deb_data_member() -> Result<()> {
        let dir = tempfile::TempDir::new()?;

        // Inner data.tar with one file.
        let data_tar = dir.path().join("data.tar");
        {
            let mut writer = TarWriter::builder().create(&data_tar)?;
            writer.add_file_with_content("usr/bin/app", b"elf", &Ownership::root(), None, None)?;
            writer.close()?;
        }

        // Minimal deb-shaped ar archive.
        let deb = dir.path().join("pkg.deb");
        {
            let mut ar = crate::ar::ArWriter::new(File::create(&deb)?)?;
            ar.append_data("debian-binary", b"2.0\n")?;
            ar.append_data("control.tar.gz", b"")?;
            let data = std::fs::read(&data_tar)?;
            ar.append_data("data.tar", &data)?;
        }

        let out = dir.path().join("out.tar");
        let mut writer = TarWriter::builder().create(&out)?;
        writer.add_deb(&deb, &TarMergeOptions::default())?;
        writer.close()?;

        assert_eq!(read_names(&out)?, vec!["usr/", "usr/bin/", "usr/bin/app"]);

        Ok(())
    }

    #[test]
    fn test_empty_root_dir_bypasses_prefix() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("out.tar");

        let mut writer = TarWriter::builder().root_directory("pkg").create(&path)?;
        writer.add_empty_root_dir("toplevel", &Ownership::root(), None)?;
        writer.add_directory("inside", &Ownership::root(), None, None)?;
        writer.close()?;

        assert_eq!(read_names(&path)?, vec!["toplevel/", "pkg/", "pkg/inside/"]);

        Ok(())
    }

    #[test]
    fn test_merge_preserve_mtimes_disabled() -> Result<()> {
        let dir = tempfile::TempDir::new()?;

        let source = dir.path().join("source.tar");
        {
            let mut writer = TarWriter::builder().default_mtime(999).create(&source)?;
            writer.add_file_with_content("f", b"x", &Ownership::root(), None, None)?;
            writer.close()?;
        }

        let out = dir.path().join("out.tar");
        let mut writer = TarWriter::builder()
            .preserve_tar_mtimes(false)
            .default_mtime(7)
            .create(&out)?;
        writer.add_tar(&source, &TarMergeOptions::default())?;
        writer.close()?;

        let mut archive = tar::Archive::new(File::open(&out)?);
        for entry in archive.entries()? {
            assert_eq!(entry?.header().mtime()?, 7);
        }

        Ok(())
    }

    #[test]
    fn test_content_round_trip() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("rt.tar");

        let mut writer = TarWriter::builder().create(&path)?;
        writer.add_file_with_content("payload.bin", &[1, 2, 3, 4, 5], &Ownership::root(), None, None)?;
        writer.close()?;

        let mut archive = tar::Archive::new(File::open(&path)?);
        let mut entry = archive.entries()?.next().unwrap()?;
        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;
        assert_eq!(data, vec![1, 2, 3, 4, 5]);

        Ok(())
    }
}
