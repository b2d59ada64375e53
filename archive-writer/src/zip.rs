// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Deterministic zip archive building.
//!
//! Entries carry a fixed timestamp (clamped to the zip epoch,
//! 1980-01-01) and unix permission bits in the high 16 bits of the
//! external attributes; directories additionally get the MSDOS
//! directory attribute in the low bits. The UTF-8 filename flag
//! (general purpose bit 11) is set on every entry. Regular files are
//! deflate compressed; directories and symlinks are stored.
//!
//! The writer emits the zip structures directly, like the ar module
//! does for its format: sizes and checksums are known before each
//! local header is written, so no data descriptors are needed.

use {
    crate::{Error, Result},
    chrono::{Datelike, Timelike},
    is_executable::IsExecutable,
    std::{
        collections::BTreeMap,
        fs::File,
        io::{BufWriter, Read, Write},
        path::{Path, PathBuf},
    },
};

/// The minimum timestamp representable in zip: 1980-01-01 00:00:00 UTC.
pub const ZIP_EPOCH: i64 = 315532800;

/// Unix directory bit carried in the external attribute high bits.
pub const UNIX_DIR_BIT: u32 = 0o40000;

/// MSDOS directory attribute, external attribute low bits.
pub const MSDOS_DIR_BIT: u32 = 0x10;

/// Unix symlink bits carried in the external attribute high bits.
pub const UNIX_SYMLINK_BIT: u32 = 0o120000;

/// General purpose flag: the filename is UTF-8 encoded.
const UTF8_FLAG: u16 = 1 << 11;

/// Version made by: unix host, zip spec 2.0.
const VERSION_MADE_BY: u16 = (3 << 8) | 20;
const VERSION_NEEDED: u16 = 20;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATED: u16 = 8;

const LOCAL_HEADER_SIG: u32 = 0x04034b50;
const CENTRAL_HEADER_SIG: u32 = 0x02014b50;
const END_OF_CENTRAL_SIG: u32 = 0x06054b50;

/// Join an archive prefix and an entry path.
///
/// The zip format spec forbids leading slashes; the built-in Windows
/// extractor rejects archives that carry them.
pub fn combine_paths(left: &str, right: &str) -> String {
    format!(
        "{}/{}",
        left.trim_end_matches('/'),
        right.trim_start_matches('/')
    )
    .trim_start_matches('/')
    .to_string()
}

/// What a central directory record needs to remember about an entry.
struct EntryRecord {
    name: String,
    method: u16,
    crc: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    external_attr: u32,
    header_offset: u32,
}

/// A deterministic zip archive writer.
pub struct ZipWriter {
    out: Option<BufWriter<File>>,
    /// Bytes written so far; local header offsets derive from it.
    offset: u32,
    dos_time: u16,
    dos_date: u16,
    default_mode: Option<u32>,
    directory: String,
    entries: Vec<EntryRecord>,
}

impl ZipWriter {
    /// Create a writer targeting `path`.
    ///
    /// `timestamp` is a unix epoch; values before the zip epoch are
    /// clamped up to it. `directory` is a prefix applied to every entry.
    pub fn create(
        path: impl AsRef<Path>,
        timestamp: i64,
        default_mode: Option<u32>,
        directory: &str,
    ) -> Result<Self> {
        let clamped = timestamp.max(ZIP_EPOCH);
        let when = chrono::NaiveDateTime::from_timestamp_opt(clamped, 0)
            .ok_or(Error::InvalidTimestamp)?;

        let dos_time = ((when.hour() as u16) << 11)
            | ((when.minute() as u16) << 5)
            | (when.second() as u16 / 2);
        let dos_date = (((when.year() - 1980) as u16) << 9)
            | ((when.month() as u16) << 5)
            | when.day() as u16;

        Ok(Self {
            out: Some(BufWriter::new(File::create(path)?)),
            offset: 0,
            dos_time,
            dos_date,
            default_mode,
            directory: directory.to_string(),
            entries: Vec::new(),
        })
    }

    fn dest_path(&self, dest: &str) -> String {
        combine_paths(&self.directory, dest)
    }

    fn resolve_mode(&self, mode: Option<u32>, fallback: u32) -> u32 {
        mode.or(self.default_mode).unwrap_or(fallback)
    }

    /// Write one complete entry: local header, then payload.
    fn write_entry(
        &mut self,
        name: String,
        data: &[u8],
        method: u16,
        external_attr: u32,
    ) -> Result<()> {
        let mut crc = flate2::Crc::new();
        crc.update(data);
        let crc = crc.sum();

        let payload = match method {
            METHOD_DEFLATED => {
                let mut encoder = flate2::write::DeflateEncoder::new(
                    Vec::new(),
                    flate2::Compression::default(),
                );
                encoder.write_all(data)?;
                encoder.finish()?
            }
            _ => data.to_vec(),
        };

        let record = EntryRecord {
            method,
            crc,
            compressed_size: payload.len() as u32,
            uncompressed_size: data.len() as u32,
            external_attr,
            header_offset: self.offset,
            name,
        };

        let (dos_time, dos_date) = (self.dos_time, self.dos_date);
        let out = self.out.as_mut().ok_or(Error::WriterClosed)?;

        write_u32(out, LOCAL_HEADER_SIG)?;
        write_u16(out, VERSION_NEEDED)?;
        write_u16(out, UTF8_FLAG)?;
        write_u16(out, record.method)?;
        write_u16(out, dos_time)?;
        write_u16(out, dos_date)?;
        write_u32(out, record.crc)?;
        write_u32(out, record.compressed_size)?;
        write_u32(out, record.uncompressed_size)?;
        write_u16(out, record.name.len() as u16)?;
        write_u16(out, 0)?; // extra field length
        out.write_all(record.name.as_bytes())?;
        out.write_all(&payload)?;

        self.offset += 30 + record.name.len() as u32 + record.compressed_size;
        self.entries.push(record);

        Ok(())
    }

    /// Add a regular file with content from the filesystem.
    pub fn add_file(&mut self, dest: &str, src: &Path, mode: Option<u32>) -> Result<()> {
        let mut content = Vec::new();
        File::open(src)?.read_to_end(&mut content)?;

        self.add_file_with_content(dest, &content, mode)
    }

    /// Add a regular file with in-memory content, deflate compressed.
    pub fn add_file_with_content(
        &mut self,
        dest: &str,
        content: &[u8],
        mode: Option<u32>,
    ) -> Result<()> {
        let name = self.dest_path(dest);
        let mode = self.resolve_mode(mode, 0o644);

        self.write_entry(name, content, METHOD_DEFLATED, mode << 16)
    }

    /// Add an empty file entry.
    pub fn add_empty_file(&mut self, dest: &str, mode: Option<u32>) -> Result<()> {
        self.add_file_with_content(dest, &[], mode)
    }

    /// Add a directory entry.
    ///
    /// The name is given a trailing `/`; the external attributes carry
    /// the unix directory bit and the MSDOS directory attribute.
    pub fn add_directory(&mut self, dest: &str, mode: Option<u32>) -> Result<()> {
        let mut name = self.dest_path(dest);
        if !name.ends_with('/') {
            name.push('/');
        }
        let mode = self.resolve_mode(mode, 0o755);
        let external_attr = ((mode | UNIX_DIR_BIT) << 16) | MSDOS_DIR_BIT;

        self.write_entry(name, &[], METHOD_STORED, external_attr)
    }

    /// Add a symlink entry. The payload is the target string, stored
    /// uncompressed, with the unix symlink bits in the external
    /// attributes.
    pub fn add_symlink(&mut self, dest: &str, target: &str, mode: Option<u32>) -> Result<()> {
        let name = self.dest_path(dest);
        let mode = self.resolve_mode(mode, 0o777);
        let external_attr = (mode | UNIX_SYMLINK_BIT) << 16;

        self.write_entry(name, target.as_bytes(), METHOD_STORED, external_attr)
    }

    /// Expand a filesystem subtree under `dest`.
    ///
    /// Files are emitted in lexicographic destination order. Per-file
    /// mode defaults to 0o755 for executables and 0o644 otherwise.
    pub fn add_tree(&mut self, tree_top: &Path, dest: &str, mode: Option<u32>) -> Result<()> {
        let dest = dest.trim_matches('/');

        let mut to_write: BTreeMap<String, PathBuf> = BTreeMap::new();

        for entry in walkdir::WalkDir::new(tree_top)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() && !entry.file_type().is_symlink() {
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

            to_write.insert(dest_path, entry.path().to_path_buf());
        }

        for (path, src) in to_write {
            let f_mode = mode.unwrap_or(if src.is_executable() { 0o755 } else { 0o644 });
            self.add_file(&path, &src, Some(f_mode))?;
        }

        Ok(())
    }

    /// Finish the archive: central directory, then the end record.
    ///
    /// The writer cannot be used afterwards.
    pub fn close(&mut self) -> Result<()> {
        let mut out = self.out.take().ok_or(Error::WriterClosed)?;

        let central_offset = self.offset;
        let mut central_size = 0u32;

        for record in &self.entries {
            write_u32(&mut out, CENTRAL_HEADER_SIG)?;
            write_u16(&mut out, VERSION_MADE_BY)?;
            write_u16(&mut out, VERSION_NEEDED)?;
            write_u16(&mut out, UTF8_FLAG)?;
            write_u16(&mut out, record.method)?;
            write_u16(&mut out, self.dos_time)?;
            write_u16(&mut out, self.dos_date)?;
            write_u32(&mut out, record.crc)?;
            write_u32(&mut out, record.compressed_size)?;
            write_u32(&mut out, record.uncompressed_size)?;
            write_u16(&mut out, record.name.len() as u16)?;
            write_u16(&mut out, 0)?; // extra field length
            write_u16(&mut out, 0)?; // comment length
            write_u16(&mut out, 0)?; // disk number start
            write_u16(&mut out, 0)?; // internal attributes
            write_u32(&mut out, record.external_attr)?;
            write_u32(&mut out, record.header_offset)?;
            out.write_all(record.name.as_bytes())?;

            central_size += 46 + record.name.len() as u32;
        }

        write_u32(&mut out, END_OF_CENTRAL_SIG)?;
        write_u16(&mut out, 0)?; // this disk
        write_u16(&mut out, 0)?; // central directory disk
        write_u16(&mut out, self.entries.len() as u16)?;
        write_u16(&mut out, self.entries.len() as u16)?;
        write_u32(&mut out, central_size)?;
        write_u32(&mut out, central_offset)?;
        write_u16(&mut out, 0)?; // comment length

        out.flush()?;

        Ok(())
    }
}

fn write_u16(writer: &mut impl Write, value: u16) -> Result<()> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn write_u32(writer: &mut impl Write, value: u32) -> Result<()> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Parse `(flags, external_attr, name)` per entry out of the
    /// central directory, independently of any zip library.
    fn central_directory_records(data: &[u8]) -> Vec<(u16, u32, String)> {
        let eocd = data.len() - 22;
        assert_eq!(data[eocd..eocd + 4], END_OF_CENTRAL_SIG.to_le_bytes());
        let count = u16::from_le_bytes([data[eocd + 10], data[eocd + 11]]) as usize;
        let mut pos = u32::from_le_bytes([
            data[eocd + 16],
            data[eocd + 17],
            data[eocd + 18],
            data[eocd + 19],
        ]) as usize;

        let mut records = Vec::new();
        for _ in 0..count {
            assert_eq!(data[pos..pos + 4], CENTRAL_HEADER_SIG.to_le_bytes());
            let flags = u16::from_le_bytes([data[pos + 8], data[pos + 9]]);
            let name_len = u16::from_le_bytes([data[pos + 28], data[pos + 29]]) as usize;
            let external_attr = u32::from_le_bytes([
                data[pos + 38],
                data[pos + 39],
                data[pos + 40],
                data[pos + 41],
            ]);
            let name = String::from_utf8(data[pos + 46..pos + 46 + name_len].to_vec()).unwrap();
            records.push((flags, external_attr, name));
            pos += 46 + name_len;
        }

        records
    }

    #[test]
    fn test_combine_paths() {
        assert_eq!(combine_paths("/", "a/b"), "a/b");
        assert_eq!(combine_paths("/prefix", "/a"), "prefix/a");
        assert_eq!(combine_paths("prefix/", "a"), "prefix/a");
    }

    #[test]
    fn test_dir_and_symlink_entries() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("out.zip");

        let mut writer = ZipWriter::create(&path, ZIP_EPOCH, None, "/")?;
        writer.add_directory("foodir", Some(0o711))?;
        writer.add_symlink("lnk", "foodir", None)?;
        writer.close()?;

        let mut archive = zip::ZipArchive::new(File::open(&path)?).unwrap();
        assert_eq!(archive.len(), 2);

        {
            let entry = archive.by_index(0).unwrap();
            assert_eq!(entry.name(), "foodir/");
            assert!(entry.is_dir());
            let mode = entry.unix_mode().unwrap();
            assert_eq!(mode & UNIX_DIR_BIT, UNIX_DIR_BIT, "unix dir bit set");
            assert_eq!(mode & 0o777, 0o711);
        }

        {
            let mut entry = archive.by_index(1).unwrap();
            assert_eq!(entry.name(), "lnk");
            let mode = entry.unix_mode().unwrap();
            assert_eq!(mode & 0o170000, UNIX_SYMLINK_BIT, "unix symlink bits set");
            let mut body = String::new();
            entry.read_to_string(&mut body)?;
            assert_eq!(body, "foodir");
        }

        Ok(())
    }

    #[test]
    fn test_external_attr_and_utf8_bits() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("out.zip");

        let mut writer = ZipWriter::create(&path, ZIP_EPOCH, None, "/")?;
        writer.add_directory("d", Some(0o711))?;
        writer.add_symlink("l", "d", None)?;
        writer.add_file_with_content("f", b"content", Some(0o640))?;
        writer.close()?;

        let data = std::fs::read(&path)?;
        let records = central_directory_records(&data);
        assert_eq!(records.len(), 3);

        for (flags, _, name) in &records {
            assert_ne!(flags & UTF8_FLAG, 0, "UTF-8 flag set on {}", name);
        }

        let (_, dir_attr, dir_name) = &records[0];
        assert_eq!(dir_name, "d/");
        assert_eq!(dir_attr >> 16, 0o711 | UNIX_DIR_BIT);
        assert_eq!(dir_attr & MSDOS_DIR_BIT, MSDOS_DIR_BIT, "MSDOS dir bit set");

        let (_, link_attr, _) = &records[1];
        assert_eq!(link_attr >> 16, 0o777 | UNIX_SYMLINK_BIT);
        assert_eq!(link_attr & 0xffff, 0);

        let (_, file_attr, _) = &records[2];
        assert_eq!(file_attr >> 16, 0o640);
        assert_eq!(file_attr & MSDOS_DIR_BIT, 0);

        Ok(())
    }

    #[test]
    fn test_timestamp_clamped_to_zip_epoch() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("out.zip");

        let mut writer = ZipWriter::create(&path, 0, None, "/")?;
        writer.add_empty_file("f", None)?;
        writer.close()?;

        let mut archive = zip::ZipArchive::new(File::open(&path)?).unwrap();
        let entry = archive.by_index(0).unwrap();
        let dt = entry.last_modified();
        assert_eq!(dt.year(), 1980);
        assert_eq!(dt.month(), 1);
        assert_eq!(dt.day(), 1);

        Ok(())
    }

    #[test]
    fn test_determinism() -> Result<()> {
        let dir = tempfile::TempDir::new()?;

        let mut outputs = Vec::new();
        for i in 0..2 {
            let path = dir.path().join(format!("out{}.zip", i));
            let mut writer = ZipWriter::create(&path, 1700000000, Some(0o644), "/app")?;
            writer.add_file_with_content("a.txt", b"content", None)?;
            writer.add_directory("d", None)?;
            writer.close()?;
            outputs.push(std::fs::read(&path)?);
        }

        assert_eq!(outputs[0], outputs[1]);

        Ok(())
    }

    #[test]
    fn test_prefix_applied_and_content_round_trip() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("out.zip");

        let mut writer = ZipWriter::create(&path, ZIP_EPOCH, None, "/opt/app")?;
        writer.add_file_with_content("bin/tool", b"#!/bin/sh\nexit 0\n", Some(0o755))?;
        writer.close()?;

        let mut archive = zip::ZipArchive::new(File::open(&path)?).unwrap();
        let mut entry = archive.by_index(0).unwrap();
        assert_eq!(entry.name(), "opt/app/bin/tool");
        assert_eq!(entry.unix_mode().unwrap() & 0o777, 0o755);

        // Reading back through the zip crate validates the deflate
        // stream and the crc32.
        let mut body = String::new();
        entry.read_to_string(&mut body)?;
        assert_eq!(body, "#!/bin/sh\nexit 0\n");

        Ok(())
    }

    #[test]
    fn test_tree_expansion() -> Result<()> {
        let dir = tempfile::TempDir::new()?;

        let top = dir.path().join("tree");
        std::fs::create_dir_all(top.join("sub"))?;
        std::fs::write(top.join("z.txt"), "z")?;
        std::fs::write(top.join("a.txt"), "a")?;
        std::fs::write(top.join("sub/n"), "n")?;

        let path = dir.path().join("out.zip");
        let mut writer = ZipWriter::create(&path, ZIP_EPOCH, None, "/")?;
        writer.add_tree(&top, "data", None)?;
        writer.close()?;

        let mut archive = zip::ZipArchive::new(File::open(&path)?).unwrap();
        let mut names = Vec::new();
        for i in 0..archive.len() {
            names.push(archive.by_index(i).unwrap().name().to_string());
        }
        assert_eq!(names, vec!["data/a.txt", "data/sub/n", "data/z.txt"]);

        Ok(())
    }

    #[test]
    fn test_writer_closed() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let mut writer = ZipWriter::create(dir.path().join("c.zip"), ZIP_EPOCH, None, "/")?;
        writer.close()?;

        assert!(matches!(
            writer.add_empty_file("f", None),
            Err(Error::WriterClosed)
        ));
        assert!(matches!(writer.close(), Err(Error::WriterClosed)));

        Ok(())
    }
}
