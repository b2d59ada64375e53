// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Content manifests for deterministic package building.

A *manifest* is an ordered JSON list describing the virtual filesystem tree
to package. Each entry names a destination path inside the archive, the
kind of entry to create there, and optional mode/ownership overrides.

Two on-disk encodings are accepted: the current form (an array of objects)
and a legacy positional form (an array of 6-element arrays) where the entry
kind may additionally be a small integer. Files emitted by one legacy host
are UTF-16-LE encoded; the loader sniffs for that.
*/

use {serde::Deserialize, std::path::Path};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("manifest parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("manifest is not UTF-8 or UTF-16-LE encoded")]
    Encoding,

    #[error("unknown manifest entry kind: {0}")]
    UnknownKind(String),
}

/// Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Information about a single file, directory, or link in a tree.
///
/// This is the normalized entity produced by every archive reader and
/// consumed by the tree comparator. Sizes are 0 for directories and
/// symlinks. Paths are relative, forward-slash delimited, and carry no
/// leading `./`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FileInfo {
    pub path: String,
    pub size: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub is_dir: bool,
    pub is_symlink: bool,
    pub symlink_target: Option<String>,
    /// Inode number. Only populated by cpio sources.
    pub inode: u32,
    /// Padded on-disk payload size. Only populated by cpio sources.
    pub data_size: u64,
}

impl FileInfo {
    /// Strip a single leading `./` from a path, the normalization applied
    /// to all reader output.
    pub fn normalize_path(path: &str) -> &str {
        path.strip_prefix("./").unwrap_or(path)
    }
}

/// The kind of entry a manifest row describes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EntryKind {
    File,
    Symlink,
    RawSymlink,
    Dir,
    Tree,
    EmptyFile,
}

impl EntryKind {
    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "file" => Self::File,
            "symlink" => Self::Symlink,
            "raw_symlink" => Self::RawSymlink,
            "dir" => Self::Dir,
            "tree" => Self::Tree,
            // Both spellings occur in the wild.
            "empty_file" | "empty-file" => Self::EmptyFile,
            other => return Err(Error::UnknownKind(other.to_string())),
        })
    }

    /// Decode the legacy small-integer encoding used by positional
    /// manifests.
    fn from_legacy_int(v: u64) -> Result<Self> {
        Ok(match v {
            0 => Self::File,
            1 => Self::Symlink,
            2 => Self::Dir,
            3 => Self::Tree,
            4 => Self::EmptyFile,
            other => return Err(Error::UnknownKind(other.to_string())),
        })
    }
}

/// A single manifest entry.
///
/// `src` carries a different meaning per kind: a filesystem path for
/// `File`/`Tree`, the link target for `Symlink`/`RawSymlink`, and is
/// empty otherwise. `mode` is an octal string or empty to take defaults.
#[derive(Clone, Debug, PartialEq)]
pub struct ManifestEntry {
    pub kind: EntryKind,
    pub dest: String,
    pub src: String,
    pub mode: String,
    pub user: String,
    pub group: String,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub origin: Option<String>,
    pub repository: Option<String>,
}

/// The kind column of a raw entry: a string in the current form, a small
/// integer in legacy positional manifests.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawKind {
    Name(String),
    Legacy(u64),
}

impl RawKind {
    fn resolve(&self) -> Result<EntryKind> {
        match self {
            Self::Name(s) => EntryKind::from_str(s),
            Self::Legacy(v) => EntryKind::from_legacy_int(*v),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Object {
        #[serde(rename = "type")]
        kind: RawKind,
        dest: String,
        #[serde(default)]
        src: Option<String>,
        #[serde(default)]
        mode: Option<String>,
        #[serde(default)]
        user: Option<String>,
        #[serde(default)]
        group: Option<String>,
        #[serde(default)]
        uid: Option<u32>,
        #[serde(default)]
        gid: Option<u32>,
        #[serde(default)]
        origin: Option<String>,
        #[serde(default)]
        repository: Option<String>,
    },
    Positional(
        RawKind,
        String,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
    ),
}

impl RawEntry {
    fn materialize(self) -> Result<ManifestEntry> {
        Ok(match self {
            Self::Object {
                kind,
                dest,
                src,
                mode,
                user,
                group,
                uid,
                gid,
                origin,
                repository,
            } => ManifestEntry {
                kind: kind.resolve()?,
                dest,
                src: src.unwrap_or_default(),
                mode: mode.unwrap_or_default(),
                user: user.unwrap_or_default(),
                group: group.unwrap_or_default(),
                uid,
                gid,
                origin,
                repository,
            },
            Self::Positional(kind, dest, src, mode, user, group) => ManifestEntry {
                kind: kind.resolve()?,
                dest,
                src: src.unwrap_or_default(),
                mode: mode.unwrap_or_default(),
                user: user.unwrap_or_default(),
                group: group.unwrap_or_default(),
                uid: None,
                gid: None,
                origin: None,
                repository: None,
            },
        })
    }
}

/// Decode raw manifest bytes into a string.
///
/// Manifests are UTF-8 except when produced by one legacy Windows host,
/// which emitted UTF-16-LE. ASCII-leading UTF-16-LE content always has a
/// 0x00 second byte, which no UTF-8 JSON document can.
fn decode_manifest_bytes(raw: &[u8]) -> Result<String> {
    if raw.len() >= 2 && raw[1] == 0 {
        let units = raw
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect::<Vec<_>>();
        String::from_utf16(&units).map_err(|_| Error::Encoding)
    } else {
        String::from_utf8(raw.to_vec()).map_err(|_| Error::Encoding)
    }
}

/// Parse manifest entries from a JSON string.
pub fn parse_entries(json: &str) -> Result<Vec<ManifestEntry>> {
    let raw: Vec<RawEntry> = serde_json::from_str(json)?;

    raw.into_iter().map(|e| e.materialize()).collect()
}

/// Read manifest entries from a file, sniffing the encoding.
///
/// Iteration order of the result is the array order of the document.
pub fn read_entries(path: impl AsRef<Path>) -> Result<Vec<ManifestEntry>> {
    let raw = std::fs::read(path)?;

    parse_entries(&decode_manifest_bytes(&raw)?)
}

#[cfg(test)]
mod tests {
    use {super::*, std::io::Write};

    #[test]
    fn test_object_form() -> Result<()> {
        let entries = parse_entries(
            r#"[
                {"type": "file", "dest": "etc/a", "src": "A", "mode": "0644", "user": "", "group": ""},
                {"type": "symlink", "dest": "usr/bin/java", "src": "/path/to/bin/java", "mode": "", "user": "", "group": ""},
                {"type": "empty-file", "dest": "var/log/empty", "src": "", "mode": "", "user": "", "group": "", "uid": 12, "gid": 34}
            ]"#,
        )?;

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].kind, EntryKind::File);
        assert_eq!(entries[0].dest, "etc/a");
        assert_eq!(entries[1].kind, EntryKind::Symlink);
        assert_eq!(entries[1].src, "/path/to/bin/java");
        assert_eq!(entries[2].kind, EntryKind::EmptyFile);
        assert_eq!(entries[2].uid, Some(12));
        assert_eq!(entries[2].gid, Some(34));

        Ok(())
    }

    #[test]
    fn test_positional_form() -> Result<()> {
        let entries = parse_entries(
            r#"[
                ["file", "etc/a", "A", "0644", "", ""],
                [2, "foodir", null, "0711", "", ""]
            ]"#,
        )?;

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, EntryKind::File);
        assert_eq!(entries[1].kind, EntryKind::Dir);
        assert_eq!(entries[1].mode, "0711");
        assert!(entries[1].src.is_empty());

        Ok(())
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!(matches!(
            parse_entries(r#"[{"type": "wormhole", "dest": "x"}]"#),
            Err(Error::UnknownKind(_))
        ));
    }

    #[test]
    fn test_utf16_le_manifest() -> Result<()> {
        let json = r#"[{"type": "dir", "dest": "d", "mode": "0755"}]"#;
        let mut raw = Vec::new();
        for unit in json.encode_utf16() {
            raw.write_all(&unit.to_le_bytes())?;
        }

        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(&raw)?;

        let entries = read_entries(file.path())?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, EntryKind::Dir);

        Ok(())
    }

    #[test]
    fn test_missing_dest_is_error() {
        assert!(parse_entries(r#"[{"type": "file", "src": "A"}]"#).is_err());
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(FileInfo::normalize_path("./etc/a"), "etc/a");
        assert_eq!(FileInfo::normalize_path("etc/a"), "etc/a");
    }
}
