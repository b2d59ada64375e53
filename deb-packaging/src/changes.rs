// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `.changes` upload sidecar emission.

use {
    crate::{control::make_control_field, Result},
    chrono::TimeZone,
    md5::Md5,
    sha1::Sha1,
    sha2::{Digest, Sha256},
    std::{
        fs::File,
        io::{Read, Write},
        path::Path,
    },
};

/// Inputs to a `.changes` file.
pub struct ChangesFields {
    pub package: String,
    pub version: String,
    pub architecture: String,
    pub short_description: String,
    pub maintainer: String,
    pub section: String,
    pub priority: String,
    pub distribution: String,
    pub urgency: String,
    /// Epoch stamped into the Date field.
    pub timestamp: i64,
}

/// MD5, SHA-1, and SHA-256 hex digests plus size of a file.
struct FileChecksums {
    md5: String,
    sha1: String,
    sha256: String,
    size: u64,
}

fn checksum_file(path: &Path) -> Result<FileChecksums> {
    let mut md5 = Md5::new();
    let mut sha1 = Sha1::new();
    let mut sha256 = Sha256::new();
    let mut size = 0u64;

    let mut file = File::open(path)?;
    let mut buffer = [0u8; 32768];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        md5.update(&buffer[0..read]);
        sha1.update(&buffer[0..read]);
        sha256.update(&buffer[0..read]);
        size += read as u64;
    }

    Ok(FileChecksums {
        md5: hex::encode(md5.finalize()),
        sha1: hex::encode(sha1.finalize()),
        sha256: hex::encode(sha256.finalize()),
        size,
    })
}

/// Render the Date field the way `ctime` does: the epoch formatted in
/// the host's local timezone.
fn ctime(timestamp: i64) -> String {
    chrono::Local
        .timestamp_opt(timestamp, 0)
        .single()
        .map(|when| when.format("%a %b %e %H:%M:%S %Y").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

/// Write the `.changes` sidecar describing a built `.deb`.
pub fn write_changes(output: &Path, deb_file: &Path, fields: &ChangesFields) -> Result<()> {
    let checksums = checksum_file(deb_file)?;
    let deb_basename = deb_file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let body = [
        make_control_field("Format", "1.8", false),
        make_control_field("Date", &ctime(fields.timestamp), false),
        make_control_field("Source", &fields.package, false),
        make_control_field("Binary", &fields.package, false),
        make_control_field("Architecture", &fields.architecture, false),
        make_control_field("Version", &fields.version, false),
        make_control_field("Distribution", &fields.distribution, false),
        make_control_field("Urgency", &fields.urgency, false),
        make_control_field("Maintainer", &fields.maintainer, false),
        make_control_field("Changed-By", &fields.maintainer, false),
        make_control_field(
            "Description",
            &format!("\n{} - {}", fields.package, fields.short_description),
            false,
        ),
        make_control_field(
            "Changes",
            &format!(
                "\n{} ({}) {}; urgency={}\nChanges are tracked in revision control.",
                fields.package, fields.version, fields.distribution, fields.urgency
            ),
            false,
        ),
        make_control_field(
            "Files",
            &format!(
                "\n{} {} {} {} {}",
                checksums.md5, checksums.size, fields.section, fields.priority, deb_basename
            ),
            false,
        ),
        make_control_field(
            "Checksums-Sha1",
            &format!("\n{} {} {}", checksums.sha1, checksums.size, deb_basename),
            false,
        ),
        make_control_field(
            "Checksums-Sha256",
            &format!("\n{} {} {}", checksums.sha256, checksums.size, deb_basename),
            false,
        ),
    ]
    .concat();

    File::create(output)?.write_all(body.as_bytes())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> ChangesFields {
        ChangesFields {
            package: "fizzbuzz".to_string(),
            version: "1".to_string(),
            architecture: "all".to_string(),
            short_description: "a demo".to_string(),
            maintainer: "x".to_string(),
            section: "contrib/devel".to_string(),
            priority: "optional".to_string(),
            distribution: "unstable".to_string(),
            urgency: "medium".to_string(),
            timestamp: 0,
        }
    }

    #[test]
    fn test_changes_content() -> Result<()> {
        let dir = tempfile::TempDir::new().unwrap();

        let deb = dir.path().join("fizzbuzz_1_all.deb");
        std::fs::write(&deb, b"not really a deb")?;

        let changes = dir.path().join("fizzbuzz_1_all.changes");
        write_changes(&changes, &deb, &fields())?;

        let body = std::fs::read_to_string(&changes)?;
        assert!(body.starts_with("Format: 1.8\n"));

        // The Date field is the epoch rendered in the host's local
        // timezone, ctime style.
        let expected_date = chrono::Local
            .timestamp_opt(0, 0)
            .single()
            .unwrap()
            .format("%a %b %e %H:%M:%S %Y")
            .to_string();
        assert!(body.contains(&format!("Date: {}\n", expected_date)));
        assert!(body.contains("Source: fizzbuzz\n"));
        assert!(body.contains("Description:\n fizzbuzz - a demo\n"));
        assert!(body.contains("Changes:\n fizzbuzz (1) unstable; urgency=medium\n"));
        assert!(body.contains(" Changes are tracked in revision control.\n"));

        // Digest lines carry size and basename.
        let size = std::fs::metadata(&deb)?.len();
        assert!(body.contains(&format!("{} fizzbuzz_1_all.deb", size)));
        assert!(body.contains("Checksums-Sha256:\n"));

        Ok(())
    }

    #[test]
    fn test_checksums_are_hex_digests() -> Result<()> {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, b"abc")?;

        let sums = checksum_file(&file)?;
        assert_eq!(sums.md5, "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(sums.sha1, "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(
            sums.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(sums.size, 3);

        Ok(())
    }
}
