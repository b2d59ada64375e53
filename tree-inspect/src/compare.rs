// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tree comparison with size regression thresholds.
//!
//! The expected tree is loaded fully into memory; the got tree is
//! streamed against it. Differences are classified, never raised:
//! only I/O and parse problems surface as errors.

use {
    crate::{FileInfo, Result, TreeReader},
    regex::Regex,
    std::{collections::BTreeMap, io::Write},
};

/// Options controlling classification and thresholds.
#[derive(Debug)]
pub struct CompareOptions {
    /// Only consider paths matching this pattern.
    pub include: Option<Regex>,
    /// Ignore paths matching this pattern.
    pub exclude: Option<Regex>,
    /// Compare uid/gid in addition to mode.
    pub check_ownership: bool,
    /// Skip size checks when both sides are below this size.
    pub minimum_compare_size: u64,
    /// Report size decreases rather than passing them silently.
    pub show_decreases: bool,
    /// Allowed absolute growth in bytes; 0 disables the check.
    pub max_allowed_absolute_increase: i64,
    /// Allowed growth in percent of the expected size; 0 disables.
    pub max_allowed_percent_increase: f64,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            include: None,
            exclude: None,
            check_ownership: false,
            minimum_compare_size: 0,
            show_decreases: false,
            // Tolerate padding-level jitter by default.
            max_allowed_absolute_increase: 8,
            max_allowed_percent_increase: 0.0,
        }
    }
}

impl CompareOptions {
    fn admits(&self, path: &str) -> bool {
        if let Some(include) = &self.include {
            if !include.is_match(path) {
                return false;
            }
        }
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(path) {
                return false;
            }
        }

        true
    }
}

/// A size difference that tripped a threshold.
#[derive(Debug, PartialEq)]
pub struct SizeChange {
    pub path: String,
    pub expected: u64,
    pub got: u64,
    pub note: String,
}

/// A mode or ownership difference.
#[derive(Debug, PartialEq)]
pub struct MetadataChange {
    pub path: String,
    pub what: String,
}

/// Classified differences between two trees.
#[derive(Debug, Default)]
pub struct CompareResult {
    pub only_in_got: Vec<String>,
    pub only_in_expected: Vec<String>,
    /// `(path, expected target, got target)`.
    pub symlink_target_changed: Vec<(String, String, String)>,
    pub metadata_changed: Vec<MetadataChange>,
    pub size_changed: Vec<SizeChange>,
}

impl CompareResult {
    pub fn has_differences(&self) -> bool {
        !self.only_in_got.is_empty()
            || !self.only_in_expected.is_empty()
            || !self.symlink_target_changed.is_empty()
            || !self.metadata_changed.is_empty()
            || !self.size_changed.is_empty()
    }

    /// Process exit code: 1 iff any difference was classified.
    pub fn exit_code(&self) -> i32 {
        if self.has_differences() {
            1
        } else {
            0
        }
    }

    /// Render a human-readable report.
    pub fn print_report(&self, writer: &mut impl Write) -> std::io::Result<()> {
        if !self.only_in_got.is_empty() {
            writeln!(writer, "Only in got tree:")?;
            for path in &self.only_in_got {
                writeln!(writer, "  {}", path)?;
            }
        }
        if !self.only_in_expected.is_empty() {
            writeln!(writer, "Only in expected tree:")?;
            for path in &self.only_in_expected {
                writeln!(writer, "  {}", path)?;
            }
        }
        if !self.symlink_target_changed.is_empty() {
            writeln!(writer, "Symlink target changed:")?;
            for (path, expected, got) in &self.symlink_target_changed {
                writeln!(writer, "  {}: {} -> {}", path, expected, got)?;
            }
        }
        if !self.metadata_changed.is_empty() {
            writeln!(writer, "Metadata changed:")?;
            for change in &self.metadata_changed {
                writeln!(writer, "  {}: {}", change.path, change.what)?;
            }
        }
        if !self.size_changed.is_empty() {
            writeln!(writer, "Size changed:")?;
            for change in &self.size_changed {
                writeln!(
                    writer,
                    "  {}: {} -> {} ({})",
                    change.path, change.expected, change.got, change.note
                )?;
            }
        }
        if !self.has_differences() {
            writeln!(writer, "Trees match.")?;
        }

        Ok(())
    }
}

/// Apply the size threshold policy to one file pair.
///
/// Returns the note to report, or `None` when the pair passes.
fn size_difference(expected: u64, got: u64, options: &CompareOptions) -> Option<String> {
    if expected == got {
        return None;
    }
    if expected < options.minimum_compare_size && got < options.minimum_compare_size {
        return None;
    }

    let delta = got as i64 - expected as i64;
    let percent = if expected > 0 {
        delta as f64 * 100.0 / expected as f64
    } else {
        0.0
    };

    if delta < 0 {
        return if options.show_decreases {
            Some(format!("{:.1}%", percent))
        } else {
            None
        };
    }

    if options.max_allowed_absolute_increase > 0
        && delta > options.max_allowed_absolute_increase
    {
        return Some(format!("\u{2265}{:.0}%", percent));
    }

    if expected > 0
        && options.max_allowed_percent_increase > 0.0
        && percent > options.max_allowed_percent_increase
    {
        return Some(format!("\u{2265}{:.0}%", percent));
    }

    None
}

/// Load `expected` fully, stream `got` against it, and classify every
/// difference.
pub fn compare_trees(
    expected: &mut dyn TreeReader,
    got: &mut dyn TreeReader,
    options: &CompareOptions,
) -> Result<CompareResult> {
    let mut expected_map: BTreeMap<String, FileInfo> = BTreeMap::new();
    while let Some(info) = expected.next()? {
        if options.admits(&info.path) {
            expected_map.insert(info.path.clone(), info);
        }
    }

    let mut result = CompareResult::default();
    let mut seen = Vec::new();

    while let Some(info) = got.next()? {
        if !options.admits(&info.path) {
            continue;
        }

        let reference = match expected_map.get(&info.path) {
            Some(reference) => reference,
            None => {
                result.only_in_got.push(info.path.clone());
                continue;
            }
        };
        seen.push(info.path.clone());

        compare_entry(reference, &info, options, &mut result);
    }

    for path in seen {
        expected_map.remove(&path);
    }
    result.only_in_expected = expected_map.into_keys().collect();

    Ok(result)
}

fn compare_entry(
    expected: &FileInfo,
    got: &FileInfo,
    options: &CompareOptions,
    result: &mut CompareResult,
) {
    if expected.is_symlink && got.is_symlink {
        let expected_target = expected.symlink_target.clone().unwrap_or_default();
        let got_target = got.symlink_target.clone().unwrap_or_default();
        if expected_target != got_target {
            result.symlink_target_changed.push((
                got.path.clone(),
                expected_target,
                got_target,
            ));
        }
        return;
    }

    if expected.is_symlink != got.is_symlink || expected.is_dir != got.is_dir {
        result.metadata_changed.push(MetadataChange {
            path: got.path.clone(),
            what: format!(
                "entry type {} -> {}",
                entry_type_name(expected),
                entry_type_name(got)
            ),
        });
        return;
    }

    // Sources disagree about carrying file type bits; compare the
    // permission bits only.
    if expected.mode & 0o7777 != got.mode & 0o7777 {
        result.metadata_changed.push(MetadataChange {
            path: got.path.clone(),
            what: format!(
                "mode {:o} -> {:o}",
                expected.mode & 0o7777,
                got.mode & 0o7777
            ),
        });
    }

    if options.check_ownership && (expected.uid != got.uid || expected.gid != got.gid) {
        result.metadata_changed.push(MetadataChange {
            path: got.path.clone(),
            what: format!(
                "owner {}.{} -> {}.{}",
                expected.uid, expected.gid, got.uid, got.gid
            ),
        });
    }

    if !got.is_dir {
        if let Some(note) = size_difference(expected.size, got.size, options) {
            result.size_changed.push(SizeChange {
                path: got.path.clone(),
                expected: expected.size,
                got: got.size,
                note,
            });
        }
    }
}

fn entry_type_name(info: &FileInfo) -> &'static str {
    if info.is_symlink {
        "symlink"
    } else if info.is_dir {
        "directory"
    } else {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecReader {
        items: std::vec::IntoIter<FileInfo>,
        done: bool,
    }

    impl VecReader {
        fn new(items: Vec<FileInfo>) -> Self {
            Self {
                items: items.into_iter(),
                done: false,
            }
        }
    }

    impl TreeReader for VecReader {
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

    fn file(path: &str, size: u64, mode: u32) -> FileInfo {
        FileInfo {
            path: path.to_string(),
            size,
            mode,
            ..Default::default()
        }
    }

    fn symlink(path: &str, target: &str) -> FileInfo {
        FileInfo {
            path: path.to_string(),
            mode: 0o777,
            is_symlink: true,
            symlink_target: Some(target.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_classification() -> Result<()> {
        let mut expected = VecReader::new(vec![
            file("a", 100, 0o644),
            symlink("b", "x"),
        ]);
        let mut got = VecReader::new(vec![
            file("a", 500, 0o644),
            symlink("b", "y"),
            file("c", 1, 0o644),
        ]);

        let options = CompareOptions {
            max_allowed_percent_increase: 1.0,
            ..Default::default()
        };
        let result = compare_trees(&mut expected, &mut got, &options)?;

        assert_eq!(result.only_in_got, vec!["c"]);
        assert!(result.only_in_expected.is_empty());
        assert_eq!(
            result.symlink_target_changed,
            vec![("b".to_string(), "x".to_string(), "y".to_string())]
        );
        assert_eq!(result.size_changed.len(), 1);
        assert_eq!(result.size_changed[0].path, "a");
        assert_eq!(result.size_changed[0].expected, 100);
        assert_eq!(result.size_changed[0].got, 500);
        assert_eq!(result.size_changed[0].note, "\u{2265}400%");
        assert_eq!(result.exit_code(), 1);

        Ok(())
    }

    #[test]
    fn test_percent_thresholds() {
        // +0.9% over a 1000 byte file trips the default absolute
        // allowance; +0.5% stays inside it.
        let options = CompareOptions {
            max_allowed_percent_increase: 1.0,
            ..Default::default()
        };
        assert!(size_difference(1000, 1009, &options).is_some());
        assert!(size_difference(1000, 1005, &options).is_none());

        // With the absolute check disabled the percent threshold
        // governs alone.
        let options = CompareOptions {
            max_allowed_percent_increase: 1.0,
            max_allowed_absolute_increase: 0,
            ..Default::default()
        };
        assert!(size_difference(10000, 10150, &options).is_some());
        assert!(size_difference(10000, 10090, &options).is_none());
    }

    #[test]
    fn test_minimum_compare_size() {
        let options = CompareOptions {
            minimum_compare_size: 1024,
            max_allowed_percent_increase: 1.0,
            ..Default::default()
        };
        // Both below the minimum: skipped entirely.
        assert!(size_difference(10, 900, &options).is_none());
        // One side above: checked.
        assert!(size_difference(10, 2048, &options).is_some());
    }

    #[test]
    fn test_decreases() {
        let options = CompareOptions::default();
        assert!(size_difference(1000, 100, &options).is_none());

        let options = CompareOptions {
            show_decreases: true,
            ..Default::default()
        };
        assert_eq!(size_difference(1000, 100, &options).unwrap(), "-90.0%");
    }

    #[test]
    fn test_equal_trees() -> Result<()> {
        let entries = vec![file("a", 10, 0o644), file("b", 20, 0o755)];
        let mut expected = VecReader::new(entries.clone());
        let mut got = VecReader::new(entries);

        let result =
            compare_trees(&mut expected, &mut got, &CompareOptions::default())?;
        assert!(!result.has_differences());
        assert_eq!(result.exit_code(), 0);

        let mut report = Vec::new();
        result.print_report(&mut report)?;
        assert_eq!(String::from_utf8(report).unwrap(), "Trees match.\n");

        Ok(())
    }

    #[test]
    fn test_metadata_and_ownership() -> Result<()> {
        let mut expected = VecReader::new(vec![FileInfo {
            uid: 0,
            gid: 0,
            ..file("a", 10, 0o644)
        }]);
        let mut got = VecReader::new(vec![FileInfo {
            uid: 1000,
            gid: 1000,
            ..file("a", 10, 0o600)
        }]);

        let options = CompareOptions {
            check_ownership: true,
            ..Default::default()
        };
        let result = compare_trees(&mut expected, &mut got, &options)?;

        assert_eq!(result.metadata_changed.len(), 2);
        assert_eq!(result.metadata_changed[0].what, "mode 644 -> 600");
        assert_eq!(result.metadata_changed[1].what, "owner 0.0 -> 1000.1000");

        Ok(())
    }

    #[test]
    fn test_filters() -> Result<()> {
        let mut expected = VecReader::new(vec![file("keep/a", 1, 0o644)]);
        let mut got = VecReader::new(vec![
            file("keep/b", 1, 0o644),
            file("skip/c", 1, 0o644),
        ]);

        let options = CompareOptions {
            include: Some(Regex::new("^keep/").unwrap()),
            ..Default::default()
        };
        let result = compare_trees(&mut expected, &mut got, &options)?;

        assert_eq!(result.only_in_got, vec!["keep/b"]);
        assert_eq!(result.only_in_expected, vec!["keep/a"]);

        Ok(())
    }

    #[test]
    fn test_missing_in_got() -> Result<()> {
        let mut expected = VecReader::new(vec![file("gone", 1, 0o644)]);
        let mut got = VecReader::new(vec![]);

        let result =
            compare_trees(&mut expected, &mut got, &CompareOptions::default())?;
        assert_eq!(result.only_in_expected, vec!["gone"]);
        assert_eq!(result.exit_code(), 1);

        Ok(())
    }
}
