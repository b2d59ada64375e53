// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Flag value helpers shared by the packaging tools.

use anyhow::{anyhow, Context, Result};

/// Split `name=value` at the first separator.
pub fn split_name_value(arg: &str, separator: char) -> Result<(String, String)> {
    let (name, value) = arg
        .split_once(separator)
        .ok_or_else(|| anyhow!("malformed argument, expected name{}value: {}", separator, arg))?;

    Ok((name.to_string(), value.to_string()))
}

/// Resolve a flag value that may be indirected through a file.
///
/// A value starting with `@` names a file whose contents are the real
/// value. `strip` removes trailing whitespace either way.
pub fn flag_or_file_value(value: &str, strip: bool) -> Result<String> {
    let mut resolved = if let Some(path) = value.strip_prefix('@') {
        std::fs::read_to_string(path)
            .with_context(|| format!("reading flag value from {}", path))?
    } else {
        value.to_string()
    };

    if strip {
        resolved.truncate(resolved.trim_end().len());
    }

    Ok(resolved)
}

/// Parse an octal mode string, e.g. `0755`.
pub fn parse_octal_mode(value: &str) -> Result<u32> {
    u32::from_str_radix(value, 8).with_context(|| format!("invalid octal mode: {}", value))
}

/// Parse a `uid.gid` pair, e.g. `0.0`.
pub fn parse_ids(value: &str) -> Result<(u64, u64)> {
    let (user, group) = value
        .split_once('.')
        .ok_or_else(|| anyhow!("malformed owner, expected uid.gid: {}", value))?;

    Ok((
        user.parse().with_context(|| format!("invalid uid: {}", user))?,
        group
            .parse()
            .with_context(|| format!("invalid gid: {}", group))?,
    ))
}

/// Parse a `user.group` name pair.
pub fn parse_names(value: &str) -> Result<(String, String)> {
    let (user, group) = value
        .split_once('.')
        .ok_or_else(|| anyhow!("malformed owner name, expected user.group: {}", value))?;

    Ok((user.to_string(), group.to_string()))
}

/// Parse an `--mtime` flag: an integer epoch or `portable`.
pub fn parse_mtime(value: &str) -> Result<u64> {
    if value == "portable" {
        Ok(archive_writer::PORTABLE_MTIME)
    } else {
        value
            .parse()
            .with_context(|| format!("invalid mtime: {}", value))
    }
}
