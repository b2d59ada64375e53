// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Build stamp file parsing.

use {
    anyhow::{anyhow, Context, Result},
    std::path::Path,
};

/// Extract the `BUILD_TIMESTAMP` epoch from a workspace status file.
///
/// Status files hold one `NAME value` pair per line.
pub fn get_timestamp(stamp_file: impl AsRef<Path>) -> Result<u64> {
    let stamp_file = stamp_file.as_ref();
    let content = std::fs::read_to_string(stamp_file)
        .with_context(|| format!("reading stamp file {}", stamp_file.display()))?;

    for line in content.lines() {
        if let Some((name, value)) = line.split_once(' ') {
            if name == "BUILD_TIMESTAMP" {
                return value
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid BUILD_TIMESTAMP: {}", value));
            }
        }
    }

    Err(anyhow!(
        "no BUILD_TIMESTAMP in stamp file {}",
        stamp_file.display()
    ))
}
