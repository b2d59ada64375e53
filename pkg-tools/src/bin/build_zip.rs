// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Build deterministic zip files from a content manifest.

use {
    anyhow::{Context, Result},
    archive_writer::zip::{ZipWriter, ZIP_EPOCH},
    clap::{Arg, Command},
    pkg_tools::{
        build_info,
        helpers::parse_octal_mode,
        zip_pipeline::ZipPipeline,
    },
};

fn main() -> Result<()> {
    env_logger::init();

    let matches = Command::new("build-zip")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Create a zip file")
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .takes_value(true)
                .required(true)
                .help("The output zip file path"),
        )
        .arg(
            Arg::new("directory")
                .short('d')
                .long("directory")
                .takes_value(true)
                .default_value("/")
                .help("An absolute path to use as a prefix for all files in the zip"),
        )
        .arg(
            Arg::new("timestamp")
                .short('t')
                .long("timestamp")
                .takes_value(true)
                .help("The unix time to use for files added into the zip. Values prior to Jan 1, 1980 are ignored"),
        )
        .arg(
            Arg::new("stamp_from")
                .long("stamp_from")
                .takes_value(true)
                .help("File to find BUILD_TIMESTAMP in"),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .takes_value(true)
                .help("The file system mode to use for files added into the zip"),
        )
        .arg(
            Arg::new("manifest")
                .long("manifest")
                .takes_value(true)
                .required(true)
                .help("Manifest of contents to add to the zip"),
        )
        .get_matches();

    let timestamp = if let Some(stamp_from) = matches.value_of("stamp_from") {
        build_info::get_timestamp(stamp_from)? as i64
    } else if let Some(timestamp) = matches.value_of("timestamp") {
        timestamp
            .parse::<i64>()
            .with_context(|| format!("invalid timestamp: {}", timestamp))?
            .max(ZIP_EPOCH)
    } else {
        ZIP_EPOCH
    };

    let default_mode = matches
        .value_of("mode")
        .map(parse_octal_mode)
        .transpose()?;

    let output = matches.value_of("output").unwrap();
    let writer = ZipWriter::create(
        output,
        timestamp,
        default_mode,
        matches.value_of("directory").unwrap(),
    )
    .with_context(|| format!("creating {}", output))?;

    let mut pipeline = ZipPipeline::new(writer);

    let manifest = matches.value_of("manifest").unwrap();
    let entries = pkg_manifest::read_entries(manifest)
        .with_context(|| format!("reading manifest {}", manifest))?;
    for entry in &entries {
        pipeline
            .add_manifest_entry(entry)
            .with_context(|| format!("adding manifest entry {}", entry.dest))?;
    }

    pipeline.close()?;

    Ok(())
}
