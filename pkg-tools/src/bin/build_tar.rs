// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Build deterministic tar packages from a content manifest.

use {
    anyhow::{Context, Result},
    archive_writer::{compression::Compression, tar::TarWriter},
    clap::{Arg, Command},
    pkg_tools::{
        build_info,
        helpers::{parse_ids, parse_mtime, parse_names, parse_octal_mode, split_name_value},
        tar_pipeline::{AttributeResolver, TarPipeline},
    },
    std::{collections::HashMap, path::Path},
};

fn main() -> Result<()> {
    env_logger::init();

    let matches = Command::new("build-tar")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Helper for building tar packages")
        .arg(
            Arg::new("output")
                .long("output")
                .takes_value(true)
                .required(true)
                .help("The output file, mandatory"),
        )
        .arg(
            Arg::new("manifest")
                .long("manifest")
                .takes_value(true)
                .help("Manifest of contents to add to the layer"),
        )
        .arg(
            Arg::new("mode")
                .long("mode")
                .takes_value(true)
                .help("Force the mode on the added files (in octal)"),
        )
        .arg(
            Arg::new("mtime")
                .long("mtime")
                .takes_value(true)
                .help("Set mtime on tar file entries. May be an integer or the value 'portable', to get the value 2000-01-01, which is usable with non *nix OSes"),
        )
        .arg(
            Arg::new("empty_root_dir")
                .long("empty_root_dir")
                .takes_value(true)
                .multiple_occurrences(true)
                .help("An empty dir to add to the layer"),
        )
        .arg(
            Arg::new("tar")
                .long("tar")
                .takes_value(true)
                .multiple_occurrences(true)
                .help("A tar file to add to the layer"),
        )
        .arg(
            Arg::new("deb")
                .long("deb")
                .takes_value(true)
                .multiple_occurrences(true)
                .help("A debian package to add to the layer"),
        )
        .arg(
            Arg::new("directory")
                .long("directory")
                .takes_value(true)
                .help("Directory in which to store the file inside the layer"),
        )
        .arg(
            Arg::new("compression")
                .long("compression")
                .takes_value(true)
                .conflicts_with("compressor")
                .help("Compression (`gz`, `bz2`, `xz`, or `lzma`), default is none"),
        )
        .arg(
            Arg::new("compressor")
                .long("compressor")
                .takes_value(true)
                .help("Compressor program and arguments, e.g. `pigz -p 4`"),
        )
        .arg(
            Arg::new("modes")
                .long("modes")
                .takes_value(true)
                .multiple_occurrences(true)
                .help("Specific mode to apply to specific file, e.g. path/to/file=0455"),
        )
        .arg(
            Arg::new("owners")
                .long("owners")
                .takes_value(true)
                .multiple_occurrences(true)
                .help("Specify the numeric owners of individual files, e.g. path/to/file=0.0"),
        )
        .arg(
            Arg::new("owner")
                .long("owner")
                .takes_value(true)
                .default_value("0.0")
                .help("Specify the numeric default owner of all files, e.g. 0.0"),
        )
        .arg(
            Arg::new("owner_name")
                .long("owner_name")
                .takes_value(true)
                .help("Specify the owner name of all files, e.g. root.root"),
        )
        .arg(
            Arg::new("owner_names")
                .long("owner_names")
                .takes_value(true)
                .multiple_occurrences(true)
                .help("Specify the owner names of individual files, e.g. path/to/file=root.root"),
        )
        .arg(
            Arg::new("root_directory")
                .long("root_directory")
                .takes_value(true)
                .default_value("./")
                .help("Default root directory is named '.'"),
        )
        .arg(
            Arg::new("stamp_from")
                .long("stamp_from")
                .takes_value(true)
                .help("File to find BUILD_TIMESTAMP in"),
        )
        .get_matches();

    let mut resolver = AttributeResolver {
        default_ids: parse_ids(matches.value_of("owner").unwrap())?,
        ..Default::default()
    };

    if let Some(mode) = matches.value_of("mode") {
        resolver.default_mode = Some(parse_octal_mode(mode)?);
    }
    if let Some(values) = matches.values_of("modes") {
        for value in values {
            let (path, mode) = split_name_value(value, '=')?;
            resolver
                .mode_map
                .insert(path.trim_start_matches('/').to_string(), parse_octal_mode(&mode)?);
        }
    }
    if let Some(values) = matches.values_of("owners") {
        for value in values {
            let (path, owner) = split_name_value(value, '=')?;
            resolver
                .ids_map
                .insert(path.trim_start_matches('/').to_string(), parse_ids(&owner)?);
        }
    }
    if let Some(owner_name) = matches.value_of("owner_name") {
        resolver.default_names = parse_names(owner_name)?;
    }
    if let Some(values) = matches.values_of("owner_names") {
        for value in values {
            let (path, names) = split_name_value(value, '=')?;
            resolver
                .names_map
                .insert(path.trim_start_matches('/').to_string(), parse_names(&names)?);
        }
    }

    let default_mtime = if let Some(stamp_from) = matches.value_of("stamp_from") {
        build_info::get_timestamp(stamp_from)?
    } else if let Some(mtime) = matches.value_of("mtime") {
        parse_mtime(mtime)?
    } else {
        0
    };

    let mut builder = TarWriter::builder()
        .root_directory(matches.value_of("root_directory").unwrap())
        .default_mtime(default_mtime);
    if let Some(compression) = matches.value_of("compression") {
        builder = builder.compression(Compression::from_flag(compression)?);
    }
    if let Some(compressor) = matches.value_of("compressor") {
        builder = builder.compressor(compressor);
    }

    let output = matches.value_of("output").unwrap();
    let writer = builder
        .create(output)
        .with_context(|| format!("creating {}", output))?;

    let mut pipeline = TarPipeline::new(
        writer,
        matches.value_of("directory").map(|d| d.to_string()),
        resolver,
    );

    if let Some(manifest) = matches.value_of("manifest") {
        let entries = pkg_manifest::read_entries(manifest)
            .with_context(|| format!("reading manifest {}", manifest))?;
        for entry in &entries {
            pipeline
                .add_manifest_entry(entry)
                .with_context(|| format!("adding manifest entry {}", entry.dest))?;
        }
    }

    if let Some(paths) = matches.values_of("empty_root_dir") {
        for path in paths {
            pipeline.add_empty_root_dir(path)?;
        }
    }
    if let Some(paths) = matches.values_of("tar") {
        for path in paths {
            pipeline.add_tar(Path::new(path))?;
        }
    }
    if let Some(paths) = matches.values_of("deb") {
        for path in paths {
            pipeline.add_deb(Path::new(path))?;
        }
    }

    pipeline.close()?;

    Ok(())
}
