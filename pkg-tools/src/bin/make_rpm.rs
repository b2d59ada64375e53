// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Build an RPM package by driving an external rpmbuild.

use {
    anyhow::{Context, Result},
    clap::{Arg, Command},
    pkg_tools::helpers::flag_or_file_value,
    rpm_packaging::builder::{AuxiliaryFiles, RpmBuilder},
    std::path::{Path, PathBuf},
};

fn slurp_scriptlet(path: &str) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading scriptlet {}", path))
}

fn main() -> Result<()> {
    env_logger::init();

    let matches = Command::new("make-rpm")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Helper for building rpm packages")
        .arg(
            Arg::new("name")
                .long("name")
                .takes_value(true)
                .help("The name of the software being packaged"),
        )
        .arg(
            Arg::new("version")
                .long("version")
                .takes_value(true)
                .help("The version of the software being packaged"),
        )
        .arg(
            Arg::new("release")
                .long("release")
                .takes_value(true)
                .help("The release of the software being packaged"),
        )
        .arg(
            Arg::new("arch")
                .long("arch")
                .takes_value(true)
                .help("The CPU architecture of the software being packaged"),
        )
        .arg(
            Arg::new("spec_file")
                .long("spec_file")
                .takes_value(true)
                .required(true)
                .help("The file containing the RPM specification"),
        )
        .arg(
            Arg::new("out_file")
                .long("out_file")
                .takes_value(true)
                .required(true)
                .help("The destination to save the resulting RPM file to"),
        )
        .arg(
            Arg::new("rpmbuild")
                .long("rpmbuild")
                .takes_value(true)
                .help("Path to rpmbuild executable"),
        )
        .arg(
            Arg::new("source_date_epoch")
                .long("source_date_epoch")
                .takes_value(true)
                .help("Value for the SOURCE_DATE_EPOCH rpmbuild environment variable"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .takes_value(false)
                .help("Print debug messages"),
        )
        .arg(
            Arg::new("install_script")
                .long("install_script")
                .takes_value(true)
                .help("Installer script"),
        )
        .arg(
            Arg::new("file_list")
                .long("file_list")
                .takes_value(true)
                .help("File containing a list of files to include with rpm spec %files -f"),
        )
        .arg(
            Arg::new("preamble")
                .long("preamble")
                .takes_value(true)
                .help("File containing the RPM preamble"),
        )
        .arg(
            Arg::new("description")
                .long("description")
                .takes_value(true)
                .help("File containing the RPM %description text"),
        )
        .arg(
            Arg::new("pre_scriptlet")
                .long("pre_scriptlet")
                .takes_value(true)
                .help("File containing the RPM %pre scriptlet, if to be substituted"),
        )
        .arg(
            Arg::new("post_scriptlet")
                .long("post_scriptlet")
                .takes_value(true)
                .help("File containing the RPM %post scriptlet, if to be substituted"),
        )
        .arg(
            Arg::new("preun_scriptlet")
                .long("preun_scriptlet")
                .takes_value(true)
                .help("File containing the RPM %preun scriptlet, if to be substituted"),
        )
        .arg(
            Arg::new("postun_scriptlet")
                .long("postun_scriptlet")
                .takes_value(true)
                .help("File containing the RPM %postun scriptlet, if to be substituted"),
        )
        .arg(
            Arg::new("files")
                .takes_value(true)
                .multiple_values(true)
                .help("Payload files to copy into the build root"),
        )
        .get_matches();

    let version = matches
        .value_of("version")
        .map(|v| flag_or_file_value(v, true))
        .transpose()?;
    let release = matches
        .value_of("release")
        .map(|v| flag_or_file_value(v, true))
        .transpose()?;

    let mut builder = RpmBuilder::new(
        matches.value_of("name").unwrap_or(""),
        version,
        release,
        matches.value_of("rpmbuild").map(Path::new),
    )?;

    if let Some(epoch) = matches.value_of("source_date_epoch") {
        builder.source_date_epoch(flag_or_file_value(epoch, true)?);
    }
    builder.debug(matches.is_present("debug"));

    if let Some(path) = matches.value_of("pre_scriptlet") {
        builder.pre_scriptlet(slurp_scriptlet(path)?);
    }
    if let Some(path) = matches.value_of("post_scriptlet") {
        builder.post_scriptlet(slurp_scriptlet(path)?);
    }
    if let Some(path) = matches.value_of("preun_scriptlet") {
        builder.preun_scriptlet(slurp_scriptlet(path)?);
    }
    if let Some(path) = matches.value_of("postun_scriptlet") {
        builder.postun_scriptlet(slurp_scriptlet(path)?);
    }

    let files = matches
        .values_of("files")
        .map(|values| values.map(PathBuf::from).collect::<Vec<_>>())
        .unwrap_or_default();
    builder.add_files(Path::new("."), &files)?;

    let aux = AuxiliaryFiles {
        preamble: matches.value_of("preamble").map(PathBuf::from),
        description: matches.value_of("description").map(PathBuf::from),
        install_script: matches.value_of("install_script").map(PathBuf::from),
        file_list: matches.value_of("file_list").map(PathBuf::from),
    };

    builder
        .build(
            Path::new(matches.value_of("spec_file").unwrap()),
            Path::new(matches.value_of("out_file").unwrap()),
            &aux,
        )
        .context("building RPM")?;

    Ok(())
}
