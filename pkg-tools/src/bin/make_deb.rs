// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Assemble a debian package around a prebuilt data tarball.

use {
    anyhow::{Context, Result},
    clap::{Arg, Command},
    deb_packaging::{
        changes::{write_changes, ChangesFields},
        control::ControlFields,
        DebBuilder,
    },
    pkg_tools::helpers::flag_or_file_value,
    std::path::Path,
};

/// Control flags whose values may come from `@file` indirection and
/// are whitespace-stripped.
const STRIPPED_FLAGS: &[(&str, &str)] = &[
    ("version", "Version"),
    ("description", "Description"),
    ("maintainer", "Maintainer"),
    ("homepage", "Homepage"),
    ("built_using", "Built-Using"),
    ("installed_size", "Installed-Size"),
];

/// Simple pass-through control flags.
const PLAIN_FLAGS: &[(&str, &str)] = &[
    ("package", "Package"),
    ("section", "Section"),
    ("priority", "Priority"),
    ("architecture", "Architecture"),
    ("distribution", "Distribution"),
    ("urgency", "Urgency"),
];

/// List-valued control flags.
const LIST_FLAGS: &[(&str, &str)] = &[
    ("depends", "Depends"),
    ("recommends", "Recommends"),
    ("replaces", "Replaces"),
    ("suggests", "Suggests"),
    ("enhances", "Enhances"),
    ("conflicts", "Conflicts"),
    ("breaks", "Breaks"),
    ("pre_depends", "Pre-Depends"),
];

fn main() -> Result<()> {
    env_logger::init();

    let mut command = Command::new("make-deb")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Helper for building deb packages")
        .arg(
            Arg::new("output")
                .long("output")
                .takes_value(true)
                .required(true)
                .help("The output file, mandatory"),
        )
        .arg(
            Arg::new("changes")
                .long("changes")
                .takes_value(true)
                .required(true)
                .help("The changes output file, mandatory"),
        )
        .arg(
            Arg::new("data")
                .long("data")
                .takes_value(true)
                .required(true)
                .help("Path to the data tarball, mandatory"),
        )
        .arg(
            Arg::new("timestamp")
                .long("timestamp")
                .takes_value(true)
                .help("Epoch stamped into the changes file Date field"),
        );

    for name in ["preinst", "postinst", "prerm", "postrm", "config", "templates"] {
        command = command.arg(
            Arg::new(name)
                .long(name)
                .takes_value(true)
                .help("Maintainer script (prefix with @ to provide a path)"),
        );
    }
    command = command.arg(
        Arg::new("conffile")
            .long("conffile")
            .takes_value(true)
            .multiple_occurrences(true)
            .help("List of conffiles (prefix item with @ to provide a path)"),
    );

    for &(flag, _) in PLAIN_FLAGS.iter().chain(STRIPPED_FLAGS) {
        let required = ["package", "version", "maintainer", "description"].contains(&flag);
        command = command.arg(
            Arg::new(flag)
                .long(flag)
                .takes_value(true)
                .required(required)
                .help("Value for the matching control file field"),
        );
    }
    for &(flag, _) in LIST_FLAGS.iter() {
        command = command.arg(
            Arg::new(flag)
                .long(flag)
                .takes_value(true)
                .multiple_occurrences(true)
                .help("Value for the matching control file field, repeatable"),
        );
    }

    let matches = command.get_matches();

    let mut fields = ControlFields::new();
    for &(flag, field) in PLAIN_FLAGS {
        if let Some(value) = matches.value_of(flag) {
            fields.set(field, value)?;
        }
    }
    for &(flag, field) in STRIPPED_FLAGS {
        if let Some(value) = matches.value_of(flag) {
            fields.set(field, flag_or_file_value(value, true)?)?;
        }
    }
    for &(flag, field) in LIST_FLAGS {
        if let Some(values) = matches.values_of(flag) {
            let values = values
                .map(|v| flag_or_file_value(v, false))
                .collect::<Result<Vec<_>>>()?;
            fields.set_list(field, values)?;
        }
    }

    let mut builder = DebBuilder::new(fields);
    if let Some(value) = matches.value_of("preinst") {
        builder = builder.preinst(flag_or_file_value(value, false)?);
    }
    if let Some(value) = matches.value_of("postinst") {
        builder = builder.postinst(flag_or_file_value(value, false)?);
    }
    if let Some(value) = matches.value_of("prerm") {
        builder = builder.prerm(flag_or_file_value(value, false)?);
    }
    if let Some(value) = matches.value_of("postrm") {
        builder = builder.postrm(flag_or_file_value(value, false)?);
    }
    if let Some(value) = matches.value_of("config") {
        builder = builder.config(flag_or_file_value(value, false)?);
    }
    if let Some(value) = matches.value_of("templates") {
        builder = builder.templates(flag_or_file_value(value, false)?);
    }
    if let Some(values) = matches.values_of("conffile") {
        let values = values
            .map(|v| flag_or_file_value(v, false))
            .collect::<Result<Vec<_>>>()?;
        builder = builder.conffiles(values);
    }

    let output = Path::new(matches.value_of("output").unwrap());
    let data = Path::new(matches.value_of("data").unwrap());
    builder
        .write(output, data)
        .with_context(|| format!("writing {}", output.display()))?;

    let description = flag_or_file_value(matches.value_of("description").unwrap(), true)?;
    let changes = ChangesFields {
        package: matches.value_of("package").unwrap().to_string(),
        version: flag_or_file_value(matches.value_of("version").unwrap(), true)?,
        architecture: matches.value_of("architecture").unwrap_or("all").to_string(),
        short_description: description.lines().next().unwrap_or("").to_string(),
        maintainer: flag_or_file_value(matches.value_of("maintainer").unwrap(), true)?,
        section: matches
            .value_of("section")
            .unwrap_or("contrib/devel")
            .to_string(),
        priority: matches.value_of("priority").unwrap_or("optional").to_string(),
        distribution: matches
            .value_of("distribution")
            .unwrap_or("unstable")
            .to_string(),
        urgency: matches.value_of("urgency").unwrap_or("medium").to_string(),
        timestamp: matches
            .value_of("timestamp")
            .map(|t| t.parse::<i64>().with_context(|| format!("invalid timestamp: {}", t)))
            .transpose()?
            .unwrap_or(0),
    };
    write_changes(
        Path::new(matches.value_of("changes").unwrap()),
        output,
        &changes,
    )?;

    Ok(())
}
