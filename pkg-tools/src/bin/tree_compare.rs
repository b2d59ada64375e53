// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Compare two trees (archives, directories, or saved snapshots),
//! flagging size regressions past configurable thresholds.

use {
    anyhow::{Context, Result},
    clap::{Arg, Command},
    regex::Regex,
    tree_inspect::{
        compare::{compare_trees, CompareOptions},
        open_tree, saved,
    },
};

fn main() -> Result<()> {
    env_logger::init();

    let matches = Command::new("tree-compare")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Compare two file trees, with size regression thresholds")
        .arg(
            Arg::new("expected")
                .required(true)
                .takes_value(true)
                .help("Expected tree: directory, archive, or saved JSON snapshot"),
        )
        .arg(
            Arg::new("got")
                .required(false)
                .takes_value(true)
                .help("Got tree: directory or archive to verify"),
        )
        .arg(
            Arg::new("save")
                .long("save")
                .takes_value(true)
                .help("Instead of comparing, save the first tree as a JSON snapshot here"),
        )
        .arg(
            Arg::new("include")
                .long("include")
                .takes_value(true)
                .help("Only consider paths matching this regex"),
        )
        .arg(
            Arg::new("exclude")
                .long("exclude")
                .takes_value(true)
                .help("Ignore paths matching this regex"),
        )
        .arg(
            Arg::new("check_ownership")
                .long("check_ownership")
                .takes_value(false)
                .help("Compare uid/gid in addition to mode"),
        )
        .arg(
            Arg::new("minimum_compare_size")
                .long("minimum_compare_size")
                .takes_value(true)
                .default_value("0")
                .help("Skip size checks when both sides are below this size"),
        )
        .arg(
            Arg::new("show_decreases")
                .long("show_decreases")
                .takes_value(false)
                .help("Report size decreases as differences"),
        )
        .arg(
            Arg::new("max_allowed_absolute_increase")
                .long("max_allowed_absolute_increase")
                .takes_value(true)
                .default_value("8")
                .help("Allowed size growth in bytes; 0 disables the check"),
        )
        .arg(
            Arg::new("max_allowed_percent_increase")
                .long("max_allowed_percent_increase")
                .takes_value(true)
                .default_value("0")
                .help("Allowed size growth in percent of the expected size; 0 disables"),
        )
        .get_matches();

    let expected_path = matches.value_of("expected").unwrap();

    if let Some(save) = matches.value_of("save") {
        let mut reader = open_tree(expected_path)
            .with_context(|| format!("opening {}", expected_path))?;
        let mut items = Vec::new();
        while let Some(info) = reader.next()? {
            items.push(info);
        }
        saved::write_tree(save, &items).with_context(|| format!("writing {}", save))?;
        return Ok(());
    }

    let got_path = matches
        .value_of("got")
        .context("a got tree is required unless --save is used")?;

    let options = CompareOptions {
        include: matches
            .value_of("include")
            .map(Regex::new)
            .transpose()
            .context("invalid --include pattern")?,
        exclude: matches
            .value_of("exclude")
            .map(Regex::new)
            .transpose()
            .context("invalid --exclude pattern")?,
        check_ownership: matches.is_present("check_ownership"),
        minimum_compare_size: matches
            .value_of("minimum_compare_size")
            .unwrap()
            .parse()
            .context("invalid --minimum_compare_size")?,
        show_decreases: matches.is_present("show_decreases"),
        max_allowed_absolute_increase: matches
            .value_of("max_allowed_absolute_increase")
            .unwrap()
            .parse()
            .context("invalid --max_allowed_absolute_increase")?,
        max_allowed_percent_increase: matches
            .value_of("max_allowed_percent_increase")
            .unwrap()
            .parse()
            .context("invalid --max_allowed_percent_increase")?,
    };

    let mut expected = open_tree(expected_path)
        .with_context(|| format!("opening {}", expected_path))?;
    let mut got = open_tree(got_path).with_context(|| format!("opening {}", got_path))?;

    let result = compare_trees(expected.as_mut(), got.as_mut(), &options)?;
    result.print_report(&mut std::io::stdout())?;

    std::process::exit(result.exit_code());
}
