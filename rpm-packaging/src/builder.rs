// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Drive an external `rpmbuild` to produce RPM packages.

The builder lays out an rpmbuild working directory (`SOURCES/`,
`BUILD/`, `RPMS/`, `TMP/`), copies payload files into `BUILD/`
preserving relative paths, rewrites the spec file with version/release
and scriptlet substitutions, invokes `rpmbuild --bb`, and locates the
output via the `Wrote: <path>` line in its log.
*/

use {
    crate::{Result, RpmError},
    is_executable::IsExecutable,
    once_cell::sync::Lazy,
    std::{
        collections::HashMap,
        fs::File,
        io::{BufRead, BufReader, Write},
        path::{Path, PathBuf},
        process::{Command, Stdio},
    },
};

static WROTE_FILE_RE: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"Wrote: (.+)").unwrap());

const SOURCE_DIR: &str = "SOURCES";
const BUILD_DIR: &str = "BUILD";
const BUILDROOT_DIR: &str = "BUILDROOT";
const RPMS_DIR: &str = "RPMS";
const TEMP_DIR: &str = "TMP";

/// Find the path of the written RPM in rpmbuild log output.
pub fn find_output_file(log: &str) -> Option<String> {
    WROTE_FILE_RE
        .captures(log)
        .map(|caps| caps[1].trim().to_string())
}

/// Resolve the rpmbuild executable.
///
/// An explicit path must be executable; otherwise `PATH` is searched.
pub fn find_rpmbuild(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if !path.is_executable() {
            return Err(RpmError::InvalidRpmbuild(path.display().to_string()));
        }
        return Ok(path.to_path_buf());
    }

    for dir in std::env::split_paths(&std::env::var_os("PATH").unwrap_or_default()) {
        let candidate = dir.join("rpmbuild");
        if candidate.is_file() && candidate.is_executable() {
            return Ok(candidate);
        }
    }

    Err(RpmError::NoRpmbuildFound)
}

/// Substitute `$NAME` / `${NAME}` template variables in a line.
///
/// Unknown variables are left intact and `$$` escapes a literal dollar,
/// matching `string.Template.safe_substitute` semantics.
pub fn template_substitute(line: &str, variables: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        match chars.peek() {
            Some((_, '$')) => {
                chars.next();
                out.push('$');
            }
            Some((_, '{')) => {
                if let Some(end) = line[i..].find('}') {
                    let name = &line[i + 2..i + end];
                    if let Some(value) = variables.get(name) {
                        out.push_str(value);
                    } else {
                        out.push_str(&line[i..=i + end]);
                    }
                    // Consume through the closing brace.
                    while let Some((j, _)) = chars.peek() {
                        if *j > i + end {
                            break;
                        }
                        chars.next();
                    }
                } else {
                    out.push('$');
                }
            }
            Some((start, c2)) if c2.is_ascii_alphabetic() || *c2 == '_' => {
                let start = *start;
                let mut end = start;
                while let Some((j, cj)) = chars.peek() {
                    if cj.is_ascii_alphanumeric() || *cj == '_' {
                        end = *j + cj.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let name = &line[start..end];
                if let Some(value) = variables.get(name) {
                    out.push_str(value);
                } else {
                    out.push('$');
                    out.push_str(name);
                }
            }
            _ => out.push('$'),
        }
    }

    out
}

/// Copy a file line by line applying rewrites.
///
/// `replacements` maps line prefixes to replacement text for the rest
/// of the line; `template` maps `$VAR` style variables.
pub fn copy_and_rewrite(
    input: &Path,
    output: &Path,
    replacements: &[(String, String)],
    template: &HashMap<&str, String>,
) -> Result<()> {
    let reader = BufReader::new(File::open(input)?);
    let mut writer = File::create(output)?;

    for line in reader.lines() {
        let mut line = line?;

        for (prefix, text) in replacements {
            if line.starts_with(prefix.as_str()) {
                line = format!("{} {}", prefix, text);
                break;
            }
        }

        line = template_substitute(&line, template);

        writeln!(writer, "{}", line)?;
    }

    Ok(())
}

/// Optional auxiliary files wired into rpmbuild via `--define`.
#[derive(Default)]
pub struct AuxiliaryFiles {
    pub preamble: Option<PathBuf>,
    pub description: Option<PathBuf>,
    pub install_script: Option<PathBuf>,
    pub file_list: Option<PathBuf>,
}

/// A helper to manage building an RPM file via rpmbuild.
pub struct RpmBuilder {
    name: String,
    version: Option<String>,
    release: Option<String>,
    rpmbuild_path: PathBuf,
    /// Payload files as (source, path relative to BUILD/).
    files: Vec<(PathBuf, PathBuf)>,
    pre_scriptlet: Option<String>,
    post_scriptlet: Option<String>,
    preun_scriptlet: Option<String>,
    postun_scriptlet: Option<String>,
    source_date_epoch: Option<String>,
    debug: bool,
}

impl RpmBuilder {
    /// Construct a builder, resolving rpmbuild immediately.
    pub fn new(
        name: impl ToString,
        version: Option<String>,
        release: Option<String>,
        rpmbuild: Option<&Path>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            version,
            release,
            rpmbuild_path: find_rpmbuild(rpmbuild)?,
            files: Vec::new(),
            pre_scriptlet: None,
            post_scriptlet: None,
            preun_scriptlet: None,
            postun_scriptlet: None,
            source_date_epoch: None,
            debug: false,
        })
    }

    /// Register payload files rooted at `root`. Directories are
    /// expanded recursively.
    pub fn add_files(&mut self, root: &Path, paths: &[PathBuf]) -> Result<()> {
        for path in paths {
            let full = root.join(path);
            if full.is_dir() {
                let children = std::fs::read_dir(&full)?
                    .map(|e| Ok(path.join(e?.file_name())))
                    .collect::<Result<Vec<_>>>()?;
                self.add_files(root, &children)?;
            } else {
                self.files.push((full, path.clone()));
            }
        }

        Ok(())
    }

    pub fn pre_scriptlet(&mut self, content: impl ToString) -> &mut Self {
        self.pre_scriptlet = Some(content.to_string());
        self
    }

    pub fn post_scriptlet(&mut self, content: impl ToString) -> &mut Self {
        self.post_scriptlet = Some(content.to_string());
        self
    }

    pub fn preun_scriptlet(&mut self, content: impl ToString) -> &mut Self {
        self.preun_scriptlet = Some(content.to_string());
        self
    }

    pub fn postun_scriptlet(&mut self, content: impl ToString) -> &mut Self {
        self.postun_scriptlet = Some(content.to_string());
        self
    }

    /// Epoch exported as `SOURCE_DATE_EPOCH` and wired into the mtime
    /// clamping macros for reproducible output.
    pub fn source_date_epoch(&mut self, epoch: impl ToString) -> &mut Self {
        self.source_date_epoch = Some(epoch.to_string());
        self
    }

    pub fn debug(&mut self, debug: bool) -> &mut Self {
        self.debug = debug;
        self
    }

    /// Populate the rpmbuild working directory.
    fn setup_workdir(
        &self,
        workdir: &Path,
        spec_file: &Path,
        aux: &AuxiliaryFiles,
    ) -> Result<PathBuf> {
        for name in [SOURCE_DIR, BUILD_DIR, RPMS_DIR, TEMP_DIR] {
            std::fs::create_dir_all(workdir.join(name))?;
        }

        for (src, rel) in &self.files {
            let dst = workdir.join(BUILD_DIR).join(rel);
            if let Some(parent) = dst.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(src, &dst)?;
        }

        let mut template = HashMap::new();
        template.insert(
            "PRE_SCRIPTLET",
            format!("%pre\n{}", self.pre_scriptlet.as_deref().unwrap_or("")),
        );
        template.insert(
            "POST_SCRIPTLET",
            format!("%post\n{}", self.post_scriptlet.as_deref().unwrap_or("")),
        );
        template.insert(
            "PREUN_SCRIPTLET",
            format!("%preun\n{}", self.preun_scriptlet.as_deref().unwrap_or("")),
        );
        template.insert(
            "POSTUN_SCRIPTLET",
            format!("%postun\n{}", self.postun_scriptlet.as_deref().unwrap_or("")),
        );

        let mut replacements = Vec::new();
        if let Some(version) = &self.version {
            replacements.push(("Version:".to_string(), version.clone()));
        }
        if let Some(release) = &self.release {
            replacements.push(("Release:".to_string(), release.clone()));
        }

        let spec_dest = workdir.join(
            spec_file
                .file_name()
                .ok_or_else(|| RpmError::BadHeader("spec file has no name".to_string()))?,
        );
        copy_and_rewrite(spec_file, &spec_dest, &replacements, &template)?;

        if let Some(preamble) = &aux.preamble {
            let mut template = HashMap::new();
            if let Some(version) = &self.version {
                template.insert("VERSION_FROM_FILE", version.clone());
            }
            if let Some(release) = &self.release {
                template.insert("RELEASE_FROM_FILE", release.clone());
            }
            copy_and_rewrite(
                preamble,
                &workdir.join(preamble.file_name().unwrap_or_default()),
                &[],
                &template,
            )?;
        }

        if let Some(description) = &aux.description {
            std::fs::copy(
                description,
                workdir.join(description.file_name().unwrap_or_default()),
            )?;
        }
        if let Some(install) = &aux.install_script {
            std::fs::copy(install, workdir.join(install.file_name().unwrap_or_default()))?;
        }
        if let Some(file_list) = &aux.file_list {
            std::fs::copy(
                file_list,
                workdir
                    .join(BUILD_DIR)
                    .join(file_list.file_name().unwrap_or_default()),
            )?;
        }

        Ok(spec_dest)
    }

    /// Invoke rpmbuild and return its combined log.
    fn call_rpmbuild(&self, workdir: &Path, spec_dest: &Path, aux: &AuxiliaryFiles) -> Result<(bool, String)> {
        let buildroot = workdir.join(BUILDROOT_DIR);

        let mut command = Command::new(&self.rpmbuild_path);
        if self.debug {
            command.arg("-vv");
        }
        command
            .arg("--define")
            .arg(format!("_topdir {}", workdir.display()))
            .arg("--define")
            .arg(format!("_tmppath {}/{}", workdir.display(), TEMP_DIR))
            .arg("--bb")
            .arg(format!("--buildroot={}", buildroot.display()));

        if let Some(preamble) = &aux.preamble {
            command.arg("--define").arg(format!(
                "build_rpm_options {}",
                preamble.file_name().unwrap_or_default().to_string_lossy()
            ));
        }
        if let Some(description) = &aux.description {
            command.arg("--define").arg(format!(
                "build_rpm_description {}",
                description.file_name().unwrap_or_default().to_string_lossy()
            ));
        }
        if let Some(install) = &aux.install_script {
            command.arg("--define").arg(format!(
                "build_rpm_install {}",
                install.file_name().unwrap_or_default().to_string_lossy()
            ));
        }
        if let Some(file_list) = &aux.file_list {
            // %files -f resolves relative to the package build root.
            command.arg("--define").arg(format!(
                "build_rpm_files {}",
                file_list.file_name().unwrap_or_default().to_string_lossy()
            ));
        }

        if self.source_date_epoch.is_some() {
            command
                .arg("--define")
                .arg("clamp_mtime_to_source_date_epoch 1")
                .arg("--define")
                .arg("use_source_date_epoch_as_buildtime 1");
        }

        command.arg(spec_dest);

        command
            .current_dir(workdir)
            .env("LANG", "C")
            .env("RPM_BUILD_ROOT", &buildroot);
        if let Some(epoch) = &self.source_date_epoch {
            command.env("SOURCE_DATE_EPOCH", epoch);
        }

        if self.debug {
            log::debug!("running rpmbuild as: {:?}", command);
        }

        let output = command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;

        let mut log = String::from_utf8_lossy(&output.stdout).to_string();
        log.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok((output.status.success(), log))
    }

    /// Build the RPM described by `spec_file`, copying the result to
    /// `out_file`.
    pub fn build(&self, spec_file: &Path, out_file: &Path, aux: &AuxiliaryFiles) -> Result<()> {
        let workdir = tempfile::TempDir::new()?;

        let spec_dest = self.setup_workdir(workdir.path(), spec_file, aux)?;
        let (success, log) = self.call_rpmbuild(workdir.path(), &spec_dest, aux)?;

        let rpm_path = find_output_file(&log);

        if !success || rpm_path.is_none() {
            return Err(RpmError::Subprocess { log });
        }

        log::info!(
            "built RPM for {}; saving to {}",
            self.name,
            out_file.display()
        );
        std::fs::copy(rpm_path.unwrap(), out_file)?;

        Ok(())
    }
}
