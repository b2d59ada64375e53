// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Create .deb package files from their components. */

use {
    crate::{control::ControlFields, DebError, Result},
    archive_writer::ar::{ArHeader, ArWriter},
    std::{
        fs::File,
        io::Write,
        path::Path,
    },
};

/// A builder for a `.deb` package file.
///
/// The data tarball is supplied prebuilt; this type assembles the
/// control archive and the outer ar container around it.
pub struct DebBuilder {
    fields: ControlFields,
    preinst: Option<String>,
    postinst: Option<String>,
    prerm: Option<String>,
    postrm: Option<String>,
    config: Option<String>,
    templates: Option<String>,
    conffiles: Option<Vec<String>>,
}

impl DebBuilder {
    /// Construct a new instance from a control field set.
    pub fn new(fields: ControlFields) -> Self {
        Self {
            fields,
            preinst: None,
            postinst: None,
            prerm: None,
            postrm: None,
            config: None,
            templates: None,
            conffiles: None,
        }
    }

    /// The `preinst` maintainer script.
    pub fn preinst(mut self, content: impl ToString) -> Self {
        self.preinst = Some(content.to_string());
        self
    }

    /// The `postinst` maintainer script.
    pub fn postinst(mut self, content: impl ToString) -> Self {
        self.postinst = Some(content.to_string());
        self
    }

    /// The `prerm` maintainer script.
    pub fn prerm(mut self, content: impl ToString) -> Self {
        self.prerm = Some(content.to_string());
        self
    }

    /// The `postrm` maintainer script.
    pub fn postrm(mut self, content: impl ToString) -> Self {
        self.postrm = Some(content.to_string());
        self
    }

    /// The debconf `config` script.
    pub fn config(mut self, content: impl ToString) -> Self {
        self.config = Some(content.to_string());
        self
    }

    /// The debconf `templates` file.
    pub fn templates(mut self, content: impl ToString) -> Self {
        self.templates = Some(content.to_string());
        self
    }

    /// Paths registered as configuration files.
    pub fn conffiles(mut self, paths: Vec<String>) -> Self {
        self.conffiles = Some(paths);
        self
    }

    /// Extra files installed into the control archive, in emission
    /// order: `(name, content, mode)`.
    fn extra_files(&self) -> Vec<(&'static str, String, u32)> {
        let mut extras = Vec::new();

        if let Some(v) = &self.preinst {
            extras.push(("preinst", v.clone(), 0o755));
        }
        if let Some(v) = &self.postinst {
            extras.push(("postinst", v.clone(), 0o755));
        }
        if let Some(v) = &self.prerm {
            extras.push(("prerm", v.clone(), 0o755));
        }
        if let Some(v) = &self.postrm {
            extras.push(("postrm", v.clone(), 0o755));
        }
        if let Some(v) = &self.config {
            extras.push(("config", v.clone(), 0o644));
        }
        if let Some(v) = &self.templates {
            extras.push(("templates", v.clone(), 0o644));
        }
        if let Some(v) = &self.conffiles {
            extras.push(("conffiles", format!("{}\n", v.join("\n")), 0o644));
        }

        extras
    }

    /// Build the `control.tar.gz` member in memory.
    ///
    /// Both the gzip header and the tar entries use mtime 0 so the
    /// member is deterministic.
    fn build_control_tar_gz(&self) -> Result<Vec<u8>> {
        let encoder = flate2::GzBuilder::new()
            .mtime(0)
            .write(Vec::new(), flate2::Compression::new(9));
        let mut builder = tar::Builder::new(encoder);

        let control = self.fields.render()?;
        append_control_member(&mut builder, "control", control.as_bytes(), 0o644)?;

        for (name, content, mode) in self.extra_files() {
            append_control_member(&mut builder, name, content.as_bytes(), mode)?;
        }

        let encoder = builder.into_inner()?;
        Ok(encoder.finish()?)
    }

    /// Write the `.deb` package to `output`, embedding the data tarball
    /// at `data` under the extension derived from its filename.
    pub fn write(&self, output: &Path, data: &Path) -> Result<()> {
        let control = self.build_control_tar_gz()?;

        let mut ar = ArWriter::new(File::create(output)?)?;
        ar.append_data("debian-binary", b"2.0\n")?;
        ar.append_data("control.tar.gz", &control)?;

        let data_name = data
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let member = format!("data.{}", data_extension(&data_name));

        let size = data.metadata()?.len();
        let mut data_file = File::open(data)?;
        ar.append(&ArHeader::new(member, size), &mut data_file)?;

        ar.into_inner().flush().map_err(DebError::Io)?;

        Ok(())
    }
}

fn append_control_member<W: Write>(
    builder: &mut tar::Builder<W>,
    name: &str,
    content: &[u8],
    mode: u32,
) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(mode);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header.set_path(name).map_err(DebError::Io)?;
    header.set_cksum();
    builder.append(&header, content)?;

    Ok(())
}

/// Derive the data member extension from the supplied data file name.
///
/// Recognized: `tar`, `tar.gz`, `tar.bz2`, `tar.xz`, `tar.lzma`, with
/// `tgz` normalized to `tar.gz`. Anything else is treated as plain tar.
fn data_extension(name: &str) -> String {
    let parts = name.split('.').collect::<Vec<_>>();
    if parts.len() < 2 {
        return "tar".to_string();
    }

    let last = &parts[parts.len() - 2..];
    if last[1] == "tgz" {
        return "tar.gz".to_string();
    }

    let joined = last.join(".");
    if ["tar.gz", "tar.bz2", "tar.xz", "tar.lzma"].contains(&joined.as_str()) {
        joined
    } else {
        "tar".to_string()
    }
}
