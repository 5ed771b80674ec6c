// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Produce the members of `control.tar`.

The `control` file is rendered from the `debian/control` template, parsed,
and then completed with computed fields. Maintainer scripts and `triggers`
are rendered from `debian/<name>` templates when those templates exist.
`md5sums` and `conffiles` are derived from the data tree.
*/

use {
    crate::{
        control::ControlParagraph,
        error::{DebpkgError, Result},
        file_tree::DataTree,
        package::PackageSpec,
        tar::TarEntry,
        template::{TemplateContext, TemplateRenderer},
    },
    log::{debug, warn},
    md5::Digest,
    std::{borrow::Cow, collections::BTreeMap},
};

/// Name of the template producing the `control` file.
pub const CONTROL_TEMPLATE: &str = "debian/control";

/// Maintainer scripts, in the order `dpkg` runs them during an install/remove cycle.
pub const MAINTAINER_SCRIPTS: [&str; 4] = ["preinst", "postinst", "prerm", "postrm"];

/// Mode of maintainer scripts in `control.tar`.
pub const SCRIPT_MODE: u32 = 0o755;

/// Mode of non-executable `control.tar` members.
pub const CONTROL_FILE_MODE: u32 = 0o644;

/// Rendered content of `control.tar`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ControlArtifacts {
    /// The `control` file.
    pub control: Vec<u8>,
    /// The `conffiles` file. Empty if the package has no conffiles.
    pub conffiles: Vec<u8>,
    /// Maintainer scripts keyed by member name.
    pub maintainer_scripts: BTreeMap<String, Vec<u8>>,
    /// The `triggers` file, if the package declares triggers.
    pub triggers: Option<Vec<u8>>,
    /// The `md5sums` file.
    pub md5sums: Vec<u8>,
    /// Value of the `Installed-Size` field, in KiB.
    pub installed_size: u64,
    /// Hex md5 of each regular file, keyed by relative path.
    pub checksums: BTreeMap<String, String>,
}

impl ControlArtifacts {
    /// Tar entries for `control.tar`.
    ///
    /// The root directory comes first, followed by members sorted by name.
    pub fn tar_entries(&self) -> Vec<TarEntry> {
        let mut members: BTreeMap<&str, (u32, &[u8])> = BTreeMap::new();

        members.insert("control", (CONTROL_FILE_MODE, self.control.as_slice()));
        members.insert("md5sums", (CONTROL_FILE_MODE, self.md5sums.as_slice()));
        if !self.conffiles.is_empty() {
            members.insert("conffiles", (CONTROL_FILE_MODE, self.conffiles.as_slice()));
        }
        if let Some(triggers) = &self.triggers {
            members.insert("triggers", (CONTROL_FILE_MODE, triggers.as_slice()));
        }
        for (name, data) in &self.maintainer_scripts {
            members.insert(name.as_str(), (SCRIPT_MODE, data.as_slice()));
        }

        std::iter::once(TarEntry::directory("./"))
            .chain(
                members.into_iter().map(|(name, (mode, data))| {
                    TarEntry::file(format!("./{}", name), mode, data.to_vec())
                }),
            )
            .collect()
    }
}

/// Hex encoded md5 of data.
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(md5::Md5::digest(data))
}

/// Compute the `Installed-Size` of a tree in KiB.
///
/// Each regular file contributes its size rounded up to a whole KiB.
pub fn installed_size_kib(tree: &DataTree) -> Result<u64> {
    let mut total = 0;

    for entry in tree.iter_files() {
        if let Some(data) = entry.content()? {
            total += (data.len() as u64 + 1023) / 1024;
        }
    }

    Ok(total)
}

/// Compute md5 checksums of all regular files, keyed by relative path.
pub fn file_checksums(tree: &DataTree) -> Result<BTreeMap<String, String>> {
    let mut checksums = BTreeMap::new();

    for entry in tree.iter_files() {
        if let Some(data) = entry.content()? {
            checksums.insert(entry.path().relative(), md5_hex(data));
        }
    }

    Ok(checksums)
}

/// Render an `md5sums` file from checksums keyed by relative path.
pub fn render_md5sums(checksums: &BTreeMap<String, String>) -> Vec<u8> {
    checksums
        .iter()
        .map(|(path, digest)| format!("{}  {}\n", digest, path))
        .collect::<String>()
        .into_bytes()
}

/// Render the `conffiles` file.
///
/// Every file flagged as a conffile must be declared on the package and every
/// declared conffile must be a regular file in the tree. Output follows the
/// declaration order.
pub fn render_conffiles(spec: &PackageSpec, tree: &DataTree) -> Result<Vec<u8>> {
    for entry in tree.iter_files().filter(|e| e.is_conffile()) {
        if !spec.conffiles().contains(entry.path()) {
            return Err(DebpkgError::ConffileNotDeclared(entry.path().to_string()));
        }
    }

    let mut conffiles = String::new();
    for path in spec.conffiles() {
        match tree.get(path) {
            Some(entry) if entry.is_regular() => {
                conffiles.push_str(&format!("{}\n", path));
            }
            _ => return Err(DebpkgError::ConffileNotInstalled(path.to_string())),
        }
    }

    Ok(conffiles.into_bytes())
}

fn require_spec_value(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(DebpkgError::TemplateVariable(name.to_string()))
    } else {
        Ok(())
    }
}

/// Render and complete the `control` file.
pub fn render_control(
    spec: &PackageSpec,
    installed_size: u64,
    context: &TemplateContext,
    renderer: &dyn TemplateRenderer,
) -> Result<Vec<u8>> {
    require_spec_value("maintainer", spec.maintainer())?;
    require_spec_value("description", spec.description())?;

    let mut context = context.clone();
    context.insert("installed_size", installed_size);

    let rendered = renderer.render(CONTROL_TEMPLATE, &context)?;
    let text = String::from_utf8(rendered)
        .map_err(|e| DebpkgError::ControlParse(format!("control file is not UTF-8: {}", e)))?;

    let mut paragraph = ControlParagraph::parse_single(&text)?;

    let installed_size = installed_size.to_string();
    if let Some(value) = paragraph.field_str("Installed-Size") {
        if value != installed_size {
            warn!(
                "replacing Installed-Size {} from template with computed value {}",
                value, installed_size
            );
        }
    }
    paragraph.set_field_from_string("Installed-Size".into(), installed_size.into());

    if !spec.depends().is_empty() {
        paragraph.set_field_if_missing("Depends".into(), Cow::Owned(spec.depends().join(", ")));
    }

    for field in ["Maintainer", "Description"] {
        paragraph.required_field_str(field)?;
    }

    let expected = [
        ("Package", spec.name().to_string()),
        ("Version", spec.version().to_string()),
        ("Architecture", spec.architecture().to_string()),
    ];
    for (field, expected) in expected {
        let actual = paragraph.required_field_str(field)?;

        if actual != expected {
            return Err(DebpkgError::ControlFieldMismatch {
                field,
                expected,
                actual: actual.to_string(),
            });
        }
    }

    let mut control = vec![];
    paragraph.write(&mut control)?;

    Ok(control)
}

/// Render all `control.tar` members for a package.
///
/// `tree` must be fully materialized.
pub fn render(
    spec: &PackageSpec,
    tree: &DataTree,
    context: &TemplateContext,
    renderer: &dyn TemplateRenderer,
) -> Result<ControlArtifacts> {
    let installed_size = installed_size_kib(tree)?;
    let checksums = file_checksums(tree)?;

    let control = render_control(spec, installed_size, context, renderer)?;
    let conffiles = render_conffiles(spec, tree)?;

    let mut maintainer_scripts = BTreeMap::new();
    for script in MAINTAINER_SCRIPTS {
        let template = format!("debian/{}", script);

        if renderer.has_template(&template) {
            debug!("rendering maintainer script {}", script);
            maintainer_scripts.insert(script.to_string(), renderer.render(&template, context)?);
        }
    }

    let triggers = if renderer.has_template("debian/triggers") {
        Some(renderer.render("debian/triggers", context)?)
    } else {
        None
    };

    Ok(ControlArtifacts {
        control,
        conffiles,
        maintainer_scripts,
        triggers,
        md5sums: render_md5sums(&checksums),
        installed_size,
        checksums,
    })
}
