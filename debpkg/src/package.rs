// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Metadata describing the binary package being built. */

use crate::{
    error::{DebpkgError, Result},
    file_tree::InstallPath,
    package_version::PackageVersion,
};

fn valid_package_name(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '+' | '.' | '-'))
}

fn valid_architecture(arch: &str) -> bool {
    !arch.is_empty()
        && arch
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Describes a binary package.
///
/// Instances are validated on construction. Once handed to a
/// [crate::builder::PackageBuilder] they are not mutated.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackageSpec {
    name: String,
    version: PackageVersion,
    architecture: String,
    maintainer: String,
    description: String,
    long_description: Option<String>,
    section: Option<String>,
    priority: Option<String>,
    homepage: Option<String>,
    install_path: InstallPath,
    depends: Vec<String>,
    conffiles: Vec<InstallPath>,
}

impl PackageSpec {
    /// Construct an instance from required fields.
    ///
    /// `maintainer` and `description` are not validated here. Their absence
    /// is reported when the control file is rendered.
    pub fn new(
        name: impl ToString,
        version: &str,
        architecture: impl ToString,
        maintainer: impl ToString,
        description: impl ToString,
        install_path: &str,
    ) -> Result<Self> {
        let name = name.to_string();
        if !valid_package_name(&name) {
            return Err(DebpkgError::InvalidPackageName(name));
        }

        let architecture = architecture.to_string();
        if !valid_architecture(&architecture) {
            return Err(DebpkgError::InvalidArchitecture(architecture));
        }

        Ok(Self {
            name,
            version: PackageVersion::parse(version)?,
            architecture,
            maintainer: maintainer.to_string(),
            description: description.to_string(),
            long_description: None,
            section: None,
            priority: None,
            homepage: None,
            install_path: InstallPath::new(install_path)?,
            depends: vec![],
            conffiles: vec![],
        })
    }

    /// Set the extended description.
    ///
    /// Each line becomes a continuation line of the `Description` field.
    pub fn with_long_description(mut self, value: impl ToString) -> Self {
        self.long_description = Some(value.to_string());
        self
    }

    pub fn with_section(mut self, value: impl ToString) -> Self {
        self.section = Some(value.to_string());
        self
    }

    pub fn with_priority(mut self, value: impl ToString) -> Self {
        self.priority = Some(value.to_string());
        self
    }

    pub fn with_homepage(mut self, value: impl ToString) -> Self {
        self.homepage = Some(value.to_string());
        self
    }

    /// Set the `Depends` relationships. Each item is a single dependency expression.
    pub fn with_depends(mut self, depends: impl IntoIterator<Item = impl ToString>) -> Self {
        self.depends = depends.into_iter().map(|d| d.to_string()).collect();
        self
    }

    /// Declare conffiles. Declaration order is preserved in the `conffiles` member.
    pub fn with_conffiles<'a>(mut self, paths: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let mut conffiles: Vec<InstallPath> = vec![];

        for path in paths {
            let path = InstallPath::new(path)?;

            if path.is_root() {
                return Err(DebpkgError::InvalidInstallPath(
                    path.to_string(),
                    "conffile cannot be the root directory",
                ));
            }
            if conffiles.contains(&path) {
                return Err(DebpkgError::DuplicatePath(path.to_string()));
            }

            conffiles.push(path);
        }

        self.conffiles = conffiles;

        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &PackageVersion {
        &self.version
    }

    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    pub fn maintainer(&self) -> &str {
        &self.maintainer
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn long_description(&self) -> Option<&str> {
        self.long_description.as_deref()
    }

    pub fn section(&self) -> Option<&str> {
        self.section.as_deref()
    }

    pub fn priority(&self) -> Option<&str> {
        self.priority.as_deref()
    }

    pub fn homepage(&self) -> Option<&str> {
        self.homepage.as_deref()
    }

    /// The root directory the package installs its primary content to.
    pub fn install_path(&self) -> &InstallPath {
        &self.install_path
    }

    pub fn depends(&self) -> &[String] {
        &self.depends
    }

    pub fn conffiles(&self) -> &[InstallPath] {
        &self.conffiles
    }

    /// The conventional filename of the `.deb` for this package.
    pub fn deb_filename(&self) -> String {
        format!(
            "{}_{}_{}.deb",
            self.name,
            self.version.filename_version(),
            self.architecture
        )
    }
}
