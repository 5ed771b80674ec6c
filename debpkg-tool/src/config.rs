// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! YAML package configuration. */

use {
    crate::{
        certificates::{CertificateProvider, CertificatesConfig},
        cli::{Result, ToolError},
    },
    debpkg::{
        builder::PackageBuilder,
        compression::DebCompression,
        file_tree::{FileData, FileEntry, DEFAULT_FILE_MODE},
        package::PackageSpec,
    },
    serde::{de::Error as _, Deserialize, Deserializer},
    serde_json::{Map, Value},
    std::{
        path::{Path, PathBuf},
        str::FromStr,
    },
};

/// Modes are always octal, as with `chmod`.
///
/// The raw scalar is read as a string so `0644`, `"0644"`, and `0o644` are
/// all the same mode. Bare YAML integers would otherwise be read as decimal.
fn deserialize_mode<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u32, D::Error> {
    let s = String::deserialize(deserializer)?;
    let digits = s.trim().trim_start_matches("0o");

    u32::from_str_radix(digits, 8)
        .ok()
        .filter(|mode| *mode <= 0o7777)
        .ok_or_else(|| D::Error::custom(format!("invalid octal mode: {}", s)))
}

fn default_file_mode() -> u32 {
    DEFAULT_FILE_MODE
}

fn default_directory_mode() -> u32 {
    0o755
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageSection {
    pub name: String,
    pub version: String,
    pub architecture: String,
    pub maintainer: String,
    pub description: String,
    pub long_description: Option<String>,
    pub section: Option<String>,
    pub priority: Option<String>,
    pub homepage: Option<String>,
    pub install_path: String,
    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default)]
    pub conffiles: Vec<String>,
}

/// A configuration file rendered from a template into the install path.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileSection {
    pub template: String,
    pub name: String,
    #[serde(default = "default_file_mode", deserialize_with = "deserialize_mode")]
    pub mode: u32,
    #[serde(default)]
    pub conffile: bool,
}

/// An extra file. Exactly one of `source`, `template`, and `symlink` is set.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSection {
    pub destination: String,
    pub source: Option<PathBuf>,
    pub template: Option<String>,
    pub symlink: Option<String>,
    #[serde(default = "default_file_mode", deserialize_with = "deserialize_mode")]
    pub mode: u32,
    #[serde(default)]
    pub conffile: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectorySection {
    pub path: String,
    #[serde(default = "default_directory_mode", deserialize_with = "deserialize_mode")]
    pub mode: u32,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
    pub compression: Option<String>,
    pub mtime: Option<u64>,
}

/// Root of a package configuration file.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageConfig {
    pub package: PackageSection,
    pub config_file: Option<ConfigFileSection>,
    /// Free-form variables exposed to templates as `config`.
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default)]
    pub files: Vec<FileSection>,
    #[serde(default)]
    pub directories: Vec<DirectorySection>,
    pub certificates: Option<CertificatesConfig>,
    #[serde(default)]
    pub build: BuildSection,
}

impl FromStr for PackageConfig {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }
}

impl PackageConfig {
    /// Load a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let f = std::fs::File::open(path)
            .map_err(|e| ToolError::ConfigRead(path.display().to_string(), e))?;

        Ok(serde_yaml::from_reader(f)?)
    }

    /// Resolve the package metadata.
    pub fn spec(&self) -> Result<PackageSpec> {
        let p = &self.package;

        let mut spec = PackageSpec::new(
            &p.name,
            &p.version,
            &p.architecture,
            &p.maintainer,
            &p.description,
            &p.install_path,
        )?
        .with_depends(&p.depends)
        .with_conffiles(p.conffiles.iter().map(|s| s.as_str()))?;

        if let Some(v) = &p.long_description {
            spec = spec.with_long_description(v.trim_end());
        }
        if let Some(v) = &p.section {
            spec = spec.with_section(v);
        }
        if let Some(v) = &p.priority {
            spec = spec.with_priority(v);
        }
        if let Some(v) = &p.homepage {
            spec = spec.with_homepage(v);
        }

        Ok(spec)
    }

    /// Resolve all explicitly configured files.
    ///
    /// Relative `source` paths are resolved against `base_dir`.
    pub fn file_entries(&self, spec: &PackageSpec, base_dir: &Path) -> Result<Vec<FileEntry>> {
        let mut entries = vec![];

        if let Some(config_file) = &self.config_file {
            let path = spec.install_path().join(&config_file.name)?;

            entries.push(
                FileEntry::new(
                    &path.to_string(),
                    FileData::Template(config_file.template.clone()),
                )?
                .set_mode(config_file.mode)
                .set_conffile(config_file.conffile),
            );
        }

        for (i, file) in self.files.iter().enumerate() {
            let key = format!("files[{}]", i);

            let entry = match (&file.source, &file.template, &file.symlink) {
                (Some(source), None, None) => {
                    FileEntry::new(&file.destination, FileData::Path(base_dir.join(source)))?
                        .set_mode(file.mode)
                }
                (None, Some(template), None) => {
                    FileEntry::new(&file.destination, FileData::Template(template.clone()))?
                        .set_mode(file.mode)
                }
                (None, None, Some(target)) => {
                    if file.conffile {
                        return Err(ToolError::ConfigValue(
                            key,
                            "symlinks cannot be conffiles".to_string(),
                        ));
                    }
                    FileEntry::symlink(&file.destination, target)?
                }
                _ => {
                    return Err(ToolError::ConfigValue(
                        key,
                        "exactly one of source, template, or symlink must be set".to_string(),
                    ));
                }
            };

            entries.push(entry.set_conffile(file.conffile));
        }

        Ok(entries)
    }

    /// The configured compression, if any.
    pub fn compression(&self) -> Result<Option<DebCompression>> {
        self.build
            .compression
            .as_deref()
            .map(|s| {
                DebCompression::from_str(s)
                    .map_err(|e| ToolError::ConfigValue("build.compression".to_string(), e.to_string()))
            })
            .transpose()
    }

    /// Construct a [PackageBuilder] from this configuration.
    pub fn to_builder(&self, base_dir: &Path) -> Result<PackageBuilder> {
        let spec = self.spec()?;
        let entries = self.file_entries(&spec, base_dir)?;

        let mut builder = PackageBuilder::new(spec)
            .set_template_variable("config", Value::Object(self.config.clone()))
            .set_template_variable(
                "config_name",
                self.config_file
                    .as_ref()
                    .map(|c| Value::from(c.name.clone()))
                    .unwrap_or(Value::Null),
            )
            .set_mtime(self.build.mtime);

        if let Some(compression) = self.compression()? {
            builder = builder.set_compression(compression);
        }

        for entry in entries {
            builder = builder.install_file(entry)?;
        }

        for dir in &self.directories {
            builder = builder.set_directory_mode(&dir.path, dir.mode)?;
        }

        if let Some(certificates) = &self.certificates {
            if certificates.enabled {
                builder = builder.add_provider(Box::new(CertificateProvider::new(certificates.clone())));
            }
        }

        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, debpkg::file_tree::FileKind, indoc::indoc};

    const SAMPLE: &str = indoc! {r#"
        package:
          name: sample-config-pkg
          version: 1.0.0
          architecture: all
          maintainer: Admin <admin@example.com>
          description: Sample configuration package
          long_description: |
            Installs TLS certificates and a configuration file.
          section: utils
          priority: optional
          install_path: /opt/config
          depends: [openssl]
          conffiles: [/opt/config/test.conf]
        config_file:
          template: config.conf
          name: test.conf
          conffile: true
        config:
          server:
            port: 8443
        files:
          - source: extra/motd
            destination: /etc/sampleapp/motd
            mode: "0600"
          - symlink: /opt/config/test.conf
            destination: /etc/sampleapp/test.conf
        directories:
          - path: /opt/config/certs
            mode: "0o750"
        certificates:
          directory: tls
        build:
          compression: xz
          mtime: 1600000000
    "#};

    #[test]
    fn parse_sample() -> Result<()> {
        let config = PackageConfig::from_str(SAMPLE)?;

        assert_eq!(config.package.name, "sample-config-pkg");
        assert_eq!(config.config["server"]["port"], 8443);
        assert_eq!(config.files[0].mode, 0o600);
        assert_eq!(config.files[1].mode, 0o644);
        assert_eq!(config.directories[0].mode, 0o750);
        assert_eq!(config.compression()?, Some(DebCompression::Xz(6)));

        let certificates = config.certificates.as_ref().unwrap();
        assert_eq!(certificates.directory, "tls");
        assert_eq!(certificates.server_common_name, "server.local");
        assert!(certificates.enabled);

        Ok(())
    }

    #[test]
    fn convert_entries() -> Result<()> {
        let config = PackageConfig::from_str(SAMPLE)?;
        let spec = config.spec()?;

        assert_eq!(spec.version().to_string(), "1.0.0");
        assert_eq!(
            spec.long_description(),
            Some("Installs TLS certificates and a configuration file.")
        );

        let entries = config.file_entries(&spec, Path::new("/srv/pkg"))?;
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0].path().to_string(), "/opt/config/test.conf");
        assert_eq!(entries[0].kind(), &FileKind::Regular(FileData::Template("config.conf".into())));
        assert!(entries[0].is_conffile());

        assert_eq!(
            entries[1].kind(),
            &FileKind::Regular(FileData::Path(PathBuf::from("/srv/pkg/extra/motd")))
        );
        assert_eq!(entries[1].mode(), 0o600);

        assert_eq!(
            entries[2].kind(),
            &FileKind::Symlink("/opt/config/test.conf".into())
        );

        Ok(())
    }

    #[test]
    fn unquoted_modes_are_octal() -> Result<()> {
        let config = PackageConfig::from_str(&SAMPLE.replace("mode: \"0600\"", "mode: 0644"))?;
        assert_eq!(config.files[0].mode, 0o644);

        let config = PackageConfig::from_str(&SAMPLE.replace("mode: \"0600\"", "mode: 0o640"))?;
        assert_eq!(config.files[0].mode, 0o640);

        let config = PackageConfig::from_str(&SAMPLE.replace("mode: \"0o750\"", "mode: 750"))?;
        assert_eq!(config.directories[0].mode, 0o750);

        Ok(())
    }

    #[test]
    fn rejects_invalid() -> Result<()> {
        assert!(matches!(
            PackageConfig::from_str("package: {}\nunknown: 1\n"),
            Err(ToolError::SerdeYaml(_))
        ));

        let ambiguous = SAMPLE.replace(
            "  - symlink: /opt/config/test.conf\n",
            "  - symlink: /opt/config/test.conf\n    source: a\n",
        );
        let config = PackageConfig::from_str(&ambiguous)?;
        assert!(matches!(
            config.file_entries(&config.spec()?, Path::new(".")),
            Err(ToolError::ConfigValue(key, _)) if key == "files[1]"
        ));

        assert!(matches!(
            PackageConfig::from_str(&SAMPLE.replace("mode: \"0600\"", "mode: \"0999\"")),
            Err(ToolError::SerdeYaml(_))
        ));
        assert!(matches!(
            PackageConfig::from_str(&SAMPLE.replace("mode: \"0600\"", "mode: \"0o17777\"")),
            Err(ToolError::SerdeYaml(_))
        ));

        let config = PackageConfig::from_str(&SAMPLE.replace("compression: xz", "compression: lz4"))?;
        assert!(matches!(
            config.compression(),
            Err(ToolError::ConfigValue(key, _)) if key == "build.compression"
        ));

        let config = PackageConfig::from_str(&SAMPLE.replace("name: sample-config-pkg", "name: Sample"))?;
        assert!(matches!(config.spec(), Err(ToolError::Debpkg(_))));

        Ok(())
    }
}
