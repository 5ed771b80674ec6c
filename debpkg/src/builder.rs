// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Create .deb package files.

[PackageBuilder] sequences a build through [BuildStage]s. A failure in any
stage aborts the build and is reported as [DebpkgError::Build] carrying the
stage. Output files are only moved into place once they are complete.
*/

use {
    crate::{
        ar::{self, ArMember},
        compression::DebCompression,
        control_renderer::{self, md5_hex, ControlArtifacts},
        error::{DebpkgError, Result},
        file_tree::{DataTree, DataTreeProvider, DirectoryAttributes, FileData, FileEntry, FileKind, InstallPath},
        package::PackageSpec,
        tar::{self, TarEntryType},
        template::{TemplateContext, TemplateRenderer},
    },
    log::{debug, info},
    serde_json::Value,
    std::{
        fmt::{Display, Formatter},
        io::{Cursor, Write},
        path::{Path, PathBuf},
        time::SystemTime,
    },
};

/// Content of the `debian-binary` member.
pub const DEBIAN_BINARY: &[u8] = b"2.0\n";

/// Mode given to written `.deb` files.
pub const OUTPUT_FILE_MODE: u32 = 0o644;

/// Stages of a package build.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BuildStage {
    Init,
    /// Resolve file content and run data tree providers.
    MaterializeData,
    RenderControl,
    AssembleControlTar,
    AssembleDataTar,
    AssembleAr,
    WriteOutput,
    Done,
    Failed,
}

impl BuildStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::MaterializeData => "MATERIALIZE_DATA",
            Self::RenderControl => "RENDER_CONTROL",
            Self::AssembleControlTar => "ASSEMBLE_CONTROL_TAR",
            Self::AssembleDataTar => "ASSEMBLE_DATA_TAR",
            Self::AssembleAr => "ASSEMBLE_AR",
            Self::WriteOutput => "WRITE_OUTPUT",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }
}

impl Display for BuildStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn run_stage<T>(stage: BuildStage, f: impl FnOnce() -> Result<T>) -> Result<T> {
    debug!("entering build stage {}", stage);

    f().map_err(|e| {
        debug!("build stage {} failed; transitioning to {}", stage, BuildStage::Failed);

        DebpkgError::Build {
            stage,
            source: Box::new(e),
        }
    })
}

/// A `.deb` built in memory.
#[derive(Clone, Debug)]
pub struct BuiltPackage {
    /// Conventional filename of the package.
    pub filename: String,
    pub package: String,
    pub version: String,
    pub architecture: String,
    /// `Installed-Size` in KiB.
    pub installed_size: u64,
    /// Content of the `.deb` file.
    pub data: Vec<u8>,
}

/// Describes a `.deb` written to the filesystem.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BuildSummary {
    pub package: String,
    pub version: String,
    pub architecture: String,
    /// Size of the `.deb` file in bytes.
    pub size: u64,
    pub installed_size: u64,
    pub path: PathBuf,
}

impl Display for BuildSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "package:        {}", self.package)?;
        writeln!(f, "version:        {}", self.version)?;
        writeln!(f, "architecture:   {}", self.architecture)?;
        writeln!(f, "size:           {} bytes", self.size)?;
        writeln!(f, "installed size: {} KiB", self.installed_size)?;
        write!(f, "output:         {}", self.path.display())
    }
}

/// A builder for a `.deb` package file.
pub struct PackageBuilder {
    spec: PackageSpec,
    tree: DataTree,
    providers: Vec<Box<dyn DataTreeProvider>>,
    compression: DebCompression,
    mtime: Option<u64>,
    context: TemplateContext,
}

impl PackageBuilder {
    /// Construct a new instance for a package.
    pub fn new(spec: PackageSpec) -> Self {
        let context = TemplateContext::from_spec(&spec);

        Self {
            spec,
            tree: DataTree::default(),
            providers: vec![],
            compression: DebCompression::default(),
            mtime: None,
            context,
        }
    }

    pub fn spec(&self) -> &PackageSpec {
        &self.spec
    }

    /// Set the compression format applied to both tar members.
    pub fn set_compression(mut self, compression: DebCompression) -> Self {
        self.compression = compression;
        self
    }

    /// Set the modified time, in seconds since the UNIX epoch, of all archive entries.
    ///
    /// If not called, or called with `None`, the current time is used.
    pub fn set_mtime(mut self, mtime: Option<u64>) -> Self {
        self.mtime = mtime;
        self
    }

    /// Expose an additional variable to templates.
    pub fn set_template_variable(mut self, name: impl ToString, value: impl Into<Value>) -> Self {
        self.context.insert(name, value);
        self
    }

    /// Register a file as to be installed by this package.
    pub fn install_file(mut self, entry: FileEntry) -> Result<Self> {
        self.tree.add_file(entry)?;
        Ok(self)
    }

    /// Give a directory a non-default mode.
    pub fn set_directory_mode(mut self, path: &str, mode: u32) -> Result<Self> {
        self.tree.set_directory(
            InstallPath::new(path)?,
            DirectoryAttributes {
                mode,
                ..Default::default()
            },
        )?;
        Ok(self)
    }

    /// Register a provider of additional data tree entries.
    pub fn add_provider(mut self, provider: Box<dyn DataTreeProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    fn mtime(&self) -> u64 {
        self.mtime.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        })
    }

    /// Resolve all file content and merge provider output into the tree.
    fn materialize(&self, renderer: &dyn TemplateRenderer) -> Result<DataTree> {
        let mut tree = self.tree.clone();

        for entry in tree.iter_files_mut() {
            let data = match entry.kind() {
                FileKind::Regular(FileData::Path(source)) => {
                    debug!("reading {} for {}", source.display(), entry.path());
                    Some(
                        std::fs::read(source)
                            .map_err(|e| DebpkgError::IoPath(source.display().to_string(), e))?,
                    )
                }
                FileKind::Regular(FileData::Template(name)) => {
                    debug!("rendering template {} for {}", name, entry.path());
                    Some(renderer.render(name, &self.context)?)
                }
                FileKind::Regular(FileData::Memory(_)) | FileKind::Symlink(_) => None,
            };

            if let Some(data) = data {
                entry.set_content(data);
            }
        }

        for provider in &self.providers {
            debug!("running data tree provider {}", provider.name());

            let entries = provider
                .provide(&self.spec)
                .map_err(|e| match e {
                    DebpkgError::Provider(..) => e,
                    e => DebpkgError::Provider(provider.name().to_string(), e.to_string()),
                })?;

            for entry in entries {
                entry.content()?;
                debug!("{} provided {}", provider.name(), entry.path());
                tree.add_file(entry)?;
            }
        }

        Ok(tree)
    }

    /// Build the `data.tar` and verify its content against rendered checksums.
    fn data_tar(&self, tree: &DataTree, control: &ControlArtifacts, mtime: u64) -> Result<Vec<u8>> {
        let entries = tree.archive_entries()?;

        let mut verified = 0;
        for entry in entries
            .iter()
            .filter(|e| e.entry_type == TarEntryType::Regular)
        {
            debug!("data.tar entry {}", entry.path);

            let path = entry.path.trim_start_matches("./");
            let actual = md5_hex(&entry.data);

            match control.checksums.get(path) {
                Some(declared) if declared == &actual => {
                    verified += 1;
                }
                declared => {
                    return Err(DebpkgError::ChecksumMismatch {
                        path: path.to_string(),
                        declared: declared.cloned().unwrap_or_else(|| "<none>".to_string()),
                        actual,
                    });
                }
            }
        }

        if verified != control.checksums.len() {
            return Err(DebpkgError::ChecksumMismatch {
                path: "md5sums".to_string(),
                declared: format!("{} files", control.checksums.len()),
                actual: format!("{} files", verified),
            });
        }

        let data = tar::build_archive(&entries, mtime)?;

        self.compression.compress(&mut Cursor::new(data))
    }

    /// Build the package in memory.
    pub fn build(&self, renderer: &dyn TemplateRenderer) -> Result<BuiltPackage> {
        let mtime = run_stage(BuildStage::Init, || {
            info!(
                "building {} {} ({})",
                self.spec.name(),
                self.spec.version(),
                self.spec.architecture()
            );
            Ok(self.mtime())
        })?;

        let tree = run_stage(BuildStage::MaterializeData, || self.materialize(renderer))?;

        let control = run_stage(BuildStage::RenderControl, || {
            control_renderer::render(&self.spec, &tree, &self.context, renderer)
        })?;

        let control_tar = run_stage(BuildStage::AssembleControlTar, || {
            let data = tar::build_archive(&control.tar_entries(), mtime)?;
            self.compression.compress(&mut Cursor::new(data))
        })?;

        let data_tar = run_stage(BuildStage::AssembleDataTar, || {
            self.data_tar(&tree, &control, mtime)
        })?;

        let data = run_stage(BuildStage::AssembleAr, || {
            let extension = self.compression.extension();

            ar::build_archive(&[
                ArMember::new("debian-binary", DEBIAN_BINARY).set_mtime(mtime),
                ArMember::new(format!("control.tar{}", extension), control_tar).set_mtime(mtime),
                ArMember::new(format!("data.tar{}", extension), data_tar).set_mtime(mtime),
            ])
        })?;

        Ok(BuiltPackage {
            filename: self.spec.deb_filename(),
            package: self.spec.name().to_string(),
            version: self.spec.version().to_string(),
            architecture: self.spec.architecture().to_string(),
            installed_size: control.installed_size,
            data,
        })
    }

    /// Build the package and write it into a directory.
    ///
    /// The file is written to a temporary file in `dir` and renamed to its
    /// final name on success, so no partial `.deb` is ever visible.
    pub fn write_to_directory(
        &self,
        dir: impl AsRef<Path>,
        renderer: &dyn TemplateRenderer,
    ) -> Result<BuildSummary> {
        let dir = dir.as_ref();
        let built = self.build(renderer)?;

        let path = run_stage(BuildStage::WriteOutput, || {
            std::fs::create_dir_all(dir)
                .map_err(|e| DebpkgError::IoPath(dir.display().to_string(), e))?;

            let dest = dir.join(&built.filename);

            let mut temp = tempfile::NamedTempFile::new_in(dir)
                .map_err(|e| DebpkgError::IoPath(dir.display().to_string(), e))?;
            temp.write_all(&built.data)?;
            temp.as_file().sync_all()?;
            set_output_permissions(temp.as_file())?;

            temp.persist(&dest)
                .map_err(|e| DebpkgError::IoPath(dest.display().to_string(), e.error))?;

            Ok(dest)
        })?;

        let summary = BuildSummary {
            package: built.package,
            version: built.version,
            architecture: built.architecture,
            size: built.data.len() as u64,
            installed_size: built.installed_size,
            path,
        };

        info!(
            "{}: wrote {} ({} bytes)",
            BuildStage::Done,
            summary.path.display(),
            summary.size
        );

        Ok(summary)
    }
}

#[cfg(unix)]
fn set_output_permissions(file: &std::fs::File) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    file.set_permissions(std::fs::Permissions::from_mode(OUTPUT_FILE_MODE))?;

    Ok(())
}

#[cfg(not(unix))]
fn set_output_permissions(_file: &std::fs::File) -> Result<()> {
    Ok(())
}
