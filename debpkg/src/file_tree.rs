// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The filesystem tree installed by a package.

A [DataTree] maps absolute install paths to [FileEntry] instances. Parent
directories are implied by file paths and only need explicit registration
when they require a non-default mode or owner.
*/

use {
    crate::{
        error::{DebpkgError, Result},
        package::PackageSpec,
        tar::TarEntry,
    },
    std::{
        collections::{BTreeMap, BTreeSet},
        fmt::{Display, Formatter},
        path::PathBuf,
    },
};

/// Default mode for regular files.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Default mode for directories.
pub const DEFAULT_DIRECTORY_MODE: u32 = 0o755;

/// An absolute, normalized path in the installed filesystem.
///
/// Ordering is component-wise, so a directory sorts before everything
/// beneath it and siblings sort bytewise.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct InstallPath {
    components: Vec<String>,
}

impl InstallPath {
    /// Parse an absolute path.
    ///
    /// Repeated slashes and `.` components are normalized away. `..`
    /// components are rejected.
    pub fn new(path: &str) -> Result<Self> {
        if !path.starts_with('/') {
            return Err(DebpkgError::InvalidInstallPath(
                path.to_string(),
                "path must be absolute",
            ));
        }
        if path.contains('\0') {
            return Err(DebpkgError::InvalidInstallPath(
                path.to_string(),
                "path contains NUL",
            ));
        }

        let mut components = vec![];
        for component in path.split('/') {
            match component {
                "" | "." => {}
                ".." => {
                    return Err(DebpkgError::InvalidInstallPath(
                        path.to_string(),
                        "path cannot contain '..'",
                    ));
                }
                c => components.push(c.to_string()),
            }
        }

        Ok(Self { components })
    }

    /// The filesystem root.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Append a relative path, which may contain multiple components.
    pub fn join(&self, relative: &str) -> Result<Self> {
        let joined = Self::new(&format!("{}/{}", self, relative))?;

        if !joined.starts_with(self) {
            return Err(DebpkgError::InvalidInstallPath(
                relative.to_string(),
                "joined path escapes its base",
            ));
        }

        Ok(joined)
    }

    /// All ancestors of this path, nearest first, excluding the root.
    pub fn ancestors(&self) -> impl Iterator<Item = InstallPath> + '_ {
        (1..self.components.len()).rev().map(move |len| Self {
            components: self.components[..len].to_vec(),
        })
    }

    /// Whether `other` is this path or one of its ancestors.
    pub fn starts_with(&self, other: &InstallPath) -> bool {
        self.components.starts_with(&other.components)
    }

    /// The path relative to the root, without a leading slash.
    ///
    /// This is the form used in `md5sums` files.
    pub fn relative(&self) -> String {
        self.components.join("/")
    }

    /// The path as recorded in `.deb` tar archives: `./` prefixed, with a
    /// trailing `/` for directories.
    pub fn archive_path(&self, is_directory: bool) -> String {
        match (self.is_root(), is_directory) {
            (true, _) => "./".to_string(),
            (false, true) => format!("./{}/", self.relative()),
            (false, false) => format!("./{}", self.relative()),
        }
    }
}

impl Display for InstallPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}", self.relative())
    }
}

/// Represents an abstract location for file content.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FileData {
    /// Content held in memory.
    Memory(Vec<u8>),
    /// Content read from a file on the build host.
    Path(PathBuf),
    /// Content produced by rendering the named template.
    Template(String),
}

impl From<Vec<u8>> for FileData {
    fn from(data: Vec<u8>) -> Self {
        Self::Memory(data)
    }
}

impl From<&[u8]> for FileData {
    fn from(data: &[u8]) -> Self {
        Self::Memory(data.to_vec())
    }
}

impl From<PathBuf> for FileData {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

/// What a [FileEntry] installs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FileKind {
    Regular(FileData),
    Symlink(String),
}

/// A file destined for the data tree.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileEntry {
    path: InstallPath,
    kind: FileKind,
    mode: u32,
    uid: u32,
    gid: u32,
    conffile: bool,
}

impl FileEntry {
    /// A regular file owned by root with mode `0644`.
    pub fn new(path: &str, data: impl Into<FileData>) -> Result<Self> {
        Self::new_at(InstallPath::new(path)?, FileKind::Regular(data.into()))
    }

    /// A symbolic link pointing at `target`.
    pub fn symlink(path: &str, target: impl ToString) -> Result<Self> {
        let target = target.to_string();
        if target.is_empty() {
            return Err(DebpkgError::InvalidInstallPath(
                path.to_string(),
                "symlink target is empty",
            ));
        }

        Self::new_at(InstallPath::new(path)?, FileKind::Symlink(target))
    }

    fn new_at(path: InstallPath, kind: FileKind) -> Result<Self> {
        if path.is_root() {
            return Err(DebpkgError::InvalidInstallPath(
                path.to_string(),
                "root directory cannot be a file",
            ));
        }

        let mode = match kind {
            FileKind::Regular(_) => DEFAULT_FILE_MODE,
            FileKind::Symlink(_) => 0o777,
        };

        Ok(Self {
            path,
            kind,
            mode,
            uid: 0,
            gid: 0,
            conffile: false,
        })
    }

    pub fn set_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn set_owner(mut self, uid: u32, gid: u32) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }

    /// Mark this file as a conffile.
    ///
    /// Conffiles must also be declared on the package.
    pub fn set_conffile(mut self, conffile: bool) -> Self {
        self.conffile = conffile;
        self
    }

    pub fn path(&self) -> &InstallPath {
        &self.path
    }

    pub fn kind(&self) -> &FileKind {
        &self.kind
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn gid(&self) -> u32 {
        self.gid
    }

    pub fn is_conffile(&self) -> bool {
        self.conffile
    }

    pub fn is_regular(&self) -> bool {
        matches!(self.kind, FileKind::Regular(_))
    }

    /// The in-memory content of a regular file.
    ///
    /// Fails if the content has not been materialized yet. Symlinks have no
    /// content and yield `None`.
    pub fn content(&self) -> Result<Option<&[u8]>> {
        match &self.kind {
            FileKind::Regular(FileData::Memory(data)) => Ok(Some(data)),
            FileKind::Regular(_) => Err(DebpkgError::UnresolvedContent(self.path.to_string())),
            FileKind::Symlink(_) => Ok(None),
        }
    }

    /// Replace the content of a regular file with materialized bytes.
    pub fn set_content(&mut self, data: Vec<u8>) {
        if let FileKind::Regular(_) = self.kind {
            self.kind = FileKind::Regular(FileData::Memory(data));
        }
    }

    fn to_tar_entry(&self) -> Result<TarEntry> {
        let entry = match &self.kind {
            FileKind::Regular(_) => {
                let data = self.content()?.unwrap_or_default().to_vec();
                TarEntry::file(self.path.archive_path(false), self.mode, data)
            }
            FileKind::Symlink(target) => {
                TarEntry::symlink(self.path.archive_path(false), target).set_mode(self.mode)
            }
        };

        Ok(entry.set_owner(self.uid, self.gid))
    }
}

/// Mode and ownership of an explicitly registered directory.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DirectoryAttributes {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
}

impl Default for DirectoryAttributes {
    fn default() -> Self {
        Self {
            mode: DEFAULT_DIRECTORY_MODE,
            uid: 0,
            gid: 0,
        }
    }
}

/// The set of files and directories a package installs.
#[derive(Clone, Debug, Default)]
pub struct DataTree {
    files: BTreeMap<InstallPath, FileEntry>,
    directories: BTreeMap<InstallPath, DirectoryAttributes>,
}

impl DataTree {
    /// Add a file to the tree.
    ///
    /// Fails if the path is already taken or if the file would need to be
    /// both a file and a directory.
    pub fn add_file(&mut self, entry: FileEntry) -> Result<()> {
        let path = entry.path().clone();

        if self.files.contains_key(&path) {
            return Err(DebpkgError::DuplicatePath(path.to_string()));
        }

        if self.directories.contains_key(&path)
            || self.has_descendant(&path)
            || path.ancestors().any(|a| self.files.contains_key(&a))
        {
            return Err(DebpkgError::PathConflict(path.to_string()));
        }

        self.files.insert(path, entry);

        Ok(())
    }

    /// Register a directory with explicit attributes.
    ///
    /// Registering a directory that is already registered replaces its attributes.
    pub fn set_directory(&mut self, path: InstallPath, attributes: DirectoryAttributes) -> Result<()> {
        if path.is_root() {
            return Err(DebpkgError::InvalidInstallPath(
                path.to_string(),
                "root directory attributes are fixed",
            ));
        }

        if self.files.contains_key(&path) || path.ancestors().any(|a| self.files.contains_key(&a))
        {
            return Err(DebpkgError::PathConflict(path.to_string()));
        }

        self.directories.insert(path, attributes);

        Ok(())
    }

    /// Whether any file or registered directory lives below `path`.
    fn has_descendant(&self, path: &InstallPath) -> bool {
        // Descendants sort immediately after their ancestor.
        let below = |p: Option<&InstallPath>| {
            p.map(|p| p != path && p.starts_with(path))
                .unwrap_or(false)
        };

        below(self.files.range(path.clone()..).next().map(|(p, _)| p))
            || below(self.directories.range(path.clone()..).next().map(|(p, _)| p))
    }

    pub fn get(&self, path: &InstallPath) -> Option<&FileEntry> {
        self.files.get(path)
    }

    /// Iterate over files in path order.
    pub fn iter_files(&self) -> impl Iterator<Item = &FileEntry> {
        self.files.values()
    }

    /// Mutable iteration over files in path order.
    pub fn iter_files_mut(&mut self) -> impl Iterator<Item = &mut FileEntry> {
        self.files.values_mut()
    }

    /// Every directory in the tree, explicit or implied, excluding the root.
    pub fn directories(&self) -> BTreeSet<InstallPath> {
        self.files
            .keys()
            .flat_map(|p| p.ancestors())
            .chain(
                self.directories
                    .keys()
                    .flat_map(|p| std::iter::once(p.clone()).chain(p.ancestors())),
            )
            .collect()
    }

    /// Build the tar entries for this tree.
    ///
    /// The root directory comes first. Every directory precedes its contents
    /// and siblings are ordered bytewise by name, so output is stable for a
    /// given tree.
    pub fn archive_entries(&self) -> Result<Vec<TarEntry>> {
        let directories = self.directories();

        let mut entries = Vec::with_capacity(1 + directories.len() + self.files.len());
        entries.push(TarEntry::directory(InstallPath::root().archive_path(true)));

        let mut dirs = directories.into_iter().peekable();
        let mut files = self.files.iter().peekable();

        loop {
            let take_dir = match (dirs.peek(), files.peek()) {
                (Some(d), Some((f, _))) => d < *f,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => break,
            };

            if take_dir {
                if let Some(dir) = dirs.next() {
                    let attrs = self.directories.get(&dir).copied().unwrap_or_default();
                    entries.push(
                        TarEntry::directory(dir.archive_path(true))
                            .set_mode(attrs.mode)
                            .set_owner(attrs.uid, attrs.gid),
                    );
                }
            } else if let Some((_, file)) = files.next() {
                entries.push(file.to_tar_entry()?);
            }
        }

        Ok(entries)
    }
}

/// Produces data tree entries during a build.
///
/// Providers run after explicitly installed files have been materialized.
/// Returned entries must carry in-memory content.
pub trait DataTreeProvider {
    /// Name used in log messages and errors.
    fn name(&self) -> &str;

    /// Produce entries for the given package.
    fn provide(&self, spec: &PackageSpec) -> Result<Vec<FileEntry>>;
}
