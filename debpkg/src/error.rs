// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use {
    crate::{builder::BuildStage, package_version::VersionError},
    thiserror::Error,
};

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum DebpkgError {
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("I/O error on path {0}: {1:?}")]
    IoPath(String, std::io::Error),

    #[error("archive format error: {0}")]
    Format(String),

    #[error("path exceeds the 100 byte tar name limit ({1} bytes): {0}")]
    PathTooLong(String, usize),

    #[error("required template variable missing: {0}")]
    TemplateVariable(String),

    #[error("checksum mismatch for {path}: declared {declared}, actual {actual}")]
    ChecksumMismatch {
        path: String,
        declared: String,
        actual: String,
    },

    #[error("invalid package name: {0}")]
    InvalidPackageName(String),

    #[error("invalid architecture: {0}")]
    InvalidArchitecture(String),

    #[error("version error: {0}")]
    Version(#[from] VersionError),

    #[error("invalid install path {0}: {1}")]
    InvalidInstallPath(String, &'static str),

    #[error("path already present in data tree: {0}")]
    DuplicatePath(String),

    #[error("path is both a file and a directory in data tree: {0}")]
    PathConflict(String),

    #[error("content of {0} has not been materialized")]
    UnresolvedContent(String),

    #[error("file flagged as conffile but not declared in conffiles: {0}")]
    ConffileNotDeclared(String),

    #[error("declared conffile is not a regular file in data tree: {0}")]
    ConffileNotInstalled(String),

    #[error("control file parse error: {0}")]
    ControlParse(String),

    #[error("required field missing in control file: {0}")]
    ControlRequiredFieldMissing(&'static str),

    #[error("control field {field} is {actual:?}; expected {expected:?}")]
    ControlFieldMismatch {
        field: &'static str,
        expected: String,
        actual: String,
    },

    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("error registering template {0}: {1}")]
    TemplateRegistration(String, String),

    #[error("error rendering template {0}: {1}")]
    TemplateRender(String, String),

    #[error("data tree provider {0} failed: {1}")]
    Provider(String, String),

    #[error("build failed during {stage}: {source}")]
    Build {
        stage: BuildStage,
        source: Box<DebpkgError>,
    },
}

impl DebpkgError {
    /// The build stage an error originated in, if it was raised by a build.
    pub fn stage(&self) -> Option<BuildStage> {
        match self {
            Self::Build { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The error with any build stage wrapper removed.
    pub fn root_cause(&self) -> &DebpkgError {
        match self {
            Self::Build { source, .. } => source.root_cause(),
            e => e,
        }
    }
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, DebpkgError>;
