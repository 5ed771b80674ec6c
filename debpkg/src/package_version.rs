// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian package version string handling. */

use {
    std::{
        fmt::{Display, Formatter},
        num::ParseIntError,
        str::FromStr,
    },
    thiserror::Error,
};

#[derive(Clone, Debug, Error)]
pub enum VersionError {
    #[error("error parsing string to integer: {0}")]
    ParseInt(#[from] ParseIntError),

    #[error("version string is empty")]
    Empty,

    #[error("version string contains whitespace: {0:?}")]
    Whitespace(String),

    #[error("the epoch component has non-digit characters: {0}")]
    EpochNonNumeric(String),

    #[error("upstream_version component is empty: {0}")]
    UpstreamVersionEmpty(String),

    #[error("upstream_version component does not start with a digit: {0}")]
    UpstreamVersionNoLeadingDigit(String),

    #[error("upstream_version component has illegal character: {0}")]
    UpstreamVersionIllegalChar(String),

    #[error("debian_revision component has illegal character: {0}")]
    DebianRevisionIllegalChar(String),
}

pub type Result<T> = std::result::Result<T, VersionError>;

/// A Debian package version.
///
/// The format is `[epoch:]upstream_version[-debian_revision]`. Semantics are
/// defined at <https://www.debian.org/doc/debian-policy/ch-controlfields.html#version>.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackageVersion {
    epoch: Option<u32>,
    upstream_version: String,
    debian_revision: Option<String>,
}

impl PackageVersion {
    /// Construct an instance by parsing a version string.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(VersionError::Empty);
        }
        if s.chars().any(|c| c.is_whitespace()) {
            return Err(VersionError::Whitespace(s.to_string()));
        }

        // Epoch is the part before the first colon. upstream_version and
        // debian_revision are split on the last hyphen.
        let (epoch, remainder) = match s.split_once(':') {
            Some((epoch, remainder)) => (Some(epoch), remainder),
            None => (None, s),
        };

        let (upstream, debian) = match remainder.rsplit_once('-') {
            Some((upstream, debian)) => (upstream, Some(debian)),
            None => (remainder, None),
        };

        let epoch = match epoch {
            Some(epoch) if epoch.is_empty() || !epoch.chars().all(|c| c.is_ascii_digit()) => {
                return Err(VersionError::EpochNonNumeric(s.to_string()));
            }
            Some(epoch) => Some(u32::from_str(epoch)?),
            None => None,
        };

        if upstream.is_empty() {
            return Err(VersionError::UpstreamVersionEmpty(s.to_string()));
        }
        if !upstream.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(VersionError::UpstreamVersionNoLeadingDigit(s.to_string()));
        }

        // Hyphens in upstream_version are only legal when a debian_revision is
        // present. Colons would have been consumed by the epoch split.
        if !upstream.chars().all(|c| match c {
            c if c.is_ascii_alphanumeric() => true,
            '.' | '+' | '~' => true,
            '-' => debian.is_some(),
            _ => false,
        }) {
            return Err(VersionError::UpstreamVersionIllegalChar(s.to_string()));
        }

        let debian_revision = match debian {
            Some(debian)
                if debian.is_empty()
                    || !debian
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '~')) =>
            {
                return Err(VersionError::DebianRevisionIllegalChar(s.to_string()));
            }
            Some(debian) => Some(debian.to_string()),
            None => None,
        };

        Ok(Self {
            epoch,
            upstream_version: upstream.to_string(),
            debian_revision,
        })
    }

    /// The `epoch` component of the version string.
    pub fn epoch(&self) -> Option<u32> {
        self.epoch
    }

    /// `upstream` component of the version string.
    pub fn upstream_version(&self) -> &str {
        &self.upstream_version
    }

    /// `debian_revision` component of the version string.
    pub fn debian_revision(&self) -> Option<&str> {
        self.debian_revision.as_deref()
    }

    /// The version as it appears in `.deb` filenames.
    ///
    /// `dpkg` omits the epoch from filenames.
    pub fn filename_version(&self) -> String {
        match &self.debian_revision {
            Some(revision) => format!("{}-{}", self.upstream_version, revision),
            None => self.upstream_version.clone(),
        }
    }
}

impl FromStr for PackageVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Display for PackageVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(epoch) = self.epoch {
            write!(f, "{}:", epoch)?;
        }

        f.write_str(&self.filename_version())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse() -> Result<()> {
        assert_eq!(
            PackageVersion::parse("1:4.7.0+dfsg1-2")?,
            PackageVersion {
                epoch: Some(1),
                upstream_version: "4.7.0+dfsg1".into(),
                debian_revision: Some("2".into()),
            }
        );
        assert_eq!(
            PackageVersion::parse("1.0.0")?,
            PackageVersion {
                epoch: None,
                upstream_version: "1.0.0".into(),
                debian_revision: None,
            }
        );
        assert_eq!(
            PackageVersion::parse("2.0-rc1-3ubuntu1")?,
            PackageVersion {
                epoch: None,
                upstream_version: "2.0-rc1".into(),
                debian_revision: Some("3ubuntu1".into()),
            }
        );

        Ok(())
    }

    #[test]
    fn format() -> Result<()> {
        for s in ["1:4.7.0+dfsg1-2", "3.3.2.final~github", "0.18.0+dfsg-2+b1"] {
            let v = PackageVersion::parse(s)?;
            assert_eq!(format!("{}", v), s);
        }

        assert_eq!(
            PackageVersion::parse("2:1.0-1")?.filename_version(),
            "1.0-1"
        );

        Ok(())
    }

    #[test]
    fn invalid() {
        assert!(matches!(PackageVersion::parse(""), Err(VersionError::Empty)));
        assert!(matches!(
            PackageVersion::parse("1.0 beta"),
            Err(VersionError::Whitespace(_))
        ));
        assert!(matches!(
            PackageVersion::parse("a:1.0"),
            Err(VersionError::EpochNonNumeric(_))
        ));
        assert!(matches!(
            PackageVersion::parse(":1.0"),
            Err(VersionError::EpochNonNumeric(_))
        ));
        assert!(matches!(
            PackageVersion::parse("beta1"),
            Err(VersionError::UpstreamVersionNoLeadingDigit(_))
        ));
        assert!(matches!(
            PackageVersion::parse("1.0_1"),
            Err(VersionError::UpstreamVersionIllegalChar(_))
        ));
        assert!(matches!(
            PackageVersion::parse("1.0-"),
            Err(VersionError::DebianRevisionIllegalChar(_))
        ));
        assert!(matches!(
            PackageVersion::parse("1.0-a_b"),
            Err(VersionError::DebianRevisionIllegalChar(_))
        ));
    }
}
