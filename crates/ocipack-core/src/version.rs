//! Semantic version tags for published packages.
//!
//! Accepted inputs:
//! - `refs/tags/v1.2.3` → git tag ref
//! - `v1.2.3` → tag with `v` prefix
//! - `1.2.3` → bare version
//! - `1.2.3-rc.1` → pre-release
//!
//! The registry tag is always the bare version (`1.2.3`). Build metadata
//! (`+build`) is rejected because `+` is not a valid tag character.

use crate::error::{Error, Result};

const TAG_REF_PREFIX: &str = "refs/tags/";

/// A validated semantic version used as the package tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageVersion {
    major: u64,
    minor: u64,
    patch: u64,
    pre_release: Option<String>,
}

impl PackageVersion {
    /// Parses a version from a git ref such as `refs/tags/v1.2.3`.
    ///
    /// Refs that are not tag refs are rejected.
    ///
    /// # Examples
    ///
    /// ```
    /// use ocipack_core::PackageVersion;
    ///
    /// let version = PackageVersion::from_ref("refs/tags/v1.2.3").unwrap();
    /// assert_eq!(version.tag(), "1.2.3");
    ///
    /// assert!(PackageVersion::from_ref("refs/heads/main").is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidVersion`] if the ref is not a tag ref or the
    /// tag is not a semantic version.
    pub fn from_ref(git_ref: &str) -> Result<Self> {
        let git_ref = git_ref.trim();
        if git_ref.starts_with("refs/") && !git_ref.starts_with(TAG_REF_PREFIX) {
            return Err(Error::InvalidVersion {
                input: git_ref.to_string(),
                reason: "only tag refs can be published".to_string(),
            });
        }

        let tag = git_ref.strip_prefix(TAG_REF_PREFIX).unwrap_or(git_ref);
        Self::parse(tag).map_err(|_| Error::InvalidVersion {
            input: git_ref.to_string(),
            reason: "tag is not a semantic version (expected vMAJOR.MINOR.PATCH)".to_string(),
        })
    }

    /// Parses a version string, with or without a `v` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidVersion`] if the string is not a semantic
    /// version.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let invalid = |reason: &str| Error::InvalidVersion {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let version_str = input.strip_prefix('v').unwrap_or(input);

        if version_str.contains('+') {
            return Err(invalid("build metadata is not allowed in a tag"));
        }

        let (core, pre_release) = match version_str.split_once('-') {
            Some((core, pre)) => (core, Some(pre)),
            None => (version_str, None),
        };

        let parts: Vec<&str> = core.split('.').collect();
        let [major, minor, patch] = parts.as_slice() else {
            return Err(invalid("expected MAJOR.MINOR.PATCH"));
        };

        let number = |part: &str| -> Result<u64> {
            if part.is_empty() || (part.len() > 1 && part.starts_with('0')) {
                return Err(invalid("numeric component is empty or has a leading zero"));
            }
            part.parse::<u64>()
                .map_err(|_| invalid("numeric component is not a number"))
        };

        let pre_release = match pre_release {
            Some(pre) => {
                let valid = !pre.is_empty()
                    && pre.split('.').all(|id| {
                        !id.is_empty()
                            && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
                    });
                if !valid {
                    return Err(invalid("malformed pre-release identifier"));
                }
                Some(pre.to_string())
            }
            None => None,
        };

        Ok(Self {
            major: number(*major)?,
            minor: number(*minor)?,
            patch: number(*patch)?,
            pre_release,
        })
    }

    /// Returns the registry tag for this version (no `v` prefix).
    #[must_use]
    pub fn tag(&self) -> String {
        self.to_string()
    }

    /// Returns true if this is a pre-release version.
    #[must_use]
    pub const fn is_pre_release(&self) -> bool {
        self.pre_release.is_some()
    }

    /// Returns the `(major, minor, patch)` triple.
    #[must_use]
    pub const fn triple(&self) -> (u64, u64, u64) {
        (self.major, self.minor, self.patch)
    }
}

impl std::fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre_release {
            write!(f, "-{pre}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for PackageVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
