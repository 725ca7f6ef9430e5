//! Semantic versioning for backup artifacts
//!
//! Backup versions follow `MAJOR.MINOR.PATCH-BRANCH.BUILD[+METADATA]`, e.g.
//! `1.2.3-main.20241201_143052`. The branch names a backup lineage (it is
//! orthogonal to Git) and the build token is a sortable timestamp that
//! distinguishes otherwise-identical versions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};

/// Timestamp token format used for build identifiers
const BUILD_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Backup lineage a version belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionBranch {
    Main,
    Develop,
    Staging,
    Hotfix,
    Feature,
    Release,
    Manual,
}

impl VersionBranch {
    /// All branches, in declaration order
    pub const ALL: [VersionBranch; 7] = [
        VersionBranch::Main,
        VersionBranch::Develop,
        VersionBranch::Staging,
        VersionBranch::Hotfix,
        VersionBranch::Feature,
        VersionBranch::Release,
        VersionBranch::Manual,
    ];

    /// Lowercase wire name of the branch
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Develop => "develop",
            Self::Staging => "staging",
            Self::Hotfix => "hotfix",
            Self::Feature => "feature",
            Self::Release => "release",
            Self::Manual => "manual",
        }
    }

    /// Short display indicator used in listings
    pub fn indicator(&self) -> &'static str {
        match self {
            Self::Main => "[M]",
            Self::Develop => "[D]",
            Self::Staging => "[S]",
            Self::Hotfix => "[H]",
            Self::Feature => "[F]",
            Self::Release => "[R]",
            Self::Manual => "[N]",
        }
    }
}

impl fmt::Display for VersionBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VersionBranch {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" => Ok(Self::Main),
            "develop" => Ok(Self::Develop),
            "staging" => Ok(Self::Staging),
            "hotfix" => Ok(Self::Hotfix),
            "feature" => Ok(Self::Feature),
            "release" => Ok(Self::Release),
            "manual" => Ok(Self::Manual),
            _ => Err(VaultError::Config(format!("Unknown branch: {}", s))),
        }
    }
}

/// Level at which to increment a version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementLevel {
    Major,
    Minor,
    Patch,
}

impl FromStr for IncrementLevel {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "major" => Ok(Self::Major),
            "minor" => Ok(Self::Minor),
            "patch" => Ok(Self::Patch),
            _ => Err(VaultError::Config(format!("Unknown increment level: {}", s))),
        }
    }
}

/// Immutable semantic version for a backup artifact
///
/// The canonical string form is
/// `{major}.{minor}.{patch}-{pre_release_or_branch}[.{build}][+{metadata}]`.
/// When `pre_release` is set it replaces the branch token in the pre-release
/// segment; the branch field is still tracked independently of display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "VersionRepr", into = "VersionRepr")]
pub struct SemanticVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub branch: VersionBranch,
    pub build: String,
    pub pre_release: Option<String>,
    pub metadata: Option<String>,
}

/// On-disk representation, compatible with the original catalog format
/// (carries a redundant `version_string` that is recomputed on save and
/// ignored on load)
#[derive(Serialize, Deserialize)]
struct VersionRepr {
    major: u64,
    minor: u64,
    patch: u64,
    branch: VersionBranch,
    #[serde(default)]
    build: String,
    #[serde(default)]
    pre_release: Option<String>,
    #[serde(default)]
    metadata: Option<String>,
    #[serde(default)]
    version_string: String,
}

impl From<VersionRepr> for SemanticVersion {
    fn from(repr: VersionRepr) -> Self {
        Self {
            major: repr.major,
            minor: repr.minor,
            patch: repr.patch,
            branch: repr.branch,
            build: repr.build,
            pre_release: repr.pre_release,
            metadata: repr.metadata,
        }
    }
}

impl From<SemanticVersion> for VersionRepr {
    fn from(version: SemanticVersion) -> Self {
        let version_string = version.to_string();
        Self {
            major: version.major,
            minor: version.minor,
            patch: version.patch,
            branch: version.branch,
            build: version.build,
            pre_release: version.pre_release,
            metadata: version.metadata,
            version_string,
        }
    }
}

impl Default for SemanticVersion {
    /// `1.0.0` on `main` with a freshly generated build token
    fn default() -> Self {
        Self::new_at(Utc::now())
    }
}

impl SemanticVersion {
    /// Create the initial `1.0.0-main` version with a build token derived
    /// from `now`
    pub fn new_at(now: DateTime<Utc>) -> Self {
        Self {
            major: 1,
            minor: 0,
            patch: 0,
            branch: VersionBranch::Main,
            build: now.format(BUILD_FORMAT).to_string(),
            pre_release: None,
            metadata: None,
        }
    }

    /// Parse a version string
    ///
    /// Accepts `MAJOR.MINOR.PATCH[-PRERELEASE[.BUILD...]][+METADATA]`. The
    /// first dot-segment after `-` is tried as a branch name; if it matches,
    /// the remaining segments become the build token. If it does not match,
    /// it is stored as `pre_release` and the branch falls back to `main` (so
    /// `1.0.0-rc.1` parses as `branch=main, pre_release="rc", build="1"`).
    pub fn parse(version_string: &str) -> VaultResult<Self> {
        let invalid = || VaultError::InvalidVersionFormat(version_string.to_string());

        // Split off +metadata first
        let (rest, metadata) = match version_string.split_once('+') {
            Some((rest, meta)) => {
                if meta.is_empty() || !is_valid_segment(meta) {
                    return Err(invalid());
                }
                (rest, Some(meta.to_string()))
            }
            None => (version_string, None),
        };

        // Split off -prerelease (the pre-release part may itself contain '-')
        let (core, pre_release_part) = match rest.split_once('-') {
            Some((core, pre)) => {
                if pre.is_empty() || !is_valid_segment(pre) {
                    return Err(invalid());
                }
                (core, Some(pre))
            }
            None => (rest, None),
        };

        let mut numbers = core.split('.');
        let major = parse_number(numbers.next(), version_string)?;
        let minor = parse_number(numbers.next(), version_string)?;
        let patch = parse_number(numbers.next(), version_string)?;
        if numbers.next().is_some() {
            return Err(invalid());
        }

        let mut branch = VersionBranch::Main;
        let mut build = String::new();
        let mut pre_release = None;

        if let Some(pre_part) = pre_release_part {
            let mut parts = pre_part.split('.');
            // First segment: branch or pre-release
            let first = parts.next().unwrap_or_default();
            match first.parse::<VersionBranch>() {
                Ok(parsed) => branch = parsed,
                Err(_) => pre_release = Some(first.to_string()),
            }
            // Remaining segments: build token
            let remaining: Vec<&str> = parts.collect();
            if !remaining.is_empty() {
                build = remaining.join(".");
            }
        }

        Ok(Self {
            major,
            minor,
            patch,
            branch,
            build,
            pre_release,
            metadata,
        })
    }

    /// Increment the version at `level`, regenerating the build token
    ///
    /// `major` resets minor and patch to 0; `minor` resets patch to 0.
    /// The branch is preserved.
    pub fn increment(&self, level: IncrementLevel) -> Self {
        self.increment_at(level, Utc::now())
    }

    /// Increment with an explicit clock (used by tests)
    pub fn increment_at(&self, level: IncrementLevel, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();

        match level {
            IncrementLevel::Major => {
                next.major += 1;
                next.minor = 0;
                next.patch = 0;
            }
            IncrementLevel::Minor => {
                next.minor += 1;
                next.patch = 0;
            }
            IncrementLevel::Patch => {
                next.patch += 1;
            }
        }

        next.build = now.format(BUILD_FORMAT).to_string();
        next
    }

    /// Versions are compatible when their majors match
    pub fn is_compatible(&self, other: &SemanticVersion) -> bool {
        self.major == other.major
    }

    /// Strictly-newer comparison on (major, minor, patch), then the build
    /// token lexically (the token is a sortable timestamp)
    ///
    /// Branch is not part of the ordering.
    pub fn is_newer_than(&self, other: &SemanticVersion) -> bool {
        if self.major != other.major {
            return self.major > other.major;
        }
        if self.minor != other.minor {
            return self.minor > other.minor;
        }
        if self.patch != other.patch {
            return self.patch > other.patch;
        }

        if !self.build.is_empty() && !other.build.is_empty() {
            return self.build > other.build;
        }

        false
    }

    /// Copy this version onto a different branch
    ///
    /// The build token is carried over unchanged; callers wanting a fresh
    /// build call `increment` afterwards.
    pub fn create_branch_version(&self, new_branch: VersionBranch) -> Self {
        let mut version = self.clone();
        version.branch = new_branch;
        version
    }

    /// Derive a release-candidate version (`branch=release`,
    /// `pre_release="rc.{n}"`)
    pub fn create_release_candidate(&self, rc_number: u32) -> Self {
        let mut version = self.clone();
        version.branch = VersionBranch::Release;
        version.pre_release = Some(format!("rc.{}", rc_number));
        version
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;

        let mut pre_parts: Vec<&str> = Vec::with_capacity(2);
        match &self.pre_release {
            Some(pre) => pre_parts.push(pre),
            None => pre_parts.push(self.branch.as_str()),
        }
        if !self.build.is_empty() {
            pre_parts.push(&self.build);
        }
        write!(f, "-{}", pre_parts.join("."))?;

        if let Some(metadata) = &self.metadata {
            write!(f, "+{}", metadata)?;
        }

        Ok(())
    }
}

impl FromStr for SemanticVersion {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_number(segment: Option<&str>, original: &str) -> VaultResult<u64> {
    let segment =
        segment.ok_or_else(|| VaultError::InvalidVersionFormat(original.to_string()))?;
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VaultError::InvalidVersionFormat(original.to_string()));
    }
    segment
        .parse::<u64>()
        .map_err(|_| VaultError::InvalidVersionFormat(original.to_string()))
}

/// Pre-release and metadata segments allow `[A-Za-z0-9.\-_]`
fn is_valid_segment(segment: &str) -> bool {
    segment
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-' || b == b'_')
}
