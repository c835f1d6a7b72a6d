use std::{fmt, str::FromStr, sync::LazyLock};

use getset::Getters;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::DockerError;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The version implied when a reference carries none.
pub const DEFAULT_IMAGE_VERSION: &str = "latest";

static IMAGE_REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:([\w][\w.-]*)/)?([\w][\w.-]*)(?::([\w][\w.-]*))?$").unwrap()
});

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An image name of the form `[repository/]name[:version]`.
///
/// Equality is structural: `rc2server/compute` and `rc2server/compute:latest` are different
/// references even though the engine resolves them to the same image. Use
/// [`ImageReference::same_image`] for the looser comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ImageReference {
    /// The repository (organization) the image lives under.
    repository: Option<String>,

    /// The image name.
    name: String,

    /// The version tag.
    version: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ImageReference {
    /// Creates a new reference.
    pub fn new(
        repository: Option<impl Into<String>>,
        name: impl Into<String>,
        version: Option<impl Into<String>>,
    ) -> Self {
        Self {
            repository: repository.map(Into::into),
            name: name.into(),
            version: version.map(Into::into),
        }
    }

    /// Returns the version, or `latest` when none was given.
    pub fn version_or_latest(&self) -> &str {
        self.version.as_deref().unwrap_or(DEFAULT_IMAGE_VERSION)
    }

    /// Returns `repository/name` without the version.
    pub fn repository_and_name(&self) -> String {
        match &self.repository {
            Some(repository) => format!("{repository}/{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Returns true if both references name the same image once a missing version is read as
    /// `latest`.
    pub fn same_image(&self, other: &ImageReference) -> bool {
        self.repository == other.repository
            && self.name == other.name
            && self.version_or_latest() == other.version_or_latest()
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl FromStr for ImageReference {
    type Err = DockerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let captures = IMAGE_REFERENCE_RE
            .captures(s.trim())
            .ok_or_else(|| DockerError::InvalidArgument(format!("invalid image name: {s}")))?;

        Ok(Self {
            repository: captures.get(1).map(|m| m.as_str().to_string()),
            name: captures[2].to_string(),
            version: captures.get(3).map(|m| m.as_str().to_string()),
        })
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(repository) = &self.repository {
            write!(f, "{repository}/")?;
        }
        write!(f, "{}", self.name)?;
        if let Some(version) = &self.version {
            write!(f, ":{version}")?;
        }
        Ok(())
    }
}

impl Serialize for ImageReference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ImageReference {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
