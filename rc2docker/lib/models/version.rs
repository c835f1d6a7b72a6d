use std::{fmt, str::FromStr, sync::LazyLock};

use getset::CopyGetters;
use regex::Regex;
use serde::Deserialize;

use crate::{DockerError, DockerResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

static ENGINE_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\.(\d+)\.(\d+)").unwrap());

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The version of the engine's REST API, e.g. `1.24`.
///
/// Compared component-wise, so `1.9 < 1.24`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, CopyGetters)]
#[getset(get_copy = "pub with_prefix")]
pub struct ApiVersion {
    /// The major component.
    major: u32,

    /// The minor component.
    minor: u32,
}

/// Version information reported by the engine's `/version` endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub with_prefix")]
pub struct EngineVersion {
    /// Major release of the engine.
    major: u32,

    /// Minor release of the engine.
    minor: u32,

    /// Patch release of the engine.
    fix: u32,

    /// The REST API version spoken by the engine.
    api_version: ApiVersion,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VersionResponse {
    version: String,
    api_version: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ApiVersion {
    /// Creates a new API version.
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl EngineVersion {
    /// Creates a new engine version.
    pub fn new(major: u32, minor: u32, fix: u32, api_version: ApiVersion) -> Self {
        Self {
            major,
            minor,
            fix,
            api_version,
        }
    }

    /// Parses the body of a `/version` response.
    ///
    /// The `Version` field may carry suffixes (`20.10.7-ce`); only the leading
    /// `major.minor.fix` triple is used.
    pub fn from_json(json: &[u8]) -> DockerResult<Self> {
        let response: VersionResponse = serde_json::from_slice(json)?;
        let captures = ENGINE_VERSION_RE
            .captures(&response.version)
            .ok_or_else(|| {
                DockerError::Decoding(format!("invalid engine version: {}", response.version))
            })?;

        let component = |idx: usize| -> DockerResult<u32> {
            captures[idx].parse().map_err(|_| {
                DockerError::Decoding(format!("invalid engine version: {}", response.version))
            })
        };

        Ok(Self {
            major: component(1)?,
            minor: component(2)?,
            fix: component(3)?,
            api_version: response.api_version.parse()?,
        })
    }

    /// Returns true if the engine speaks at least `required`.
    pub fn supports(&self, required: ApiVersion) -> bool {
        self.api_version >= required
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl FromStr for ApiVersion {
    type Err = DockerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DockerError::Decoding(format!("invalid api version: {s}"));
        let (major, minor) = s.trim().split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "docker {}.{}.{}-{}",
            self.major, self.minor, self.fix, self.api_version
        )
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_version_ordering_is_numeric() {
        let old: ApiVersion = "1.9".parse().unwrap();
        let required: ApiVersion = "1.24".parse().unwrap();
        let new: ApiVersion = "1.41".parse().unwrap();

        assert!(old < required);
        assert!(new > required);
        assert_eq!(required.to_string(), "1.24");
    }

    #[test]
    fn test_api_version_rejects_garbage() {
        assert!("".parse::<ApiVersion>().is_err());
        assert!("1".parse::<ApiVersion>().is_err());
        assert!("one.two".parse::<ApiVersion>().is_err());
    }

    #[test]
    fn test_engine_version_from_json() -> anyhow::Result<()> {
        let body = br#"{"Version":"20.10.7-ce","ApiVersion":"1.41","Os":"linux"}"#;
        let version = EngineVersion::from_json(body)?;

        assert_eq!(version.get_major(), 20);
        assert_eq!(version.get_minor(), 10);
        assert_eq!(version.get_fix(), 7);
        assert_eq!(version.get_api_version(), ApiVersion::new(1, 41));
        assert!(version.supports(ApiVersion::new(1, 24)));
        assert!(!version.supports(ApiVersion::new(1, 42)));
        assert_eq!(version.to_string(), "docker 20.10.7-1.41");

        Ok(())
    }

    #[test]
    fn test_engine_version_missing_fields() {
        let err = EngineVersion::from_json(br#"{"Version":"20.10.7"}"#).unwrap_err();
        assert!(matches!(err, DockerError::Decoding(_)));

        let err = EngineVersion::from_json(br#"{"Version":"dev","ApiVersion":"1.41"}"#)
            .unwrap_err();
        assert!(matches!(err, DockerError::Decoding(_)));
    }
}
