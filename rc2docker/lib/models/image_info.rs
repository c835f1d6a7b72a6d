use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use getset::Getters;
use serde::{Deserialize, Serialize};

use crate::{DockerError, DockerResult};

use super::{ContainerKind, ImageReference};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The expected image for one container kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[serde(rename_all = "camelCase")]
#[getset(get = "pub with_prefix")]
pub struct ImageInfo {
    /// The image id the container must run.
    id: String,

    /// The image name, e.g. `rc2server/dbserver`.
    name: String,

    /// The full tagged name to pull, e.g. `rc2server/dbserver:0.4.3`. Falls back to `name`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    tag: String,

    /// The image size in bytes.
    size: u64,

    /// The expected download size, used to report progress before the layers are known.
    #[serde(default)]
    est_size: u64,
}

/// The versioned manifest of the images the services require.
///
/// A newer manifest replaces an older one as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[serde(try_from = "RawManifest")]
#[getset(get = "pub with_prefix")]
pub struct RequiredImageInfo {
    /// The manifest version.
    version: u32,

    /// When the manifest was published.
    timestamp: Option<DateTime<Utc>>,

    /// The expected image for each kind.
    images: BTreeMap<ContainerKind, ImageInfo>,
}

/// The published manifest lists images either under `images` or directly by kind at the top
/// level.
#[derive(Deserialize)]
struct RawManifest {
    version: u32,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    images: Option<HashMap<String, ImageInfo>>,
    #[serde(flatten)]
    rest: HashMap<String, serde_json::Value>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ImageInfo {
    /// Creates an image entry.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        tag: impl Into<String>,
        size: u64,
        est_size: u64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tag: tag.into(),
            size,
            est_size,
        }
    }

    /// The name to pull: the tag if one is given, otherwise the name.
    pub fn full_name(&self) -> &str {
        if self.tag.is_empty() {
            &self.name
        } else {
            &self.tag
        }
    }

    /// Parses [`full_name`](Self::full_name).
    pub fn reference(&self) -> DockerResult<ImageReference> {
        self.full_name().parse()
    }

    /// The size to report before any layer sizes are known.
    pub fn estimated_size(&self) -> u64 {
        if self.est_size > 0 {
            self.est_size
        } else {
            self.size
        }
    }
}

impl RequiredImageInfo {
    /// Creates a manifest.
    pub fn new(
        version: u32,
        timestamp: Option<DateTime<Utc>>,
        images: BTreeMap<ContainerKind, ImageInfo>,
    ) -> Self {
        Self {
            version,
            timestamp,
            images,
        }
    }

    /// Parses a manifest document.
    pub fn from_json(json: &[u8]) -> DockerResult<Self> {
        Ok(serde_json::from_slice(json)?)
    }

    /// The expected image for `kind`.
    pub fn image(&self, kind: ContainerKind) -> Option<&ImageInfo> {
        self.images.get(&kind)
    }

    /// Returns true if this manifest should replace `other`: it has a higher version, or the same
    /// version and a later timestamp. Anything is newer than no manifest.
    pub fn newer_than(&self, other: Option<&RequiredImageInfo>) -> bool {
        let Some(other) = other else {
            return true;
        };

        match self.version.cmp(&other.version) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => match (self.timestamp, other.timestamp) {
                (Some(mine), Some(theirs)) => mine > theirs,
                (Some(_), None) => true,
                _ => false,
            },
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl TryFrom<RawManifest> for RequiredImageInfo {
    type Error = DockerError;

    fn try_from(raw: RawManifest) -> Result<Self, Self::Error> {
        let entries: Vec<(String, ImageInfo)> = match raw.images {
            Some(images) => images.into_iter().collect(),
            None => raw
                .rest
                .into_iter()
                .filter(|(key, _)| key.parse::<ContainerKind>().is_ok())
                .map(|(key, value)| -> DockerResult<(String, ImageInfo)> {
                    Ok((key, serde_json::from_value(value)?))
                })
                .collect::<DockerResult<_>>()?,
        };

        let images: BTreeMap<_, _> = entries
            .into_iter()
            .filter_map(|(key, info)| match key.parse::<ContainerKind>() {
                Ok(kind) => Some((kind, info)),
                Err(_) => {
                    tracing::debug!("ignoring manifest entry for unknown kind {key}");
                    None
                }
            })
            .collect();

        if images.is_empty() {
            return Err(DockerError::Decoding(
                "image manifest lists no images".to_string(),
            ));
        }

        Ok(Self {
            version: raw.version,
            timestamp: raw.timestamp,
            images,
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
