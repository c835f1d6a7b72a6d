use std::collections::HashMap;

use getset::Getters;
use serde::Deserialize;

use super::ImageReference;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An image installed on the engine.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct DockerImage {
    /// The image id (`sha256:...`).
    id: String,

    /// The tags pointing at the image. Untagged (`<none>`) entries are dropped.
    tags: Vec<ImageReference>,

    /// The size in bytes.
    size: u64,

    /// The image labels.
    labels: HashMap<String, String>,
}

/// One row of `GET /images/json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ImageSummary {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) repo_tags: Option<Vec<String>>,
    #[serde(default)]
    pub(crate) size: u64,
    #[serde(default)]
    pub(crate) labels: Option<HashMap<String, String>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DockerImage {
    /// Creates an image.
    pub fn new(
        id: impl Into<String>,
        tags: Vec<ImageReference>,
        size: u64,
        labels: HashMap<String, String>,
    ) -> Self {
        Self {
            id: id.into(),
            tags,
            size,
            labels,
        }
    }

    /// Returns true if one of the image's tags names `reference`.
    pub fn is_named(&self, reference: &ImageReference) -> bool {
        self.tags.iter().any(|tag| tag.same_image(reference))
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl From<ImageSummary> for DockerImage {
    fn from(summary: ImageSummary) -> Self {
        let tags = summary
            .repo_tags
            .unwrap_or_default()
            .iter()
            .filter(|tag| !tag.contains("<none>"))
            .filter_map(|tag| match tag.parse() {
                Ok(reference) => Some(reference),
                Err(_) => {
                    tracing::debug!("ignoring unparseable image tag {tag}");
                    None
                }
            })
            .collect();

        Self {
            id: summary.id,
            tags,
            size: summary.size,
            labels: summary.labels.unwrap_or_default(),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
