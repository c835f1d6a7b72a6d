use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use getset::Getters;
use serde::{Deserialize, Serialize};

use crate::{
    config::{BUNDLED_IMAGE_INFO, IMAGE_INFO_CACHE_FILENAME},
    models::RequiredImageInfo,
    DockerResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The last-known-good manifest and when the remote one was last checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[getset(get = "pub with_prefix")]
pub struct CachedImageInfo {
    /// When the manifest url was last fetched successfully.
    last_check: DateTime<Utc>,

    /// The manifest in use.
    info: RequiredImageInfo,
}

/// Persists the manifest cache as json in the state directory.
#[derive(Debug, Clone)]
pub struct ImageInfoStore {
    path: PathBuf,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl CachedImageInfo {
    /// Creates a cache entry.
    pub fn new(last_check: DateTime<Utc>, info: RequiredImageInfo) -> Self {
        Self { last_check, info }
    }
}

impl ImageInfoStore {
    /// Creates a store keeping its file in `home_dir`.
    pub fn new(home_dir: impl AsRef<Path>) -> Self {
        Self {
            path: home_dir.as_ref().join(IMAGE_INFO_CACHE_FILENAME),
        }
    }

    /// The cache file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the cache. A missing or unreadable cache is treated as empty.
    pub async fn load(&self) -> Option<CachedImageInfo> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("could not read {}: {e}", self.path.display());
                return None;
            }
        };

        match serde_json::from_slice(&data) {
            Ok(cached) => Some(cached),
            Err(e) => {
                tracing::warn!("ignoring corrupt manifest cache {}: {e}", self.path.display());
                None
            }
        }
    }

    /// Writes the cache, creating the state directory if needed.
    pub async fn save(&self, cached: &CachedImageInfo) -> DockerResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let data = serde_json::to_vec_pretty(cached)?;
        tokio::fs::write(&self.path, data).await?;
        tracing::debug!("saved manifest cache to {}", self.path.display());
        Ok(())
    }

    /// The manifest bundled with the crate.
    pub fn bundled() -> DockerResult<RequiredImageInfo> {
        RequiredImageInfo::from_json(BUNDLED_IMAGE_INFO.as_bytes())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
