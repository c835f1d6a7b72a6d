use std::collections::{BTreeMap, BTreeSet};

use getset::{CopyGetters, Getters};
use serde::Deserialize;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Download progress of one image layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub with_prefix")]
pub struct LayerProgress {
    /// Bytes downloaded so far.
    current_size: u64,

    /// The layer's total size, once the engine has reported it.
    final_size: u64,

    /// Whether the download finished.
    complete: bool,
}

/// Progress of pulling one image, built up from the engine's NDJSON status lines.
///
/// Layers are not known up front. They are added as `Pulling fs layer` lines arrive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct PullProgress {
    /// The image being pulled.
    name: String,

    /// The size reported before any layer sizes are known.
    estimated_size: u64,

    /// Progress per layer id.
    layers: BTreeMap<String, LayerProgress>,

    /// Every status string seen, for diagnostics.
    statuses: BTreeSet<String>,

    /// An in-band error reported by the engine.
    error: Option<String>,

    /// Set once the engine closed the stream without error.
    finished: bool,
}

/// Progress across a sequence of image pulls.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct BatchProgress {
    /// The image currently being pulled.
    #[getset(get = "pub with_prefix")]
    image: String,

    /// The position of the current image, starting at 0.
    #[getset(get_copy = "pub with_prefix")]
    index: usize,

    /// How many images the batch pulls.
    #[getset(get_copy = "pub with_prefix")]
    count: usize,

    /// Bytes downloaded across the batch.
    #[getset(get_copy = "pub with_prefix")]
    current_size: u64,

    /// The expected total across the batch.
    #[getset(get_copy = "pub with_prefix")]
    total_size: u64,
}

#[derive(Deserialize)]
struct StatusLine {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "progressDetail", default)]
    progress_detail: Option<ProgressDetail>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct ProgressDetail {
    #[serde(default)]
    current: Option<u64>,
    #[serde(default)]
    total: Option<u64>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl LayerProgress {
    /// The bytes this layer contributes to the running total.
    pub fn size(&self) -> u64 {
        if self.complete {
            self.final_size.max(self.current_size)
        } else {
            self.current_size
        }
    }
}

impl PullProgress {
    /// Creates an empty progress for `name`.
    pub fn new(name: impl Into<String>, estimated_size: u64) -> Self {
        Self {
            name: name.into(),
            estimated_size,
            ..Default::default()
        }
    }

    /// Applies one NDJSON status line.
    ///
    /// Returns false if the line could not be decoded; such lines are skipped.
    pub fn apply_line(&mut self, line: &[u8]) -> bool {
        let event: StatusLine = match serde_json::from_slice(line) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(
                    "skipping pull line {}: {e}",
                    String::from_utf8_lossy(line)
                );
                return false;
            }
        };

        if let Some(error) = event.error {
            tracing::warn!("engine reported pull error for {}: {error}", self.name);
            self.error = Some(error);
            return true;
        }

        let Some(status) = event.status else {
            tracing::trace!("pull line without status");
            return true;
        };

        match (status.as_str(), event.id) {
            ("Pulling fs layer", Some(id)) => {
                self.layers.entry(id).or_default();
            }
            ("Downloading", Some(id)) => {
                let layer = self.layers.entry(id).or_default();
                if let Some(detail) = event.progress_detail {
                    if let Some(current) = detail.current {
                        layer.current_size = current;
                    }
                    if let Some(total) = detail.total {
                        layer.final_size = total;
                    }
                }
            }
            ("Download Complete" | "Download complete", Some(id)) => {
                let layer = self.layers.entry(id).or_default();
                layer.complete = true;
            }
            _ => {}
        }

        self.statuses.insert(status);
        true
    }

    /// Bytes downloaded so far, summed over every layer.
    ///
    /// Once finished, an image whose layers reported nothing counts as its estimated size.
    pub fn current_size(&self) -> u64 {
        let sum = self.layers.values().map(LayerProgress::size).sum();
        if self.finished && sum == 0 {
            self.estimated_size
        } else {
            sum
        }
    }

    /// The total size of every known layer.
    pub fn final_size(&self) -> u64 {
        self.layers.values().map(|layer| layer.final_size).sum()
    }

    /// Returns true if every known layer finished downloading.
    pub fn layers_complete(&self) -> bool {
        self.layers.values().all(|layer| layer.complete)
    }

    /// Returns true once the stream ended and every layer finished downloading.
    pub fn is_complete(&self) -> bool {
        self.finished && self.layers_complete()
    }

    /// Marks the pull as finished. Layers still open are done since the engine closed the
    /// stream without error.
    pub(crate) fn finish(&mut self) {
        for layer in self.layers.values_mut() {
            if !layer.complete {
                layer.complete = true;
                layer.final_size = layer.final_size.max(layer.current_size);
            }
        }
        self.finished = true;
    }
}

impl BatchProgress {
    /// Creates a batch progress snapshot.
    pub fn new(
        image: impl Into<String>,
        index: usize,
        count: usize,
        current_size: u64,
        total_size: u64,
    ) -> Self {
        Self {
            image: image.into(),
            index,
            count,
            current_size,
            total_size,
        }
    }

    /// The completed fraction in `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        if self.total_size == 0 {
            return 0.0;
        }
        (self.current_size as f64 / self.total_size as f64).min(1.0)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_pulling_fs_layer_is_idempotent() {
        let mut progress = PullProgress::new("rc2server/compute", 0);
        assert!(progress.apply_line(br#"{"status":"Pulling fs layer","id":"a"}"#));
        assert!(progress.apply_line(
            br#"{"status":"Downloading","id":"a","progressDetail":{"current":10,"total":50}}"#
        ));
        assert!(progress.apply_line(br#"{"status":"Pulling fs layer","id":"a"}"#));

        assert_eq!(progress.get_layers().len(), 1);
        assert_eq!(progress.current_size(), 10);
        assert_eq!(progress.final_size(), 50);
    }

    #[test]
    fn test_progress_missing_detail_keeps_values() {
        let mut progress = PullProgress::new("x", 0);
        progress.apply_line(
            br#"{"status":"Downloading","id":"a","progressDetail":{"current":10,"total":50}}"#,
        );
        progress.apply_line(br#"{"status":"Downloading","id":"a","progressDetail":{}}"#);
        progress.apply_line(br#"{"status":"Downloading","id":"a"}"#);
        progress.apply_line(br#"{"status":"Downloading","id":"a","progressDetail":{"current":20}}"#);

        let layer = &progress.get_layers()["a"];
        assert_eq!(layer.get_current_size(), 20);
        assert_eq!(layer.get_final_size(), 50);
    }

    #[test]
    fn test_progress_status_match_is_case_sensitive() {
        let mut progress = PullProgress::new("x", 0);
        progress.apply_line(br#"{"status":"pulling fs layer","id":"a"}"#);
        progress.apply_line(br#"{"status":"Pulling from rc2server/compute","id":"latest"}"#);

        assert!(progress.get_layers().is_empty());
        assert!(progress.get_statuses().contains("pulling fs layer"));
        assert!(progress.get_statuses().contains("Pulling from rc2server/compute"));
    }

    #[test]
    fn test_progress_skips_garbage_and_records_errors() {
        let mut progress = PullProgress::new("x", 0);
        assert!(!progress.apply_line(b"not json"));
        assert!(progress.apply_line(br#"{"id":"a"}"#));
        assert!(progress.get_error().is_none());

        progress.apply_line(br#"{"errorDetail":{"message":"denied"},"error":"denied"}"#);
        assert_eq!(progress.get_error().as_deref(), Some("denied"));
    }

    #[test]
    fn test_progress_finish_uses_estimate_when_nothing_reported() {
        let mut progress = PullProgress::new("x", 1234);
        assert_eq!(progress.current_size(), 0);
        progress.finish();
        assert_eq!(progress.current_size(), 1234);
        assert!(progress.is_complete());
    }

    #[test]
    fn test_batch_progress_fraction() {
        assert_eq!(BatchProgress::new("a", 0, 2, 50, 200).fraction(), 0.25);
        assert_eq!(BatchProgress::new("a", 0, 2, 50, 0).fraction(), 0.0);
        assert_eq!(BatchProgress::new("a", 1, 2, 300, 200).fraction(), 1.0);
    }
}
