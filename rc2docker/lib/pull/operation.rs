use std::{fmt, sync::Arc};

use futures::StreamExt;
use http::StatusCode;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{
    api::DockerApi, models::ImageReference, transport::LineBuffer, DockerError, DockerResult,
};

use super::PullProgress;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Where a pull is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullState {
    /// Not started.
    Idle,

    /// Waiting for the engine to accept the request.
    Connecting,

    /// Receiving progress lines.
    Streaming,

    /// The engine closed the stream without error.
    Completed,

    /// The pull failed or was cancelled.
    Failed,
}

/// Pulls one image, reporting progress on every chunk the engine sends.
///
/// A pull cannot be resumed. Running it again starts over.
pub struct PullOperation {
    api: Arc<dyn DockerApi>,
    image: ImageReference,
    estimated_size: u64,
    state: watch::Sender<PullState>,
    cancel: CancellationToken,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl PullOperation {
    /// Creates a pull of `image`, using `estimated_size` until the engine reports layer sizes.
    pub fn new(api: Arc<dyn DockerApi>, image: ImageReference, estimated_size: u64) -> Self {
        Self {
            api,
            image,
            estimated_size,
            state: watch::Sender::new(PullState::Idle),
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `cancel` instead of the operation's own token, so several pulls can share one.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The image being pulled.
    pub fn image(&self) -> &ImageReference {
        &self.image
    }

    /// The current state.
    pub fn state(&self) -> PullState {
        *self.state.borrow()
    }

    /// Returns a receiver that observes state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<PullState> {
        self.state.subscribe()
    }

    /// Returns a token that cancels this pull.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancels the pull. The connection is dropped and no further callbacks are made.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Runs the pull to completion.
    ///
    /// `on_progress` is called after every chunk and once more on completion. After a failure or
    /// cancellation it is never called again.
    pub async fn run<F>(&self, mut on_progress: F) -> DockerResult<PullProgress>
    where
        F: FnMut(&PullProgress) + Send,
    {
        let mut progress = PullProgress::new(self.image.to_string(), self.estimated_size);
        self.state.send_replace(PullState::Connecting);

        let mut chunks = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(self.fail(DockerError::Cancelled)),
            result = self.api.pull_image(&self.image) => match result {
                Ok(chunks) => chunks,
                Err(e) => return Err(self.fail(e)),
            },
        };

        self.state.send_replace(PullState::Streaming);
        let mut buffer = LineBuffer::new();

        loop {
            let chunk = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(self.fail(DockerError::Cancelled)),
                chunk = chunks.next() => chunk,
            };

            match chunk {
                None => break,
                Some(Err(e)) => return Err(self.fail(e)),
                Some(Ok(chunk)) => {
                    for line in buffer.push(&chunk) {
                        progress.apply_line(&line);
                    }
                    if let Some(error) = progress.get_error() {
                        return Err(self.fail(in_band_error(error)));
                    }
                    on_progress(&progress);
                }
            }
        }

        if let Some(line) = buffer.finish() {
            progress.apply_line(&line);
            if let Some(error) = progress.get_error() {
                return Err(self.fail(in_band_error(error)));
            }
        }

        progress.finish();
        self.state.send_replace(PullState::Completed);
        tracing::info!(
            "pulled {} ({} bytes, {} layers)",
            self.image,
            progress.current_size(),
            progress.get_layers().len()
        );
        on_progress(&progress);

        Ok(progress)
    }

    fn fail(&self, error: DockerError) -> DockerError {
        tracing::warn!("pull of {} failed: {error}", self.image);
        self.state.send_replace(PullState::Failed);
        error
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Debug for PullOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PullOperation")
            .field("image", &self.image)
            .field("estimated_size", &self.estimated_size)
            .field("state", &self.state())
            .finish()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// The engine reports pull failures inside a successful (200) response body.
fn in_band_error(message: &str) -> DockerError {
    DockerError::Engine {
        status: StatusCode::OK.as_u16(),
        message: Some(message.to_string()),
    }
}
