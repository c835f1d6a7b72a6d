use std::{
    error::Error,
    fmt::{self, Display},
};
use thiserror::Error;

use crate::{manager::ManagerStage, manager::ManagerState, models::ApiVersion};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a rc2docker-related operation.
pub type DockerResult<T> = Result<T, DockerError>;

/// An error that occurred while talking to, or orchestrating, the docker engine.
#[derive(Debug, Error)]
pub enum DockerError {
    /// The connection to the engine failed before a response was received.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The engine answered with a non-success status code.
    #[error("engine error {status}: {}", message.as_deref().unwrap_or("no details"))]
    Engine {
        /// The HTTP status code returned by the engine.
        status: u16,

        /// The error message from the response body, if there was one.
        message: Option<String>,
    },

    /// The engine (or manifest server) returned json with an unexpected shape.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// The engine's API version is older than the one required.
    #[error("incompatible docker engine: api {found} is older than required {required}")]
    IncompatibleVersion {
        /// The API version reported by the engine.
        found: ApiVersion,

        /// The minimum API version required.
        required: ApiVersion,
    },

    /// The caller passed an invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An operation was attempted before the manager finished initializing.
    #[error("docker manager is not ready (state: {0})")]
    NotReady(ManagerState),

    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// An orchestration stage failed.
    #[error("{stage} failed: {source}")]
    Stage {
        /// The orchestration stage the failure occurred in.
        stage: ManagerStage,

        /// The underlying failure.
        #[source]
        source: Box<DockerError>,
    },

    /// Fetching the required image manifest failed.
    #[error("manifest fetch error: {0}")]
    ManifestFetch(#[from] reqwest::Error),

    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error that can represent any error.
    #[error(transparent)]
    Custom(#[from] AnyError),
}

/// A failure below the HTTP layer, or a response that could not be framed.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The socket does not exist or refused the connection.
    #[error("docker engine is not running or not installed at {endpoint}: {source}")]
    EngineUnavailable {
        /// The endpoint that was dialed.
        endpoint: String,

        /// The underlying connect error.
        #[source]
        source: std::io::Error,
    },

    /// A buffered request did not complete in time.
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The response could not be framed as HTTP.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// An HTTP protocol error.
    #[error("http error: {0}")]
    Http(#[from] hyper::Error),

    /// The endpoint string could not be parsed.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Any other socket-level I/O error.
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

/// An error that can represent any error.
#[derive(Debug)]
pub struct AnyError {
    error: anyhow::Error,
}

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Tags the error of a result with the orchestration stage it occurred in.
pub trait StageContext<T> {
    /// Wraps any error in a [`DockerError::Stage`] for `stage`.
    fn stage(self, stage: ManagerStage) -> DockerResult<T>;
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DockerError {
    /// Creates a new `Err` result.
    pub fn custom(error: impl Into<anyhow::Error>) -> DockerError {
        DockerError::Custom(AnyError {
            error: error.into(),
        })
    }

    /// Tags this error with the stage it occurred in. An error that already carries a stage
    /// keeps its original one.
    pub fn at(self, stage: ManagerStage) -> DockerError {
        match self {
            DockerError::Stage { .. } => self,
            other => DockerError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Returns the stage this error was tagged with, if any.
    pub fn stage(&self) -> Option<ManagerStage> {
        match self {
            DockerError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Returns the underlying error with any stage tag removed.
    pub fn root(&self) -> &DockerError {
        match self {
            DockerError::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns true if the engine could not be reached at all.
    pub fn is_engine_unavailable(&self) -> bool {
        matches!(
            self.root(),
            DockerError::Transport(TransportError::EngineUnavailable { .. })
        )
    }

    /// Returns true if the engine reported a 404 for the requested object.
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), DockerError::Engine { status: 404, .. })
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl<T> StageContext<T> for DockerResult<T> {
    fn stage(self, stage: ManagerStage) -> DockerResult<T> {
        self.map_err(|e| e.at(stage))
    }
}

impl From<serde_json::Error> for DockerError {
    fn from(error: serde_json::Error) -> Self {
        DockerError::Decoding(error.to_string())
    }
}

impl PartialEq for AnyError {
    fn eq(&self, other: &Self) -> bool {
        self.error.to_string() == other.error.to_string()
    }
}

impl Display for AnyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl Error for AnyError {}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
