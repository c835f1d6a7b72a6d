use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{future, stream::BoxStream};
use getset::Getters;

use crate::{
    models::{
        ContainerKind, ContainerOperation, ContainerRecord, ContainerSpec, DockerImage,
        EngineEvent, EngineVersion, ImageReference,
    },
    transport::{ByteStream, LogEntry, LogEntryStream},
    DockerError, DockerResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A live stream of engine events.
pub type EventStream = BoxStream<'static, DockerResult<EngineEvent>>;

/// The result of running a command inside a container.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ExecOutput {
    /// The exit code, if the engine reported one.
    exit_code: Option<i64>,

    /// Everything written to stdout.
    stdout: Bytes,

    /// Everything written to stderr.
    stderr: Bytes,
}

/// The typed operations the manager needs from the engine.
///
/// Every call is a single attempt. Errors are returned to the caller, who owns any retry policy.
#[async_trait]
pub trait DockerApi: Send + Sync {
    /// Loads the engine and API version.
    async fn load_version(&self) -> DockerResult<EngineVersion>;

    /// Lists the labelled service containers, optionally only those of `kind`.
    ///
    /// Rows whose kind cannot be derived are dropped. The result is ordered by kind.
    async fn refresh_containers(
        &self,
        kind: Option<ContainerKind>,
    ) -> DockerResult<Vec<ContainerRecord>>;

    /// Performs `operation` on `container`.
    async fn perform(
        &self,
        operation: ContainerOperation,
        container: &ContainerRecord,
    ) -> DockerResult<()>;

    /// Performs `operation` on every container concurrently.
    ///
    /// All operations run to completion even if some fail; the first failure (in container
    /// order) is returned. Successful operations are not rolled back.
    async fn perform_all(
        &self,
        operation: ContainerOperation,
        containers: &[Arc<ContainerRecord>],
    ) -> DockerResult<()> {
        let results = future::join_all(
            containers
                .iter()
                .map(|container| self.perform(operation, container)),
        )
        .await;

        results.into_iter().collect()
    }

    /// Creates a container from `spec` and returns it as the engine reports it.
    async fn create_container(&self, spec: &ContainerSpec) -> DockerResult<ContainerRecord>;

    /// Loads a single container by id or name.
    async fn inspect_container(&self, id: &str) -> DockerResult<ContainerRecord>;

    /// Returns true if a network named `name` exists.
    async fn network_exists(&self, name: &str) -> DockerResult<bool>;

    /// Creates a bridge network named `name`.
    async fn create_network(&self, name: &str) -> DockerResult<()>;

    /// Returns true if a volume named `name` exists.
    async fn volume_exists(&self, name: &str) -> DockerResult<bool>;

    /// Creates a labelled volume named `name`.
    async fn create_volume(&self, name: &str) -> DockerResult<()>;

    /// Lists the installed images.
    async fn load_images(&self) -> DockerResult<Vec<DockerImage>>;

    /// Runs `command` in `container` and waits for it to finish.
    async fn exec_command(
        &self,
        command: &[String],
        container: &ContainerRecord,
    ) -> DockerResult<ExecOutput>;

    /// Runs `command` in `container`, streaming its output as it is produced.
    async fn stream_command(
        &self,
        command: &[String],
        container: &ContainerRecord,
    ) -> DockerResult<LogEntryStream>;

    /// Reads the container's log so far.
    async fn fetch_log(&self, container: &ContainerRecord) -> DockerResult<Vec<LogEntry>>;

    /// Follows the container's log.
    async fn stream_log(&self, container: &ContainerRecord) -> DockerResult<LogEntryStream>;

    /// Subscribes to the engine's event stream.
    async fn events(&self) -> DockerResult<EventStream>;

    /// Starts pulling `image` and returns the raw NDJSON progress body.
    async fn pull_image(&self, image: &ImageReference) -> DockerResult<ByteStream>;

    /// Fetches a json document from a url outside the engine api.
    async fn fetch_json(&self, url: &str) -> DockerResult<serde_json::Value>;
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ExecOutput {
    /// Creates an exec result.
    pub fn new(exit_code: Option<i64>, stdout: Bytes, stderr: Bytes) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
        }
    }

    /// Returns true if the command exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Rejects an empty command or one whose program is blank.
pub(crate) fn validate_command(command: &[String]) -> DockerResult<()> {
    match command.first() {
        Some(program) if !program.trim().is_empty() => Ok(()),
        _ => Err(DockerError::InvalidArgument(
            "command must not be empty".to_string(),
        )),
    }
}
