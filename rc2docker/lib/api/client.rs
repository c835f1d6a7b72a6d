use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;

use crate::{
    config::{CONTAINER_LABEL, DEFAULT_EXEC_TIMEOUT, DEFAULT_REQUEST_TIMEOUT},
    models::{
        ContainerKind, ContainerOperation, ContainerRecord, ContainerSpec, DockerImage,
        EngineEvent, EngineVersion, ImageReference, ImageSummary,
    },
    transport::{
        decode_frames, frames, lines, ByteStream, EngineRequest, EngineResponse, Endpoint,
        LogEntry, LogEntryStream, LogStream, SocketTransport, Transport,
    },
    DockerError, DockerResult,
};

use super::{
    payloads::{
        ContainerInspect, ContainerSummary, ExecCreate, ExecInspect, ExecStart, IdResponse,
        NamedObject, NetworkCreate, VolumeCreate, VolumeList,
    },
    validate_command, DockerApi, EventStream, ExecOutput,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A [`DockerApi`] backed by the engine's REST api.
#[derive(Clone)]
pub struct DockerClient {
    transport: Arc<dyn Transport>,
    http: reqwest::Client,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DockerClient {
    /// Creates a client for the engine at `endpoint`.
    pub fn new(endpoint: Endpoint, timeout: Duration) -> DockerResult<Self> {
        let transport = SocketTransport::builder()
            .endpoint(endpoint)
            .timeout(timeout)
            .build();
        Self::with_transport(Arc::new(transport))
    }

    /// Creates a client that sends engine requests through `transport`.
    pub fn with_transport(transport: Arc<dyn Transport>) -> DockerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { transport, http })
    }

    async fn send(&self, request: EngineRequest) -> DockerResult<EngineResponse> {
        self.transport.send(request).await?.error_for_status()
    }

    async fn create_exec(
        &self,
        command: &[String],
        container: &ContainerRecord,
    ) -> DockerResult<String> {
        validate_command(command)?;

        let body = ExecCreate {
            attach_stdout: true,
            attach_stderr: true,
            tty: false,
            cmd: command,
        };
        let request =
            EngineRequest::post(format!("/containers/{}/exec", container.target())).json(&body)?;
        let created: IdResponse = self.send(request).await?.json()?;

        tracing::debug!("created exec {} in {}", created.id, container.name());
        Ok(created.id)
    }

    fn start_exec_request(exec_id: &str) -> DockerResult<EngineRequest> {
        EngineRequest::post(format!("/exec/{exec_id}/start")).json(&ExecStart {
            detach: false,
            tty: false,
        })
    }

    fn logs_request(container: &ContainerRecord, follow: bool) -> EngineRequest {
        let request = EngineRequest::get(format!("/containers/{}/logs", container.target()))
            .query("stdout", "1")
            .query("stderr", "1");

        if follow {
            request.query("follow", "1")
        } else {
            request
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl DockerApi for DockerClient {
    async fn load_version(&self) -> DockerResult<EngineVersion> {
        let response = self.send(EngineRequest::get("/version")).await?;
        let version = EngineVersion::from_json(response.get_body())?;
        tracing::debug!("engine reports {version}");
        Ok(version)
    }

    async fn refresh_containers(
        &self,
        kind: Option<ContainerKind>,
    ) -> DockerResult<Vec<ContainerRecord>> {
        let filters = serde_json::json!({ "label": [CONTAINER_LABEL] }).to_string();
        let request = EngineRequest::get("/containers/json")
            .query("all", "1")
            .query("filters", filters);
        let rows: Vec<ContainerSummary> = self.send(request).await?.json()?;

        let mut records: Vec<ContainerRecord> = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(record) = row.into_record()? else {
                continue;
            };
            if kind.is_some_and(|kind| kind != record.kind()) {
                continue;
            }
            if records.iter().any(|r| r.kind() == record.kind()) {
                tracing::warn!(
                    "ignoring second {} container {}",
                    record.kind(),
                    record.name()
                );
                continue;
            }
            records.push(record);
        }

        records.sort_by_key(|record| record.kind());
        Ok(records)
    }

    async fn perform(
        &self,
        operation: ContainerOperation,
        container: &ContainerRecord,
    ) -> DockerResult<()> {
        let target = container.target();
        let request = match operation.action() {
            Some(action) => EngineRequest::post(format!("/containers/{target}/{action}")),
            None => EngineRequest::delete(format!("/containers/{target}")),
        };

        tracing::info!("{operation} {}", container.name());
        self.send(request).await?;
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> DockerResult<ContainerRecord> {
        let request = EngineRequest::post("/containers/create")
            .query("name", spec.get_name())
            .json(spec)?;
        let created: IdResponse = self.send(request).await?.json()?;

        tracing::info!("created container {} ({})", spec.get_name(), created.id);
        self.inspect_container(&created.id).await
    }

    async fn inspect_container(&self, id: &str) -> DockerResult<ContainerRecord> {
        let body: ContainerInspect = self
            .send(EngineRequest::get(format!("/containers/{id}/json")))
            .await?
            .json()?;

        body.into_record()?.ok_or_else(|| {
            DockerError::Decoding(format!("container {id} is not a service container"))
        })
    }

    async fn network_exists(&self, name: &str) -> DockerResult<bool> {
        let networks: Vec<NamedObject> = self.send(EngineRequest::get("/networks")).await?.json()?;
        Ok(networks.iter().any(|network| network.name == name))
    }

    async fn create_network(&self, name: &str) -> DockerResult<()> {
        let body = NetworkCreate {
            name,
            driver: "bridge",
            internal: false,
        };
        self.send(EngineRequest::post("/networks/create").json(&body)?)
            .await?;

        tracing::info!("created network {name}");
        Ok(())
    }

    async fn volume_exists(&self, name: &str) -> DockerResult<bool> {
        let list: VolumeList = self.send(EngineRequest::get("/volumes")).await?.json()?;
        Ok(list
            .volumes
            .unwrap_or_default()
            .iter()
            .any(|volume| volume.name == name))
    }

    async fn create_volume(&self, name: &str) -> DockerResult<()> {
        let body = VolumeCreate {
            name,
            labels: HashMap::from([(CONTAINER_LABEL, "")]),
        };
        self.send(EngineRequest::post("/volumes/create").json(&body)?)
            .await?;

        tracing::info!("created volume {name}");
        Ok(())
    }

    async fn load_images(&self) -> DockerResult<Vec<DockerImage>> {
        let summaries: Vec<ImageSummary> =
            self.send(EngineRequest::get("/images/json")).await?.json()?;
        Ok(summaries.into_iter().map(DockerImage::from).collect())
    }

    async fn exec_command(
        &self,
        command: &[String],
        container: &ContainerRecord,
    ) -> DockerResult<ExecOutput> {
        let exec_id = self.create_exec(command, container).await?;

        let request = Self::start_exec_request(&exec_id)?.timeout(DEFAULT_EXEC_TIMEOUT);
        let response = self.send(request).await?;

        let mut stdout = BytesMut::new();
        let mut stderr = BytesMut::new();
        for entry in decode_frames(response.get_body())? {
            match entry.stream {
                LogStream::Stdout => stdout.extend_from_slice(&entry.data),
                LogStream::Stderr => stderr.extend_from_slice(&entry.data),
            }
        }

        let inspect: ExecInspect = self
            .send(EngineRequest::get(format!("/exec/{exec_id}/json")))
            .await?
            .json()?;

        Ok(ExecOutput::new(
            inspect.exit_code,
            stdout.freeze(),
            stderr.freeze(),
        ))
    }

    async fn stream_command(
        &self,
        command: &[String],
        container: &ContainerRecord,
    ) -> DockerResult<LogEntryStream> {
        let exec_id = self.create_exec(command, container).await?;
        let chunks = self
            .transport
            .stream(Self::start_exec_request(&exec_id)?)
            .await?;
        Ok(frames(chunks))
    }

    async fn fetch_log(&self, container: &ContainerRecord) -> DockerResult<Vec<LogEntry>> {
        let response = self.send(Self::logs_request(container, false)).await?;
        decode_frames(response.get_body())
    }

    async fn stream_log(&self, container: &ContainerRecord) -> DockerResult<LogEntryStream> {
        let chunks = self
            .transport
            .stream(Self::logs_request(container, true))
            .await?;
        Ok(frames(chunks))
    }

    async fn events(&self) -> DockerResult<EventStream> {
        let chunks = self.transport.stream(EngineRequest::get("/events")).await?;
        let events = lines(chunks).filter_map(|line| async move {
            match line {
                Err(e) => Some(Err(e)),
                Ok(line) => match EngineEvent::parse(&line) {
                    Ok(event) => event.map(Ok),
                    Err(e) => {
                        tracing::warn!("skipping undecodable event: {e}");
                        None
                    }
                },
            }
        });

        Ok(Box::pin(events))
    }

    async fn pull_image(&self, image: &ImageReference) -> DockerResult<ByteStream> {
        let request = EngineRequest::post("/images/create")
            .query("fromImage", image.repository_and_name())
            .query("tag", image.version_or_latest());

        tracing::info!("pulling {image}");
        self.transport.stream(request).await
    }

    async fn fetch_json(&self, url: &str) -> DockerResult<serde_json::Value> {
        let value = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(value)
    }
}

impl std::fmt::Debug for DockerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerClient").finish_non_exhaustive()
    }
}
