#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use rc2docker::{
    api::{DockerApi, EventStream, ExecOutput},
    config::ManagerConfig,
    manager::ImageInfoStore,
    models::{
        ApiVersion, ContainerDetails, ContainerKind, ContainerOperation, ContainerRecord,
        ContainerSpec, ContainerState, DockerImage, EngineVersion, ImageReference,
        RequiredImageInfo,
    },
    transport::{ByteStream, LogEntry, LogEntryStream},
    DockerError, DockerResult, TransportError,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A scripted engine. Every call is counted; responses come from the public fields.
pub struct MockDockerApi {
    pub api_version: ApiVersion,
    pub engine_down: bool,
    pub containers: Mutex<Vec<MockContainer>>,
    pub images: Mutex<Vec<DockerImage>>,
    pub fail_kind: Option<ContainerKind>,
    pub manifest: Mutex<Option<serde_json::Value>>,
    pub pull_chunks: Mutex<Vec<PullChunk>>,
    pub exec_exit_codes: Mutex<VecDeque<i64>>,
    pub exec_stdout: Bytes,
    pub performed: Mutex<Vec<(ContainerOperation, ContainerKind)>>,
    pub perform_delay: Duration,
    pub calls: CallCounts,
}

#[derive(Debug, Clone)]
pub struct MockContainer {
    pub kind: ContainerKind,
    pub id: String,
    pub image_id: String,
    pub state: ContainerState,
}

/// One element of the scripted pull body.
#[derive(Debug, Clone)]
pub enum PullChunk {
    Data(&'static str),
    Fail,
}

#[derive(Debug, Default)]
pub struct CallCounts {
    pub version: AtomicUsize,
    pub refresh: AtomicUsize,
    pub perform: AtomicUsize,
    pub perform_in_flight: AtomicUsize,
    pub perform_max_in_flight: AtomicUsize,
    pub create: AtomicUsize,
    pub network_create: AtomicUsize,
    pub volume_create: AtomicUsize,
    pub images: AtomicUsize,
    pub exec: AtomicUsize,
    pub pull: AtomicUsize,
    pub fetch_json: AtomicUsize,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl MockDockerApi {
    /// An engine speaking api 1.41 with the three service containers exited.
    pub fn new() -> Self {
        Self {
            api_version: ApiVersion::new(1, 41),
            engine_down: false,
            containers: Mutex::new(
                ContainerKind::SERVICES
                    .iter()
                    .map(|kind| MockContainer::new(*kind, ContainerState::Exited))
                    .collect(),
            ),
            images: Mutex::new(Vec::new()),
            fail_kind: None,
            manifest: Mutex::new(None),
            pull_chunks: Mutex::new(Vec::new()),
            exec_exit_codes: Mutex::new(VecDeque::new()),
            exec_stdout: Bytes::from_static(b"-- dump --\n"),
            performed: Mutex::new(Vec::new()),
            perform_delay: Duration::ZERO,
            calls: CallCounts::default(),
        }
    }

    pub fn with_containers(self, containers: Vec<MockContainer>) -> Self {
        *self.containers.lock().unwrap() = containers;
        self
    }

    pub fn set_state(&self, kind: ContainerKind, state: ContainerState) {
        let mut containers = self.containers.lock().unwrap();
        if let Some(container) = containers.iter_mut().find(|c| c.kind == kind) {
            container.state = state;
        }
    }

    /// Installs the bundled manifest's images, so nothing needs pulling.
    pub fn install_bundled_images(&self) {
        let info = bundled();
        *self.images.lock().unwrap() = info
            .get_images()
            .values()
            .map(|image| {
                DockerImage::new(
                    image.get_id().clone(),
                    vec![image.reference().unwrap()],
                    *image.get_size(),
                    HashMap::new(),
                )
            })
            .collect();
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

impl MockContainer {
    pub fn new(kind: ContainerKind, state: ContainerState) -> Self {
        Self {
            kind,
            id: format!("{}0123456789abcdef", kind.as_str()),
            image_id: format!("sha256:old-{}", kind.as_str()),
            state,
        }
    }

    pub fn with_image_id(mut self, image_id: impl Into<String>) -> Self {
        self.image_id = image_id.into();
        self
    }

    fn record(&self) -> ContainerRecord {
        ContainerRecord::new(
            self.kind,
            ContainerDetails {
                id: self.id.clone(),
                name: self.kind.container_name(),
                image_id: self.image_id.clone(),
                image_name: self.kind.image_name(),
                mounts: Vec::new(),
            },
            self.state,
        )
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl DockerApi for MockDockerApi {
    async fn load_version(&self) -> DockerResult<EngineVersion> {
        self.calls.version.fetch_add(1, Ordering::SeqCst);
        if self.engine_down {
            return Err(TransportError::EngineUnavailable {
                endpoint: "unix:///var/run/docker.sock".to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }
            .into());
        }
        Ok(EngineVersion::new(20, 10, 7, self.api_version))
    }

    async fn refresh_containers(
        &self,
        kind: Option<ContainerKind>,
    ) -> DockerResult<Vec<ContainerRecord>> {
        self.calls.refresh.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .containers
            .lock()
            .unwrap()
            .iter()
            .filter(|c| kind.map_or(true, |kind| c.kind == kind))
            .map(MockContainer::record)
            .collect())
    }

    async fn perform(
        &self,
        operation: ContainerOperation,
        container: &ContainerRecord,
    ) -> DockerResult<()> {
        self.calls.perform.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.calls.perform_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.calls
            .perform_max_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);

        if self.perform_delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.perform_delay).await;
        }
        self.calls.perform_in_flight.fetch_sub(1, Ordering::SeqCst);

        self.performed
            .lock()
            .unwrap()
            .push((operation, container.kind()));

        if self.fail_kind == Some(container.kind()) {
            return Err(DockerError::Engine {
                status: 500,
                message: Some(format!("cannot {operation} {}", container.kind())),
            });
        }
        self.set_state(container.kind(), operation.resulting_state());
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> DockerResult<ContainerRecord> {
        self.calls.create.fetch_add(1, Ordering::SeqCst);
        let container = MockContainer::new(*spec.get_kind(), ContainerState::Created)
            .with_image_id(format!("sha256:{}", spec.get_image()));
        self.containers.lock().unwrap().push(container.clone());
        Ok(container.record())
    }

    async fn inspect_container(&self, id: &str) -> DockerResult<ContainerRecord> {
        self.containers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .map(MockContainer::record)
            .ok_or(DockerError::Engine {
                status: 404,
                message: Some(format!("no such container: {id}")),
            })
    }

    async fn network_exists(&self, _name: &str) -> DockerResult<bool> {
        Ok(false)
    }

    async fn create_network(&self, _name: &str) -> DockerResult<()> {
        self.calls.network_create.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn volume_exists(&self, name: &str) -> DockerResult<bool> {
        Ok(name == "rc2_dbdata")
    }

    async fn create_volume(&self, _name: &str) -> DockerResult<()> {
        self.calls.volume_create.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load_images(&self) -> DockerResult<Vec<DockerImage>> {
        self.calls.images.fetch_add(1, Ordering::SeqCst);
        Ok(self.images.lock().unwrap().clone())
    }

    async fn exec_command(
        &self,
        _command: &[String],
        _container: &ContainerRecord,
    ) -> DockerResult<ExecOutput> {
        self.calls.exec.fetch_add(1, Ordering::SeqCst);
        let exit_code = self.exec_exit_codes.lock().unwrap().pop_front().unwrap_or(0);
        Ok(ExecOutput::new(
            Some(exit_code),
            self.exec_stdout.clone(),
            Bytes::new(),
        ))
    }

    async fn stream_command(
        &self,
        _command: &[String],
        _container: &ContainerRecord,
    ) -> DockerResult<LogEntryStream> {
        Ok(stream::empty().boxed())
    }

    async fn fetch_log(&self, _container: &ContainerRecord) -> DockerResult<Vec<LogEntry>> {
        Ok(Vec::new())
    }

    async fn stream_log(&self, _container: &ContainerRecord) -> DockerResult<LogEntryStream> {
        Ok(stream::empty().boxed())
    }

    async fn events(&self) -> DockerResult<EventStream> {
        Ok(stream::pending().boxed())
    }

    async fn pull_image(&self, _image: &ImageReference) -> DockerResult<ByteStream> {
        self.calls.pull.fetch_add(1, Ordering::SeqCst);
        let chunks: Vec<DockerResult<Bytes>> = self
            .pull_chunks
            .lock()
            .unwrap()
            .iter()
            .map(|chunk| match chunk {
                PullChunk::Data(data) => Ok(Bytes::from_static(data.as_bytes())),
                PullChunk::Fail => Err(DockerError::from(TransportError::MalformedResponse(
                    "connection reset".to_string(),
                ))),
            })
            .collect();
        Ok(stream::iter(chunks).boxed())
    }

    async fn fetch_json(&self, url: &str) -> DockerResult<serde_json::Value> {
        self.calls.fetch_json.fetch_add(1, Ordering::SeqCst);
        self.manifest
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| DockerError::custom(anyhow::anyhow!("offline: cannot reach {url}")))
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

pub fn bundled() -> RequiredImageInfo {
    ImageInfoStore::bundled().unwrap()
}

/// A config with a private home directory and no event monitor.
pub fn config(home_dir: &std::path::Path) -> ManagerConfig {
    ManagerConfig::builder()
        .home_dir(home_dir)
        .image_info_url("https://manifest.invalid/imageInfo.json")
        .force_update_check(false)
        .monitor_events(false)
        .running_timeout(std::time::Duration::from_millis(100))
        .db_connect_attempts(3)
        .db_connect_delay(std::time::Duration::from_millis(1))
        .build()
}

pub fn mock() -> Arc<MockDockerApi> {
    Arc::new(MockDockerApi::new())
}
