use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use chrono::Utc;
use futures::future;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::{
    api::{DockerApi, DockerClient},
    config::ManagerConfig,
    models::{
        ContainerKind, ContainerOperation, ContainerRecord, ContainerSpec, ContainerState,
        DockerImage, EngineVersion, ImageInfo, RequiredImageInfo,
    },
    pull::{BatchProgress, PullOperation},
    transport::{LogEntry, LogEntryStream},
    DockerError, DockerResult, StageContext, TransportError,
};

use super::{
    monitor::EventMonitor, CachedImageInfo, ContainerChange, ContainerTable, ImageInfoStore,
    ManagerStage, ManagerState,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const DB_CHECK_COMMAND: [&str; 5] = ["psql", "-Urc2", "-c", "select * from metadata", "rc2"];

const DB_BACKUP_COMMAND: [&str; 2] = ["pg_dump", "rc2"];

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Provisions, monitors and controls the service containers.
///
/// Call [`initialize`](Self::initialize) first. Every other operation fails with
/// [`DockerError::NotReady`] until it succeeds. Failures are tagged with the
/// [`ManagerStage`] they occurred in and are never retried automatically.
pub struct DockerManager {
    api: Arc<dyn DockerApi>,
    config: ManagerConfig,
    table: ContainerTable,
    state: watch::Sender<ManagerState>,
    init_lock: tokio::sync::Mutex<()>,
    store: ImageInfoStore,
    engine: Mutex<EngineSnapshot>,
    monitor: Mutex<Option<EventMonitor>>,
}

/// What the manager learned about the engine and the manifest during initialization.
#[derive(Debug, Default)]
struct EngineSnapshot {
    version: Option<EngineVersion>,
    image_info: Option<RequiredImageInfo>,
    images: Vec<DockerImage>,
    manifest_error: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DockerManager {
    /// Creates a manager talking to the engine at the configured endpoint.
    pub fn new(config: ManagerConfig) -> DockerResult<Self> {
        let client = DockerClient::new(
            config.get_endpoint().clone(),
            *config.get_request_timeout(),
        )?;
        Ok(Self::with_api(Arc::new(client), config))
    }

    /// Creates a manager using `api` to reach the engine.
    pub fn with_api(api: Arc<dyn DockerApi>, config: ManagerConfig) -> Self {
        let store = ImageInfoStore::new(config.get_home_dir());
        Self {
            api,
            config,
            table: ContainerTable::new(),
            state: watch::Sender::new(ManagerState::Uninitialized),
            init_lock: tokio::sync::Mutex::new(()),
            store,
            engine: Mutex::new(EngineSnapshot::default()),
            monitor: Mutex::new(None),
        }
    }

    /// The engine api the manager uses.
    pub fn api(&self) -> &Arc<dyn DockerApi> {
        &self.api
    }

    /// The current state.
    pub fn state(&self) -> ManagerState {
        self.state.borrow().clone()
    }

    /// Returns a receiver that observes every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<ManagerState> {
        self.state.subscribe()
    }

    /// Subscribes to container state changes.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<ContainerChange> {
        self.table.subscribe()
    }

    /// A snapshot of the managed containers, ordered by kind.
    pub fn containers(&self) -> Vec<Arc<ContainerRecord>> {
        self.table.snapshot()
    }

    /// The managed container of `kind`.
    pub fn container(&self, kind: ContainerKind) -> Option<Arc<ContainerRecord>> {
        self.table.get(kind)
    }

    /// The engine version, once checked.
    pub fn version(&self) -> Option<EngineVersion> {
        self.engine().version
    }

    /// The manifest in use.
    pub fn image_info(&self) -> Option<RequiredImageInfo> {
        self.engine().image_info.clone()
    }

    /// The installed images, as of the last refresh.
    pub fn images(&self) -> Vec<DockerImage> {
        self.engine().images.clone()
    }

    /// Why the last manifest fetch failed, if it did. The cached manifest was used instead.
    pub fn last_manifest_error(&self) -> Option<String> {
        self.engine().manifest_error.clone()
    }

    /// Returns true while the engine event subscription is alive.
    pub fn is_monitoring_events(&self) -> bool {
        self.monitor()
            .as_ref()
            .is_some_and(EventMonitor::is_running)
    }

    /// Initializes the manager: checks the engine version, refreshes the image manifest, makes
    /// sure the network and volumes exist and loads containers and images.
    ///
    /// Concurrent calls are serialized. Once ready, a call without `refresh_image_info` returns
    /// immediately. Returns whether images need to be pulled.
    pub async fn initialize(&self, refresh_image_info: bool) -> DockerResult<bool> {
        let _guard = self.init_lock.lock().await;
        if self.state().is_ready() && !refresh_image_info {
            return Ok(self.pull_is_necessary());
        }

        match self.run_initialization(refresh_image_info).await {
            Ok(()) => {
                self.set_state(ManagerState::Ready);
                let necessary = self.pull_is_necessary();
                tracing::info!("docker manager ready (pull necessary: {necessary})");
                Ok(necessary)
            }
            Err(e) => {
                let stage = e.stage().unwrap_or(ManagerStage::ContainerInit);
                tracing::error!("docker manager initialization failed: {e}");
                self.set_state(ManagerState::NotReady {
                    stage,
                    reason: e.root().to_string(),
                });
                Err(e)
            }
        }
    }

    /// Reloads the containers from the engine and merges them into the table.
    pub async fn refresh_containers(&self) -> DockerResult<Vec<ContainerChange>> {
        self.require_ready()?;
        self.load_containers().await.stage(ManagerStage::Operation)
    }

    /// Reloads the installed images.
    pub async fn refresh_images(&self) -> DockerResult<()> {
        let images = self.api.load_images().await?;
        self.engine().images = images;
        Ok(())
    }

    /// The manifest images that are neither installed nor used by their container.
    pub fn images_to_pull(&self) -> Vec<(ContainerKind, ImageInfo)> {
        let engine = self.engine();
        let Some(info) = &engine.image_info else {
            return Vec::new();
        };

        self.config
            .get_required_kinds()
            .iter()
            .filter_map(|kind| {
                let image = info.image(*kind)?;
                let in_use = self
                    .table
                    .get(*kind)
                    .is_some_and(|record| record.image_id() == *image.get_id());
                let reference = image.reference().ok();
                let installed = engine.images.iter().any(|installed| {
                    installed.get_id() == image.get_id()
                        || reference.as_ref().is_some_and(|r| installed.is_named(r))
                });

                (!in_use && !installed).then(|| (*kind, image.clone()))
            })
            .collect()
    }

    /// Returns true if any required image has to be pulled.
    pub fn pull_is_necessary(&self) -> bool {
        !self.images_to_pull().is_empty()
    }

    /// Pulls every image returned by [`images_to_pull`](Self::images_to_pull), one at a time.
    ///
    /// `on_progress` receives the aggregate progress after every chunk. Cancelling `cancel` stops
    /// the current pull and skips the rest. Images pulled before a failure stay installed.
    pub async fn pull_images<F>(
        &self,
        cancel: CancellationToken,
        mut on_progress: F,
    ) -> DockerResult<()>
    where
        F: FnMut(&BatchProgress) + Send,
    {
        self.require_ready()?;

        let needed = self.images_to_pull();
        let count = needed.len();
        let total: u64 = needed.iter().map(|(_, image)| image.estimated_size()).sum();
        let mut done = 0u64;

        for (index, (kind, image)) in needed.iter().enumerate() {
            let reference = image.reference().stage(ManagerStage::Pull)?;
            let name = image.full_name().to_string();
            tracing::info!("pulling {name} for {kind} ({}/{count})", index + 1);

            let operation =
                PullOperation::new(Arc::clone(&self.api), reference, image.estimated_size())
                    .with_cancellation(cancel.clone());
            let progress = operation
                .run(|progress| {
                    on_progress(&BatchProgress::new(
                        name.as_str(),
                        index,
                        count,
                        done + progress.current_size(),
                        total,
                    ))
                })
                .await
                .stage(ManagerStage::Pull)?;

            done += progress.current_size();
        }

        self.refresh_images().await.stage(ManagerStage::Pull)
    }

    /// Creates the containers that do not exist yet, using the image from the manifest.
    /// Returns the kinds that were created.
    pub async fn prepare_containers(&self) -> DockerResult<Vec<ContainerKind>> {
        self.require_ready()?;

        let image_info = self.image_info();
        let mut created = Vec::new();
        for kind in self.config.get_required_kinds() {
            let record = self.record_for(*kind)?;
            let _guard = record.lock_operations().await;
            if record.state().exists() {
                continue;
            }

            let image = image_info
                .as_ref()
                .and_then(|info| info.image(*kind))
                .map(|image| image.full_name().to_string())
                .unwrap_or_else(|| kind.image_name());
            let spec = ContainerSpec::for_kind(*kind, image, self.config.get_network_name());

            let fresh = self
                .api
                .create_container(&spec)
                .await
                .stage(ManagerStage::ContainerInit)?;
            self.table.upsert(fresh);
            created.push(*kind);
        }

        Ok(created)
    }

    /// The existing containers whose image differs from the one the manifest requires.
    pub fn outdated_containers(&self) -> Vec<Arc<ContainerRecord>> {
        let Some(info) = self.image_info() else {
            return Vec::new();
        };

        self.table
            .snapshot()
            .into_iter()
            .filter(|record| record.state().exists())
            .filter(|record| {
                info.image(record.kind())
                    .is_some_and(|image| *image.get_id() != record.image_id())
            })
            .collect()
    }

    /// Stops and removes every outdated container. Returns the kinds that were removed.
    ///
    /// This is never done implicitly. Containers removed before a failure stay removed.
    pub async fn remove_outdated_containers(&self) -> DockerResult<Vec<ContainerKind>> {
        self.require_ready()?;

        let mut removed = Vec::new();
        for record in self.outdated_containers() {
            let _guard = record.lock_operations().await;
            if matches!(
                record.state(),
                ContainerState::Running | ContainerState::Paused | ContainerState::Restarting
            ) {
                self.api
                    .perform(ContainerOperation::Stop, &record)
                    .await
                    .stage(ManagerStage::Operation)?;
            }

            self.api
                .perform(ContainerOperation::Remove, &record)
                .await
                .stage(ManagerStage::Operation)?;
            self.table
                .set_state(record.kind(), ContainerState::NotAvailable);
            removed.push(record.kind());
        }

        Ok(removed)
    }

    /// Performs `operation` on the container of `kind`.
    pub async fn perform(
        &self,
        operation: ContainerOperation,
        kind: ContainerKind,
    ) -> DockerResult<()> {
        self.perform_all(operation, Some(&[kind])).await
    }

    /// Performs `operation` on the containers of `kinds` (all required kinds if `None`).
    ///
    /// The containers are handled concurrently, but operations on the same container wait for
    /// each other. Containers already in the target state are skipped. Every operation runs even
    /// if one fails; the first failure is returned and successful ones are kept.
    pub async fn perform_all(
        &self,
        operation: ContainerOperation,
        kinds: Option<&[ContainerKind]>,
    ) -> DockerResult<()> {
        self.require_ready()?;

        let kinds = match kinds {
            Some(kinds) => kinds.to_vec(),
            None => self.config.get_required_kinds().clone(),
        };
        let records = kinds
            .iter()
            .map(|kind| self.record_for(*kind))
            .collect::<DockerResult<Vec<_>>>()?;

        let results = future::join_all(
            records
                .into_iter()
                .map(|record| self.perform_one(operation, record)),
        )
        .await;

        results
            .into_iter()
            .collect::<DockerResult<()>>()
            .stage(ManagerStage::Operation)
    }

    /// Waits until every required container is running.
    pub async fn wait_until_running(&self, timeout: Option<Duration>) -> DockerResult<()> {
        self.require_ready()?;

        let timeout = timeout.unwrap_or(*self.config.get_running_timeout());
        let mut receivers = self
            .config
            .get_required_kinds()
            .iter()
            .map(|kind| self.record_for(*kind).map(|record| record.subscribe()))
            .collect::<DockerResult<Vec<_>>>()?;

        let wait = async {
            for receiver in receivers.iter_mut() {
                let running = receiver
                    .wait_for(|state| *state == ContainerState::Running)
                    .await
                    .is_ok();
                if !running {
                    return Err(DockerError::Cancelled);
                }
            }
            Ok(())
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| DockerError::from(TransportError::Timeout(timeout)))?
            .stage(ManagerStage::Operation)
    }

    /// Waits until the database accepts connections, polling with `psql`.
    pub async fn wait_until_db_running(&self) -> DockerResult<()> {
        self.require_ready()?;

        let db = self.database_record()?;
        let command: Vec<String> = DB_CHECK_COMMAND.iter().map(|s| s.to_string()).collect();
        let attempts = *self.config.get_db_connect_attempts();

        for attempt in 1..=attempts {
            match self.api.exec_command(&command, &db).await {
                Ok(output) if output.success() => {
                    tracing::info!("database is accepting connections");
                    return Ok(());
                }
                Ok(output) => tracing::debug!(
                    "database not ready ({attempt}/{attempts}): exit code {:?}",
                    output.get_exit_code()
                ),
                Err(e) => tracing::debug!("database not ready ({attempt}/{attempts}): {e}"),
            }

            if attempt < attempts {
                tokio::time::sleep(*self.config.get_db_connect_delay()).await;
            }
        }

        Err(DockerError::custom(anyhow::anyhow!(
            "database did not accept connections after {attempts} attempts"
        ))
        .at(ManagerStage::Operation))
    }

    /// Dumps the database to `path`. Returns the number of bytes written.
    pub async fn backup_database(&self, path: impl AsRef<Path>) -> DockerResult<u64> {
        self.require_ready()?;

        let db = self.database_record()?;
        let command: Vec<String> = DB_BACKUP_COMMAND.iter().map(|s| s.to_string()).collect();
        let output = self
            .api
            .exec_command(&command, &db)
            .await
            .stage(ManagerStage::Operation)?;

        if !output.success() {
            return Err(DockerError::custom(anyhow::anyhow!(
                "pg_dump exited with {:?}: {}",
                output.get_exit_code(),
                String::from_utf8_lossy(output.get_stderr()).trim()
            ))
            .at(ManagerStage::Operation));
        }

        let path = path.as_ref();
        tokio::fs::write(path, output.get_stdout()).await?;
        tracing::info!("backed up database to {}", path.display());
        Ok(output.get_stdout().len() as u64)
    }

    /// Reads the log of the container of `kind`.
    pub async fn fetch_log(&self, kind: ContainerKind) -> DockerResult<Vec<LogEntry>> {
        self.require_ready()?;
        let record = self.existing_record(kind)?;
        self.api.fetch_log(&record).await.stage(ManagerStage::Operation)
    }

    /// Follows the log of the container of `kind`.
    pub async fn stream_log(&self, kind: ContainerKind) -> DockerResult<LogEntryStream> {
        self.require_ready()?;
        let record = self.existing_record(kind)?;
        self.api.stream_log(&record).await.stage(ManagerStage::Operation)
    }

    /// Stops the event subscription.
    pub fn shutdown(&self) {
        if let Some(monitor) = self.monitor().take() {
            monitor.stop();
        }
    }

    async fn run_initialization(&self, refresh_image_info: bool) -> DockerResult<()> {
        self.set_state(ManagerState::VersionChecking);
        let version = self
            .api
            .load_version()
            .await
            .stage(ManagerStage::VersionCheck)?;
        let required = *self.config.get_required_api_version();
        if !version.supports(required) {
            return Err(DockerError::IncompatibleVersion {
                found: version.get_api_version(),
                required,
            }
            .at(ManagerStage::VersionCheck));
        }
        tracing::info!("connected to {version}");
        self.engine().version = Some(version);

        if *self.config.get_monitor_events() {
            self.start_event_monitor();
        }

        self.set_state(ManagerState::ImageInfoChecking);
        let image_info = self
            .check_image_info(refresh_image_info)
            .await
            .stage(ManagerStage::ImageInfoCheck)?;
        self.engine().image_info = Some(image_info);

        self.set_state(ManagerState::ContainerInitializing);
        async {
            self.ensure_network().await?;
            self.ensure_volumes().await?;
            self.load_containers().await?;
            self.refresh_images().await
        }
        .await
        .stage(ManagerStage::ContainerInit)
    }

    /// Picks the newest of the cached, bundled and (when due) remote manifests. A failed fetch
    /// is logged and the previous manifest is kept.
    async fn check_image_info(&self, refresh: bool) -> DockerResult<RequiredImageInfo> {
        let cached = self.store.load().await;
        let mut current = cached.as_ref().map(|cached| cached.get_info().clone());

        match ImageInfoStore::bundled() {
            Ok(bundled) if bundled.newer_than(current.as_ref()) => current = Some(bundled),
            Ok(_) => {}
            Err(e) => tracing::warn!("bundled manifest is invalid: {e}"),
        }

        let interval = *self.config.get_update_interval();
        let due = refresh
            || *self.config.get_force_update_check()
            || cached.as_ref().map_or(true, |cached| {
                Utc::now()
                    .signed_duration_since(*cached.get_last_check())
                    .to_std()
                    .is_ok_and(|elapsed| elapsed >= interval)
            });

        if !due {
            tracing::debug!("image manifest checked recently, not fetching");
        } else {
            match self.fetch_image_info().await {
                Ok(remote) => {
                    self.engine().manifest_error = None;
                    if remote.newer_than(current.as_ref()) {
                        tracing::info!("using image manifest version {}", remote.get_version());
                        current = Some(remote);
                    }
                    if let Some(info) = &current {
                        let cached = CachedImageInfo::new(Utc::now(), info.clone());
                        if let Err(e) = self.store.save(&cached).await {
                            tracing::warn!("could not save manifest cache: {e}");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("could not fetch image manifest, using cached copy: {e}");
                    self.engine().manifest_error = Some(e.to_string());
                }
            }
        }

        current.ok_or_else(|| DockerError::Decoding("no image manifest available".to_string()))
    }

    async fn fetch_image_info(&self) -> DockerResult<RequiredImageInfo> {
        let value = self.api.fetch_json(self.config.get_image_info_url()).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn ensure_network(&self) -> DockerResult<()> {
        let name = self.config.get_network_name();
        if !self.api.network_exists(name).await? {
            self.api.create_network(name).await?;
        }
        Ok(())
    }

    async fn ensure_volumes(&self) -> DockerResult<()> {
        for name in self.config.get_volume_names() {
            if !self.api.volume_exists(name).await? {
                self.api.create_volume(name).await?;
            }
        }
        Ok(())
    }

    /// Lists the containers and merges them into the table, with a placeholder for every
    /// required kind the engine does not have.
    async fn load_containers(&self) -> DockerResult<Vec<ContainerChange>> {
        let required = self.config.get_required_kinds();
        let mut fresh: Vec<ContainerRecord> = self
            .api
            .refresh_containers(None)
            .await?
            .into_iter()
            .filter(|record| required.contains(&record.kind()))
            .collect();

        for kind in required {
            if !fresh.iter().any(|record| record.kind() == *kind) {
                fresh.push(ContainerRecord::not_available(*kind));
            }
        }

        Ok(self.table.merge(fresh))
    }

    async fn perform_one(
        &self,
        operation: ContainerOperation,
        record: Arc<ContainerRecord>,
    ) -> DockerResult<()> {
        let _guard = record.lock_operations().await;

        let state = record.state();
        if operation.is_noop_for(state) {
            tracing::debug!("skipping {operation} on {}: already {state}", record.kind());
            return Ok(());
        }
        if !state.exists() {
            return Err(DockerError::InvalidArgument(format!(
                "cannot {operation} {}: the container does not exist",
                record.kind()
            )));
        }

        self.api.perform(operation, &record).await?;
        self.table
            .set_state(record.kind(), operation.resulting_state());
        Ok(())
    }

    fn start_event_monitor(&self) {
        let mut monitor = self.monitor();
        if monitor.as_ref().is_some_and(EventMonitor::is_running) {
            return;
        }
        *monitor = Some(EventMonitor::spawn(Arc::clone(&self.api), self.table.clone()));
    }

    fn require_ready(&self) -> DockerResult<()> {
        let state = self.state();
        if state.is_ready() {
            Ok(())
        } else {
            Err(DockerError::NotReady(state))
        }
    }

    fn record_for(&self, kind: ContainerKind) -> DockerResult<Arc<ContainerRecord>> {
        self.table
            .get(kind)
            .ok_or_else(|| DockerError::InvalidArgument(format!("no {kind} container is managed")))
    }

    fn existing_record(&self, kind: ContainerKind) -> DockerResult<Arc<ContainerRecord>> {
        let record = self.record_for(kind)?;
        if record.state().exists() {
            Ok(record)
        } else {
            Err(DockerError::InvalidArgument(format!(
                "the {kind} container does not exist"
            )))
        }
    }

    /// The container running postgres: the database server, or the combined image.
    fn database_record(&self) -> DockerResult<Arc<ContainerRecord>> {
        self.table
            .get(ContainerKind::Database)
            .or_else(|| self.table.get(ContainerKind::Combined))
            .filter(|record| record.state().exists())
            .ok_or_else(|| {
                DockerError::InvalidArgument("no database container exists".to_string())
            })
    }

    fn set_state(&self, state: ManagerState) {
        tracing::debug!("docker manager: {state}");
        self.state.send_replace(state);
    }

    fn engine(&self) -> MutexGuard<'_, EngineSnapshot> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn monitor(&self) -> MutexGuard<'_, Option<EventMonitor>> {
        self.monitor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl std::fmt::Debug for DockerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerManager")
            .field("state", &self.state())
            .field("containers", &self.table)
            .finish_non_exhaustive()
    }
}

impl Drop for DockerManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
