use std::{path::PathBuf, time::Duration};

use getset::Getters;
use typed_builder::TypedBuilder;

use crate::{
    config::{
        DB_CONNECT_ATTEMPT_DELAY, DB_CONNECT_MAX_ATTEMPTS, DEFAULT_NETWORK_NAME,
        DEFAULT_REQUEST_TIMEOUT, DEFAULT_RUNNING_TIMEOUT, DEFAULT_UPDATE_INTERVAL,
        DEFAULT_VOLUME_NAMES, REQUIRED_API_VERSION,
    },
    models::{ApiVersion, ContainerKind},
    transport::Endpoint,
    utils::env,
    DockerResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Settings for a [`DockerManager`](crate::manager::DockerManager).
///
/// Every field has a default, so `ManagerConfig::builder().build()` yields a configuration that
/// talks to the local engine socket and the public manifest server.
#[derive(Debug, Clone, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ManagerConfig {
    /// Where the docker engine listens.
    #[builder(default)]
    endpoint: Endpoint,

    /// The full url of the required image manifest.
    #[builder(default = env::get_image_info_url(), setter(into))]
    image_info_url: String,

    /// The container kinds the manager provisions.
    #[builder(default = ContainerKind::SERVICES.to_vec())]
    required_kinds: Vec<ContainerKind>,

    /// The oldest engine API version accepted.
    #[builder(default = REQUIRED_API_VERSION)]
    required_api_version: ApiVersion,

    /// The network the containers are attached to.
    #[builder(default = DEFAULT_NETWORK_NAME.to_string(), setter(into))]
    network_name: String,

    /// The named volumes that must exist before containers are created.
    #[builder(default = DEFAULT_VOLUME_NAMES.iter().map(|v| v.to_string()).collect())]
    volume_names: Vec<String>,

    /// Minimum time between two manifest fetches.
    #[builder(default = DEFAULT_UPDATE_INTERVAL)]
    update_interval: Duration,

    /// Ignore the update interval and always fetch the manifest.
    #[builder(default = env::skip_update_cache())]
    force_update_check: bool,

    /// Timeout applied to buffered engine requests.
    #[builder(default = DEFAULT_REQUEST_TIMEOUT)]
    request_timeout: Duration,

    /// How long `wait_until_running` waits before failing.
    #[builder(default = DEFAULT_RUNNING_TIMEOUT)]
    running_timeout: Duration,

    /// How many times `wait_until_db_running` tries to connect.
    #[builder(default = DB_CONNECT_MAX_ATTEMPTS)]
    db_connect_attempts: u32,

    /// The delay between two database connection attempts.
    #[builder(default = DB_CONNECT_ATTEMPT_DELAY)]
    db_connect_delay: Duration,

    /// Directory the manifest cache is stored in.
    #[builder(default = env::get_rc2docker_home_path(), setter(into))]
    home_dir: PathBuf,

    /// Subscribe to the engine event stream once the version check passes.
    #[builder(default = true)]
    monitor_events: bool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ManagerConfig {
    /// Creates a configuration using the environment overrides (`DOCKER_HOST`,
    /// `RC2_IMAGE_INFO_URL`, `RC2_SKIP_UPDATE_CACHE`, `RC2DOCKER_HOME`).
    pub fn from_env() -> DockerResult<Self> {
        let endpoint = env::get_docker_host()?;
        Ok(Self::builder().endpoint(endpoint).build())
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
