use std::{path::PathBuf, sync::LazyLock, time::Duration};

use crate::{models::ApiVersion, utils::RC2DOCKER_HOME_DIR};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The unix socket the docker engine listens on by default.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/docker.sock";

/// The oldest engine API version the manager will talk to.
pub const REQUIRED_API_VERSION: ApiVersion = ApiVersion::new(1, 24);

/// The bridge network the service containers are attached to.
pub const DEFAULT_NETWORK_NAME: &str = "rc2server";

/// The named volumes the service containers mount.
pub const DEFAULT_VOLUME_NAMES: [&str; 2] = ["rc2_dbdata", "rc2_userlib"];

/// Label attached to every container and volume created by the manager.
pub const CONTAINER_LABEL: &str = "rc2.live";

/// The docker hub organization the service images are published under.
pub const IMAGE_ORGANIZATION: &str = "rc2server";

/// Prefix of the engine-side container names (`rc2_dbserver`, ...).
pub const CONTAINER_NAME_PREFIX: &str = "rc2_";

/// The base url the required image manifest is published under.
pub const DEFAULT_IMAGE_INFO_BASE_URL: &str = "https://www.rc2.io/";

/// The file name of the required image manifest.
pub const IMAGE_INFO_FILENAME: &str = "imageInfo.json";

/// The file the last-known-good manifest is cached in.
pub const IMAGE_INFO_CACHE_FILENAME: &str = "image_info_cache.json";

/// The minimum time between two manifest checks.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(86_400);

/// How long to wait for all containers to reach the running state.
pub const DEFAULT_RUNNING_TIMEOUT: Duration = Duration::from_secs(90);

/// The default timeout for buffered engine requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How many times to try connecting to the database before giving up.
pub const DB_CONNECT_MAX_ATTEMPTS: u32 = 10;

/// The delay between two database connection attempts.
pub const DB_CONNECT_ATTEMPT_DELAY: Duration = Duration::from_secs(3);

/// The manifest shipped with the crate, used when nothing has been cached yet.
pub const BUNDLED_IMAGE_INFO: &str = include_str!("../../assets/image_info.json");

/// The path where all rc2docker state is stored.
pub static DEFAULT_RC2DOCKER_HOME: LazyLock<PathBuf> = LazyLock::new(|| {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(RC2DOCKER_HOME_DIR)
});

/// The timeout for running a command to completion inside a container.
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(600);
