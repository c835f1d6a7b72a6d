//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The sub directory of the user's home where rc2docker state is stored.
pub const RC2DOCKER_HOME_DIR: &str = ".rc2docker";

/// Environment variable overriding the endpoint of the docker engine.
pub const DOCKER_HOST_ENV_VAR: &str = "DOCKER_HOST";

/// Environment variable overriding the base url of the image manifest.
pub const IMAGE_INFO_URL_ENV_VAR: &str = "RC2_IMAGE_INFO_URL";

/// Environment variable that, when set, disables the manifest update cooldown.
pub const SKIP_UPDATE_CACHE_ENV_VAR: &str = "RC2_SKIP_UPDATE_CACHE";

/// Environment variable overriding the rc2docker state directory.
pub const RC2DOCKER_HOME_ENV_VAR: &str = "RC2DOCKER_HOME";
