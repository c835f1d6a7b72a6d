//! Environment variables that override the built-in defaults.

use std::{env, path::PathBuf};

use crate::{
    config::{DEFAULT_IMAGE_INFO_BASE_URL, DEFAULT_RC2DOCKER_HOME, IMAGE_INFO_FILENAME},
    transport::Endpoint,
    DockerResult,
};

use super::{
    DOCKER_HOST_ENV_VAR, IMAGE_INFO_URL_ENV_VAR, RC2DOCKER_HOME_ENV_VAR,
    SKIP_UPDATE_CACHE_ENV_VAR,
};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the path where rc2docker state is stored.
///
/// Uses `RC2DOCKER_HOME` if set, otherwise `~/.rc2docker`.
pub fn get_rc2docker_home_path() -> PathBuf {
    match env::var(RC2DOCKER_HOME_ENV_VAR) {
        Ok(path) if !path.is_empty() => PathBuf::from(path),
        _ => DEFAULT_RC2DOCKER_HOME.to_path_buf(),
    }
}

/// Returns the docker engine endpoint from `DOCKER_HOST`, or the default unix socket.
pub fn get_docker_host() -> DockerResult<Endpoint> {
    match env::var(DOCKER_HOST_ENV_VAR) {
        Ok(host) if !host.is_empty() => Ok(host.parse()?),
        _ => Ok(Endpoint::default()),
    }
}

/// Returns the full url of the required image manifest.
///
/// `RC2_IMAGE_INFO_URL` replaces the base url; the manifest file name is appended to it.
pub fn get_image_info_url() -> String {
    let base = env::var(IMAGE_INFO_URL_ENV_VAR)
        .ok()
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| DEFAULT_IMAGE_INFO_BASE_URL.to_string());

    if base.ends_with('/') {
        format!("{base}{IMAGE_INFO_FILENAME}")
    } else {
        format!("{base}/{IMAGE_INFO_FILENAME}")
    }
}

/// Returns true if `RC2_SKIP_UPDATE_CACHE` is set.
pub fn skip_update_cache() -> bool {
    env::var_os(SKIP_UPDATE_CACHE_ENV_VAR).is_some()
}
