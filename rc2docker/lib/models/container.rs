use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    config::{CONTAINER_NAME_PREFIX, IMAGE_ORGANIZATION},
    DockerError,
};

use super::ImageReference;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The role a container plays, independent of its engine-assigned name or id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContainerKind {
    /// The postgres database server.
    #[serde(rename = "dbserver")]
    Database,

    /// The application (websocket/REST) server.
    #[serde(rename = "appserver")]
    AppServer,

    /// The R compute engine.
    #[serde(rename = "compute")]
    Compute,

    /// A single image bundling all services.
    #[serde(rename = "combined")]
    Combined,
}

/// The lifecycle state of a container.
///
/// `NotAvailable` is never reported by the engine. It marks a kind with no container yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    /// Created but never started.
    Created,

    /// Running.
    Running,

    /// Paused.
    Paused,

    /// Being restarted by the engine.
    Restarting,

    /// Stopped.
    Exited,

    /// Being removed.
    Removing,

    /// No container of this kind exists.
    #[default]
    #[serde(rename = "notAvailable")]
    NotAvailable,
}

/// A lifecycle operation that can be performed on a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerOperation {
    /// Start a created or stopped container.
    Start,

    /// Stop a running container.
    Stop,

    /// Freeze a running container.
    Pause,

    /// Thaw a paused container.
    Resume,

    /// Stop then start a container.
    Restart,

    /// Delete a container.
    Remove,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ContainerKind {
    /// The kinds provisioned by default, in start order.
    pub const SERVICES: [ContainerKind; 3] = [
        ContainerKind::Database,
        ContainerKind::AppServer,
        ContainerKind::Compute,
    ];

    /// Every kind.
    pub const ALL: [ContainerKind; 4] = [
        ContainerKind::Database,
        ContainerKind::AppServer,
        ContainerKind::Compute,
        ContainerKind::Combined,
    ];

    /// The short name used in image and container names.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerKind::Database => "dbserver",
            ContainerKind::AppServer => "appserver",
            ContainerKind::Compute => "compute",
            ContainerKind::Combined => "combined",
        }
    }

    /// Derives the kind from an image name such as `rc2server/dbserver:0.4`.
    ///
    /// A registry host in front of the organization (`docker.io/rc2server/dbserver`) is ignored.
    /// Images outside the `rc2server` organization, or with an unknown name, have no kind.
    pub fn from_image_name(image: &str) -> Option<Self> {
        let mut segments = image.rsplit('/');
        let name = segments.next()?;
        let organization = segments.next()?;
        let reference: ImageReference = format!("{organization}/{name}").parse().ok()?;
        if reference.get_repository().as_deref() != Some(IMAGE_ORGANIZATION) {
            return None;
        }

        reference.get_name().parse().ok()
    }

    /// Derives the kind from an engine container name such as `/rc2_dbserver`.
    pub fn from_container_name(name: &str) -> Option<Self> {
        name.trim_start_matches('/')
            .strip_prefix(CONTAINER_NAME_PREFIX)?
            .parse()
            .ok()
    }

    /// The engine-side container name, e.g. `rc2_dbserver`.
    pub fn container_name(&self) -> String {
        format!("{CONTAINER_NAME_PREFIX}{}", self.as_str())
    }

    /// The untagged image name, e.g. `rc2server/dbserver`.
    pub fn image_name(&self) -> String {
        format!("{IMAGE_ORGANIZATION}/{}", self.as_str())
    }
}

impl ContainerState {
    /// Returns true if a container exists on the engine.
    pub fn exists(&self) -> bool {
        *self != ContainerState::NotAvailable
    }
}

impl ContainerOperation {
    /// The path segment the engine uses for this operation. `Remove` has none since it is a
    /// `DELETE` of the container itself.
    pub fn action(&self) -> Option<&'static str> {
        match self {
            ContainerOperation::Start => Some("start"),
            ContainerOperation::Stop => Some("stop"),
            ContainerOperation::Pause => Some("pause"),
            ContainerOperation::Resume => Some("unpause"),
            ContainerOperation::Restart => Some("restart"),
            ContainerOperation::Remove => None,
        }
    }

    /// Returns true if performing this operation in `state` would change nothing.
    pub fn is_noop_for(&self, state: ContainerState) -> bool {
        use ContainerState::*;
        match self {
            ContainerOperation::Start => state == Running,
            ContainerOperation::Stop => matches!(state, Exited | Created | NotAvailable),
            ContainerOperation::Pause => matches!(state, Paused | NotAvailable),
            ContainerOperation::Resume => matches!(state, Running | NotAvailable),
            ContainerOperation::Restart => false,
            ContainerOperation::Remove => state == NotAvailable,
        }
    }

    /// The state the container is expected to be in once the engine accepts the operation.
    pub fn resulting_state(&self) -> ContainerState {
        match self {
            ContainerOperation::Start
            | ContainerOperation::Resume
            | ContainerOperation::Restart => ContainerState::Running,
            ContainerOperation::Stop => ContainerState::Exited,
            ContainerOperation::Pause => ContainerState::Paused,
            ContainerOperation::Remove => ContainerState::NotAvailable,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerKind {
    type Err = DockerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dbserver" => Ok(ContainerKind::Database),
            "appserver" => Ok(ContainerKind::AppServer),
            "compute" => Ok(ContainerKind::Compute),
            "combined" => Ok(ContainerKind::Combined),
            _ => Err(DockerError::InvalidArgument(format!(
                "unknown container kind: {s}"
            ))),
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContainerState::Created => "created",
            ContainerState::Running => "running",
            ContainerState::Paused => "paused",
            ContainerState::Restarting => "restarting",
            ContainerState::Exited => "exited",
            ContainerState::Removing => "removing",
            ContainerState::NotAvailable => "notAvailable",
        };
        f.write_str(s)
    }
}

impl FromStr for ContainerState {
    type Err = DockerError;

    /// Parses the engine's `State` field. `dead` is folded into `exited`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(ContainerState::Created),
            "running" => Ok(ContainerState::Running),
            "paused" => Ok(ContainerState::Paused),
            "restarting" => Ok(ContainerState::Restarting),
            "exited" | "dead" => Ok(ContainerState::Exited),
            "removing" => Ok(ContainerState::Removing),
            "notAvailable" => Ok(ContainerState::NotAvailable),
            _ => Err(DockerError::Decoding(format!("unknown container state: {s}"))),
        }
    }
}

impl fmt::Display for ContainerOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContainerOperation::Start => "start",
            ContainerOperation::Stop => "stop",
            ContainerOperation::Pause => "pause",
            ContainerOperation::Resume => "resume",
            ContainerOperation::Restart => "restart",
            ContainerOperation::Remove => "remove",
        };
        f.write_str(s)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
