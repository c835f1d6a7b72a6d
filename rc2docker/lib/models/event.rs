use std::collections::HashMap;

use chrono::{DateTime, Utc};
use getset::Getters;
use serde::Deserialize;

use crate::DockerResult;

use super::{ContainerKind, ContainerState};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The object an engine event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// A container.
    Container,

    /// An image.
    Image,

    /// A volume.
    Volume,

    /// A network.
    Network,

    /// The daemon itself.
    Daemon,

    /// A plugin.
    Plugin,
}

/// One event from `GET /events`.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct EngineEvent {
    /// What the event is about.
    event_type: EventType,

    /// The action, e.g. `start` or `die`. Detail suffixes such as `exec_start: bash` are
    /// stripped.
    action: String,

    /// The id of the object.
    actor_id: String,

    /// The object's attributes (`name`, `image`, ...).
    attributes: HashMap<String, String>,

    /// When the event happened.
    time: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "Type")]
    event_type: String,
    #[serde(rename = "Action")]
    action: String,
    #[serde(rename = "Actor", default)]
    actor: Option<RawActor>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    time: Option<i64>,
}

#[derive(Deserialize)]
struct RawActor {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(rename = "Attributes", default)]
    attributes: HashMap<String, String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl EngineEvent {
    /// Creates an event.
    pub fn new(
        event_type: EventType,
        action: impl Into<String>,
        actor_id: impl Into<String>,
        attributes: HashMap<String, String>,
    ) -> Self {
        Self {
            event_type,
            action: action.into(),
            actor_id: actor_id.into(),
            attributes,
            time: None,
        }
    }

    /// Parses one NDJSON line of the event stream. Events of an unknown type yield `None`.
    pub fn parse(line: &[u8]) -> DockerResult<Option<Self>> {
        let raw: RawEvent = serde_json::from_slice(line)?;

        let event_type = match raw.event_type.as_str() {
            "container" => EventType::Container,
            "image" => EventType::Image,
            "volume" => EventType::Volume,
            "network" => EventType::Network,
            "daemon" => EventType::Daemon,
            "plugin" => EventType::Plugin,
            _ => return Ok(None),
        };

        let action = raw
            .action
            .split(':')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();

        let (actor_id, attributes) = match raw.actor {
            Some(actor) => (actor.id, actor.attributes),
            None => (String::new(), HashMap::new()),
        };
        let actor_id = if actor_id.is_empty() {
            raw.id.unwrap_or_default()
        } else {
            actor_id
        };

        Ok(Some(Self {
            event_type,
            action,
            actor_id,
            attributes,
            time: raw.time.and_then(|t| DateTime::from_timestamp(t, 0)),
        }))
    }

    /// The `name` attribute, if present.
    pub fn name(&self) -> Option<&str> {
        self.attributes.get("name").map(String::as_str)
    }

    /// The kind of container this event is about, derived from the image or container name.
    pub fn container_kind(&self) -> Option<ContainerKind> {
        if self.event_type != EventType::Container {
            return None;
        }

        self.attributes
            .get("image")
            .and_then(|image| ContainerKind::from_image_name(image))
            .or_else(|| self.name().and_then(ContainerKind::from_container_name))
    }

    /// The state a container event moves the container to, if it changes the state.
    pub fn container_state(&self) -> Option<ContainerState> {
        if self.event_type != EventType::Container {
            return None;
        }

        match self.action.as_str() {
            "start" | "unpause" | "restart" => Some(ContainerState::Running),
            "die" | "stop" => Some(ContainerState::Exited),
            "pause" => Some(ContainerState::Paused),
            "destroy" => Some(ContainerState::NotAvailable),
            _ => None,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
