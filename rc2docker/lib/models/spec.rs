use std::collections::BTreeMap;

use getset::Getters;
use serde::Serialize;
use serde_json::Value;

use crate::config::CONTAINER_LABEL;

use super::ContainerKind;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The body of a `POST /containers/create` request for one service container.
#[derive(Debug, Clone, PartialEq, Serialize, Getters)]
#[serde(rename_all = "PascalCase")]
#[getset(get = "pub with_prefix")]
pub struct ContainerSpec {
    /// The kind the container will have.
    #[serde(skip)]
    kind: ContainerKind,

    /// The container name, passed as the `name` query parameter.
    #[serde(skip)]
    name: String,

    /// The tagged image to run.
    image: String,

    /// Labels attached to the container.
    labels: BTreeMap<String, String>,

    /// Ports the container listens on, as `port/proto` keys.
    exposed_ports: BTreeMap<String, Value>,

    /// Host-side settings.
    host_config: HostConfig,
}

/// The `HostConfig` section of a create request.
#[derive(Debug, Clone, PartialEq, Serialize, Getters)]
#[serde(rename_all = "PascalCase")]
#[getset(get = "pub with_prefix")]
pub struct HostConfig {
    /// `volume:path` binds.
    binds: Vec<String>,

    /// The network the container joins.
    network_mode: String,

    /// Container ports published on the host.
    port_bindings: BTreeMap<String, Vec<PortBinding>>,
}

/// A host port a container port is published on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortBinding {
    /// The host port.
    #[serde(rename = "HostPort")]
    pub host_port: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ContainerSpec {
    /// The default spec for `kind`, running `image` on `network`.
    pub fn for_kind(
        kind: ContainerKind,
        image: impl Into<String>,
        network: impl Into<String>,
    ) -> Self {
        let port = format!("{}/tcp", service_port(kind));

        let mut port_bindings = BTreeMap::new();
        if publishes_port(kind) {
            port_bindings.insert(
                port.clone(),
                vec![PortBinding {
                    host_port: service_port(kind).to_string(),
                }],
            );
        }

        Self {
            kind,
            name: kind.container_name(),
            image: image.into(),
            labels: BTreeMap::from([(CONTAINER_LABEL.to_string(), String::new())]),
            exposed_ports: BTreeMap::from([(port, Value::Object(Default::default()))]),
            host_config: HostConfig {
                binds: volume_binds(kind),
                network_mode: network.into(),
                port_bindings,
            },
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn service_port(kind: ContainerKind) -> u16 {
    match kind {
        ContainerKind::Database => 5432,
        ContainerKind::AppServer | ContainerKind::Combined => 8088,
        ContainerKind::Compute => 7714,
    }
}

/// Only the app server is reached from the host; the others talk over the network.
fn publishes_port(kind: ContainerKind) -> bool {
    matches!(kind, ContainerKind::AppServer | ContainerKind::Combined)
}

fn volume_binds(kind: ContainerKind) -> Vec<String> {
    let dbdata = "rc2_dbdata:/rc2/dbdata".to_string();
    let userlib = "rc2_userlib:/rc2/userlib".to_string();
    match kind {
        ContainerKind::Database => vec![dbdata],
        ContainerKind::AppServer | ContainerKind::Compute => vec![userlib],
        ContainerKind::Combined => vec![dbdata, userlib],
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_spec_appserver_body() -> anyhow::Result<()> {
        let spec = ContainerSpec::for_kind(
            ContainerKind::AppServer,
            "rc2server/appserver:0.4.3",
            "rc2server",
        );

        assert_eq!(spec.get_name(), "rc2_appserver");
        assert_eq!(
            serde_json::to_value(&spec)?,
            json!({
                "Image": "rc2server/appserver:0.4.3",
                "Labels": {"rc2.live": ""},
                "ExposedPorts": {"8088/tcp": {}},
                "HostConfig": {
                    "Binds": ["rc2_userlib:/rc2/userlib"],
                    "NetworkMode": "rc2server",
                    "PortBindings": {"8088/tcp": [{"HostPort": "8088"}]}
                }
            })
        );
        Ok(())
    }

    #[test]
    fn test_spec_database_is_not_published() {
        let spec =
            ContainerSpec::for_kind(ContainerKind::Database, "rc2server/dbserver:0.5", "net");

        assert_eq!(spec.get_image(), "rc2server/dbserver:0.5");
        assert!(spec.get_host_config().get_port_bindings().is_empty());
        assert_eq!(
            spec.get_host_config().get_binds(),
            &vec!["rc2_dbdata:/rc2/dbdata".to_string()]
        );
    }
}
