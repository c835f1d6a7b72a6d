//! Wire shapes of the engine's json requests and responses.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    models::{ContainerDetails, ContainerKind, ContainerRecord, ContainerState, Mount},
    DockerResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// One row of `GET /containers/json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct ContainerSummary {
    pub(super) id: String,
    #[serde(default)]
    pub(super) names: Vec<String>,
    #[serde(default)]
    pub(super) image: String,
    #[serde(rename = "ImageID", default)]
    pub(super) image_id: String,
    pub(super) state: String,
    #[serde(default)]
    pub(super) mounts: Vec<Mount>,
}

/// The body of `GET /containers/{id}/json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct ContainerInspect {
    pub(super) id: String,
    #[serde(default)]
    pub(super) name: String,
    /// The image id.
    #[serde(default)]
    pub(super) image: String,
    pub(super) config: InspectConfig,
    pub(super) state: InspectState,
    #[serde(default)]
    pub(super) mounts: Vec<Mount>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct InspectConfig {
    /// The image name the container was created from.
    #[serde(default)]
    pub(super) image: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct InspectState {
    pub(super) status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct IdResponse {
    pub(super) id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct NamedObject {
    pub(super) name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct VolumeList {
    #[serde(default)]
    pub(super) volumes: Option<Vec<NamedObject>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct ExecInspect {
    #[serde(default)]
    pub(super) exit_code: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct NetworkCreate<'a> {
    pub(super) name: &'a str,
    pub(super) driver: &'a str,
    pub(super) internal: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct VolumeCreate<'a> {
    pub(super) name: &'a str,
    pub(super) labels: HashMap<&'a str, &'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct ExecCreate<'a> {
    pub(super) attach_stdout: bool,
    pub(super) attach_stderr: bool,
    pub(super) tty: bool,
    pub(super) cmd: &'a [String],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct ExecStart {
    pub(super) detach: bool,
    pub(super) tty: bool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ContainerSummary {
    /// The container name without the leading `/`.
    fn name(&self) -> String {
        self.names
            .first()
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_default()
    }

    /// Converts the row into a record, or `None` if it is not a service container.
    pub(super) fn into_record(self) -> DockerResult<Option<ContainerRecord>> {
        let name = self.name();
        let Some(kind) = ContainerKind::from_image_name(&self.image)
            .or_else(|| ContainerKind::from_container_name(&name))
        else {
            tracing::debug!("ignoring container {name} with image {}", self.image);
            return Ok(None);
        };

        let state: ContainerState = self.state.parse()?;
        let details = ContainerDetails {
            id: self.id,
            name,
            image_id: self.image_id,
            image_name: self.image,
            mounts: self.mounts,
        };

        Ok(Some(ContainerRecord::new(kind, details, state)))
    }
}

impl ContainerInspect {
    /// Converts the inspect body into a record, or `None` if it is not a service container.
    pub(super) fn into_record(self) -> DockerResult<Option<ContainerRecord>> {
        let name = self.name.trim_start_matches('/').to_string();
        let Some(kind) = ContainerKind::from_image_name(&self.config.image)
            .or_else(|| ContainerKind::from_container_name(&name))
        else {
            return Ok(None);
        };

        let state: ContainerState = self.state.status.parse()?;
        let details = ContainerDetails {
            id: self.id,
            name,
            image_id: self.image,
            image_name: self.config.image,
            mounts: self.mounts,
        };

        Ok(Some(ContainerRecord::new(kind, details, state)))
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_kind_falls_back_to_container_name() -> anyhow::Result<()> {
        let rows: Vec<ContainerSummary> = serde_json::from_str(
            r#"[
                {"Id":"1","Names":["/rc2_dbserver"],"Image":"rc2server/dbserver:0.4","ImageID":"sha256:db","State":"running","Mounts":[]},
                {"Id":"2","Names":["/rc2_compute"],"Image":"sha256:0123","ImageID":"sha256:c","State":"exited"},
                {"Id":"3","Names":["/web"],"Image":"nginx","ImageID":"sha256:n","State":"running"}
            ]"#,
        )?;
        let records: Vec<_> = rows
            .into_iter()
            .map(ContainerSummary::into_record)
            .collect::<DockerResult<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind(), ContainerKind::Database);
        assert_eq!(records[0].name(), "rc2_dbserver");
        assert_eq!(records[0].state(), ContainerState::Running);
        assert_eq!(records[1].kind(), ContainerKind::Compute);
        assert_eq!(records[1].image_id(), "sha256:c");
        Ok(())
    }

    #[test]
    fn test_inspect_into_record() -> anyhow::Result<()> {
        let body: ContainerInspect = serde_json::from_str(
            r#"{"Id":"abc","Name":"/rc2_appserver","Image":"sha256:app","Config":{"Image":"rc2server/appserver:0.4.3"},"State":{"Status":"created","Running":false},"Mounts":[]}"#,
        )?;
        let record = body.into_record()?.unwrap();

        assert_eq!(record.kind(), ContainerKind::AppServer);
        assert_eq!(record.state(), ContainerState::Created);
        assert_eq!(record.image_id(), "sha256:app");
        assert_eq!(record.details().image_name, "rc2server/appserver:0.4.3");
        Ok(())
    }
}
