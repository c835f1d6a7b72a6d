use std::sync::{PoisonError, RwLock, RwLockReadGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex, MutexGuard};

use super::{ContainerKind, ContainerState};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A mount point of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Mount {
    /// The volume name, empty for bind mounts.
    #[serde(default)]
    pub name: String,

    /// The path on the host.
    #[serde(default)]
    pub source: String,

    /// The path inside the container.
    pub destination: String,

    /// Whether the mount is writable.
    #[serde(rename = "RW", default)]
    pub read_write: bool,
}

/// The engine-reported fields of a container that can change between refreshes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerDetails {
    /// The engine-assigned id.
    pub id: String,

    /// The engine-side name, without the leading `/`.
    pub name: String,

    /// The id of the image the container was created from.
    pub image_id: String,

    /// The image name the container was created from.
    pub image_name: String,

    /// The mount points.
    pub mounts: Vec<Mount>,
}

/// A container known to the manager.
///
/// Records are shared as `Arc<ContainerRecord>` and updated in place, so anyone holding one
/// (or a receiver from [`subscribe`](Self::subscribe)) keeps seeing its current state. The kind
/// never changes. Only the manager mutates records.
#[derive(Debug)]
pub struct ContainerRecord {
    kind: ContainerKind,
    details: RwLock<ContainerDetails>,
    state: watch::Sender<ContainerState>,
    operation_lock: Mutex<()>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ContainerRecord {
    /// Creates a record.
    pub fn new(kind: ContainerKind, details: ContainerDetails, state: ContainerState) -> Self {
        Self {
            kind,
            details: RwLock::new(details),
            state: watch::Sender::new(state),
            operation_lock: Mutex::new(()),
        }
    }

    /// Creates the placeholder record for a kind with no container on the engine.
    pub fn not_available(kind: ContainerKind) -> Self {
        let details = ContainerDetails {
            name: kind.container_name(),
            ..Default::default()
        };
        Self::new(kind, details, ContainerState::NotAvailable)
    }

    /// The kind of the container.
    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    /// The engine-assigned id. Empty for a placeholder.
    pub fn id(&self) -> String {
        self.read().id.clone()
    }

    /// The engine-side name.
    pub fn name(&self) -> String {
        self.read().name.clone()
    }

    /// The id of the image the container runs.
    pub fn image_id(&self) -> String {
        self.read().image_id.clone()
    }

    /// A snapshot of the engine-reported fields.
    pub fn details(&self) -> ContainerDetails {
        self.read().clone()
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ContainerState {
        *self.state.borrow()
    }

    /// Returns a receiver that observes every state change of this record.
    pub fn subscribe(&self) -> watch::Receiver<ContainerState> {
        self.state.subscribe()
    }

    /// The name the engine api should address this container by: its id when known, otherwise
    /// its name.
    pub fn target(&self) -> String {
        let details = self.read();
        if details.id.is_empty() {
            details.name.clone()
        } else {
            details.id.clone()
        }
    }

    /// Waits until no other operation is running on this container and holds it until the guard
    /// is dropped.
    pub async fn lock_operations(&self) -> MutexGuard<'_, ()> {
        self.operation_lock.lock().await
    }

    /// Sets the state, returning the previous one if it changed.
    pub(crate) fn set_state(&self, state: ContainerState) -> Option<ContainerState> {
        let mut previous = None;
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            previous = Some(std::mem::replace(current, state));
            true
        });
        previous
    }

    /// Copies the engine-reported fields and state of `other` into this record, returning the
    /// previous state if it changed.
    pub(crate) fn update_from(&self, other: &ContainerRecord) -> Option<ContainerState> {
        let details = other.details();
        *self.details.write().unwrap_or_else(PoisonError::into_inner) = details;
        self.set_state(other.state())
    }

    /// Replaces the engine-reported fields.
    pub(crate) fn set_details(&self, details: ContainerDetails) {
        *self.details.write().unwrap_or_else(PoisonError::into_inner) = details;
    }

    fn read(&self) -> RwLockReadGuard<'_, ContainerDetails> {
        self.details.read().unwrap_or_else(PoisonError::into_inner)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
