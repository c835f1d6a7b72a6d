use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    api::DockerApi,
    models::{EngineEvent, EventType},
};

use super::{ContainerChange, ContainerTable};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A running event subscription. Dropping it stops the task.
#[derive(Debug)]
pub(crate) struct EventMonitor {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl EventMonitor {
    /// Subscribes to the engine's events and applies container events to `table` until
    /// cancelled or the stream ends.
    pub(crate) fn spawn(api: Arc<dyn DockerApi>, table: ContainerTable) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(api, table, cancel.clone()));
        Self { cancel, task }
    }

    /// Returns true while the subscription is alive.
    pub(crate) fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub(crate) fn stop(&self) {
        self.cancel.cancel();
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Drop for EventMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

async fn run(api: Arc<dyn DockerApi>, table: ContainerTable, cancel: CancellationToken) {
    let mut events = tokio::select! {
        _ = cancel.cancelled() => return,
        result = api.events() => match result {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!("could not subscribe to engine events: {e}");
                return;
            }
        },
    };

    tracing::info!("monitoring engine events");
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = events.next() => next,
        };

        match next {
            Some(Ok(event)) => {
                apply_event(&table, &event);
            }
            Some(Err(e)) => {
                tracing::warn!("engine event stream failed: {e}");
                break;
            }
            None => {
                tracing::info!("engine event stream closed");
                break;
            }
        }
    }
}

/// Applies a container event to the matching record.
///
/// Events for containers the table does not track, or for a different container of a tracked
/// kind, are ignored.
pub(crate) fn apply_event(table: &ContainerTable, event: &EngineEvent) -> Option<ContainerChange> {
    if *event.get_event_type() != EventType::Container {
        tracing::trace!("ignoring {:?} event {}", event.get_event_type(), event.get_action());
        return None;
    }

    let kind = event.container_kind()?;
    let state = event.container_state()?;
    let record = table.get(kind)?;

    let id = record.id();
    let actor = event.get_actor_id();
    let same_container = !id.is_empty()
        && !actor.is_empty()
        && (id.starts_with(actor.as_str()) || actor.starts_with(&id));
    if !same_container {
        tracing::debug!(
            "ignoring {} event for untracked container {}",
            event.get_action(),
            event.get_actor_id()
        );
        return None;
    }

    tracing::info!("{kind} {} -> {state}", event.get_action());
    table.set_state(kind, state)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
