//! The orchestration manager.
//!
//! [`DockerManager`] drives initialization (version gating, manifest refresh, network, volume and
//! container discovery) and dispatches lifecycle operations once ready. The container table it
//! owns is shared with callers only as read-only records and change notifications.

mod docker_manager;
mod image_store;
mod monitor;
mod state;
mod table;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use docker_manager::*;
pub use image_store::*;
pub use state::*;
pub use table::*;
