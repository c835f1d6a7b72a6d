//! The engine api client.
//!
//! [`DockerApi`] is the seam the manager talks through; [`DockerClient`] implements it on top of
//! a [`Transport`](crate::transport::Transport).

mod client;
mod docker_api;
mod payloads;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use client::*;
pub use docker_api::*;
