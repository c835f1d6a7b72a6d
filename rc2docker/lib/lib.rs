//! `rc2docker` provisions, monitors and controls the Rc2 service containers on a local Docker
//! engine.
//!
//! # Overview
//!
//! The crate talks to the engine's REST API over its Unix socket and keeps the database,
//! application and compute containers in the state a required-image manifest describes. It
//! handles:
//! - Engine version gating
//! - Required image manifest caching and refresh
//! - Network and volume provisioning
//! - Image pulls with per-layer progress
//! - Container lifecycle operations
//! - Engine event monitoring
//!
//! # Architecture
//!
//! - **Transport**: HTTP/1.1 over a Unix (or TCP) socket, with NDJSON and multiplexed log framing
//! - **API**: typed engine operations behind the [`api::DockerApi`] trait
//! - **Pull**: a cancellable pull operation aggregating layer progress
//! - **Models**: containers, images, the manifest and engine events
//! - **Manager**: staged initialization and concurrent lifecycle dispatch
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use rc2docker::{config::ManagerConfig, manager::DockerManager, models::ContainerOperation};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let manager = DockerManager::new(ManagerConfig::from_env()?)?;
//!
//!     if manager.initialize(false).await? {
//!         manager
//!             .pull_images(CancellationToken::new(), |progress| {
//!                 println!("{}: {:.0}%", progress.get_image(), progress.fraction() * 100.0);
//!             })
//!             .await?;
//!     }
//!
//!     manager.prepare_containers().await?;
//!     manager.perform_all(ContainerOperation::Start, None).await?;
//!     manager.wait_until_running(None).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`api`] - Engine operations and the client implementing them
//! - [`cli`] - Command-line interface and argument parsing
//! - [`config`] - Manager configuration and defaults
//! - [`manager`] - Orchestration and state tracking
//! - [`models`] - Domain types
//! - [`pull`] - Image pulls and progress
//! - [`transport`] - The socket transport and stream framing
//! - [`utils`] - Environment and path helpers

#![warn(missing_docs)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod api;
pub mod cli;
pub mod config;
pub mod manager;
pub mod models;
pub mod pull;
pub mod transport;
pub mod utils;

pub use error::*;
