//! The transport adapter.
//!
//! Turns an [`EngineRequest`] into HTTP/1.1 over a unix domain socket (or plain tcp) and hands
//! back either a fully buffered [`EngineResponse`] or a lazy stream of body chunks. Nothing in
//! here knows about containers.

mod connection;
mod endpoint;
mod frames;
mod lines;
mod request;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use connection::*;
pub use endpoint::*;
pub use frames::*;
pub use lines::*;
pub use request::*;
