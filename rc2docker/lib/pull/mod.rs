//! Pulling images with progress reporting.

mod operation;
mod progress;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use operation::*;
pub use progress::*;
