//! Configuration types and defaults for the docker manager.

mod defaults;
mod manager;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use defaults::*;
pub use manager::*;
