//! Value types shared by the api client, the pull operation and the manager.

mod container;
mod event;
mod image;
mod image_info;
mod record;
mod reference;
mod spec;
mod version;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use container::*;
pub use event::*;
pub use image::*;
pub use image_info::*;
pub use record::*;
pub use reference::*;
pub use spec::*;
pub use version::*;
