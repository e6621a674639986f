// Domain layer - Media model, profiles and stream descriptors

pub mod descriptor;
pub mod model;
pub mod profile;

pub use descriptor::{StreamDescriptor, StreamRequest};
pub use model::*;
pub use profile::{Profile, ProfileRegistry};
