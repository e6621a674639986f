// Application layer - Use case interactors

pub mod concat_interactor;
pub mod container;
pub mod inspect_interactor;
pub mod profiles_interactor;
pub mod transcode_interactor;

// Re-export interactors
pub use concat_interactor::{ConcatInteractor, ConcatRequest};
pub use container::{AppContainer, DefaultAppContainer};
pub use inspect_interactor::{InspectFormat, InspectInteractor};
pub use profiles_interactor::ProfilesInteractor;
pub use transcode_interactor::{PlannedStream, TranscodeInteractor, TranscodeRequest};
