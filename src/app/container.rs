use std::sync::Arc;
use tracing::{debug, info};

use crate::adapters::CompositeBackend;
use crate::app::{
    concat_interactor::ConcatInteractor, inspect_interactor::InspectInteractor,
    profiles_interactor::ProfilesInteractor, transcode_interactor::TranscodeInteractor,
};
use crate::config::Settings;
use crate::domain::ProfileRegistry;
use crate::error::ShiftXResult;
use crate::ports::MediaBackend;

pub trait AppContainer: Send + Sync {
    fn settings(&self) -> &Settings;
    fn transcode_interactor(&self) -> Arc<TranscodeInteractor>;
    fn concat_interactor(&self) -> Arc<ConcatInteractor>;
    fn inspect_interactor(&self) -> Arc<InspectInteractor>;
    fn profiles_interactor(&self) -> Arc<ProfilesInteractor>;
}

pub struct DefaultAppContainer {
    settings: Settings,
    transcode_interactor: Arc<TranscodeInteractor>,
    concat_interactor: Arc<ConcatInteractor>,
    inspect_interactor: Arc<InspectInteractor>,
    profiles_interactor: Arc<ProfilesInteractor>,
}

impl DefaultAppContainer {
    /// Wire the default backends and the profiles found in the configured directories
    pub fn new(settings: Settings) -> ShiftXResult<Self> {
        let backend = CompositeBackend::with_defaults(settings.threads)?;
        info!("Media backends: {}", backend.names().join(", "));
        Self::with_backend(settings, Arc::new(backend))
    }

    /// Wire the interactors around an explicit backend
    pub fn with_backend(settings: Settings, backend: Arc<dyn MediaBackend>) -> ShiftXResult<Self> {
        let profiles = Arc::new(load_profiles(&settings)?);

        let transcode_interactor = Arc::new(TranscodeInteractor::new(
            Arc::clone(&backend),
            Arc::clone(&profiles),
        ));
        let concat_interactor = Arc::new(ConcatInteractor::new(Arc::clone(&transcode_interactor)));
        let inspect_interactor = Arc::new(InspectInteractor::new(Arc::clone(&backend)));
        let profiles_interactor = Arc::new(ProfilesInteractor::new(Arc::clone(&profiles)));

        Ok(Self {
            settings,
            transcode_interactor,
            concat_interactor,
            inspect_interactor,
            profiles_interactor,
        })
    }
}

/// Built-in presets overridden by the profile directories, in order
fn load_profiles(settings: &Settings) -> ShiftXResult<ProfileRegistry> {
    let mut registry = ProfileRegistry::with_builtins();
    for dir in &settings.profile_dirs {
        let loaded = registry.load_dir(dir)?;
        debug!("Loaded {} profile(s) from {}", loaded, dir.display());
    }
    Ok(registry)
}

impl AppContainer for DefaultAppContainer {
    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn transcode_interactor(&self) -> Arc<TranscodeInteractor> {
        Arc::clone(&self.transcode_interactor)
    }

    fn concat_interactor(&self) -> Arc<ConcatInteractor> {
        Arc::clone(&self.concat_interactor)
    }

    fn inspect_interactor(&self) -> Arc<InspectInteractor> {
        Arc::clone(&self.inspect_interactor)
    }

    fn profiles_interactor(&self) -> Arc<ProfilesInteractor> {
        Arc::clone(&self.profiles_interactor)
    }
}
