// Adapters - Media library implementations of the ports

pub mod wav;
#[cfg(feature = "libav")]
pub mod libav;

pub use wav::WavBackend;
#[cfg(feature = "libav")]
pub use libav::LibavBackend;

use std::path::Path;
use tracing::debug;

use crate::domain::{MediaInfo, Profile, StreamDescriptor};
use crate::error::{ShiftXError, ShiftXResult};
use crate::ports::{ContainerWriter, MediaBackend, PacketSource, StreamTransform};

/// Dispatches every call to the first backend that handles the path
#[derive(Default)]
pub struct CompositeBackend {
    backends: Vec<Box<dyn MediaBackend>>,
}

impl CompositeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// WAVE support, plus FFmpeg when built with the `libav` feature
    ///
    /// `threads` sizes the FFmpeg decoders.
    #[allow(unused_variables)]
    pub fn with_defaults(threads: usize) -> ShiftXResult<Self> {
        #[allow(unused_mut)]
        let mut backend = Self::new().with(WavBackend::new());
        #[cfg(feature = "libav")]
        {
            backend = backend.with(LibavBackend::new()?.with_threads(threads));
        }
        Ok(backend)
    }

    pub fn with(mut self, backend: impl MediaBackend + 'static) -> Self {
        self.backends.push(Box::new(backend));
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    fn select(&self, path: &Path) -> ShiftXResult<&dyn MediaBackend> {
        let backend = self
            .backends
            .iter()
            .find(|backend| backend.handles(path))
            .ok_or_else(|| ShiftXError::ProbeError {
                message: format!(
                    "no backend handles {} (available: {})",
                    path.display(),
                    self.names().join(", ")
                ),
            })?;
        debug!("Using {} backend for {}", backend.name(), path.display());
        Ok(backend.as_ref())
    }
}

impl MediaBackend for CompositeBackend {
    fn name(&self) -> &'static str {
        "composite"
    }

    fn handles(&self, path: &Path) -> bool {
        self.backends.iter().any(|backend| backend.handles(path))
    }

    fn probe(&self, path: &Path) -> ShiftXResult<MediaInfo> {
        self.select(path)?.probe(path)
    }

    fn open_source(&self, descriptor: &StreamDescriptor) -> ShiftXResult<Box<dyn PacketSource>> {
        self.select(descriptor.source())?.open_source(descriptor)
    }

    fn open_transform(
        &self,
        descriptor: &StreamDescriptor,
        profile: &Profile,
    ) -> ShiftXResult<Box<dyn StreamTransform>> {
        self.select(descriptor.source())?
            .open_transform(descriptor, profile)
    }

    fn create_writer(&self, path: &Path) -> ShiftXResult<Box<dyn ContainerWriter>> {
        self.select(path)?.create_writer(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_include_wav() {
        let backend = CompositeBackend::with_defaults(1).unwrap();
        assert_eq!(backend.names()[0], "wav");
        assert!(backend.handles(Path::new("in.wav")));
    }

    #[test]
    fn test_unhandled_path_reports_backends() {
        let backend = CompositeBackend::new().with(WavBackend::new());
        let err = backend.probe(Path::new("movie.mkv")).unwrap_err();
        assert!(matches!(err, ShiftXError::ProbeError { .. }));
        assert!(err.to_string().contains("available: wav"));
    }

    #[test]
    fn test_empty_composite_handles_nothing() {
        let backend = CompositeBackend::new();
        assert!(!backend.handles(Path::new("in.wav")));
        assert!(backend.create_writer(Path::new("out.wav")).is_err());
    }
}
