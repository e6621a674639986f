//! ShiftX Library
//!
//! Rewraps or transcodes streams selected from several media files into one
//! output container, applying a signed time offset to each stream.
//!
//! ```no_run
//! use shiftx_cli::adapters::WavBackend;
//! use shiftx_cli::app::{TranscodeInteractor, TranscodeRequest};
//! use shiftx_cli::domain::{ProfileRegistry, StreamRequest};
//! use shiftx_cli::engine::NoProgress;
//! use std::sync::Arc;
//!
//! let _registry = shiftx_cli::initialize_codec_registry()?;
//! let interactor = TranscodeInteractor::new(
//!     Arc::new(WavBackend::new()),
//!     Arc::new(ProfileRegistry::with_builtins()),
//! );
//! let request = TranscodeRequest::new(
//!     vec![StreamRequest::new("music.wav").with_offset(10.0)],
//!     "shifted.wav",
//! );
//! let report = interactor.execute(&request, &mut NoProgress)?;
//! println!("{}", report.summary());
//! # Ok::<(), shiftx_cli::ShiftXError>(())
//! ```

pub mod adapters;
pub mod app;
pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ports;
pub mod utils;

use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

// Re-export commonly used types
pub use domain::{MediaInfo, Packet, Profile, ProfileRegistry, StreamDescriptor, StreamInfo, StreamRequest};
pub use engine::{ProcessReport, Transcoder};
pub use error::{ShiftXError, ShiftXResult};

static REGISTRY_USERS: AtomicUsize = AtomicUsize::new(0);

/// Handle on the initialized codec and format registry
///
/// The registry is released when the last handle is dropped or torn down.
#[derive(Debug)]
pub struct CodecRegistry {
    _private: (),
}

/// Initialize the codec and format registry of the linked media libraries
pub fn initialize_codec_registry() -> ShiftXResult<CodecRegistry> {
    #[cfg(feature = "libav")]
    ffmpeg_next::init().map_err(|e| ShiftXError::CodecRegistryError {
        message: e.to_string(),
    })?;

    let users = REGISTRY_USERS.fetch_add(1, Ordering::SeqCst) + 1;
    debug!("Codec registry initialized ({} handle(s))", users);
    Ok(CodecRegistry { _private: () })
}

impl CodecRegistry {
    /// Whether a registry handle is alive
    pub fn is_initialized() -> bool {
        REGISTRY_USERS.load(Ordering::SeqCst) > 0
    }

    /// Release this handle now
    pub fn teardown(self) {}
}

impl Drop for CodecRegistry {
    fn drop(&mut self) {
        if REGISTRY_USERS.fetch_sub(1, Ordering::SeqCst) == 1 {
            #[cfg(feature = "libav")]
            ffmpeg_next::format::network::deinit();
            debug!("Codec registry released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_guard() {
        let first = initialize_codec_registry().unwrap();
        let second = initialize_codec_registry().unwrap();
        assert!(CodecRegistry::is_initialized());
        first.teardown();
        assert!(CodecRegistry::is_initialized());
        drop(second);
    }
}
