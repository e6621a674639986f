//! Error handling module for ShiftX

use thiserror::Error;

/// Main error type for ShiftX operations
#[derive(Error, Debug)]
pub enum ShiftXError {
    /// Input file not found or inaccessible
    #[error("Input file not found: {path}")]
    InputFileNotFound { path: String },

    /// Requested stream index does not exist in the source
    #[error("Invalid stream reference {path}#{index}: {reason}")]
    InvalidStreamReference {
        path: String,
        index: usize,
        reason: String,
    },

    /// Encoding profile name is not registered
    #[error("Unknown encoding profile: {name}")]
    UnknownProfile { name: String },

    /// Profile targets another kind of stream
    #[error("Profile {profile} is for {expected} streams, but {path}#{index} is {actual}")]
    ProfileMismatch {
        profile: String,
        expected: String,
        actual: String,
        path: String,
        index: usize,
    },

    /// Streams sharing an output slot disagree on their codec parameters
    #[error("Output slot {slot} cannot hold both {first} and {second}")]
    IncompatibleSlot {
        slot: usize,
        first: String,
        second: String,
    },

    /// Packet could not be read from the source
    #[error("Failed to read {path}: {message}")]
    ReadError { path: String, message: String },

    /// Decode or encode failure
    #[error("Transform failed: {message}")]
    TransformError { message: String },

    /// A packet would break the per-slot timestamp ordering
    #[error("Timestamp order violation on slot {slot}: {current} after {previous}")]
    TimestampOrderError {
        slot: usize,
        previous: i64,
        current: i64,
    },

    /// Output container failure
    #[error("Failed to write output: {message}")]
    MuxError { message: String },

    /// Output file already present and overwriting is not allowed
    #[error("Output file already exists: {path}")]
    OutputExists { path: String },

    /// Settings or job description error
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Codec registry initialization error
    #[error("Failed to initialize codec registry: {message}")]
    CodecRegistryError { message: String },

    /// Media probe error
    #[error("Failed to probe media file: {message}")]
    ProbeError { message: String },

    /// Job interrupted between two packets
    #[error("Operation cancelled")]
    Cancelled,

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// FFmpeg error
    #[cfg(feature = "libav")]
    #[error("FFmpeg error: {0}")]
    FFmpegError(#[from] ffmpeg_next::Error),
}

impl ShiftXError {
    /// Shorthand for a transform failure
    pub fn transform(message: impl Into<String>) -> Self {
        ShiftXError::TransformError {
            message: message.into(),
        }
    }

    /// Shorthand for a container write failure
    pub fn mux(message: impl Into<String>) -> Self {
        ShiftXError::MuxError {
            message: message.into(),
        }
    }

    /// Shorthand for a configuration failure
    pub fn config(message: impl Into<String>) -> Self {
        ShiftXError::ConfigError {
            message: message.into(),
        }
    }

    /// Shorthand for a read failure on `path`
    pub fn read(path: impl Into<String>, message: impl Into<String>) -> Self {
        ShiftXError::ReadError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Errors that compromise the output container and must abort the job
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ShiftXError::TimestampOrderError { .. }
                | ShiftXError::MuxError { .. }
                | ShiftXError::IoError(_)
        )
    }
}

/// Result type alias for ShiftX operations
pub type ShiftXResult<T> = std::result::Result<T, ShiftXError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(ShiftXError::TimestampOrderError {
            slot: 0,
            previous: 10,
            current: 5
        }
        .is_fatal());
        assert!(ShiftXError::mux("disk full").is_fatal());
        assert!(!ShiftXError::transform("bad payload").is_fatal());
        assert!(!ShiftXError::read("a.wav", "truncated").is_fatal());
    }

    #[test]
    fn test_error_messages() {
        let err = ShiftXError::InvalidStreamReference {
            path: "in.wav".to_string(),
            index: 3,
            reason: "file has 1 stream".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid stream reference in.wav#3: file has 1 stream"
        );

        let err = ShiftXError::UnknownProfile {
            name: "nope".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown encoding profile: nope");
    }
}
