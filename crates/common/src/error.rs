//! Error types shared across Hudburn crates.

use std::path::PathBuf;

/// Top-level error type for Hudburn operations.
#[derive(Debug, thiserror::Error)]
pub enum HudburnError {
    /// Telemetry bytes that could not be decoded at all.
    #[error("Telemetry parse error: {message}")]
    Parse { message: String },

    /// The leading source tag of a binary telemetry file is absent or unreadable.
    #[error("Malformed telemetry header: {message}")]
    MalformedHeader { message: String },

    /// Zero usable telemetry frames were decoded.
    #[error("Telemetry file contains no usable frames")]
    EmptyTrack,

    /// The requested font variant's asset files are absent.
    #[error("Font not found: {path}")]
    FontNotFound { path: PathBuf },

    #[error("Font error: {message}")]
    Font { message: String },

    /// No hardware or software encoder candidate survived probing.
    #[error("No usable video encoder found: {message}")]
    NoEncoderAvailable { message: String },

    /// The external encoder process failed; `diagnostic` is its stderr verbatim.
    #[error("Encoder process failed ({status}): {diagnostic}")]
    EncoderProcessFailed { status: String, diagnostic: String },

    /// I/O failure on the overlay frame channel into the encoder.
    #[error("Overlay channel I/O error: {message}")]
    ChannelIo { message: String },

    /// Terminal state for an externally cancelled job. Not a failure.
    #[error("Job cancelled")]
    Cancelled,

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Pipeline error: {message}")]
    Pipeline { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using HudburnError.
pub type HudburnResult<T> = Result<T, HudburnError>;

impl HudburnError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    pub fn malformed_header(msg: impl Into<String>) -> Self {
        Self::MalformedHeader {
            message: msg.into(),
        }
    }

    pub fn font(msg: impl Into<String>) -> Self {
        Self::Font {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn pipeline(msg: impl Into<String>) -> Self {
        Self::Pipeline {
            message: msg.into(),
        }
    }

    pub fn channel_io(msg: impl Into<String>) -> Self {
        Self::ChannelIo {
            message: msg.into(),
        }
    }

    pub fn no_encoder(msg: impl Into<String>) -> Self {
        Self::NoEncoderAvailable {
            message: msg.into(),
        }
    }

    /// Whether this error leaves a partial result the caller may still use
    /// (partial telemetry track, partial output file).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Parse { .. } | Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors_leave_partial_results() {
        assert!(HudburnError::Cancelled.is_recoverable());
        assert!(HudburnError::parse("bad frame").is_recoverable());

        assert!(!HudburnError::EmptyTrack.is_recoverable());
        assert!(!HudburnError::pipeline("spawn failed").is_recoverable());
        assert!(!HudburnError::EncoderProcessFailed {
            status: "exit status: 1".into(),
            diagnostic: String::new(),
        }
        .is_recoverable());
    }
}
