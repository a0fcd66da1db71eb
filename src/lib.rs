/// Road Analyzer - video ingestion and frame sampling service
///
/// Accepts uploaded road survey footage, samples frames at a fixed stride and
/// returns a per-upload defect report.

pub mod config;
pub mod decoder;
pub mod detection;
pub mod processing;
pub mod sampler;

#[cfg(feature = "api")]
pub mod api;

use std::path::PathBuf;

// Re-export main types for easy access
pub use crate::config::{Config, ConfigBuilder};
pub use crate::decoder::{DecoderBackend, DecoderKind, FfmpegBackend, Frame, FrameDecoder, SyntheticBackend};
pub use crate::detection::{DefectCounts, DefectDetector, MockDetector};
pub use crate::processing::{IngestionCoordinator, IngestionReport, TransientFile};
pub use crate::sampler::{FrameSample, FrameSampler, SamplingPolicy};

/// Result type for analyzer operations
pub type Result<T> = std::result::Result<T, AnalyzerError>;

/// Why a video source could not be opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnreadableReason {
    /// Path does not exist
    NotFound,
    /// File exists but is corrupt or in an unsupported format
    Undecodable,
}

impl std::fmt::Display for UnreadableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnreadableReason::NotFound => write!(f, "not found"),
            UnreadableReason::Undecodable => write!(f, "corrupt or unsupported"),
        }
    }
}

/// Error types for analyzer operations
#[derive(thiserror::Error, Debug)]
pub enum AnalyzerError {
    #[error("{0}")]
    MissingUpload(String),

    #[error("Video source {reason}: {path} ({detail})")]
    SourceUnreadable {
        path: PathBuf,
        reason: UnreadableReason,
        detail: String,
    },

    #[error("Invalid sampling policy: {0}")]
    InvalidPolicy(String),

    #[error("Decode error: {0}")]
    DecodeFault(String),

    #[error("Cleanup failed for {path}: {source}")]
    CleanupFault {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AnalyzerError {
    pub(crate) fn unreadable(
        path: impl Into<PathBuf>,
        reason: UnreadableReason,
        detail: impl Into<String>,
    ) -> Self {
        AnalyzerError::SourceUnreadable {
            path: path.into(),
            reason,
            detail: detail.into(),
        }
    }
}
