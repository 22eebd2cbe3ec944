use std::path::Path;

/// Convenience result type used across reelstack.
pub type ReelResult<T> = Result<T, ReelError>;

/// Top-level error taxonomy used by every pipeline stage.
#[derive(thiserror::Error, Debug)]
pub enum ReelError {
    /// Invalid caller-provided parameters or configuration.
    #[error("validation error: {0}")]
    Validation(String),

    /// A media input could not be opened or probed.
    #[error("asset unreadable: {0}")]
    AssetUnreadable(String),

    /// A still image could not be decoded.
    #[error("image unreadable: {0}")]
    ImageUnreadable(String),

    /// A video stream could not be opened for decoding.
    #[error("stream open error: {0}")]
    StreamOpen(String),

    /// Foreground and background durations differ beyond tolerance.
    #[error("duration mismatch: foreground {foreground_secs:.3}s vs background {background_secs:.3}s")]
    DurationMismatch {
        /// Foreground duration in seconds.
        foreground_secs: f64,
        /// Background duration in seconds.
        background_secs: f64,
    },

    /// Content selection exhausted its attempt budget.
    #[error("no eligible content after {attempts} attempts")]
    NoEligibleContent {
        /// Number of draws made before giving up.
        attempts: u32,
    },

    /// A collaborator returned output in an unexpected shape.
    #[error("metadata format error: {0}")]
    MetadataFormat(String),

    /// The encoder process failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReelError {
    /// Build a [`ReelError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`ReelError::AssetUnreadable`] value for `path`.
    pub fn asset_unreadable(path: &Path, reason: impl std::fmt::Display) -> Self {
        Self::AssetUnreadable(format!("'{}': {reason}", path.display()))
    }

    /// Build a [`ReelError::ImageUnreadable`] value for `path`.
    pub fn image_unreadable(path: &Path, reason: impl std::fmt::Display) -> Self {
        Self::ImageUnreadable(format!("'{}': {reason}", path.display()))
    }

    /// Build a [`ReelError::StreamOpen`] value for `path`.
    pub fn stream_open(path: &Path, reason: impl std::fmt::Display) -> Self {
        Self::StreamOpen(format!("'{}': {reason}", path.display()))
    }

    /// Build a [`ReelError::MetadataFormat`] value.
    pub fn metadata_format(msg: impl Into<String>) -> Self {
        Self::MetadataFormat(msg.into())
    }

    /// Build a [`ReelError::Encode`] value.
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Short stable label, used for per-kind failure counters.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::AssetUnreadable(_) => "asset_unreadable",
            Self::ImageUnreadable(_) => "image_unreadable",
            Self::StreamOpen(_) => "stream_open",
            Self::DurationMismatch { .. } => "duration_mismatch",
            Self::NoEligibleContent { .. } => "no_eligible_content",
            Self::MetadataFormat(_) => "metadata_format",
            Self::Encode(_) => "encode",
            Self::Other(_) => "other",
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
