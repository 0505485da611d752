/// Convenience result type used across reelsmith.
pub type ReelResult<T> = Result<T, ReelError>;

/// Top-level error taxonomy used by engine APIs.
///
/// Every variant carries enough context to tell which pipeline stage failed;
/// none of them is retried internally. A whole `compose` run is the caller's
/// unit of retry.
#[derive(thiserror::Error, Debug)]
pub enum ReelError {
    /// Invalid caller-provided data (bad canvas, zero-duration narration, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Zero or negative narration duration handed to the timing segmenter.
    #[error("invalid narration duration: {0}")]
    InvalidDuration(String),

    /// Background media that cannot be probed or decoded.
    #[error("incompatible media: {0}")]
    IncompatibleMedia(String),

    /// Subtitle style name that does not match any preset.
    #[error("unknown subtitle style '{0}'")]
    UnknownStyle(String),

    /// Unrecoverable encoder failure while writing the output file.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Propagated failure from a script source collaborator.
    #[error("content generation error: {0}")]
    ContentGeneration(String),

    /// Propagated failure from a speech synthesis collaborator.
    #[error("speech synthesis error: {0}")]
    Synthesis(String),

    /// The background folder is empty or a named clip is missing.
    #[error("no background video found: {0}")]
    NoBackgroundFound(String),

    /// Errors when serializing or deserializing data structures.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReelError {
    /// Build a [`ReelError::InvalidInput`] value.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Build a [`ReelError::InvalidDuration`] value.
    pub fn invalid_duration(msg: impl Into<String>) -> Self {
        Self::InvalidDuration(msg.into())
    }

    /// Build a [`ReelError::IncompatibleMedia`] value.
    pub fn incompatible_media(msg: impl Into<String>) -> Self {
        Self::IncompatibleMedia(msg.into())
    }

    /// Build a [`ReelError::UnknownStyle`] value.
    pub fn unknown_style(msg: impl Into<String>) -> Self {
        Self::UnknownStyle(msg.into())
    }

    /// Build a [`ReelError::Encoding`] value.
    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    /// Build a [`ReelError::ContentGeneration`] value.
    pub fn content_generation(msg: impl Into<String>) -> Self {
        Self::ContentGeneration(msg.into())
    }

    /// Build a [`ReelError::Synthesis`] value.
    pub fn synthesis(msg: impl Into<String>) -> Self {
        Self::Synthesis(msg.into())
    }

    /// Build a [`ReelError::NoBackgroundFound`] value.
    pub fn no_background(msg: impl Into<String>) -> Self {
        Self::NoBackgroundFound(msg.into())
    }

    /// Build a [`ReelError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}
