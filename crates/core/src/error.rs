/// Result alias that carries the custom [`PreviewError`] type.
pub type Result<T> = std::result::Result<T, PreviewError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    /// None of the requested codecs could be opened on this host. The sink
    /// stays idle when this is returned.
    #[error("no supported codec available (tried: {})", tried.join(", "))]
    NoSupportedCodec { tried: Vec<String> },
    /// A recording session is already active.
    #[error("a recording session is already active")]
    AlreadyRecording,
    /// The encoder collaborator rejected or failed an operation.
    #[error("encoder: {0}")]
    Encoder(String),
    /// Configuration values that cannot drive the pipeline.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl PreviewError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for PreviewError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for PreviewError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
