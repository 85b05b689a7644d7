use lens_api::{BackendError, InvalidPartition};

/// Rejections raised by the Configuration Gate before the backend is called.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("broker address is empty")]
    EmptyBroker,

    #[error("topic is empty")]
    EmptyTopic,

    #[error("unknown security type '{0}' (expected plaintext, ssl, sasl_plaintext or sasl_ssl)")]
    UnknownSecurityType(String),

    #[error("structured decoding requires a message type")]
    MissingMessageType,

    #[error("structured decoding requires schema files or a descriptor key")]
    MissingSchema,

    #[error("no schema files provided")]
    NoSchemaFiles,

    #[error("{0}")]
    InvalidPartition(#[from] InvalidPartition),

    #[error("settings ({context}): {detail}")]
    Settings { context: &'static str, detail: String },
}

/// Errors surfaced by controller operations.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("no configuration applied")]
    NotConfigured,

    #[error("{0} is not allowed while streaming")]
    Streaming(&'static str),

    #[error("no streaming session is active")]
    NotStreaming,

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("{op}: {source}")]
    Backend {
        op: &'static str,
        #[source]
        source: BackendError,
    },
}

impl ControllerError {
    pub(crate) fn backend(op: &'static str) -> impl FnOnce(BackendError) -> Self {
        move |source| ControllerError::Backend { op, source }
    }

    /// The backend error behind this failure, if any.
    pub fn backend_error(&self) -> Option<&BackendError> {
        match self {
            ControllerError::Backend { source, .. } => Some(source),
            _ => None,
        }
    }
}
