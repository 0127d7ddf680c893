use parcelport_core::{CarrierError, CoreError, HttpError, ValidationError};
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] CoreError),

    #[error("usage error: {0}")]
    Usage(String),

    #[error(transparent)]
    Carrier(#[from] CarrierError),

    #[error("transport setup failed: {0}")]
    Transport(#[from] HttpError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) | Self::Usage(_) => 2,
            Self::Config(CoreError::ConfigIo { .. }) => 10,
            Self::Config(_) => 2,
            Self::Carrier(error) if error.retryable() => 4,
            Self::Carrier(_) => 3,
            Self::Transport(_) | Self::Serialization(_) | Self::Io(_) => 10,
        }
    }
}
