use thiserror::Error;
use tickstore_warehouse::WarehouseError;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] tickstore_core::ValidationError),

    #[error(transparent)]
    Store(#[from] WarehouseError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Store(WarehouseError::InvalidArgument(_)) => 2,
            Self::Store(WarehouseError::NotFound { .. }) => 3,
            Self::Store(error) if error.is_rate_limited() => 6,
            Self::Store(WarehouseError::Source(_)) => 7,
            Self::Store(_) => 8,
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
        }
    }

    /// Follow-up advice printed under the error message.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Store(WarehouseError::NotFound { .. }) => {
                Some("no local data yet; run `tickstore fetch <SYMBOL>` first")
            }
            Self::Store(error) if error.is_rate_limited() => Some(
                "the provider is throttling requests; wait a few minutes and reduce request frequency",
            ),
            _ => None,
        }
    }
}
