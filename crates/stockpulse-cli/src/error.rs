use stockpulse_core::{DataError, StoreError, ValidationError};
use stockpulse_warehouse::WarehouseError;
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("{failed} of {total} symbols failed")]
    BatchFailures { failed: usize, total: usize },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) | Self::Usage(_) => 2,
            Self::Data(DataError::StoreUnavailable { .. }) => 6,
            Self::Data(_) | Self::BatchFailures { .. } => 3,
            Self::Store(StoreError::Unavailable(_)) => 6,
            Self::Store(_) => 3,
            Self::Warehouse(_) => 6,
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_category() {
        assert_eq!(CliError::Usage(String::from("no symbols")).exit_code(), 2);
        assert_eq!(CliError::BatchFailures { failed: 1, total: 3 }.exit_code(), 3);
        assert_eq!(
            CliError::Store(StoreError::Unavailable(String::from("locked"))).exit_code(),
            6
        );
        assert_eq!(
            CliError::Store(StoreError::Rejected(String::from("bad row"))).exit_code(),
            3
        );
        assert_eq!(
            CliError::Io(std::io::Error::other("disk full")).exit_code(),
            10
        );
    }
}
