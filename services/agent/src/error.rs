//! Error types for the agent.

use std::io;
use std::path::PathBuf;

use tapbridge_networking::NetworkError;
use thiserror::Error;

use crate::command::CommandError;

/// Errors surfaced by guest interface operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The request is missing or carries malformed guest data.
    #[error("{0}")]
    Validation(String),

    /// An external tool failed.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// The switch tool printed something we could not decode.
    #[error("unexpected switch output: {message}")]
    Parse { message: String, raw: String },

    /// No free interface name is left.
    #[error(transparent)]
    AllocationExhausted(NetworkError),

    /// The host interface list could not be read.
    #[error(transparent)]
    LinkTable(NetworkError),

    /// Reading or writing a netdev definition failed.
    #[error("netdev file {}: {source}", .path.display())]
    Netdev { path: PathBuf, source: io::Error },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn parse(message: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            raw: raw.into(),
        }
    }
}

impl From<NetworkError> for Error {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::AllocationExhausted { .. } => Self::AllocationExhausted(err),
            NetworkError::LinkTable { .. } => Self::LinkTable(err),
            NetworkError::InvalidName { .. }
            | NetworkError::InvalidPrefix(_)
            | NetworkError::InvalidVlanTag(_) => Self::Validation(err.to_string()),
        }
    }
}

/// Result alias for agent operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_errors_map_to_taxonomy() {
        let err: Error = NetworkError::InvalidVlanTag(5000).into();
        assert!(matches!(err, Error::Validation(_)));

        let err: Error = NetworkError::AllocationExhausted {
            prefix: "tap".to_string(),
            capacity: 10,
        }
        .into();
        assert!(matches!(err, Error::AllocationExhausted(_)));
        assert!(err.to_string().contains("exhausted"));
    }

    #[test]
    fn test_validation_message_is_verbatim() {
        let err = Error::validation("missing guest with nics");
        assert_eq!(err.to_string(), "missing guest with nics");
    }
}
