//! Error taxonomy for a sync run.
use crate::config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("authentication failed against {service}: {message}")]
    Auth {
        service: &'static str,
        message: String,
    },

    #[error("{service} request failed: {message}")]
    Api {
        service: &'static str,
        message: String,
    },

    #[error("{service} still failing after {attempts} attempts: {last}")]
    RetriesExhausted {
        service: &'static str,
        attempts: u32,
        last: String,
    },

    #[error("could not decode {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("warehouse error: {0}")]
    Warehouse(String),

    #[error("run aborted: {0}")]
    Aborted(&'static str),
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;

impl SyncError {
    pub fn auth(service: &'static str, message: impl Into<String>) -> Self {
        SyncError::Auth {
            service,
            message: message.into(),
        }
    }

    pub fn api(service: &'static str, message: impl Into<String>) -> Self {
        SyncError::Api {
            service,
            message: message.into(),
        }
    }

    pub fn warehouse(message: impl Into<String>) -> Self {
        SyncError::Warehouse(message.into())
    }

    /// Process exit code for this failure class.
    pub fn exit_code(&self) -> u8 {
        match self {
            SyncError::Config(_) => 2,
            SyncError::Auth { .. } => 3,
            SyncError::Api { .. } | SyncError::RetriesExhausted { .. } | SyncError::Decode { .. } => 4,
            SyncError::Warehouse(_) => 5,
            SyncError::Aborted(_) => 6,
        }
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Warehouse(err.to_string())
    }
}
