//! Error types for lifecycle operations

use crate::{CommandKind, PlatformKind, ServiceType};
use std::time::Duration;
use thiserror::Error;

/// Unified error type for the lifecycle engine
///
/// Only configuration errors escape a verb call. Every other variant is
/// captured by the executor into a failed per-service result.
#[derive(Error, Debug)]
pub enum Error {
    /// The requested environment does not exist
    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),

    /// The requested service does not exist in the environment
    #[error("unknown service '{service}' in environment '{environment}'")]
    UnknownService {
        /// Requested service name
        service: String,
        /// Environment that was searched
        environment: String,
    },

    /// Invalid configuration or invocation
    #[error("configuration error: {0}")]
    Config(String),

    /// No strategy was registered for a platform
    #[error("no strategy registered for platform '{0}'")]
    PlatformUnavailable(PlatformKind),

    /// No handler matches the (command, platform, service type) triple
    #[error("'{command}' is not supported on platform '{platform}' for service type '{service_type}'")]
    UnsupportedCombination {
        /// Command that was dispatched
        command: CommandKind,
        /// Platform of the service
        platform: PlatformKind,
        /// Resolved service type
        service_type: ServiceType,
    },

    /// Live discovery of a service failed
    #[error("discovery failed: {0}")]
    Discovery(String),

    /// A handler raised a fault
    #[error("handler fault: {0}")]
    Handler(String),

    /// An external command exited unsuccessfully
    #[error("`{command}` failed: {reason}")]
    CommandFailed {
        /// The command line that was run
        command: String,
        /// Captured stderr or exit description
        reason: String,
    },

    /// Failed to spawn a process
    #[error("failed to spawn `{command}`: {reason}")]
    SpawnFailed {
        /// Program that failed to start
        command: String,
        /// Underlying reason
        reason: String,
    },

    /// A handler-local timeout elapsed
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Unix signal error
    #[error(transparent)]
    Nix(#[from] nix::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a handler fault
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }

    /// Create a failed-command error
    pub fn command_failed(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error aborts a whole command rather than one service
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::UnknownEnvironment(_) | Error::UnknownService { .. } | Error::Config(_)
        )
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_classification() {
        assert!(Error::UnknownEnvironment("prod".into()).is_configuration());
        assert!(
            Error::UnknownService {
                service: "api".into(),
                environment: "staging".into()
            }
            .is_configuration()
        );
        assert!(Error::config("bad").is_configuration());
        assert!(!Error::handler("boom").is_configuration());
        assert!(!Error::PlatformUnavailable(PlatformKind::Aws).is_configuration());
    }

    #[test]
    fn test_unsupported_combination_message() {
        let err = Error::UnsupportedCombination {
            command: CommandKind::Publish,
            platform: PlatformKind::External,
            service_type: ServiceType::Database,
        };
        assert_eq!(
            err.to_string(),
            "'publish' is not supported on platform 'external' for service type 'database'"
        );
    }
}
