//! # Stack Configuration
//!
//! Parses `stack.yaml` files and resolves an environment into the ordered
//! [`ServiceDeployment`](service_lifecycle::ServiceDeployment)s the lifecycle
//! engine runs over.
//!
//! ```yaml
//! version: "1.0"
//! project: acme
//! environments:
//!   staging:
//!     platform: container
//!     services:
//!       database: { type: database, image: "postgres:16", port: 5432 }
//! ```

#![warn(missing_docs)]

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub mod parser;
pub mod resolver;

pub use parser::{parse_file, parse_str};
pub use resolver::{EnvironmentResolver, ResolutionContext, dependency_order};

/// Supported configuration version
pub const CONFIG_VERSION: &str = "1.0";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse YAML
    #[error("failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    ValidationError(String),

    /// Variables referenced without a value or default
    #[error("environment variable not found: {0}")]
    EnvVarNotFound(String),

    /// The requested environment is not defined
    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),

    /// A service refers to a service that is not defined
    #[error("service '{service}' not found in environment '{environment}'")]
    ServiceNotFound {
        /// Missing service
        service: String,
        /// Environment searched
        environment: String,
    },

    /// Services depend on each other in a loop
    #[error("dependency cycle in environment '{environment}' between: {}", .services.join(", "))]
    DependencyCycle {
        /// Environment with the cycle
        environment: String,
        /// Services that could not be ordered
        services: Vec<String>,
    },

    /// Service settings rejected by the lifecycle engine
    #[error(transparent)]
    Lifecycle(#[from] service_lifecycle::Error),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

impl From<ConfigError> for service_lifecycle::Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::UnknownEnvironment(name) => service_lifecycle::Error::UnknownEnvironment(name),
            ConfigError::ServiceNotFound {
                service,
                environment,
            } => service_lifecycle::Error::UnknownService {
                service,
                environment,
            },
            ConfigError::Lifecycle(inner) => inner,
            other => service_lifecycle::Error::config(other.to_string()),
        }
    }
}

/// Root of a `stack.yaml` file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackConfig {
    /// Configuration version, must be `1.0`
    pub version: String,

    /// Project name, the prefix of every resource name
    pub project: String,

    /// Keys shallow-merged under every service
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub defaults: Map<String, Value>,

    /// Environments in declaration order
    pub environments: IndexMap<String, EnvironmentConfig>,
}

/// One environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Default platform for services that do not name one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    /// Environment-wide settings keyed by platform name
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub settings: IndexMap<String, Map<String, Value>>,

    /// Services in declaration order
    #[serde(default)]
    pub services: IndexMap<String, Map<String, Value>>,
}

impl StackConfig {
    /// Look up an environment
    pub fn environment(&self, name: &str) -> Result<&EnvironmentConfig> {
        self.environments
            .get(name)
            .ok_or_else(|| ConfigError::UnknownEnvironment(name.to_string()))
    }

    /// Environment names in declaration order
    pub fn environment_names(&self) -> Vec<String> {
        self.environments.keys().cloned().collect()
    }
}

impl EnvironmentConfig {
    /// Declared dependencies of a service
    pub fn dependencies(&self, service: &str) -> Vec<String> {
        self.services
            .get(service)
            .and_then(|map| map.get("dependencies"))
            .and_then(Value::as_array)
            .map(|deps| {
                deps.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Platform name a service is assigned to
    pub fn platform_of(&self, service: &str) -> Option<&str> {
        self.services
            .get(service)
            .and_then(|map| map.get("platform"))
            .and_then(Value::as_str)
            .or(self.platform.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_map_to_lifecycle_errors() {
        let err: service_lifecycle::Error = ConfigError::UnknownEnvironment("prod".into()).into();
        assert!(matches!(err, service_lifecycle::Error::UnknownEnvironment(_)));

        let err: service_lifecycle::Error = ConfigError::ServiceNotFound {
            service: "cache".into(),
            environment: "staging".into(),
        }
        .into();
        assert!(matches!(err, service_lifecycle::Error::UnknownService { .. }));

        let err: service_lifecycle::Error = ConfigError::DependencyCycle {
            environment: "staging".into(),
            services: vec!["a".into(), "b".into()],
        }
        .into();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("a, b"));
    }
}
