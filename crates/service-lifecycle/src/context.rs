//! Per-call handler context, input and output.

use crate::{
    CommandKind, CommandOptions, Error, PlatformKind, Requirements, ResourceRef, Result,
    ResultDetails, ResultStatus, Service, ServiceType,
};
use serde_json::{Map, Value};
use std::time::Duration;

/// Verb-specific input projected by a command descriptor
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerInput {
    /// Start the service
    Start,
    /// Stop the service
    Stop {
        /// Time allowed for a graceful exit
        grace_period: Duration,
    },
    /// Restart the service
    Restart {
        /// Time allowed for a graceful exit
        grace_period: Duration,
    },
    /// Roll the service to its configured version
    Update,
    /// Create infrastructure
    Provision,
    /// Build and publish
    Publish {
        /// Tag to apply
        tag: Option<String>,
    },
    /// Inspect the service
    Check {
        /// Whether to include recent logs
        include_logs: bool,
        /// Number of log lines
        tail: usize,
    },
    /// Run a command inside the service
    Exec {
        /// Program and arguments
        command: Vec<String>,
    },
    /// Run tests
    Test {
        /// Suite name
        suite: Option<String>,
    },
    /// One monitoring pass
    Watch {
        /// Number of log lines
        tail: usize,
    },
}

/// Platform-specific additions to a handler context
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextExtensions {
    /// Deterministic resource name
    pub resource_name: String,
    /// Endpoint found by discovery
    pub endpoint: Option<String>,
    /// Cluster the service lives in
    pub cluster: Option<String>,
    /// Why discovery failed, when it was requested and did
    pub discovery_error: Option<String>,
    /// Anything else a strategy wants to hand its handlers
    pub extra: Map<String, Value>,
}

impl ContextExtensions {
    /// Extensions carrying only the resource name
    pub fn named(resource_name: impl Into<String>) -> Self {
        Self {
            resource_name: resource_name.into(),
            ..Default::default()
        }
    }
}

/// Everything a handler gets for one call
///
/// Built fresh by the executor for every (service, verb) and dropped when the
/// handler returns.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    /// Verb being executed
    pub command: CommandKind,
    /// Service being acted on
    pub service: Service,
    /// Platform of the service
    pub platform: PlatformKind,
    /// Resolved handler type
    pub service_type: ServiceType,
    /// Derived requirements
    pub requirements: Requirements,
    /// Invocation options
    pub options: CommandOptions,
    /// Verb-specific input
    pub input: HandlerInput,
    /// Platform extensions
    pub extensions: ContextExtensions,
}

impl HandlerContext {
    /// Service name
    pub fn name(&self) -> &str {
        &self.service.name
    }

    /// Environment name
    pub fn environment(&self) -> &str {
        &self.service.environment
    }

    /// Deterministic resource name
    pub fn resource_name(&self) -> &str {
        &self.extensions.resource_name
    }

    /// Handler-local timeout
    pub fn timeout(&self) -> Option<Duration> {
        self.options.timeout
    }

    /// Discovered endpoint, or the discovery failure as an error
    pub fn discovered_endpoint(&self) -> Result<Option<&str>> {
        match &self.extensions.discovery_error {
            Some(reason) => Err(Error::Discovery(reason.clone())),
            None => Ok(self.extensions.endpoint.as_deref()),
        }
    }

    /// Declared failure for a discovery that was requested and failed
    pub fn discovery_failure(&self) -> Option<HandlerOutput> {
        self.extensions.discovery_error.as_ref().map(|reason| {
            HandlerOutput::failed(format!("discovery failed for '{}': {}", self.name(), reason))
        })
    }
}

/// What a handler reports back
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerOutput {
    /// Whether the verb succeeded
    pub success: bool,
    /// Declared error
    pub error: Option<String>,
    /// Specific status; the descriptor's default applies when absent
    pub status: Option<ResultStatus>,
    /// Backing resource identifiers
    pub resources: Option<ResourceRef>,
    /// Verb-specific fields
    pub details: Option<ResultDetails>,
    /// Non-fatal warnings
    pub warnings: Vec<String>,
    /// Free-form metadata
    pub metadata: Map<String, Value>,
}

impl HandlerOutput {
    /// A success with the descriptor's default status
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    /// A success with a specific status
    pub fn with_status(status: ResultStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::ok()
        }
    }

    /// A declared failure
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Attach resource identifiers
    pub fn resources(mut self, resources: ResourceRef) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Attach verb-specific details
    pub fn details(mut self, details: ResultDetails) -> Self {
        self.details = Some(details);
        self
    }

    /// Add a warning
    pub fn warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Add metadata
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
