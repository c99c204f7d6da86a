//! Command kinds, invocation options and the per-verb descriptor seam.
//!
//! A [`CommandDescriptor`] captures everything verb-specific the executor
//! needs: how to build handler input, how to turn handler output into a
//! [`ServiceResult`], and the verb's failure policy. The executor itself has
//! no verb-specific branches.

use crate::{
    Error, HandlerInput, HandlerOutput, PlatformKind, Result, ResultDetails, ResultStatus,
    Service, ServiceDeployment, ServiceResult,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Grace period used by stop and restart when none is given
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);
/// Log lines fetched by check and watch when none is given
pub const DEFAULT_LOG_TAIL: usize = 50;

/// Lifecycle verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    /// Start services
    Start,
    /// Stop services
    Stop,
    /// Restart services
    Restart,
    /// Roll services to a new version
    Update,
    /// Create infrastructure
    Provision,
    /// Build and publish artifacts
    Publish,
    /// Inspect status and health
    Check,
    /// Run a command inside a service
    Exec,
    /// Run a service's tests
    Test,
    /// One monitoring pass
    Watch,
}

impl CommandKind {
    /// All verbs
    pub const ALL: [CommandKind; 10] = [
        CommandKind::Start,
        CommandKind::Stop,
        CommandKind::Restart,
        CommandKind::Update,
        CommandKind::Provision,
        CommandKind::Publish,
        CommandKind::Check,
        CommandKind::Exec,
        CommandKind::Test,
        CommandKind::Watch,
    ];

    /// Lowercase verb name
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Start => "start",
            CommandKind::Stop => "stop",
            CommandKind::Restart => "restart",
            CommandKind::Update => "update",
            CommandKind::Provision => "provision",
            CommandKind::Publish => "publish",
            CommandKind::Check => "check",
            CommandKind::Exec => "exec",
            CommandKind::Test => "test",
            CommandKind::Watch => "watch",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CommandKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::config(format!("unknown command: {}", s)))
    }
}

/// Presentation format requested by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summary
    #[default]
    Summary,
    /// JSON document
    Json,
    /// YAML document
    Yaml,
    /// Table
    Table,
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            "yaml" => Ok(OutputFormat::Yaml),
            "table" => Ok(OutputFormat::Table),
            other => Err(Error::config(format!(
                "invalid output format: {}. Must be one of summary, json, yaml, table",
                other
            ))),
        }
    }
}

/// Which services a command addresses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceSelection {
    /// Every service in the environment
    #[default]
    All,
    /// Only the named services
    Named(Vec<String>),
}

impl ServiceSelection {
    /// Build a selection from CLI-style arguments, empty meaning all
    pub fn from_names(names: Vec<String>) -> Self {
        if names.is_empty() {
            ServiceSelection::All
        } else {
            ServiceSelection::Named(names)
        }
    }

    /// Whether every service is selected
    pub fn is_all(&self) -> bool {
        matches!(self, ServiceSelection::All)
    }
}

/// Verb-specific extras
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandExtras {
    /// Program and arguments for exec
    pub exec: Vec<String>,
    /// Tag for publish
    pub tag: Option<String>,
    /// Test suite for test
    pub suite: Option<String>,
    /// Whether check includes recent logs
    pub include_logs: bool,
    /// Log lines for check and watch
    pub tail: usize,
}

impl Default for CommandExtras {
    fn default() -> Self {
        Self {
            exec: Vec::new(),
            tag: None,
            suite: None,
            include_logs: false,
            tail: DEFAULT_LOG_TAIL,
        }
    }
}

/// Options every verb receives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOptions {
    /// Environment name
    pub environment: String,
    /// Output format selector
    pub output: OutputFormat,
    /// Verbose output
    pub verbose: bool,
    /// Quiet output
    pub quiet: bool,
    /// Simulate without contacting any platform
    pub dry_run: bool,
    /// Continue past failures
    pub force: bool,
    /// Grace period for stop and restart
    pub grace_period: Option<Duration>,
    /// Handler-local timeout
    pub timeout: Option<Duration>,
    /// Which services were requested
    pub selection: ServiceSelection,
    /// Verb-specific extras
    pub extras: CommandExtras,
}

impl CommandOptions {
    /// Default options for an environment
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            output: OutputFormat::default(),
            verbose: false,
            quiet: false,
            dry_run: false,
            force: false,
            grace_period: None,
            timeout: None,
            selection: ServiceSelection::All,
            extras: CommandExtras::default(),
        }
    }

    /// Set the force flag
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Set the dry-run flag
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set the service selection
    pub fn with_selection(mut self, selection: ServiceSelection) -> Self {
        self.selection = selection;
        self
    }

    /// Effective grace period
    pub fn grace_period(&self) -> Duration {
        self.grace_period.unwrap_or(DEFAULT_GRACE_PERIOD)
    }
}

/// Per-verb policy consumed by the executor
pub trait CommandDescriptor: Send + Sync {
    /// The verb
    fn kind(&self) -> CommandKind;

    /// Project service and options into handler input
    fn build_input(&self, service: &Service, options: &CommandOptions) -> HandlerInput;

    /// Status recorded for a success that names none
    fn success_status(&self) -> ResultStatus;

    /// Continue to the next service after a failure when `force` is unset
    fn continue_on_error(&self) -> bool;

    /// Whether the verb may address every service at once
    fn supports_all(&self) -> bool;

    /// Whether context building should perform live discovery
    fn requires_discovery(&self) -> bool {
        false
    }

    /// Whether platform credentials are validated before any service runs
    fn requires_credential_preflight(&self) -> bool {
        false
    }

    /// Whether the verb tears services down and therefore runs in reverse
    fn is_teardown(&self) -> bool {
        false
    }

    /// Verb details filled in when a successful handler provides none
    fn default_details(&self, _output: &HandlerOutput) -> Option<ResultDetails> {
        None
    }

    /// Human-readable intent recorded by dry runs
    fn describe_effect(&self, deployment: &ServiceDeployment, _options: &CommandOptions) -> String {
        format!(
            "would {} '{}' on {}",
            self.kind(),
            deployment.name(),
            deployment.platform
        )
    }

    /// Map handler output into the uniform result
    fn build_result(&self, deployment: &ServiceDeployment, output: HandlerOutput) -> ServiceResult {
        normalize_output(self, deployment.name(), deployment.platform, output)
    }
}

/// Default mapping from handler output to a result
///
/// Keeps `success == false` iff an error is present: a failure without a
/// message gets a generic one, an error on a success becomes a warning.
pub fn normalize_output<D: CommandDescriptor + ?Sized>(
    descriptor: &D,
    entity: &str,
    platform: PlatformKind,
    output: HandlerOutput,
) -> ServiceResult {
    let details = match output.details.clone() {
        Some(details) => Some(details),
        None if output.success => descriptor.default_details(&output),
        None => None,
    };

    let mut result = if output.success {
        let mut result = ServiceResult::success(
            entity,
            platform,
            output.status.unwrap_or_else(|| descriptor.success_status()),
        );
        if let Some(error) = output.error {
            result.warnings.push(error);
        }
        result
    } else {
        let error = output
            .error
            .unwrap_or_else(|| format!("{} failed for '{}'", descriptor.kind(), entity));
        ServiceResult::failure(entity, platform, error)
    };

    result.resources = output.resources;
    result.details = details;
    result.warnings.extend(output.warnings);
    result.metadata.extend(output.metadata);
    result
}
