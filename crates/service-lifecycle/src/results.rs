//! Uniform result envelope returned by every command.

use crate::{CommandKind, PlatformKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Metadata key set on credential pre-flight failures
pub const CREDENTIAL_ERROR_KEY: &str = "credentialError";
/// Metadata key carrying a remediation hint
pub const REMEDIATION_KEY: &str = "remediation";
/// Metadata key set on results recorded after a forced continuation
pub const FORCE_CONTINUATION_KEY: &str = "forceContinuation";
/// Metadata key describing what a dry run would have done
pub const INTENDED_EFFECT_KEY: &str = "intendedEffect";

/// Outcome status of one service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultStatus {
    /// Service was started
    Started,
    /// Service was stopped
    Stopped,
    /// Service was restarted
    Restarted,
    /// Service was updated
    Updated,
    /// Infrastructure was provisioned
    Provisioned,
    /// Artifact was published
    Published,
    /// Service is running
    Running,
    /// Service is not running
    NotRunning,
    /// Service is running but failing health checks
    Unhealthy,
    /// A command ran inside the service
    Executed,
    /// Tests passed
    TestsPassed,
    /// One monitoring pass completed
    Watched,
    /// Nothing to do: already running
    AlreadyRunning,
    /// Nothing to do: already stopped
    AlreadyStopped,
    /// Nothing to do: no change required
    NoChange,
    /// Nothing to do: managed outside this tool
    External,
    /// Simulated only
    DryRun,
    /// Declared failure
    Failed,
    /// Failure that did not halt the run because of `force`
    ForceContinued,
    /// Credential pre-flight rejected the platform
    CredentialError,
}

impl ResultStatus {
    /// Kebab-case name used in output
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Started => "started",
            ResultStatus::Stopped => "stopped",
            ResultStatus::Restarted => "restarted",
            ResultStatus::Updated => "updated",
            ResultStatus::Provisioned => "provisioned",
            ResultStatus::Published => "published",
            ResultStatus::Running => "running",
            ResultStatus::NotRunning => "not-running",
            ResultStatus::Unhealthy => "unhealthy",
            ResultStatus::Executed => "executed",
            ResultStatus::TestsPassed => "tests-passed",
            ResultStatus::Watched => "watched",
            ResultStatus::AlreadyRunning => "already-running",
            ResultStatus::AlreadyStopped => "already-stopped",
            ResultStatus::NoChange => "no-change",
            ResultStatus::External => "external",
            ResultStatus::DryRun => "dry-run",
            ResultStatus::Failed => "failed",
            ResultStatus::ForceContinued => "force-continued",
            ResultStatus::CredentialError => "credential-error",
        }
    }

    /// Whether this status means "nothing to do"
    pub fn is_noop(&self) -> bool {
        matches!(
            self,
            ResultStatus::AlreadyRunning
                | ResultStatus::AlreadyStopped
                | ResultStatus::NoChange
                | ResultStatus::External
        )
    }
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health of a service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Service is healthy
    Healthy,
    /// Service is unhealthy (failed health check)
    Unhealthy(String),
    /// Health is unknown or not configured
    Unknown,
}

/// One log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Timestamp if the source provides one
    pub timestamp: Option<DateTime<Utc>>,
    /// Stream or source, e.g. `stdout`
    pub source: String,
    /// Log message
    pub message: String,
}

/// Identifiers of the concrete resource backing a service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRef {
    /// Deterministic resource name
    pub resource_name: Option<String>,
    /// Substrate identifier: container id, pid, ARN
    pub id: Option<String>,
    /// Reachable endpoint
    pub endpoint: Option<String>,
}

/// Verb-specific result fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum ResultDetails {
    /// Start details
    Start {
        /// When the service came up
        started_at: DateTime<Utc>,
        /// Endpoint, if known
        endpoint: Option<String>,
    },
    /// Stop details
    Stop {
        /// When the service went down
        stopped_at: DateTime<Utc>,
        /// Whether it exited within the grace period
        graceful: bool,
    },
    /// Restart details
    Restart {
        /// When the old instance stopped
        stopped_at: Option<DateTime<Utc>>,
        /// When the new instance started
        started_at: Option<DateTime<Utc>>,
    },
    /// Update details
    Update {
        /// Version before the update
        previous_version: Option<String>,
        /// Version after the update
        new_version: Option<String>,
        /// Update strategy used
        strategy: String,
    },
    /// Provision details
    Provision {
        /// Resources that were created
        created: Vec<String>,
    },
    /// Publish details
    Publish {
        /// Published artifact reference
        artifact: Option<String>,
        /// Tag applied
        tag: Option<String>,
    },
    /// Check details
    Check {
        /// Whether the service is running
        running: bool,
        /// Health of the service
        health: HealthStatus,
        /// Recent logs when requested
        logs: Option<Vec<LogEntry>>,
    },
    /// Exec details
    Exec {
        /// Exit code of the command
        exit_code: Option<i32>,
        /// Captured stdout
        stdout: String,
        /// Captured stderr
        stderr: String,
    },
    /// Test details
    Test {
        /// Suite that ran
        suite: Option<String>,
        /// Exit code of the test command
        exit_code: Option<i32>,
    },
    /// Watch details
    Watch {
        /// Whether the service is running
        running: bool,
        /// Health of the service
        health: HealthStatus,
        /// Most recent log lines
        recent_logs: Vec<LogEntry>,
    },
}

/// Outcome of one verb on one service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResult {
    /// Service name
    pub entity: String,
    /// Platform the service ran on
    pub platform: PlatformKind,
    /// False iff a declared error or refusal occurred
    pub success: bool,
    /// Error message for failures
    pub error: Option<String>,
    /// Outcome status
    pub status: ResultStatus,
    /// When the result was recorded
    pub timestamp: DateTime<Utc>,
    /// Backing resource identifiers
    pub resources: Option<ResourceRef>,
    /// Verb-specific fields
    pub details: Option<ResultDetails>,
    /// Non-fatal warnings
    pub warnings: Vec<String>,
    /// Free-form metadata
    pub metadata: Map<String, Value>,
}

impl ServiceResult {
    /// Create a successful result
    pub fn success(entity: impl Into<String>, platform: PlatformKind, status: ResultStatus) -> Self {
        Self {
            entity: entity.into(),
            platform,
            success: true,
            error: None,
            status,
            timestamp: Utc::now(),
            resources: None,
            details: None,
            warnings: Vec::new(),
            metadata: Map::new(),
        }
    }

    /// Create a failed result
    pub fn failure(
        entity: impl Into<String>,
        platform: PlatformKind,
        error: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::success(entity, platform, ResultStatus::Failed)
        }
    }

    /// Override the status
    pub fn with_status(mut self, status: ResultStatus) -> Self {
        self.status = status;
        self
    }

    /// Attach resource identifiers
    pub fn with_resources(mut self, resources: ResourceRef) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Attach verb-specific details
    pub fn with_details(mut self, details: ResultDetails) -> Self {
        self.details = Some(details);
        self
    }

    /// Add a warning
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Add metadata
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether this result came from a credential pre-flight rejection
    pub fn is_credential_error(&self) -> bool {
        self.metadata
            .get(CREDENTIAL_ERROR_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Aggregate counts over the collected results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Results collected
    pub total: usize,
    /// Successful results
    pub succeeded: usize,
    /// Failed results
    pub failed: usize,
    /// Results carrying at least one warning
    pub warnings: usize,
}

impl Summary {
    /// Compute the summary of a result list
    pub fn from_results(results: &[ServiceResult]) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            warnings: results.iter().filter(|r| !r.warnings.is_empty()).count(),
        }
    }
}

/// Who ran a command, from where
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    /// Unique id of this invocation
    pub run_id: Uuid,
    /// Invoking user
    pub user: String,
    /// Working directory of the invocation
    pub working_directory: PathBuf,
    /// Whether the run was simulated
    pub dry_run: bool,
}

impl ExecutionContext {
    /// Capture the context of the current process
    pub fn current(dry_run: bool) -> Self {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            run_id: Uuid::new_v4(),
            user,
            working_directory: std::env::current_dir().unwrap_or_default(),
            dry_run,
        }
    }
}

/// Aggregate result of one command across many services
///
/// Built once; the summary is computed from the results at construction and
/// the value is read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResults {
    command: CommandKind,
    environment: String,
    timestamp: DateTime<Utc>,
    duration_ms: u64,
    results: Vec<ServiceResult>,
    summary: Summary,
    execution_context: ExecutionContext,
}

impl CommandResults {
    /// Assemble the envelope, computing the summary from `results`
    pub fn new(
        command: CommandKind,
        environment: impl Into<String>,
        timestamp: DateTime<Utc>,
        duration: Duration,
        results: Vec<ServiceResult>,
        execution_context: ExecutionContext,
    ) -> Self {
        let summary = Summary::from_results(&results);
        Self {
            command,
            environment: environment.into(),
            timestamp,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            results,
            summary,
            execution_context,
        }
    }

    /// Command that ran
    pub fn command(&self) -> CommandKind {
        self.command
    }

    /// Environment it ran in
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// When it started
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// How long it took
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// Per-service results in execution order
    pub fn results(&self) -> &[ServiceResult] {
        &self.results
    }

    /// Aggregate counts
    pub fn summary(&self) -> Summary {
        self.summary
    }

    /// Invocation context
    pub fn execution_context(&self) -> &ExecutionContext {
        &self.execution_context
    }

    /// Whether every collected result succeeded
    pub fn is_success(&self) -> bool {
        self.summary.failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let results = vec![
            ServiceResult::success("a", PlatformKind::Mock, ResultStatus::Started),
            ServiceResult::failure("b", PlatformKind::Mock, "boom"),
            ServiceResult::success("c", PlatformKind::Mock, ResultStatus::AlreadyRunning)
                .with_warning("already running"),
        ];
        let summary = Summary::from_results(&results);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.warnings, 1);
        assert_eq!(summary.succeeded + summary.failed, summary.total);
    }

    #[test]
    fn test_failure_carries_error_and_status() {
        let result = ServiceResult::failure("db", PlatformKind::Container, "no such image");
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("no such image"));
        assert_eq!(result.status, ResultStatus::Failed);
    }

    #[test]
    fn test_noop_statuses_are_successes() {
        let result = ServiceResult::success("db", PlatformKind::Posix, ResultStatus::AlreadyStopped);
        assert!(result.success);
        assert!(result.status.is_noop());
        assert!(!ResultStatus::Stopped.is_noop());
    }

    #[test]
    fn test_envelope_serializes_in_camel_case() {
        let results = CommandResults::new(
            CommandKind::Start,
            "staging",
            Utc::now(),
            Duration::from_millis(1500),
            vec![ServiceResult::success("web", PlatformKind::Mock, ResultStatus::Started)],
            ExecutionContext::current(false),
        );
        let json = serde_json::to_value(&results).unwrap();
        assert_eq!(json["command"], "start");
        assert_eq!(json["durationMs"], 1500);
        assert_eq!(json["summary"]["total"], 1);
        assert_eq!(json["results"][0]["status"], "started");
        assert_eq!(json["executionContext"]["dryRun"], false);
        assert_eq!(results.duration(), Duration::from_millis(1500));
    }
}
