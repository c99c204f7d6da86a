//! `check`: report running state, health and optionally logs.

use super::execute;
use crate::{
    CommandDescriptor, CommandKind, CommandOptions, CommandResults, HandlerInput, PlatformSet,
    Result, ResultStatus, Service, ServiceDeployment,
};

/// Descriptor for `check`
///
/// A service that is not running or unhealthy is still a successful check;
/// the status and a warning carry the finding.
#[derive(Debug, Clone, Copy, Default)]
pub struct Check;

impl CommandDescriptor for Check {
    fn kind(&self) -> CommandKind {
        CommandKind::Check
    }

    fn build_input(&self, _service: &Service, options: &CommandOptions) -> HandlerInput {
        HandlerInput::Check {
            include_logs: options.extras.include_logs,
            tail: options.extras.tail,
        }
    }

    fn success_status(&self) -> ResultStatus {
        ResultStatus::Running
    }

    fn continue_on_error(&self) -> bool {
        true
    }

    fn supports_all(&self) -> bool {
        true
    }

    fn requires_discovery(&self) -> bool {
        true
    }

    fn requires_credential_preflight(&self) -> bool {
        true
    }
}

/// Check services
pub async fn check(
    platforms: &PlatformSet,
    deployments: Vec<ServiceDeployment>,
    options: &CommandOptions,
) -> Result<CommandResults> {
    execute(&Check, platforms, deployments, options).await
}
