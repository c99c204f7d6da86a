//! `stop`: tear services down in reverse order.

use super::execute;
use crate::{
    CommandDescriptor, CommandKind, CommandOptions, CommandResults, HandlerInput, HandlerOutput,
    PlatformSet, Result, ResultDetails, ResultStatus, Service, ServiceDeployment,
};
use chrono::Utc;

/// Descriptor for `stop`
#[derive(Debug, Clone, Copy, Default)]
pub struct Stop;

impl CommandDescriptor for Stop {
    fn kind(&self) -> CommandKind {
        CommandKind::Stop
    }

    fn build_input(&self, _service: &Service, options: &CommandOptions) -> HandlerInput {
        HandlerInput::Stop {
            grace_period: options.grace_period(),
        }
    }

    fn success_status(&self) -> ResultStatus {
        ResultStatus::Stopped
    }

    fn continue_on_error(&self) -> bool {
        false
    }

    fn supports_all(&self) -> bool {
        true
    }

    fn is_teardown(&self) -> bool {
        true
    }

    fn default_details(&self, output: &HandlerOutput) -> Option<ResultDetails> {
        if output.status.is_some_and(|s| s.is_noop()) {
            return None;
        }
        Some(ResultDetails::Stop {
            stopped_at: Utc::now(),
            graceful: true,
        })
    }

    fn describe_effect(&self, deployment: &ServiceDeployment, options: &CommandOptions) -> String {
        format!(
            "would stop '{}' on {} with a {}s grace period",
            deployment.name(),
            deployment.platform,
            options.grace_period().as_secs()
        )
    }
}

/// Stop services, last dependency first
///
/// The input is in start order; it is reversed before execution.
pub async fn stop(
    platforms: &PlatformSet,
    deployments: Vec<ServiceDeployment>,
    options: &CommandOptions,
) -> Result<CommandResults> {
    execute(&Stop, platforms, deployments, options).await
}
