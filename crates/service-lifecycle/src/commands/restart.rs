//! `restart`: stop then start each service in place.

use super::execute;
use crate::{
    CommandDescriptor, CommandKind, CommandOptions, CommandResults, HandlerInput, HandlerOutput,
    PlatformSet, Result, ResultDetails, ResultStatus, Service, ServiceDeployment,
};
use chrono::Utc;

/// Descriptor for `restart`
#[derive(Debug, Clone, Copy, Default)]
pub struct Restart;

impl CommandDescriptor for Restart {
    fn kind(&self) -> CommandKind {
        CommandKind::Restart
    }

    fn build_input(&self, _service: &Service, options: &CommandOptions) -> HandlerInput {
        HandlerInput::Restart {
            grace_period: options.grace_period(),
        }
    }

    fn success_status(&self) -> ResultStatus {
        ResultStatus::Restarted
    }

    fn continue_on_error(&self) -> bool {
        false
    }

    fn supports_all(&self) -> bool {
        true
    }

    fn default_details(&self, _output: &HandlerOutput) -> Option<ResultDetails> {
        let now = Utc::now();
        Some(ResultDetails::Restart {
            stopped_at: Some(now),
            started_at: Some(now),
        })
    }
}

/// Restart services
pub async fn restart(
    platforms: &PlatformSet,
    deployments: Vec<ServiceDeployment>,
    options: &CommandOptions,
) -> Result<CommandResults> {
    execute(&Restart, platforms, deployments, options).await
}
