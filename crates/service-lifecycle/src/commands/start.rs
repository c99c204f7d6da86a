//! `start`: bring services up in dependency order.

use super::execute;
use crate::{
    CommandDescriptor, CommandKind, CommandOptions, CommandResults, HandlerInput, HandlerOutput,
    PlatformSet, Result, ResultDetails, ResultStatus, Service, ServiceDeployment,
};
use chrono::Utc;

/// Descriptor for `start`
#[derive(Debug, Clone, Copy, Default)]
pub struct Start;

impl CommandDescriptor for Start {
    fn kind(&self) -> CommandKind {
        CommandKind::Start
    }

    fn build_input(&self, _service: &Service, _options: &CommandOptions) -> HandlerInput {
        HandlerInput::Start
    }

    fn success_status(&self) -> ResultStatus {
        ResultStatus::Started
    }

    fn continue_on_error(&self) -> bool {
        true
    }

    fn supports_all(&self) -> bool {
        true
    }

    fn default_details(&self, output: &HandlerOutput) -> Option<ResultDetails> {
        if output.status.is_some_and(|s| s.is_noop()) {
            return None;
        }
        Some(ResultDetails::Start {
            started_at: Utc::now(),
            endpoint: output.resources.as_ref().and_then(|r| r.endpoint.clone()),
        })
    }
}

/// Start services
pub async fn start(
    platforms: &PlatformSet,
    deployments: Vec<ServiceDeployment>,
    options: &CommandOptions,
) -> Result<CommandResults> {
    execute(&Start, platforms, deployments, options).await
}
