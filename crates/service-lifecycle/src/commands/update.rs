//! `update`: roll services to their configured version.

use super::execute;
use crate::{
    CommandDescriptor, CommandKind, CommandOptions, CommandResults, HandlerInput, HandlerOutput,
    PlatformSet, Result, ResultDetails, ResultStatus, Service, ServiceDeployment,
};

/// Descriptor for `update`
#[derive(Debug, Clone, Copy, Default)]
pub struct Update;

impl CommandDescriptor for Update {
    fn kind(&self) -> CommandKind {
        CommandKind::Update
    }

    fn build_input(&self, _service: &Service, _options: &CommandOptions) -> HandlerInput {
        HandlerInput::Update
    }

    fn success_status(&self) -> ResultStatus {
        ResultStatus::Updated
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
        Some(ResultDetails::Update {
            previous_version: None,
            new_version: None,
            strategy: "rolling".to_string(),
        })
    }
}

/// Update services
pub async fn update(
    platforms: &PlatformSet,
    deployments: Vec<ServiceDeployment>,
    options: &CommandOptions,
) -> Result<CommandResults> {
    execute(&Update, platforms, deployments, options).await
}
