//! `watch`: one monitoring pass; callers loop for continuous watching.

use super::execute;
use crate::{
    CommandDescriptor, CommandKind, CommandOptions, CommandResults, HandlerInput, PlatformSet,
    Result, ResultStatus, Service, ServiceDeployment,
};

/// Descriptor for `watch`
#[derive(Debug, Clone, Copy, Default)]
pub struct Watch;

impl CommandDescriptor for Watch {
    fn kind(&self) -> CommandKind {
        CommandKind::Watch
    }

    fn build_input(&self, _service: &Service, options: &CommandOptions) -> HandlerInput {
        HandlerInput::Watch {
            tail: options.extras.tail,
        }
    }

    fn success_status(&self) -> ResultStatus {
        ResultStatus::Watched
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

/// One monitoring pass over services
pub async fn watch(
    platforms: &PlatformSet,
    deployments: Vec<ServiceDeployment>,
    options: &CommandOptions,
) -> Result<CommandResults> {
    execute(&Watch, platforms, deployments, options).await
}
