//! `test`: run each service's test command.

use super::execute;
use crate::{
    CommandDescriptor, CommandKind, CommandOptions, CommandResults, HandlerInput, PlatformSet,
    Result, ResultStatus, Service, ServiceDeployment,
};

/// Descriptor for `test`
#[derive(Debug, Clone, Copy, Default)]
pub struct Test;

impl CommandDescriptor for Test {
    fn kind(&self) -> CommandKind {
        CommandKind::Test
    }

    fn build_input(&self, _service: &Service, options: &CommandOptions) -> HandlerInput {
        HandlerInput::Test {
            suite: options.extras.suite.clone(),
        }
    }

    fn success_status(&self) -> ResultStatus {
        ResultStatus::TestsPassed
    }

    fn continue_on_error(&self) -> bool {
        true
    }

    fn supports_all(&self) -> bool {
        true
    }
}

/// Run service tests
pub async fn test(
    platforms: &PlatformSet,
    deployments: Vec<ServiceDeployment>,
    options: &CommandOptions,
) -> Result<CommandResults> {
    execute(&Test, platforms, deployments, options).await
}
