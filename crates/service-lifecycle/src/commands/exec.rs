//! `exec`: run a command inside one named service.

use super::execute;
use crate::{
    CommandDescriptor, CommandKind, CommandOptions, CommandResults, HandlerInput, PlatformSet,
    Result, ResultStatus, Service, ServiceDeployment,
};

/// Descriptor for `exec`
#[derive(Debug, Clone, Copy, Default)]
pub struct Exec;

impl CommandDescriptor for Exec {
    fn kind(&self) -> CommandKind {
        CommandKind::Exec
    }

    fn build_input(&self, _service: &Service, options: &CommandOptions) -> HandlerInput {
        HandlerInput::Exec {
            command: options.extras.exec.clone(),
        }
    }

    fn success_status(&self) -> ResultStatus {
        ResultStatus::Executed
    }

    fn continue_on_error(&self) -> bool {
        false
    }

    fn supports_all(&self) -> bool {
        false
    }

    fn requires_discovery(&self) -> bool {
        true
    }

    fn describe_effect(&self, deployment: &ServiceDeployment, options: &CommandOptions) -> String {
        format!(
            "would run `{}` in '{}' on {}",
            options.extras.exec.join(" "),
            deployment.name(),
            deployment.platform
        )
    }
}

/// Run a command inside services
pub async fn exec(
    platforms: &PlatformSet,
    deployments: Vec<ServiceDeployment>,
    options: &CommandOptions,
) -> Result<CommandResults> {
    execute(&Exec, platforms, deployments, options).await
}
