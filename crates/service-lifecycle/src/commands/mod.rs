//! One module per lifecycle verb
//!
//! Each module holds the verb's [`CommandDescriptor`] and its entry point.
//! All entry points share the same shape and funnel into
//! [`MultiServiceExecutor`]; teardown verbs reverse their input first.

mod check;
mod exec;
mod provision;
mod publish;
mod restart;
mod start;
mod stop;
mod test;
mod update;
mod watch;

pub use check::{Check, check};
pub use exec::{Exec, exec};
pub use provision::{Provision, provision};
pub use publish::{Publish, publish};
pub use restart::{Restart, restart};
pub use start::{Start, start};
pub use stop::{Stop, stop};
pub use test::{Test, test};
pub use update::{Update, update};
pub use watch::{Watch, watch};

use crate::{
    CommandDescriptor, CommandKind, CommandOptions, CommandResults, MultiServiceExecutor,
    PlatformSet, Result, ServiceDeployment,
};

/// Descriptor for a verb
pub fn descriptor(kind: CommandKind) -> &'static dyn CommandDescriptor {
    match kind {
        CommandKind::Start => &Start,
        CommandKind::Stop => &Stop,
        CommandKind::Restart => &Restart,
        CommandKind::Update => &Update,
        CommandKind::Provision => &Provision,
        CommandKind::Publish => &Publish,
        CommandKind::Check => &Check,
        CommandKind::Exec => &Exec,
        CommandKind::Test => &Test,
        CommandKind::Watch => &Watch,
    }
}

/// Run any verb by kind
pub async fn run(
    kind: CommandKind,
    platforms: &PlatformSet,
    deployments: Vec<ServiceDeployment>,
    options: &CommandOptions,
) -> Result<CommandResults> {
    execute(descriptor(kind), platforms, deployments, options).await
}

pub(crate) async fn execute(
    descriptor: &dyn CommandDescriptor,
    platforms: &PlatformSet,
    mut deployments: Vec<ServiceDeployment>,
    options: &CommandOptions,
) -> Result<CommandResults> {
    if descriptor.is_teardown() {
        deployments.reverse();
    }
    MultiServiceExecutor::new(platforms, descriptor)
        .execute(deployments, options)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_policy_table() {
        let expected = [
            (CommandKind::Start, true, true, false, false, false),
            (CommandKind::Stop, false, true, false, false, true),
            (CommandKind::Restart, false, true, false, false, false),
            (CommandKind::Update, true, true, false, false, false),
            (CommandKind::Provision, false, true, false, true, false),
            (CommandKind::Publish, true, true, false, true, false),
            (CommandKind::Check, true, true, true, true, false),
            (CommandKind::Exec, false, false, true, false, false),
            (CommandKind::Test, true, true, false, false, false),
            (CommandKind::Watch, true, true, true, true, false),
        ];
        for (kind, continue_on_error, supports_all, discovery, preflight, teardown) in expected {
            let d = descriptor(kind);
            assert_eq!(d.kind(), kind);
            assert_eq!(d.continue_on_error(), continue_on_error, "{}", kind);
            assert_eq!(d.supports_all(), supports_all, "{}", kind);
            assert_eq!(d.requires_discovery(), discovery, "{}", kind);
            assert_eq!(d.requires_credential_preflight(), preflight, "{}", kind);
            assert_eq!(d.is_teardown(), teardown, "{}", kind);
        }
    }
}
