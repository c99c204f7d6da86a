use super::{Session, VerbArgs, report};
use crate::GlobalArgs;
use anyhow::{Context, Result};
use service_lifecycle::{CommandKind, commands};
use std::process::ExitCode;
use std::time::Duration;
use tracing::info;

pub async fn run(
    global: &GlobalArgs,
    services: Vec<String>,
    interval: u64,
    iterations: Option<u64>,
) -> Result<ExitCode> {
    let session = Session::open(global)?;
    let options = session.options(global, VerbArgs::new(services));
    let deployments = session.deployments(&options.selection)?;
    let interval = Duration::from_secs(interval);

    info!(
        "Watching {} service(s) in '{}' every {:?}",
        deployments.len(),
        session.environment,
        interval
    );

    let mut iteration = 0;
    loop {
        iteration += 1;
        let results = commands::run(
            CommandKind::Watch,
            &session.platforms,
            deployments.clone(),
            &options,
        )
        .await
        .context("Failed to run watch")?;
        let status = report(&results, &options)?;

        if iterations.is_some_and(|limit| iteration >= limit) {
            return Ok(status);
        }
        smol::Timer::after(interval).await;
    }
}
