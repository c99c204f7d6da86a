//! Integration tests for the multi-service executor against the mock platform

use async_trait::async_trait;
use service_lifecycle::platform::{MockCall, MockStrategy};
use service_lifecycle::{
    CommandKind, CommandOptions, CredentialStatus, Error, FORCE_CONTINUATION_KEY,
    HandlerRegistryBuilder, INTENDED_EFFECT_KEY, MockSettings, MultiServiceExecutor,
    PlatformKind, PlatformSet, PlatformSettings, PlatformStrategy, ResultStatus, Service,
    ServiceConfig, ServiceDeployment, ServiceSelection, commands,
};

fn mock_service(name: &str, settings: MockSettings) -> ServiceDeployment {
    let config = ServiceConfig {
        settings: PlatformSettings::Mock(settings),
        ..Default::default()
    };
    ServiceDeployment::new(Service::new(name, "staging", config), PlatformKind::Mock)
}

fn healthy(name: &str) -> ServiceDeployment {
    mock_service(name, MockSettings::default())
}

fn failing_on(name: &str, command: CommandKind) -> ServiceDeployment {
    mock_service(
        name,
        MockSettings {
            fail_on: vec![command],
            running: true,
            ..Default::default()
        },
    )
}

fn platforms(mock: &MockStrategy) -> PlatformSet {
    PlatformSet::builder().with_strategy(mock.clone()).build()
}

fn names(calls: &[MockCall]) -> Vec<&str> {
    calls.iter().map(|c| c.service.as_str()).collect()
}

#[smol_potat::test]
async fn test_all_success_summary() {
    let mock = MockStrategy::new("acme");
    let set = platforms(&mock);
    let deployments = vec![healthy("database"), healthy("backend"), healthy("frontend")];

    let results = commands::start(&set, deployments, &CommandOptions::new("staging"))
        .await
        .unwrap();

    let summary = results.summary();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 0);
    assert!(results.is_success());
    assert!(results.results().iter().all(|r| r.status == ResultStatus::Started));
    assert_eq!(results.command(), CommandKind::Start);
    assert_eq!(results.environment(), "staging");
}

#[smol_potat::test]
async fn test_noop_outcomes_are_successes() {
    let mock = MockStrategy::new("acme");
    let set = platforms(&mock);
    let running = mock_service(
        "backend",
        MockSettings {
            running: true,
            ..Default::default()
        },
    );

    let results = commands::start(&set, vec![running], &CommandOptions::new("staging"))
        .await
        .unwrap();
    assert_eq!(results.results()[0].status, ResultStatus::AlreadyRunning);
    assert!(results.results()[0].success);

    let stopped = commands::stop(&set, vec![healthy("worker")], &CommandOptions::new("staging"))
        .await
        .unwrap();
    assert_eq!(stopped.results()[0].status, ResultStatus::AlreadyStopped);
    assert_eq!(stopped.summary().failed, 0);
}

#[smol_potat::test]
async fn test_dry_run_never_touches_the_platform() {
    let mock = MockStrategy::new("acme");
    let set = platforms(&mock);
    let deployments = vec![
        failing_on("database", CommandKind::Provision),
        healthy("backend"),
    ];
    let options = CommandOptions::new("staging").with_dry_run(true);

    let results = commands::provision(&set, deployments, &options).await.unwrap();

    assert_eq!(results.results().len(), 2);
    for result in results.results() {
        assert!(result.success);
        assert_eq!(result.status, ResultStatus::DryRun);
        assert!(result.metadata.contains_key(INTENDED_EFFECT_KEY));
    }
    assert!(results.execution_context().dry_run);
    assert!(mock.calls().await.is_empty());
    assert!(mock.credential_checks().await.is_empty());
}

#[smol_potat::test]
async fn test_halt_on_failure_without_force() {
    let mock = MockStrategy::new("acme");
    let set = platforms(&mock);
    let deployments = vec![
        healthy("a"),
        failing_on("b", CommandKind::Restart),
        healthy("c"),
        healthy("d"),
    ];

    let results = commands::restart(&set, deployments, &CommandOptions::new("staging"))
        .await
        .unwrap();

    // failure at index 1 of 4
    assert_eq!(results.results().len(), 2);
    assert_eq!(results.results()[1].entity, "b");
    assert_eq!(results.results()[1].status, ResultStatus::Failed);
    assert_eq!(names(&mock.calls().await), ["a", "b"]);
    let summary = results.summary();
    assert_eq!(summary.succeeded + summary.failed, summary.total);
    assert_eq!(summary.total, results.results().len());
}

#[smol_potat::test]
async fn test_continue_on_error_verbs_run_everything() {
    let mock = MockStrategy::new("acme");
    let set = platforms(&mock);
    let deployments = vec![failing_on("a", CommandKind::Start), healthy("b")];

    let results = commands::start(&set, deployments, &CommandOptions::new("staging"))
        .await
        .unwrap();

    assert_eq!(results.results().len(), 2);
    assert_eq!(results.results()[0].status, ResultStatus::Failed);
    assert!(results.results()[1].success);
    // without force nothing is marked as a forced continuation
    assert!(!results.results()[1].metadata.contains_key(FORCE_CONTINUATION_KEY));
}

#[smol_potat::test]
async fn test_force_runs_everything_and_marks_continuation() {
    let mock = MockStrategy::new("acme");
    let set = platforms(&mock);
    let deployments = vec![
        healthy("a"),
        failing_on("b", CommandKind::Provision),
        healthy("c"),
        failing_on("d", CommandKind::Provision),
    ];
    let options = CommandOptions::new("staging").with_force(true);

    let results = commands::provision(&set, deployments, &options).await.unwrap();
    let results = results.results();

    assert_eq!(results.len(), 4);
    assert!(!results[0].metadata.contains_key(FORCE_CONTINUATION_KEY));
    assert_eq!(results[1].status, ResultStatus::ForceContinued);
    assert!(!results[1].success);
    for result in &results[2..] {
        assert_eq!(result.metadata[FORCE_CONTINUATION_KEY], true);
    }
    assert_eq!(results[3].status, ResultStatus::ForceContinued);
}

#[smol_potat::test]
async fn test_force_tags_failures_on_continuing_verbs() {
    let mock = MockStrategy::new("acme");
    let set = platforms(&mock);
    let deployments = || {
        vec![
            failing_on("a", CommandKind::Start),
            failing_on("b", CommandKind::Start),
            healthy("c"),
        ]
    };

    let plain = commands::start(&set, deployments(), &CommandOptions::new("staging"))
        .await
        .unwrap();
    assert_eq!(plain.results().len(), 3);
    assert_eq!(plain.results()[0].status, ResultStatus::Failed);
    assert_eq!(plain.results()[1].status, ResultStatus::Failed);

    let options = CommandOptions::new("staging").with_force(true);
    let forced = commands::start(&set, deployments(), &options).await.unwrap();
    let results = forced.results();
    assert_eq!(results[0].status, ResultStatus::ForceContinued);
    assert_eq!(results[1].status, ResultStatus::ForceContinued);
    assert_eq!(results[1].metadata[FORCE_CONTINUATION_KEY], true);
    assert!(results[2].success);
    assert_eq!(forced.summary().failed, 2);
}

#[smol_potat::test]
async fn test_stop_runs_in_reverse_order() {
    let mock = MockStrategy::new("acme");
    let set = platforms(&mock);
    let running = |name: &str| {
        mock_service(
            name,
            MockSettings {
                running: true,
                ..Default::default()
            },
        )
    };

    let results = commands::stop(
        &set,
        vec![running("a"), running("b"), running("c")],
        &CommandOptions::new("staging"),
    )
    .await
    .unwrap();

    let order: Vec<_> = results.results().iter().map(|r| r.entity.as_str()).collect();
    assert_eq!(order, ["c", "b", "a"]);
    assert_eq!(names(&mock.calls().await), ["c", "b", "a"]);
    assert!(results.results().iter().all(|r| r.status == ResultStatus::Stopped));
}

#[smol_potat::test]
async fn test_staging_stop_halts_on_database_failure() {
    let mock = MockStrategy::new("acme");
    let set = platforms(&mock);
    // the executor takes the list as given; only the stop entry point reverses
    let deployments = vec![failing_on("database", CommandKind::Stop), healthy("backend")];

    let results = MultiServiceExecutor::new(&set, &commands::Stop)
        .execute(deployments, &CommandOptions::new("staging"))
        .await
        .unwrap();

    assert_eq!(results.results().len(), 1);
    assert_eq!(results.results()[0].entity, "database");
    let summary = results.summary();
    assert_eq!((summary.total, summary.succeeded, summary.failed), (1, 0, 1));
}

#[smol_potat::test]
async fn test_credential_failure_short_circuits_platform() {
    let rejecting = MockStrategy::rejecting("acme", "session expired", "run `acme login`");
    let set = platforms(&rejecting);
    let deployments = vec![healthy("api"), healthy("worker")];
    let options = CommandOptions::new("staging").with_force(true);

    let results = commands::check(&set, deployments, &options).await.unwrap();

    assert_eq!(results.results().len(), 2);
    for result in results.results() {
        assert!(!result.success);
        assert!(result.is_credential_error());
        assert_eq!(result.status, ResultStatus::CredentialError);
        assert_eq!(result.metadata["remediation"], "run `acme login`");
    }
    assert!(rejecting.calls().await.is_empty());
    assert_eq!(rejecting.credential_checks().await.len(), 1);
}

#[smol_potat::test]
async fn test_credential_failure_halts_without_force() {
    let rejecting = MockStrategy::rejecting("acme", "session expired", "login");
    let set = platforms(&rejecting);

    let results = commands::provision(
        &set,
        vec![healthy("api"), healthy("worker")],
        &CommandOptions::new("staging"),
    )
    .await
    .unwrap();

    assert_eq!(results.results().len(), 1);
    assert!(results.results()[0].is_credential_error());
}

#[smol_potat::test]
async fn test_faults_and_panics_become_failures() {
    let mock = MockStrategy::new("acme");
    let set = platforms(&mock);
    let deployments = vec![
        mock_service(
            "faulty",
            MockSettings {
                fault_on: vec![CommandKind::Test],
                ..Default::default()
            },
        ),
        mock_service(
            "panicky",
            MockSettings {
                panic_on: vec![CommandKind::Test],
                ..Default::default()
            },
        ),
        healthy("fine"),
    ];

    let results = commands::test(&set, deployments, &CommandOptions::new("staging"))
        .await
        .unwrap();
    let results = results.results();

    assert_eq!(results.len(), 3);
    assert!(!results[0].success);
    assert!(results[0].error.as_deref().unwrap().contains("injected fault"));
    assert!(!results[1].success);
    assert!(results[1].error.as_deref().unwrap().contains("panicked"));
    assert_eq!(results[2].status, ResultStatus::TestsPassed);
}

#[smol_potat::test]
async fn test_missing_strategy_fails_only_that_service() {
    let mock = MockStrategy::new("acme");
    let set = platforms(&mock);
    let orphan = ServiceDeployment::new(
        Service::new("legacy", "staging", ServiceConfig::default()),
        PlatformKind::Aws,
    );

    let results = commands::update(&set, vec![orphan, healthy("api")], &CommandOptions::new("staging"))
        .await
        .unwrap();

    assert_eq!(results.results().len(), 2);
    assert!(results.results()[0].error.as_deref().unwrap().contains("aws"));
    assert!(results.results()[1].success);
}

struct Sparse;

#[async_trait]
impl PlatformStrategy for Sparse {
    fn platform(&self) -> PlatformKind {
        PlatformKind::External
    }

    fn resource_prefix(&self) -> &str {
        "sparse"
    }

    async fn validate_credentials(&self, _environment: &str) -> CredentialStatus {
        CredentialStatus::valid()
    }

    fn register_handlers(&self, _builder: &mut HandlerRegistryBuilder) {}
}

#[smol_potat::test]
async fn test_unsupported_combination_is_a_failed_result() {
    let set = PlatformSet::builder().with_strategy(Sparse).build();
    let deployment = ServiceDeployment::new(
        Service::new("payments", "staging", ServiceConfig::default()),
        PlatformKind::External,
    );

    let results = commands::publish(&set, vec![deployment], &CommandOptions::new("staging"))
        .await
        .unwrap();

    let result = &results.results()[0];
    assert!(!result.success);
    assert_eq!(
        result.error.as_deref(),
        Some("'publish' is not supported on platform 'external' for service type 'generic'")
    );
}

#[smol_potat::test]
async fn test_exec_requires_named_services() {
    let mock = MockStrategy::new("acme");
    let set = platforms(&mock);
    let mut options = CommandOptions::new("staging");
    options.extras.exec = vec!["ls".to_string()];

    let err = commands::exec(&set, vec![healthy("api")], &options)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(mock.calls().await.is_empty());

    mock.set_running("acme-api-staging", true).await;
    let options = options.with_selection(ServiceSelection::Named(vec!["api".to_string()]));
    let results = commands::exec(&set, vec![healthy("api")], &options).await.unwrap();
    assert_eq!(results.results()[0].status, ResultStatus::Executed);
}

#[smol_potat::test]
async fn test_check_reports_discovered_endpoint_and_logs() {
    let mock = MockStrategy::new("acme");
    let set = platforms(&mock);
    let mut options = CommandOptions::new("staging");
    options.extras.include_logs = true;
    let deployment = mock_service(
        "api",
        MockSettings {
            running: true,
            logs: vec!["ready".to_string()],
            ..Default::default()
        },
    );

    let results = commands::run(CommandKind::Check, &set, vec![deployment], &options)
        .await
        .unwrap();

    let result = &results.results()[0];
    assert_eq!(result.status, ResultStatus::Running);
    let resources = result.resources.as_ref().unwrap();
    assert_eq!(resources.resource_name.as_deref(), Some("acme-api-staging"));
    assert_eq!(resources.endpoint.as_deref(), Some("mock://acme-api-staging"));
}
