//! Integration tests for stack-config

use service_lifecycle::{
    DeploymentResolver, Error, PlatformKind, PlatformSettings, ServiceSelection, ServiceType,
};
use stack_config::{ConfigError, EnvironmentResolver, ResolutionContext, parse_file, parse_str};
use std::io::Write;
use tempfile::NamedTempFile;

const STACK: &str = r#"
version: "1.0"
project: acme

defaults:
  environment:
    LOG_LEVEL: info

environments:
  staging:
    platform: container
    settings:
      aws:
        region: us-east-1
        profile: staging
      container:
        network: acme-staging
    services:
      frontend:
        type: frontend
        platform: aws
        static_site: true
        bucket: "acme-${STAGE:-staging}-site"
        dependencies: [backend]
      backend:
        platform: posix
        command: ["./bin/backend", "--db", "${DB_HOST}"]
        port: 4000
        environment:
          PORT: 4000
          DEBUG: true
        dependencies: [database]
      database:
        type: database
        image: "postgres:16"
        port: 5432
        storage:
          persistent: true
      worker:
        image: "acme/worker:latest"

  prod:
    platform: aws
    services:
      backend:
        port: 4000
"#;

fn resolver() -> EnvironmentResolver {
    let context = ResolutionContext::empty().with_var("DB_HOST", "db.internal");
    EnvironmentResolver::new(parse_str(STACK).unwrap()).with_context(context)
}

fn names(resolver: &EnvironmentResolver, selection: &ServiceSelection) -> Vec<String> {
    resolver
        .resolve("staging", selection)
        .unwrap()
        .iter()
        .map(|d| d.name().to_string())
        .collect()
}

#[test]
fn test_dependencies_come_first() {
    let order = names(&resolver(), &ServiceSelection::All);
    assert_eq!(order, ["database", "backend", "frontend", "worker"]);
}

#[test]
fn test_named_selection_keeps_dependency_order() {
    let selection = ServiceSelection::Named(vec!["frontend".into(), "database".into()]);
    assert_eq!(names(&resolver(), &selection), ["database", "frontend"]);
}

#[test]
fn test_unknown_environment_and_service() {
    let resolver = resolver();
    let err = resolver.resolve("qa", &ServiceSelection::All).unwrap_err();
    assert!(matches!(err, Error::UnknownEnvironment(ref name) if name == "qa"));

    let selection = ServiceSelection::Named(vec!["cache".into()]);
    let err = resolver.resolve("staging", &selection).unwrap_err();
    assert!(matches!(err, Error::UnknownService { .. }));
    assert!(err.is_configuration());
}

#[test]
fn test_platform_assignment_and_settings_layering() {
    let deployments = resolver().resolve("staging", &ServiceSelection::All).unwrap();

    let database = &deployments[0];
    assert_eq!(database.platform, PlatformKind::Container);
    assert_eq!(database.service.service_type(), ServiceType::Database);
    let container = database.service.config.settings.container().unwrap();
    assert_eq!(container.image.as_deref(), Some("postgres:16"));
    assert_eq!(container.network.as_deref(), Some("acme-staging"));
    assert_eq!(
        database.service.config.environment.get("LOG_LEVEL").map(String::as_str),
        Some("info")
    );

    let backend = &deployments[1];
    assert_eq!(backend.platform, PlatformKind::Posix);
    let posix = backend.service.config.settings.posix().unwrap();
    assert_eq!(posix.command, ["./bin/backend", "--db", "db.internal"]);
    // the service's own environment map replaces the default one
    assert_eq!(backend.service.config.environment.get("PORT").map(String::as_str), Some("4000"));
    assert_eq!(backend.service.config.environment.get("DEBUG").map(String::as_str), Some("true"));
    assert!(!backend.service.config.environment.contains_key("LOG_LEVEL"));

    let frontend = &deployments[2];
    assert_eq!(frontend.platform, PlatformKind::Aws);
    let PlatformSettings::Aws(aws) = &frontend.service.config.settings else {
        panic!("frontend should carry aws settings");
    };
    assert_eq!(aws.region.as_deref(), Some("us-east-1"));
    assert_eq!(aws.bucket.as_deref(), Some("acme-staging-site"));
    assert!(aws.static_site);
}

#[test]
fn test_missing_variable_is_a_configuration_error() {
    let resolver = EnvironmentResolver::new(parse_str(STACK).unwrap())
        .with_context(ResolutionContext::empty());
    let err = resolver.resolve("staging", &ServiceSelection::All).unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("DB_HOST"));
}

#[test]
fn test_environments_in_declaration_order() {
    assert_eq!(resolver().environments(), ["staging", "prod"]);
}

#[test]
fn test_parse_file_from_disk() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(STACK.as_bytes()).unwrap();

    let config = parse_file(file.path()).unwrap();
    assert_eq!(config.project, "acme");

    let resolver = EnvironmentResolver::from_file(file.path()).unwrap();
    assert_eq!(resolver.project(), "acme");
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = parse_file(dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::ReadError(_)));
}

#[test]
fn test_service_without_platform_is_rejected() {
    let yaml = r#"
version: "1.0"
project: acme
environments:
  dev:
    services:
      api: { port: 8080 }
"#;
    let err = parse_str(yaml).unwrap_err();
    assert!(err.to_string().contains("has no platform"));
}
