//! Credential pre-flight
//!
//! Validates each distinct platform once, in first-appearance order, before
//! any service is attempted. Services on a rejected platform get a failed
//! result carrying the remediation and are never dispatched.

use crate::{
    CREDENTIAL_ERROR_KEY, CredentialStatus, PlatformKind, PlatformSet, REMEDIATION_KEY,
    ResultStatus, ServiceDeployment, ServiceResult,
};
use tracing::{debug, warn};

/// Credential status per platform
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreflightReport {
    checked: Vec<(PlatformKind, CredentialStatus)>,
}

impl PreflightReport {
    /// Status of a platform if it failed validation
    pub fn rejection(&self, platform: PlatformKind) -> Option<&CredentialStatus> {
        self.checked
            .iter()
            .find(|(kind, status)| *kind == platform && !status.valid)
            .map(|(_, status)| status)
    }

    /// Platforms in the order they were validated
    pub fn platforms(&self) -> Vec<PlatformKind> {
        self.checked.iter().map(|(kind, _)| *kind).collect()
    }

    /// Whether every validated platform passed
    pub fn all_valid(&self) -> bool {
        self.checked.iter().all(|(_, status)| status.valid)
    }
}

/// Validate every platform used by `deployments` exactly once
///
/// Platforms without a registered strategy are skipped here; dispatch
/// reports them per service.
pub async fn validate(
    platforms: &PlatformSet,
    deployments: &[ServiceDeployment],
    environment: &str,
) -> PreflightReport {
    let mut report = PreflightReport::default();
    for deployment in deployments {
        let platform = deployment.platform;
        if report.checked.iter().any(|(kind, _)| *kind == platform) {
            continue;
        }
        let Ok(strategy) = platforms.strategy(platform) else {
            continue;
        };

        debug!("Validating {} credentials for '{}'", platform, environment);
        let status = strategy.validate_credentials(environment).await;
        if !status.valid {
            warn!(
                "{} credentials rejected: {}",
                platform,
                status.error.as_deref().unwrap_or("no reason given")
            );
        }
        report.checked.push((platform, status));
    }
    report
}

/// Failed result for a service whose platform was rejected
pub fn credential_failure(deployment: &ServiceDeployment, status: &CredentialStatus) -> ServiceResult {
    let error = status
        .error
        .clone()
        .unwrap_or_else(|| format!("{} credentials are not valid", deployment.platform));
    let remediation = status
        .remediation
        .clone()
        .unwrap_or_else(|| format!("check {} credentials", deployment.platform));
    ServiceResult::failure(deployment.name(), deployment.platform, error)
        .with_status(ResultStatus::CredentialError)
        .with_metadata(CREDENTIAL_ERROR_KEY, true)
        .with_metadata(REMEDIATION_KEY, remediation)
}
