//! Rendering of command results

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, Table};
use service_lifecycle::{
    CommandResults, INTENDED_EFFECT_KEY, OutputFormat, REMEDIATION_KEY, ResultDetails,
    ResultStatus, ServiceResult,
};
use std::fmt::Write;

/// Render one command's results in the requested format
pub fn render(results: &CommandResults, format: OutputFormat, quiet: bool) -> Result<String> {
    match format {
        OutputFormat::Summary => Ok(summary(results, quiet)),
        OutputFormat::Json => {
            serde_json::to_string_pretty(results).context("Failed to serialize results as JSON")
        }
        OutputFormat::Yaml => {
            serde_yaml::to_string(results).context("Failed to serialize results as YAML")
        }
        OutputFormat::Table => Ok(table(results).to_string()),
    }
}

fn mark(result: &ServiceResult) -> &'static str {
    if result.success { "✓" } else { "✗" }
}

/// One-line description of what happened beyond the status
fn detail(result: &ServiceResult) -> Option<String> {
    if let Some(error) = &result.error {
        return Some(error.clone());
    }
    if let Some(effect) = result.metadata.get(INTENDED_EFFECT_KEY).and_then(|v| v.as_str()) {
        return Some(effect.to_string());
    }
    match &result.details {
        Some(ResultDetails::Start {
            endpoint: Some(endpoint),
            ..
        }) => Some(endpoint.clone()),
        Some(ResultDetails::Publish {
            artifact: Some(artifact),
            ..
        }) => Some(artifact.clone()),
        Some(ResultDetails::Update {
            new_version: Some(version),
            ..
        }) => Some(version.clone()),
        Some(ResultDetails::Provision { created }) if !created.is_empty() => {
            Some(created.join(", "))
        }
        Some(ResultDetails::Exec {
            exit_code: Some(code),
            ..
        }) => Some(format!("exit code {}", code)),
        _ => result
            .resources
            .as_ref()
            .and_then(|r| r.endpoint.clone().or_else(|| r.id.clone())),
    }
}

/// Multi-line output attached to a result: exec output and logs
fn body(result: &ServiceResult) -> Vec<String> {
    match &result.details {
        Some(ResultDetails::Exec { stdout, stderr, .. }) => stdout
            .lines()
            .chain(stderr.lines())
            .map(str::to_string)
            .collect(),
        Some(ResultDetails::Check {
            logs: Some(logs), ..
        }) => logs.iter().map(|l| l.message.clone()).collect(),
        Some(ResultDetails::Watch { recent_logs, .. }) => {
            recent_logs.iter().map(|l| l.message.clone()).collect()
        }
        _ => Vec::new(),
    }
}

fn summary(results: &CommandResults, quiet: bool) -> String {
    let mut out = String::new();
    let dry_run = if results.execution_context().dry_run {
        " (dry run)"
    } else {
        ""
    };
    if !quiet {
        let _ = writeln!(out, "{} {}{}", results.command(), results.environment(), dry_run);
    }

    let width = results
        .results()
        .iter()
        .map(|r| r.entity.len())
        .max()
        .unwrap_or(0);

    for result in results.results() {
        if quiet && result.success {
            continue;
        }
        let _ = write!(
            out,
            "  {} {:<width$}  {:<9}  {}",
            mark(result),
            result.entity,
            result.platform.as_str(),
            result.status,
            width = width
        );
        if let Some(detail) = detail(result) {
            let _ = write!(out, ": {}", detail);
        }
        out.push('\n');

        for warning in &result.warnings {
            let _ = writeln!(out, "      warning: {}", warning);
        }
        if let Some(remediation) = result.metadata.get(REMEDIATION_KEY).and_then(|v| v.as_str()) {
            let _ = writeln!(out, "      remediation: {}", remediation);
        }
        if !quiet {
            for line in body(result) {
                let _ = writeln!(out, "      | {}", line);
            }
        }
    }

    let totals = results.summary();
    let _ = writeln!(
        out,
        "{} service(s): {} succeeded, {} failed ({:.1}s)",
        totals.total,
        totals.succeeded,
        totals.failed,
        results.duration().as_secs_f64()
    );
    out
}

fn status_color(status: ResultStatus, success: bool) -> Color {
    if !success {
        Color::Red
    } else if status.is_noop() || status == ResultStatus::DryRun {
        Color::DarkGrey
    } else if matches!(status, ResultStatus::NotRunning | ResultStatus::Unhealthy) {
        Color::Yellow
    } else {
        Color::Green
    }
}

fn table(results: &CommandResults) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["SERVICE", "PLATFORM", "STATUS", "DETAILS"]);

    for result in results.results() {
        let mut details = detail(result).unwrap_or_default();
        for warning in &result.warnings {
            if !details.is_empty() {
                details.push('\n');
            }
            details.push_str(warning);
        }
        table.add_row(vec![
            Cell::new(&result.entity),
            Cell::new(result.platform),
            Cell::new(result.status).fg(status_color(result.status, result.success)),
            Cell::new(details),
        ]);
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use service_lifecycle::{CommandKind, ExecutionContext, PlatformKind};
    use std::time::Duration;

    fn sample(dry_run: bool) -> CommandResults {
        let results = vec![
            ServiceResult::success("database", PlatformKind::Container, ResultStatus::Started),
            ServiceResult::failure("backend", PlatformKind::Posix, "exited immediately")
                .with_warning("port 4000 already bound"),
        ];
        CommandResults::new(
            CommandKind::Start,
            "staging",
            chrono::Utc::now(),
            Duration::from_millis(1200),
            results,
            ExecutionContext::current(dry_run),
        )
    }

    #[test]
    fn test_summary_lists_every_service_and_totals() {
        let text = render(&sample(false), OutputFormat::Summary, false).unwrap();
        assert!(text.starts_with("start staging\n"));
        assert!(text.contains("✓ database"));
        assert!(text.contains("✗ backend"));
        assert!(text.contains("failed: exited immediately"));
        assert!(text.contains("warning: port 4000 already bound"));
        assert!(text.contains("2 service(s): 1 succeeded, 1 failed (1.2s)"));
    }

    #[test]
    fn test_quiet_summary_hides_successes() {
        let text = render(&sample(false), OutputFormat::Summary, true).unwrap();
        assert!(!text.contains("database"));
        assert!(text.contains("backend"));
    }

    #[test]
    fn test_json_is_camel_case() {
        let text = render(&sample(true), OutputFormat::Json, false).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["command"], "start");
        assert_eq!(value["summary"]["failed"], 1);
        assert_eq!(value["executionContext"]["dryRun"], true);
        assert_eq!(value["results"][1]["status"], "failed");
    }

    #[test]
    fn test_table_has_a_row_per_service() {
        let text = render(&sample(false), OutputFormat::Table, false).unwrap();
        assert!(text.contains("SERVICE"));
        assert!(text.contains("database"));
        assert!(text.contains("exited immediately"));
    }
}
