//! Operator-facing output

use std::path::PathBuf;

use colored::Colorize;

use crate::config::resolve::{ResolvedEnvironment, ValueSource};
use crate::health::{HealthCheckResult, HealthOutcome};
use crate::installer::fsm::InstallState;
use crate::installer::repository::Acquisition;

/// Exit code when the application never became healthy
pub const EXIT_APP_UNHEALTHY: i32 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialOutcome {
    Issued(PathBuf),
    Failed(String),
    Skipped(String),
}

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub states: Vec<InstallState>,
    pub acquisition: Acquisition,
    pub env_file_written: bool,
    pub start_order: Vec<String>,
    pub app_health: HealthCheckResult,
    pub front_door_health: Option<HealthCheckResult>,
    pub credential: CredentialOutcome,
    /// Verification findings; empty when everything checked out
    pub findings: Vec<String>,
    pub warnings: Vec<String>,
}

impl RunReport {
    pub fn exit_code(&self) -> i32 {
        if self.app_health.is_ready() {
            0
        } else {
            EXIT_APP_UNHEALTHY
        }
    }
}

/// Show freshly generated or defaulted values. They are never shown again.
pub fn print_new_values(resolved: &ResolvedEnvironment) {
    let values = resolved.values_to_echo();
    if values.is_empty() {
        return;
    }

    println!();
    println!("{}", "Record these values now, they will not be shown again:".yellow().bold());
    for (key, value, source) in values {
        let tag = match source {
            ValueSource::Generated => "generated",
            _ => "default",
        };
        println!("  {}={}  {}", key.name().bold(), value, format!("({})", tag).dimmed());
    }
    println!();
}

pub fn print_summary(report: &RunReport) {
    println!();
    println!("{}", "Summary".bold());

    let acquisition = match report.acquisition {
        Acquisition::Cloned => "cloned",
        Acquisition::Reused => "reused existing checkout",
        Acquisition::Replaced => "replaced existing checkout",
    };
    println!("  Repository:    {}", acquisition);
    println!(
        "  Environment:   {}",
        if report.env_file_written { "written" } else { "unchanged" }
    );
    println!("  Services:      {}", report.start_order.join(", "));
    println!("  Application:   {}", health_line(&report.app_health));
    if let Some(front_door) = &report.front_door_health {
        println!("  Front door:    {}", health_line(front_door));
    }

    match &report.credential {
        CredentialOutcome::Issued(path) => {
            println!("  Access key:    {}", path.display().to_string().green());
        }
        CredentialOutcome::Failed(reason) | CredentialOutcome::Skipped(reason) => {
            println!("  Access key:    {} ({})", "not issued".red(), reason);
            println!(
                "{}",
                "  Obtain one manually once the service is up: POST an Ed25519-signed challenge to /v1/auth"
                    .dimmed()
            );
        }
    }

    for warning in report.warnings.iter().chain(report.findings.iter()) {
        println!("  {} {}", "!".yellow().bold(), warning);
    }
}

fn health_line(result: &HealthCheckResult) -> String {
    match &result.outcome {
        HealthOutcome::Ready => format!("{} ({} attempt(s))", "ready".green(), result.attempt),
        HealthOutcome::Pending => "pending".yellow().to_string(),
        HealthOutcome::Exhausted { last_error } => format!(
            "{} after {} attempts: {}",
            "not ready".red(),
            result.attempt,
            last_error
        ),
    }
}
