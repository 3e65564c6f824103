//! stackboot - Entry Point
//!
//! Provisions the application stack on this host and issues its first
//! access key.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use tracing::{error, info};

use stackboot::app::options::{AppOptions, Cli};
use stackboot::app::prompt::LinePrompter;
use stackboot::app::report::print_summary;
use stackboot::app::run::{run, Stages};
use stackboot::config::resolve::Prompter;
use stackboot::errors::BootstrapError;
use stackboot::filesys::file::File;
use stackboot::installer::host::detect_package_manager;
use stackboot::installer::prereqs::SystemPackageInstaller;
use stackboot::installer::repository::GitRepository;
use stackboot::installer::runtime::ComposeRuntime;
use stackboot::logs::{init_logging, LogOptions};
use stackboot::storage::settings::Settings;
use stackboot::utils::version_info;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load_settings(&cli).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            return ExitCode::from(2);
        }
    };
    let options = AppOptions::from_cli(&cli, settings);

    // Keep the guard alive so the file writer flushes on exit
    let _log_guard = match init_logging(LogOptions {
        log_level: options.settings.log_level.clone(),
        json_format: options.settings.log_json,
        log_file: options.settings.log_file.clone(),
    }) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    let version = version_info();
    info!(
        "stackboot {} ({}, built {})",
        version.version, version.git_hash, version.build_time
    );

    let installer = SystemPackageInstaller::new(detect_package_manager());
    let runtime = ComposeRuntime::new();
    let stages = Stages {
        installer: &installer,
        repository: &GitRepository,
        runtime: &runtime,
    };

    let mut prompter = LinePrompter::stdio();
    let prompter: Option<&mut dyn Prompter> = if options.interactive {
        Some(&mut prompter)
    } else {
        None
    };

    match run(&options, stages, prompter, tokio::time::sleep).await {
        Ok(report) => {
            print_summary(&report);
            ExitCode::from(report.exit_code() as u8)
        }
        Err(e) => fail(e),
    }
}

async fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    match &cli.settings {
        Some(path) => Settings::load(&File::new(path))
            .await
            .with_context(|| format!("unable to read settings file {}", path.display())),
        None => Ok(Settings::default()),
    }
}

fn fail(e: BootstrapError) -> ExitCode {
    error!("Bootstrap failed: {}", e);
    eprintln!("{} {}", "error:".red().bold(), e);
    ExitCode::from(e.exit_code() as u8)
}
