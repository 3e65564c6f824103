//! Command line options

use std::path::PathBuf;

use clap::Parser;

use crate::logs::LogLevel;
use crate::storage::settings::{ExistingDirPolicy, Settings};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_HASH"),
    ", built ",
    env!("BUILD_TIME"),
    ")"
);

/// Bring up the application stack on this host and issue its first access key
#[derive(Debug, Clone, Parser)]
#[command(name = "stackboot", version, long_version = LONG_VERSION, about)]
pub struct Cli {
    /// Never prompt; use defaults and generated secrets
    #[arg(short = 'y', long)]
    pub non_interactive: bool,

    /// Repository holding the application service
    #[arg(long, env = "STACKBOOT_REPO", value_name = "URL")]
    pub repo: Option<String>,

    /// Installation directory
    #[arg(long, env = "STACKBOOT_DIR", value_name = "PATH")]
    pub dir: Option<PathBuf>,

    /// Delete and re-clone a non-empty installation directory
    #[arg(long)]
    pub replace_existing: bool,

    /// Mint new secrets even if the environment file already has them
    #[arg(long)]
    pub regenerate_secrets: bool,

    /// Set a configuration value (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub set: Vec<(String, String)>,

    /// Where to write the access key
    #[arg(long, value_name = "PATH")]
    pub access_key: Option<PathBuf>,

    /// JSON settings file
    #[arg(long, value_name = "PATH")]
    pub settings: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "STACKBOOT_LOG_LEVEL", value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Do not probe the public front door
    #[arg(long)]
    pub skip_front_door: bool,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

/// Everything a run needs, after merging settings and flags
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub settings: Settings,
    pub interactive: bool,
    pub regenerate_secrets: bool,
    /// `--set` pairs, validated by the configurator
    pub overrides: Vec<(String, String)>,
}

impl AppOptions {
    /// Flags and their environment fallbacks win over the settings file
    pub fn from_cli(cli: &Cli, mut settings: Settings) -> Self {
        if let Some(repo) = &cli.repo {
            settings.repository_url = repo.clone();
        }
        if let Some(dir) = &cli.dir {
            settings.install_dir = dir.clone();
        }
        if cli.replace_existing {
            settings.existing_dir_policy = ExistingDirPolicy::Replace;
        }
        if let Some(path) = &cli.access_key {
            settings.access_key_path = Some(path.clone());
        }
        if let Some(level) = &cli.log_level {
            settings.log_level = level.clone();
        }
        if cli.skip_front_door {
            settings.health.check_front_door = false;
        }

        Self {
            settings,
            interactive: !cli.non_interactive,
            regenerate_secrets: cli.regenerate_secrets,
            overrides: cli.set.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_settings() {
        let cli = Cli::try_parse_from([
            "stackboot",
            "-y",
            "--dir",
            "/srv/app",
            "--replace-existing",
            "--set",
            "PORT=4000",
            "--set",
            "PUBLIC_HOST=example.org",
            "--log-level",
            "debug",
            "--skip-front-door",
        ])
        .unwrap();

        let options = AppOptions::from_cli(&cli, Settings::default());
        assert!(!options.interactive);
        assert_eq!(options.settings.install_dir, PathBuf::from("/srv/app"));
        assert_eq!(options.settings.existing_dir_policy, ExistingDirPolicy::Replace);
        assert_eq!(options.settings.log_level, LogLevel::Debug);
        assert!(!options.settings.health.check_front_door);
        assert_eq!(
            options.overrides,
            vec![
                ("PORT".to_string(), "4000".to_string()),
                ("PUBLIC_HOST".to_string(), "example.org".to_string()),
            ]
        );
    }

    #[test]
    fn test_malformed_set_is_rejected() {
        assert!(Cli::try_parse_from(["stackboot", "--set", "PORT"]).is_err());
        assert!(Cli::try_parse_from(["stackboot", "--set", "=1"]).is_err());
    }

    #[test]
    fn test_defaults_are_interactive() {
        let cli = Cli::try_parse_from(["stackboot"]).unwrap();
        let options = AppOptions::from_cli(&cli, Settings::default());
        assert!(options.interactive);
        assert_eq!(options.settings.existing_dir_policy, ExistingDirPolicy::Reuse);
    }
}
