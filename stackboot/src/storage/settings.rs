//! Settings file management

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{BootstrapError, ConfigurationError};
use crate::filesys::file::File;
use crate::installer::prereqs::Prerequisite;
use crate::logs::LogLevel;

/// What to do with a non-empty install directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistingDirPolicy {
    /// Keep the existing checkout and continue (logged as a warning)
    #[default]
    Reuse,

    /// Delete and clone again, after explicit confirmation
    Replace,
}

/// Bootstrap settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON
    #[serde(default)]
    pub log_json: bool,

    /// Also append logs to this file
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Repository holding the application service sources
    #[serde(default = "default_repository_url")]
    pub repository_url: String,

    /// Installation directory (repository checkout and rendered files)
    #[serde(default = "default_install_dir")]
    pub install_dir: PathBuf,

    /// Policy for a non-empty installation directory
    #[serde(default)]
    pub existing_dir_policy: ExistingDirPolicy,

    /// Where the access key is written; defaults to the per-user config dir
    #[serde(default)]
    pub access_key_path: Option<PathBuf>,

    /// Refuse to run without root privileges
    #[serde(default = "default_true")]
    pub require_root: bool,

    /// Executables that must be present before anything else happens
    #[serde(default = "default_prerequisites")]
    pub prerequisites: Vec<Prerequisite>,

    /// Health gate configuration
    #[serde(default)]
    pub health: HealthSettings,

    /// Application service endpoints
    #[serde(default)]
    pub service: ServiceSettings,
}

fn default_true() -> bool {
    true
}

fn default_repository_url() -> String {
    "https://github.com/stackboot/app-server.git".to_string()
}

fn default_install_dir() -> PathBuf {
    PathBuf::from("/opt/app")
}

fn default_prerequisites() -> Vec<Prerequisite> {
    vec![
        Prerequisite::new("container runtime", "docker", "docker.io"),
        Prerequisite::new("version control", "git", "git"),
        Prerequisite::new("http client", "curl", "curl"),
    ]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_file: None,
            repository_url: default_repository_url(),
            install_dir: default_install_dir(),
            existing_dir_policy: ExistingDirPolicy::Reuse,
            access_key_path: None,
            require_root: true,
            prerequisites: default_prerequisites(),
            health: HealthSettings::default(),
            service: ServiceSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file
    pub async fn load(file: &File) -> Result<Self, BootstrapError> {
        let settings: Settings = file.read_json().await?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        url::Url::parse(&self.repository_url).map_err(|e| {
            ConfigurationError::InvalidSettings(format!(
                "repository_url '{}': {}",
                self.repository_url, e
            ))
        })?;

        if let Some(front_door_url) = &self.health.front_door_url {
            url::Url::parse(front_door_url).map_err(|e| {
                ConfigurationError::InvalidSettings(format!(
                    "front_door_url '{}': {}",
                    front_door_url, e
                ))
            })?;
        }

        if self.install_dir.as_os_str().is_empty() {
            return Err(ConfigurationError::InvalidSettings(
                "install_dir cannot be empty".to_string(),
            ));
        }

        if self.health.max_attempts == 0 || self.health.front_door_max_attempts == 0 {
            return Err(ConfigurationError::InvalidSettings(
                "health check attempts must be at least 1".to_string(),
            ));
        }

        if !self.service.auth_path.starts_with('/') || !self.service.health_path.starts_with('/') {
            return Err(ConfigurationError::InvalidSettings(
                "service paths must start with '/'".to_string(),
            ));
        }

        Ok(())
    }
}

/// Health gate settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSettings {
    /// Fixed delay between attempts
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Attempts against the application service
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Probe the public front door after the application is ready
    #[serde(default = "default_true")]
    pub check_front_door: bool,

    /// Attempts against the front door
    #[serde(default = "default_front_door_max_attempts")]
    pub front_door_max_attempts: u32,

    /// Probe this base URL instead of `https://PUBLIC_HOST`
    #[serde(default)]
    pub front_door_url: Option<String>,
}

fn default_interval_ms() -> u64 {
    2000
}

fn default_max_attempts() -> u32 {
    30
}

fn default_front_door_max_attempts() -> u32 {
    10
}

impl HealthSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_attempts: default_max_attempts(),
            check_front_door: true,
            front_door_max_attempts: default_front_door_max_attempts(),
            front_door_url: None,
        }
    }
}

/// Application service endpoints and markers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Host the application is reached on from this machine
    #[serde(default = "default_local_host")]
    pub local_host: String,

    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Body marker of a healthy response
    #[serde(default = "default_health_marker")]
    pub health_marker: String,

    /// Body marker of the root greeting
    #[serde(default = "default_greeting_marker")]
    pub greeting_marker: String,

    #[serde(default = "default_auth_path")]
    pub auth_path: String,
}

fn default_local_host() -> String {
    "127.0.0.1".to_string()
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_health_marker() -> String {
    "ok".to_string()
}

fn default_greeting_marker() -> String {
    "Welcome".to_string()
}

fn default_auth_path() -> String {
    "/v1/auth".to_string()
}

impl ServiceSettings {
    /// Base URL of the application service on the internal network
    pub fn local_base_url(&self, port: u16) -> String {
        format!("http://{}:{}", self.local_host, port)
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            local_host: default_local_host(),
            health_path: default_health_path(),
            health_marker: default_health_marker(),
            greeting_marker: default_greeting_marker(),
            auth_path: default_auth_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.install_dir, PathBuf::from("/opt/app"));
        assert_eq!(settings.existing_dir_policy, ExistingDirPolicy::Reuse);
        assert_eq!(settings.prerequisites.len(), 3);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_json() {
        let json = r#"{
            "log_level": "debug",
            "install_dir": "/srv/stack",
            "existing_dir_policy": "replace",
            "require_root": false,
            "health": { "interval_ms": 10, "max_attempts": 5 }
        }"#;

        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.log_level, LogLevel::Debug);
        assert_eq!(settings.install_dir, PathBuf::from("/srv/stack"));
        assert_eq!(settings.existing_dir_policy, ExistingDirPolicy::Replace);
        assert!(!settings.require_root);
        assert_eq!(settings.health.max_attempts, 5);
        assert!(settings.health.check_front_door);
        assert_eq!(settings.service.auth_path, "/v1/auth");
        assert_eq!(settings.repository_url, default_repository_url());
    }

    #[test]
    fn test_validation() {
        let mut settings = Settings::default();
        settings.repository_url = "not a url".to_string();
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.health.max_attempts = 0;
        assert!(settings.validate().is_err());
    }
}
