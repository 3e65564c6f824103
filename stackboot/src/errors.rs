//! Error types for stackboot

use thiserror::Error;

/// Main error type for the bootstrap workflow
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Entropy source unavailable: {0}")]
    Entropy(String),

    #[error("Health check for {endpoint} exhausted after {attempts} attempts: {reason}")]
    HealthExhausted {
        endpoint: String,
        attempts: u32,
        reason: String,
    },

    #[error("Credential bootstrap failed: {0}")]
    CredentialError(String),

    #[error("Repository error: {0}")]
    RepositoryError(String),

    #[error("Container runtime error: {0}")]
    RuntimeError(String),

    #[error("Prompt error: {0}")]
    PromptError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Conditions that make the host unfit to run the workflow at all
#[derive(Error, Debug)]
pub enum PreconditionError {
    #[error("Insufficient privilege: {0}")]
    NotPrivileged(String),

    #[error("Unsupported operating system: {0}")]
    UnsupportedOs(String),

    #[error("Missing dependency '{name}' after install attempt")]
    MissingDependency { name: String },
}

/// Invalid topology or configuration, detected before any service starts
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Service '{service}' depends on unknown service '{dependency}'")]
    UnknownDependency { service: String, dependency: String },

    #[error("Dependency cycle detected: {}", cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },

    #[error("Service '{0}' is declared more than once")]
    DuplicateService(String),

    #[error("Missing configuration key: {0}")]
    MissingKey(String),

    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Malformed environment file: {0}")]
    MalformedEnvFile(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}

/// Error taxonomy used for propagation policy and exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No privilege, unsupported OS, missing executable. Aborts.
    FatalPrecondition,

    /// Dependency cycle, unknown reference, bad value. Aborts before services start.
    Configuration,

    /// Health check not passing within its budget. Reported, not fatal.
    TransientInfra,

    /// Handshake rejected or service unreachable. Reported, never aborts.
    CredentialBootstrap,

    /// Everything else (I/O, subprocess failures)
    Operational,
}

impl BootstrapError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BootstrapError::Precondition(_) | BootstrapError::Entropy(_) => {
                ErrorKind::FatalPrecondition
            }
            BootstrapError::Configuration(_) => ErrorKind::Configuration,
            BootstrapError::HealthExhausted { .. } => ErrorKind::TransientInfra,
            BootstrapError::CredentialError(_) => ErrorKind::CredentialBootstrap,
            _ => ErrorKind::Operational,
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }
}

impl ErrorKind {
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::Configuration => 2,
            ErrorKind::FatalPrecondition => 3,
            ErrorKind::TransientInfra => 4,
            ErrorKind::CredentialBootstrap | ErrorKind::Operational => 1,
        }
    }
}

impl From<anyhow::Error> for BootstrapError {
    fn from(err: anyhow::Error) -> Self {
        BootstrapError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_names_path() {
        let err = ConfigurationError::DependencyCycle {
            cycle: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        assert_eq!(err.to_string(), "Dependency cycle detected: a -> b -> a");
    }

    #[test]
    fn test_exit_codes() {
        let err: BootstrapError = PreconditionError::MissingDependency {
            name: "docker".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::FatalPrecondition);
        assert_eq!(err.exit_code(), 3);

        let err: BootstrapError = ConfigurationError::MissingKey("PORT".to_string()).into();
        assert_eq!(err.exit_code(), 2);

        let err = BootstrapError::RuntimeError("compose up failed".to_string());
        assert_eq!(err.exit_code(), 1);
    }
}
