//! Environment file model
//!
//! The environment file is the single source of truth for every value the
//! topology consumes. It is a flat list of `KEY=value` lines, recognised keys
//! first in declaration order, then any unrecognised lines found in an
//! existing file, preserved as-is. Comments and operator-added entries are
//! never unquoted or expanded; only recognised keys go through the dotenv
//! parser.

use std::collections::BTreeMap;
use std::fmt;

use secrecy::{ExposeSecret, SecretString};

use crate::errors::{BootstrapError, ConfigurationError};
use crate::filesys::file::File;
use crate::secrets::SecretProfile;

const HEADER: &str = "# Managed by stackboot. Existing values are reused on every run.\n";

/// Recognised configuration keys, in file order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EnvKey {
    MasterSecret,
    PostgresPassword,
    RedisPassword,
    MinioRootPassword,
    PublicHost,
    Port,
    MinioRootUser,
    CloudflareApiToken,
}

impl EnvKey {
    pub const ALL: [EnvKey; 8] = [
        EnvKey::MasterSecret,
        EnvKey::PostgresPassword,
        EnvKey::RedisPassword,
        EnvKey::MinioRootPassword,
        EnvKey::PublicHost,
        EnvKey::Port,
        EnvKey::MinioRootUser,
        EnvKey::CloudflareApiToken,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EnvKey::MasterSecret => "MASTER_SECRET",
            EnvKey::PostgresPassword => "POSTGRES_PASSWORD",
            EnvKey::RedisPassword => "REDIS_PASSWORD",
            EnvKey::MinioRootPassword => "MINIO_ROOT_PASSWORD",
            EnvKey::PublicHost => "PUBLIC_HOST",
            EnvKey::Port => "PORT",
            EnvKey::MinioRootUser => "MINIO_ROOT_USER",
            EnvKey::CloudflareApiToken => "CLOUDFLARE_API_TOKEN",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            EnvKey::MasterSecret => "Master secret used by the application to sign tokens",
            EnvKey::PostgresPassword => "Password of the PostgreSQL datastore",
            EnvKey::RedisPassword => "Password of the Redis cache",
            EnvKey::MinioRootPassword => "Root password of the MinIO object store",
            EnvKey::PublicHost => "Public host name served by the front door",
            EnvKey::Port => "Port the application service listens on",
            EnvKey::MinioRootUser => "Root user of the MinIO object store",
            EnvKey::CloudflareApiToken => "Cloudflare API token for DNS-based TLS issuance",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Required keys must be present in the file before rendering
    pub fn is_required(&self) -> bool {
        !matches!(self, EnvKey::MinioRootUser | EnvKey::CloudflareApiToken)
    }

    /// Keys holding generated secrets
    pub fn secret_profile(&self) -> Option<SecretProfile> {
        match self {
            EnvKey::MasterSecret | EnvKey::MinioRootPassword => Some(SecretProfile::Long),
            EnvKey::PostgresPassword | EnvKey::RedisPassword => Some(SecretProfile::Short),
            _ => None,
        }
    }

    pub fn is_secret(&self) -> bool {
        self.secret_profile().is_some() || matches!(self, EnvKey::CloudflareApiToken)
    }

    /// Documented default; secrets have none
    pub fn default_value(&self) -> Option<&'static str> {
        match self {
            EnvKey::PublicHost => Some("localhost"),
            EnvKey::Port => Some("3005"),
            EnvKey::MinioRootUser => Some("minio"),
            _ => None,
        }
    }

    /// Validate a candidate value for this key
    ///
    /// Values are written unquoted and interpolated by the container runtime,
    /// so whitespace, quotes, `$`, `#` and backslashes are rejected outright.
    pub fn validate(&self, value: &str) -> Result<(), ConfigurationError> {
        let invalid = |reason: &str| ConfigurationError::InvalidValue {
            key: self.name().to_string(),
            reason: reason.to_string(),
        };

        if value.is_empty() {
            return Err(invalid("value is empty"));
        }
        if value
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || "\"'$#\\`".contains(c))
        {
            return Err(invalid("contains whitespace, quotes or shell metacharacters"));
        }

        match self {
            EnvKey::Port => match value.parse::<u16>() {
                Ok(0) | Err(_) => Err(invalid("expected a port number between 1 and 65535")),
                Ok(_) => Ok(()),
            },
            EnvKey::PublicHost if value.contains('/') || value.contains(':') => {
                Err(invalid("expected a bare host name without scheme or port"))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for EnvKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolved configuration values
#[derive(Clone, Default)]
pub struct EnvironmentConfig {
    values: BTreeMap<EnvKey, SecretString>,
    /// Raw unrecognised lines, comments included
    extras: Vec<String>,
}

impl EnvironmentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: EnvKey) -> Option<&str> {
        self.values.get(&key).map(|v| v.expose_secret())
    }

    pub fn set(&mut self, key: EnvKey, value: impl Into<String>) {
        self.set_secret(key, SecretString::from(value.into()));
    }

    pub fn set_secret(&mut self, key: EnvKey, value: SecretString) {
        self.values.insert(key, value);
    }

    pub fn remove(&mut self, key: EnvKey) -> Option<String> {
        self.values
            .remove(&key)
            .map(|v| v.expose_secret().to_string())
    }

    pub fn keys(&self) -> impl Iterator<Item = EnvKey> + '_ {
        self.values.keys().copied()
    }

    /// Unrecognised lines carried over verbatim from an existing file
    pub fn extras(&self) -> &[String] {
        &self.extras
    }

    /// Value if set, otherwise the documented default
    pub fn get_or_default(&self, key: EnvKey) -> Option<&str> {
        self.get(key).or_else(|| key.default_value())
    }

    /// Value that must be present for rendering
    pub fn require(&self, key: EnvKey) -> Result<&str, ConfigurationError> {
        self.get_or_default(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigurationError::MissingKey(key.name().to_string()))
    }

    /// Check that every required key is present and valid
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for key in EnvKey::ALL {
            match self.get(key) {
                Some(value) => key.validate(value)?,
                None if key.is_required() => {
                    return Err(ConfigurationError::MissingKey(key.name().to_string()))
                }
                None => {}
            }
        }
        Ok(())
    }

    pub fn port(&self) -> Result<u16, ConfigurationError> {
        let raw = self.require(EnvKey::Port)?;
        EnvKey::Port.validate(raw)?;
        raw.parse().map_err(|_| ConfigurationError::InvalidValue {
            key: EnvKey::Port.name().to_string(),
            reason: format!("'{}' is not a port number", raw),
        })
    }

    pub fn public_host(&self) -> Result<&str, ConfigurationError> {
        self.require(EnvKey::PublicHost)
    }

    /// Parse the contents of an environment file
    ///
    /// Blank lines and the managed header are dropped. A later duplicate of a
    /// recognised key wins.
    pub fn parse(contents: &str) -> Result<Self, ConfigurationError> {
        let mut config = Self::new();

        for line in contents.lines() {
            if line.trim().is_empty() || line == HEADER.trim_end() {
                continue;
            }
            match recognised_key(line) {
                Some(key) => {
                    let value = parse_value(line)?;
                    config.set(key, value);
                }
                None => config.extras.push(line.to_string()),
            }
        }

        Ok(config)
    }

    /// Render to file contents
    pub fn render(&self) -> String {
        let mut out = String::from(HEADER);
        for (key, value) in &self.values {
            out.push_str(key.name());
            out.push('=');
            out.push_str(value.expose_secret());
            out.push('\n');
        }
        for line in &self.extras {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// Load from disk; `None` when the file does not exist
    pub async fn load(file: &File) -> Result<Option<Self>, BootstrapError> {
        if !file.exists().await {
            return Ok(None);
        }
        let contents = file.read_string().await?;
        Ok(Some(Self::parse(&contents)?))
    }

    pub(crate) fn set_extras(&mut self, extras: Vec<String>) {
        self.extras = extras;
    }
}

/// Recognised key named on an assignment line, if any
fn recognised_key(line: &str) -> Option<EnvKey> {
    let line = line.trim_start();
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (name, _) = line.split_once('=')?;
    EnvKey::from_name(name.trim())
}

/// Value of a single `KEY=value` line, unquoted by the dotenv parser
fn parse_value(line: &str) -> Result<String, ConfigurationError> {
    match dotenvy::from_read_iter(line.as_bytes()).next() {
        Some(item) => item
            .map(|(_, value)| value)
            .map_err(|e| ConfigurationError::MalformedEnvFile(e.to_string())),
        None => Err(ConfigurationError::MalformedEnvFile(format!(
            "cannot parse '{}'",
            line
        ))),
    }
}

impl PartialEq for EnvironmentConfig {
    fn eq(&self, other: &Self) -> bool {
        self.extras == other.extras
            && self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|((k1, v1), (k2, v2))| k1 == k2 && v1.expose_secret() == v2.expose_secret())
    }
}

impl Eq for EnvironmentConfig {}

impl fmt::Debug for EnvironmentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.values {
            if key.is_secret() {
                map.entry(&key.name(), &"[REDACTED]");
            } else {
                map.entry(&key.name(), value);
            }
        }
        if !self.extras.is_empty() {
            map.entry(&"unmanaged_lines", &self.extras.len());
        }
        map.finish()
    }
}
