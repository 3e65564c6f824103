//! Configuration value resolution
//!
//! Each recognised key is resolved in order from: an operator-supplied value,
//! the value already persisted on disk, and finally a default or generated
//! value (non-interactive) or an operator menu choice (interactive).

use std::collections::BTreeMap;

use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::SecretString;
use tracing::{debug, info, warn};

use crate::config::env::{EnvKey, EnvironmentConfig};
use crate::errors::{BootstrapError, ConfigurationError};
use crate::filesys::file::File;
use crate::secrets::SecretGenerator;

/// How many invalid custom values an operator may enter before giving up
const MAX_PROMPT_ATTEMPTS: usize = 5;

/// Strategies a menu can offer for a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionKind {
    Default,
    Generate,
    Custom,
}

impl ResolutionKind {
    /// Strategies that make sense for `key`, in menu order
    pub fn available_for(key: EnvKey) -> Vec<ResolutionKind> {
        let mut kinds = Vec::with_capacity(3);
        if key.default_value().is_some() || !key.is_required() {
            kinds.push(ResolutionKind::Default);
        }
        if key.secret_profile().is_some() {
            kinds.push(ResolutionKind::Generate);
        }
        kinds.push(ResolutionKind::Custom);
        kinds
    }

    pub fn label(&self, key: EnvKey) -> String {
        match self {
            ResolutionKind::Default => match key.default_value() {
                Some(value) => format!("Use default ({})", value),
                None => "Leave unset".to_string(),
            },
            ResolutionKind::Generate => "Generate a random value".to_string(),
            ResolutionKind::Custom => "Enter a custom value".to_string(),
        }
    }
}

/// Operator's choice for a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Default,
    Generate,
    Custom(String),
}

impl Resolution {
    pub fn kind(&self) -> ResolutionKind {
        match self {
            Resolution::Default => ResolutionKind::Default,
            Resolution::Generate => ResolutionKind::Generate,
            Resolution::Custom(_) => ResolutionKind::Custom,
        }
    }
}

/// Interactive operator input
pub trait Prompter {
    /// Ask how to resolve `key`. `options` is never empty. `rejection` carries
    /// the reason the previous custom value was refused, if any.
    fn choose(
        &mut self,
        key: EnvKey,
        options: &[ResolutionKind],
        rejection: Option<&str>,
    ) -> Result<Resolution, BootstrapError>;

    /// Ask a yes/no question
    fn confirm(&mut self, question: &str) -> Result<bool, BootstrapError>;
}

/// Where a resolved value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    /// `--set KEY=VALUE`
    Supplied,
    /// Already in the environment file
    Persisted,
    /// Documented default
    Defaulted,
    /// Freshly generated
    Generated,
    /// Typed in by the operator
    Custom,
}

impl ValueSource {
    /// Values the operator has not seen before and must record now
    pub fn needs_echo(&self) -> bool {
        matches!(self, ValueSource::Defaulted | ValueSource::Generated)
    }
}

/// Resolution mode
pub enum Mode<'p> {
    NonInteractive,
    Interactive(&'p mut dyn Prompter),
}

/// Result of resolving every key
#[derive(Debug, Clone)]
pub struct ResolvedEnvironment {
    pub config: EnvironmentConfig,
    pub sources: BTreeMap<EnvKey, ValueSource>,
    pub warnings: Vec<String>,
}

impl ResolvedEnvironment {
    /// Generated or defaulted values, to be shown to the operator exactly once
    pub fn values_to_echo(&self) -> Vec<(EnvKey, &str, ValueSource)> {
        self.sources
            .iter()
            .filter(|(_, source)| source.needs_echo())
            .filter_map(|(key, source)| self.config.get(*key).map(|v| (*key, v, *source)))
            .collect()
    }

    /// True if nothing new was minted or entered
    pub fn is_unchanged(&self) -> bool {
        self.sources.values().all(|s| *s == ValueSource::Persisted)
    }
}

/// Resolves and persists the environment file
pub struct Configurator<R: RngCore = OsRng> {
    generator: SecretGenerator<R>,
    overrides: BTreeMap<EnvKey, SecretString>,
    regenerate_secrets: bool,
}

impl Configurator<OsRng> {
    pub fn new() -> Self {
        Self::with_generator(SecretGenerator::new())
    }
}

impl Default for Configurator<OsRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RngCore> Configurator<R> {
    pub fn with_generator(generator: SecretGenerator<R>) -> Self {
        Self {
            generator,
            overrides: BTreeMap::new(),
            regenerate_secrets: false,
        }
    }

    /// Operator-supplied `KEY=VALUE` pairs; unknown keys and invalid values are rejected
    pub fn with_overrides<'a>(
        mut self,
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, ConfigurationError> {
        for (name, value) in pairs {
            let key = EnvKey::from_name(name)
                .ok_or_else(|| ConfigurationError::UnknownKey(name.to_string()))?;
            key.validate(value)?;
            self.overrides.insert(key, SecretString::from(value));
        }
        Ok(self)
    }

    /// Mint new values for secret keys even if they are already persisted
    pub fn regenerate_secrets(mut self, regenerate: bool) -> Self {
        self.regenerate_secrets = regenerate;
        self
    }

    /// Resolve every recognised key
    pub fn resolve(
        &mut self,
        existing: Option<&EnvironmentConfig>,
        mut mode: Mode<'_>,
    ) -> Result<ResolvedEnvironment, BootstrapError> {
        let mut resolved = ResolvedEnvironment {
            config: EnvironmentConfig::new(),
            sources: BTreeMap::new(),
            warnings: Vec::new(),
        };

        if let Some(existing) = existing {
            resolved.config.set_extras(existing.extras().to_vec());
        }

        for key in EnvKey::ALL {
            let outcome = if let Some(value) = self.overrides.get(&key) {
                Some((value.clone(), ValueSource::Supplied))
            } else if let Some(value) = self.persisted(existing, key) {
                Some((SecretString::from(value), ValueSource::Persisted))
            } else {
                match &mut mode {
                    Mode::NonInteractive => self.resolve_unattended(key)?,
                    Mode::Interactive(prompter) => {
                        self.resolve_interactive(key, &mut **prompter, &mut resolved.warnings)?
                    }
                }
            };

            match outcome {
                Some((value, source)) => {
                    debug!(key = key.name(), ?source, "Resolved configuration value");
                    resolved.config.set_secret(key, value);
                    resolved.sources.insert(key, source);
                }
                None => debug!(key = key.name(), "Optional key left unset"),
            }
        }

        resolved.config.validate()?;
        Ok(resolved)
    }

    /// Write the environment file if its content changed.
    ///
    /// The on-disk file is compared by value, so layout an operator chose
    /// (blank lines, comment placement) survives runs that change nothing.
    /// Returns `true` when the file was written.
    pub async fn persist(
        &self,
        resolved: &ResolvedEnvironment,
        file: &File,
    ) -> Result<bool, BootstrapError> {
        if let Some(current) = EnvironmentConfig::load(file).await? {
            if current == resolved.config {
                info!("Environment file {:?} is up to date", file.path());
                file.set_permissions_600().await?;
                return Ok(false);
            }
        }

        let rendered = resolved.config.render();
        file.write_private(rendered.as_bytes()).await?;
        info!("Environment file written to {:?}", file.path());
        Ok(true)
    }

    fn persisted<'e>(&self, existing: Option<&'e EnvironmentConfig>, key: EnvKey) -> Option<&'e str> {
        if self.regenerate_secrets && key.secret_profile().is_some() {
            return None;
        }
        existing
            .and_then(|config| config.get(key))
            .filter(|value| !value.is_empty())
    }

    fn resolve_unattended(
        &mut self,
        key: EnvKey,
    ) -> Result<Option<(SecretString, ValueSource)>, BootstrapError> {
        if !key.is_required() {
            return Ok(None);
        }
        if let Some(default) = key.default_value() {
            return Ok(Some((SecretString::from(default), ValueSource::Defaulted)));
        }
        Ok(Some((self.generate(key)?, ValueSource::Generated)))
    }

    fn resolve_interactive(
        &mut self,
        key: EnvKey,
        prompter: &mut dyn Prompter,
        warnings: &mut Vec<String>,
    ) -> Result<Option<(SecretString, ValueSource)>, BootstrapError> {
        let options = ResolutionKind::available_for(key);
        let mut rejection: Option<String> = None;

        for _ in 0..MAX_PROMPT_ATTEMPTS {
            let choice = prompter.choose(key, &options, rejection.as_deref())?;
            if !options.contains(&choice.kind()) {
                rejection = Some(format!("'{}' is not offered here", choice.kind().label(key)));
                continue;
            }

            match choice {
                Resolution::Default => {
                    return Ok(match (key.is_required(), key.default_value()) {
                        (true, Some(default)) => {
                            Some((SecretString::from(default), ValueSource::Defaulted))
                        }
                        _ => None,
                    });
                }
                Resolution::Generate => {
                    return Ok(Some((self.generate(key)?, ValueSource::Generated)));
                }
                Resolution::Custom(raw) => {
                    let value = raw.trim();
                    if value.is_empty() {
                        return self.fallback_for_empty(key, warnings);
                    }
                    match key.validate(value) {
                        Ok(()) => return Ok(Some((SecretString::from(value), ValueSource::Custom))),
                        Err(e) => rejection = Some(e.to_string()),
                    }
                }
            }
        }

        Err(ConfigurationError::InvalidValue {
            key: key.name().to_string(),
            reason: rejection.unwrap_or_else(|| "no acceptable value entered".to_string()),
        }
        .into())
    }

    /// Empty custom input never yields an empty value
    fn fallback_for_empty(
        &mut self,
        key: EnvKey,
        warnings: &mut Vec<String>,
    ) -> Result<Option<(SecretString, ValueSource)>, BootstrapError> {
        if key.secret_profile().is_some() {
            let message = format!("Empty input for {}, using a generated value instead", key);
            warn!("{}", message);
            warnings.push(message);
            return Ok(Some((self.generate(key)?, ValueSource::Generated)));
        }
        if !key.is_required() {
            return Ok(None);
        }
        match key.default_value() {
            Some(default) => Ok(Some((SecretString::from(default), ValueSource::Defaulted))),
            None => Err(ConfigurationError::MissingKey(key.name().to_string()).into()),
        }
    }

    fn generate(&mut self, key: EnvKey) -> Result<SecretString, BootstrapError> {
        let profile = key.secret_profile().ok_or_else(|| {
            BootstrapError::Internal(format!("{} has no secret profile", key))
        })?;
        self.generator.generate_profile(profile)
    }
}
