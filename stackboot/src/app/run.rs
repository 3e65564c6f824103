//! The bootstrap pipeline
//!
//! Stages up to and including service start are fail-fast: the first error
//! ends the run. Everything after start is fail-soft and ends up in the
//! [`RunReport`] instead.

use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;

use tracing::{info, warn};

use crate::app::options::AppOptions;
use crate::app::report::{print_new_values, CredentialOutcome, RunReport};
use crate::authn::bootstrap::CredentialBootstrapper;
use crate::config::env::EnvironmentConfig;
use crate::config::resolve::{Configurator, Mode, Prompter};
use crate::errors::BootstrapError;
use crate::filesys::file::File;
use crate::health::{HealthCheckResult, HealthGate, HealthOutcome, HttpProbe};
use crate::http::client::HttpClient;
use crate::installer::fsm::{InstallFsm, InstallState};
use crate::installer::host::check_host;
use crate::installer::prereqs::{ensure_prerequisites, PackageInstaller};
use crate::installer::repository::{acquire, InstallationTarget, RepositorySource};
use crate::installer::runtime::ContainerRuntime;
use crate::storage::layout::{access_key_path, InstallLayout};
use crate::storage::settings::{ExistingDirPolicy, Settings};
use crate::topology::defaults::default_topology;
use crate::topology::render::render;

/// External effects of a run
pub struct Stages<'a> {
    pub installer: &'a dyn PackageInstaller,
    pub repository: &'a dyn RepositorySource,
    pub runtime: &'a dyn ContainerRuntime,
}

/// Run the whole workflow
///
/// `prompter` is only consulted for interactive runs. `sleep_fn` is used
/// between health probes.
pub async fn run<S, F>(
    options: &AppOptions,
    stages: Stages<'_>,
    mut prompter: Option<&mut dyn Prompter>,
    sleep_fn: S,
) -> Result<RunReport, BootstrapError>
where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    let settings = &options.settings;
    let layout = InstallLayout::new(&settings.install_dir);
    let mut fsm = InstallFsm::new();
    let mut warnings = Vec::new();
    if !options.interactive {
        prompter = None;
    }

    // Host and prerequisites
    check_host(settings.require_root)?;
    ensure_prerequisites(stages.installer, &settings.prerequisites).await?;
    advance(&mut fsm, InstallState::PrerequisitesChecked)?;

    // Repository
    let existing_dir_policy =
        confirm_policy(settings, &layout, prompter.as_deref_mut(), &mut warnings).await?;
    let target = InstallationTarget {
        repository_url: settings.repository_url.clone(),
        install_dir: settings.install_dir.clone(),
        existing_dir_policy,
    };
    let acquisition = acquire(stages.repository, &target).await?;
    advance(&mut fsm, InstallState::RepositoryAcquired)?;

    // Data directories
    for dir in layout.service_data_dirs() {
        if !dir.exists().await {
            dir.create().await?;
            info!("Created {}", dir.path().display());
        }
    }
    advance(&mut fsm, InstallState::DirectoriesPrepared)?;

    // Environment file
    let env_file = layout.env_file();
    let existing = EnvironmentConfig::load(&env_file).await?;
    let mut configurator = Configurator::new()
        .with_overrides(
            options
                .overrides
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        )?
        .regenerate_secrets(options.regenerate_secrets);
    let mode = match prompter.as_deref_mut() {
        Some(p) => Mode::Interactive(p),
        None => Mode::NonInteractive,
    };
    let resolved = configurator.resolve(existing.as_ref(), mode)?;
    let env_file_written = configurator.persist(&resolved, &env_file).await?;
    print_new_values(&resolved);
    warnings.extend(resolved.warnings.iter().cloned());
    advance(&mut fsm, InstallState::ConfigResolved)?;

    // Topology
    let rendered = render(&default_topology(), &resolved.config)?;
    rendered.write(&layout).await?;
    advance(&mut fsm, InstallState::TopologyRendered)?;

    // Services
    stages.runtime.build(layout.root().path()).await?;
    advance(&mut fsm, InstallState::ServicesBuilt)?;
    stages.runtime.up(layout.root().path()).await?;
    advance(&mut fsm, InstallState::ServicesStarted)?;

    // From here on nothing aborts the run
    let port = resolved.config.port()?;
    let base_url = settings.service.local_base_url(port);
    let interval = settings.health.interval();

    let app_gate = HealthGate::new(interval, settings.health.max_attempts);
    let app_health = probe(
        &app_gate,
        &base_url,
        &settings.service.health_path,
        &settings.service.health_marker,
        &sleep_fn,
    )
    .await;
    if let Some(err) = app_health.clone().into_error() {
        warn!("{}", err);
        warnings.push(err.to_string());
    }

    let public_host = resolved.config.public_host()?;
    let front_door = if settings.health.check_front_door {
        front_door_url(settings, public_host)
    } else {
        None
    };
    if settings.health.check_front_door && front_door.is_none() {
        info!(
            "Skipping front door check: {} is served from the proxy's internal CA",
            public_host
        );
    }

    let front_door_health = if let Some(front_door_url) = front_door {
        let gate = HealthGate::new(interval, settings.health.front_door_max_attempts);
        let result = probe(
            &gate,
            &front_door_url,
            &settings.service.health_path,
            &settings.service.health_marker,
            &sleep_fn,
        )
        .await;
        if let Some(err) = result.clone().into_error() {
            warnings.push(format!("Front door not reachable yet: {}", err));
        }
        Some(result)
    } else {
        None
    };

    let key_file = File::new(access_key_path(settings.access_key_path.as_deref()));
    let credential = if app_health.is_ready() {
        issue_credential(&base_url, &settings.service.auth_path, &key_file).await
    } else {
        CredentialOutcome::Skipped("application service is not ready".to_string())
    };

    let findings = verify(&layout, &base_url, settings, &key_file).await;
    for finding in &findings {
        warn!("Verification: {}", finding);
    }

    Ok(RunReport {
        states: fsm.history().to_vec(),
        acquisition,
        env_file_written,
        start_order: rendered.start_order,
        app_health,
        front_door_health,
        credential,
        findings,
        warnings,
    })
}

/// Base URL of the public front door, when it can be checked from here
///
/// Local names and bare IP hosts get certificates from the proxy's own CA,
/// which the HTTP client does not trust.
fn front_door_url(settings: &Settings, public_host: &str) -> Option<String> {
    if let Some(url) = &settings.health.front_door_url {
        return Some(url.clone());
    }
    let local = public_host == "localhost"
        || public_host.ends_with(".localhost")
        || public_host.parse::<IpAddr>().is_ok();
    if local {
        None
    } else {
        Some(format!("https://{}", public_host))
    }
}

fn advance(fsm: &mut InstallFsm, next: InstallState) -> Result<(), BootstrapError> {
    fsm.advance(next).map_err(BootstrapError::Internal)?;
    info!("Reached {:?}", next);
    Ok(())
}

/// Settle the policy for a non-empty install dir
///
/// Interactive runs must confirm a replacement; declining keeps the
/// existing checkout. Non-interactive runs take the configured policy as
/// the confirmation.
async fn confirm_policy(
    settings: &Settings,
    layout: &InstallLayout,
    prompter: Option<&mut (dyn Prompter + '_)>,
    warnings: &mut Vec<String>,
) -> Result<ExistingDirPolicy, BootstrapError> {
    if settings.existing_dir_policy == ExistingDirPolicy::Reuse
        || layout.root().is_empty().await?
    {
        return Ok(settings.existing_dir_policy);
    }

    let Some(prompter) = prompter else {
        return Ok(ExistingDirPolicy::Replace);
    };

    let question = format!(
        "{} is not empty. Delete its contents and clone again?",
        settings.install_dir.display()
    );
    if prompter.confirm(&question)? {
        return Ok(ExistingDirPolicy::Replace);
    }

    let message = format!(
        "Replacement of {} declined, reusing the existing checkout",
        settings.install_dir.display()
    );
    warn!("{}", message);
    warnings.push(message);
    Ok(ExistingDirPolicy::Reuse)
}

async fn probe<S, F>(
    gate: &HealthGate,
    base_url: &str,
    path: &str,
    marker: &str,
    sleep_fn: S,
) -> HealthCheckResult
where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    match HttpProbe::new(base_url, path, marker) {
        Ok(probe) => gate.wait(&probe, sleep_fn).await,
        Err(e) => HealthCheckResult {
            endpoint: format!("{}{}", base_url, path),
            attempt: 0,
            outcome: HealthOutcome::Exhausted {
                last_error: e.to_string(),
            },
        },
    }
}

async fn issue_credential(base_url: &str, auth_path: &str, key_file: &File) -> CredentialOutcome {
    let client = match HttpClient::new(base_url) {
        Ok(client) => client,
        Err(e) => return CredentialOutcome::Failed(e.to_string()),
    };

    match CredentialBootstrapper::new(client, auth_path)
        .bootstrap(key_file)
        .await
    {
        Ok(issued) => CredentialOutcome::Issued(issued.key_file.path().to_path_buf()),
        Err(e) => {
            warn!("{}", e);
            CredentialOutcome::Failed(e.to_string())
        }
    }
}

/// Re-read what the run produced. Findings are reported, never fatal.
async fn verify(
    layout: &InstallLayout,
    base_url: &str,
    settings: &Settings,
    key_file: &File,
) -> Vec<String> {
    let mut findings = Vec::new();

    let env_file = layout.env_file();
    match EnvironmentConfig::load(&env_file).await {
        Ok(Some(config)) => {
            if let Err(e) = config.validate() {
                findings.push(format!("{}: {}", env_file.path().display(), e));
            }
        }
        Ok(None) => findings.push(format!("{} is missing", env_file.path().display())),
        Err(e) => findings.push(format!("{}: {}", env_file.path().display(), e)),
    }

    let compose_file = layout.compose_file();
    if !compose_file.exists().await {
        findings.push(format!("{} is missing", compose_file.path().display()));
    }

    let marker = &settings.service.greeting_marker;
    let greeting = match HttpClient::new(base_url) {
        Ok(client) => client.get_text("/").await,
        Err(e) => Err(e),
    };
    match greeting {
        Ok(response) if response.status.is_success() && response.body.contains(marker.as_str()) => {}
        Ok(response) => findings.push(format!(
            "{}/ answered {} without '{}'",
            base_url, response.status, marker
        )),
        Err(e) => findings.push(format!("{}/ unreachable: {}", base_url, e)),
    }

    if !key_file.exists().await {
        findings.push(format!("No access key at {}", key_file.path().display()));
    }

    findings
}
