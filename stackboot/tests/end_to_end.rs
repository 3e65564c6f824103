//! Whole pipeline with fake host effects and a mock application service

mod common;

use std::path::Path;
use std::time::Duration;

use stackboot::app::options::AppOptions;
use stackboot::app::report::CredentialOutcome;
use stackboot::app::run::{run, Stages};
use stackboot::config::env::EnvKey;
use stackboot::config::resolve::{Prompter, Resolution, ResolutionKind};
use stackboot::errors::{BootstrapError, ErrorKind};
use stackboot::health::HealthOutcome;
use stackboot::installer::fsm::InstallState;
use stackboot::installer::repository::Acquisition;
use stackboot::storage::settings::{ExistingDirPolicy, Settings};

use common::{
    closed_port, env_lines, spawn_app, AuthBehaviour, FakeRepository, PresentInstaller,
    RecordingRuntime, ISSUED_TOKEN,
};

fn options(install_dir: &Path, key_path: &Path, port: u16) -> AppOptions {
    let mut settings = Settings::default();
    settings.install_dir = install_dir.to_path_buf();
    settings.access_key_path = Some(key_path.to_path_buf());
    settings.require_root = false;
    settings.health.interval_ms = 10;
    settings.health.max_attempts = 5;
    settings.health.check_front_door = false;

    AppOptions {
        settings,
        interactive: false,
        regenerate_secrets: false,
        overrides: vec![("PORT".to_string(), port.to_string())],
    }
}

async fn no_sleep(_: Duration) {}

#[tokio::test]
async fn test_fresh_install_end_to_end() {
    let app = spawn_app(AuthBehaviour::Verify).await;
    let tmp = tempfile::tempdir().unwrap();
    let install_dir = tmp.path().join("app");
    let key_path = tmp.path().join("access.key");
    let options = options(&install_dir, &key_path, app.port());

    let repository = FakeRepository::default();
    let runtime = RecordingRuntime::default();
    let stages = Stages {
        installer: &PresentInstaller,
        repository: &repository,
        runtime: &runtime,
    };

    let report = run(&options, stages, None, no_sleep).await.unwrap();

    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.states.len(), 8);
    assert_eq!(report.states.last(), Some(&InstallState::ServicesStarted));
    assert_eq!(report.acquisition, Acquisition::Cloned);
    assert!(report.env_file_written);
    assert_eq!(report.app_health.outcome, HealthOutcome::Ready);
    assert!(report.front_door_health.is_none());
    assert_eq!(report.credential, CredentialOutcome::Issued(key_path.clone()));
    assert!(report.findings.is_empty(), "{:?}", report.findings);
    assert_eq!(*runtime.calls.lock().unwrap(), vec!["build", "up"]);

    // Exactly the six required keys
    let env = std::fs::read_to_string(install_dir.join(".env")).unwrap();
    let keys: Vec<String> = env_lines(&env).into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys.len(), 6);
    assert!(env.contains(&format!("PORT={}", app.port())));

    // Five services, acyclic
    assert_eq!(report.start_order.len(), 5);
    let compose = std::fs::read_to_string(install_dir.join("docker-compose.yml")).unwrap();
    let doc: serde_yaml::Value = serde_yaml::from_str(&compose).unwrap();
    assert_eq!(doc["services"].as_mapping().unwrap().len(), 5);
    assert!(install_dir.join("Caddyfile").exists());
    for data in ["postgres", "redis", "minio", "caddy"] {
        assert!(install_dir.join("data").join(data).is_dir());
    }

    let key = std::fs::read_to_string(&key_path).unwrap();
    assert!(key.contains(ISSUED_TOKEN));
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let app = spawn_app(AuthBehaviour::Verify).await;
    let tmp = tempfile::tempdir().unwrap();
    let install_dir = tmp.path().join("app");
    let key_path = tmp.path().join("access.key");
    let options = options(&install_dir, &key_path, app.port());
    let repository = FakeRepository::default();
    let runtime = RecordingRuntime::default();

    for _ in 0..2 {
        let stages = Stages {
            installer: &PresentInstaller,
            repository: &repository,
            runtime: &runtime,
        };
        run(&options, stages, None, no_sleep).await.unwrap();
    }
    let env_before = std::fs::read_to_string(install_dir.join(".env")).unwrap();
    let compose_before = std::fs::read_to_string(install_dir.join("docker-compose.yml")).unwrap();

    let stages = Stages {
        installer: &PresentInstaller,
        repository: &repository,
        runtime: &runtime,
    };
    let report = run(&options, stages, None, no_sleep).await.unwrap();

    assert_eq!(report.acquisition, Acquisition::Reused);
    assert!(!report.env_file_written);
    assert_eq!(*repository.fetches.lock().unwrap(), 1);
    assert_eq!(
        std::fs::read_to_string(install_dir.join(".env")).unwrap(),
        env_before
    );
    assert_eq!(
        std::fs::read_to_string(install_dir.join("docker-compose.yml")).unwrap(),
        compose_before
    );
}

#[tokio::test]
async fn test_unhealthy_application_is_reported_not_fatal() {
    let port = closed_port().await;
    let tmp = tempfile::tempdir().unwrap();
    let key_path = tmp.path().join("access.key");
    let options = options(&tmp.path().join("app"), &key_path, port);

    let repository = FakeRepository::default();
    let runtime = RecordingRuntime::default();
    let stages = Stages {
        installer: &PresentInstaller,
        repository: &repository,
        runtime: &runtime,
    };

    let report = run(&options, stages, None, no_sleep).await.unwrap();

    assert_eq!(report.exit_code(), 4);
    assert_eq!(report.app_health.attempt, 5);
    assert!(matches!(report.credential, CredentialOutcome::Skipped(_)));
    assert!(!key_path.exists());
    assert!(!report.findings.is_empty());
}

#[tokio::test]
async fn test_rejected_handshake_does_not_abort() {
    let app = spawn_app(AuthBehaviour::Reject).await;
    let tmp = tempfile::tempdir().unwrap();
    let key_path = tmp.path().join("access.key");
    let options = options(&tmp.path().join("app"), &key_path, app.port());

    let repository = FakeRepository::default();
    let runtime = RecordingRuntime::default();
    let stages = Stages {
        installer: &PresentInstaller,
        repository: &repository,
        runtime: &runtime,
    };

    let report = run(&options, stages, None, no_sleep).await.unwrap();

    assert_eq!(report.exit_code(), 0);
    assert!(matches!(report.credential, CredentialOutcome::Failed(_)));
    assert!(!key_path.exists());
    assert!(report
        .findings
        .iter()
        .any(|f| f.starts_with("No access key")));
}

#[tokio::test]
async fn test_local_front_door_is_skipped() {
    let app = spawn_app(AuthBehaviour::Verify).await;
    let tmp = tempfile::tempdir().unwrap();
    let mut options = options(&tmp.path().join("app"), &tmp.path().join("k"), app.port());
    options.settings.health.check_front_door = true;

    let repository = FakeRepository::default();
    let runtime = RecordingRuntime::default();
    let stages = Stages {
        installer: &PresentInstaller,
        repository: &repository,
        runtime: &runtime,
    };

    let report = run(&options, stages, None, no_sleep).await.unwrap();

    assert!(report.front_door_health.is_none());
    assert!(report.warnings.iter().all(|w| !w.contains("Front door")));
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn test_unreachable_front_door_only_warns() {
    let app = spawn_app(AuthBehaviour::Verify).await;
    let front_port = closed_port().await;
    let tmp = tempfile::tempdir().unwrap();
    let key_path = tmp.path().join("access.key");
    let mut options = options(&tmp.path().join("app"), &key_path, app.port());
    options.settings.health.check_front_door = true;
    options.settings.health.front_door_max_attempts = 3;
    options.settings.health.front_door_url = Some(format!("http://127.0.0.1:{}", front_port));

    let repository = FakeRepository::default();
    let runtime = RecordingRuntime::default();
    let stages = Stages {
        installer: &PresentInstaller,
        repository: &repository,
        runtime: &runtime,
    };

    let report = run(&options, stages, None, no_sleep).await.unwrap();

    let front_door = report.front_door_health.clone().unwrap();
    assert_eq!(front_door.attempt, 3);
    assert!(matches!(front_door.outcome, HealthOutcome::Exhausted { .. }));
    assert_eq!(report.app_health.outcome, HealthOutcome::Ready);
    assert_eq!(report.credential, CredentialOutcome::Issued(key_path));
    assert!(report.warnings.iter().any(|w| w.contains("Front door")));
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn test_root_requirement_is_a_fatal_precondition() {
    let app = spawn_app(AuthBehaviour::Verify).await;
    let tmp = tempfile::tempdir().unwrap();
    let mut options = options(&tmp.path().join("app"), &tmp.path().join("k"), app.port());
    options.settings.require_root = true;

    let repository = FakeRepository::default();
    let runtime = RecordingRuntime::default();
    let stages = Stages {
        installer: &PresentInstaller,
        repository: &repository,
        runtime: &runtime,
    };

    let result = run(&options, stages, None, no_sleep).await;
    if nix::unistd::geteuid().is_root() {
        assert_eq!(result.unwrap().exit_code(), 0);
    } else {
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FatalPrecondition);
        assert_eq!(err.exit_code(), 3);
        assert_eq!(*repository.fetches.lock().unwrap(), 0);
        assert!(runtime.calls.lock().unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_configuration_error_stops_before_services_start() {
    let tmp = tempfile::tempdir().unwrap();
    let mut options = options(&tmp.path().join("app"), &tmp.path().join("k"), 3005);
    options.overrides.push(("PUBLIC_HOST".to_string(), "https://bad".to_string()));

    let repository = FakeRepository::default();
    let runtime = RecordingRuntime::default();
    let stages = Stages {
        installer: &PresentInstaller,
        repository: &repository,
        runtime: &runtime,
    };

    let err = run(&options, stages, None, no_sleep).await.unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert!(runtime.calls.lock().unwrap().is_empty());
}

/// Answers every menu with its first option and declines confirmations
struct FirstOption {
    confirmations: u32,
}

impl Prompter for FirstOption {
    fn choose(
        &mut self,
        _key: EnvKey,
        options: &[ResolutionKind],
        _rejection: Option<&str>,
    ) -> Result<Resolution, BootstrapError> {
        Ok(match options[0] {
            ResolutionKind::Default => Resolution::Default,
            ResolutionKind::Generate => Resolution::Generate,
            ResolutionKind::Custom => Resolution::Custom(String::new()),
        })
    }

    fn confirm(&mut self, _question: &str) -> Result<bool, BootstrapError> {
        self.confirmations += 1;
        Ok(false)
    }
}

#[tokio::test]
async fn test_declined_replacement_falls_back_to_reuse() {
    let app = spawn_app(AuthBehaviour::Verify).await;
    let tmp = tempfile::tempdir().unwrap();
    let install_dir = tmp.path().join("app");
    std::fs::create_dir_all(&install_dir).unwrap();
    std::fs::write(install_dir.join("keep.txt"), "local change").unwrap();

    let mut options = options(&install_dir, &tmp.path().join("access.key"), app.port());
    options.interactive = true;
    options.settings.existing_dir_policy = ExistingDirPolicy::Replace;

    let repository = FakeRepository::default();
    let runtime = RecordingRuntime::default();
    let stages = Stages {
        installer: &PresentInstaller,
        repository: &repository,
        runtime: &runtime,
    };
    let mut prompter = FirstOption { confirmations: 0 };

    let report = run(&options, stages, Some(&mut prompter), no_sleep)
        .await
        .unwrap();

    assert_eq!(prompter.confirmations, 1);
    assert_eq!(report.acquisition, Acquisition::Reused);
    assert!(install_dir.join("keep.txt").exists());
    assert!(report.warnings.iter().any(|w| w.contains("declined")));
}
