//! Prerequisite executables and their installation

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::{BootstrapError, PreconditionError};
use crate::installer::host::{find_executable, PackageManager};

/// An executable that must be on `PATH` before anything else runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prerequisite {
    /// What the executable is for, used in logs
    pub name: String,

    /// Executable looked up on `PATH`
    pub executable: String,

    /// Package providing the executable
    pub package: String,
}

impl Prerequisite {
    pub fn new(
        name: impl Into<String>,
        executable: impl Into<String>,
        package: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            executable: executable.into(),
            package: package.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrerequisiteStatus {
    AlreadyPresent,
    Installed,
}

/// Detects and installs prerequisites
#[async_trait]
pub trait PackageInstaller: Send + Sync {
    async fn is_present(&self, prerequisite: &Prerequisite) -> bool;

    async fn install(&self, prerequisite: &Prerequisite) -> Result<(), BootstrapError>;
}

/// Make sure every prerequisite is present, installing the missing ones
///
/// Each missing executable gets exactly one install attempt and is then
/// checked again. Still missing afterwards is fatal.
pub async fn ensure_prerequisites(
    installer: &dyn PackageInstaller,
    prerequisites: &[Prerequisite],
) -> Result<Vec<(String, PrerequisiteStatus)>, BootstrapError> {
    let mut statuses = Vec::with_capacity(prerequisites.len());

    for prerequisite in prerequisites {
        if installer.is_present(prerequisite).await {
            debug!("{} ({}) already present", prerequisite.name, prerequisite.executable);
            statuses.push((prerequisite.executable.clone(), PrerequisiteStatus::AlreadyPresent));
            continue;
        }

        info!(
            "Installing {} (package {})",
            prerequisite.name, prerequisite.package
        );
        if let Err(e) = installer.install(prerequisite).await {
            warn!("Install of {} failed: {}", prerequisite.package, e);
        }

        if !installer.is_present(prerequisite).await {
            return Err(PreconditionError::MissingDependency {
                name: prerequisite.executable.clone(),
            }
            .into());
        }
        statuses.push((prerequisite.executable.clone(), PrerequisiteStatus::Installed));
    }

    Ok(statuses)
}

/// Installs through the host's package manager
pub struct SystemPackageInstaller {
    package_manager: Option<PackageManager>,
    refreshed: Mutex<bool>,
}

impl SystemPackageInstaller {
    pub fn new(package_manager: Option<PackageManager>) -> Self {
        Self {
            package_manager,
            refreshed: Mutex::new(false),
        }
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<(), BootstrapError> {
        debug!("Running {} {}", program, args.join(" "));
        let status = Command::new(program)
            .args(args)
            .env("DEBIAN_FRONTEND", "noninteractive")
            .status()
            .await
            .map_err(|e| BootstrapError::Internal(format!("Failed to run {}: {}", program, e)))?;

        if !status.success() {
            return Err(BootstrapError::Internal(format!(
                "{} {} exited with {}",
                program,
                args.join(" "),
                status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl PackageInstaller for SystemPackageInstaller {
    async fn is_present(&self, prerequisite: &Prerequisite) -> bool {
        find_executable(&prerequisite.executable).is_some()
    }

    async fn install(&self, prerequisite: &Prerequisite) -> Result<(), BootstrapError> {
        let pm = self.package_manager.ok_or_else(|| {
            PreconditionError::UnsupportedOs(format!(
                "no supported package manager to install '{}'",
                prerequisite.package
            ))
        })?;

        {
            let mut refreshed = self.refreshed.lock().await;
            if !*refreshed {
                if let Some(args) = pm.refresh_args() {
                    if let Err(e) = self.run(pm.program(), args).await {
                        warn!("Package index refresh failed: {}", e);
                    }
                }
                *refreshed = true;
            }
        }

        let mut args: Vec<&str> = pm.install_args().to_vec();
        args.push(&prerequisite.package);
        self.run(pm.program(), &args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;

    struct FakeInstaller {
        present: StdMutex<HashSet<String>>,
        installable: HashSet<String>,
        attempts: StdMutex<Vec<String>>,
    }

    impl FakeInstaller {
        fn new(present: &[&str], installable: &[&str]) -> Self {
            Self {
                present: StdMutex::new(present.iter().map(|s| s.to_string()).collect()),
                installable: installable.iter().map(|s| s.to_string()).collect(),
                attempts: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PackageInstaller for FakeInstaller {
        async fn is_present(&self, p: &Prerequisite) -> bool {
            self.present.lock().unwrap().contains(&p.executable)
        }

        async fn install(&self, p: &Prerequisite) -> Result<(), BootstrapError> {
            self.attempts.lock().unwrap().push(p.package.clone());
            if self.installable.contains(&p.package) {
                self.present.lock().unwrap().insert(p.executable.clone());
                Ok(())
            } else {
                Err(BootstrapError::Internal("no such package".to_string()))
            }
        }
    }

    fn prereqs() -> Vec<Prerequisite> {
        vec![
            Prerequisite::new("container runtime", "docker", "docker.io"),
            Prerequisite::new("version control", "git", "git"),
        ]
    }

    #[tokio::test]
    async fn test_present_prerequisites_are_not_installed() {
        let installer = FakeInstaller::new(&["docker", "git"], &[]);
        let statuses = ensure_prerequisites(&installer, &prereqs()).await.unwrap();
        assert!(statuses
            .iter()
            .all(|(_, s)| *s == PrerequisiteStatus::AlreadyPresent));
        assert!(installer.attempts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_prerequisite_is_installed_once() {
        let installer = FakeInstaller::new(&["git"], &["docker.io"]);
        let statuses = ensure_prerequisites(&installer, &prereqs()).await.unwrap();
        assert_eq!(statuses[0], ("docker".to_string(), PrerequisiteStatus::Installed));
        assert_eq!(*installer.attempts.lock().unwrap(), vec!["docker.io".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_install_is_fatal() {
        let installer = FakeInstaller::new(&[], &["git"]);
        let err = ensure_prerequisites(&installer, &prereqs()).await.unwrap_err();
        assert!(matches!(
            err,
            BootstrapError::Precondition(PreconditionError::MissingDependency { ref name }) if name == "docker"
        ));
        assert_eq!(err.exit_code(), 3);
    }
}
