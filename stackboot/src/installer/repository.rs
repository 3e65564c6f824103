//! Repository acquisition

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::BootstrapError;
use crate::filesys::dir::Dir;
use crate::storage::settings::ExistingDirPolicy;

/// Where the application comes from and where it goes
#[derive(Debug, Clone)]
pub struct InstallationTarget {
    pub repository_url: String,
    pub install_dir: PathBuf,
    pub existing_dir_policy: ExistingDirPolicy,
}

/// How the install dir ended up populated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    Cloned,
    Reused,
    Replaced,
}

/// Fetches application sources into a directory
#[async_trait]
pub trait RepositorySource: Send + Sync {
    /// Populate `target`, which is missing or empty
    async fn fetch(&self, url: &str, target: &Path) -> Result<(), BootstrapError>;
}

/// Shallow `git clone`
pub struct GitRepository;

#[async_trait]
impl RepositorySource for GitRepository {
    async fn fetch(&self, url: &str, target: &Path) -> Result<(), BootstrapError> {
        debug!("Cloning repository to {}...", target.display());
        let status = Command::new("git")
            .args(["clone", "--depth", "1", url])
            .arg(target)
            .status()
            .await
            .map_err(|e| BootstrapError::RepositoryError(format!("Failed to run git clone: {}", e)))?;

        if !status.success() {
            return Err(BootstrapError::RepositoryError(format!(
                "git clone of {} failed with {}",
                url, status
            )));
        }
        Ok(())
    }
}

/// Make the install dir hold the application sources
///
/// A missing or empty dir is cloned into. A non-empty dir is kept under
/// [`ExistingDirPolicy::Reuse`] and wiped then cloned under
/// [`ExistingDirPolicy::Replace`]. The policy passed here is final, any
/// confirmation has already happened.
pub async fn acquire(
    source: &dyn RepositorySource,
    target: &InstallationTarget,
) -> Result<Acquisition, BootstrapError> {
    let dir = Dir::new(&target.install_dir);

    if dir.is_empty().await? {
        source.fetch(&target.repository_url, dir.path()).await?;
        info!("Cloned {} into {}", target.repository_url, dir.path().display());
        return Ok(Acquisition::Cloned);
    }

    match target.existing_dir_policy {
        ExistingDirPolicy::Reuse => {
            warn!(
                "{} is not empty, reusing the existing checkout",
                dir.path().display()
            );
            Ok(Acquisition::Reused)
        }
        ExistingDirPolicy::Replace => {
            warn!("Replacing existing contents of {}", dir.path().display());
            dir.delete().await?;
            source.fetch(&target.repository_url, dir.path()).await?;
            info!("Cloned {} into {}", target.repository_url, dir.path().display());
            Ok(Acquisition::Replaced)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeSource {
        fetched: Mutex<u32>,
    }

    #[async_trait]
    impl RepositorySource for FakeSource {
        async fn fetch(&self, _url: &str, target: &Path) -> Result<(), BootstrapError> {
            *self.fetched.lock().unwrap() += 1;
            tokio::fs::create_dir_all(target).await?;
            tokio::fs::write(target.join("Dockerfile"), "FROM scratch\n").await?;
            Ok(())
        }
    }

    fn target(dir: &Path, policy: ExistingDirPolicy) -> InstallationTarget {
        InstallationTarget {
            repository_url: "https://example.org/app.git".to_string(),
            install_dir: dir.to_path_buf(),
            existing_dir_policy: policy,
        }
    }

    #[tokio::test]
    async fn test_missing_dir_is_cloned() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("app");
        let source = FakeSource::default();

        let outcome = acquire(&source, &target(&dir, ExistingDirPolicy::Reuse))
            .await
            .unwrap();
        assert_eq!(outcome, Acquisition::Cloned);
        assert!(dir.join("Dockerfile").exists());
    }

    #[tokio::test]
    async fn test_non_empty_dir_is_reused() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(".env"), "PORT=3005\n").unwrap();
        let source = FakeSource::default();

        let outcome = acquire(&source, &target(tmp.path(), ExistingDirPolicy::Reuse))
            .await
            .unwrap();
        assert_eq!(outcome, Acquisition::Reused);
        assert_eq!(*source.fetched.lock().unwrap(), 0);
        assert!(tmp.path().join(".env").exists());
    }

    #[tokio::test]
    async fn test_non_empty_dir_is_replaced() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("app");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("stale.txt"), "old").unwrap();
        let source = FakeSource::default();

        let outcome = acquire(&source, &target(&dir, ExistingDirPolicy::Replace))
            .await
            .unwrap();
        assert_eq!(outcome, Acquisition::Replaced);
        assert!(!dir.join("stale.txt").exists());
        assert!(dir.join("Dockerfile").exists());
    }
}
