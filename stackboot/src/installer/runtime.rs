//! Container runtime invocation

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::errors::BootstrapError;

/// Builds and starts the rendered topology
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn build(&self, project_dir: &Path) -> Result<(), BootstrapError>;

    async fn up(&self, project_dir: &Path) -> Result<(), BootstrapError>;
}

/// Which compose front end is installed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeFlavor {
    /// `docker compose`
    Plugin,
    /// `docker-compose`
    Standalone,
}

/// Docker Compose, plugin form preferred, standalone binary as fallback
///
/// The flavor is detected once with `version`; a failing `build` or `up`
/// is reported as is and never retried with the other flavor.
pub struct ComposeRuntime {
    docker: PathBuf,
    docker_compose: PathBuf,
    flavor: OnceCell<ComposeFlavor>,
}

impl Default for ComposeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ComposeRuntime {
    pub fn new() -> Self {
        Self::with_programs("docker", "docker-compose")
    }

    pub fn with_programs(docker: impl Into<PathBuf>, docker_compose: impl Into<PathBuf>) -> Self {
        Self {
            docker: docker.into(),
            docker_compose: docker_compose.into(),
            flavor: OnceCell::new(),
        }
    }

    pub async fn flavor(&self) -> Result<ComposeFlavor, BootstrapError> {
        self.flavor
            .get_or_try_init(|| async {
                if self.succeeds(ComposeFlavor::Plugin, &["version"]).await {
                    Ok(ComposeFlavor::Plugin)
                } else if self.succeeds(ComposeFlavor::Standalone, &["version"]).await {
                    Ok(ComposeFlavor::Standalone)
                } else {
                    Err(BootstrapError::RuntimeError(
                        "neither 'docker compose' nor 'docker-compose' is available".to_string(),
                    ))
                }
            })
            .await
            .copied()
    }

    fn command(&self, flavor: ComposeFlavor, args: &[&str]) -> Command {
        let mut command = match flavor {
            ComposeFlavor::Plugin => {
                let mut command = Command::new(&self.docker);
                command.arg("compose");
                command
            }
            ComposeFlavor::Standalone => Command::new(&self.docker_compose),
        };
        command.args(args);
        command
    }

    async fn succeeds(&self, flavor: ComposeFlavor, args: &[&str]) -> bool {
        let status = self
            .command(flavor, args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match status {
            Ok(status) => status.success(),
            Err(e) => {
                debug!("{:?} compose unavailable: {}", flavor, e);
                false
            }
        }
    }

    async fn compose(&self, project_dir: &Path, args: &[&str]) -> Result<(), BootstrapError> {
        if !project_dir.exists() {
            return Err(BootstrapError::RuntimeError(format!(
                "Project directory does not exist: {}",
                project_dir.display()
            )));
        }

        let flavor = self.flavor().await?;
        let label = match flavor {
            ComposeFlavor::Plugin => "docker compose",
            ComposeFlavor::Standalone => "docker-compose",
        };
        debug!("Running {} {}...", label, args.join(" "));

        let status = self
            .command(flavor, args)
            .current_dir(project_dir)
            .status()
            .await
            .map_err(|e| BootstrapError::RuntimeError(format!("Failed to run {}: {}", label, e)))?;

        if !status.success() {
            return Err(BootstrapError::RuntimeError(format!(
                "{} {} failed ({})",
                label,
                args.join(" "),
                status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for ComposeRuntime {
    async fn build(&self, project_dir: &Path) -> Result<(), BootstrapError> {
        info!("Building images in {}", project_dir.display());
        self.compose(project_dir, &["build"]).await
    }

    async fn up(&self, project_dir: &Path) -> Result<(), BootstrapError> {
        info!("Starting services in {}", project_dir.display());
        self.compose(project_dir, &["up", "-d"]).await
    }
}
