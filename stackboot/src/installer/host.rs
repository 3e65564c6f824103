//! Host preconditions: operating system and privilege

use std::path::Path;

use nix::unistd::geteuid;
use sysinfo::System;
use tracing::{debug, info};

use crate::errors::PreconditionError;

/// System package managers the installer knows how to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Dnf,
    Yum,
    Apk,
    Pacman,
}

impl PackageManager {
    const PROBE_ORDER: [PackageManager; 5] = [
        PackageManager::Apt,
        PackageManager::Dnf,
        PackageManager::Yum,
        PackageManager::Apk,
        PackageManager::Pacman,
    ];

    pub fn program(&self) -> &'static str {
        match self {
            PackageManager::Apt => "apt-get",
            PackageManager::Dnf => "dnf",
            PackageManager::Yum => "yum",
            PackageManager::Apk => "apk",
            PackageManager::Pacman => "pacman",
        }
    }

    /// Arguments preceding the package name for a non-interactive install
    pub fn install_args(&self) -> &'static [&'static str] {
        match self {
            PackageManager::Apt => &["install", "-y", "-q"],
            PackageManager::Dnf | PackageManager::Yum => &["install", "-y"],
            PackageManager::Apk => &["add", "--no-cache"],
            PackageManager::Pacman => &["-S", "--noconfirm", "--needed"],
        }
    }

    /// Index refresh to run once before the first install
    pub fn refresh_args(&self) -> Option<&'static [&'static str]> {
        match self {
            PackageManager::Apt => Some(&["update", "-q"]),
            PackageManager::Apk => Some(&["update"]),
            _ => None,
        }
    }

    /// Map an os-release `ID` to its package manager
    pub fn for_distribution(id: &str) -> Option<Self> {
        match id.to_lowercase().as_str() {
            "ubuntu" | "debian" | "raspbian" | "linuxmint" | "pop" => Some(PackageManager::Apt),
            "fedora" | "rhel" | "centos" | "rocky" | "almalinux" => Some(PackageManager::Dnf),
            "amzn" => Some(PackageManager::Yum),
            "alpine" => Some(PackageManager::Apk),
            "arch" | "manjaro" | "endeavouros" => Some(PackageManager::Pacman),
            _ => None,
        }
    }

    fn probe() -> Option<Self> {
        Self::PROBE_ORDER
            .into_iter()
            .find(|pm| find_executable(pm.program()).is_some())
    }
}

/// Facts about the host gathered before anything is changed
#[derive(Debug, Clone)]
pub struct HostInfo {
    pub os_name: String,
    pub distribution: String,
    pub package_manager: Option<PackageManager>,
    pub is_root: bool,
}

/// Verify the host can run the workflow at all
///
/// Unsupported operating systems always fail. Missing privilege fails only
/// when `require_root` is set.
pub fn check_host(require_root: bool) -> Result<HostInfo, PreconditionError> {
    if std::env::consts::OS != "linux" {
        return Err(PreconditionError::UnsupportedOs(format!(
            "{} (only Linux hosts are supported)",
            std::env::consts::OS
        )));
    }

    let os_name = System::long_os_version()
        .or_else(System::name)
        .unwrap_or_else(|| "Linux".to_string());
    let distribution = System::distribution_id();
    let package_manager = detect_package_manager();
    debug!(
        "Host: {} (id={}), package manager: {:?}",
        os_name, distribution, package_manager
    );

    let is_root = geteuid().is_root();
    if require_root && !is_root {
        return Err(PreconditionError::NotPrivileged(
            "stackboot must run as root (try sudo)".to_string(),
        ));
    }

    info!("Running on {}", os_name);
    Ok(HostInfo {
        os_name,
        distribution,
        package_manager,
        is_root,
    })
}

/// Package manager from the os-release ID, else the first one found on `PATH`
pub fn detect_package_manager() -> Option<PackageManager> {
    PackageManager::for_distribution(&System::distribution_id()).or_else(PackageManager::probe)
}

/// Locate an executable on `PATH`
pub fn find_executable(name: &str) -> Option<std::path::PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
