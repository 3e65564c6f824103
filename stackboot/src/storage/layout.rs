//! Installation directory layout

use std::path::{Path, PathBuf};

use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Data directories mounted into the stack's containers
pub const DATA_DIRS: [&str; 4] = ["postgres", "redis", "minio", "caddy"];

/// Paths inside the installation directory
#[derive(Debug, Clone)]
pub struct InstallLayout {
    /// Repository checkout and rendered files live here
    pub base_dir: PathBuf,
}

impl InstallLayout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn root(&self) -> Dir {
        Dir::new(&self.base_dir)
    }

    /// Environment file (single source of truth for configuration)
    pub fn env_file(&self) -> File {
        File::new(self.base_dir.join(".env"))
    }

    /// Container runtime deployment descriptor
    pub fn compose_file(&self) -> File {
        File::new(self.base_dir.join("docker-compose.yml"))
    }

    /// Front door routing rules
    pub fn proxy_file(&self) -> File {
        File::new(self.base_dir.join("Caddyfile"))
    }

    /// Build context for a proxy image with extra modules
    pub fn proxy_build_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("proxy"))
    }

    pub fn data_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("data"))
    }

    pub fn service_data_dirs(&self) -> Vec<Dir> {
        let data = self.data_dir();
        DATA_DIRS.iter().map(|name| data.subdir(name)).collect()
    }
}

/// Default access key location: `$HOME/.config/stackboot/access.key`
pub fn default_access_key_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join("stackboot")
        .join("access.key")
}

/// Resolve the access key path from an optional override
pub fn access_key_path(configured: Option<&Path>) -> PathBuf {
    configured
        .map(Path::to_path_buf)
        .unwrap_or_else(default_access_key_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = InstallLayout::new("/opt/app");
        assert_eq!(layout.env_file().path(), Path::new("/opt/app/.env"));
        assert_eq!(
            layout.compose_file().path(),
            Path::new("/opt/app/docker-compose.yml")
        );
        assert_eq!(layout.proxy_file().path(), Path::new("/opt/app/Caddyfile"));
        assert_eq!(layout.service_data_dirs().len(), 4);
        assert_eq!(
            layout.service_data_dirs()[0].path(),
            Path::new("/opt/app/data/postgres")
        );
    }

    #[test]
    fn test_access_key_override() {
        let custom = PathBuf::from("/tmp/key.json");
        assert_eq!(access_key_path(Some(&custom)), custom);
        assert!(access_key_path(None).ends_with("stackboot/access.key"));
    }
}
