//! Installation layout

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Location of a local installation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Installation root, the directory holding `.build.info`
    pub install_dir: PathBuf,
}

impl StorageConfig {
    /// Configuration for the installation at `install_dir`
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
        }
    }

    /// `<install>/.build.info`
    pub fn build_info_path(&self) -> PathBuf {
        self.install_dir.join(".build.info")
    }

    /// `<install>/Data`
    pub fn data_dir(&self) -> PathBuf {
        self.install_dir.join("Data")
    }

    /// `<install>/Data/data`, holding archives and `.idx` journals
    pub fn storage_dir(&self) -> PathBuf {
        self.data_dir().join("data")
    }

    /// `<install>/Data/data/data.NNN`
    pub fn archive_path(&self, archive_id: u16) -> PathBuf {
        self.storage_dir().join(format!("data.{archive_id:03}"))
    }

    /// `<install>/Data/config/xx/yy/key`
    pub fn config_path(&self, key: &str) -> PathBuf {
        let dir = self.data_dir().join("config");
        match (key.get(0..2), key.get(2..4)) {
            (Some(a), Some(b)) => dir.join(a).join(b).join(key),
            _ => dir.join(key),
        }
    }

    /// Installation root
    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }
}
