//! Coordinator configuration (slotmaster.toml).
//!
//! Every field has a default so an empty file is a valid configuration.
//! Memory values are human sizes ("1024MB", "2GB").

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::size::{parse_size, MB};
use crate::types::ResourceShape;

/// Hostname that allows the master request to relax locality.
pub const BOOTSTRAP_HOST: &str = "localhost";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub master: MasterConfig,
    pub worker: WorkerConfig,
    pub resources: ResourcesConfig,
    pub launch: LaunchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MasterConfig {
    /// Host the master must be placed on.
    pub host: String,
    pub cpu: u32,
    pub memory: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Target number of workers.
    pub count: u32,
    pub cpu: u32,
    /// Memory for the worker process itself.
    pub memory: String,
    /// Memory reserved for the worker's ramdisk, requested on top of `memory`.
    pub ramdisk_memory: String,
    pub max_per_host: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResourcesConfig {
    /// Shared file system directory holding the shipped artifacts.
    pub path: String,
    pub tarball: String,
    pub setup_script: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LaunchConfig {
    /// Prefix for environment variables handed to launched processes.
    pub env_prefix: String,
    /// Log directory token expanded by the node manager.
    pub log_dir: String,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            host: BOOTSTRAP_HOST.to_string(),
            cpu: 1,
            memory: "1024MB".to_string(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: 1,
            cpu: 1,
            memory: "1024MB".to_string(),
            ramdisk_memory: "1024MB".to_string(),
            max_per_host: 1,
        }
    }
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            tarball: "app.tar.gz".to_string(),
            setup_script: "app-yarn-setup.sh".to_string(),
        }
    }
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            env_prefix: "APP".to_string(),
            log_dir: "<LOG_DIR>".to_string(),
        }
    }
}

impl CoordinatorConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: CoordinatorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check values the coordinator cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.master.host.trim().is_empty() {
            return Err(ConfigError::Invalid("master.host must not be empty".into()));
        }
        if self.master.cpu == 0 || self.worker.cpu == 0 {
            return Err(ConfigError::Invalid("cpu must be at least 1".into()));
        }
        if self.worker.max_per_host == 0 {
            return Err(ConfigError::Invalid(
                "worker.max_per_host must be at least 1".into(),
            ));
        }
        self.master_shape()?;
        self.worker_shape()?;
        Ok(())
    }

    /// Container shape for the master.
    pub fn master_shape(&self) -> Result<ResourceShape, ConfigError> {
        Ok(ResourceShape {
            memory_mb: parse_size(&self.master.memory)? / MB,
            vcores: self.master.cpu,
        })
    }

    /// Container shape for a worker: process memory plus ramdisk.
    pub fn worker_shape(&self) -> Result<ResourceShape, ConfigError> {
        let worker_mb = parse_size(&self.worker.memory)? / MB;
        Ok(ResourceShape {
            memory_mb: worker_mb + self.ramdisk_mb()?,
            vcores: self.worker.cpu,
        })
    }

    /// Ramdisk reservation per worker, in whole megabytes.
    pub fn ramdisk_mb(&self) -> Result<u64, ConfigError> {
        Ok(parse_size(&self.worker.ramdisk_memory)? / MB)
    }

    /// Whether the master request may land off the configured host.
    pub fn master_relax_locality(&self) -> bool {
        self.master.host == BOOTSTRAP_HOST
    }
}
