//! Launch context assembly for master and worker containers.
//!
//! A launch context is the command to run, the artifacts the node manager
//! copies into the container first, and the process environment.

use std::collections::BTreeMap;

use slotmaster_core::size::{format_bytes, MB};
use slotmaster_core::{CoordinatorConfig, LaunchContext, LocalResource, Role};

use crate::error::{CoordinatorError, CoordinatorResult};

/// Container working directory, expanded by the node manager.
const PWD: &str = "$PWD";

/// Static launch parameters captured from configuration.
#[derive(Debug, Clone)]
pub struct LaunchTemplate {
    resource_path: String,
    tarball: String,
    setup_script: String,
    env_prefix: String,
    log_dir: String,
    ramdisk_bytes: u64,
}

impl LaunchTemplate {
    /// Fails when the shared resource path is blank: no container could
    /// ever be launched without it.
    pub fn from_config(config: &CoordinatorConfig) -> CoordinatorResult<Self> {
        let resource_path = config.resources.path.trim().trim_end_matches('/');
        if resource_path.is_empty() {
            return Err(CoordinatorError::Resource {
                name: "resources.path".to_string(),
                reason: "resource path is not set".to_string(),
            });
        }

        Ok(Self {
            resource_path: resource_path.to_string(),
            tarball: config.resources.tarball.clone(),
            setup_script: config.resources.setup_script.clone(),
            env_prefix: config.launch.env_prefix.clone(),
            log_dir: config.launch.log_dir.clone(),
            ramdisk_bytes: config.ramdisk_mb()? * MB,
        })
    }

    /// Shell command that starts `role` through the setup script.
    pub fn command(&self, role: Role) -> String {
        format!(
            "./{script} {arg} 1>{log}/stdout 2>{log}/stderr",
            script = self.setup_script,
            arg = role.command_arg(),
            log = self.log_dir,
        )
    }

    /// Artifacts copied into every container, keyed by file name.
    pub fn local_resources(&self) -> BTreeMap<String, LocalResource> {
        [&self.tarball, &self.setup_script]
            .into_iter()
            .map(|name| {
                let uri = format!("{}/{name}", self.resource_path);
                (name.clone(), LocalResource { uri })
            })
            .collect()
    }

    pub fn master_context(&self) -> LaunchContext {
        LaunchContext {
            commands: vec![self.command(Role::Master)],
            local_resources: self.local_resources(),
            environment: self.common_environment(),
        }
    }

    /// Worker context; workers find the master through `master_address`.
    pub fn worker_context(&self, master_address: &str) -> LaunchContext {
        let mut environment = self.common_environment();
        environment.insert(self.env_var("MASTER_HOSTNAME"), master_address.to_string());
        environment.insert(
            self.env_var("WORKER_MEMORY_SIZE"),
            format_bytes(self.ramdisk_bytes),
        );

        LaunchContext {
            commands: vec![self.command(Role::Worker)],
            local_resources: self.local_resources(),
            environment,
        }
    }

    fn common_environment(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(self.env_var("HOME"), PWD.to_string())])
    }

    fn env_var(&self, name: &str) -> String {
        format!("{}_{name}", self.env_prefix)
    }
}
