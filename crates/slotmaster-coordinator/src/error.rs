//! Coordinator error types.

use thiserror::Error;

use slotmaster_core::ConfigError;

/// Errors that abort the bring-up sequence.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(
        "not enough hosts to launch {needed} workers: {hosts} hosts available with room for {per_host} each"
    )]
    CapacityInsufficient {
        needed: u32,
        hosts: usize,
        per_host: u32,
    },

    #[error("failed to register application master: {0}")]
    Registration(#[source] anyhow::Error),

    #[error("failed to start {client} client: {source}")]
    ClientStart {
        client: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to list cluster hosts: {0}")]
    Inventory(#[source] anyhow::Error),

    #[error("cannot resolve local resource {name}: {reason}")]
    Resource { name: String, reason: String },

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
