//! # Runtime Configuration Module
//!
//! Configuration for a [`Mediator`](crate::Mediator): the two registration
//! policies and the sizing of the default worker pool.
//!
//! ## Environment Variables
//!
//! | Variable | Values | Default |
//! | --- | --- | --- |
//! | `CORREOS_REGISTRATION_POLICY` | `labeled_only`, `all` | `labeled_only` |
//! | `CORREOS_EMPTY_NAME_HANDLING` | `assign_method_name`, `assign_full_method_name`, `skip` | `assign_full_method_name` |
//! | `CORREOS_WORKERS` | worker coroutine count | `4` |
//! | `CORREOS_STACK_SIZE` | bytes, decimal or `0x` hex | `0x10000` |
//!
//! Unrecognised values fall back to the default.
//!
//! ## YAML
//!
//! ```yaml
//! registration_policy: all
//! empty_name_handling: assign_method_name
//! workers:
//!   num_workers: 8
//!   stack_size: 32768
//! ```
//!
//! Every key is optional.

use crate::discovery::RegistrationPolicy;
use crate::registry::EmptyNameHandling;
use crate::worker_pool::WorkerPoolConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Mediator configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediatorConfig {
    /// Which discovered owners are considered for registration
    pub registration_policy: RegistrationPolicy,
    /// How descriptors with an empty declared name are handled
    pub empty_name_handling: EmptyNameHandling,
    /// Worker pool sizing for asynchronous dispatch
    pub workers: WorkerPoolConfig,
}

impl MediatorConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let registration_policy = env::var("CORREOS_REGISTRATION_POLICY")
            .ok()
            .and_then(|s| RegistrationPolicy::parse(&s))
            .unwrap_or_default();

        let empty_name_handling = env::var("CORREOS_EMPTY_NAME_HANDLING")
            .ok()
            .and_then(|s| EmptyNameHandling::parse(&s))
            .unwrap_or_default();

        MediatorConfig {
            registration_policy,
            empty_name_handling,
            workers: WorkerPoolConfig::from_env(),
        }
    }

    /// Parse a YAML document.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse mediator configuration")
    }

    /// Read and parse a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    #[must_use]
    pub fn with_registration_policy(mut self, policy: RegistrationPolicy) -> Self {
        self.registration_policy = policy;
        self
    }

    #[must_use]
    pub fn with_empty_name_handling(mut self, handling: EmptyNameHandling) -> Self {
        self.empty_name_handling = handling;
        self
    }
}
