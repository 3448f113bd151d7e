//! Named rate limit policies loaded from configuration.
//!
//! A policy binds a name (usually the protected action, such as `login`) to
//! a quota. Policies are validated when loaded, so a zero limit or window is
//! reported at startup rather than at request time. Names become key scopes
//! and must not contain the scope separator.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::client_key::validate_scope;
use super::window::Quota;
use crate::error::{Result, TurnstileError};

/// Quota settings for a single policy as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Maximum admissions per window
    pub limit: u64,
    /// Window length in milliseconds
    pub window_ms: u64,
}

/// A validated set of named policies.
#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    policies: HashMap<String, Quota>,
}

impl PolicySet {
    /// Create an empty policy set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate raw policy configuration.
    pub fn from_configs(configs: &HashMap<String, PolicyConfig>) -> Result<Self> {
        let mut set = Self::new();
        for (name, config) in configs {
            let quota = Quota::new(config.limit, config.window_ms).map_err(|e| {
                TurnstileError::Config(format!("Invalid policy '{}': {}", name, e))
            })?;
            set.insert(name.clone(), quota)?;
        }

        debug!(count = set.len(), "Loaded rate limit policies");
        Ok(set)
    }

    /// Add or replace a policy.
    pub fn insert(&mut self, name: impl Into<String>, quota: Quota) -> Result<()> {
        let name = name.into();
        validate_scope(&name)
            .map_err(|e| TurnstileError::Config(format!("Invalid policy name: {}", e)))?;
        self.policies.insert(name, quota);
        Ok(())
    }

    /// Get the quota for a policy.
    pub fn get(&self, name: &str) -> Option<Quota> {
        self.policies.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}
