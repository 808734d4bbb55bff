// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Manager configuration loaded from TOML files or constructed
//! programmatically.
//!
//! # TOML Format
//! ```toml
//! policy = "barrier"
//! loading_mode = "lazy"
//! spill_dir = "/var/tmp/spillway"
//!
//! [policy_params]
//! barrier = "500MB"
//! ```

use crate::policy::{self, DumpPolicy};
use crate::BufferError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// When a buffer with a caller-supplied stream factory materializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadingMode {
    /// Restore immediately when the factory is installed.
    Direct,
    /// Stay dumped until the first lock.
    Lazy,
}

/// Configuration for a [`BufferManager`](crate::BufferManager).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ManagerConfig {
    /// Dump policy name: `"never"`, `"always"`, `"barrier"`, `"valve"`.
    pub policy: String,
    /// Policy tuning parameters (byte-size strings, e.g. `barrier = "500MB"`).
    #[serde(default)]
    pub policy_params: BTreeMap<String, String>,
    /// `"direct"` or `"lazy"` — see [`LoadingMode`].
    pub loading_mode: String,
    /// Directory for spill files (defaults to the system temp directory).
    pub spill_dir: Option<PathBuf>,
}

impl ManagerConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, BufferError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BufferError::Config(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, BufferError> {
        toml::from_str(toml_str)
            .map_err(|e| BufferError::Config(format!("TOML parse error: {e}")))
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, BufferError> {
        toml::to_string_pretty(self)
            .map_err(|e| BufferError::Config(format!("TOML serialise error: {e}")))
    }

    /// Parses the loading-mode string.
    pub fn parse_loading_mode(&self) -> Result<LoadingMode, BufferError> {
        match self.loading_mode.to_lowercase().as_str() {
            "direct" => Ok(LoadingMode::Direct),
            "lazy" => Ok(LoadingMode::Lazy),
            other => Err(BufferError::Config(format!(
                "unknown loading mode '{other}': expected 'direct' or 'lazy'"
            ))),
        }
    }

    /// Creates the dump policy specified by this config, with all
    /// parameters applied.
    pub fn create_policy(&self) -> Result<Box<dyn DumpPolicy>, BufferError> {
        let mut policy = policy::create_policy(&self.policy)?;
        for (name, value) in &self.policy_params {
            if !policy.set_param(name, value) {
                return Err(BufferError::Config(format!(
                    "policy '{}' rejected parameter {name} = \"{value}\"",
                    self.policy,
                )));
            }
        }
        Ok(policy)
    }

    /// Resolves the spill directory.
    pub fn resolve_spill_dir(&self) -> PathBuf {
        self.spill_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            policy: "never".to_string(),
            policy_params: BTreeMap::new(),
            loading_mode: "lazy".to_string(),
            spill_dir: None,
        }
    }
}
