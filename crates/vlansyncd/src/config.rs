//! Configuration file support for vlansyncd
//!
//! Loads and validates daemon configuration from TOML files.
//! Default location: /etc/vlansync/vlansyncd.toml
//!
//! Every key is optional; a missing file yields the defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use vlansync_common::shell::{IP_CMD, MODINFO_CMD};
use vlansync_common::{VlanError, VlanResult};

use crate::commands::CommandSet;
use crate::types::AddressFamily;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/vlansync/vlansyncd.toml";

/// Host command configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandsConfig {
    /// Path to `ip`
    #[serde(default = "default_ip_path")]
    pub ip_path: String,

    /// Path to `modinfo`
    #[serde(default = "default_modinfo_path")]
    pub modinfo_path: String,

    /// Per-command deadline in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

/// Reconciliation loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Seconds between passes in daemon mode
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Address families whose link views are collected and merged
    #[serde(default = "default_address_families")]
    pub address_families: Vec<AddressFamily>,

    /// Compute and log actions without applying them
    #[serde(default)]
    pub dry_run: bool,
}

/// Desired-state source configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredConfig {
    /// JSON file holding the desired interface list
    #[serde(default = "default_desired_path")]
    pub path: PathBuf,
}

/// Complete vlansyncd configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VlansyncConfig {
    /// Host command configuration
    #[serde(default)]
    pub commands: CommandsConfig,

    /// Reconciliation loop configuration
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// Desired-state source configuration
    #[serde(default)]
    pub desired: DesiredConfig,
}

// Default functions
fn default_ip_path() -> String {
    IP_CMD.to_string()
}

fn default_modinfo_path() -> String {
    MODINFO_CMD.to_string()
}

fn default_command_timeout() -> u64 {
    10
}

fn default_interval() -> u64 {
    60
}

fn default_address_families() -> Vec<AddressFamily> {
    AddressFamily::ALL.to_vec()
}

fn default_desired_path() -> PathBuf {
    PathBuf::from("/etc/vlansync/desired.json")
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            ip_path: default_ip_path(),
            modinfo_path: default_modinfo_path(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            address_families: default_address_families(),
            dry_run: false,
        }
    }
}

impl Default for DesiredConfig {
    fn default() -> Self {
        Self {
            path: default_desired_path(),
        }
    }
}

impl VlansyncConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> VlanResult<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content).map_err(|e| {
                VlanError::config(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(VlanError::Io(e)),
        }
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> VlanResult<Self> {
        toml::from_str(content).map_err(|e| VlanError::config(e.to_string()))
    }

    /// Get the per-command deadline as Duration
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.commands.command_timeout_secs)
    }

    /// Get the pass interval as Duration
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.reconcile.interval_secs)
    }

    /// Command builders for the configured program paths
    pub fn command_set(&self) -> CommandSet {
        CommandSet::new(&self.commands.ip_path, &self.commands.modinfo_path)
    }

    /// Validate configuration
    pub fn validate(&self) -> VlanResult<()> {
        if self.commands.command_timeout_secs == 0 {
            return Err(VlanError::config("command_timeout_secs must be > 0"));
        }

        if self.reconcile.interval_secs == 0 {
            return Err(VlanError::config("interval_secs must be > 0"));
        }

        if self.reconcile.address_families.is_empty() {
            return Err(VlanError::config("address_families must not be empty"));
        }

        if self.commands.ip_path.is_empty() || self.commands.modinfo_path.is_empty() {
            return Err(VlanError::config("command paths must not be empty"));
        }

        Ok(())
    }
}
