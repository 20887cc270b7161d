//! Error types for VLAN reconciliation.
//!
//! This module defines the error taxonomy shared by the prober, collector,
//! applier and reconciler. All errors implement `std::error::Error` via
//! `thiserror`.
//!
//! An unsupported environment is deliberately absent: a host without 802.1Q
//! support is an expected state and is reported as a skipped pass, not as
//! an error.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for VLAN reconciliation operations.
pub type VlanResult<T> = Result<T, VlanError>;

/// Errors that can occur while collecting, diffing or applying VLAN state.
#[derive(Debug, Error)]
pub enum VlanError {
    /// Failed to start a host command (binary missing, permission denied).
    #[error("Failed to execute host command '{command}': {source}")]
    Spawn {
        /// The command line that failed to start.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Host command returned a non-zero exit code.
    #[error("Host command failed: '{command}' (exit code {exit_code}): {output}")]
    CommandFailed {
        /// The command line that failed.
        command: String,
        /// The exit code.
        exit_code: i32,
        /// Combined stdout/stderr output.
        output: String,
    },

    /// Structured link payload could not be parsed.
    #[error("Failed to parse link description from '{command}': {source}")]
    Parse {
        /// The query whose output was malformed.
        command: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// VLAN ID outside 1-4094 or not a number.
    #[error("Invalid VLAN ID: {value} (must be 1-4094)")]
    InvalidVlanId {
        /// The rejected value as it appeared in the input.
        value: String,
    },

    /// Interface name rejected by the kernel's naming rules.
    #[error("Invalid interface name '{name}': {reason}")]
    InvalidInterfaceName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Desired-state list is duplicated or malformed; rejected as a whole.
    #[error("Invalid desired state: {message}")]
    InvalidDesiredState {
        /// Error message.
        message: String,
    },

    /// An in-flight host command was cancelled.
    #[error("Host command cancelled: '{command}'")]
    Cancelled {
        /// The command that was running.
        command: String,
    },

    /// An in-flight host command ran past its deadline.
    #[error("Host command timed out after {timeout:?}: '{command}'")]
    Timeout {
        /// The command that was running.
        command: String,
        /// The deadline that expired.
        timeout: Duration,
    },

    /// Another reconciliation pass is already running for this host.
    #[error("A reconciliation pass is already in progress")]
    PassInProgress,

    /// Configuration file or CLI validation error.
    #[error("Configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    /// IO error outside host command execution.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl VlanError {
    /// Creates an invalid VLAN ID error.
    pub fn invalid_vlan_id(value: impl ToString) -> Self {
        Self::InvalidVlanId {
            value: value.to_string(),
        }
    }

    /// Creates an invalid interface name error.
    pub fn invalid_interface_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInterfaceName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid desired state error.
    pub fn invalid_desired(message: impl Into<String>) -> Self {
        Self::InvalidDesiredState {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns true if the pass was interrupted by cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, VlanError::Cancelled { .. })
    }

    /// Returns true if this error indicates a transient condition
    /// that may succeed on the next pass.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VlanError::CommandFailed { .. } | VlanError::Timeout { .. } | VlanError::PassInProgress
        )
    }
}
