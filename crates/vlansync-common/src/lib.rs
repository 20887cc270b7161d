//! Common infrastructure for the VLAN sub-interface reconciler.
//!
//! This crate provides the pieces shared by the daemon and its test
//! support crate:
//!
//! - [`shell`]: the host command capability ([`HostCommand`]) and its
//!   process-backed implementation ([`ProcessRunner`])
//! - [`VlanId`]: validated IEEE 802.1Q VLAN identifier
//! - [`error`]: error taxonomy for collection, apply and configuration
//!
//! # Example
//!
//! ```ignore
//! use vlansync_common::{ExecContext, HostCommand, ProcessRunner};
//!
//! let runner = ProcessRunner::new();
//! let ctx = ExecContext::new().with_timeout(Duration::from_secs(5));
//! let result = runner.execute("/sbin/modinfo", &["8021q"], &ctx).await?;
//! if result.success() {
//!     println!("802.1Q available");
//! }
//! ```

pub mod error;
pub mod shell;
mod vlan;

// Re-export commonly used items at crate root
pub use error::{VlanError, VlanResult};
pub use shell::{ExecContext, ExecResult, HostCommand, ProcessRunner};
pub use vlan::VlanId;
