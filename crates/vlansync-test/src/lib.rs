//! Test infrastructure for the VLAN reconciler
//!
//! Provides:
//! - [`FakeHost`]: in-memory `ip`/`modinfo` simulator with failure injection
//! - [`ScriptedHost`]: canned command results with a call log
//! - Payload and desired-state fixtures
//! - Link-table and command-log verification helpers

pub mod fake_host;
pub mod fixtures;
mod scripted;
mod verification;

pub use fake_host::{FakeHost, FakeLink};
pub use fixtures::*;
pub use scripted::ScriptedHost;
pub use verification::*;
