//! vlansyncd - VLAN sub-interface reconciler
//!
//! Converges the VLAN sub-interfaces present on a Linux host to a
//! desired-state list. One reconciliation pass probes for 802.1Q support,
//! collects the existing VLAN links, computes the keyed set-difference
//! against the desired list and applies removals and additions one
//! interface at a time.

pub mod applier;
pub mod collector;
pub mod commands;
pub mod config;
pub mod differ;
pub mod link;
pub mod prober;
pub mod reconciler;
mod types;

pub use applier::{AddOutcome, Applier, LinkPresence, RemoveOutcome};
pub use collector::{merge_observed, Collector};
pub use commands::{CommandSet, Invocation};
pub use config::VlansyncConfig;
pub use differ::{diff, Diff};
pub use prober::Prober;
pub use reconciler::{ActionKind, ActionOutcome, ActionStatus, PassOutcome, PassReport, Reconciler};
pub use types::*;
