//! Keyed set-difference between observed and desired VLAN state
//!
//! Pure function, no I/O. Both sides are indexed by [`IdentityKey`]; a key
//! present on both sides produces no action whatever its attributes.

use std::collections::BTreeMap;

use crate::types::{DesiredInterface, IdentityKey, ObservedInterface};

/// Actions needed to bring observed state to desired state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diff {
    /// Desired interfaces missing on the host, sorted by key
    pub to_add: Vec<DesiredInterface>,
    /// Host interfaces not in desired state, sorted by key
    pub to_remove: Vec<ObservedInterface>,
    /// Keys present on both sides; informational only
    pub unchanged: Vec<IdentityKey>,
}

impl Diff {
    /// Returns true if nothing needs to change
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// Number of add and remove actions
    pub fn action_count(&self) -> usize {
        self.to_add.len() + self.to_remove.len()
    }
}

/// Computes the additions and removals that turn `observed` into `desired`.
///
/// Keys are assumed unique on each side. If a side repeats a key anyway, the
/// first occurrence is used.
pub fn diff(observed: &[ObservedInterface], desired: &[DesiredInterface]) -> Diff {
    let mut observed_by_key: BTreeMap<IdentityKey, &ObservedInterface> = BTreeMap::new();
    for iface in observed {
        observed_by_key.entry(iface.key()).or_insert(iface);
    }

    let mut desired_by_key: BTreeMap<IdentityKey, &DesiredInterface> = BTreeMap::new();
    for iface in desired {
        desired_by_key.entry(iface.key()).or_insert(iface);
    }

    let mut result = Diff::default();

    for (key, iface) in &desired_by_key {
        if observed_by_key.contains_key(key) {
            result.unchanged.push(key.clone());
        } else {
            result.to_add.push((*iface).clone());
        }
    }

    for (key, iface) in observed_by_key {
        if !desired_by_key.contains_key(&key) {
            result.to_remove.push(iface.clone());
        }
    }

    result
}
