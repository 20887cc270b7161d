//! Local VLAN state collection
//!
//! Queries the host once per configured address family and merges the
//! answers into one record per identity key. Collection is all-or-nothing:
//! any failed query or unparseable payload fails the whole collection.

use std::collections::BTreeMap;
use tracing::{debug, instrument};

use vlansync_common::{ExecContext, HostCommand, VlanError, VlanResult};

use crate::commands::CommandSet;
use crate::link;
use crate::types::{AddressFamily, IdentityKey, ObservedInterface};

/// Collects the VLAN sub-interfaces currently present on the host.
pub struct Collector<'a, H: HostCommand + ?Sized> {
    host: &'a H,
    commands: &'a CommandSet,
    families: &'a [AddressFamily],
}

impl<'a, H: HostCommand + ?Sized> Collector<'a, H> {
    /// Create a new collector querying `families`
    pub fn new(host: &'a H, commands: &'a CommandSet, families: &'a [AddressFamily]) -> Self {
        Self {
            host,
            commands,
            families,
        }
    }

    /// Returns observed VLAN interfaces sorted by identity key.
    #[instrument(skip(self, ctx))]
    pub async fn collect(&self, ctx: &ExecContext) -> VlanResult<Vec<ObservedInterface>> {
        let mut batches = Vec::with_capacity(self.families.len());

        for family in self.families {
            let query = self.commands.show_vlan_links(*family);
            let stdout = query.run_checked(self.host, ctx).await?;
            let records = link::parse_links(&stdout).map_err(|source| VlanError::Parse {
                command: query.command_line(),
                source,
            })?;

            let mut batch = Vec::new();
            for record in records {
                if let Some(observed) = record.into_observed()? {
                    batch.push(observed);
                }
            }
            debug!(family = %family, count = batch.len(), "Collected VLAN links");
            batches.push(batch);
        }

        Ok(merge_observed(batches))
    }
}

/// Merges per-family views into one record per identity key.
///
/// The first record seen for a key keeps its name, address and MTU; flags
/// from later records are unioned into it.
pub fn merge_observed<I>(batches: I) -> Vec<ObservedInterface>
where
    I: IntoIterator<Item = Vec<ObservedInterface>>,
{
    let mut merged: BTreeMap<IdentityKey, ObservedInterface> = BTreeMap::new();

    for observed in batches.into_iter().flatten() {
        match merged.get_mut(&observed.key()) {
            Some(existing) => existing.flags.extend(observed.flags),
            None => {
                merged.insert(observed.key(), observed);
            }
        }
    }

    merged.into_values().collect()
}
