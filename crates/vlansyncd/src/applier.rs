//! VLAN sub-interface add/remove operations
//!
//! Each call touches exactly one interface and is independent of any other
//! call. Both operations are idempotent against the host: adding a child that
//! already exists with the same identity, or removing one that is already
//! gone, succeeds without changing anything.

use tracing::{debug, info, instrument, warn};

use vlansync_common::{ExecContext, HostCommand, VlanError, VlanResult};

use crate::commands::{CommandSet, Invocation};
use crate::link;
use crate::types::{validate_ifname, DesiredInterface, ObservedInterface};

/// Result of a successful add
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The child was created by this call
    Created,
    /// A child with the same identity already existed
    AlreadyPresent,
}

/// Result of a successful remove
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The child was deleted by this call
    Removed,
    /// The child no longer existed
    AlreadyAbsent,
}

/// What the host has under a given interface name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkPresence {
    /// No such link
    Absent,
    /// A VLAN sub-interface
    Vlan(ObservedInterface),
    /// A link of another kind, or a VLAN that cannot be keyed
    Other,
}

/// Executes add/remove actions against the host.
pub struct Applier<'a, H: HostCommand + ?Sized> {
    host: &'a H,
    commands: &'a CommandSet,
}

impl<'a, H: HostCommand + ?Sized> Applier<'a, H> {
    /// Create a new applier
    pub fn new(host: &'a H, commands: &'a CommandSet) -> Self {
        Self { host, commands }
    }

    /// Create the VLAN child for `iface`, then apply its address, MTU and
    /// admin state.
    ///
    /// If any step after creation fails, the created link is deleted again
    /// before the error is returned.
    #[instrument(skip(self, iface, ctx), fields(parent = %iface.parent_link, vlan_id = %iface.vlan_id))]
    pub async fn add(&self, iface: &DesiredInterface, ctx: &ExecContext) -> VlanResult<AddOutcome> {
        let child = iface.child_name();
        validate_ifname(&child)?;

        let create = self
            .commands
            .add_vlan_link(&iface.parent_link, &child, iface.vlan_id);
        if let Err(e) = create.run_checked(self.host, ctx).await {
            if !matches!(e, VlanError::CommandFailed { .. }) {
                return Err(e);
            }
            return match self.lookup(&child, ctx).await? {
                LinkPresence::Vlan(existing) if existing.key() == iface.key() => {
                    debug!(child = %child, "VLAN child already present");
                    Ok(AddOutcome::AlreadyPresent)
                }
                presence => {
                    debug!(child = %child, ?presence, "Link add failed");
                    Err(e)
                }
            };
        }

        if let Err(e) = self.configure(iface, &child, ctx).await {
            self.rollback(&child, ctx).await;
            return Err(e);
        }

        info!(child = %child, "Created VLAN sub-interface");
        Ok(AddOutcome::Created)
    }

    /// Delete the VLAN child `iface`.
    #[instrument(skip(self, iface, ctx), fields(child = %iface.child_name))]
    pub async fn remove(
        &self,
        iface: &ObservedInterface,
        ctx: &ExecContext,
    ) -> VlanResult<RemoveOutcome> {
        let delete = self.commands.delete_link(&iface.child_name);
        match delete.run_checked(self.host, ctx).await {
            Ok(_) => {
                info!(child = %iface.child_name, "Deleted VLAN sub-interface");
                Ok(RemoveOutcome::Removed)
            }
            Err(e @ VlanError::CommandFailed { .. }) => {
                match self.lookup(&iface.child_name, ctx).await? {
                    LinkPresence::Absent => {
                        debug!(child = %iface.child_name, "VLAN child already absent");
                        Ok(RemoveOutcome::AlreadyAbsent)
                    }
                    _ => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Look up a link by name.
    ///
    /// A non-zero exit from `ip link show dev` means the link is absent.
    pub async fn lookup(&self, name: &str, ctx: &ExecContext) -> VlanResult<LinkPresence> {
        let query = self.commands.show_link(name);
        let result = query.run(self.host, ctx).await?;
        if !result.success() {
            return Ok(LinkPresence::Absent);
        }

        let records = link::parse_links(&result.stdout).map_err(|source| VlanError::Parse {
            command: query.command_line(),
            source,
        })?;
        let Some(record) = records.into_iter().next() else {
            return Ok(LinkPresence::Absent);
        };

        Ok(match record.into_observed()? {
            Some(observed) => LinkPresence::Vlan(observed),
            None => LinkPresence::Other,
        })
    }

    async fn configure(
        &self,
        iface: &DesiredInterface,
        child: &str,
        ctx: &ExecContext,
    ) -> VlanResult<()> {
        let mut steps: Vec<Invocation> = Vec::with_capacity(3);
        if let Some(address) = iface.address_hint.as_deref() {
            steps.push(self.commands.set_link_address(child, address));
        }
        if let Some(mtu) = iface.mtu {
            steps.push(self.commands.set_link_mtu(child, mtu));
        }
        steps.push(self.commands.set_link_up(child));

        for step in steps {
            step.run_checked(self.host, ctx).await?;
        }
        Ok(())
    }

    // Runs under its own context so a cancelled pass still cleans up.
    async fn rollback(&self, child: &str, ctx: &ExecContext) {
        let mut cleanup = ExecContext::new();
        if let Some(limit) = ctx.timeout() {
            cleanup = cleanup.with_timeout(limit);
        }

        match self.commands.delete_link(child).run_checked(self.host, &cleanup).await {
            Ok(_) => warn!(child = %child, "Rolled back partially configured VLAN child"),
            Err(e) => warn!(child = %child, error = %e, "Rollback of VLAN child failed"),
        }
    }
}
