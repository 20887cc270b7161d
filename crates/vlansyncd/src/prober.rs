//! 802.1Q capability probe

use tracing::{debug, warn};

use vlansync_common::{ExecContext, HostCommand, VlanError, VlanResult};

use crate::commands::CommandSet;

/// Determines whether the host kernel can create VLAN sub-interfaces.
pub struct Prober<'a, H: HostCommand + ?Sized> {
    host: &'a H,
    commands: &'a CommandSet,
}

impl<'a, H: HostCommand + ?Sized> Prober<'a, H> {
    /// Create a new prober
    pub fn new(host: &'a H, commands: &'a CommandSet) -> Self {
        Self { host, commands }
    }

    /// Returns true if the 802.1Q module is available.
    ///
    /// Only the exit status is consulted. A probe binary that cannot be
    /// started counts as "unsupported"; cancellation and timeouts propagate.
    pub async fn supported(&self, ctx: &ExecContext) -> VlanResult<bool> {
        let probe = self.commands.probe_vlan_module();
        match probe.run(self.host, ctx).await {
            Ok(result) => {
                debug!(
                    command = %probe.command_line(),
                    exit_code = result.exit_code,
                    "802.1Q probe finished"
                );
                Ok(result.success())
            }
            Err(VlanError::Spawn { command, source }) => {
                warn!(command = %command, error = %source, "802.1Q probe could not run");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
