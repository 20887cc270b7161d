//! Host command builders for VLAN operations

use vlansync_common::shell::{self, IP_CMD, MODINFO_CMD};
use vlansync_common::{ExecContext, ExecResult, HostCommand, VlanId, VlanResult};

use crate::types::AddressFamily;

/// Kernel module providing 802.1Q VLAN support
pub const VLAN_MODULE: &str = "8021q";

/// A fully built host command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program path
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
}

impl Invocation {
    fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Arguments as string slices
    pub fn arg_refs(&self) -> Vec<&str> {
        self.args.iter().map(String::as_str).collect()
    }

    /// Printable command line
    pub fn command_line(&self) -> String {
        shell::command_line(&self.program, &self.arg_refs())
    }

    /// Run and return the raw result
    pub async fn run<H: HostCommand + ?Sized>(
        &self,
        host: &H,
        ctx: &ExecContext,
    ) -> VlanResult<ExecResult> {
        host.execute(&self.program, &self.arg_refs(), ctx).await
    }

    /// Run and fail on non-zero exit, returning stdout
    pub async fn run_checked<H: HostCommand + ?Sized>(
        &self,
        host: &H,
        ctx: &ExecContext,
    ) -> VlanResult<String> {
        shell::exec_or_fail(host, &self.program, &self.arg_refs(), ctx).await
    }
}

/// Builds the host commands the reconciler issues.
///
/// Program paths are configurable so that distributions with `ip` outside
/// `/sbin` work without a wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSet {
    ip: String,
    modinfo: String,
}

impl Default for CommandSet {
    fn default() -> Self {
        Self::new(IP_CMD, MODINFO_CMD)
    }
}

impl CommandSet {
    /// Create with explicit program paths
    pub fn new(ip: impl Into<String>, modinfo: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            modinfo: modinfo.into(),
        }
    }

    /// `modinfo 8021q`
    pub fn probe_vlan_module(&self) -> Invocation {
        Invocation::new(&self.modinfo, [VLAN_MODULE])
    }

    /// `ip -d -j -<family> link show type vlan`
    pub fn show_vlan_links(&self, family: AddressFamily) -> Invocation {
        Invocation::new(
            &self.ip,
            ["-d", "-j", family.ip_flag(), "link", "show", "type", "vlan"],
        )
    }

    /// `ip -d -j link show dev <name>`
    pub fn show_link(&self, name: &str) -> Invocation {
        Invocation::new(&self.ip, ["-d", "-j", "link", "show", "dev", name])
    }

    /// `ip link add link <parent> name <child> type vlan id <id>`
    pub fn add_vlan_link(&self, parent: &str, child: &str, vlan_id: VlanId) -> Invocation {
        let id = vlan_id.to_string();
        Invocation::new(
            &self.ip,
            [
                "link", "add", "link", parent, "name", child, "type", "vlan", "id", id.as_str(),
            ],
        )
    }

    /// `ip link set dev <name> address <mac>`
    pub fn set_link_address(&self, name: &str, mac: &str) -> Invocation {
        Invocation::new(&self.ip, ["link", "set", "dev", name, "address", mac])
    }

    /// `ip link set dev <name> mtu <mtu>`
    pub fn set_link_mtu(&self, name: &str, mtu: u32) -> Invocation {
        let mtu = mtu.to_string();
        Invocation::new(&self.ip, ["link", "set", "dev", name, "mtu", mtu.as_str()])
    }

    /// `ip link set dev <name> up`
    pub fn set_link_up(&self, name: &str) -> Invocation {
        Invocation::new(&self.ip, ["link", "set", "dev", name, "up"])
    }

    /// `ip link delete dev <name>`
    pub fn delete_link(&self, name: &str) -> Invocation {
        Invocation::new(&self.ip, ["link", "delete", "dev", name])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vlan(id: u16) -> VlanId {
        VlanId::new(id).unwrap()
    }

    #[test]
    fn test_probe_vlan_module() {
        let cmd = CommandSet::default().probe_vlan_module();
        assert_eq!(cmd.command_line(), "/sbin/modinfo 8021q");
    }

    #[test]
    fn test_show_vlan_links() {
        let cmds = CommandSet::default();
        assert_eq!(
            cmds.show_vlan_links(AddressFamily::Inet6).command_line(),
            "/sbin/ip -d -j -6 link show type vlan"
        );
        assert_eq!(
            cmds.show_vlan_links(AddressFamily::Inet).command_line(),
            "/sbin/ip -d -j -4 link show type vlan"
        );
    }

    #[test]
    fn test_add_vlan_link() {
        let cmd = CommandSet::default().add_vlan_link("eth0", "eth0.100", vlan(100));
        assert_eq!(
            cmd.command_line(),
            "/sbin/ip link add link eth0 name eth0.100 type vlan id 100"
        );
    }

    #[test]
    fn test_set_link_commands() {
        let cmds = CommandSet::default();
        assert_eq!(
            cmds.set_link_mtu("eth0.5", 1460).command_line(),
            "/sbin/ip link set dev eth0.5 mtu 1460"
        );
        assert_eq!(
            cmds.set_link_address("eth0.5", "42:01:0a:00:04:02").command_line(),
            "/sbin/ip link set dev eth0.5 address 42:01:0a:00:04:02"
        );
        assert_eq!(
            cmds.set_link_up("eth0.5").command_line(),
            "/sbin/ip link set dev eth0.5 up"
        );
    }

    #[test]
    fn test_delete_link() {
        let cmd = CommandSet::default().delete_link("eth0.5");
        assert_eq!(cmd.command_line(), "/sbin/ip link delete dev eth0.5");
    }

    #[test]
    fn test_custom_paths() {
        let cmds = CommandSet::new("/usr/bin/ip", "/usr/sbin/modinfo");
        assert_eq!(cmds.probe_vlan_module().program, "/usr/sbin/modinfo");
        assert_eq!(cmds.show_link("eth0").program, "/usr/bin/ip");
    }

    #[test]
    fn test_args_are_not_shell_interpreted() {
        // Names are passed as single argv entries, never through a shell
        let cmd = CommandSet::default().show_link("eth0; rm -rf /");
        assert_eq!(cmd.args.last().map(String::as_str), Some("eth0; rm -rf /"));
    }
}
