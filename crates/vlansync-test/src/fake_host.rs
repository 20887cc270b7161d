//! In-memory simulation of a host's link table
//!
//! [`FakeHost`] answers the `modinfo` and `ip` invocations the reconciler
//! issues and mutates its link table the way the kernel would, so passes can
//! be run end to end and re-run to check convergence.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tokio_util::sync::CancellationToken;

use vlansync_common::shell::command_line;
use vlansync_common::{ExecContext, ExecResult, HostCommand, VlanError, VlanResult};

const DEFAULT_MTU: u32 = 1500;

/// A link in the fake host's table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeLink {
    /// Parent link; `None` for physical links
    pub parent: Option<String>,
    /// VLAN tag; `None` for physical links
    pub vlan_id: Option<u16>,
    /// MTU
    pub mtu: u32,
    /// MAC address
    pub address: String,
    /// Interface flags
    pub flags: BTreeSet<String>,
}

impl FakeLink {
    fn physical(index: usize) -> Self {
        Self {
            parent: None,
            vlan_id: None,
            mtu: DEFAULT_MTU,
            address: format!("42:01:0a:00:00:{:02x}", index & 0xff),
            flags: ["BROADCAST", "MULTICAST", "UP", "LOWER_UP"]
                .iter()
                .map(|f| f.to_string())
                .collect(),
        }
    }

    fn vlan(parent: &str, vlan_id: u16, mtu: u32, address: String) -> Self {
        Self {
            parent: Some(parent.to_string()),
            vlan_id: Some(vlan_id),
            mtu,
            address,
            flags: ["BROADCAST", "MULTICAST"].iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Returns true if the link is a VLAN child
    pub fn is_vlan(&self) -> bool {
        self.vlan_id.is_some()
    }

    /// Returns true if the link is administratively up
    pub fn is_up(&self) -> bool {
        self.flags.contains("UP")
    }
}

#[derive(Debug, Default)]
struct State {
    links: BTreeMap<String, FakeLink>,
    calls: Vec<String>,
    failures: Vec<(String, ExecResult)>,
    cancel_on: Vec<(String, CancellationToken)>,
    remove_on: Vec<(String, String)>,
}

/// In-memory `ip`/`modinfo` implementation of [`HostCommand`].
#[derive(Debug)]
pub struct FakeHost {
    vlan_supported: bool,
    state: Mutex<State>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHost {
    /// Host with 802.1Q support and an empty link table
    pub fn new() -> Self {
        Self {
            vlan_supported: true,
            state: Mutex::new(State::default()),
        }
    }

    /// Host without the 802.1Q module
    pub fn unsupported() -> Self {
        Self {
            vlan_supported: false,
            ..Self::new()
        }
    }

    /// Add a physical link
    pub fn with_parent(self, name: &str) -> Self {
        {
            let mut state = self.state.lock();
            let index = state.links.len() + 2;
            state.links.insert(name.to_string(), FakeLink::physical(index));
        }
        self
    }

    /// Add a VLAN child named `<parent>.<vlan_id>`
    pub fn with_vlan(self, parent: &str, vlan_id: u16) -> Self {
        self.with_vlan_named(parent, &format!("{}.{}", parent, vlan_id), vlan_id)
    }

    /// Add a VLAN child with an explicit name
    pub fn with_vlan_named(self, parent: &str, child: &str, vlan_id: u16) -> Self {
        {
            let mut state = self.state.lock();
            let address = generated_address(vlan_id);
            state.links.insert(
                child.to_string(),
                FakeLink::vlan(parent, vlan_id, DEFAULT_MTU, address),
            );
        }
        self
    }

    /// Answer command lines starting with `pattern` with `result`, without
    /// touching the link table
    pub fn fail_on(&self, pattern: &str, result: ExecResult) {
        self.state
            .lock()
            .failures
            .push((pattern.to_string(), result));
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Cancel `token` right after a command starting with `pattern` completes
    pub fn cancel_on(&self, pattern: &str, token: CancellationToken) {
        self.state
            .lock()
            .cancel_on
            .push((pattern.to_string(), token));
    }

    /// Delete link `name` right after a command starting with `pattern`
    /// completes, as another actor on the host would
    pub fn remove_on(&self, pattern: &str, name: &str) {
        self.state
            .lock()
            .remove_on
            .push((pattern.to_string(), name.to_string()));
    }

    /// Identity keys of VLAN children, sorted
    pub fn vlan_keys(&self) -> Vec<(String, u16)> {
        let state = self.state.lock();
        let mut keys: Vec<(String, u16)> = state
            .links
            .values()
            .filter_map(|l| Some((l.parent.clone()?, l.vlan_id?)))
            .collect();
        keys.sort();
        keys
    }

    /// Snapshot of a link
    pub fn link(&self, name: &str) -> Option<FakeLink> {
        self.state.lock().links.get(name).cloned()
    }

    /// Command lines executed so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Number of executed commands starting with `pattern`
    pub fn count(&self, pattern: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(pattern))
            .count()
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    fn modinfo(&self, args: &[&str]) -> ExecResult {
        match args {
            ["8021q"] if self.vlan_supported => {
                ExecResult::ok("filename: /lib/modules/8021q.ko\nlicense: GPL")
            }
            [module] => ExecResult::failed(1, format!("modinfo: ERROR: Module {} not found.", module)),
            _ => usage(),
        }
    }

    fn ip(&self, state: &mut State, args: &[&str]) -> ExecResult {
        match args {
            ["-d", "-j", "-4" | "-6", "link", "show", "type", "vlan"] => {
                let records: Vec<Value> = state
                    .links
                    .iter()
                    .filter(|(_, l)| l.is_vlan())
                    .enumerate()
                    .map(|(i, (name, l))| render(i + 2, name, l))
                    .collect();
                ExecResult::ok(Value::Array(records).to_string())
            }
            ["-d", "-j", "link", "show", "dev", name] => match state.links.get(*name) {
                Some(l) => ExecResult::ok(Value::Array(vec![render(1, name, l)]).to_string()),
                None => not_exists(name),
            },
            ["link", "add", "link", parent, "name", child, "type", "vlan", "id", id] => {
                let Some(parent_link) = state.links.get(*parent) else {
                    return ExecResult::failed(1, format!("Cannot find device \"{}\"", parent));
                };
                let Ok(vlan_id) = id.parse::<u16>() else {
                    return ExecResult::failed(255, format!("Error: argument \"{}\" is wrong: id is invalid", id));
                };
                if state.links.contains_key(*child) {
                    return ExecResult::failed(2, "RTNETLINK answers: File exists");
                }
                let link = FakeLink::vlan(parent, vlan_id, parent_link.mtu, parent_link.address.clone());
                state.links.insert(child.to_string(), link);
                ExecResult::ok("")
            }
            ["link", "set", "dev", name, "address", mac] => {
                self.modify(state, name, |l| l.address = mac.to_string())
            }
            ["link", "set", "dev", name, "mtu", mtu] => match mtu.parse::<u32>() {
                Ok(mtu) => self.modify(state, name, |l| l.mtu = mtu),
                Err(_) => ExecResult::failed(255, format!("Error: argument \"{}\" is wrong: Invalid \"mtu\" value", mtu)),
            },
            ["link", "set", "dev", name, "up"] => self.modify(state, name, |l| {
                l.flags.insert("UP".to_string());
                l.flags.insert("LOWER_UP".to_string());
            }),
            ["link", "delete", "dev", name] => match state.links.remove(*name) {
                Some(_) => ExecResult::ok(""),
                None => ExecResult::failed(1, format!("Cannot find device \"{}\"", name)),
            },
            _ => usage(),
        }
    }

    fn modify(&self, state: &mut State, name: &str, f: impl FnOnce(&mut FakeLink)) -> ExecResult {
        match state.links.get_mut(name) {
            Some(link) => {
                f(link);
                ExecResult::ok("")
            }
            None => ExecResult::failed(1, format!("Cannot find device \"{}\"", name)),
        }
    }
}

fn generated_address(vlan_id: u16) -> String {
    format!("42:01:0a:01:{:02x}:{:02x}", vlan_id >> 8, vlan_id & 0xff)
}

fn not_exists(name: &str) -> ExecResult {
    ExecResult::failed(1, format!("Device \"{}\" does not exist.", name))
}

fn usage() -> ExecResult {
    ExecResult::failed(255, "Command line is not complete. Try option \"help\"")
}

fn render(ifindex: usize, name: &str, link: &FakeLink) -> Value {
    let operstate = if link.is_up() { "UP" } else { "DOWN" };
    let mut record = json!({
        "ifindex": ifindex,
        "ifname": name,
        "flags": link.flags,
        "mtu": link.mtu,
        "qdisc": "noqueue",
        "operstate": operstate,
        "linkmode": "DEFAULT",
        "group": "default",
        "link_type": "ether",
        "address": link.address,
        "broadcast": "ff:ff:ff:ff:ff:ff",
        "promiscuity": 0,
        "num_tx_queues": 1,
        "num_rx_queues": 1,
    });
    if let (Some(parent), Some(vlan_id)) = (&link.parent, link.vlan_id) {
        record["link"] = json!(parent);
        record["linkinfo"] = json!({
            "info_kind": "vlan",
            "info_data": {
                "protocol": "802.1Q",
                "id": vlan_id,
                "flags": ["REORDER_HDR"],
            }
        });
    }
    record
}

#[async_trait]
impl HostCommand for FakeHost {
    async fn execute(
        &self,
        name: &str,
        args: &[&str],
        ctx: &ExecContext,
    ) -> VlanResult<ExecResult> {
        let command = command_line(name, args);
        if ctx.is_cancelled() {
            return Err(VlanError::Cancelled { command });
        }

        let mut state = self.state.lock();
        state.calls.push(command.clone());

        let injected = state
            .failures
            .iter()
            .find(|(pattern, _)| command.starts_with(pattern.as_str()))
            .map(|(_, result)| result.clone());

        let result = match injected {
            Some(result) => result,
            None => match Path::new(name).file_name().and_then(|n| n.to_str()) {
                Some("modinfo") => self.modinfo(args),
                Some("ip") => self.ip(&mut state, args),
                _ => {
                    return Err(VlanError::Spawn {
                        command,
                        source: std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            "No such file or directory",
                        ),
                    })
                }
            },
        };

        let State {
            links,
            cancel_on,
            remove_on,
            ..
        } = &mut *state;
        for (pattern, name) in remove_on.iter() {
            if command.starts_with(pattern.as_str()) {
                links.remove(name);
            }
        }
        for (pattern, token) in cancel_on.iter() {
            if command.starts_with(pattern.as_str()) {
                token.cancel();
            }
        }

        Ok(result)
    }
}
