//! Type definitions for vlansyncd

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::path::Path;

use vlansync_common::{VlanError, VlanId, VlanResult};

/// Linux IFNAMSIZ minus the trailing NUL.
pub const MAX_IFNAME_LEN: usize = 15;

/// Characters the kernel refuses in interface names.
static IFNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s/:]+$").expect("Invalid regex pattern"));

/// Validates a Linux network interface name.
pub fn validate_ifname(name: &str) -> VlanResult<()> {
    if name.is_empty() {
        return Err(VlanError::invalid_interface_name(name, "empty name"));
    }
    if name.len() > MAX_IFNAME_LEN {
        return Err(VlanError::invalid_interface_name(
            name,
            format!("longer than {} bytes", MAX_IFNAME_LEN),
        ));
    }
    if name == "." || name == ".." {
        return Err(VlanError::invalid_interface_name(name, "reserved name"));
    }
    if !IFNAME_RE.is_match(name) {
        return Err(VlanError::invalid_interface_name(
            name,
            "contains '/', ':' or whitespace",
        ));
    }
    Ok(())
}

/// Address family selector for link queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    /// IPv4 (`ip -4`)
    Inet,
    /// IPv6 (`ip -6`)
    Inet6,
}

impl AddressFamily {
    /// Both families, in query order.
    pub const ALL: [AddressFamily; 2] = [AddressFamily::Inet, AddressFamily::Inet6];

    /// Family switch for the `ip` command.
    pub fn ip_flag(&self) -> &'static str {
        match self {
            AddressFamily::Inet => "-4",
            AddressFamily::Inet6 => "-6",
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Inet => write!(f, "inet"),
            AddressFamily::Inet6 => write!(f, "inet6"),
        }
    }
}

/// Identity of a VLAN sub-interface: parent link plus 802.1Q tag.
///
/// Desired and observed interfaces are matched on this key only; the
/// kernel-side child name plays no part in matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    /// Parent interface name
    pub parent_link: String,
    /// VLAN tag
    pub vlan_id: VlanId,
}

impl IdentityKey {
    /// Create a new key
    pub fn new(parent_link: impl Into<String>, vlan_id: VlanId) -> Self {
        Self {
            parent_link: parent_link.into(),
            vlan_id,
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.parent_link, self.vlan_id)
    }
}

/// A VLAN sub-interface the operator wants to exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredInterface {
    /// Parent interface name
    #[serde(rename = "parentInterface", alias = "parentLink", alias = "parent_link")]
    pub parent_link: String,
    /// VLAN ID
    #[serde(rename = "vlan", alias = "vlanId", alias = "vlan_id")]
    pub vlan_id: VlanId,
    /// MTU; kernel default (parent MTU) when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    /// Hardware address to assign to the child
    #[serde(
        default,
        rename = "mac",
        alias = "addressHint",
        skip_serializing_if = "Option::is_none"
    )]
    pub address_hint: Option<String>,
    /// Remaining metadata fields, carried but not interpreted
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl DesiredInterface {
    /// Create a new DesiredInterface with no MTU or address
    pub fn new(parent_link: impl Into<String>, vlan_id: VlanId) -> Self {
        Self {
            parent_link: parent_link.into(),
            vlan_id,
            mtu: None,
            address_hint: None,
            extra: BTreeMap::new(),
        }
    }

    /// Set the MTU
    pub fn with_mtu(mut self, mtu: u32) -> Self {
        self.mtu = Some(mtu);
        self
    }

    /// Set the hardware address
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address_hint = Some(address.into());
        self
    }

    /// Identity key
    pub fn key(&self) -> IdentityKey {
        IdentityKey::new(self.parent_link.clone(), self.vlan_id)
    }

    /// Kernel name for the child created for this interface (`eth0.5`)
    pub fn child_name(&self) -> String {
        format!("{}.{}", self.parent_link, self.vlan_id)
    }
}

/// A VLAN sub-interface as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedInterface {
    /// Kernel interface name
    pub child_name: String,
    /// Parent interface name
    pub parent_link: String,
    /// MAC address
    pub hardware_address: String,
    /// Interface flags (UP, BROADCAST, ...)
    pub flags: BTreeSet<String>,
    /// MTU
    pub mtu: u32,
    /// VLAN ID
    pub vlan_id: VlanId,
    /// Encapsulation protocol ("802.1Q" or "802.1ad")
    pub protocol: String,
}

impl ObservedInterface {
    /// Identity key
    pub fn key(&self) -> IdentityKey {
        IdentityKey::new(self.parent_link.clone(), self.vlan_id)
    }

    /// Returns true if the interface is administratively up
    pub fn is_up(&self) -> bool {
        self.flags.contains("UP")
    }
}

/// Validated desired-state list for one pass.
///
/// Construction rejects the whole list when two entries share an identity
/// key or a parent name is not a valid interface name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesiredState {
    interfaces: Vec<DesiredInterface>,
}

impl DesiredState {
    /// Validate and wrap a desired-state list
    pub fn new(interfaces: Vec<DesiredInterface>) -> VlanResult<Self> {
        let mut seen = HashSet::new();
        for iface in &interfaces {
            validate_ifname(&iface.parent_link).map_err(|e| {
                VlanError::invalid_desired(format!("entry {}: {}", iface.key(), e))
            })?;
            if !seen.insert(iface.key()) {
                return Err(VlanError::invalid_desired(format!(
                    "duplicate entry for {}",
                    iface.key()
                )));
            }
        }
        Ok(Self { interfaces })
    }

    /// Parse and validate a JSON array of desired interfaces
    pub fn from_json(data: &[u8]) -> VlanResult<Self> {
        let interfaces: Vec<DesiredInterface> = serde_json::from_slice(data)
            .map_err(|e| VlanError::invalid_desired(format!("malformed JSON: {}", e)))?;
        Self::new(interfaces)
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> VlanResult<Self> {
        let data = std::fs::read(path.as_ref())?;
        Self::from_json(&data)
    }

    /// Interfaces in caller order
    pub fn interfaces(&self) -> &[DesiredInterface] {
        &self.interfaces
    }

    /// Number of desired interfaces
    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    /// Returns true if no interfaces are desired
    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vlan(id: u16) -> VlanId {
        VlanId::new(id).unwrap()
    }

    #[test]
    fn test_validate_ifname() {
        assert!(validate_ifname("eth0").is_ok());
        assert!(validate_ifname("ens4.4094").is_ok());
        assert!(validate_ifname("a23456789012345").is_ok());

        assert!(validate_ifname("").is_err());
        assert!(validate_ifname("a234567890123456").is_err());
        assert!(validate_ifname("eth0/1").is_err());
        assert!(validate_ifname("eth0:1").is_err());
        assert!(validate_ifname("eth 0").is_err());
        assert!(validate_ifname("..").is_err());
    }

    #[test]
    fn test_address_family() {
        assert_eq!(AddressFamily::Inet.ip_flag(), "-4");
        assert_eq!(AddressFamily::Inet6.ip_flag(), "-6");
        assert_eq!(AddressFamily::Inet6.to_string(), "inet6");
    }

    #[test]
    fn test_identity_key_ordering() {
        let a = IdentityKey::new("eth0", vlan(9));
        let b = IdentityKey::new("eth0", vlan(10));
        let c = IdentityKey::new("eth1", vlan(1));
        assert!(a < b);
        assert!(b < c);
        assert_eq!(a.to_string(), "eth0/9");
    }

    #[test]
    fn test_desired_interface_child_name() {
        let iface = DesiredInterface::new("ens4", vlan(5)).with_mtu(1460);
        assert_eq!(iface.child_name(), "ens4.5");
        assert_eq!(iface.key(), IdentityKey::new("ens4", vlan(5)));
        assert_eq!(iface.mtu, Some(1460));
    }

    #[test]
    fn test_desired_interface_metadata_json() {
        let json = r#"{
            "parentInterface": "eth0",
            "vlan": 5,
            "mtu": 1460,
            "mac": "42:01:0a:00:04:02",
            "ipv4": ["10.0.5.2"],
            "ipv6": []
        }"#;
        let iface: DesiredInterface = serde_json::from_str(json).unwrap();
        assert_eq!(iface.parent_link, "eth0");
        assert_eq!(iface.vlan_id, vlan(5));
        assert_eq!(iface.mtu, Some(1460));
        assert_eq!(iface.address_hint.as_deref(), Some("42:01:0a:00:04:02"));
        assert!(iface.extra.contains_key("ipv4"));
        assert!(iface.extra.contains_key("ipv6"));
    }

    #[test]
    fn test_desired_interface_aliases() {
        let json = r#"{"parentLink": "eth1", "vlanId": 7}"#;
        let iface: DesiredInterface = serde_json::from_str(json).unwrap();
        assert_eq!(iface.key(), IdentityKey::new("eth1", vlan(7)));
        assert_eq!(iface.mtu, None);
    }

    #[test]
    fn test_desired_interface_rejects_bad_vlan() {
        let json = r#"{"parentInterface": "eth0", "vlan": 4095}"#;
        assert!(serde_json::from_str::<DesiredInterface>(json).is_err());
    }

    #[test]
    fn test_desired_state_rejects_duplicates() {
        let list = vec![
            DesiredInterface::new("eth0", vlan(5)),
            DesiredInterface::new("eth0", vlan(5)).with_mtu(1500),
        ];
        let err = DesiredState::new(list).unwrap_err();
        assert!(matches!(err, VlanError::InvalidDesiredState { .. }));
        assert!(err.to_string().contains("eth0/5"));
    }

    #[test]
    fn test_desired_state_rejects_bad_parent() {
        let list = vec![DesiredInterface::new("eth0/bad", vlan(5))];
        assert!(DesiredState::new(list).is_err());
    }

    #[test]
    fn test_desired_state_same_vlan_different_parents() {
        let list = vec![
            DesiredInterface::new("eth0", vlan(5)),
            DesiredInterface::new("eth1", vlan(5)),
        ];
        let state = DesiredState::new(list).unwrap();
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn test_desired_state_from_json() {
        let state = DesiredState::from_json(
            br#"[{"parentInterface": "eth0", "vlan": 5}, {"parentInterface": "eth0", "vlan": 9}]"#,
        )
        .unwrap();
        assert_eq!(state.len(), 2);

        assert!(DesiredState::from_json(b"not json").is_err());
        assert!(DesiredState::from_json(b"[]").unwrap().is_empty());
    }

    #[test]
    fn test_observed_interface_is_up() {
        let observed = ObservedInterface {
            child_name: "eth0.5".to_string(),
            parent_link: "eth0".to_string(),
            hardware_address: "42:01:0a:00:04:02".to_string(),
            flags: ["BROADCAST", "MULTICAST", "UP"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            mtu: 1460,
            vlan_id: vlan(5),
            protocol: "802.1Q".to_string(),
        };
        assert!(observed.is_up());
        assert_eq!(observed.key(), IdentityKey::new("eth0", vlan(5)));
    }
}
