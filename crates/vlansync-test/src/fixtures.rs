//! Test fixtures for host payloads and desired-state input
//!
//! Builders produce the JSON the way `ip -d -j link show` and the metadata
//! source emit it, including fields the reconciler never reads.

/// One VLAN link as `ip -d -j link show` reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkFixture {
    /// Parent link
    pub parent: String,
    /// Child interface name
    pub child: String,
    /// `info_data.id`, inserted verbatim (number or quoted string)
    pub vlan_id: String,
    /// `mtu`, inserted verbatim
    pub mtu: String,
    /// Interface flags
    pub flags: Vec<String>,
    /// MAC address
    pub address: String,
    /// Encapsulation protocol
    pub protocol: String,
}

impl LinkFixture {
    /// VLAN link with the defaults of a freshly created child
    pub fn new(parent: &str, child: &str, vlan_id: u16) -> Self {
        Self {
            parent: parent.to_string(),
            child: child.to_string(),
            vlan_id: vlan_id.to_string(),
            mtu: "1460".to_string(),
            flags: vec!["BROADCAST".to_string(), "MULTICAST".to_string()],
            address: "42:01:0a:00:04:02".to_string(),
            protocol: "802.1Q".to_string(),
        }
    }

    /// Set the raw `mtu` token
    pub fn mtu(mut self, mtu: &str) -> Self {
        self.mtu = mtu.to_string();
        self
    }

    /// Set the raw `id` token
    pub fn raw_id(mut self, id: &str) -> Self {
        self.vlan_id = id.to_string();
        self
    }

    /// Replace the flags
    pub fn flags(mut self, flags: &[&str]) -> Self {
        self.flags = flags.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Set the MAC address
    pub fn address(mut self, address: &str) -> Self {
        self.address = address.to_string();
        self
    }

    /// Set the encapsulation protocol
    pub fn protocol(mut self, protocol: &str) -> Self {
        self.protocol = protocol.to_string();
        self
    }

    fn to_json(&self, ifindex: usize) -> String {
        let flags = self
            .flags
            .iter()
            .map(|f| format!("\"{}\"", f))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            r#"{{
    "ifindex": {ifindex},
    "link": "{parent}",
    "ifname": "{child}",
    "flags": [{flags}],
    "mtu": {mtu},
    "qdisc": "noop",
    "operstate": "DOWN",
    "group": "default",
    "link_type": "ether",
    "address": "{address}",
    "broadcast": "ff:ff:ff:ff:ff:ff",
    "promiscuity": 0,
    "num_tx_queues": 1,
    "num_rx_queues": 1,
    "linkinfo": {{
      "info_kind": "vlan",
      "info_data": {{
        "protocol": "{protocol}",
        "id": {id},
        "flags": ["REORDER_HDR"]
      }}
    }}
  }}"#,
            ifindex = ifindex,
            parent = self.parent,
            child = self.child,
            flags = flags,
            mtu = self.mtu,
            address = self.address,
            protocol = self.protocol,
            id = self.vlan_id,
        )
    }
}

/// Renders a link-show payload for `links`.
pub fn vlan_link_json(links: &[LinkFixture]) -> String {
    let records = links
        .iter()
        .enumerate()
        .map(|(i, link)| link.to_json(i + 3))
        .collect::<Vec<_>>()
        .join(",\n  ");
    format!("[{}]", records)
}

/// Renders a desired-state JSON array of `(parent, vlan)` entries.
///
/// Each entry carries the extra metadata fields the reconciler ignores.
pub fn desired_json(entries: &[(&str, u16)]) -> String {
    let records: Vec<serde_json::Value> = entries
        .iter()
        .map(|(parent, vlan)| {
            serde_json::json!({
                "parentInterface": parent,
                "vlan": vlan,
                "mac": format!("42:01:0a:00:{:02x}:{:02x}", vlan >> 8, vlan & 0xff),
                "ipv4": [],
                "ipv6": [],
            })
        })
        .collect();
    serde_json::Value::Array(records).to_string()
}
