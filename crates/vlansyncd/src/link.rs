//! Parsing of `ip -d -j link show` output.
//!
//! The payload is an array of link records. Only the fields needed to build
//! an [`ObservedInterface`] are declared; everything else the tool emits
//! (`ifindex`, `qdisc`, `operstate`, queue counts, ...) is ignored so that
//! newer iproute2 releases do not break collection.
//!
//! `mtu` and `linkinfo.info_data.id` are accepted either as JSON numbers or
//! as numeric strings. The tag range is only checked for `vlan` records;
//! other kinds reuse `id` for their own identifiers (a vxlan VNI, for one).

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use tracing::warn;

use vlansync_common::{VlanError, VlanId, VlanResult};

use crate::types::ObservedInterface;

/// `info_kind` value for 802.1Q/802.1ad sub-interfaces.
pub const VLAN_KIND: &str = "vlan";

/// One element of the link payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LinkRecord {
    /// Interface name
    pub ifname: String,
    /// Parent interface (absent for physical links)
    #[serde(default)]
    pub link: Option<String>,
    /// MAC address
    #[serde(default)]
    pub address: Option<String>,
    /// Interface flags
    #[serde(default)]
    pub flags: Vec<String>,
    /// MTU
    #[serde(default, deserialize_with = "de_opt_u32")]
    pub mtu: Option<u32>,
    /// Link-type descriptor (present with `-d`)
    #[serde(default)]
    pub linkinfo: Option<LinkInfo>,
}

/// Link-type descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LinkInfo {
    /// Link kind ("vlan", "bridge", ...)
    #[serde(default)]
    pub info_kind: Option<String>,
    /// Kind-specific attributes
    #[serde(default)]
    pub info_data: Option<LinkInfoData>,
}

/// Kind-specific attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LinkInfoData {
    /// Encapsulation protocol
    #[serde(default)]
    pub protocol: Option<String>,
    /// Raw kind-specific identifier; the VLAN tag for `vlan` links
    #[serde(default, deserialize_with = "de_opt_u64")]
    pub id: Option<u64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    Text(String),
}

impl NumberOrString {
    fn into_u64(self) -> Result<u64, String> {
        match self {
            NumberOrString::Number(n) => Ok(n),
            NumberOrString::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| format!("'{}' is not a number", s)),
        }
    }
}

fn de_opt_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    Option::<NumberOrString>::deserialize(deserializer)?
        .map(|raw| {
            raw.into_u64()
                .and_then(|n| u32::try_from(n).map_err(|_| format!("{} out of range", n)))
        })
        .transpose()
        .map_err(D::Error::custom)
}

fn de_opt_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    Option::<NumberOrString>::deserialize(deserializer)?
        .map(NumberOrString::into_u64)
        .transpose()
        .map_err(D::Error::custom)
}

impl LinkRecord {
    /// Returns true if the record describes a VLAN sub-interface.
    pub fn is_vlan(&self) -> bool {
        self.linkinfo
            .as_ref()
            .and_then(|info| info.info_kind.as_deref())
            == Some(VLAN_KIND)
    }

    /// Converts a VLAN record into an [`ObservedInterface`].
    ///
    /// Returns `Ok(None)` for non-VLAN records and for VLAN records without a
    /// parent link (parent in another network namespace), which cannot be
    /// keyed. A VLAN record without a tag, or with a tag outside 1..=4094,
    /// is malformed.
    pub fn into_observed(self) -> VlanResult<Option<ObservedInterface>> {
        if !self.is_vlan() {
            return Ok(None);
        }

        let Some(parent_link) = self.link else {
            warn!(child = %self.ifname, "VLAN link has no parent in this namespace, ignoring");
            return Ok(None);
        };

        let data = self.linkinfo.and_then(|info| info.info_data).unwrap_or_default();
        let raw_id = data
            .id
            .ok_or_else(|| VlanError::invalid_vlan_id(format!("<missing> on {}", self.ifname)))?;
        let vlan_id = VlanId::try_from(raw_id)?;

        Ok(Some(ObservedInterface {
            child_name: self.ifname,
            parent_link,
            hardware_address: self.address.unwrap_or_default(),
            flags: self.flags.into_iter().collect(),
            mtu: self.mtu.unwrap_or_default(),
            vlan_id,
            protocol: data.protocol.unwrap_or_default(),
        }))
    }
}

/// Parses a link payload. Blank output is an empty list.
pub fn parse_links(payload: &str) -> serde_json::Result<Vec<LinkRecord>> {
    if payload.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(payload)
}
