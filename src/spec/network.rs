// ============================================================================
// File: packages/adles/src/spec/network.rs
// ----------------------------------------------------------------------------
// Network definitions and the IPv4 subnet type used for allocation.
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of network definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NetworkKind {
    /// Singleton network, created once per environment
    Unique,
    /// One concrete network per instance of the folder it is bound to
    Generic,
}

impl NetworkKind {
    /// Name of the specification section holding this kind
    pub fn section(&self) -> &'static str {
        match self {
            NetworkKind::Unique => "unique-networks",
            NetworkKind::Generic => "generic-networks",
        }
    }
}

impl fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkKind::Unique => f.write_str("unique"),
            NetworkKind::Generic => f.write_str("generic"),
        }
    }
}

/// A single network definition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct NetworkSpec {
    /// Base subnet in CIDR notation
    #[serde(default)]
    pub subnet: Option<Subnet>,

    /// Explicit VLAN tag
    #[serde(default)]
    pub vlan: Option<u16>,

    /// Advance the subnet for every concrete instance
    #[serde(default)]
    pub increment: Option<bool>,

    /// Virtual switch (or parent interface) to attach the network to
    #[serde(default)]
    pub vswitch: Option<String>,

    #[serde(default)]
    pub description: Option<String>,
}

impl NetworkSpec {
    /// Whether instances of this network receive incrementing subnets
    pub fn increments(&self) -> bool {
        self.increment.unwrap_or(false)
    }
}

/// The `networks` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Networks {
    #[serde(default)]
    pub unique_networks: BTreeMap<String, NetworkSpec>,

    #[serde(default)]
    pub generic_networks: BTreeMap<String, NetworkSpec>,
}

impl Networks {
    /// Look up a network by label in either section
    pub fn get(&self, label: &str) -> Option<(NetworkKind, &NetworkSpec)> {
        self.unique_networks
            .get(label)
            .map(|n| (NetworkKind::Unique, n))
            .or_else(|| {
                self.generic_networks
                    .get(label)
                    .map(|n| (NetworkKind::Generic, n))
            })
    }

    /// Iterate every definition, unique networks first
    pub fn iter(&self) -> impl Iterator<Item = (NetworkKind, &String, &NetworkSpec)> {
        self.unique_networks
            .iter()
            .map(|(k, v)| (NetworkKind::Unique, k, v))
            .chain(
                self.generic_networks
                    .iter()
                    .map(|(k, v)| (NetworkKind::Generic, k, v)),
            )
    }

    pub fn is_empty(&self) -> bool {
        self.unique_networks.is_empty() && self.generic_networks.is_empty()
    }

    /// Labels defined in both sections
    pub fn duplicate_labels(&self) -> Vec<&String> {
        self.unique_networks
            .keys()
            .filter(|k| self.generic_networks.contains_key(*k))
            .collect()
    }
}

/// Error produced when parsing a subnet
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubnetError {
    #[error("'{0}' is not in CIDR notation (expected a.b.c.d/len)")]
    Format(String),

    #[error("'{0}' is not a valid IPv4 address")]
    Address(String),

    #[error("prefix length {0} is out of range (0-32)")]
    PrefixLength(u8),

    #[error("{0} has host bits set")]
    HostBits(String),
}

/// An IPv4 network (address with all host bits cleared, plus prefix length)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Subnet {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl Subnet {
    /// Create a subnet, rejecting addresses with host bits set
    pub fn new(network: Ipv4Addr, prefix_len: u8) -> Result<Self, SubnetError> {
        if prefix_len > 32 {
            return Err(SubnetError::PrefixLength(prefix_len));
        }
        let subnet = Self {
            network,
            prefix_len,
        };
        if u32::from(network) & !subnet.mask() != 0 {
            return Err(SubnetError::HostBits(format!("{network}/{prefix_len}")));
        }
        Ok(subnet)
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    fn mask(&self) -> u32 {
        if self.prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(self.prefix_len))
        }
    }

    /// Number of addresses covered by the subnet
    pub fn block_size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix_len))
    }

    /// Last address of the subnet
    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) | !self.mask())
    }

    /// The subnet `blocks` positions after this one, with the same prefix length
    ///
    /// Returns `None` when the result would leave the IPv4 address space.
    pub fn advance(&self, blocks: u64) -> Option<Subnet> {
        let base = u64::from(u32::from(self.network));
        let start = blocks
            .checked_mul(self.block_size())
            .and_then(|offset| base.checked_add(offset))?;
        let end = start.checked_add(self.block_size() - 1)?;
        if end > u64::from(u32::MAX) {
            return None;
        }
        Some(Self {
            network: Ipv4Addr::from(start as u32),
            prefix_len: self.prefix_len,
        })
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & self.mask() == u32::from(self.network)
    }

    /// True when the subnets share any address
    pub fn overlaps(&self, other: &Subnet) -> bool {
        self.contains(other.network) || other.contains(self.network)
    }

    /// RFC 1918 private space
    pub fn is_private(&self) -> bool {
        self.network.is_private() && self.broadcast().is_private()
    }

    /// Address space that can never be used for a lab network
    pub fn is_unusable(&self) -> bool {
        let addr = self.network;
        addr.is_loopback()
            || addr.is_link_local()
            || addr.is_multicast()
            || addr.is_broadcast()
            || addr.octets()[0] >= 240
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

impl FromStr for Subnet {
    type Err = SubnetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, len) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| SubnetError::Format(s.to_string()))?;
        let network = addr
            .parse::<Ipv4Addr>()
            .map_err(|_| SubnetError::Address(addr.to_string()))?;
        let prefix_len = len
            .parse::<u8>()
            .map_err(|_| SubnetError::Format(s.to_string()))?;
        Subnet::new(network, prefix_len)
    }
}

impl TryFrom<String> for Subnet {
    type Error = SubnetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Subnet> for String {
    fn from(value: Subnet) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let subnet: Subnet = "10.0.0.0/24".parse().expect("valid subnet");
        assert_eq!(subnet.network(), Ipv4Addr::new(10, 0, 0, 0));
        assert_eq!(subnet.prefix_len(), 24);
        assert_eq!(subnet.to_string(), "10.0.0.0/24");
        assert_eq!(subnet.block_size(), 256);
        assert_eq!(subnet.broadcast(), Ipv4Addr::new(10, 0, 0, 255));
    }

    #[test]
    fn rejects_malformed_subnets() {
        assert!(matches!("10.0.0.0".parse::<Subnet>(), Err(SubnetError::Format(_))));
        assert!(matches!("10.0.0/24".parse::<Subnet>(), Err(SubnetError::Address(_))));
        assert!(matches!(
            "10.0.0.0/33".parse::<Subnet>(),
            Err(SubnetError::PrefixLength(33))
        ));
        assert!(matches!(
            "10.0.0.1/24".parse::<Subnet>(),
            Err(SubnetError::HostBits(_))
        ));
    }

    #[test]
    fn advance_keeps_prefix_length() {
        let base: Subnet = "10.0.0.0/24".parse().expect("valid subnet");
        let third = base.advance(2).expect("in range");
        assert_eq!(third.to_string(), "10.0.2.0/24");
        assert!(!third.overlaps(&base));

        let last: Subnet = "255.255.255.0/24".parse().expect("valid subnet");
        assert!(last.advance(1).is_none());
    }

    #[test]
    fn address_space_classification() {
        let private: Subnet = "192.168.1.0/24".parse().expect("valid subnet");
        let public: Subnet = "8.8.8.0/24".parse().expect("valid subnet");
        let loopback: Subnet = "127.0.0.0/8".parse().expect("valid subnet");
        assert!(private.is_private());
        assert!(!public.is_private());
        assert!(loopback.is_unusable());
        assert!(!private.is_unusable());
    }

    #[test]
    fn networks_lookup() {
        let yaml = r#"
unique-networks:
  DMZ:
    subnet: 172.16.0.0/24
    vlan: 100
generic-networks:
  Team-LAN:
    subnet: 10.1.0.0/24
    increment: true
"#;
        let networks: Networks = serde_yaml::from_str(yaml).expect("valid networks");
        let (kind, dmz) = networks.get("DMZ").expect("DMZ defined");
        assert_eq!(kind, NetworkKind::Unique);
        assert_eq!(dmz.vlan, Some(100));
        let (kind, lan) = networks.get("Team-LAN").expect("Team-LAN defined");
        assert_eq!(kind, NetworkKind::Generic);
        assert!(lan.increments());
        assert!(networks.get("missing").is_none());
        assert_eq!(networks.iter().count(), 2);
    }
}
