//! Prefix database partitioned by address family
//!
//! Every announced prefix is stored under its network base address and
//! prefix length. Keys are masked on construction, so a stored address never
//! carries host bits beyond its prefix length.

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// IP address family of a prefix partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    /// IPv4, 32-bit addresses
    V4,
    /// IPv6, 128-bit addresses
    V6,
}

impl AddressFamily {
    /// Family of the given address
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }

    /// Address width in bits
    pub fn bits(self) -> u8 {
        match self {
            AddressFamily::V4 => 32,
            AddressFamily::V6 => 128,
        }
    }

    /// Partition name used in the persisted database
    pub fn key(self) -> &'static str {
        match self {
            AddressFamily::V4 => "4",
            AddressFamily::V6 => "6",
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::V4 => write!(f, "IPv4"),
            AddressFamily::V6 => write!(f, "IPv6"),
        }
    }
}

/// Mask with the top `prefix_len` bits of a `bits`-wide address set.
pub fn mask(bits: u8, prefix_len: u8) -> u128 {
    let width = if bits >= 128 {
        u128::MAX
    } else {
        (1u128 << bits) - 1
    };
    let host = width.checked_shr(u32::from(prefix_len)).unwrap_or(0);
    width & !host
}

/// Integer form of an address
pub fn addr_to_bits(addr: IpAddr) -> u128 {
    match addr {
        IpAddr::V4(v4) => u128::from(u32::from(v4)),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

/// Address with the given integer form in `family`
pub fn bits_to_addr(family: AddressFamily, value: u128) -> IpAddr {
    match family {
        // Keys are masked to 32 bits for IPv4
        AddressFamily::V4 => IpAddr::V4(Ipv4Addr::from(value as u32)),
        AddressFamily::V6 => IpAddr::V6(Ipv6Addr::from(value)),
    }
}

/// Composite key `(network_address, prefix_length)` of a partition entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PrefixKey {
    network: u128,
    prefix_len: u8,
}

impl PrefixKey {
    /// Build a key for `address/prefix_len`, clearing host bits.
    ///
    /// Prefix lengths beyond the family width are clamped to the width.
    pub fn new(family: AddressFamily, address: u128, prefix_len: u8) -> Self {
        let prefix_len = prefix_len.min(family.bits());
        Self {
            network: address & mask(family.bits(), prefix_len),
            prefix_len,
        }
    }

    /// Key and family of a parsed network
    pub fn from_net(net: &IpNet) -> (AddressFamily, Self) {
        let family = AddressFamily::of(&net.addr());
        (
            family,
            Self::new(family, addr_to_bits(net.addr()), net.prefix_len()),
        )
    }

    /// Integer network base address
    pub fn network(&self) -> u128 {
        self.network
    }

    /// Prefix length in bits
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Whether this key is a valid network base address in `family`
    pub fn fits(&self, family: AddressFamily) -> bool {
        self.prefix_len <= family.bits()
            && self.network & !mask(family.bits(), self.prefix_len) == 0
    }

    /// Canonical network for this key in `family`
    pub fn to_net(&self, family: AddressFamily) -> Option<IpNet> {
        match bits_to_addr(family, self.network) {
            IpAddr::V4(addr) => Ipv4Net::new(addr, self.prefix_len).ok().map(IpNet::V4),
            IpAddr::V6(addr) => Ipv6Net::new(addr, self.prefix_len).ok().map(IpNet::V6),
        }
    }
}

impl fmt::Display for PrefixKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.network, self.prefix_len)
    }
}

/// Error parsing a `"<address>:<length>"` key
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid prefix key: {0:?}")]
pub struct PrefixKeyError(String);

impl FromStr for PrefixKey {
    type Err = PrefixKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (network, prefix_len) = s
            .split_once(':')
            .ok_or_else(|| PrefixKeyError(s.to_string()))?;
        Ok(Self {
            network: network.parse().map_err(|_| PrefixKeyError(s.to_string()))?,
            prefix_len: prefix_len
                .parse()
                .map_err(|_| PrefixKeyError(s.to_string()))?,
        })
    }
}

impl Serialize for PrefixKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PrefixKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

/// Information about the AS announcing a prefix
///
/// Persisted as the array `[asn, handle, description, countryCode, country]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "AsnTuple")]
pub struct AsnInfo {
    /// Autonomous System Number
    pub asn: u32,
    /// Short AS name (e.g., "CLOUDFLARENET"), may be empty
    pub handle: String,
    /// Organization name, may be empty
    pub description: String,
    /// ISO country code (e.g., "US"), may be empty
    pub country_code: String,
    /// Full country name, may be empty
    pub country: String,
}

type AsnTuple = (u32, String, String, String, String);

impl From<AsnTuple> for AsnInfo {
    fn from((asn, handle, description, country_code, country): AsnTuple) -> Self {
        Self {
            asn,
            handle,
            description,
            country_code,
            country,
        }
    }
}

impl Serialize for AsnInfo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (
            self.asn,
            &self.handle,
            &self.description,
            &self.country_code,
            &self.country,
        )
            .serialize(serializer)
    }
}

type Partition = BTreeMap<PrefixKey, AsnInfo>;

/// Queryable set of prefix-to-AS associations, one partition per family
///
/// Partitions are ordered maps, so serializing the same content always
/// yields the same bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDatabase")]
pub struct PrefixDatabase {
    #[serde(rename = "4")]
    v4: Partition,
    #[serde(rename = "6")]
    v6: Partition,
}

#[derive(Deserialize)]
struct RawDatabase {
    #[serde(rename = "4")]
    v4: Partition,
    #[serde(rename = "6")]
    v6: Partition,
}

impl TryFrom<RawDatabase> for PrefixDatabase {
    type Error = String;

    fn try_from(raw: RawDatabase) -> Result<Self, Self::Error> {
        for (family, partition) in [(AddressFamily::V4, &raw.v4), (AddressFamily::V6, &raw.v6)] {
            if let Some(key) = partition.keys().find(|key| !key.fits(family)) {
                return Err(format!(
                    "prefix key {key} is not a {family} network address"
                ));
            }
        }
        Ok(Self {
            v4: raw.v4,
            v6: raw.v6,
        })
    }
}

impl PrefixDatabase {
    /// Create an empty database
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a prefix, replacing any entry with the same network and length.
    ///
    /// Host bits of `net` are cleared. Returns the replaced entry.
    pub fn insert(&mut self, net: IpNet, info: AsnInfo) -> Option<AsnInfo> {
        let (family, key) = PrefixKey::from_net(&net);
        self.partition_mut(family).insert(key, info)
    }

    /// Exact lookup of a key in one partition
    pub fn get(&self, family: AddressFamily, key: &PrefixKey) -> Option<&AsnInfo> {
        self.partition(family).get(key)
    }

    /// Entries of one partition in key order
    pub fn iter(&self, family: AddressFamily) -> impl Iterator<Item = (&PrefixKey, &AsnInfo)> {
        self.partition(family).iter()
    }

    /// Number of IPv4 prefixes
    pub fn len_v4(&self) -> usize {
        self.v4.len()
    }

    /// Number of IPv6 prefixes
    pub fn len_v6(&self) -> usize {
        self.v6.len()
    }

    /// Total number of prefixes
    pub fn len(&self) -> usize {
        self.v4.len() + self.v6.len()
    }

    /// Check if the database holds no prefixes
    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }

    fn partition(&self, family: AddressFamily) -> &Partition {
        match family {
            AddressFamily::V4 => &self.v4,
            AddressFamily::V6 => &self.v6,
        }
    }

    fn partition_mut(&mut self, family: AddressFamily) -> &mut Partition {
        match family {
            AddressFamily::V4 => &mut self.v4,
            AddressFamily::V6 => &mut self.v6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(asn: u32, handle: &str) -> AsnInfo {
        AsnInfo {
            asn,
            handle: handle.to_string(),
            description: String::new(),
            country_code: String::new(),
            country: String::new(),
        }
    }

    #[test]
    fn test_mask() {
        assert_eq!(mask(32, 0), 0);
        assert_eq!(mask(32, 8), 0xFF00_0000);
        assert_eq!(mask(32, 24), 0xFFFF_FF00);
        assert_eq!(mask(32, 32), 0xFFFF_FFFF);
        assert_eq!(mask(128, 0), 0);
        assert_eq!(mask(128, 1), 1u128 << 127);
        assert_eq!(mask(128, 128), u128::MAX);
    }

    #[test]
    fn test_prefix_key_clears_host_bits() {
        let addr = addr_to_bits("10.1.2.3".parse().unwrap());
        let key = PrefixKey::new(AddressFamily::V4, addr, 8);
        assert_eq!(key.network(), u128::from(u32::from(Ipv4Addr::new(10, 0, 0, 0))));
        assert_eq!(key.prefix_len(), 8);
        assert!(key.fits(AddressFamily::V4));

        let key = PrefixKey::new(AddressFamily::V4, addr, 40);
        assert_eq!(key.prefix_len(), 32);
    }

    #[test]
    fn test_prefix_key_text_form() {
        let net: IpNet = "203.0.113.0/24".parse().unwrap();
        let (family, key) = PrefixKey::from_net(&net);
        assert_eq!(family, AddressFamily::V4);
        assert_eq!(key.to_string(), "3405803776:24");
        assert_eq!("3405803776:24".parse::<PrefixKey>().unwrap(), key);
        assert_eq!(key.to_net(family).unwrap(), net);

        assert!("".parse::<PrefixKey>().is_err());
        assert!("3405803776".parse::<PrefixKey>().is_err());
        assert!("abc:24".parse::<PrefixKey>().is_err());
        assert!("1:300".parse::<PrefixKey>().is_err());
    }

    #[test]
    fn test_insert_normalizes_and_overwrites() {
        let mut db = PrefixDatabase::new();
        assert!(db.is_empty());

        assert!(db
            .insert("10.9.8.7/8".parse().unwrap(), info(64500, "FIRST"))
            .is_none());
        let replaced = db.insert("10.0.0.0/8".parse().unwrap(), info(64501, "SECOND"));
        assert_eq!(replaced.unwrap().asn, 64500);

        assert_eq!(db.len_v4(), 1);
        let (family, key) = PrefixKey::from_net(&"10.0.0.0/8".parse().unwrap());
        assert_eq!(db.get(family, &key).unwrap().handle, "SECOND");
    }

    #[test]
    fn test_every_key_is_a_network_address() {
        let mut db = PrefixDatabase::new();
        for cidr in ["192.0.2.77/24", "198.51.100.1/31", "2001:db8::1/32", "2001:db8:1::ff/64"] {
            db.insert(cidr.parse().unwrap(), info(64500, ""));
        }
        for family in [AddressFamily::V4, AddressFamily::V6] {
            for (key, _) in db.iter(family) {
                let host = !mask(family.bits(), key.prefix_len()) & mask(family.bits(), family.bits());
                assert_eq!(key.network() & host, 0, "{key} has host bits set");
            }
        }
        assert_eq!(db.len_v4(), 2);
        assert_eq!(db.len_v6(), 2);
        assert_eq!(db.len(), 4);
    }

    #[test]
    fn test_serialized_form() {
        let mut db = PrefixDatabase::new();
        db.insert(
            "203.0.113.0/24".parse().unwrap(),
            AsnInfo {
                asn: 65000,
                handle: "EXAMPLE".to_string(),
                description: "Example Org".to_string(),
                country_code: "US".to_string(),
                country: "United States".to_string(),
            },
        );
        let json = serde_json::to_string(&db).unwrap();
        assert_eq!(
            json,
            r#"{"4":{"3405803776:24":[65000,"EXAMPLE","Example Org","US","United States"]},"6":{}}"#
        );

        let back: PrefixDatabase = serde_json::from_str(&json).unwrap();
        assert_eq!(back, db);
    }

    #[test]
    fn test_deserialize_rejects_host_bits() {
        // 3405803777 is 203.0.113.1
        let json = r#"{"4":{"3405803777:24":[65000,"","","",""]},"6":{}}"#;
        assert!(serde_json::from_str::<PrefixDatabase>(json).is_err());

        let json = r#"{"4":{"0:33":[65000,"","","",""]},"6":{}}"#;
        assert!(serde_json::from_str::<PrefixDatabase>(json).is_err());
    }

    #[test]
    fn test_deserialize_rejects_missing_partition() {
        assert!(serde_json::from_str::<PrefixDatabase>(r#"{"4":{}}"#).is_err());
        assert!(serde_json::from_str::<PrefixDatabase>("[]").is_err());
    }
}
