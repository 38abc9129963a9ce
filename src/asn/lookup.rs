//! Longest-prefix-match lookup against the prefix database

use crate::asn::database::{addr_to_bits, AddressFamily, AsnInfo, PrefixDatabase, PrefixKey};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Result of a successful lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsnMatch {
    /// Autonomous System Number
    pub asn: u32,
    /// Short AS name, may be empty
    pub handle: String,
    /// Organization name, may be empty
    pub description: String,
    /// ISO country code, may be empty
    #[serde(rename = "countryCode")]
    pub country_code: String,
    /// Full country name, may be empty
    pub country: String,
    /// The stored prefix that matched the query
    pub prefix: IpNet,
}

impl AsnMatch {
    fn new(info: &AsnInfo, prefix: IpNet) -> Self {
        Self {
            asn: info.asn,
            handle: info.handle.clone(),
            description: info.description.clone(),
            country_code: info.country_code.clone(),
            country: info.country.clone(),
            prefix,
        }
    }
}

/// One-line summary, e.g. `AS13335 - CLOUDFLARENET - Cloudflare, Inc. (US)`
impl fmt::Display for AsnMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AS{}", self.asn)?;
        for part in [&self.handle, &self.description] {
            if !part.is_empty() {
                write!(f, " - {part}")?;
            }
        }
        if !self.country_code.is_empty() {
            write!(f, " ({})", self.country_code)?;
        }
        Ok(())
    }
}

/// Parse a CIDR block or a bare address.
///
/// Host bits are allowed (`10.1.2.3/8`). A bare address becomes a
/// full-length prefix (/32 or /128).
pub fn parse_network(text: &str) -> Option<IpNet> {
    if let Ok(net) = text.parse::<IpNet>() {
        return Some(net);
    }
    text.parse::<IpAddr>().ok().map(IpNet::from)
}

/// Resolve an IP address or CIDR string to the AS announcing it.
///
/// Returns `None` when the query does not parse or no stored prefix covers
/// it.
pub fn resolve(db: &PrefixDatabase, query: &str) -> Option<AsnMatch> {
    resolve_network(db, parse_network(query)?)
}

/// Resolve a parsed network to the longest stored prefix covering it.
///
/// The search starts at the query's own prefix length and walks down to /0,
/// so a stored prefix more specific than the query never matches.
pub fn resolve_network(db: &PrefixDatabase, query: IpNet) -> Option<AsnMatch> {
    let family = AddressFamily::of(&query.addr());
    let address = addr_to_bits(query.network());
    let start = query.prefix_len().min(family.bits());

    (0..=start).rev().find_map(|prefix_len| {
        let key = PrefixKey::new(family, address, prefix_len);
        let info = db.get(family, &key)?;
        Some(AsnMatch::new(info, key.to_net(family)?))
    })
}
