//! ASN (Autonomous System Number) resolution against a local prefix database

pub mod cache;
pub mod database;
pub mod dataset;
pub mod lookup;

#[cfg(test)]
pub(crate) mod test_utils;

pub use cache::{is_stale, CacheStore};
pub use database::{AddressFamily, AsnInfo, PrefixDatabase, PrefixKey};
pub use dataset::{parse, parse_archive, IngestSummary};
pub use lookup::{parse_network, resolve, resolve_network, AsnMatch};
