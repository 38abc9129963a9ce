//! ip2as - Resolve IP addresses and CIDR blocks to their announcing AS
//!
//! This library builds a longest-prefix-match database from the ipverse
//! `as-ip-blocks` dataset, caches it on disk, and answers lookups from it.

pub mod asn;
pub mod config;
pub mod error;
pub mod fetch;
pub mod service;

#[cfg(test)]
mod tests;

// Re-export core types for library users
pub use asn::{AsnInfo, AsnMatch, CacheStore, IngestSummary, PrefixDatabase};
pub use config::{Ip2AsConfig, Ip2AsConfigBuilder};
pub use error::Ip2AsError;
pub use fetch::{ArchiveFetcher, FetchError, HttpFetcher, InMemoryFetcher};
pub use service::Ip2As;
