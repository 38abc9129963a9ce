//! Ingestion of the ipverse `as-ip-blocks` archive
//!
//! The archive is a gzip tarball holding one directory per AS, each with an
//! `aggregated.json` descriptor listing the AS metadata and its announced
//! IPv4 and IPv6 prefixes. Malformed descriptors and prefixes are skipped;
//! only a broken archive stream fails the ingestion.

use crate::asn::database::{AsnInfo, PrefixDatabase};
use crate::asn::lookup::parse_network;
use crate::error::Ip2AsError;
use flate2::read::GzDecoder;
use log::debug;
use serde::Deserialize;
use std::io::Read;
use tar::Archive;

/// Path suffix identifying a per-AS descriptor member
pub const DESCRIPTOR_SUFFIX: &str = "/aggregated.json";

#[derive(Debug, Deserialize)]
struct Descriptor {
    asn: u32,
    #[serde(default)]
    metadata: Option<Metadata>,
    #[serde(default)]
    prefixes: Option<Prefixes>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Metadata {
    handle: Option<String>,
    description: Option<String>,
    country_code: Option<String>,
    country: Option<String>,
}

/// Entries are kept as raw JSON so one bad element does not reject the list
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Prefixes {
    ipv4: Option<Vec<serde_json::Value>>,
    ipv6: Option<Vec<serde_json::Value>>,
}

impl Descriptor {
    fn info(&self) -> AsnInfo {
        let meta = self.metadata.as_ref();
        let text = |value: Option<&String>| value.cloned().unwrap_or_default();
        AsnInfo {
            asn: self.asn,
            handle: text(meta.and_then(|m| m.handle.as_ref())),
            description: text(meta.and_then(|m| m.description.as_ref())),
            country_code: text(meta.and_then(|m| m.country_code.as_ref())),
            country: text(meta.and_then(|m| m.country.as_ref())),
        }
    }

    fn prefixes(&self) -> impl Iterator<Item = &serde_json::Value> {
        self.prefixes
            .iter()
            .flat_map(|p| p.ipv4.iter().flatten().chain(p.ipv6.iter().flatten()))
    }
}

/// Counts gathered while ingesting an archive, for informational logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Descriptors parsed successfully
    pub autonomous_systems: usize,
    /// IPv4 entries in the resulting database
    pub ipv4_prefixes: usize,
    /// IPv6 entries in the resulting database
    pub ipv6_prefixes: usize,
    /// Descriptors skipped because they could not be decoded
    pub skipped_descriptors: usize,
    /// Prefix strings skipped because they are not valid CIDR notation
    pub skipped_prefixes: usize,
}

/// Whether an archive member path names a per-AS descriptor
pub fn is_descriptor_path(path: &[u8]) -> bool {
    path.ends_with(DESCRIPTOR_SUFFIX.as_bytes())
}

/// Build a prefix database from in-memory archive bytes.
pub fn parse(archive_bytes: &[u8]) -> Result<(PrefixDatabase, IngestSummary), Ip2AsError> {
    parse_archive(archive_bytes)
}

/// Build a prefix database from a gzip tar stream.
///
/// Prefixes are inserted in archive order, so when two descriptors declare
/// the identical network the later one wins.
pub fn parse_archive<R: Read>(reader: R) -> Result<(PrefixDatabase, IngestSummary), Ip2AsError> {
    let mut archive = Archive::new(GzDecoder::new(reader));
    let mut db = PrefixDatabase::new();
    let mut summary = IngestSummary::default();

    let entries = archive.entries().map_err(Ip2AsError::Archive)?;
    for entry in entries {
        let mut entry = entry.map_err(Ip2AsError::Archive)?;
        if !entry.header().entry_type().is_file() || !is_descriptor_path(&entry.path_bytes()) {
            continue;
        }
        let path = String::from_utf8_lossy(&entry.path_bytes()).into_owned();

        let mut body = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
        entry
            .read_to_end(&mut body)
            .map_err(Ip2AsError::Archive)?;

        let descriptor: Descriptor = match serde_json::from_slice(&body) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                debug!("Skipping malformed descriptor {path}: {e}");
                summary.skipped_descriptors += 1;
                continue;
            }
        };

        let info = descriptor.info();
        for entry in descriptor.prefixes() {
            match entry.as_str().and_then(parse_network) {
                Some(net) => {
                    db.insert(net, info.clone());
                }
                None => {
                    debug!("Skipping invalid prefix {entry} of AS{}", info.asn);
                    summary.skipped_prefixes += 1;
                }
            }
        }
        summary.autonomous_systems += 1;
    }

    summary.ipv4_prefixes = db.len_v4();
    summary.ipv6_prefixes = db.len_v6();
    Ok((db, summary))
}
