//! Test utilities for building dataset archives in memory

use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use tar::{Builder, EntryType, Header};

/// Gzip tarball with the given `(path, content)` members.
///
/// Paths ending in `/` become directory entries.
pub fn create_test_tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut tar_builder = Builder::new(Vec::new());
    for (name, content) in files {
        let mut header = Header::new_gnu();
        header.set_path(name).unwrap();
        if name.ends_with('/') {
            header.set_entry_type(EntryType::Directory);
            header.set_mode(0o755);
        } else {
            header.set_mode(0o644);
        }
        header.set_size(content.len() as u64);
        header.set_cksum();
        tar_builder.append(&header, *content).unwrap();
    }
    let tar_bytes = tar_builder.into_inner().unwrap();

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar_bytes).unwrap();
    encoder.finish().unwrap()
}

/// JSON body of an `aggregated.json` descriptor
pub fn descriptor(asn: u32, handle: &str, ipv4: &[&str], ipv6: &[&str]) -> Vec<u8> {
    serde_json::json!({
        "asn": asn,
        "metadata": {
            "handle": handle,
            "description": format!("{handle} Org"),
            "countryCode": "US",
            "country": "United States",
        },
        "prefixes": {
            "ipv4": ipv4,
            "ipv6": ipv6,
        },
    })
    .to_string()
    .into_bytes()
}
