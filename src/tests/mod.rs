//! End-to-end tests for ip2as: archive in, persisted database, lookups out

#[cfg(test)]
mod pipeline_tests {
    use crate::asn::test_utils::{create_test_tar_gz, descriptor};
    use crate::asn::{resolve, AddressFamily, CacheStore};
    use crate::fetch::InMemoryFetcher;
    use std::time::Duration;
    use tempfile::TempDir;

    const DAY: Duration = Duration::from_secs(86_400);

    async fn build(files: &[(&str, &[u8])]) -> (TempDir, CacheStore) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = CacheStore::new(temp_dir.path(), DAY);
        let fetcher = InMemoryFetcher::new(create_test_tar_gz(files));
        store.ensure(&fetcher, false).await.unwrap();
        (temp_dir, store)
    }

    #[tokio::test]
    async fn test_single_as_match_and_miss() {
        let body = descriptor(65000, "EXAMPLE", &["203.0.113.0/24"], &[]);
        let (_dir, store) = build(&[("as/65000/aggregated.json", &body)]).await;
        let db = store.load().unwrap();

        let found = resolve(&db, "203.0.113.5").unwrap();
        assert_eq!(found.asn, 65000);
        assert_eq!(found.handle, "EXAMPLE");
        assert_eq!(found.prefix.to_string(), "203.0.113.0/24");

        assert!(resolve(&db, "198.51.100.1").is_none());
    }

    #[tokio::test]
    async fn test_identical_prefix_keeps_later_as() {
        let a = descriptor(64500, "A", &["10.0.0.0/8"], &[]);
        let b = descriptor(64501, "B", &["10.0.0.0/8"], &[]);
        let (_dir, store) = build(&[
            ("as/64500/aggregated.json", &a),
            ("as/64501/aggregated.json", &b),
        ])
        .await;
        let db = store.load().unwrap();

        assert_eq!(db.len_v4(), 1);
        assert_eq!(resolve(&db, "10.9.9.9").unwrap().asn, 64501);
    }

    #[tokio::test]
    async fn test_nested_prefixes_longest_wins() {
        let a = descriptor(64500, "A", &["10.0.0.0/8"], &["2001:db8::/32"]);
        let b = descriptor(64501, "B", &["10.1.0.0/16"], &["2001:db8:1::/48"]);
        let (_dir, store) = build(&[
            ("as/64500/aggregated.json", &a),
            ("as/64501/aggregated.json", &b),
        ])
        .await;
        let db = store.load().unwrap();

        assert_eq!(resolve(&db, "10.1.2.3").unwrap().asn, 64501);
        assert_eq!(resolve(&db, "10.2.2.3").unwrap().asn, 64500);
        assert_eq!(resolve(&db, "2001:db8:1::1").unwrap().asn, 64501);
        assert_eq!(resolve(&db, "2001:db8:2::1").unwrap().asn, 64500);
    }

    #[tokio::test]
    async fn test_narrow_cidr_query_descends() {
        let body = descriptor(64500, "A", &["192.0.2.0/24"], &[]);
        let (_dir, store) = build(&[("as/64500/aggregated.json", &body)]).await;
        let db = store.load().unwrap();

        let found = resolve(&db, "192.0.2.128/25").unwrap();
        assert_eq!(found.prefix.to_string(), "192.0.2.0/24");
    }

    #[tokio::test]
    async fn test_malformed_records_are_skipped() {
        let valid: Vec<Vec<u8>> = (0..5u32)
            .map(|i| {
                let prefix = format!("10.{i}.0.0/16");
                descriptor(64500 + i, "AS", &[prefix.as_str()], &[])
            })
            .collect();
        let mut files: Vec<(String, &[u8])> = valid
            .iter()
            .enumerate()
            .map(|(i, body)| (format!("as/{}/aggregated.json", 64500 + i), body.as_slice()))
            .collect();
        files.insert(2, ("as/1/aggregated.json".to_string(), &b"{not json"[..]));
        let members: Vec<(&str, &[u8])> = files.iter().map(|(p, b)| (p.as_str(), *b)).collect();

        let (_dir, store) = build(&members).await;
        let db = store.load().unwrap();

        assert_eq!(db.len_v4(), 5);
        for i in 0..5u32 {
            let query = format!("10.{i}.1.1");
            assert_eq!(resolve(&db, &query).unwrap().asn, 64500 + i);
        }
    }

    #[tokio::test]
    async fn test_persisted_keys_have_no_host_bits() {
        let body = descriptor(
            64500,
            "A",
            &["198.51.100.77/24", "10.255.255.255/8", "0.0.0.0/0"],
            &["2001:db8::ffff/32"],
        );
        let (_dir, store) = build(&[("as/64500/aggregated.json", &body)]).await;
        let db = store.load().unwrap();

        for family in [AddressFamily::V4, AddressFamily::V6] {
            for (key, _) in db.iter(family) {
                assert!(key.fits(family), "{key} has host bits set");
            }
        }
        assert_eq!(db.len(), 4);
    }
}
