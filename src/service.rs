//! IP-to-AS service
//!
//! Ties together configuration, the dataset fetcher and the on-disk cache so
//! callers can resolve a query with a single call.

use crate::asn::cache::CacheStore;
use crate::asn::database::PrefixDatabase;
use crate::asn::lookup::{resolve, AsnMatch};
use crate::config::Ip2AsConfig;
use crate::error::Ip2AsError;
use crate::fetch::{ArchiveFetcher, HttpFetcher};

/// IP-to-AS resolver backed by a cached prefix database
///
/// # Examples
///
/// ```no_run
/// use ip2as::{Ip2As, Ip2AsConfig};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let service = Ip2As::new(Ip2AsConfig::from_env())?;
///
///     if let Some(found) = service.lookup("1.1.1.1").await? {
///         println!("{found}");
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Ip2As<F: ArchiveFetcher = HttpFetcher> {
    config: Ip2AsConfig,
    cache: CacheStore,
    fetcher: F,
}

impl Ip2As<HttpFetcher> {
    /// Create a service that downloads the dataset from `config.dataset_url`
    pub fn new(config: Ip2AsConfig) -> Result<Self, Ip2AsError> {
        let fetcher = HttpFetcher::from_config(&config);
        Self::with_fetcher(config, fetcher)
    }
}

impl<F: ArchiveFetcher> Ip2As<F> {
    /// Create a service with a custom archive source
    pub fn with_fetcher(config: Ip2AsConfig, fetcher: F) -> Result<Self, Ip2AsError> {
        config.validate().map_err(Ip2AsError::Config)?;
        let cache = CacheStore::new(config.data_dir.clone(), config.max_age);
        Ok(Self {
            config,
            cache,
            fetcher,
        })
    }

    /// Configuration in use
    pub fn config(&self) -> &Ip2AsConfig {
        &self.config
    }

    /// On-disk store backing this service
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Return the prefix database, rebuilding it if stale or forced.
    pub async fn database(&self) -> Result<PrefixDatabase, Ip2AsError> {
        self.cache
            .ensure(&self.fetcher, self.config.force_update)
            .await
    }

    /// Resolve `query` (an IP address or CIDR block) to its announcing AS.
    ///
    /// Returns `Ok(None)` when the query does not parse or no prefix covers it.
    pub async fn lookup(&self, query: &str) -> Result<Option<AsnMatch>, Ip2AsError> {
        let db = self.database().await?;
        Ok(resolve(&db, query))
    }
}
