//! Configuration with compile-time defaults and environment overrides

use std::path::PathBuf;
use std::time::Duration;

/// Release tarball of the ipverse as-ip-blocks dataset
pub const DEFAULT_DATASET_URL: &str =
    "https://github.com/ipverse/as-ip-blocks/releases/download/latest/as-ip-blocks.tar.gz";
/// Maximum age of the cached database before it is rebuilt (24 hours)
pub const DEFAULT_STALE_SECS: u64 = 86_400;
/// Overall timeout for the dataset download (5 minutes)
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 300;
/// File name of the cached database inside the data directory
pub const CACHE_FILE_NAME: &str = "ip2as.db.gz";
/// User-Agent sent with dataset downloads
pub const USER_AGENT: &str = concat!("ip2as/", env!("CARGO_PKG_VERSION"));

/// Environment variable overriding the data directory
pub const ENV_DATA_DIR: &str = "IP2AS_DATA_DIR";
/// Environment variable overriding the dataset URL
pub const ENV_DATASET_URL: &str = "IP2AS_DATASET_URL";

/// `data/` next to the running executable, or `./data` if that cannot be
/// determined
pub fn default_data_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("data")))
        .unwrap_or_else(|| PathBuf::from("data"))
}

/// Configuration for building and resolving against the prefix database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ip2AsConfig {
    /// Directory holding the cached database (default: `data/` next to the executable)
    pub data_dir: PathBuf,
    /// Where the dataset tarball is downloaded from
    pub dataset_url: String,
    /// Maximum cache age before a rebuild (default: 24h)
    pub max_age: Duration,
    /// Timeout for the dataset download (default: 300s)
    pub fetch_timeout: Duration,
    /// Rebuild even if the cached database is fresh
    pub force_update: bool,
}

impl Default for Ip2AsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            dataset_url: DEFAULT_DATASET_URL.to_string(),
            max_age: Duration::from_secs(DEFAULT_STALE_SECS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            force_update: false,
        }
    }
}

impl Ip2AsConfig {
    /// Create a new Ip2AsConfig builder
    pub fn builder() -> Ip2AsConfigBuilder {
        Ip2AsConfigBuilder::new()
    }

    /// Defaults with `IP2AS_DATA_DIR` and `IP2AS_DATASET_URL` applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(dir) = std::env::var_os(ENV_DATA_DIR).filter(|v| !v.is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(url) = std::env::var(ENV_DATASET_URL) {
            if !url.is_empty() {
                config.dataset_url = url;
            }
        }
        config
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.data_dir.as_os_str().is_empty() {
            return Err("data_dir must not be empty".to_string());
        }
        if self.dataset_url.is_empty() {
            return Err("dataset_url must not be empty".to_string());
        }
        if self.max_age.is_zero() {
            return Err("max_age must be greater than 0".to_string());
        }
        if self.fetch_timeout.is_zero() {
            return Err("fetch_timeout must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Path of the cached database
    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join(CACHE_FILE_NAME)
    }
}

/// Builder for Ip2AsConfig
pub struct Ip2AsConfigBuilder {
    config: Ip2AsConfig,
}

impl Ip2AsConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: Ip2AsConfig::default(),
        }
    }

    /// Create a builder starting from the environment-derived configuration
    pub fn from_env() -> Self {
        Self {
            config: Ip2AsConfig::from_env(),
        }
    }

    /// Set the data directory
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    /// Set the dataset URL
    pub fn dataset_url(mut self, url: impl Into<String>) -> Self {
        self.config.dataset_url = url.into();
        self
    }

    /// Set the maximum cache age
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.config.max_age = max_age;
        self
    }

    /// Set the download timeout
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetch_timeout = timeout;
        self
    }

    /// Force a rebuild on the next database request
    pub fn force_update(mut self, force: bool) -> Self {
        self.config.force_update = force;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<Ip2AsConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for Ip2AsConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
