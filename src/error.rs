//! Error types for prefix database operations

use crate::fetch::FetchError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while building, loading or storing the prefix database
///
/// A query that does not parse or matches no prefix is not an error; the
/// resolver reports it as `None`.
#[derive(Debug, Error)]
pub enum Ip2AsError {
    /// The dataset archive could not be downloaded
    #[error("Failed to fetch dataset: {0}")]
    Fetch(#[from] FetchError),

    /// The dataset archive could not be decompressed or read
    ///
    /// Individual malformed AS descriptors never produce this error.
    #[error("Failed to read dataset archive: {0}")]
    Archive(#[source] io::Error),

    /// The cached database exists but cannot be deserialized
    #[error("Cached prefix database {} is corrupt ({source}); rerun with --force-update", .path.display())]
    CorruptCache {
        /// Location of the corrupt artifact
        path: PathBuf,
        /// Underlying decode failure
        #[source]
        source: serde_json::Error,
    },

    /// Filesystem operation on the data directory failed
    #[error("{context}: {source}")]
    Io {
        /// What was being attempted
        context: String,
        /// Underlying I/O failure
        #[source]
        source: io::Error,
    },

    /// The database could not be serialized
    #[error("Failed to serialize prefix database: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Invalid configuration provided
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Ip2AsError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
