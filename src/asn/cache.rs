//! On-disk persistence of the prefix database
//!
//! The database lives in `<data_dir>/ip2as.db.gz` as gzip-compressed JSON.
//! Its modification time decides freshness. Rebuilds write a temporary file
//! in the same directory and rename it over the artifact, so readers only
//! ever see a complete file.

use crate::asn::database::PrefixDatabase;
use crate::asn::dataset::{parse_archive, IngestSummary};
use crate::config::CACHE_FILE_NAME;
use crate::error::Ip2AsError;
use crate::fetch::ArchiveFetcher;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, info};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;

/// Whether an artifact last modified at `modified` must be rebuilt at `now`.
///
/// A missing artifact (`None`) is always stale. An age exactly equal to
/// `max_age` is still fresh. A modification time in the future counts as
/// fresh.
pub fn is_stale(
    modified: Option<SystemTime>,
    now: SystemTime,
    max_age: Duration,
    force: bool,
) -> bool {
    if force {
        return true;
    }
    let Some(modified) = modified else {
        return true;
    };
    match now.duration_since(modified) {
        Ok(age) => age > max_age,
        Err(_) => false,
    }
}

/// Mode of the persisted artifact on unix
#[cfg(unix)]
const ARTIFACT_MODE: u32 = 0o644;

/// Make the artifact readable by every user of a shared data directory.
///
/// Temp files start out owner-only, and the rename keeps their mode.
#[cfg(unix)]
fn set_artifact_permissions(file: &File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(ARTIFACT_MODE))
}

#[cfg(not(unix))]
fn set_artifact_permissions(_file: &File) -> io::Result<()> {
    Ok(())
}

/// Downloaded archive that only lives for one rebuild
///
/// Backed by a uniquely named file in the data directory that is removed
/// when the guard is dropped, whether the rebuild succeeded or not.
struct TransientArchive {
    file: NamedTempFile,
}

impl TransientArchive {
    fn create_in(dir: &Path) -> Result<Self, Ip2AsError> {
        let file = tempfile::Builder::new()
            .prefix("as-ip-blocks")
            .suffix(".tar.gz")
            .tempfile_in(dir)
            .map_err(|e| {
                Ip2AsError::io(
                    format!("failed to create download file in {}", dir.display()),
                    e,
                )
            })?;
        Ok(Self { file })
    }

    fn path(&self) -> &Path {
        self.file.path()
    }

    fn writer(&mut self) -> &mut File {
        self.file.as_file_mut()
    }

    fn reader(&self) -> io::Result<BufReader<&File>> {
        let mut file = self.file.as_file();
        file.seek(SeekFrom::Start(0))?;
        Ok(BufReader::new(file))
    }
}

/// Persists and reloads the prefix database under a data directory
#[derive(Debug, Clone)]
pub struct CacheStore {
    data_dir: PathBuf,
    path: PathBuf,
    max_age: Duration,
}

impl CacheStore {
    /// Create a store for `<data_dir>/ip2as.db.gz` with the given staleness threshold
    pub fn new(data_dir: impl Into<PathBuf>, max_age: Duration) -> Self {
        let data_dir = data_dir.into();
        let path = data_dir.join(CACHE_FILE_NAME);
        Self {
            data_dir,
            path,
            max_age,
        }
    }

    /// Directory holding the artifact and transient downloads
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Location of the persisted database
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Staleness threshold
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Modification time of the artifact, if it exists
    pub fn modified(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }

    /// Return the database, rebuilding it first if it is stale or `force` is set.
    pub async fn ensure<F>(&self, fetcher: &F, force: bool) -> Result<PrefixDatabase, Ip2AsError>
    where
        F: ArchiveFetcher + ?Sized,
    {
        self.ensure_at(fetcher, force, SystemTime::now()).await
    }

    /// Like [`ensure`](Self::ensure), judging freshness against `now`.
    pub async fn ensure_at<F>(
        &self,
        fetcher: &F,
        force: bool,
        now: SystemTime,
    ) -> Result<PrefixDatabase, Ip2AsError>
    where
        F: ArchiveFetcher + ?Sized,
    {
        if is_stale(self.modified(), now, self.max_age, force) {
            let (db, _) = self.rebuild(fetcher).await?;
            return Ok(db);
        }
        debug!("Using cached prefix database {}", self.path.display());
        self.load()
    }

    /// Fetch the archive, parse it and atomically replace the artifact.
    ///
    /// Parsing and writing run on tokio's blocking pool. On any failure the
    /// previous artifact is left untouched. The downloaded archive is removed
    /// on every path.
    pub async fn rebuild<F>(&self, fetcher: &F) -> Result<(PrefixDatabase, IngestSummary), Ip2AsError>
    where
        F: ArchiveFetcher + ?Sized,
    {
        self.create_data_dir()?;
        let mut archive = TransientArchive::create_in(&self.data_dir)?;
        let bytes = fetcher.fetch(archive.writer()).await?;
        debug!("Fetched {bytes} bytes into {}", archive.path().display());

        let store = self.clone();
        tokio::task::spawn_blocking(move || store.build_from(&archive))
            .await
            .map_err(|e| Ip2AsError::io("prefix database build task failed", io::Error::other(e)))?
    }

    fn build_from(
        &self,
        archive: &TransientArchive,
    ) -> Result<(PrefixDatabase, IngestSummary), Ip2AsError> {
        info!("Building prefix database ...");
        let reader = archive.reader().map_err(Ip2AsError::Archive)?;
        let (db, summary) = parse_archive(reader)?;
        info!(
            "  {} autonomous systems, {} IPv4 + {} IPv6 prefixes",
            summary.autonomous_systems, summary.ipv4_prefixes, summary.ipv6_prefixes
        );
        if summary.skipped_descriptors > 0 || summary.skipped_prefixes > 0 {
            debug!(
                "Skipped {} malformed descriptors and {} invalid prefixes",
                summary.skipped_descriptors, summary.skipped_prefixes
            );
        }

        self.store(&db)?;
        Ok((db, summary))
    }

    /// Deserialize the artifact.
    pub fn load(&self) -> Result<PrefixDatabase, Ip2AsError> {
        let file = File::open(&self.path).map_err(|e| {
            Ip2AsError::io(format!("failed to open {}", self.path.display()), e)
        })?;
        let reader = BufReader::new(GzDecoder::new(BufReader::new(file)));
        serde_json::from_reader(reader).map_err(|source| Ip2AsError::CorruptCache {
            path: self.path.clone(),
            source,
        })
    }

    /// Serialize `db` and atomically replace the artifact with it.
    pub fn store(&self, db: &PrefixDatabase) -> Result<(), Ip2AsError> {
        self.create_data_dir()?;
        let write_error = |e: io::Error| Ip2AsError::io(format!("failed to write {}", self.path.display()), e);

        let tmp = NamedTempFile::new_in(&self.data_dir).map_err(write_error)?;
        let mut encoder = GzEncoder::new(BufWriter::new(tmp), Compression::default());
        serde_json::to_writer(&mut encoder, db)?;
        let tmp = encoder
            .finish()
            .map_err(write_error)?
            .into_inner()
            .map_err(|e| write_error(e.into_error()))?;
        set_artifact_permissions(tmp.as_file()).map_err(write_error)?;
        tmp.as_file().sync_all().map_err(write_error)?;

        let size = tmp.as_file().metadata().map(|m| m.len()).unwrap_or(0);
        tmp.persist(&self.path).map_err(|e| write_error(e.error))?;
        info!(
            "  Saved {} ({:.1} MB)",
            self.path.display(),
            size as f64 / 1e6
        );
        Ok(())
    }

    fn create_data_dir(&self) -> Result<(), Ip2AsError> {
        fs::create_dir_all(&self.data_dir).map_err(|e| {
            Ip2AsError::io(
                format!("failed to create data directory {}", self.data_dir.display()),
                e,
            )
        })
    }
}
