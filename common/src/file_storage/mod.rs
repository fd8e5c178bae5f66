use getset::{Getters, Setters};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

use crate::deposit::DepositRecord;

/// File name of the deposit cache inside the temp directory.
pub const DEPOSIT_CACHE_FILE: &str = "deposits.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize, Getters, Setters)]
#[getset(get = "pub", set = "pub")]
pub struct Config {
    /// Unencrypted validator key file the deposits are signed from.
    keys_file: Option<PathBuf>,
    /// Location of the cache, defaults to `<tmp>/deposits.json`.
    cache_file: Option<PathBuf>,
}

/// JSON snapshot of signed deposits, so keys don't have to be re-signed on every launch.
#[derive(Debug, Clone)]
pub struct DepositCache {
    path: PathBuf,
}

impl DepositCache {
    pub fn new(config: &Config) -> Self {
        let path = config
            .cache_file
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(DEPOSIT_CACHE_FILE));
        Self::with_path(path)
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Reads the cached deposits. `Ok(None)` if there is no cache yet.
    pub fn load(&self) -> Result<Option<Vec<DepositRecord>>, Error> {
        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        };
        let deposits: Vec<DepositRecord> =
            serde_json::from_reader(std::io::BufReader::new(file)).map_err(Error::Serde)?;
        info!(path = ?self.path, count = deposits.len(), "loaded deposits from cache");
        Ok(Some(deposits))
    }

    pub fn store(&self, deposits: &[DepositRecord]) -> Result<(), Error> {
        let file = std::fs::File::create(&self.path).map_err(Error::Io)?;
        serde_json::to_writer(std::io::BufWriter::new(file), deposits).map_err(Error::Serde)?;
        info!(path = ?self.path, count = deposits.len(), "persisted deposits to cache");
        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
/// Errors that can arise while using the deposit cache.
pub enum Error {
    /// Error when decoding entries from file.
    #[error("Serde Error: {0}")]
    Serde(serde_json::Error),
    /// Error when reading or writing the file.
    #[error("IO Error: {0}")]
    Io(std::io::Error),
}

impl From<Error> for crate::error::Error {
    fn from(val: Error) -> Self {
        crate::error::Error::Cache(val.to_string())
    }
}
