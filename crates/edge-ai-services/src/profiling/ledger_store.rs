//! File-backed ledger with an advisory lock and atomic replacement.
//!
//! Writers hold an exclusive `flock` on `<ledger>.lock` for the whole
//! read-modify-write cycle, then replace the ledger by renaming a fully
//! written temp file over it, so readers never observe a partial document.
//! The kernel drops the lock when its holder exits, so a crashed writer
//! never leaves the ledger locked. The lock file itself is left in place.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use tracing::{debug, info};

use super::ledger::ServiceData;
use super::LedgerError;

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
    lock_timeout: Duration,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    pub fn load(&self) -> Result<ServiceData, LedgerError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(LedgerError::Missing(self.path.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&raw).map_err(|source| LedgerError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    /// Overwrite the ledger without reading it first.
    pub fn save(&self, data: &ServiceData) -> Result<(), LedgerError> {
        let _guard = self.acquire_lock()?;
        self.write_atomic(data)
    }

    /// Write `data` only if no ledger exists yet. The check runs under the
    /// lock, so concurrent callers never overwrite each other's ledger.
    pub fn create_if_missing(&self, data: &ServiceData) -> Result<bool, LedgerError> {
        let _guard = self.acquire_lock()?;
        if self.path.exists() {
            return Ok(false);
        }
        self.write_atomic(data)?;
        Ok(true)
    }

    /// Read the ledger, apply `f` and write the result back while holding
    /// the lock. Nothing is written if `f` fails.
    pub fn update<T, F>(&self, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut ServiceData) -> Result<T, LedgerError>,
    {
        let _guard = self.acquire_lock()?;
        let mut data = self.load()?;
        let result = f(&mut data)?;
        self.write_atomic(&data)?;
        debug!("Ledger {} updated ({} profiles)", self.path.display(), data.profiles.len());
        Ok(result)
    }

    fn write_atomic(&self, data: &ServiceData) -> Result<(), LedgerError> {
        let dir = self.dir();
        fs::create_dir_all(&dir)?;

        let json = serde_json::to_vec_pretty(data).map_err(LedgerError::Encode)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| LedgerError::Io(e.error))?;
        Ok(())
    }

    fn acquire_lock(&self) -> Result<LockGuard, LedgerError> {
        fs::create_dir_all(self.dir())?;
        let lock_path = self.lock_path();
        let deadline = Instant::now() + self.lock_timeout;
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        loop {
            match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
                Ok(lock) => return Ok(LockGuard { _lock: lock }),
                Err((returned, errno)) if errno == Errno::EWOULDBLOCK => {
                    if Instant::now() >= deadline {
                        return Err(LedgerError::LockTimeout(lock_path));
                    }
                    file = returned;
                    std::thread::sleep(LOCK_RETRY_INTERVAL);
                }
                Err((_, errno)) => return Err(std::io::Error::from(errno).into()),
            }
        }
    }
}

/// Held for one read-modify-write cycle; unlocks on drop.
struct LockGuard {
    _lock: Flock<File>,
}

/// Create an empty ledger at `path` unless one already exists.
pub fn ensure_ledger(path: &Path, model_name: Option<&str>) -> Result<(), LedgerError> {
    if path.exists() {
        return Ok(());
    }
    let mut data = ServiceData::default();
    if let Some(name) = model_name {
        data.extra.insert("model_name".to_string(), name.into());
    }
    if LedgerStore::new(path).create_if_missing(&data)? {
        info!("Created ledger {}", path.display());
    }
    Ok(())
}
