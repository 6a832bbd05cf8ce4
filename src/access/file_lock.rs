use super::gate::ProcessGate;
use super::AccessGate;
use crate::error::{Result, RlzError};
use crate::model::types::OwnerId;
use crate::storage::file::owner_dir;
use crate::storage::StoreError;

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

const LOCK_FILE_NAME: &str = "rlz.lock";
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Gate shared by every process using the same store directory.
///
/// In-process callers are serialized by an inner [`ProcessGate`]; the holder
/// then takes an advisory exclusive lock on `<root>/rlz.lock`, polling until
/// the same deadline. Write access is denied when the owner's store directory
/// is read-only.
pub struct FileLockGate {
    inner: ProcessGate,
    root: PathBuf,
    held_file: Mutex<Option<File>>,
}

impl FileLockGate {
    pub fn new(root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            inner: ProcessGate::new(timeout),
            root: root.into(),
            held_file: Mutex::new(None),
        }
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE_NAME)
    }

    /// The in-process half, exposed for permission overrides.
    pub fn process_gate(&self) -> &ProcessGate {
        &self.inner
    }

    fn open_lock_file(&self) -> std::io::Result<File> {
        fs::create_dir_all(&self.root)?;
        OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())
    }

    fn lock_file_until(&self, deadline: Instant) -> Result<File> {
        let file = self.open_lock_file().map_err(StoreError::from)?;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(file),
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        tracing::warn!("Lock file {} still held by another process", self.lock_path().display());
                        return Err(RlzError::LockTimeout(self.inner.timeout()));
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(err) => return Err(StoreError::from(err).into()),
            }
        }
    }
}

impl AccessGate for FileLockGate {
    fn acquire_exclusive(&self) -> Result<()> {
        let deadline = Instant::now() + self.inner.timeout();
        self.inner.acquire_exclusive()?;

        match self.lock_file_until(deadline) {
            Ok(file) => {
                *self.held_file.lock().unwrap_or_else(PoisonError::into_inner) = Some(file);
                Ok(())
            }
            Err(err) => {
                self.inner.release_exclusive();
                Err(err)
            }
        }
    }

    fn release_exclusive(&self) {
        let file = self
            .held_file
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(file) = file {
            if let Err(err) = FileExt::unlock(&file) {
                tracing::warn!("Failed to unlock {}: {}", self.lock_path().display(), err);
            }
        }
        self.inner.release_exclusive();
    }

    fn owner_has_access(&self, owner: &OwnerId, write: bool) -> bool {
        if !self.inner.owner_has_access(owner, write) {
            return false;
        }
        if !write {
            return true;
        }
        // A missing directory is created on first write.
        match fs::metadata(owner_dir(&self.root, owner)) {
            Ok(meta) => !meta.permissions().readonly(),
            Err(_) => true,
        }
    }

    fn ensure_broad_access(&self) -> Result<bool> {
        let machine_dir = owner_dir(&self.root, &OwnerId::machine());
        fs::create_dir_all(&machine_dir).map_err(StoreError::from)?;
        self.open_lock_file().map_err(StoreError::from)?;

        let mut changed = widen(&machine_dir, 0o777)?;
        changed |= widen(&self.lock_path(), 0o666)?;
        if changed {
            tracing::info!("Widened permissions under {}", self.root.display());
        }
        Ok(changed)
    }
}

#[cfg(unix)]
fn widen(path: &Path, mode: u32) -> Result<bool> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(path).map_err(StoreError::from)?.permissions();
    if permissions.mode() & 0o777 == mode {
        return Ok(false);
    }
    permissions.set_mode(mode);
    fs::set_permissions(path, permissions).map_err(StoreError::from)?;
    Ok(true)
}

#[cfg(not(unix))]
fn widen(path: &Path, _mode: u32) -> Result<bool> {
    let mut permissions = fs::metadata(path).map_err(StoreError::from)?.permissions();
    if !permissions.readonly() {
        return Ok(false);
    }
    permissions.set_readonly(false);
    fs::set_permissions(path, permissions).map_err(StoreError::from)?;
    Ok(true)
}
