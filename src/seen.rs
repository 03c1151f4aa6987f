// src/seen.rs
//! Cross-run memory of delivered fingerprints, plus the run lock that keeps
//! load/save of that memory to one run at a time.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use sysinfo::{Pid, System};
use tracing::warn;

use crate::dedupe::SeenIds;
use crate::error::PipelineError;

/// Load-before-run / save-after-run boundary around the seen-id set.
pub trait SeenStore: Send + Sync {
    fn load(&self) -> Result<SeenIds>;
    fn save(&self, ids: &SeenIds) -> Result<()>;
}

/// JSON array of ids on disk. A missing file is an empty set.
pub struct JsonFileSeenStore {
    path: PathBuf,
}

impl JsonFileSeenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SeenStore for JsonFileSeenStore {
    fn load(&self) -> Result<SeenIds> {
        let s = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(SeenIds::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.path.display()))
            }
        };
        if s.trim().is_empty() {
            return Ok(SeenIds::new());
        }
        serde_json::from_str(&s).with_context(|| format!("parsing {}", self.path.display()))
    }

    fn save(&self, ids: &SeenIds) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(ids)?;
        let mut f = fs::File::create(&tmp)?;
        f.write_all(json.as_bytes())?;
        f.sync_all()?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

/// In-memory store for tests and dry runs.
#[derive(Default)]
pub struct MemorySeenStore {
    inner: Mutex<SeenIds>,
}

impl MemorySeenStore {
    pub fn with_ids<I: IntoIterator<Item = String>>(ids: I) -> Self {
        Self {
            inner: Mutex::new(ids.into_iter().collect()),
        }
    }

    pub fn snapshot(&self) -> SeenIds {
        self.inner.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

impl SeenStore for MemorySeenStore {
    fn load(&self) -> Result<SeenIds> {
        Ok(self.snapshot())
    }

    fn save(&self, ids: &SeenIds) -> Result<()> {
        let mut g = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("seen store mutex poisoned"))?;
        *g = ids.clone();
        Ok(())
    }
}

/// A lock older than this is taken over even if its pid is alive again.
const LOCK_MAX_AGE: Duration = Duration::from_secs(12 * 60 * 60);

/// A lock whose pid cannot be read yet may be mid-write by its owner.
const UNREADABLE_LOCK_GRACE: Duration = Duration::from_secs(60);

/// Exclusive lock file held for the duration of a run. Removed on drop.
/// A lock left behind by a process that is gone (or one past `LOCK_MAX_AGE`)
/// is treated as stale and taken over once.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            let _ = fs::create_dir_all(dir);
        }
        match Self::create(&path) {
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let Some(reason) = stale_reason(&path) else {
                    return Err(PipelineError::Lock(format!(
                        "lock file {} is held by a running process",
                        path.display()
                    )));
                };
                warn!(path = %path.display(), reason, "taking over stale run lock");
                fs::remove_file(&path)
                    .map_err(|e| PipelineError::Lock(format!("{}: {e}", path.display())))?;
                Self::create(&path).map_err(|e| {
                    PipelineError::Lock(format!("{}: {e}", path.display()))
                })
            }
            other => other.map_err(|e| PipelineError::Lock(format!("{}: {e}", path.display()))),
        }
    }

    fn create(path: &Path) -> io::Result<Self> {
        let mut f = fs::OpenOptions::new().write(true).create_new(true).open(path)?;
        writeln!(f, "{}", std::process::id())?;
        f.sync_all()?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

/// `Some(reason)` when the existing lock file no longer guards a live run.
fn stale_reason(path: &Path) -> Option<&'static str> {
    let age = fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| SystemTime::now().duration_since(t).ok())
        .unwrap_or_default();
    if age > LOCK_MAX_AGE {
        return Some("lock too old");
    }
    let pid = fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok());
    match pid {
        Some(pid) if !process_alive(pid) => Some("owner process gone"),
        Some(_) => None,
        None if age > UNREADABLE_LOCK_GRACE => Some("unreadable owner pid"),
        None => None,
    }
}

fn process_alive(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }
    let pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]));
    sys.process(pid).is_some()
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(error = %e, path = %self.path.display(), "failed to release run lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_roundtrips_and_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSeenStore::new(dir.path().join("state/seen.json"));
        assert!(store.load().unwrap().is_empty());

        let ids: SeenIds = ["x".to_string(), "y".to_string()].into_iter().collect();
        store.save(&ids).unwrap();
        assert_eq!(store.load().unwrap(), ids);
    }

    #[test]
    fn run_lock_is_exclusive_until_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("run.lock");
        let first = RunLock::acquire(&p).unwrap();
        assert!(matches!(RunLock::acquire(&p), Err(PipelineError::Lock(_))));
        drop(first);
        assert!(RunLock::acquire(&p).is_ok());
    }

    #[test]
    fn lock_left_by_dead_process_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("run.lock");
        // no process can carry this pid on any supported platform
        fs::write(&p, format!("{}\n", u32::MAX - 1)).unwrap();

        let lock = RunLock::acquire(&p).unwrap();
        let owner = fs::read_to_string(&p).unwrap();
        assert_eq!(owner.trim(), std::process::id().to_string());
        drop(lock);
        assert!(!p.exists());
    }

    #[test]
    fn lock_held_by_live_process_still_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("run.lock");
        fs::write(&p, format!("{}\n", std::process::id())).unwrap();

        assert!(matches!(RunLock::acquire(&p), Err(PipelineError::Lock(_))));
        assert!(p.exists());
    }

    #[test]
    fn fresh_lock_without_pid_is_not_stolen() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("run.lock");
        fs::write(&p, "").unwrap();
        assert!(stale_reason(&p).is_none());
    }
}
