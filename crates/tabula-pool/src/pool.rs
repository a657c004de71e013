//! Connection pool implementation

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime};

use parking_lot::Mutex;
use tabula_core::{PoolSettings, Result, TabulaError};
use tabula_sqlite::SqliteHandle;

use crate::stats::PoolStats;

/// One live handle with its lifecycle bookkeeping
struct PoolEntry {
    handle: Arc<SqliteHandle>,
    opened_at: Instant,
    last_used_at: Mutex<Instant>,
    mtime_at_open: SystemTime,
}

impl PoolEntry {
    fn new(handle: Arc<SqliteHandle>, mtime: SystemTime) -> Self {
        let now = Instant::now();
        Self {
            handle,
            opened_at: now,
            last_used_at: Mutex::new(now),
            mtime_at_open: mtime,
        }
    }

    fn touch(&self) {
        *self.last_used_at.lock() = Instant::now();
    }

    fn idle_for(&self) -> std::time::Duration {
        self.last_used_at.lock().elapsed()
    }
}

/// A handle resolved from the pool.
///
/// `file_changed` is true when the acquire observed a new modification
/// time for the database file; callers use it to invalidate any cached
/// results derived from the old content.
#[derive(Debug)]
pub struct AcquiredConnection {
    pub handle: Arc<SqliteHandle>,
    pub file_changed: bool,
}

/// Connection pool keyed by database file path.
///
/// At most one live handle exists per path. Reopen decisions are made
/// with a double-checked pattern: the fast path peeks at the registry
/// under the registry lock, the slow path takes a per-path open lock
/// and re-checks before opening, so concurrent requests for one path
/// never race to open two handles.
pub struct ConnectionPool {
    settings: PoolSettings,
    entries: Mutex<HashMap<PathBuf, Arc<PoolEntry>>>,
    /// Per-path locks serializing (re)opens
    open_locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
    /// Last modification time for which a handle was successfully
    /// opened, per path. Survives entry closure, so a change is still
    /// reported when the old handle was already swept away; committed
    /// only after a successful open, so a failed reopen does not
    /// consume the change signal.
    seen_mtimes: Mutex<HashMap<PathBuf, SystemTime>>,
    opens: AtomicU64,
    stale_reopens: AtomicU64,
    idle_reopens: AtomicU64,
    sweeps: AtomicU64,
}

impl ConnectionPool {
    /// Create a pool with the given settings
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            settings,
            entries: Mutex::new(HashMap::new()),
            open_locks: Mutex::new(HashMap::new()),
            seen_mtimes: Mutex::new(HashMap::new()),
            opens: AtomicU64::new(0),
            stale_reopens: AtomicU64::new(0),
            idle_reopens: AtomicU64::new(0),
            sweeps: AtomicU64::new(0),
        }
    }

    /// Resolve a live handle for `db_path`, opening or reopening as
    /// needed.
    ///
    /// Fails with `NotFound` if the file does not exist on disk.
    #[tracing::instrument(skip(self), fields(db_path = %db_path.display()))]
    pub async fn acquire(&self, db_path: &Path) -> Result<AcquiredConnection> {
        let mtime = file_mtime(db_path)?;
        let file_changed = self.mtime_changed(db_path, mtime);

        // Fast path: a live, fresh entry.
        if let Some(entry) = self.usable_entry(db_path, mtime) {
            entry.touch();
            return Ok(AcquiredConnection {
                handle: entry.handle.clone(),
                file_changed,
            });
        }

        // Slow path: serialize the (re)open per path, then re-check.
        let open_lock = self.open_lock_for(db_path);
        let _guard = open_lock.lock().await;

        if let Some(entry) = self.usable_entry(db_path, mtime) {
            entry.touch();
            return Ok(AcquiredConnection {
                handle: entry.handle.clone(),
                file_changed,
            });
        }

        self.discard_entry(db_path, mtime);

        // The file may have vanished between the mtime check and here;
        // SqliteHandle::open maps that to NotFound and retries a
        // transient lock once.
        let handle = Arc::new(SqliteHandle::open(db_path)?);
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.commit_mtime(db_path, mtime);
        let entry = Arc::new(PoolEntry::new(handle.clone(), mtime));
        self.entries.lock().insert(db_path.to_path_buf(), entry);

        tracing::debug!("handle opened");
        Ok(AcquiredConnection {
            handle,
            file_changed,
        })
    }

    /// Whether `mtime` differs from the last one a handle was
    /// successfully opened against
    fn mtime_changed(&self, db_path: &Path, mtime: SystemTime) -> bool {
        self.seen_mtimes
            .lock()
            .get(db_path)
            .is_some_and(|previous| *previous != mtime)
    }

    fn commit_mtime(&self, db_path: &Path, mtime: SystemTime) {
        self.seen_mtimes.lock().insert(db_path.to_path_buf(), mtime);
    }

    /// A live entry that is neither stale nor idle-expired, if present
    fn usable_entry(&self, db_path: &Path, mtime: SystemTime) -> Option<Arc<PoolEntry>> {
        let entries = self.entries.lock();
        let entry = entries.get(db_path)?;
        if entry.mtime_at_open != mtime {
            return None;
        }
        if entry.idle_for() > self.settings.idle_timeout() {
            return None;
        }
        Some(entry.clone())
    }

    /// Drop a stale or idle entry, counting the reason
    fn discard_entry(&self, db_path: &Path, mtime: SystemTime) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.remove(db_path) {
            if entry.mtime_at_open != mtime {
                self.stale_reopens.fetch_add(1, Ordering::SeqCst);
                tracing::info!(db_path = %db_path.display(), "file changed on disk, reopening");
            } else {
                self.idle_reopens.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(db_path = %db_path.display(), "handle idle past lifetime, reopening");
            }
            // Dropping the entry closes the handle once the last
            // in-flight clone is released.
            drop(entry);
        }
    }

    fn open_lock_for(&self, db_path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.open_locks.lock();
        locks
            .entry(db_path.to_path_buf())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Close handles idle past their lifetime. Called periodically by
    /// the background sweep; public so tests can drive it directly.
    pub fn sweep_idle(&self) -> usize {
        let idle_timeout = self.settings.idle_timeout();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|path, entry| {
            let keep = entry.idle_for() <= idle_timeout;
            if !keep {
                tracing::debug!(db_path = %path.display(), "sweep closing idle handle");
            }
            keep
        });
        let closed = before - entries.len();
        self.sweeps.fetch_add(1, Ordering::SeqCst);
        closed
    }

    /// Spawn the periodic idle sweep on the current tokio runtime.
    ///
    /// The sweep only takes the registry lock briefly per pass; it
    /// never blocks request handling.
    pub fn spawn_idle_sweep(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let pool = Arc::clone(self);
        let period = self.settings.sweep_interval().max(std::time::Duration::from_secs(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let closed = pool.sweep_idle();
                if closed > 0 {
                    tracing::info!(closed, "idle sweep closed handles");
                }
            }
        })
    }

    /// Close the handle for one path, if live
    pub fn close(&self, db_path: &Path) {
        self.entries.lock().remove(db_path);
    }

    /// Close every live handle
    pub fn close_all(&self) {
        self.entries.lock().clear();
    }

    /// Snapshot the pool counters
    pub fn stats(&self) -> PoolStats {
        PoolStats::new(
            self.entries.lock().len(),
            self.opens.load(Ordering::SeqCst),
            self.stale_reopens.load(Ordering::SeqCst),
            self.idle_reopens.load(Ordering::SeqCst),
            self.sweeps.load(Ordering::SeqCst),
        )
    }

    /// Pool settings in effect
    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Age of the oldest live handle, if any. Exposed for diagnostics.
    pub fn oldest_handle_age(&self) -> Option<std::time::Duration> {
        self.entries
            .lock()
            .values()
            .map(|e| e.opened_at.elapsed())
            .max()
    }
}

fn file_mtime(db_path: &Path) -> Result<SystemTime> {
    let metadata = std::fs::metadata(db_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            TabulaError::NotFound(format!(
                "Database file does not exist: {}",
                db_path.display()
            ))
        } else {
            TabulaError::Io(e)
        }
    })?;
    metadata.modified().map_err(TabulaError::Io)
}
