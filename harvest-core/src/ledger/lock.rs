use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::LockSettings;
use crate::error::InvoiceError;

/// Mutual exclusion for ledger mutation.
///
/// Two layers: an in-process async mutex, so concurrent requests in this
/// server queue without polling, and a sentinel file created with
/// exclusive-create semantics, so other processes sharing the ledger
/// directory are kept out too. The sentinel records its owner and creation
/// time; one older than the lease is treated as left behind by a crashed
/// holder and reclaimed.
#[derive(Debug, Clone)]
pub struct LedgerLock {
    inner: Arc<LockInner>,
}

#[derive(Debug)]
struct LockInner {
    path: PathBuf,
    settings: LockSettings,
    local: Arc<Mutex<()>>,
}

/// Held while the ledger may be read-for-write and rewritten.
///
/// Dropping the guard releases the lock, so every exit path of a locked
/// section (including `?` and panics) gives it back.
#[derive(Debug)]
pub struct LedgerGuard {
    sentinel: Option<Sentinel>,
    _local: OwnedMutexGuard<()>,
}

#[derive(Debug)]
struct Sentinel {
    path: PathBuf,
    token: String,
}

impl LedgerLock {
    pub fn new(path: impl AsRef<Path>, settings: LockSettings) -> Self {
        Self {
            inner: Arc::new(LockInner {
                path: path.as_ref().to_path_buf(),
                settings,
                local: Arc::new(Mutex::new(())),
            }),
        }
    }

    /// Sentinel file location.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Acquires the lock with the configured retry budget.
    pub async fn acquire(&self) -> Result<LedgerGuard, InvoiceError> {
        let settings = &self.inner.settings;
        self.acquire_with(settings.max_retries, settings.base_delay)
            .await
    }

    /// Acquires the lock, retrying with exponential backoff.
    ///
    /// The delay starts at `base_delay`, doubles after each failed attempt
    /// and is capped at the configured maximum. A stale sentinel is removed
    /// and retried without consuming an attempt.
    ///
    /// # Errors
    ///
    /// Returns `InvoiceError::LockTimeout` once `max_retries` attempts have
    /// failed, or `InvoiceError::Store` if the sentinel cannot be created
    /// for a reason other than "already exists".
    pub async fn acquire_with(
        &self,
        max_retries: u32,
        base_delay: Duration,
    ) -> Result<LedgerGuard, InvoiceError> {
        let max_delay = self.inner.settings.max_delay;
        let budget = backoff_budget(max_retries, base_delay, max_delay);

        let local = tokio::time::timeout(budget, self.inner.local.clone().lock_owned())
            .await
            .map_err(|_| {
                warn!("Timed out waiting for in-process ledger lock");
                InvoiceError::LockTimeout {
                    attempts: max_retries,
                }
            })?;

        let token = Uuid::new_v4().to_string();
        let mut delay = base_delay;
        let mut attempt = 0;
        let mut reclaimed = 0;

        while attempt < max_retries {
            match create_sentinel(&self.inner.path, &token).await {
                Ok(()) => {
                    debug!("Ledger lock acquired ({})", token);
                    return Ok(LedgerGuard {
                        sentinel: Some(Sentinel {
                            path: self.inner.path.clone(),
                            token,
                        }),
                        _local: local,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if reclaimed < max_retries && self.reclaim_if_stale().await {
                        reclaimed += 1;
                        continue;
                    }

                    attempt += 1;
                    if attempt < max_retries {
                        debug!(
                            "Ledger lock busy, attempt {}/{}, retrying in {:?}",
                            attempt, max_retries, delay
                        );
                        sleep(delay).await;
                        delay = (delay * 2).min(max_delay);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!("Lock timeout after {} attempts on {:?}", max_retries, self.inner.path);
        Err(InvoiceError::LockTimeout {
            attempts: max_retries,
        })
    }

    /// Removes the sentinel if its lease has expired.
    ///
    /// Returns `true` when a stale sentinel was removed.
    async fn reclaim_if_stale(&self) -> bool {
        let path = &self.inner.path;
        let body = match fs::read_to_string(path).await {
            Ok(body) => body,
            Err(_) => return false,
        };
        let created = match sentinel_created_at(path, &body).await {
            Some(created) => created,
            None => return false,
        };

        let age = SystemTime::now()
            .duration_since(created)
            .unwrap_or_default();
        if age <= self.inner.settings.lease {
            return false;
        }

        warn!(
            "Reclaiming stale ledger lock {:?} (held for {:?})",
            path, age
        );
        take_stale(path, &body).await
    }
}

impl LedgerGuard {
    /// Releases the lock now instead of at end of scope.
    pub fn release(mut self) {
        if let Some(sentinel) = self.sentinel.take() {
            sentinel.remove();
        }
    }
}

impl Drop for LedgerGuard {
    fn drop(&mut self) {
        if let Some(sentinel) = self.sentinel.take() {
            sentinel.remove();
        }
    }
}

impl Sentinel {
    /// Deletes the sentinel if it is still ours. Errors are logged, never raised.
    ///
    /// Blocking `std::fs` on purpose: this runs from `Drop`, possibly outside
    /// a runtime, and only reads and unlinks one small file.
    fn remove(self) {
        match std::fs::read_to_string(&self.path) {
            Ok(body) if body.split_whitespace().next() == Some(self.token.as_str()) => {
                if let Err(e) = std::fs::remove_file(&self.path) {
                    if e.kind() != ErrorKind::NotFound {
                        warn!("Failed to release ledger lock {:?}: {}", self.path, e);
                    }
                }
            }
            Ok(_) => warn!(
                "Ledger lock {:?} was reclaimed by another holder, leaving it",
                self.path
            ),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to read ledger lock {:?}: {}", self.path, e),
        }
    }
}

/// Total time a full run of failed attempts would sleep.
fn backoff_budget(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Duration {
    let mut delay = base_delay;
    let mut total = Duration::ZERO;
    for _ in 0..max_retries {
        total += delay;
        delay = (delay * 2).min(max_delay);
    }
    total.max(base_delay)
}

async fn create_sentinel(path: &Path, token: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    file.write_all(format!("{} {}\n", token, now).as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

/// When the sentinel was taken: the timestamp recorded in `body`, or the
/// file's modification time for sentinels without one.
async fn sentinel_created_at(path: &Path, body: &str) -> Option<SystemTime> {
    let recorded = body
        .split_whitespace()
        .nth(1)
        .and_then(|secs| secs.parse::<u64>().ok())
        .map(|secs| UNIX_EPOCH + Duration::from_secs(secs));

    match recorded {
        Some(created) => Some(created),
        None => fs::metadata(path).await.ok()?.modified().ok(),
    }
}

/// Deletes the sentinel at `path` only if it still holds `observed`.
///
/// The sentinel is first renamed to a unique side name, so of several
/// processes reclaiming the same stale lease only one gets the file. If
/// what was moved is not the stale sentinel, another process has since
/// taken the lock and its sentinel is linked back into place.
async fn take_stale(path: &Path, observed: &str) -> bool {
    let mut aside = path.as_os_str().to_owned();
    aside.push(format!(".stale-{}", Uuid::new_v4()));
    let aside = PathBuf::from(aside);

    match fs::rename(path, &aside).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return true,
        Err(e) => {
            warn!("Failed to move stale lock {:?}: {}", path, e);
            return false;
        }
    }

    let moved = fs::read_to_string(&aside).await.unwrap_or_default();
    if moved == observed {
        if let Err(e) = fs::remove_file(&aside).await {
            warn!("Failed to remove stale lock {:?}: {}", aside, e);
        }
        return true;
    }

    // hard_link fails rather than overwrite a sentinel created meanwhile
    match fs::hard_link(&aside, path).await {
        Ok(()) => debug!("Ledger lock {:?} was live, put back", path),
        Err(e) => warn!("Could not put back live ledger lock {:?}: {}", path, e),
    }
    let _ = fs::remove_file(&aside).await;
    false
}
