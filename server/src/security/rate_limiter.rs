use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use thiserror::Error;
use tracing::{debug, warn};

use shared::types::server_config::RateLimitConfig;

use crate::database::utils::get_timestamp;

/// On-disk ledger: `"<action>:<origin>"` -> attempt timestamps (Unix seconds).
type Ledger = HashMap<String, Vec<i64>>;

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum RateLimitStoreError {
    #[error("failed to open rate limit store {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("timed out waiting for lock on {0}")]
    LockTimeout(PathBuf),

    #[error("failed to lock rate limit store: {0}")]
    Lock(std::io::Error),

    #[error("failed to write rate limit store: {0}")]
    Write(std::io::Error),

    #[error("failed to encode rate limit store: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outcome of one limiter evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Attempts inside the window, including this one when it was recorded.
    pub attempts: usize,
    /// Seconds until the oldest counted attempt leaves the window. Only set
    /// on denial.
    pub retry_after_secs: Option<u64>,
}

impl RateDecision {
    fn fail_open() -> Self {
        Self {
            allowed: true,
            attempts: 0,
            retry_after_secs: None,
        }
    }
}

/// Sliding-window attempt limiter keyed by action and origin, persisted in a
/// JSON file so counts survive restarts and are shared between processes.
///
/// Read-modify-write cycles hold an exclusive advisory lock on the store.
/// Storage trouble (open, lock, write) is logged and the attempt is allowed.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    inner: Arc<RateLimiterInner>,
}

#[derive(Debug)]
struct RateLimiterInner {
    store_path: PathBuf,
    max_attempts: usize,
    window_secs: i64,
    lock_timeout: Duration,
    /// Serialises threads of this process before they contend on the file lock.
    local: Mutex<()>,
}

impl RateLimiter {
    /// `lock_timeout` bounds how long one evaluation waits for the store lock
    /// before failing open.
    pub fn new(
        store_path: impl Into<PathBuf>,
        max_attempts: usize,
        window_secs: u64,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(RateLimiterInner {
                store_path: store_path.into(),
                max_attempts,
                window_secs: i64::try_from(window_secs).unwrap_or(i64::MAX),
                lock_timeout,
                local: Mutex::new(()),
            }),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            config.store_path.clone(),
            config.max_attempts,
            config.window_secs,
            Duration::from_millis(config.lock_timeout_ms),
        )
    }

    pub fn lock_timeout(&self) -> Duration {
        self.inner.lock_timeout
    }

    pub fn max_attempts(&self) -> usize {
        self.inner.max_attempts
    }

    pub fn window_secs(&self) -> u64 {
        self.inner.window_secs as u64
    }

    pub fn store_path(&self) -> &Path {
        &self.inner.store_path
    }

    /// Record an attempt for `action` from `origin` if the window has room.
    /// Returns `false` when the limit is reached.
    pub fn check_and_record(&self, action: &str, origin: &str) -> bool {
        self.check_and_record_at(action, origin, get_timestamp())
    }

    pub fn check_and_record_at(&self, action: &str, origin: &str, now: i64) -> bool {
        self.evaluate_at(action, origin, now).allowed
    }

    /// Async entry point for handlers; the file IO runs on the blocking pool.
    pub async fn check(&self, action: &str, origin: &str) -> RateDecision {
        let limiter = self.clone();
        let action = action.to_string();
        let origin = origin.to_string();

        match tokio::task::spawn_blocking(move || {
            limiter.evaluate_at(&action, &origin, get_timestamp())
        })
        .await
        {
            Ok(decision) => decision,
            Err(e) => {
                warn!(target: "audit", kind = "rate_limit_store", "Rate limiter task failed: {}", e);
                RateDecision::fail_open()
            }
        }
    }

    pub fn evaluate_at(&self, action: &str, origin: &str, now: i64) -> RateDecision {
        match self.try_evaluate(action, origin, now) {
            Ok(decision) => decision,
            Err(e) => {
                warn!(
                    target: "audit",
                    kind = "rate_limit_store",
                    action,
                    "Rate limiter storage degraded, allowing attempt: {}",
                    e
                );
                RateDecision::fail_open()
            }
        }
    }

    fn try_evaluate(
        &self,
        action: &str,
        origin: &str,
        now: i64,
    ) -> Result<RateDecision, RateLimitStoreError> {
        let _guard = self
            .inner
            .local
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut file = self.open_store()?;
        self.lock_store(&file)?;

        let result = self.evaluate_locked(&mut file, action, origin, now);

        if let Err(e) = FileExt::unlock(&file) {
            debug!("Failed to release rate limit lock explicitly: {}", e);
        }
        result
    }

    fn evaluate_locked(
        &self,
        file: &mut File,
        action: &str,
        origin: &str,
        now: i64,
    ) -> Result<RateDecision, RateLimitStoreError> {
        let mut ledger = read_ledger(file, &self.inner.store_path);
        let window_start = now - self.inner.window_secs;
        let key = ledger_key(action, origin);

        for attempts in ledger.values_mut() {
            attempts.retain(|&t| t >= window_start && t <= now);
        }

        let count = ledger.get(&key).map_or(0, Vec::len);

        if count >= self.inner.max_attempts {
            let oldest = ledger
                .get(&key)
                .and_then(|attempts| attempts.iter().min().copied())
                .unwrap_or(now);
            let retry_after = (oldest + self.inner.window_secs - now).max(1) as u64;

            debug!("Rate limit hit for {} ({} attempts)", key, count);
            return Ok(RateDecision {
                allowed: false,
                attempts: count,
                retry_after_secs: Some(retry_after),
            });
        }

        ledger.entry(key).or_default().push(now);
        ledger.retain(|_, attempts| !attempts.is_empty());

        write_ledger(file, &ledger)?;

        Ok(RateDecision {
            allowed: true,
            attempts: count + 1,
            retry_after_secs: None,
        })
    }

    fn open_store(&self) -> Result<File, RateLimitStoreError> {
        let path = &self.inner.store_path;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| RateLimitStoreError::Open {
                path: path.clone(),
                source,
            })?;
        }

        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|source| RateLimitStoreError::Open {
                path: path.clone(),
                source,
            })
    }

    /// Bounded wait for the exclusive lock so a stuck holder cannot hang requests.
    fn lock_store(&self, file: &File) -> Result<(), RateLimitStoreError> {
        let deadline = Instant::now() + self.inner.lock_timeout;

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    if Instant::now() >= deadline {
                        return Err(RateLimitStoreError::LockTimeout(
                            self.inner.store_path.clone(),
                        ));
                    }
                    thread::sleep(LOCK_RETRY_INTERVAL);
                }
                Err(e) => return Err(RateLimitStoreError::Lock(e)),
            }
        }
    }
}

fn ledger_key(action: &str, origin: &str) -> String {
    format!("{}:{}", action, origin)
}

/// Missing, empty or corrupt stores all read as an empty ledger.
fn read_ledger(file: &mut File, path: &Path) -> Ledger {
    let mut contents = String::new();
    if let Err(e) = file.read_to_string(&mut contents) {
        warn!("Unreadable rate limit store {}: {}", path.display(), e);
        return Ledger::new();
    }

    if contents.trim().is_empty() {
        return Ledger::new();
    }

    serde_json::from_str(&contents).unwrap_or_else(|e| {
        warn!(
            "Corrupt rate limit store {}, starting fresh: {}",
            path.display(),
            e
        );
        Ledger::new()
    })
}

fn write_ledger(file: &mut File, ledger: &Ledger) -> Result<(), RateLimitStoreError> {
    let encoded = serde_json::to_vec(ledger)?;

    file.set_len(0).map_err(RateLimitStoreError::Write)?;
    file.seek(SeekFrom::Start(0))
        .map_err(RateLimitStoreError::Write)?;
    file.write_all(&encoded).map_err(RateLimitStoreError::Write)?;
    file.flush().map_err(RateLimitStoreError::Write)?;
    Ok(())
}
