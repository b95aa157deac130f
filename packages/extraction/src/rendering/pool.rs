//! Bounded pool of headless render sessions.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::error::{ScrapeError, ScrapeResult};

#[derive(Debug, Default)]
struct PoolStats {
    in_use: AtomicUsize,
    peak: AtomicUsize,
}

/// Caps how many render sessions exist at once.
///
/// Acquisition waits for a free slot up to `acquire_timeout` and then
/// fails with [`ScrapeError::ResourceExhausted`]; it never fails the
/// process and never over-commits.
#[derive(Debug)]
pub struct SessionPool {
    semaphore: Arc<Semaphore>,
    max_sessions: usize,
    acquire_timeout: Duration,
    stats: Arc<PoolStats>,
    next_id: AtomicU64,
}

impl SessionPool {
    /// Create a pool with `max_sessions` slots (at least one).
    pub fn new(max_sessions: usize, acquire_timeout: Duration) -> Self {
        let max_sessions = max_sessions.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_sessions)),
            max_sessions,
            acquire_timeout,
            stats: Arc::new(PoolStats::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Lease a session, waiting at most the configured acquisition timeout.
    pub async fn acquire(&self) -> ScrapeResult<RenderSession> {
        let started = Instant::now();
        let permit = match tokio::time::timeout(
            self.acquire_timeout,
            self.semaphore.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(ScrapeError::HeadlessUnavailable),
            Err(_) => {
                let waited_ms = started.elapsed().as_millis() as u64;
                warn!(
                    waited_ms,
                    max_sessions = self.max_sessions,
                    "Headless session pool exhausted"
                );
                return Err(ScrapeError::ResourceExhausted { waited_ms });
            }
        };

        let in_use = self.stats.in_use.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak.fetch_max(in_use, Ordering::SeqCst);

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(
            session_id = id,
            in_use,
            waited_ms = started.elapsed().as_millis() as u64,
            "Render session acquired"
        );

        Ok(RenderSession {
            id,
            opened_at: Instant::now(),
            stats: self.stats.clone(),
            _permit: permit,
        })
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Sessions currently leased.
    pub fn in_use(&self) -> usize {
        self.stats.in_use.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously leased sessions observed.
    pub fn peak_in_use(&self) -> usize {
        self.stats.peak.load(Ordering::SeqCst)
    }

    /// Stop handing out sessions. Waiters fail with `HeadlessUnavailable`.
    pub fn close(&self) {
        self.semaphore.close();
    }
}

/// A leased render session.
///
/// Dropping the session tears it down and returns the slot to the pool,
/// which covers success, error, timeout and future cancellation alike.
#[derive(Debug)]
pub struct RenderSession {
    id: u64,
    opened_at: Instant,
    stats: Arc<PoolStats>,
    _permit: OwnedSemaphorePermit,
}

impl RenderSession {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        // Runs before the permit field is dropped, so `in_use` never exceeds
        // the number of outstanding permits.
        self.stats.in_use.fetch_sub(1, Ordering::SeqCst);
        debug!(
            session_id = self.id,
            held_ms = self.opened_at.elapsed().as_millis() as u64,
            "Render session torn down"
        );
    }
}
