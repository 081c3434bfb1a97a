//! Interval-driven cleanup of the event database (§4.14).
//!
//! `Created → (optional initial cleanup) → Stopped → Running ↔ Stopped
//! → Destroyed`. The background task is a plain tokio interval loop;
//! [`RetentionPolicy::stop`]/[`destroy`](RetentionPolicy::destroy) abort
//! it rather than signal a graceful exit, since a cleanup cycle never
//! straddles more than one `delete_*` statement at a time.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sentinel_config::RetentionConfig;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::database::EventDatabase;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Created,
    Stopped,
    Running,
    Destroyed,
}

#[derive(Debug, Clone, Default)]
pub struct RetentionStats {
    pub total_cleanups: u64,
    pub total_deleted: u64,
    pub last_cleanup_ts: i64,
    pub last_deleted_count: u64,
    pub current_event_count: i64,
    pub current_db_size_bytes: i64,
}

struct Inner {
    db: Arc<EventDatabase>,
    config: RetentionConfig,
    stats: Mutex<RetentionStats>,
    state: Mutex<State>,
}

pub struct RetentionPolicy {
    inner: Arc<Inner>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RetentionPolicy {
    pub fn new(db: Arc<EventDatabase>, config: RetentionConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                db,
                config,
                stats: Mutex::new(RetentionStats::default()),
                state: Mutex::new(State::Created),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Runs an initial cleanup if configured, then spawns the
    /// interval-driven background task.
    pub async fn start(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state == State::Running {
                return;
            }
            *state = State::Stopped;
        }

        if self.inner.config.cleanup_on_startup {
            if let Err(e) = cleanup_once(&self.inner).await {
                warn!(error = %e, "initial retention cleanup failed");
            }
        }

        *self.inner.state.lock() = State::Running;

        let inner = self.inner.clone();
        let mut handle_slot = self.handle.lock();
        *handle_slot = Some(tokio::spawn(async move {
            let interval_s = inner.config.cleanup_interval_s.max(1);
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_s));
            loop {
                ticker.tick().await;
                if *inner.state.lock() != State::Running {
                    break;
                }
                if let Err(e) = cleanup_once(&inner).await {
                    warn!(error = %e, "retention cleanup failed");
                }
            }
        }));
    }

    pub fn stop(&self) {
        *self.inner.state.lock() = State::Stopped;
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
    }

    pub fn destroy(self) {
        self.stop();
        *self.inner.state.lock() = State::Destroyed;
    }

    pub fn stats(&self) -> RetentionStats {
        self.inner.stats.lock().clone()
    }

    pub async fn run_cleanup_now(&self) -> Result<()> {
        cleanup_once(&self.inner).await
    }

    pub fn max_age_s(&self) -> u64 {
        self.inner.config.max_age_s
    }
}

async fn cleanup_once(inner: &Inner) -> Result<()> {
    let now = now_unix();
    let mut deleted = 0u64;

    if inner.config.max_age_s > 0 {
        let cutoff = now - inner.config.max_age_s as i64;
        deleted += inner.db.delete_before(cutoff).await?;
    }

    let stats = inner.db.stats().await?;
    if stats.total_events as usize > inner.config.max_events {
        let mut current = stats.total_events;
        let target = inner.config.max_events as i64;
        let chunk_size = inner.config.batch_delete_size.max(1) as i64;

        while current > target {
            let keep = (current - chunk_size.min(current - target)).max(target);
            let removed = inner.db.delete_oldest(keep).await?;
            deleted += removed;
            if removed == 0 {
                break;
            }
            current = keep;
        }
    }

    let stats = inner.db.stats().await?;
    let max_bytes = inner.config.max_db_size_mb as i64 * 1024 * 1024;
    if max_bytes > 0 && stats.db_size_bytes > max_bytes {
        let keep = (stats.total_events as f64 * 0.9) as i64;
        deleted += inner.db.delete_oldest(keep.max(0)).await?;
        inner.db.vacuum().await?;
    }

    let final_stats = inner.db.stats().await?;
    let mut recorded = inner.stats.lock();
    recorded.total_cleanups += 1;
    recorded.total_deleted += deleted;
    recorded.last_cleanup_ts = now;
    recorded.last_deleted_count = deleted;
    recorded.current_event_count = final_stats.total_events;
    recorded.current_db_size_bytes = final_stats.db_size_bytes;

    debug!(deleted, total = final_stats.total_events, "retention cleanup complete");
    Ok(())
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_model::{Event, EventType, IfaceName, Payload};

    fn config() -> RetentionConfig {
        RetentionConfig {
            max_age_s: 0,
            max_events: 3,
            max_db_size_mb: 0,
            cleanup_interval_s: 3600,
            cleanup_on_startup: false,
            batch_delete_size: 10,
            delete_oldest_first: true,
        }
    }

    #[tokio::test]
    async fn cleanup_trims_down_to_max_events() {
        let db = Arc::new(EventDatabase::connect("sqlite::memory:", 1).await.unwrap());
        for ts in 0..5 {
            db.insert(
                Event::new(EventType::Link, 16, ts, Payload::Empty)
                    .with_interface(IfaceName::new("eth0").unwrap()),
                false,
            )
            .await
            .unwrap();
        }

        let policy = RetentionPolicy::new(db.clone(), config());
        policy.run_cleanup_now().await.unwrap();

        let stats = policy.stats();
        assert_eq!(stats.current_event_count, 3);
        assert_eq!(stats.total_cleanups, 1);
        assert!(stats.last_deleted_count >= 2);
    }
}
