//! Shared shutdown token and signal-triggered callback registry
//! (§4.15).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, info};

pub type SignalCallback = Box<dyn Fn() + Send + Sync>;

struct CallbackEntry {
    order: u64,
    callback: SignalCallback,
}

struct Inner {
    should_exit: AtomicBool,
    callbacks: DashMap<u64, CallbackEntry>,
    next_id: AtomicU64,
    next_order: AtomicU64,
}

/// A shutdown flag visible to the dispatcher, the retention thread, and
/// any network readers, plus a registry of callbacks invoked in
/// registration order when SIGINT/SIGTERM/SIGHUP arrives.
#[derive(Clone)]
pub struct ShutdownToken {
    inner: Arc<Inner>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                should_exit: AtomicBool::new(false),
                callbacks: DashMap::new(),
                next_id: AtomicU64::new(1),
                next_order: AtomicU64::new(0),
            }),
        }
    }

    pub fn should_exit(&self) -> bool {
        self.inner.should_exit.load(Ordering::Acquire)
    }

    pub fn request_exit(&self) {
        self.inner.should_exit.store(true, Ordering::Release);
        self.run_callbacks();
    }

    pub fn register(&self, callback: SignalCallback) -> u64 {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let order = self.inner.next_order.fetch_add(1, Ordering::Relaxed);
        self.inner.callbacks.insert(id, CallbackEntry { order, callback });
        id
    }

    /// Unregistering an unknown id is not an error.
    pub fn unregister(&self, id: u64) -> bool {
        self.inner.callbacks.remove(&id).is_some()
    }

    fn run_callbacks(&self) {
        let mut entries: Vec<_> = self
            .inner
            .callbacks
            .iter()
            .map(|e| (e.order, *e.key()))
            .collect();
        entries.sort_by_key(|(order, _)| *order);
        for (_, id) in entries {
            if let Some(entry) = self.inner.callbacks.get(&id) {
                (entry.callback)();
            }
        }
    }

    /// Spawns a task that listens for SIGINT, SIGTERM, and SIGHUP and
    /// calls [`request_exit`](Self::request_exit) on the first one
    /// received. The task exits once any signal fires.
    pub fn install_signal_handlers(&self) -> std::io::Result<()> {
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sighup = signal(SignalKind::hangup())?;
        let token = self.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = sigint.recv() => info!(signal = "SIGINT", "shutdown signal received"),
                _ = sigterm.recv() => info!(signal = "SIGTERM", "shutdown signal received"),
                _ = sighup.recv() => info!(signal = "SIGHUP", "shutdown signal received"),
            }
            debug!("invoking registered shutdown callbacks");
            token.request_exit();
        });

        Ok(())
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShutdownToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownToken")
            .field("should_exit", &self.should_exit())
            .field("callbacks", &self.inner.callbacks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn callbacks_run_in_registration_order() {
        let token = ShutdownToken::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = Arc::clone(&order);
        token.register(Box::new(move || o1.lock().unwrap().push(1)));
        let o2 = Arc::clone(&order);
        token.register(Box::new(move || o2.lock().unwrap().push(2)));
        let o3 = Arc::clone(&order);
        token.register(Box::new(move || o3.lock().unwrap().push(3)));

        assert!(!token.should_exit());
        token.request_exit();
        assert!(token.should_exit());
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn unregister_is_idempotent() {
        let token = ShutdownToken::new();
        let id = token.register(Box::new(|| {}));
        assert!(token.unregister(id));
        assert!(!token.unregister(id));
    }

    #[test]
    fn unregistered_callback_does_not_run() {
        let token = ShutdownToken::new();
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = Arc::clone(&ran);
        let id = token.register(Box::new(move || ran_clone.store(true, Ordering::SeqCst)));
        token.unregister(id);
        token.request_exit();
        assert!(!ran.load(Ordering::SeqCst));
    }
}
