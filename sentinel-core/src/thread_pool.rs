//! Fixed worker-count thread pool with a bounded, priority-ordered
//! work queue (§4.4).
//!
//! Workers block on a condition variable when the queue is empty and
//! always drain higher-priority work first; within a priority, tasks
//! run FIFO.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low = 0,
    Normal = 1,
    High = 2,
}

#[derive(Debug, Default)]
struct Queues {
    high: VecDeque<Task>,
    normal: VecDeque<Task>,
    low: VecDeque<Task>,
}

impl Queues {
    fn len(&self) -> usize {
        self.high.len() + self.normal.len() + self.low.len()
    }

    fn pop(&mut self) -> Option<Task> {
        self.high
            .pop_front()
            .or_else(|| self.normal.pop_front())
            .or_else(|| self.low.pop_front())
    }

    fn push(&mut self, priority: Priority, task: Task) {
        match priority {
            Priority::High => self.high.push_back(task),
            Priority::Normal => self.normal.push_back(task),
            Priority::Low => self.low.push_back(task),
        }
    }

    fn clear(&mut self) {
        self.high.clear();
        self.normal.clear();
        self.low.clear();
    }
}

struct State {
    queues: Queues,
    busy_workers: usize,
    shutdown: bool,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadPoolStats {
    pub submitted: u64,
    pub completed: u64,
    pub rejected: u64,
}

struct Shared {
    state: Mutex<State>,
    has_work: Condvar,
    drained: Condvar,
    max_queue_len: usize,
    submitted: AtomicU64,
    completed: AtomicU64,
    rejected: AtomicU64,
}

pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// `worker_count == 0` uses the logical CPU count.
    pub fn new(worker_count: usize, max_queue_len: usize) -> Self {
        let worker_count = if worker_count == 0 {
            num_cpus::get()
        } else {
            worker_count
        };

        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queues: Queues::default(),
                busy_workers: 0,
                shutdown: false,
            }),
            has_work: Condvar::new(),
            drained: Condvar::new(),
            max_queue_len,
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        });

        let workers = (0..worker_count)
            .map(|id| {
                let shared = Arc::clone(&shared);
                std::thread::Builder::new()
                    .name(format!("sentinel-worker-{id}"))
                    .spawn(move || worker_loop(shared))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self { shared, workers }
    }

    /// Returns `false` if the queue is already at `max_queue_len`.
    pub fn submit(&self, priority: Priority, task: Task) -> bool {
        let mut state = self.shared.state.lock().unwrap();
        if state.shutdown || state.queues.len() >= self.shared.max_queue_len {
            self.shared.rejected.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        state.queues.push(priority, task);
        self.shared.submitted.fetch_add(1, Ordering::Relaxed);
        self.shared.has_work.notify_one();
        true
    }

    /// Blocks until the queue is empty and no worker is mid-task.
    pub fn wait(&self) {
        let state = self.shared.state.lock().unwrap();
        let _guard = self
            .shared
            .drained
            .wait_while(state, |state| {
                state.queues.len() > 0 || state.busy_workers > 0
            })
            .unwrap();
    }

    /// `wait=true` drains pending work before joining; `wait=false`
    /// discards whatever remains queued.
    pub fn destroy(mut self, wait: bool) {
        if wait {
            self.wait();
        }
        {
            let mut state = self.shared.state.lock().unwrap();
            state.shutdown = true;
            if !wait {
                state.queues.clear();
            }
        }
        self.shared.has_work.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }

    pub fn stats(&self) -> ThreadPoolStats {
        ThreadPoolStats {
            submitted: self.shared.submitted.load(Ordering::Relaxed),
            completed: self.shared.completed.load(Ordering::Relaxed),
            rejected: self.shared.rejected.load(Ordering::Relaxed),
        }
    }

    pub fn queue_len(&self) -> usize {
        self.shared.state.lock().unwrap().queues.len()
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let task = {
            let mut state = shared.state.lock().unwrap();
            loop {
                if let Some(task) = state.queues.pop() {
                    state.busy_workers += 1;
                    break Some(task);
                }
                if state.shutdown {
                    break None;
                }
                state = shared.has_work.wait(state).unwrap();
            }
        };

        let Some(task) = task else { break };

        task();
        shared.completed.fetch_add(1, Ordering::Relaxed);

        {
            let mut state = shared.state.lock().unwrap();
            state.busy_workers -= 1;
        }
        shared.drained.notify_all();
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("workers", &self.workers.len())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn runs_submitted_tasks() {
        let pool = ThreadPool::new(2, 16);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            assert!(pool.submit(
                Priority::Normal,
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            ));
        }
        pool.wait();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert_eq!(pool.stats().completed, 10);
        pool.destroy(true);
    }

    #[test]
    fn rejects_when_queue_full() {
        let pool = ThreadPool::new(1, 1);
        // occupy the single worker so the queue can fill
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        assert!(pool.submit(
            Priority::Normal,
            Box::new(move || {
                rx.recv().ok();
            })
        ));
        // give the worker a moment to pick up the blocking task
        std::thread::sleep(Duration::from_millis(50));
        assert!(pool.submit(Priority::Normal, Box::new(|| {})));
        assert!(!pool.submit(Priority::Normal, Box::new(|| {})));
        assert_eq!(pool.stats().rejected, 1);
        drop(tx);
        pool.destroy(false);
    }

    #[test]
    fn high_priority_drains_before_low() {
        let pool = ThreadPool::new(1, 16);
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let order = Arc::new(Mutex::new(Vec::new()));

        // block the single worker so both submissions queue up first
        assert!(pool.submit(
            Priority::Normal,
            Box::new(move || {
                rx.recv().ok();
            })
        ));
        std::thread::sleep(Duration::from_millis(50));

        let o1 = Arc::clone(&order);
        pool.submit(Priority::Low, Box::new(move || o1.lock().unwrap().push("low")));
        let o2 = Arc::clone(&order);
        pool.submit(
            Priority::High,
            Box::new(move || o2.lock().unwrap().push("high")),
        );

        drop(tx);
        pool.wait();
        assert_eq!(*order.lock().unwrap(), vec!["high", "low"]);
        pool.destroy(true);
    }
}
