//! Resource telemetry: process memory from `/proc/self/status`, pool
//! and throughput counters, and a health classifier (§4.16).

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{CoreError, Result};

const DEFAULT_PROC_STATUS_PATH: &str = "/proc/self/status";

#[derive(Debug, Clone, Copy, Default)]
pub struct MemorySnapshot {
    pub rss_bytes: u64,
    pub vms_bytes: u64,
}

/// Parses the `VmRSS`/`VmSize` lines out of a `/proc/[pid]/status`-shaped
/// file. Values in that file are reported in kB.
fn parse_proc_status(contents: &str) -> MemorySnapshot {
    let mut snapshot = MemorySnapshot::default();
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            snapshot.rss_bytes = parse_kb_field(rest);
        } else if let Some(rest) = line.strip_prefix("VmSize:") {
            snapshot.vms_bytes = parse_kb_field(rest);
        }
    }
    snapshot
}

fn parse_kb_field(field: &str) -> u64 {
    field
        .split_whitespace()
        .next()
        .and_then(|v| v.parse::<u64>().ok())
        .map(|kb| kb * 1024)
        .unwrap_or(0)
}

fn read_proc_status(path: &str) -> Result<MemorySnapshot> {
    let contents = std::fs::read_to_string(path).map_err(CoreError::from)?;
    Ok(parse_proc_status(&contents))
}

#[derive(Debug, Default)]
struct AllocCounters {
    allocated_bytes: AtomicU64,
    freed_bytes: AtomicU64,
    alloc_count: AtomicU64,
    free_count: AtomicU64,
    peak_bytes: AtomicU64,
}

impl AllocCounters {
    fn record_alloc(&self, bytes: u64) {
        let current = self.allocated_bytes.fetch_add(bytes, Ordering::Relaxed) + bytes
            - self.freed_bytes.load(Ordering::Relaxed);
        self.alloc_count.fetch_add(1, Ordering::Relaxed);
        let mut peak = self.peak_bytes.load(Ordering::Relaxed);
        while current > peak {
            match self.peak_bytes.compare_exchange_weak(
                peak,
                current,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => peak = observed,
            }
        }
    }

    fn record_free(&self, bytes: u64) {
        self.freed_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.free_count.fetch_add(1, Ordering::Relaxed);
    }

    fn current_bytes(&self) -> u64 {
        self.allocated_bytes
            .load(Ordering::Relaxed)
            .saturating_sub(self.freed_bytes.load(Ordering::Relaxed))
    }
}

struct RateWindow {
    last_ts: i64,
    last_messages: u64,
    last_drops: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TelemetrySnapshot {
    pub rss_bytes: u64,
    pub vms_bytes: u64,
    pub allocated_bytes: u64,
    pub freed_bytes: u64,
    pub current_bytes: u64,
    pub peak_bytes: u64,
    pub alloc_count: u64,
    pub free_count: u64,
    pub messages_per_sec: f64,
    pub drop_rate: f64,
    pub buffer_usage_pct: f64,
}

/// Accumulates allocation/throughput/buffer counters and samples
/// process memory on demand.
pub struct Telemetry {
    proc_status_path: String,
    alloc: AllocCounters,
    messages_total: AtomicU64,
    drops_total: AtomicU64,
    buffer_used: AtomicU64,
    buffer_capacity: AtomicU64,
    rate_window: Mutex<RateWindow>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::with_proc_status_path(DEFAULT_PROC_STATUS_PATH)
    }

    pub fn with_proc_status_path(path: impl Into<String>) -> Self {
        Self {
            proc_status_path: path.into(),
            alloc: AllocCounters::default(),
            messages_total: AtomicU64::new(0),
            drops_total: AtomicU64::new(0),
            buffer_used: AtomicU64::new(0),
            buffer_capacity: AtomicU64::new(0),
            rate_window: Mutex::new(RateWindow {
                last_ts: 0,
                last_messages: 0,
                last_drops: 0,
            }),
        }
    }

    pub fn record_alloc(&self, bytes: u64) {
        self.alloc.record_alloc(bytes);
    }

    pub fn record_free(&self, bytes: u64) {
        self.alloc.record_free(bytes);
    }

    pub fn record_message(&self) {
        self.messages_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_drop(&self) {
        self.drops_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_buffer_usage(&self, used: u64, capacity: u64) {
        self.buffer_used.store(used, Ordering::Relaxed);
        self.buffer_capacity.store(capacity, Ordering::Relaxed);
    }

    /// Samples `/proc/self/status` and computes rates against the
    /// previous call to this method (first call reports zero rates).
    pub fn snapshot(&self, now_ts: i64) -> Result<TelemetrySnapshot> {
        let mem = read_proc_status(&self.proc_status_path)?;
        let messages = self.messages_total.load(Ordering::Relaxed);
        let drops = self.drops_total.load(Ordering::Relaxed);

        let (messages_per_sec, drop_rate) = {
            let mut window = self.rate_window.lock();
            let elapsed = (now_ts - window.last_ts).max(0) as f64;
            let (mps, drate) = if window.last_ts == 0 || elapsed <= 0.0 {
                (0.0, 0.0)
            } else {
                let delta_messages = messages.saturating_sub(window.last_messages) as f64;
                let delta_drops = drops.saturating_sub(window.last_drops) as f64;
                let mps = delta_messages / elapsed;
                let drate = if delta_messages + delta_drops > 0.0 {
                    delta_drops / (delta_messages + delta_drops)
                } else {
                    0.0
                };
                (mps, drate)
            };
            window.last_ts = now_ts;
            window.last_messages = messages;
            window.last_drops = drops;
            (mps, drate)
        };

        let capacity = self.buffer_capacity.load(Ordering::Relaxed);
        let buffer_usage_pct = if capacity == 0 {
            0.0
        } else {
            self.buffer_used.load(Ordering::Relaxed) as f64 / capacity as f64 * 100.0
        };

        Ok(TelemetrySnapshot {
            rss_bytes: mem.rss_bytes,
            vms_bytes: mem.vms_bytes,
            allocated_bytes: self.alloc.allocated_bytes.load(Ordering::Relaxed),
            freed_bytes: self.alloc.freed_bytes.load(Ordering::Relaxed),
            current_bytes: self.alloc.current_bytes(),
            peak_bytes: self.alloc.peak_bytes.load(Ordering::Relaxed),
            alloc_count: self.alloc.alloc_count.load(Ordering::Relaxed),
            free_count: self.alloc.free_count.load(Ordering::Relaxed),
            messages_per_sec,
            drop_rate,
            buffer_usage_pct,
        })
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry")
            .field("current_bytes", &self.alloc.current_bytes())
            .field("messages_total", &self.messages_total.load(Ordering::Relaxed))
            .field("drops_total", &self.drops_total.load(Ordering::Relaxed))
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HealthThresholds {
    pub mem_warning_bytes: u64,
    pub mem_critical_bytes: u64,
    pub rate_warning_per_sec: f64,
    pub rate_critical_per_sec: f64,
    pub buffer_warning_pct: f64,
    pub buffer_critical_pct: f64,
    pub drop_rate_warning: f64,
    pub drop_rate_critical: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            mem_warning_bytes: 512 * 1024 * 1024,
            mem_critical_bytes: 1024 * 1024 * 1024,
            rate_warning_per_sec: 50_000.0,
            rate_critical_per_sec: 100_000.0,
            buffer_warning_pct: 75.0,
            buffer_critical_pct: 90.0,
            drop_rate_warning: 0.01,
            drop_rate_critical: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthStatus {
    pub mem_warning: bool,
    pub mem_critical: bool,
    pub rate_warning: bool,
    pub rate_critical: bool,
    pub buffer_warning: bool,
    pub buffer_critical: bool,
    pub drop_warning: bool,
    pub drop_critical: bool,
}

impl HealthStatus {
    pub fn any_critical(&self) -> bool {
        self.mem_critical || self.rate_critical || self.buffer_critical || self.drop_critical
    }

    pub fn any_warning(&self) -> bool {
        self.mem_warning || self.rate_warning || self.buffer_warning || self.drop_warning
    }
}

pub fn classify(snapshot: &TelemetrySnapshot, thresholds: &HealthThresholds) -> HealthStatus {
    HealthStatus {
        mem_warning: snapshot.rss_bytes >= thresholds.mem_warning_bytes,
        mem_critical: snapshot.rss_bytes >= thresholds.mem_critical_bytes,
        rate_warning: snapshot.messages_per_sec >= thresholds.rate_warning_per_sec,
        rate_critical: snapshot.messages_per_sec >= thresholds.rate_critical_per_sec,
        buffer_warning: snapshot.buffer_usage_pct >= thresholds.buffer_warning_pct,
        buffer_critical: snapshot.buffer_usage_pct >= thresholds.buffer_critical_pct,
        drop_warning: snapshot.drop_rate >= thresholds.drop_rate_warning,
        drop_critical: snapshot.drop_rate >= thresholds.drop_rate_critical,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rss_and_vmsize_in_bytes() {
        let contents = "Name:\tsentineld\nVmSize:\t  10240 kB\nVmRSS:\t   2048 kB\n";
        let mem = parse_proc_status(contents);
        assert_eq!(mem.vms_bytes, 10240 * 1024);
        assert_eq!(mem.rss_bytes, 2048 * 1024);
    }

    #[test]
    fn alloc_counters_track_current_and_peak() {
        let telemetry = Telemetry::new();
        telemetry.record_alloc(100);
        telemetry.record_alloc(50);
        telemetry.record_free(30);
        assert_eq!(telemetry.alloc.current_bytes(), 120);
        assert_eq!(telemetry.alloc.peak_bytes.load(Ordering::Relaxed), 150);
    }

    #[test]
    fn snapshot_computes_message_rate_between_calls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status");
        std::fs::write(&path, "VmRSS:\t 1024 kB\nVmSize:\t 2048 kB\n").unwrap();
        let telemetry = Telemetry::with_proc_status_path(path.to_str().unwrap());

        telemetry.snapshot(0).unwrap(); // seeds the window
        for _ in 0..100 {
            telemetry.record_message();
        }
        for _ in 0..5 {
            telemetry.record_drop();
        }

        let snapshot = telemetry.snapshot(1).unwrap();
        assert_eq!(snapshot.rss_bytes, 1024 * 1024);
        assert!((snapshot.messages_per_sec - 100.0).abs() < f64::EPSILON);
        assert!((snapshot.drop_rate - 5.0 / 105.0).abs() < 1e-9);
    }

    #[test]
    fn classify_flags_thresholds_independently() {
        let snapshot = TelemetrySnapshot {
            rss_bytes: 2 * 1024 * 1024 * 1024,
            buffer_usage_pct: 50.0,
            messages_per_sec: 10.0,
            drop_rate: 0.0,
            ..Default::default()
        };
        let status = classify(&snapshot, &HealthThresholds::default());
        assert!(status.mem_critical);
        assert!(!status.buffer_warning);
        assert!(status.any_critical());
        assert!(!status.rate_warning);
    }
}
