use serde::{Deserialize, Serialize};

/// `core` section (§6): ring buffer size, database retention cap,
/// global rate limit, worker thread count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    pub buffer_size: usize,
    pub max_events: usize,
    pub rate_limit: u32,
    pub worker_threads: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            buffer_size: 4096,
            max_events: 100_000,
            rate_limit: 0,
            worker_threads: 4,
        }
    }
}

/// `monitoring` section: which protocols/interfaces/message types are
/// observed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub protocols: Vec<String>,
    pub interface_include: Vec<String>,
    pub interface_exclude: Vec<String>,
    pub message_types: Vec<u16>,
    pub track_namespaces: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsoleFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleOutput {
    pub enabled: bool,
    pub format: ConsoleFormat,
}

impl Default for ConsoleOutput {
    fn default() -> Self {
        Self {
            enabled: true,
            format: ConsoleFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PcapOutput {
    pub enabled: bool,
    pub file: Option<String>,
    pub rotate_size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseOutput {
    pub enabled: bool,
    pub path: String,
    pub retention_days: u32,
}

impl Default for DatabaseOutput {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "sentinel-events.db".to_string(),
            retention_days: 30,
        }
    }
}

/// `output` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub console: ConsoleOutput,
    pub pcap: PcapOutput,
    pub database: DatabaseOutput,
}

/// `retention` section (§4.14, §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionConfig {
    pub max_age_s: u64,
    pub max_events: usize,
    pub max_db_size_mb: u64,
    pub cleanup_interval_s: u64,
    pub cleanup_on_startup: bool,
    pub batch_delete_size: usize,
    pub delete_oldest_first: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_s: 30 * 24 * 3600,
            max_events: 1_000_000,
            max_db_size_mb: 1024,
            cleanup_interval_s: 300,
            cleanup_on_startup: false,
            batch_delete_size: 1000,
            delete_oldest_first: true,
        }
    }
}

/// `audit` section (§4.13, §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    pub log_path: String,
    pub security_log_path: Option<String>,
    pub max_file_size: u64,
    pub max_rotations: u32,
    pub sync_writes: bool,
    pub verify_on_open: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_path: "sentinel-audit.log".to_string(),
            security_log_path: None,
            max_file_size: 64 * 1024 * 1024,
            max_rotations: 5,
            sync_writes: false,
            verify_on_open: true,
        }
    }
}

/// The full configuration snapshot the core consumes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub core: CoreConfig,
    pub monitoring: MonitoringConfig,
    pub output: OutputConfig,
    pub retention: RetentionConfig,
    pub audit: AuditConfig,
}
