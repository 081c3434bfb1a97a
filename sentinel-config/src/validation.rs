use crate::model::Config;
use thiserror::Error;

/// Configuration is a "refuses to start" error class (§7): every bound
/// violation is surfaced here rather than clamped silently.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("core.buffer_size {0} out of range [1024, 104857600]")]
    BufferSizeOutOfRange(usize),
    #[error("core.max_events {0} out of range [100, 1000000]")]
    MaxEventsOutOfRange(usize),
    #[error("core.rate_limit {0} out of range [0, 100000]")]
    RateLimitOutOfRange(u32),
    #[error("core.worker_threads {0} out of range [1, 64]")]
    WorkerThreadsOutOfRange(usize),
    #[error("output.database.retention_days {0} out of range [1, 3650]")]
    RetentionDaysOutOfRange(u32),
    #[error("retention.max_age_s must be >= 0 and retention.batch_delete_size must be > 0")]
    RetentionBoundsInvalid,
    #[error("audit.max_rotations must be >= 1 when audit.max_file_size > 0")]
    AuditRotationInvalid,
}

const MIN_BUFFER: usize = 1024;
const MAX_BUFFER: usize = 100 * 1024 * 1024;
const MIN_MAX_EVENTS: usize = 100;
const MAX_MAX_EVENTS: usize = 1_000_000;
const MAX_RATE_LIMIT: u32 = 100_000;
const MAX_WORKERS: usize = 64;

/// Validate every bound from §6. Called once by [`crate::ConfigLoader`]
/// after composing file + env sources.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if !(MIN_BUFFER..=MAX_BUFFER).contains(&config.core.buffer_size) {
        return Err(ConfigError::BufferSizeOutOfRange(config.core.buffer_size));
    }
    if !(MIN_MAX_EVENTS..=MAX_MAX_EVENTS).contains(&config.core.max_events) {
        return Err(ConfigError::MaxEventsOutOfRange(config.core.max_events));
    }
    if config.core.rate_limit > MAX_RATE_LIMIT {
        return Err(ConfigError::RateLimitOutOfRange(config.core.rate_limit));
    }
    if !(1..=MAX_WORKERS).contains(&config.core.worker_threads) {
        return Err(ConfigError::WorkerThreadsOutOfRange(
            config.core.worker_threads,
        ));
    }
    if config.output.database.enabled
        && !(1..=3650).contains(&config.output.database.retention_days)
    {
        return Err(ConfigError::RetentionDaysOutOfRange(
            config.output.database.retention_days,
        ));
    }
    if config.retention.batch_delete_size == 0 {
        return Err(ConfigError::RetentionBoundsInvalid);
    }
    if config.audit.max_file_size > 0 && config.audit.max_rotations == 0 {
        return Err(ConfigError::AuditRotationInvalid);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn rejects_oversized_buffer() {
        let mut c = Config::default();
        c.core.buffer_size = MAX_BUFFER + 1;
        assert_eq!(
            validate(&c),
            Err(ConfigError::BufferSizeOutOfRange(MAX_BUFFER + 1))
        );
    }

    #[test]
    fn rejects_zero_worker_threads() {
        let mut c = Config::default();
        c.core.worker_threads = 0;
        assert_eq!(validate(&c), Err(ConfigError::WorkerThreadsOutOfRange(0)));
    }
}
