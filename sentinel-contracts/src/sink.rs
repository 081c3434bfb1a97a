use sentinel_model::Event;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("sink io failure: {0}")]
    Io(String),
    #[error("sink backend failure: {0}")]
    Backend(String),
}

/// A durable or semi-durable destination for accepted events (memory
/// ring, event database, audit log). Implementations of the storage
/// layer in `sentinel-core` compose several of these; §4.11 specifies
/// that a failure in one sink must not prevent stores to the others.
pub trait EventSink: Send + Sync {
    /// Store `event`. `is_security` selects the audit severity the sink
    /// should apply if it distinguishes one.
    fn store(&self, event: &Event, is_security: bool) -> Result<(), SinkError>;
}
