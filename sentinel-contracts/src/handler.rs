use sentinel_model::Event;
use thiserror::Error;

/// Passed to every handler invocation. Carries nothing mutable today;
/// exists so new cross-cutting data (e.g. a tracing span id) can be
/// threaded through without breaking the trait signature.
#[derive(Debug, Clone, Copy, Default)]
pub struct HandlerContext {
    /// Worker-thread-local sequence of this invocation, for diagnostics.
    pub invocation: u64,
}

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("handler failed: {0}")]
    Failed(String),
}

/// A registered handler invoked by a thread pool worker for every event
/// that reaches it. Per §4.10, handlers run in registration order under
/// a read-side lock and must not block longer than a few milliseconds;
/// a failing handler never aborts the dispatcher, only the one
/// invocation.
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &str;

    fn handle(&self, event: &Event, ctx: &HandlerContext) -> Result<(), HandlerError>;
}
