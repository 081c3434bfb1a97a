//! Event pipeline core for the netlink monitoring daemon: ring buffer,
//! object pool, rate limiter, thread pool, filter language, time
//! window, correlation/security engine, storage layer, dispatcher,
//! lifecycle, and resource telemetry.

pub mod correlation;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod lifecycle;
pub mod object_pool;
pub mod pipeline;
pub mod rate_limiter;
pub mod ring_buffer;
pub mod storage;
pub mod telemetry;
pub mod thread_pool;
pub mod time_window;

pub use dispatcher::{Dispatcher, DispatcherConfig, DispatcherStats};
pub use error::{CoreError, Result};
pub use lifecycle::ShutdownToken;
pub use object_pool::ObjectPool;
pub use pipeline::EventPipeline;
pub use rate_limiter::RateLimiterMap;
pub use ring_buffer::RingBuffer;
pub use telemetry::{HealthStatus, HealthThresholds, Telemetry, TelemetrySnapshot};
pub use thread_pool::{Priority, ThreadPool, ThreadPoolStats};
pub use time_window::TimeWindow;
