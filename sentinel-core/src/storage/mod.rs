//! Persistence: the composite sink, the sqlite event store, the
//! hash-chained audit log, and the retention policy that prunes them
//! (§4.11-§4.14).

pub mod audit;
pub mod database;
pub mod layer;
pub mod retention;

pub use audit::{AuditLog, AuditSeverity};
pub use database::{DatabaseStats, EventDatabase, EventQuery};
pub use layer::{StorageLayer, StorageLayerBuilder};
pub use retention::{RetentionPolicy, RetentionStats};
