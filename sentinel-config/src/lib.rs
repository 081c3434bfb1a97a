//! Configuration snapshot consumed by the core, plus a layered
//! TOML + environment loader and validator.
//!
//! Structure follows the teacher's `ferrex-server::infra::config`
//! split: typed `model` structs, a `loader` that composes file + env
//! sources, and a `validation` pass that turns bound violations into a
//! structured error rather than a panic.

pub mod loader;
pub mod model;
pub mod shared;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader};
pub use model::{AuditConfig, Config, CoreConfig, MonitoringConfig, OutputConfig, RetentionConfig};
pub use shared::SharedConfig;
pub use validation::ConfigError;
