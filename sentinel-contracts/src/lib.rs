//! Trait surfaces at the boundaries of the netlink daemon core.
//!
//! Handlers, sinks, and decoders are borrowed by trait object so the
//! dispatcher, storage layer, and daemon binary never depend on each
//! other's concrete types (mirrors the teacher's `ferrex-contracts`
//! split from `ferrex-model`).

pub mod decoder;
pub mod handler;
pub mod sink;

pub use decoder::{DecodeError, NetlinkDecoder, VendorDecoder};
pub use handler::{EventHandler, HandlerContext, HandlerError};
pub use sink::{EventSink, SinkError};
