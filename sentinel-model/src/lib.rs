//! Canonical event model for the netlink monitoring daemon.
//!
//! This crate defines the normalized, decoder-agnostic [`Event`] record
//! that flows through the dispatcher, filter language, correlation
//! engine, and every sink. It has no I/O and no business logic beyond
//! constructors and field lookups.

pub mod error;
pub mod event;
pub mod field;
pub mod severity;

pub use error::ModelError;
pub use event::{
    AddressPayload, ConntrackPayload, Event, EventType, GenericPayload, IfaceName,
    LinkPayload, NeighborPayload, Payload, ProtocolFamily, RoutePayload, RulePayload,
    SockDiagPayload,
};
pub use field::FieldValue;
pub use severity::Severity;
