use sentinel_model::{Event, GenericPayload};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed netlink message: {0}")]
    Malformed(String),
    #[error("unsupported message type {0}")]
    Unsupported(u16),
}

/// The interface the core consumes decoded netlink messages through.
/// The raw socket library, multicast group subscription, and wire
/// parsing are out of scope (spec.md §1); this is the seam an external
/// implementation plugs into.
pub trait NetlinkDecoder: Send {
    /// Decode one raw netlink message into a normalized [`Event`].
    /// `Ok(None)` means the message was recognized but carries nothing
    /// worth forwarding (e.g. a NLMSG_DONE marker).
    fn decode(&mut self, raw: &[u8]) -> Result<Option<Event>, DecodeError>;
}

/// Peripheral vendor command decoders (nl80211, QCA/WMI) emit a generic
/// payload shape rather than a first-class `EventType` variant, per
/// spec.md §1's "only the event shape they emit is specified".
pub trait VendorDecoder: Send {
    fn decode_vendor(&mut self, raw: &[u8]) -> Result<Option<GenericPayload>, DecodeError>;
}
