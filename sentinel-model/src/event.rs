//! The canonical [`Event`] record and its variant payloads (§3).

use crate::error::{ModelError, Result};
use crate::field::FieldValue;
use serde::{Deserialize, Serialize};

/// Maximum size, in bytes, of an interface name (kernel `IFNAMSIZ`).
pub const IFACE_NAME_MAX: usize = 16;

/// Maximum size, in bytes, of a payload's variable-length fields (attribute
/// lists, raw captures) before the event is rejected at the processor
/// boundary. See §3 "payload ... size-bounded".
pub const PAYLOAD_MAX_BYTES: usize = 64 * 1024;

/// A bounded interface name, as the kernel truncates it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct IfaceName(String);

impl IfaceName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.len() > IFACE_NAME_MAX {
            return Err(ModelError::InterfaceNameTooLong(name));
        }
        Ok(Self(name))
    }

    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for IfaceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse event category (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Link,
    Address,
    Route,
    Neighbor,
    Rule,
    SockDiag,
    Generic,
    Conntrack,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Link => "link",
            EventType::Address => "address",
            EventType::Route => "route",
            EventType::Neighbor => "neighbor",
            EventType::Rule => "rule",
            EventType::SockDiag => "sock_diag",
            EventType::Generic => "generic",
            EventType::Conntrack => "conntrack",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// `AF_*` protocol family value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtocolFamily(pub u8);

impl ProtocolFamily {
    pub const UNSPEC: ProtocolFamily = ProtocolFamily(0);
    pub const INET: ProtocolFamily = ProtocolFamily(2);
    pub const INET6: ProtocolFamily = ProtocolFamily(10);
    pub const NETLINK: ProtocolFamily = ProtocolFamily(16);
    pub const BRIDGE: ProtocolFamily = ProtocolFamily(7);
}

/// Interface flags relevant to detection (`IFF_*` subset used by the
/// security detector and the filter language). A thin newtype over the
/// raw kernel bitmask rather than a `bitflags` dependency, since the
/// daemon only ever tests a handful of bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct LinkFlags(u32);

impl LinkFlags {
    pub const UP: LinkFlags = LinkFlags(1 << 0);
    pub const BROADCAST: LinkFlags = LinkFlags(1 << 1);
    pub const DEBUG: LinkFlags = LinkFlags(1 << 2);
    pub const LOOPBACK: LinkFlags = LinkFlags(1 << 3);
    pub const POINTOPOINT: LinkFlags = LinkFlags(1 << 4);
    pub const RUNNING: LinkFlags = LinkFlags(1 << 6);
    pub const NOARP: LinkFlags = LinkFlags(1 << 7);
    pub const PROMISC: LinkFlags = LinkFlags(1 << 8);
    pub const MULTICAST: LinkFlags = LinkFlags(1 << 12);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, flag: LinkFlags) -> bool {
        self.0 & flag.0 == flag.0
    }
}

impl std::ops::BitOr for LinkFlags {
    type Output = LinkFlags;
    fn bitor(self, rhs: LinkFlags) -> LinkFlags {
        LinkFlags(self.0 | rhs.0)
    }
}

/// RTM_NEWLINK / RTM_DELLINK payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkPayload {
    pub ifindex: i32,
    pub flags: LinkFlags,
    pub mtu: Option<u32>,
    pub link_kind: Option<String>,
    pub mac_address: Option<String>,
}

/// RTM_NEWADDR / RTM_DELADDR payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressPayload {
    pub ifindex: i32,
    pub address: String,
    pub prefix_len: u8,
    pub scope: u8,
    pub is_secondary: bool,
}

/// RTM_NEWROUTE / RTM_DELROUTE payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePayload {
    pub destination: String,
    pub prefix_len: u8,
    pub gateway: Option<String>,
    pub oif_index: Option<i32>,
    pub table: u32,
    pub protocol: u8,
    pub is_default: bool,
}

/// RTM_NEWNEIGH / RTM_DELNEIGH payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborPayload {
    pub ifindex: i32,
    pub destination: String,
    pub lladdr: Option<String>,
    pub state: u16,
}

/// RTM_NEWRULE / RTM_DELRULE payload (policy routing rules).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulePayload {
    pub table: u32,
    pub priority: u32,
    pub src: Option<String>,
    pub dst: Option<String>,
}

/// `SOCK_DIAG` tuple payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SockDiagPayload {
    pub family: u8,
    pub protocol: u8,
    pub state: u8,
    pub local_addr: String,
    pub local_port: u16,
    pub remote_addr: String,
    pub remote_port: u16,
    pub inode: u32,
}

/// Conntrack tuple payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConntrackPayload {
    pub protocol: u8,
    pub src: String,
    pub dst: String,
    pub src_port: u16,
    pub dst_port: u16,
    pub state: Option<String>,
    pub mark: u32,
}

/// Generic netlink command payload (covers `nl80211` and QCA/WMI vendor
/// commands — the core only carries the decoded shape; see spec.md §1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericPayload {
    pub cmd: u32,
    pub vendor_id: Option<u32>,
    pub vendor_subcmd: Option<u32>,
    pub attrs: Vec<(String, String)>,
}

/// The payload, variant over [`EventType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Link(LinkPayload),
    Address(AddressPayload),
    Route(RoutePayload),
    Neighbor(NeighborPayload),
    Rule(RulePayload),
    SockDiag(SockDiagPayload),
    Generic(GenericPayload),
    Conntrack(ConntrackPayload),
    /// Decoder had no structured payload for this message.
    Empty,
}

/// The canonical record passed through the pipeline (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Assigned by the dispatcher on acceptance; 0 until then.
    pub sequence: u64,
    /// Wall-clock seconds (UTC) at decode time.
    pub timestamp: i64,
    pub event_type: EventType,
    pub message_type: u16,
    pub interface: IfaceName,
    pub namespace: Option<String>,
    pub protocol_family: ProtocolFamily,
    pub payload: Payload,
    pub raw: Option<Vec<u8>>,
}

impl Event {
    pub fn new(
        event_type: EventType,
        message_type: u16,
        timestamp: i64,
        payload: Payload,
    ) -> Self {
        Self {
            sequence: 0,
            timestamp,
            event_type,
            message_type,
            interface: IfaceName::empty(),
            namespace: None,
            protocol_family: ProtocolFamily::UNSPEC,
            payload,
            raw: None,
        }
    }

    /// A zeroed record suitable for seeding an object pool's free-list.
    pub fn empty() -> Self {
        Self::new(EventType::Generic, 0, 0, Payload::Empty)
    }

    /// Reset to the zeroed state, releasing any owned payload, so the
    /// record can be recycled by an object pool.
    pub fn clear(&mut self) {
        *self = Self::empty();
    }

    pub fn with_interface(mut self, iface: IfaceName) -> Self {
        self.interface = iface;
        self
    }

    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = Some(ns.into());
        self
    }

    pub fn with_raw(mut self, raw: Vec<u8>) -> Self {
        self.raw = Some(raw);
        self
    }

    /// Validate size bounds on variable-length fields. Called by the
    /// event processor before it deep-copies the payload into the pool.
    pub fn validate_size(&self) -> Result<()> {
        if let Some(raw) = &self.raw {
            if raw.len() > PAYLOAD_MAX_BYTES {
                return Err(ModelError::PayloadTooLarge {
                    max: PAYLOAD_MAX_BYTES,
                    got: raw.len(),
                });
            }
        }
        if let Payload::Generic(g) = &self.payload {
            let size: usize = g.attrs.iter().map(|(k, v)| k.len() + v.len()).sum();
            if size > PAYLOAD_MAX_BYTES {
                return Err(ModelError::PayloadTooLarge {
                    max: PAYLOAD_MAX_BYTES,
                    got: size,
                });
            }
        }
        Ok(())
    }

    /// Resolve a dotted field path (`interface`, `link.flags.promisc`,
    /// `route.gateway`, ...) used by the filter language (§4.5). Unknown
    /// fields and fields on the wrong variant both resolve to
    /// [`FieldValue::Missing`] — the evaluator treats that as a mismatch,
    /// never an error.
    pub fn field(&self, path: &str) -> FieldValue {
        let mut parts = path.splitn(2, '.');
        let head = parts.next().unwrap_or("");
        let rest = parts.next();

        match (head, rest) {
            ("sequence", None) => FieldValue::Int(self.sequence as i64),
            ("timestamp", None) => FieldValue::Int(self.timestamp),
            ("event_type", None) => FieldValue::Str(self.event_type.as_str().to_string()),
            ("message_type", None) => FieldValue::Int(self.message_type as i64),
            ("interface", None) => FieldValue::Str(self.interface.as_str().to_string()),
            ("namespace", None) => FieldValue::from(self.namespace.clone()),
            ("protocol_family", None) => FieldValue::Int(self.protocol_family.0 as i64),
            ("link", Some(sub)) => self.link_field(sub),
            ("addr", Some(sub)) => self.addr_field(sub),
            ("route", Some(sub)) => self.route_field(sub),
            ("neigh", Some(sub)) => self.neigh_field(sub),
            ("rule", Some(sub)) => self.rule_field(sub),
            ("diag", Some(sub)) => self.diag_field(sub),
            ("conntrack", Some(sub)) => self.conntrack_field(sub),
            ("nl80211", Some(sub)) | ("qca", Some(sub)) => self.generic_field(sub),
            _ => FieldValue::Missing,
        }
    }

    fn link_field(&self, sub: &str) -> FieldValue {
        let Payload::Link(l) = &self.payload else {
            return FieldValue::Missing;
        };
        match sub {
            "ifindex" => FieldValue::Int(l.ifindex as i64),
            "mtu" => FieldValue::from(l.mtu),
            "link_kind" => FieldValue::from(l.link_kind.clone()),
            "mac_address" => FieldValue::from(l.mac_address.clone()),
            "flags.promisc" => FieldValue::Bool(l.flags.contains(LinkFlags::PROMISC)),
            "flags.up" => FieldValue::Bool(l.flags.contains(LinkFlags::UP)),
            "flags.running" => FieldValue::Bool(l.flags.contains(LinkFlags::RUNNING)),
            "flags.raw" => FieldValue::Int(l.flags.bits() as i64),
            _ => FieldValue::Missing,
        }
    }

    fn addr_field(&self, sub: &str) -> FieldValue {
        let Payload::Address(a) = &self.payload else {
            return FieldValue::Missing;
        };
        match sub {
            "ifindex" => FieldValue::Int(a.ifindex as i64),
            "address" => FieldValue::Str(a.address.clone()),
            "prefix_len" => FieldValue::Int(a.prefix_len as i64),
            "scope" => FieldValue::Int(a.scope as i64),
            "is_secondary" => FieldValue::Bool(a.is_secondary),
            _ => FieldValue::Missing,
        }
    }

    fn route_field(&self, sub: &str) -> FieldValue {
        let Payload::Route(r) = &self.payload else {
            return FieldValue::Missing;
        };
        match sub {
            "destination" => FieldValue::Str(r.destination.clone()),
            "prefix_len" => FieldValue::Int(r.prefix_len as i64),
            "gateway" => FieldValue::from(r.gateway.clone()),
            "oif_index" => FieldValue::from(r.oif_index.map(|v| v as i64)),
            "table" => FieldValue::Int(r.table as i64),
            "protocol" => FieldValue::Int(r.protocol as i64),
            "is_default" => FieldValue::Bool(r.is_default),
            _ => FieldValue::Missing,
        }
    }

    fn neigh_field(&self, sub: &str) -> FieldValue {
        let Payload::Neighbor(n) = &self.payload else {
            return FieldValue::Missing;
        };
        match sub {
            "ifindex" => FieldValue::Int(n.ifindex as i64),
            "destination" => FieldValue::Str(n.destination.clone()),
            "lladdr" => FieldValue::from(n.lladdr.clone()),
            "state" => FieldValue::Int(n.state as i64),
            _ => FieldValue::Missing,
        }
    }

    fn rule_field(&self, sub: &str) -> FieldValue {
        let Payload::Rule(r) = &self.payload else {
            return FieldValue::Missing;
        };
        match sub {
            "table" => FieldValue::Int(r.table as i64),
            "priority" => FieldValue::Int(r.priority as i64),
            "src" => FieldValue::from(r.src.clone()),
            "dst" => FieldValue::from(r.dst.clone()),
            _ => FieldValue::Missing,
        }
    }

    fn diag_field(&self, sub: &str) -> FieldValue {
        let Payload::SockDiag(d) = &self.payload else {
            return FieldValue::Missing;
        };
        match sub {
            "family" => FieldValue::Int(d.family as i64),
            "protocol" => FieldValue::Int(d.protocol as i64),
            "state" => FieldValue::Int(d.state as i64),
            "local_addr" => FieldValue::Str(d.local_addr.clone()),
            "local_port" => FieldValue::Int(d.local_port as i64),
            "remote_addr" => FieldValue::Str(d.remote_addr.clone()),
            "remote_port" => FieldValue::Int(d.remote_port as i64),
            "inode" => FieldValue::Int(d.inode as i64),
            _ => FieldValue::Missing,
        }
    }

    fn conntrack_field(&self, sub: &str) -> FieldValue {
        let Payload::Conntrack(c) = &self.payload else {
            return FieldValue::Missing;
        };
        match sub {
            "protocol" => FieldValue::Int(c.protocol as i64),
            "src" => FieldValue::Str(c.src.clone()),
            "dst" => FieldValue::Str(c.dst.clone()),
            "src_port" => FieldValue::Int(c.src_port as i64),
            "dst_port" => FieldValue::Int(c.dst_port as i64),
            "state" => FieldValue::from(c.state.clone()),
            "mark" => FieldValue::Int(c.mark as i64),
            _ => FieldValue::Missing,
        }
    }

    fn generic_field(&self, sub: &str) -> FieldValue {
        let Payload::Generic(g) = &self.payload else {
            return FieldValue::Missing;
        };
        match sub {
            "cmd" => FieldValue::Int(g.cmd as i64),
            "vendor_id" => FieldValue::from(g.vendor_id.map(|v| v as i64)),
            "vendor_subcmd" => FieldValue::from(g.vendor_subcmd.map(|v| v as i64)),
            attr => g
                .attrs
                .iter()
                .find(|(k, _)| k == attr)
                .map(|(_, v)| FieldValue::Str(v.clone()))
                .unwrap_or(FieldValue::Missing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link_event() -> Event {
        Event::new(
            EventType::Link,
            16, // RTM_NEWLINK
            1_700_000_000,
            Payload::Link(LinkPayload {
                ifindex: 2,
                flags: LinkFlags::UP | LinkFlags::RUNNING | LinkFlags::PROMISC,
                mtu: Some(1500),
                link_kind: Some("veth".to_string()),
                mac_address: None,
            }),
        )
        .with_interface(IfaceName::new("eth0").unwrap())
    }

    #[test]
    fn interface_name_rejects_overlong() {
        assert!(IfaceName::new("this-name-is-way-too-long-for-ifnamsiz").is_err());
    }

    #[test]
    fn field_resolves_top_level_and_nested() {
        let e = link_event();
        assert_eq!(e.field("interface"), FieldValue::Str("eth0".to_string()));
        assert_eq!(e.field("event_type"), FieldValue::Str("link".to_string()));
        assert_eq!(e.field("link.flags.promisc"), FieldValue::Bool(true));
        assert_eq!(e.field("link.mtu"), FieldValue::Int(1500));
    }

    #[test]
    fn field_on_wrong_variant_is_missing_not_panic() {
        let e = link_event();
        assert_eq!(e.field("route.gateway"), FieldValue::Missing);
        assert_eq!(e.field("nonexistent.path"), FieldValue::Missing);
    }

    #[test]
    fn validate_size_rejects_oversized_raw() {
        let mut e = link_event();
        e.raw = Some(vec![0u8; PAYLOAD_MAX_BYTES + 1]);
        assert!(e.validate_size().is_err());
    }
}
