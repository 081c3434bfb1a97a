//! The four built-in security detectors, specializations of the
//! correlation engine's windowing rather than generic rules (§4.9).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use sentinel_model::{Event, EventType, LinkFlags, Payload};

use super::super::time_window::TimeWindow;

const RTM_NEWLINK: u16 = 16;
const RTM_DELLINK: u16 = 17;
const RTM_NEWROUTE: u16 = 24;
const RTM_NEWNEIGH: u16 = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SecuritySeverity {
    Info,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityAlertKind {
    PromiscuousMode,
    ArpFlood,
    RouteHijack,
    InterfaceStorm,
}

#[derive(Debug, Clone)]
pub struct SecurityAlert {
    pub kind: SecurityAlertKind,
    pub severity: SecuritySeverity,
    pub interface: String,
    pub message: String,
    pub timestamp: i64,
}

type Callback = Box<dyn Fn(&SecurityAlert) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub arp_flood_window_s: i64,
    pub arp_flood_threshold: usize,
    pub interface_storm_window_s: i64,
    pub interface_storm_threshold: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            arp_flood_window_s: 10,
            arp_flood_threshold: 50,
            interface_storm_window_s: 10,
            interface_storm_threshold: 20,
        }
    }
}

struct RouteRecord {
    gateway: Option<String>,
}

/// Stateful detection over the four named threat patterns. Each
/// detector keeps its own small window rather than sharing one with
/// the generic [`super::engine::CorrelationEngine`], since their
/// grouping keys (interface vs. route prefix) differ.
pub struct SecurityDetector {
    config: SecurityConfig,
    neighbor_window: TimeWindow,
    link_window: TimeWindow,
    route_table: Mutex<HashMap<(String, u8), RouteRecord>>,
    callbacks: DashMap<u64, Callback>,
    next_callback_id: AtomicU64,
}

impl SecurityDetector {
    pub fn new(config: SecurityConfig) -> Self {
        Self {
            neighbor_window: TimeWindow::new(4096, config.arp_flood_window_s),
            link_window: TimeWindow::new(4096, config.interface_storm_window_s),
            config,
            route_table: Mutex::new(HashMap::new()),
            callbacks: DashMap::new(),
            next_callback_id: AtomicU64::new(1),
        }
    }

    /// Returns an id usable with [`Self::unregister`].
    pub fn register(&self, callback: Callback) -> u64 {
        let id = self.next_callback_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks.insert(id, callback);
        id
    }

    /// Idempotent: unregistering an unknown or already-removed id is
    /// not an error, it simply returns `false`.
    pub fn unregister(&self, id: u64) -> bool {
        self.callbacks.remove(&id).is_some()
    }

    pub fn process(&self, event: &Event) -> Vec<SecurityAlert> {
        let mut alerts = Vec::new();
        alerts.extend(self.check_promiscuous_mode(event));
        alerts.extend(self.check_arp_flood(event));
        alerts.extend(self.check_route_hijack(event));
        alerts.extend(self.check_interface_storm(event));

        for alert in &alerts {
            for entry in self.callbacks.iter() {
                (entry.value())(alert);
            }
        }
        alerts
    }

    fn check_promiscuous_mode(&self, event: &Event) -> Option<SecurityAlert> {
        if event.event_type != EventType::Link || event.message_type != RTM_NEWLINK {
            return None;
        }
        let Payload::Link(link) = &event.payload else {
            return None;
        };
        if !link.flags.contains(LinkFlags::PROMISC) {
            return None;
        }
        Some(SecurityAlert {
            kind: SecurityAlertKind::PromiscuousMode,
            severity: SecuritySeverity::Medium,
            interface: event.interface.as_str().to_string(),
            message: format!("interface {} entered promiscuous mode", event.interface),
            timestamp: event.timestamp,
        })
    }

    fn check_arp_flood(&self, event: &Event) -> Option<SecurityAlert> {
        if event.event_type != EventType::Neighbor || event.message_type != RTM_NEWNEIGH {
            return None;
        }
        self.neighbor_window.add(event.clone(), event.timestamp);
        self.neighbor_window.expire(event.timestamp);

        let mut matches = Vec::new();
        self.neighbor_window.query(
            Some(EventType::Neighbor),
            Some(event.interface.as_str()),
            &mut matches,
            usize::MAX,
        );

        if matches.len() < self.config.arp_flood_threshold {
            return None;
        }
        Some(SecurityAlert {
            kind: SecurityAlertKind::ArpFlood,
            severity: SecuritySeverity::High,
            interface: event.interface.as_str().to_string(),
            message: format!(
                "{} neighbor updates on {} within {}s",
                matches.len(),
                event.interface,
                self.config.arp_flood_window_s
            ),
            timestamp: event.timestamp,
        })
    }

    fn check_route_hijack(&self, event: &Event) -> Option<SecurityAlert> {
        if event.event_type != EventType::Route || event.message_type != RTM_NEWROUTE {
            return None;
        }
        let Payload::Route(route) = &event.payload else {
            return None;
        };
        let key = (route.destination.clone(), route.prefix_len);
        let mut table = self.route_table.lock();

        let alert = match table.get(&key) {
            Some(existing) if existing.gateway != route.gateway => Some(SecurityAlert {
                kind: SecurityAlertKind::RouteHijack,
                severity: SecuritySeverity::High,
                interface: event.interface.as_str().to_string(),
                message: format!(
                    "route {}/{} gateway changed from {:?} to {:?}",
                    route.destination, route.prefix_len, existing.gateway, route.gateway
                ),
                timestamp: event.timestamp,
            }),
            _ => None,
        };

        table.insert(
            key,
            RouteRecord {
                gateway: route.gateway.clone(),
            },
        );
        alert
    }

    fn check_interface_storm(&self, event: &Event) -> Option<SecurityAlert> {
        if event.event_type != EventType::Link
            || !(event.message_type == RTM_NEWLINK || event.message_type == RTM_DELLINK)
        {
            return None;
        }
        self.link_window.add(event.clone(), event.timestamp);
        self.link_window.expire(event.timestamp);

        let mut matches = Vec::new();
        self.link_window.query(
            Some(EventType::Link),
            Some(event.interface.as_str()),
            &mut matches,
            usize::MAX,
        );

        if matches.len() < self.config.interface_storm_threshold {
            return None;
        }
        Some(SecurityAlert {
            kind: SecurityAlertKind::InterfaceStorm,
            severity: SecuritySeverity::Medium,
            interface: event.interface.as_str().to_string(),
            message: format!(
                "{} link state changes on {} within {}s",
                matches.len(),
                event.interface,
                self.config.interface_storm_window_s
            ),
            timestamp: event.timestamp,
        })
    }
}

impl std::fmt::Debug for SecurityDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityDetector")
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_model::{IfaceName, LinkPayload, NeighborPayload, RoutePayload};

    fn link_event(ts: i64, flags: LinkFlags, message_type: u16) -> Event {
        Event::new(
            EventType::Link,
            message_type,
            ts,
            Payload::Link(LinkPayload {
                ifindex: 2,
                flags,
                mtu: Some(1500),
                link_kind: None,
                mac_address: None,
            }),
        )
        .with_interface(IfaceName::new("eth0").unwrap())
    }

    fn neighbor_event(ts: i64) -> Event {
        Event::new(
            EventType::Neighbor,
            RTM_NEWNEIGH,
            ts,
            Payload::Neighbor(NeighborPayload {
                ifindex: 2,
                destination: "10.0.0.1".into(),
                lladdr: None,
                state: 0,
            }),
        )
        .with_interface(IfaceName::new("eth0").unwrap())
    }

    fn route_event(ts: i64, gateway: Option<&str>) -> Event {
        Event::new(
            EventType::Route,
            RTM_NEWROUTE,
            ts,
            Payload::Route(RoutePayload {
                destination: "0.0.0.0".into(),
                prefix_len: 0,
                gateway: gateway.map(|g| g.to_string()),
                oif_index: Some(2),
                table: 254,
                protocol: 0,
                is_default: true,
            }),
        )
        .with_interface(IfaceName::new("eth0").unwrap())
    }

    #[test]
    fn promiscuous_mode_triggers_medium_alert() {
        let detector = SecurityDetector::new(SecurityConfig::default());
        let alerts = detector.process(&link_event(0, LinkFlags::PROMISC, RTM_NEWLINK));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, SecurityAlertKind::PromiscuousMode);
        assert_eq!(alerts[0].severity, SecuritySeverity::Medium);
    }

    #[test]
    fn arp_flood_fires_once_threshold_crossed() {
        let detector = SecurityDetector::new(SecurityConfig {
            arp_flood_threshold: 3,
            ..SecurityConfig::default()
        });
        assert!(detector.process(&neighbor_event(0)).is_empty());
        assert!(detector.process(&neighbor_event(1)).is_empty());
        let alerts = detector.process(&neighbor_event(2));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, SecurityAlertKind::ArpFlood);
    }

    #[test]
    fn route_hijack_detects_gateway_change() {
        let detector = SecurityDetector::new(SecurityConfig::default());
        assert!(detector.process(&route_event(0, Some("192.168.1.1"))).is_empty());
        let alerts = detector.process(&route_event(1, Some("10.0.0.254")));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, SecurityAlertKind::RouteHijack);
    }

    #[test]
    fn interface_storm_fires_once_threshold_crossed() {
        let detector = SecurityDetector::new(SecurityConfig {
            interface_storm_threshold: 2,
            ..SecurityConfig::default()
        });
        assert!(detector
            .process(&link_event(0, LinkFlags::UP, RTM_NEWLINK))
            .is_empty());
        let alerts = detector.process(&link_event(1, LinkFlags::default(), RTM_DELLINK));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, SecurityAlertKind::InterfaceStorm);
    }

    #[test]
    fn unregister_is_idempotent() {
        let detector = SecurityDetector::new(SecurityConfig::default());
        let id = detector.register(Box::new(|_| {}));
        assert!(detector.unregister(id));
        assert!(!detector.unregister(id));
    }
}
