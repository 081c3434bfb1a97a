//! Circular buffer of recent events bounded by both capacity and a
//! time horizon (§3, §4.7).

use parking_lot::Mutex;
use sentinel_model::{Event, EventType};

struct Slot {
    event: Event,
    timestamp: i64,
    valid: bool,
}

struct Inner {
    slots: Vec<Option<Slot>>,
    head: usize,
    tail: usize,
    count: usize,
}

/// All operations are mutex-protected; capacity is fixed at
/// construction and the horizon can be adjusted afterward.
pub struct TimeWindow {
    inner: Mutex<Inner>,
    capacity: usize,
    horizon_seconds: i64,
}

impl TimeWindow {
    pub fn new(capacity: usize, horizon_seconds: i64) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                slots: (0..capacity).map(|_| None).collect(),
                head: 0,
                tail: 0,
                count: 0,
            }),
            capacity,
            horizon_seconds,
        }
    }

    /// Insert at the tail; if full, overwrites the head and advances it.
    pub fn add(&self, event: Event, timestamp: i64) {
        let mut inner = self.inner.lock();
        let head = inner.head;
        let capacity = self.capacity;

        inner.slots[head] = Some(Slot {
            event,
            timestamp,
            valid: true,
        });
        inner.head = (head + 1) % capacity;

        if inner.count == capacity {
            inner.tail = (inner.tail + 1) % capacity;
        } else {
            inner.count += 1;
        }
    }

    /// Sweeps from the tail while `now - entry.timestamp > horizon`,
    /// marking entries invalid and advancing the tail. Returns the
    /// number expired.
    pub fn expire(&self, now: i64) -> usize {
        let mut inner = self.inner.lock();
        let mut expired = 0;
        let capacity = self.capacity;

        while inner.count > 0 {
            let idx = inner.tail;
            let still_live = inner.slots[idx]
                .as_ref()
                .map(|s| now - s.timestamp <= self.horizon_seconds)
                .unwrap_or(false);

            if still_live {
                break;
            }

            if let Some(slot) = inner.slots[idx].as_mut() {
                slot.valid = false;
            }
            inner.tail = (idx + 1) % capacity;
            inner.count -= 1;
            expired += 1;
        }
        expired
    }

    /// Scans valid entries in insertion order, filtering by the
    /// non-empty criteria given, up to `out`'s capacity.
    pub fn query(
        &self,
        event_type: Option<EventType>,
        interface: Option<&str>,
        out: &mut Vec<Event>,
        cap: usize,
    ) {
        let inner = self.inner.lock();
        let capacity = self.capacity;

        for i in 0..inner.count {
            if out.len() >= cap {
                break;
            }
            let idx = (inner.tail + i) % capacity;
            let Some(slot) = inner.slots[idx].as_ref() else {
                continue;
            };
            if !slot.valid {
                continue;
            }
            if let Some(et) = event_type {
                if slot.event.event_type != et {
                    continue;
                }
            }
            if let Some(iface) = interface {
                if slot.event.interface.as_str() != iface {
                    continue;
                }
            }
            out.push(slot.event.clone());
        }
    }

    pub fn count(&self) -> usize {
        self.inner.lock().count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeWindow")
            .field("capacity", &self.capacity)
            .field("horizon_seconds", &self.horizon_seconds)
            .field("count", &self.count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_model::Payload;

    fn event() -> Event {
        Event::new(EventType::Link, 16, 0, Payload::Empty)
    }

    #[test]
    fn overwrites_head_when_full() {
        let window = TimeWindow::new(2, 3600);
        window.add(event(), 1);
        window.add(event(), 2);
        window.add(event(), 3); // overwrites the ts=1 entry
        assert_eq!(window.count(), 2);

        let mut out = Vec::new();
        window.query(None, None, &mut out, 10);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn expire_sweeps_entries_past_horizon() {
        let window = TimeWindow::new(4, 10);
        window.add(event(), 0);
        window.add(event(), 5);
        window.add(event(), 20);

        let expired = window.expire(20);
        assert_eq!(expired, 2, "only the ts=0 and ts=5 entries are past the horizon");
        assert_eq!(window.count(), 1);
    }

    #[test]
    fn query_filters_by_event_type_and_interface() {
        let window = TimeWindow::new(4, 3600);
        let mut link = event();
        link.interface = sentinel_model::IfaceName::new("eth0").unwrap();
        window.add(link, 1);

        let mut route = Event::new(EventType::Route, 24, 0, Payload::Empty);
        route.interface = sentinel_model::IfaceName::new("eth1").unwrap();
        window.add(route, 2);

        let mut out = Vec::new();
        window.query(Some(EventType::Link), None, &mut out, 10);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].event_type, EventType::Link);

        let mut out2 = Vec::new();
        window.query(None, Some("eth1"), &mut out2, 10);
        assert_eq!(out2.len(), 1);
        assert_eq!(out2[0].interface.as_str(), "eth1");
    }
}
