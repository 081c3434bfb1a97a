//! Composite storage sink: buffer, database, and audit log, each
//! optional by configuration (§4.11).

use std::sync::Arc;

use parking_lot::Mutex;
use sentinel_model::Event;
use tracing::warn;

use super::audit::{AuditLog, AuditSeverity};
use super::database::EventDatabase;
use super::retention::RetentionPolicy;

struct RecentBuffer {
    events: Vec<Event>,
    capacity: usize,
    next: usize,
}

impl RecentBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
            next: 0,
        }
    }

    fn push(&mut self, event: Event) {
        if self.events.len() < self.capacity {
            self.events.push(event);
        } else {
            self.events[self.next] = event;
            self.next = (self.next + 1) % self.capacity;
        }
    }
}

/// Which sinks are wired in; each is independently optional.
pub struct StorageLayer {
    buffer: Option<Mutex<RecentBuffer>>,
    db: Option<Arc<EventDatabase>>,
    audit: Option<Arc<AuditLog>>,
    security_audit: Option<Arc<AuditLog>>,
    retention: Option<RetentionPolicy>,
}

#[derive(Debug, Default)]
pub struct StorageLayerBuilder {
    buffer_capacity: Option<usize>,
    db: Option<Arc<EventDatabase>>,
    audit: Option<Arc<AuditLog>>,
    security_audit: Option<Arc<AuditLog>>,
}

impl StorageLayerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buffer(mut self, capacity: usize) -> Self {
        self.buffer_capacity = Some(capacity);
        self
    }

    pub fn with_database(mut self, db: Arc<EventDatabase>) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_audit_log(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_security_audit_log(mut self, audit: Arc<AuditLog>) -> Self {
        self.security_audit = Some(audit);
        self
    }

    pub fn build(self, retention: Option<RetentionPolicy>) -> StorageLayer {
        StorageLayer {
            buffer: self.buffer_capacity.map(|cap| Mutex::new(RecentBuffer::new(cap))),
            db: self.db,
            audit: self.audit,
            security_audit: self.security_audit,
            retention,
        }
    }
}

impl StorageLayer {
    /// Stores `event` across every configured sink. Consults the
    /// retention policy first: events older than its horizon are
    /// silently accepted without being persisted anywhere. Returns
    /// `false` if any configured sink failed, even though the others
    /// may have succeeded.
    pub async fn store(&self, event: &Event, is_security: bool) -> bool {
        if let Some(retention) = &self.retention {
            let max_age_s = retention.max_age_s();
            if max_age_s > 0 {
                let now = now_unix();
                if now - event.timestamp > max_age_s as i64 {
                    return true;
                }
            }
        }

        let mut ok = true;

        if let Some(buffer) = &self.buffer {
            buffer.lock().push(event.clone());
        }

        if let Some(db) = &self.db {
            if let Err(e) = db.insert(event.clone(), is_security).await {
                warn!(error = %e, "event database insert failed");
                ok = false;
            }
        }

        let severity = if is_security {
            AuditSeverity::Security
        } else {
            AuditSeverity::Info
        };
        if let Some(audit) = &self.audit {
            if let Err(e) = audit.append(&audit_message(event), severity, event.timestamp) {
                warn!(error = %e, "audit log append failed");
                ok = false;
            }
        }
        if is_security {
            if let Some(security_audit) = &self.security_audit {
                if let Err(e) =
                    security_audit.append(&audit_message(event), AuditSeverity::Security, event.timestamp)
                {
                    warn!(error = %e, "security audit log append failed");
                    ok = false;
                }
            }
        }

        ok
    }

    pub async fn flush(&self) -> bool {
        match &self.db {
            Some(db) => db.flush().await.is_ok(),
            None => true,
        }
    }

    pub fn database(&self) -> Option<&Arc<EventDatabase>> {
        self.db.as_ref()
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn audit_message(event: &Event) -> String {
    format!(
        "{} {} iface={} seq={}",
        event.event_type, event.message_type, event.interface, event.sequence
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_model::{EventType, IfaceName, Payload};

    fn event() -> Event {
        Event::new(EventType::Link, 16, 1, Payload::Empty)
            .with_interface(IfaceName::new("eth0").unwrap())
    }

    #[tokio::test]
    async fn store_with_only_audit_configured_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let audit = Arc::new(AuditLog::open(dir.path().join("a.log"), 0, 5, false).unwrap());
        let layer = StorageLayerBuilder::new().with_audit_log(audit).build(None);

        assert!(layer.store(&event(), false).await);
    }

    #[tokio::test]
    async fn store_with_no_sinks_configured_is_a_noop_success() {
        let layer = StorageLayerBuilder::new().build(None);
        assert!(layer.store(&event(), false).await);
    }

    #[tokio::test]
    async fn store_writes_security_events_to_the_security_log_too() {
        let dir = tempfile::tempdir().unwrap();
        let audit = Arc::new(AuditLog::open(dir.path().join("a.log"), 0, 5, false).unwrap());
        let security = Arc::new(AuditLog::open(dir.path().join("s.log"), 0, 5, false).unwrap());
        let layer = StorageLayerBuilder::new()
            .with_audit_log(audit)
            .with_security_audit_log(security.clone())
            .build(None);

        assert!(layer.store(&event(), true).await);

        let (ok, _) = super::super::audit::verify(dir.path().join("s.log")).unwrap();
        assert!(ok);
    }
}
