//! Sqlite-backed event store: batched inserts, indexed queries, and
//! maintenance (§4.12).

use parking_lot::Mutex;
use sentinel_model::{Event, EventType, Payload};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::error::{CoreError, Result};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sequence INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    event_type TEXT NOT NULL,
    message_type INTEGER NOT NULL,
    interface TEXT NOT NULL,
    namespace TEXT,
    protocol_family INTEGER NOT NULL,
    payload TEXT NOT NULL,
    is_security INTEGER NOT NULL DEFAULT 0
)
"#;

const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_events_event_type ON events(event_type)",
    "CREATE INDEX IF NOT EXISTS idx_events_interface ON events(interface)",
    "CREATE INDEX IF NOT EXISTS idx_events_namespace ON events(namespace)",
];

fn event_type_str(t: EventType) -> &'static str {
    t.as_str()
}

fn event_type_from_str(s: &str) -> EventType {
    match s {
        "link" => EventType::Link,
        "address" => EventType::Address,
        "route" => EventType::Route,
        "neighbor" => EventType::Neighbor,
        "rule" => EventType::Rule,
        "sock_diag" => EventType::SockDiag,
        "conntrack" => EventType::Conntrack,
        _ => EventType::Generic,
    }
}

/// Query parameters for [`EventDatabase::query`]; `None`/empty fields
/// are not applied as filters.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub interface_pattern: Option<String>,
    pub event_type: Option<EventType>,
    pub message_type: Option<u16>,
    pub namespace: Option<String>,
    pub start_ts: Option<i64>,
    pub end_ts: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub order_by: Option<String>,
    pub descending: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DatabaseStats {
    pub total_events: i64,
    pub db_size_bytes: i64,
    pub page_count: i64,
}

/// Owns the pool and an in-memory batch awaiting commit.
pub struct EventDatabase {
    pool: SqlitePool,
    batch: Mutex<Vec<(Event, bool)>>,
    batch_size: usize,
}

impl EventDatabase {
    pub async fn connect(url: &str, batch_size: usize) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(url)
            .await?;
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        for stmt in CREATE_INDEXES {
            sqlx::query(stmt).execute(&pool).await?;
        }
        Ok(Self {
            pool,
            batch: Mutex::new(Vec::with_capacity(batch_size)),
            batch_size: batch_size.max(1),
        })
    }

    /// Queue an event for insertion; flushes automatically once the
    /// batch reaches `batch_size`.
    pub async fn insert(&self, event: Event, is_security: bool) -> Result<()> {
        let should_flush = {
            let mut batch = self.batch.lock();
            batch.push((event, is_security));
            batch.len() >= self.batch_size
        };
        if should_flush {
            self.flush().await?;
        }
        Ok(())
    }

    /// Commits whatever is queued in a single transaction.
    pub async fn flush(&self) -> Result<()> {
        let pending: Vec<(Event, bool)> = {
            let mut batch = self.batch.lock();
            std::mem::take(&mut *batch)
        };
        if pending.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for (event, is_security) in &pending {
            let payload_json = serde_json::to_string(&event.payload)?;
            sqlx::query(
                "INSERT INTO events \
                 (sequence, timestamp, event_type, message_type, interface, namespace, protocol_family, payload, is_security) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(event.sequence as i64)
            .bind(event.timestamp)
            .bind(event_type_str(event.event_type))
            .bind(event.message_type as i64)
            .bind(event.interface.as_str())
            .bind(event.namespace.as_deref())
            .bind(event.protocol_family.0 as i64)
            .bind(payload_json)
            .bind(*is_security as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn query(&self, filter: &EventQuery) -> Result<Vec<Event>> {
        let mut sql = String::from(
            "SELECT sequence, timestamp, event_type, message_type, interface, namespace, protocol_family, payload FROM events WHERE 1=1",
        );
        if filter.interface_pattern.is_some() {
            sql.push_str(" AND interface LIKE ?");
        }
        if filter.event_type.is_some() {
            sql.push_str(" AND event_type = ?");
        }
        if filter.message_type.is_some() {
            sql.push_str(" AND message_type = ?");
        }
        if filter.namespace.is_some() {
            sql.push_str(" AND namespace = ?");
        }
        if filter.start_ts.is_some() {
            sql.push_str(" AND timestamp >= ?");
        }
        if filter.end_ts.is_some() {
            sql.push_str(" AND timestamp <= ?");
        }

        let order_col = match filter.order_by.as_deref() {
            Some("sequence") => "sequence",
            Some("event_type") => "event_type",
            Some("interface") => "interface",
            _ => "timestamp",
        };
        sql.push_str(&format!(
            " ORDER BY {order_col} {}",
            if filter.descending { "DESC" } else { "ASC" }
        ));
        if filter.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }
        if filter.offset.is_some() {
            sql.push_str(" OFFSET ?");
        }

        let mut query = sqlx::query(&sql);
        if let Some(pattern) = &filter.interface_pattern {
            query = query.bind(pattern);
        }
        if let Some(et) = filter.event_type {
            query = query.bind(event_type_str(et));
        }
        if let Some(mt) = filter.message_type {
            query = query.bind(mt as i64);
        }
        if let Some(ns) = &filter.namespace {
            query = query.bind(ns);
        }
        if let Some(ts) = filter.start_ts {
            query = query.bind(ts);
        }
        if let Some(ts) = filter.end_ts {
            query = query.bind(ts);
        }
        if let Some(limit) = filter.limit {
            query = query.bind(limit);
        }
        if let Some(offset) = filter.offset {
            query = query.bind(offset);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_event).collect()
    }

    pub async fn delete_before(&self, ts: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM events WHERE timestamp < ?")
            .bind(ts)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_oldest(&self, keep_count: i64) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM events WHERE id NOT IN \
             (SELECT id FROM events ORDER BY timestamp DESC LIMIT ?)",
        )
        .bind(keep_count)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn vacuum(&self) -> Result<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn analyze(&self) -> Result<()> {
        sqlx::query("ANALYZE").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn stats(&self) -> Result<DatabaseStats> {
        let total_events: i64 = sqlx::query("SELECT COUNT(*) AS n FROM events")
            .fetch_one(&self.pool)
            .await?
            .try_get("n")?;
        let page_count: i64 = sqlx::query("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;
        let page_size: i64 = sqlx::query("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;

        Ok(DatabaseStats {
            total_events,
            db_size_bytes: page_count * page_size,
            page_count,
        })
    }
}

impl std::fmt::Debug for EventDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDatabase")
            .field("batch_size", &self.batch_size)
            .field("pending", &self.batch.lock().len())
            .finish()
    }
}

fn row_to_event(row: &SqliteRow) -> Result<Event> {
    let event_type_raw: String = row.try_get("event_type")?;
    let payload_raw: String = row.try_get("payload")?;
    let payload: Payload = serde_json::from_str(&payload_raw).map_err(CoreError::from)?;

    let mut event = Event::new(
        event_type_from_str(&event_type_raw),
        row.try_get::<i64, _>("message_type")? as u16,
        row.try_get("timestamp")?,
        payload,
    );
    event.sequence = row.try_get::<i64, _>("sequence")? as u64;
    event.interface = sentinel_model::IfaceName::new(row.try_get::<String, _>("interface")?)
        .unwrap_or_else(|_| sentinel_model::IfaceName::empty());
    event.namespace = row.try_get("namespace")?;
    event.protocol_family = sentinel_model::ProtocolFamily(row.try_get::<i64, _>("protocol_family")? as u8);
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_model::IfaceName;

    fn sample_event(ts: i64, iface: &str) -> Event {
        Event::new(EventType::Link, 16, ts, Payload::Empty)
            .with_interface(IfaceName::new(iface).unwrap())
    }

    #[tokio::test]
    async fn insert_flushes_at_batch_size_and_queries_back() {
        let db = EventDatabase::connect("sqlite::memory:", 2).await.unwrap();
        db.insert(sample_event(1, "eth0"), false).await.unwrap();
        db.insert(sample_event(2, "eth0"), false).await.unwrap(); // triggers flush

        let stats = db.stats().await.unwrap();
        assert_eq!(stats.total_events, 2);

        let results = db
            .query(&EventQuery {
                interface_pattern: Some("eth%".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn delete_before_removes_older_rows() {
        let db = EventDatabase::connect("sqlite::memory:", 1).await.unwrap();
        db.insert(sample_event(1, "eth0"), false).await.unwrap();
        db.insert(sample_event(100, "eth0"), false).await.unwrap();

        let deleted = db.delete_before(50).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(db.stats().await.unwrap().total_events, 1);
    }

    #[tokio::test]
    async fn delete_oldest_keeps_the_most_recent() {
        let db = EventDatabase::connect("sqlite::memory:", 1).await.unwrap();
        for ts in 0..5 {
            db.insert(sample_event(ts, "eth0"), false).await.unwrap();
        }
        db.delete_oldest(2).await.unwrap();
        assert_eq!(db.stats().await.unwrap().total_events, 2);
    }
}
