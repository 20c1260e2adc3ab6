//! SQLite document store. Flows keep their inbound JSON verbatim in `doc`; the
//! indexed columns beside it exist for filtering only.

use super::FlowStore;
use crate::error::StoreError;
use crate::flow::{Alert, AlertStatus, FieldValue, FlowRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Type, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS flows (
    id TEXT PRIMARY KEY,
    received_at TEXT NOT NULL,
    timestamp TEXT,
    src_ip TEXT,
    dst_ip TEXT,
    protocol TEXT,
    doc TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_flows_timestamp ON flows(timestamp);
CREATE INDEX IF NOT EXISTS idx_flows_src_ip ON flows(src_ip);
CREATE INDEX IF NOT EXISTS idx_flows_dst_ip ON flows(dst_ip);
CREATE TABLE IF NOT EXISTS anomalies (
    id TEXT PRIMARY KEY,
    timestamp TEXT,
    src_ip TEXT,
    dst_ip TEXT,
    protocol TEXT,
    score REAL NOT NULL,
    model TEXT NOT NULL,
    features TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('new', 'acknowledged', 'resolved')),
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_anomalies_timestamp ON anomalies(timestamp);
CREATE INDEX IF NOT EXISTS idx_anomalies_status ON anomalies(status);
"#;

const ALERT_COLUMNS: &str =
    "id, timestamp, src_ip, dst_ip, protocol, score, model, features, status, created_at";

/// Rows returned by the top-sources/destinations aggregates.
const TOP_N: i64 = 10;

impl ToSql for AlertStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for AlertStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: StoreError| FromSqlError::Other(Box::new(e)))
    }
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn alert_from_row(row: &Row<'_>) -> rusqlite::Result<Alert> {
    Ok(Alert {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        src_ip: row.get(2)?,
        dst_ip: row.get(3)?,
        protocol: row.get(4)?,
        score: row.get(5)?,
        model: row.get(6)?,
        features: json_column(row, 7)?,
        status: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn counts(conn: &Connection, sql: &str) -> Result<Vec<(String, u64)>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![TOP_N], |r| {
        Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as u64))
    })?;
    let out = rows.collect::<Result<Vec<_>, _>>()?;
    Ok(out)
}

/// Flow filter. `since` is an inclusive lower bound on the flow's own
/// ISO-8601 timestamp, compared lexically.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowQuery {
    pub src_ip: Option<String>,
    pub dst_ip: Option<String>,
    pub protocol: Option<String>,
    pub since: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for FlowQuery {
    fn default() -> Self {
        Self {
            src_ip: None,
            dst_ip: None,
            protocol: None,
            since: None,
            limit: 100,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertQuery {
    pub status: Option<AlertStatus>,
    pub since: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for AlertQuery {
    fn default() -> Self {
        Self {
            status: None,
            since: None,
            limit: 100,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredFlow {
    pub id: String,
    pub received_at: DateTime<Utc>,
    pub flow: FlowRecord,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlertSummary {
    pub total: u64,
    pub new: u64,
    pub acknowledged: u64,
    pub resolved: u64,
    pub avg_score: f64,
}

/// Traffic profile over everything stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlowBaseline {
    pub total_flows: u64,
    pub total_alerts: u64,
    /// alerts / flows, 0 when no flows are stored
    pub anomaly_rate: f64,
    pub avg_bytes: f64,
    pub avg_packets: f64,
    pub avg_duration: f64,
    pub top_sources: Vec<(String, u64)>,
    pub top_destinations: Vec<(String, u64)>,
    pub protocols: Vec<(String, u64)>,
}

/// Single connection shared by the whole process; clones share it.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn write_flow(&self, flow: &FlowRecord) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let doc = serde_json::to_string(flow)?;
        self.conn()?.execute(
            "INSERT INTO flows (id, received_at, timestamp, src_ip, dst_ip, protocol, doc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                Utc::now(),
                flow.timestamp.as_ref().map(FieldValue::render),
                flow.src_ip.as_ref().map(FieldValue::render),
                flow.dst_ip.as_ref().map(FieldValue::render),
                flow.protocol.as_ref().map(FieldValue::render),
                doc
            ],
        )?;
        Ok(id)
    }

    pub fn write_alert(&self, alert: &Alert) -> Result<String, StoreError> {
        let features = serde_json::to_string(&alert.features)?;
        self.conn()?.execute(
            "INSERT INTO anomalies (id, timestamp, src_ip, dst_ip, protocol, score, model, features, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                alert.id,
                alert.timestamp,
                alert.src_ip,
                alert.dst_ip,
                alert.protocol,
                alert.score,
                alert.model,
                features,
                alert.status,
                alert.created_at
            ],
        )?;
        Ok(alert.id.clone())
    }

    /// Newest first.
    pub fn query_flows(&self, q: &FlowQuery) -> Result<Vec<StoredFlow>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, received_at, doc FROM flows
             WHERE (?1 IS NULL OR src_ip = ?1)
               AND (?2 IS NULL OR dst_ip = ?2)
               AND (?3 IS NULL OR upper(protocol) = upper(?3))
               AND (?4 IS NULL OR timestamp >= ?4)
             ORDER BY rowid DESC LIMIT ?5 OFFSET ?6",
        )?;
        let rows = stmt.query_map(
            params![
                q.src_ip,
                q.dst_ip,
                q.protocol,
                q.since,
                q.limit as i64,
                q.offset as i64
            ],
            |row| {
                Ok(StoredFlow {
                    id: row.get(0)?,
                    received_at: row.get(1)?,
                    flow: json_column(row, 2)?,
                })
            },
        )?;
        let flows = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(flows)
    }

    /// Newest first.
    pub fn query_alerts(&self, q: &AlertQuery) -> Result<Vec<Alert>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ALERT_COLUMNS} FROM anomalies
             WHERE (?1 IS NULL OR status = ?1)
               AND (?2 IS NULL OR timestamp >= ?2)
             ORDER BY rowid DESC LIMIT ?3 OFFSET ?4"
        ))?;
        let rows = stmt.query_map(
            params![q.status, q.since, q.limit as i64, q.offset as i64],
            alert_from_row,
        )?;
        let alerts = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(alerts)
    }

    pub fn get_alert(&self, id: &str) -> Result<Option<Alert>, StoreError> {
        let alert = self
            .conn()?
            .query_row(
                &format!("SELECT {ALERT_COLUMNS} FROM anomalies WHERE id = ?1"),
                params![id],
                alert_from_row,
            )
            .optional()?;
        Ok(alert)
    }

    /// Move an alert to `status`. Anything other than new, acknowledged or
    /// resolved is rejected before touching the database. Returns whether the
    /// alert exists.
    pub fn update_alert_status(&self, id: &str, status: &str) -> Result<bool, StoreError> {
        let status: AlertStatus = status.parse()?;
        let changed = self.conn()?.execute(
            "UPDATE anomalies SET status = ?1 WHERE id = ?2",
            params![status, id],
        )?;
        Ok(changed > 0)
    }

    pub fn alert_summary(&self) -> Result<AlertSummary, StoreError> {
        let conn = self.conn()?;
        let (total, avg_score): (i64, Option<f64>) = conn.query_row(
            "SELECT COUNT(*), AVG(score) FROM anomalies",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        let mut summary = AlertSummary {
            total: total as u64,
            avg_score: avg_score.unwrap_or(0.0),
            ..AlertSummary::default()
        };

        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM anomalies GROUP BY status")?;
        let rows = stmt.query_map([], |r| {
            Ok((r.get::<_, AlertStatus>(0)?, r.get::<_, i64>(1)? as u64))
        })?;
        for row in rows {
            let (status, n) = row?;
            match status {
                AlertStatus::New => summary.new = n,
                AlertStatus::Acknowledged => summary.acknowledged = n,
                AlertStatus::Resolved => summary.resolved = n,
            }
        }
        Ok(summary)
    }

    pub fn baseline(&self) -> Result<FlowBaseline, StoreError> {
        let conn = self.conn()?;
        let (total_flows, avg_bytes, avg_packets, avg_duration): (i64, Option<f64>, Option<f64>, Option<f64>) =
            conn.query_row(
                "SELECT COUNT(*),
                        AVG(CAST(json_extract(doc, '$.bytes') AS REAL)),
                        AVG(CAST(json_extract(doc, '$.packets') AS REAL)),
                        AVG(CAST(json_extract(doc, '$.duration') AS REAL))
                 FROM flows",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )?;
        let total_alerts: i64 = conn.query_row("SELECT COUNT(*) FROM anomalies", [], |r| r.get(0))?;

        Ok(FlowBaseline {
            total_flows: total_flows as u64,
            total_alerts: total_alerts as u64,
            anomaly_rate: if total_flows > 0 {
                total_alerts as f64 / total_flows as f64
            } else {
                0.0
            },
            avg_bytes: avg_bytes.unwrap_or(0.0),
            avg_packets: avg_packets.unwrap_or(0.0),
            avg_duration: avg_duration.unwrap_or(0.0),
            top_sources: counts(
                &conn,
                "SELECT src_ip, COUNT(*) AS n FROM flows WHERE src_ip IS NOT NULL
                 GROUP BY src_ip ORDER BY n DESC, src_ip LIMIT ?1",
            )?,
            top_destinations: counts(
                &conn,
                "SELECT dst_ip, COUNT(*) AS n FROM flows WHERE dst_ip IS NOT NULL
                 GROUP BY dst_ip ORDER BY n DESC, dst_ip LIMIT ?1",
            )?,
            protocols: counts(
                &conn,
                "SELECT upper(protocol) AS p, COUNT(*) AS n FROM flows WHERE protocol IS NOT NULL
                 GROUP BY p ORDER BY n DESC, p LIMIT ?1",
            )?,
        })
    }

    pub fn flow_count(&self) -> Result<u64, StoreError> {
        let n: i64 = self.conn()?.query_row("SELECT COUNT(*) FROM flows", [], |r| r.get(0))?;
        Ok(n as u64)
    }

    pub fn alert_count(&self) -> Result<u64, StoreError> {
        let n: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM anomalies", [], |r| r.get(0))?;
        Ok(n as u64)
    }
}

/// Writes run on the blocking pool so the runtime thread is never held by SQLite.
#[async_trait]
impl FlowStore for SqliteStore {
    async fn insert_flow(&self, flow: &FlowRecord) -> Result<String, StoreError> {
        let store = self.clone();
        let flow = flow.clone();
        tokio::task::spawn_blocking(move || store.write_flow(&flow)).await?
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<String, StoreError> {
        let store = self.clone();
        let alert = alert.clone();
        tokio::task::spawn_blocking(move || store.write_alert(&alert)).await?
    }
}
