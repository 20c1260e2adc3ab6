//! Document store for received flows and the alerts derived from them.

mod sqlite;

pub use sqlite::{AlertQuery, AlertSummary, FlowBaseline, FlowQuery, SqliteStore, StoredFlow};

use crate::error::StoreError;
use crate::flow::{Alert, FlowRecord};
use async_trait::async_trait;

/// Write side used by the stream. Each call is an independent write; there are
/// no transactions spanning a flow and its alert.
#[async_trait]
pub trait FlowStore: Send + Sync {
    /// Persist a flow verbatim; returns the generated document id.
    async fn insert_flow(&self, flow: &FlowRecord) -> Result<String, StoreError>;

    /// Persist an alert; returns its id.
    async fn insert_alert(&self, alert: &Alert) -> Result<String, StoreError>;
}
