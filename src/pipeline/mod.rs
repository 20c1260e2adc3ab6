//! Stream consumer: persist flow, extract, score, alert, acknowledge.
//!
//! One worker handles one source strictly in order. Extraction and scoring are
//! synchronous; the worker only yields while waiting for the next event or for
//! the store. A slow scoring call stalls the worker, there is no per-event timeout.

use crate::error::PipelineError;
use crate::features::FeatureExtractor;
use crate::flow::{Alert, FlowRecord};
use crate::model::AnomalyModel;
use crate::source::EventSource;
use crate::storage::FlowStore;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Terminal state of one flow.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    ExtractionFailed,
    Normal,
    Alerted { alert_id: String, score: f64 },
}

/// Counters for one `run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub received: u64,
    pub flows_persisted: u64,
    pub extraction_failed: u64,
    pub alerts: u64,
    pub malformed: u64,
    pub persist_failed: u64,
    pub acknowledged: u64,
}

pub struct StreamProcessor<S> {
    extractor: FeatureExtractor,
    model: Arc<AnomalyModel>,
    store: Arc<S>,
}

impl<S: FlowStore> StreamProcessor<S> {
    pub fn new(model: Arc<AnomalyModel>, store: Arc<S>) -> Self {
        Self {
            extractor: FeatureExtractor::new(),
            model,
            store,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Handle one decoded flow. The flow is written before anything else, so it
    /// is kept even when extraction or scoring fails.
    pub async fn process(&self, flow: &FlowRecord) -> Result<EventOutcome, PipelineError> {
        let flow_id = self.store.insert_flow(flow).await?;

        let features = match self.extractor.extract(flow) {
            Ok(v) => v,
            Err(e) => {
                warn!(flow_id = %flow_id, src_ip = %flow.src_ip(), error = %e, "feature extraction failed");
                return Ok(EventOutcome::ExtractionFailed);
            }
        };

        let detection = self.model.detect(&features)?;
        if !detection.is_anomaly {
            debug!(flow_id = %flow_id, "flow scored normal");
            return Ok(EventOutcome::Normal);
        }

        let alert = Alert::from_flow(flow, detection.score, self.model.name()?);
        let alert_id = self.store.insert_alert(&alert).await?;
        info!(
            alert_id = %alert_id,
            src_ip = %flow.src_ip(),
            dst_ip = %flow.dst_ip(),
            score = detection.score,
            "anomaly detected"
        );
        Ok(EventOutcome::Alerted {
            alert_id,
            score: detection.score,
        })
    }

    /// Consume `source` until it is exhausted or `shutdown` fires. Shutdown is
    /// only observed while waiting for the next event; an event already in
    /// hand is finished and acknowledged first.
    pub async fn run<E>(&self, source: &mut E, shutdown: &Notify) -> Result<RunStats, PipelineError>
    where
        E: EventSource + ?Sized,
    {
        let model = self.model.trained()?;
        info!(model = model.model_name(), "stream worker started");
        let mut stats = RunStats::default();

        loop {
            let next = tokio::select! {
                _ = shutdown.notified() => {
                    info!("shutdown requested");
                    break;
                }
                next = source.next_event() => next?,
            };
            let Some(event) = next else {
                info!("event source exhausted");
                break;
            };
            stats.received += 1;

            let payload = event.payload.trim();
            if payload.is_empty() {
                debug!(offset = event.offset, "blank event skipped");
            } else {
                match FlowRecord::from_json(payload) {
                    Err(e) => {
                        warn!(offset = event.offset, error = %e, "malformed flow event skipped");
                        stats.malformed += 1;
                    }
                    Ok(flow) => match self.process(&flow).await {
                        Ok(outcome) => {
                            stats.flows_persisted += 1;
                            match outcome {
                                EventOutcome::ExtractionFailed => stats.extraction_failed += 1,
                                EventOutcome::Alerted { .. } => stats.alerts += 1,
                                EventOutcome::Normal => {}
                            }
                        }
                        Err(PipelineError::Store(e)) => {
                            error!(offset = event.offset, error = %e, "persistence failed, event not acknowledged");
                            stats.persist_failed += 1;
                            continue;
                        }
                        Err(e) => return Err(e),
                    },
                }
            }

            source.acknowledge(event.offset).await?;
            stats.acknowledged += 1;
        }

        info!(
            received = stats.received,
            alerts = stats.alerts,
            extraction_failed = stats.extraction_failed,
            persist_failed = stats.persist_failed,
            "stream worker stopped"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ModelError, StoreError};
    use crate::flow::{AlertStatus, FieldValue, FlowGenerator};
    use crate::model::{Estimator, HyperParams, MaxSamples, TrainedModel};
    use crate::source::ChannelSource;
    use crate::storage::{AlertQuery, FlowQuery, SqliteStore};
    use async_trait::async_trait;

    fn trained_model() -> Arc<AnomalyModel> {
        let (flows, _) = FlowGenerator::new(11).labeled(500, 0);
        let x = crate::features::to_matrix(&FeatureExtractor::new().extract_batch(&flows));
        let params = HyperParams {
            contamination: 0.01,
            n_estimators: 100,
            max_samples: MaxSamples::Auto,
            bootstrap: false,
        };
        let estimator = Estimator::fit_isolation_forest(x.view(), &params, 42).unwrap();
        Arc::new(AnomalyModel::from_trained(TrainedModel::new(estimator, params, None).unwrap()))
    }

    fn extreme_flow() -> FlowRecord {
        FlowRecord {
            timestamp: Some("2025-11-01T12:00:00Z".into()),
            src_ip: Some("10.10.0.66".into()),
            dst_ip: Some("10.20.0.1".into()),
            protocol: Some("TCP".into()),
            bytes: Some(FieldValue::Int(50_000_000)),
            packets: Some(FieldValue::Int(90_000)),
            duration: Some(FieldValue::Float(0.01)),
            src_port: Some(FieldValue::Int(1)),
            dst_port: Some(FieldValue::Int(1)),
        }
    }

    #[tokio::test]
    async fn extraction_failure_still_persists_flow() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let proc = StreamProcessor::new(trained_model(), store.clone());
        let flow = FlowRecord::from_json(r#"{"src_ip":"10.10.0.1","bytes":"not-a-number"}"#).unwrap();

        assert_eq!(proc.process(&flow).await.unwrap(), EventOutcome::ExtractionFailed);
        assert_eq!(store.flow_count().unwrap(), 1);
        assert_eq!(store.alert_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn numeric_identity_fields_are_stored_and_scored() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let proc = StreamProcessor::new(trained_model(), store.clone());
        let (tx, mut source) = ChannelSource::channel(2);
        tx.send(r#"{"timestamp":1761998400,"protocol":6,"bytes":100,"packets":2,"duration":1.0}"#.into())
            .await
            .unwrap();
        drop(tx);

        let stats = proc.run(&mut source, &Notify::new()).await.unwrap();
        assert_eq!(stats.malformed, 0);
        assert_eq!(stats.extraction_failed, 0);
        assert_eq!(stats.flows_persisted, 1);
        assert_eq!(store.flow_count().unwrap(), 1);

        let stored = store.query_flows(&FlowQuery::default()).unwrap();
        assert_eq!(stored[0].flow.protocol, Some(FieldValue::Int(6)));
    }

    #[tokio::test]
    async fn anomalous_flow_raises_new_alert() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let model = trained_model();
        let proc = StreamProcessor::new(model, store.clone());

        let (alert_id, score) = match proc.process(&extreme_flow()).await.unwrap() {
            EventOutcome::Alerted { alert_id, score } => (alert_id, score),
            other => panic!("expected an alert, got {other:?}"),
        };
        assert!(score > 0.0);

        let alert = store.get_alert(&alert_id).unwrap().unwrap();
        assert_eq!(alert.status, AlertStatus::New);
        assert_eq!(alert.model, "isolation_forest");
        assert_eq!(alert.src_ip.as_deref(), Some("10.10.0.66"));
        assert_eq!(alert.features.bytes, Some(FieldValue::Int(50_000_000)));
        assert_eq!(store.flow_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn alert_count_matches_model_verdicts() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let model = trained_model();
        let proc = StreamProcessor::new(model.clone(), store.clone());
        let extractor = FeatureExtractor::new();

        let mut gen = FlowGenerator::new(99);
        let mut expected = 0;
        for _ in 0..40 {
            let flow = gen.next_flow(0.25);
            if model.detect(&extractor.extract(&flow).unwrap()).unwrap().is_anomaly {
                expected += 1;
            }
            proc.process(&flow).await.unwrap();
        }
        assert_eq!(store.flow_count().unwrap(), 40);
        assert_eq!(store.alert_count().unwrap(), expected);
    }

    #[tokio::test]
    async fn run_acknowledges_every_handled_event_in_order() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let proc = StreamProcessor::new(trained_model(), store.clone());
        let (tx, mut source) = ChannelSource::channel(8);

        tx.send(serde_json::to_string(&extreme_flow()).unwrap()).await.unwrap();
        tx.send("not json".into()).await.unwrap();
        tx.send(String::new()).await.unwrap();
        tx.send(r#"{"bytes":"x"}"#.into()).await.unwrap();
        // redelivery of the first event is processed again
        tx.send(serde_json::to_string(&extreme_flow()).unwrap()).await.unwrap();
        drop(tx);

        let stats = proc.run(&mut source, &Notify::new()).await.unwrap();
        assert_eq!(source.acknowledged(), &[0, 1, 2, 3, 4]);
        assert_eq!(stats.received, 5);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.extraction_failed, 1);
        assert_eq!(stats.alerts, 2);
        assert_eq!(store.flow_count().unwrap(), 3);

        let alerts = store.query_alerts(&AlertQuery::default()).unwrap();
        assert_eq!(alerts.len(), 2);
        assert_ne!(alerts[0].id, alerts[1].id);
    }

    #[tokio::test]
    async fn unloaded_model_stops_before_consuming() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let proc = StreamProcessor::new(Arc::new(AnomalyModel::new()), store.clone());
        let (tx, mut source) = ChannelSource::channel(1);
        tx.send(serde_json::to_string(&extreme_flow()).unwrap()).await.unwrap();

        let err = proc.run(&mut source, &Notify::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Model(ModelError::NotReady)));
        assert!(source.acknowledged().is_empty());
        assert_eq!(store.flow_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn shutdown_stops_waiting_worker() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let proc = StreamProcessor::new(trained_model(), store);
        let (_tx, mut source) = ChannelSource::channel(1);
        let shutdown = Notify::new();
        shutdown.notify_one();

        let stats = proc.run(&mut source, &shutdown).await.unwrap();
        assert_eq!(stats, RunStats::default());
    }

    struct FailingStore;

    #[async_trait]
    impl FlowStore for FailingStore {
        async fn insert_flow(&self, _flow: &FlowRecord) -> Result<String, StoreError> {
            Err(StoreError::Poisoned)
        }

        async fn insert_alert(&self, _alert: &Alert) -> Result<String, StoreError> {
            Err(StoreError::Poisoned)
        }
    }

    #[tokio::test]
    async fn persistence_failure_leaves_event_unacknowledged() {
        let proc = StreamProcessor::new(trained_model(), Arc::new(FailingStore));
        let (tx, mut source) = ChannelSource::channel(2);
        tx.send(serde_json::to_string(&extreme_flow()).unwrap()).await.unwrap();
        tx.send("{}".into()).await.unwrap();
        drop(tx);

        let stats = proc.run(&mut source, &Notify::new()).await.unwrap();
        assert_eq!(stats.persist_failed, 2);
        assert!(source.acknowledged().is_empty());
    }
}
