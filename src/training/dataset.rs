//! Training data: CSV or synthetic flows → feature matrix with optional labels.

use crate::error::TrainError;
use crate::features::{to_matrix, FeatureExtractor, FeatureVector, FEATURE_DIM, FEATURE_NAMES};
use crate::flow::{FieldValue, FlowGenerator, FlowRecord};
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Columns a flow-shaped CSV must carry.
pub const REQUIRED_FLOW_COLUMNS: [&str; 3] = ["bytes", "packets", "duration"];

#[derive(Debug, Clone, PartialEq)]
pub enum DatasetSource {
    /// Seeded synthetic flows (normal count, anomaly count)
    Synthetic { normal: usize, anomalies: usize },
    Csv(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetShape {
    /// Every feature column is present; rows are used as-is.
    FeatureColumns,
    /// Raw flow rows; encoded through the feature extractor.
    FlowRows,
}

/// Feature matrix with one optional label per row (`true` = anomaly).
#[derive(Debug, Clone)]
pub struct LabeledData {
    pub features: Array2<f64>,
    pub labels: Option<Vec<bool>>,
}

impl LabeledData {
    pub fn len(&self) -> usize {
        self.features.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn anomaly_count(&self) -> Option<usize> {
        self.labels.as_ref().map(|l| l.iter().filter(|x| **x).count())
    }

    /// Encode flows. Unlabeled input goes through batch extraction; labeled
    /// input drops a failing row together with its label.
    pub fn from_flows(
        extractor: &FeatureExtractor,
        flows: &[FlowRecord],
        labels: Option<&[bool]>,
    ) -> Self {
        match labels {
            None => Self {
                features: to_matrix(&extractor.extract_batch(flows)),
                labels: None,
            },
            Some(labels) => {
                let (vectors, kept): (Vec<FeatureVector>, Vec<bool>) = flows
                    .iter()
                    .zip(labels)
                    .filter_map(|(f, l)| extractor.extract(f).ok().map(|v| (v, *l)))
                    .unzip();
                Self {
                    features: to_matrix(&vectors),
                    labels: Some(kept),
                }
            }
        }
    }
}

/// Train matrix plus an optional held-out (matrix, labels) pair.
#[derive(Debug, Clone)]
pub struct Split {
    pub train: Array2<f64>,
    pub test: Option<(Array2<f64>, Vec<bool>)>,
}

/// Per-class holdout of `round(class_size * test_fraction)` rows, with the
/// fraction clamped to [0, 1]. Without labels everything is training data.
pub fn stratified_split(data: &LabeledData, test_fraction: f64, seed: u64) -> Split {
    let Some(labels) = data.labels.as_ref() else {
        return Split {
            train: data.features.clone(),
            test: None,
        };
    };

    let fraction = if test_fraction.is_nan() { 0.0 } else { test_fraction.clamp(0.0, 1.0) };
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train_idx = Vec::new();
    let mut test_idx = Vec::new();
    for class in [false, true] {
        let mut idx: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == class).collect();
        idx.shuffle(&mut rng);
        let n_test = ((idx.len() as f64 * fraction).round() as usize).min(idx.len());
        test_idx.extend_from_slice(&idx[..n_test]);
        train_idx.extend_from_slice(&idx[n_test..]);
    }
    train_idx.sort_unstable();
    test_idx.sort_unstable();

    let truth = test_idx.iter().map(|&i| labels[i]).collect();
    Split {
        train: data.features.select(Axis(0), &train_idx),
        test: Some((data.features.select(Axis(0), &test_idx), truth)),
    }
}

fn parse_label(raw: &str) -> Option<bool> {
    let raw = raw.trim();
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" => Some(true),
        "false" | "no" => Some(false),
        _ => raw.parse::<f64>().ok().map(|v| v != 0.0),
    }
}

fn cell(raw: Option<&str>) -> Option<FieldValue> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| FieldValue::Text(s.to_string()))
}

fn field<'r>(columns: &HashMap<&str, usize>, rec: &'r csv::StringRecord, name: &str) -> Option<&'r str> {
    columns.get(name).and_then(|&i| rec.get(i))
}

/// Load a CSV dataset. Fails before any fitting when neither shape matches.
pub fn load_csv(path: &Path, extractor: &FeatureExtractor) -> Result<LabeledData, TrainError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let columns: HashMap<&str, usize> = headers.iter().enumerate().map(|(i, h)| (h.trim(), i)).collect();
    info!(path = %path.display(), columns = headers.len(), "loading dataset");

    let shape = if FEATURE_NAMES.iter().all(|c| columns.contains_key(c)) {
        DatasetShape::FeatureColumns
    } else {
        let missing: Vec<String> = REQUIRED_FLOW_COLUMNS
            .iter()
            .filter(|c| !columns.contains_key(*c))
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(TrainError::MissingColumns(missing));
        }
        DatasetShape::FlowRows
    };
    let label_col = columns.get("label").or_else(|| columns.get("anomaly")).copied();
    debug!(?shape, labeled = label_col.is_some(), "dataset shape detected");

    let mut flows = Vec::new();
    let mut vectors = Vec::new();
    let mut labels = Vec::new();
    let mut dropped = 0usize;
    for (row, rec) in reader.records().enumerate() {
        let rec = rec?;
        let label = match label_col {
            Some(i) => {
                let raw = rec.get(i).unwrap_or("");
                Some(parse_label(raw).ok_or_else(|| {
                    TrainError::DataFormat(format!("row {}: unreadable label {:?}", row + 1, raw))
                })?)
            }
            None => None,
        };

        match shape {
            DatasetShape::FeatureColumns => {
                let mut values = [0.0; FEATURE_DIM];
                let parsed = FEATURE_NAMES.iter().zip(values.iter_mut()).all(|(name, slot)| {
                    match field(&columns, &rec, name).and_then(|v| v.trim().parse::<f64>().ok()) {
                        Some(v) => {
                            *slot = v;
                            true
                        }
                        None => false,
                    }
                });
                if !parsed {
                    dropped += 1;
                    continue;
                }
                vectors.push(FeatureVector::new(values));
            }
            DatasetShape::FlowRows => flows.push(FlowRecord {
                timestamp: cell(field(&columns, &rec, "timestamp")),
                src_ip: cell(field(&columns, &rec, "src_ip")),
                dst_ip: cell(field(&columns, &rec, "dst_ip")),
                protocol: cell(field(&columns, &rec, "protocol")),
                bytes: cell(field(&columns, &rec, "bytes")),
                packets: cell(field(&columns, &rec, "packets")),
                duration: cell(field(&columns, &rec, "duration")),
                src_port: cell(field(&columns, &rec, "src_port")),
                dst_port: cell(field(&columns, &rec, "dst_port")),
            }),
        }
        if let Some(l) = label {
            labels.push(l);
        }
    }

    let labels = label_col.map(|_| labels);
    let data = match shape {
        DatasetShape::FeatureColumns => LabeledData {
            features: to_matrix(&vectors),
            labels,
        },
        DatasetShape::FlowRows => {
            let read = flows.len();
            let data = LabeledData::from_flows(extractor, &flows, labels.as_deref());
            dropped += read - data.len();
            data
        }
    };
    info!(
        rows = data.len(),
        dropped,
        anomalies = ?data.anomaly_count(),
        "dataset loaded"
    );
    Ok(data)
}

/// Resolve a dataset source into labeled features.
pub fn load(
    source: &DatasetSource,
    extractor: &FeatureExtractor,
    seed: u64,
) -> Result<LabeledData, TrainError> {
    match source {
        DatasetSource::Csv(path) => load_csv(path, extractor),
        DatasetSource::Synthetic { normal, anomalies } => {
            info!(normal, anomalies, "generating synthetic labeled flows");
            let (flows, labels) = FlowGenerator::new(seed).labeled(*normal, *anomalies);
            Ok(LabeledData::from_flows(extractor, &flows, Some(&labels)))
        }
    }
}
