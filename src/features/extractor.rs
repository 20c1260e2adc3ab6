//! Feature extraction: flow record → numeric coercion → derived ratios → vector.

use super::{FeatureVector, FEATURE_DIM};
use crate::error::FeatureExtractionError;
use crate::flow::{FieldValue, FlowRecord};

const PORT_RANGE: f64 = 65535.0;
const MIN_PACKETS: f64 = 1.0;
const MIN_DURATION_SECS: f64 = 0.1;

/// Protocol code. Anything outside TCP/UDP/ICMP shares the TCP code.
fn protocol_code(protocol: Option<&str>) -> f64 {
    match protocol.map(|p| p.trim().to_ascii_uppercase()).as_deref() {
        Some("UDP") => 1.0,
        Some("ICMP") => 2.0,
        _ => 0.0,
    }
}

fn numeric(field: &'static str, value: Option<&FieldValue>) -> Result<f64, FeatureExtractionError> {
    match value {
        None => Ok(0.0),
        Some(v) => v.as_f64().ok_or_else(|| FeatureExtractionError::NonNumeric {
            field,
            value: v.render(),
        }),
    }
}

/// Stateless; safe to share between the trainer and any number of stream workers.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Encode one flow. Fails only when a numeric field cannot be coerced.
    pub fn extract(&self, flow: &FlowRecord) -> Result<FeatureVector, FeatureExtractionError> {
        let bytes = numeric("bytes", flow.bytes.as_ref())?;
        let packets = numeric("packets", flow.packets.as_ref())?;
        let duration = numeric("duration", flow.duration.as_ref())?;
        let src_port = numeric("src_port", flow.src_port.as_ref())?;
        let dst_port = numeric("dst_port", flow.dst_port.as_ref())?;

        let values: [f64; FEATURE_DIM] = [
            bytes,
            packets,
            duration,
            protocol_code(flow.protocol_name()),
            bytes / packets.max(MIN_PACKETS),
            src_port / PORT_RANGE,
            dst_port / PORT_RANGE,
            bytes / duration.max(MIN_DURATION_SECS),
        ];
        Ok(FeatureVector::new(values))
    }

    /// Encode many flows, silently dropping the ones that fail. Survivors keep
    /// their relative order.
    pub fn extract_batch<'a, I>(&self, flows: I) -> Vec<FeatureVector>
    where
        I: IntoIterator<Item = &'a FlowRecord>,
    {
        let mut dropped = 0usize;
        let out: Vec<FeatureVector> = flows
            .into_iter()
            .filter_map(|f| match self.extract(f) {
                Ok(v) => Some(v),
                Err(_) => {
                    dropped += 1;
                    None
                }
            })
            .collect();
        if dropped > 0 {
            tracing::debug!(dropped, kept = out.len(), "batch extraction dropped rows");
        }
        out
    }
}
