//! Synthetic flow traffic: a seeded generator for training data and demo producers.

use super::{FieldValue, FlowRecord};
use chrono::{SecondsFormat, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

const PROTOCOLS: [&str; 3] = ["TCP", "UDP", "ICMP"];

pub struct FlowGenerator {
    rng: StdRng,
}

impl FlowGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn base(&mut self, bytes: i64, packets: i64, duration: f64) -> FlowRecord {
        let protocol = PROTOCOLS[self.rng.gen_range(0..PROTOCOLS.len())];
        FlowRecord {
            timestamp: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true).into()),
            src_ip: Some(format!("10.10.0.{}", self.rng.gen_range(1..=50)).into()),
            dst_ip: Some(format!("10.20.0.{}", self.rng.gen_range(1..=50)).into()),
            protocol: Some(protocol.into()),
            bytes: Some(FieldValue::Int(bytes)),
            packets: Some(FieldValue::Int(packets)),
            duration: Some(FieldValue::Float((duration * 100.0).round() / 100.0)),
            src_port: Some(FieldValue::Int(self.rng.gen_range(0..=65535))),
            dst_port: Some(FieldValue::Int(self.rng.gen_range(0..=65535))),
        }
    }

    /// Bytes 10k-90k, packets 10-160, duration 0.5-4.5 s.
    pub fn normal(&mut self) -> FlowRecord {
        let bytes = self.rng.gen_range(10_000..90_000);
        let packets = self.rng.gen_range(10..160);
        let duration = self.rng.gen_range(0.5..4.5);
        self.base(bytes, packets, duration)
    }

    /// Bytes 200k-600k, packets 200-1000, duration either under 0.1 s or 10-12 s.
    pub fn anomalous(&mut self) -> FlowRecord {
        let bytes = self.rng.gen_range(200_000..600_000);
        let packets = self.rng.gen_range(200..1000);
        let duration = if self.rng.gen_bool(0.5) {
            self.rng.gen_range(0.0..0.1)
        } else {
            self.rng.gen_range(10.0..12.0)
        };
        self.base(bytes, packets, duration)
    }

    /// One live-looking flow; anomalous with probability `anomaly_rate`.
    pub fn next_flow(&mut self, anomaly_rate: f64) -> FlowRecord {
        if self.rng.gen_bool(anomaly_rate.clamp(0.0, 1.0)) {
            self.anomalous()
        } else {
            self.normal()
        }
    }

    /// Shuffled labeled set; `true` marks an anomaly.
    pub fn labeled(&mut self, n_normal: usize, n_anomalies: usize) -> (Vec<FlowRecord>, Vec<bool>) {
        let mut rows: Vec<(FlowRecord, bool)> = Vec::with_capacity(n_normal + n_anomalies);
        rows.extend((0..n_normal).map(|_| (self.normal(), false)));
        rows.extend((0..n_anomalies).map(|_| (self.anomalous(), true)));
        rows.shuffle(&mut self.rng);
        rows.into_iter().unzip()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labeled_set_has_requested_mix() {
        let (flows, labels) = FlowGenerator::new(42).labeled(90, 10);
        assert_eq!(flows.len(), 100);
        assert_eq!(labels.iter().filter(|l| **l).count(), 10);
    }

    #[test]
    fn anomalies_are_heavier_than_normal_traffic() {
        let mut g = FlowGenerator::new(1);
        for _ in 0..50 {
            let n = g.normal().bytes.and_then(|b| b.as_f64()).unwrap();
            let a = g.anomalous().bytes.and_then(|b| b.as_f64()).unwrap();
            assert!(n < 90_000.0 && a >= 200_000.0);
        }
    }
}
