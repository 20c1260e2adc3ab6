//! Inference benchmark: feature vector → isolation forest decision.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use flowwatch::features::{to_matrix, FeatureExtractor, FeatureVector};
use flowwatch::flow::FlowGenerator;
use flowwatch::model::{AnomalyModel, Estimator, HyperParams, MaxSamples, TrainedModel};

fn model(n_estimators: usize) -> (AnomalyModel, Vec<FeatureVector>) {
    let (flows, _) = FlowGenerator::new(1).labeled(2000, 40);
    let vectors = FeatureExtractor::new().extract_batch(&flows);
    let params = HyperParams {
        contamination: 0.02,
        n_estimators,
        max_samples: MaxSamples::Auto,
        bootstrap: false,
    };
    let estimator = Estimator::fit_isolation_forest(to_matrix(&vectors).view(), &params, 42).unwrap();
    let trained = TrainedModel::new(estimator, params, None).unwrap();
    (AnomalyModel::from_trained(trained), vectors)
}

fn bench_detect(c: &mut Criterion) {
    let (detector, vectors) = model(200);
    let fv = vectors[0];
    c.bench_function("detect_200_trees", |b| b.iter(|| detector.detect(black_box(&fv))));
}

fn bench_detect_by_trees(c: &mut Criterion) {
    let mut g = c.benchmark_group("detect_by_trees");
    for n in [100, 200, 300, 500] {
        let (detector, vectors) = model(n);
        let fv = vectors[0];
        g.bench_function(format!("trees_{}", n).as_str(), |b| {
            b.iter(|| detector.detect(black_box(&fv)))
        });
    }
    g.finish();
}

fn bench_detect_batch(c: &mut Criterion) {
    let (detector, vectors) = model(200);
    let batch = &vectors[..256];
    c.bench_function("detect_batch_256", |b| {
        b.iter(|| detector.detect_batch(black_box(batch)))
    });
}

criterion_group!(benches, bench_detect, bench_detect_by_trees, bench_detect_batch);
criterion_main!(benches);
