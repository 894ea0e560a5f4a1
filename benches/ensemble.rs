use cell_ensemble::config::{Configuration, ModelKind};
use cell_ensemble::data::Dataset;
use cell_ensemble::ensemble::{EnsemblePredictor, RankedCandidate, VotingClassifier};
use cell_ensemble::retrain::ModelRetrainer;
use cell_ensemble::scoring::ScoringEngine;
use cell_ensemble::training::{LinearProbe, TrainableModel};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

fn create_cell_data(n_rows: usize, n_features: usize, seed: u64) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    // Roughly one positive in five
    let labels = Array1::from_shape_fn(n_rows, |_| u8::from(rng.gen::<f64>() < 0.2));
    let features = Array2::from_shape_fn((n_rows, n_features), |(i, j)| {
        let shift = if j == 0 && labels[i] == 1 { 2.0 } else { 0.0 };
        shift + rng.gen::<f64>()
    });

    Dataset::from_arrays(features, labels).unwrap()
}

fn bench_scoring(c: &mut Criterion) {
    let mut group = c.benchmark_group("scoring");
    let engine = ScoringEngine::new();

    for n_rows in [1_000, 10_000, 100_000].iter() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let y_true: Vec<u8> = (0..*n_rows).map(|_| u8::from(rng.gen::<f64>() < 0.2)).collect();
        let proba: Vec<f64> = (0..*n_rows).map(|_| rng.gen()).collect();

        group.bench_with_input(BenchmarkId::new("score_probabilities", n_rows), n_rows, |b, _| {
            b.iter(|| engine.score_probabilities(black_box(&y_true), black_box(&proba), 0.70).unwrap())
        });
    }

    group.finish();
}

fn bench_voting(c: &mut Criterion) {
    let mut group = c.benchmark_group("voting");
    let voting = VotingClassifier::default();

    for n_rows in [1_000, 10_000, 100_000].iter() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let members: Vec<Array1<f64>> = (0..5)
            .map(|_| Array1::from_shape_fn(*n_rows, |_| rng.gen::<f64>()))
            .collect();

        group.bench_with_input(BenchmarkId::new("majority_of_five", n_rows), n_rows, |b, _| {
            b.iter(|| voting.predict_from_predictions(black_box(&members)).unwrap())
        });
    }

    group.finish();
}

fn bench_ensemble(c: &mut Criterion) {
    let mut group = c.benchmark_group("ensemble");
    group.sample_size(10);

    let train = create_cell_data(2_000, 16, 3);
    let validation = create_cell_data(500, 16, 4);
    let candidates: Vec<RankedCandidate> = (0..5)
        .map(|i| RankedCandidate {
            configuration: Configuration::new(ModelKind::LinearProbe)
                .with_learning_rate(0.05 * (i + 1) as f64)
                .with_epochs(10),
            score: 0.0,
            rank: i + 1,
            discovery_key: (0, i),
            appearances: 1,
        })
        .collect();

    group.bench_function("probe_fit", |b| {
        b.iter(|| LinearProbe.train(&candidates[0].configuration, black_box(&train), 7).unwrap())
    });

    let models = ModelRetrainer::new(Arc::new(LinearProbe::new()))
        .retrain_all(&candidates, &train, &validation)
        .unwrap();
    let predictor = EnsemblePredictor::new(models, 5, 0.70).unwrap();

    for n_rows in [100, 1_000, 10_000].iter() {
        let batch = create_cell_data(*n_rows, 16, 5);
        group.bench_with_input(BenchmarkId::new("predict", n_rows), &batch, |b, batch| {
            b.iter(|| predictor.predict(batch.ids(), black_box(batch.features())).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_scoring, bench_voting, bench_ensemble);
criterion_main!(benches);
