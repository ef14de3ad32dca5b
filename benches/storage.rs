//! Storage benchmark: model pair save/load and encrypted audit writes.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tempfile::tempdir;
use vibewatch_agent::config::TrainingConfig;
use vibewatch_agent::features::{RawSample, VibrationExtractor};
use vibewatch_agent::lifecycle::fit_model_state;
use vibewatch_agent::model::Label;
use vibewatch_agent::policy::Verdict;
use vibewatch_agent::storage::{AuditRecord, ModelStore, PredictionLog, SqliteModelStore};

fn batch() -> Vec<RawSample> {
    (0..100)
        .map(|i| RawSample {
            rms_x: Some(0.1 + (i % 9) as f64 * 0.01),
            peak_freq_z: Some(45.0 + (i % 8) as f64),
            ..Default::default()
        })
        .collect()
}

fn bench_model_save_load(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let store = SqliteModelStore::open(&dir.path().join("model.db")).unwrap();
    let trained = fit_model_state(
        &batch(),
        &VibrationExtractor::default(),
        &TrainingConfig::default(),
        1,
    )
    .unwrap();

    c.bench_function("model_store_save", |b| {
        b.iter(|| store.save(black_box(&trained.state)).unwrap())
    });
    c.bench_function("model_store_load", |b| {
        b.iter(|| black_box(store.load()).unwrap())
    });
}

fn bench_audit_record(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let log = PredictionLog::open(&dir.path().join("audit.db"), b"bench-secret").unwrap();
    let verdict = Verdict {
        is_anomaly: false,
        score: 0.12,
        label: Label::Normal,
    };
    let sample = batch().remove(0);

    c.bench_function("audit_record", |b| {
        b.iter(|| {
            let rec = AuditRecord::new(sample.clone(), &verdict, 1);
            log.record(black_box(&rec)).unwrap()
        })
    });
}

criterion_group!(benches, bench_model_save_load, bench_audit_record);
criterion_main!(benches);
