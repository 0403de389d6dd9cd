//! Full pipeline: normalize, train, ensemble, test, report

use ensembra::prelude::*;

fn raw_dataset() -> Dataset {
    // Inputs deliberately on wildly different scales.
    let samples = (0..16)
        .map(|i| {
            let a = (i % 2) as f64 * 1000.0;
            let b = ((i / 2) % 2) as f64 * 0.001;
            let target = if (i % 2) != ((i / 2) % 2) { 1.0 } else { 0.0 };
            Sample::new(format!("raw{}", i), vec![a, b], vec![target])
        })
        .collect();
    Dataset::from_samples(samples).unwrap()
}

#[test]
fn normalize_train_test_report() {
    let raw = raw_dataset();
    let filter = RangeFilter::fit(&raw, -1.0, 1.0).unwrap();
    let data = filter.normalize_dataset(&raw).unwrap();
    for sample in data.iter() {
        assert!(sample.input.iter().all(|&v| (-1.0..=1.0).contains(&v)));
    }

    let training = TrainingConfig::default()
        .with_max_attempts(1)
        .with_max_epochs_per_attempt(8)
        .with_fine_tune(false)
        .with_seed(19);
    let config = KFoldConfig::default()
        .with_fold_ratio(0.25)
        .with_seed(19)
        .with_training(training);
    let prototype = PredictorKind::Mlp(MlpNetwork::new(
        2,
        1,
        OutputTaskKind::Binary,
        MlpConfig {
            hidden_layers: vec![6],
            ..MlpConfig::default()
        },
        19,
    ));
    let model = KFoldBuilder::new(config)
        .unwrap()
        .build("pipeline", &prototype, &data)
        .unwrap();

    let (stat, results) = test(&model, &data).unwrap();
    assert_eq!(stat.n_samples(), data.len());
    assert_eq!(results.len(), data.len());

    let record = diagnostic_test(&model, &data).unwrap();
    let report = record.info_text().unwrap();
    assert!(report.contains("pipeline"));
    assert!(!model.info_text().is_empty());
}
