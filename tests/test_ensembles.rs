//! Ensemble builder tests over the public API

use ensembra::prelude::*;
use ndarray::arr1;

fn parity_dataset(n: usize) -> Dataset {
    let samples = (0..n)
        .map(|i| {
            let a = (i % 2) as f64;
            let b = ((i / 2) % 2) as f64;
            let target = if a != b { 1.0 } else { 0.0 };
            Sample::new(format!("s{}", i), vec![a, b], vec![target])
        })
        .collect();
    Dataset::from_samples(samples).unwrap()
}

fn three_class_dataset(n: usize) -> Dataset {
    let samples = (0..n)
        .map(|i| {
            let class = i % 3;
            let x = class as f64 / 2.0;
            let mut target = vec![0.0; 3];
            target[class] = 1.0;
            Sample::new(format!("c{}", i), vec![x, 1.0 - x], target)
        })
        .collect();
    Dataset::from_samples(samples).unwrap()
}

fn quick_training(seed: u64) -> TrainingConfig {
    TrainingConfig::default()
        .with_max_attempts(1)
        .with_max_epochs_per_attempt(5)
        .with_fine_tune(false)
        .with_seed(seed)
}

fn binary_mlp(inputs: usize, seed: u64) -> PredictorKind {
    PredictorKind::Mlp(MlpNetwork::new(
        inputs,
        1,
        OutputTaskKind::Binary,
        MlpConfig {
            hidden_layers: vec![4],
            ..MlpConfig::default()
        },
        seed,
    ))
}

#[test]
fn kfold_members_cover_every_fold() {
    let config = KFoldConfig::default()
        .with_fold_ratio(0.25)
        .with_seed(11)
        .with_training(quick_training(11));
    let builder = KFoldBuilder::new(config).unwrap();
    let data = parity_dataset(16);

    let model = builder.build("parity", &binary_mlp(2, 11), &data).unwrap();
    assert_eq!(model.children().len(), 4);

    let (stat, results) = test(&model, &data).unwrap();
    assert_eq!(stat.n_samples(), data.len());
    assert_eq!(results.len(), data.len());
    for sample in results.iter() {
        assert!((0.0..=1.0).contains(&sample.target[0]));
    }
}

#[test]
fn categorical_ensemble_outputs_sum_to_one() {
    let config = KFoldConfig::default()
        .with_fold_ratio(0.5)
        .with_seed(4)
        .with_training(quick_training(4));
    let builder = KFoldBuilder::new(config).unwrap();
    let data = three_class_dataset(12);

    let prototype = PredictorKind::Mlp(MlpNetwork::new(
        2,
        3,
        OutputTaskKind::Categorical,
        MlpConfig {
            hidden_layers: vec![6],
            ..MlpConfig::default()
        },
        4,
    ));
    let model = builder.build("classes", &prototype, &data).unwrap();

    for sample in data.iter() {
        let output = model.compute(sample.input.view()).unwrap();
        assert!((output.sum() - 1.0).abs() < 1e-9, "sum {}", output.sum());
        assert!(output.iter().all(|&p| p >= 0.0));
    }
}

#[test]
fn stacked_ensemble_predicts_through_its_meta_layer() {
    let config = StackingConfig::default()
        .with_fold_ratio(0.25)
        .with_route_input(true)
        .with_seed(6)
        .with_training(quick_training(6));
    let builder = StackingBuilder::new(config).unwrap();
    let data = parity_dataset(16);

    let bases = vec![binary_mlp(2, 1), binary_mlp(2, 2)];
    // 2 base outputs + 2 routed inputs.
    let meta = binary_mlp(4, 3);
    let model = builder.build("stack", &bases, &meta, &data).unwrap();

    let output = model.compute(arr1(&[1.0, 0.0]).view()).unwrap();
    assert_eq!(output.len(), 1);
    assert!((0.0..=1.0).contains(&output[0]));
    // Bases plus the meta model appear as children.
    assert_eq!(model.children().len(), 3);
}

#[test]
fn diagnostic_tree_mirrors_the_model_tree() {
    let config = KFoldConfig::default()
        .with_fold_ratio(0.5)
        .with_seed(8)
        .with_training(quick_training(8));
    let builder = KFoldBuilder::new(config).unwrap();
    let data = parity_dataset(12);
    let model = builder.build("parity", &binary_mlp(2, 8), &data).unwrap();

    let record = diagnostic_test(&model, &data).unwrap();
    assert_eq!(record.children().len(), model.children().len());
    assert!(record.better_children().is_ok());

    let text = record.info_text().unwrap();
    assert!(text.contains("parity"));
    assert!(text.contains("parity-fold-0"));
}

#[test]
fn ensembles_are_reproducible_across_builds() {
    let data = parity_dataset(16);
    let build = || {
        let config = HalvedStackConfig::default()
            .with_seed(14)
            .with_training(quick_training(14));
        HalvedStackBuilder::new(config)
            .unwrap()
            .build("halved", &[binary_mlp(2, 1)], &binary_mlp(1, 2), &data)
            .unwrap()
    };
    let a = build();
    let b = build();
    for sample in data.iter() {
        assert_eq!(
            a.compute(sample.input.view()).unwrap(),
            b.compute(sample.input.view()).unwrap()
        );
    }
}
