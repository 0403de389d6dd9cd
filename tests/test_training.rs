//! End-to-end training controller tests

use ensembra::prelude::*;
use ndarray::arr1;

fn boolean_dataset() -> Dataset {
    // AND, OR and XOR truth tables over two inputs.
    let rows: [([f64; 2], [f64; 3]); 4] = [
        ([0.0, 0.0], [0.0, 0.0, 0.0]),
        ([0.0, 1.0], [0.0, 1.0, 1.0]),
        ([1.0, 0.0], [0.0, 1.0, 1.0]),
        ([1.0, 1.0], [1.0, 1.0, 0.0]),
    ];
    Dataset::from_samples(
        rows.iter()
            .enumerate()
            .map(|(i, (x, y))| Sample::new(format!("row{}", i), x.to_vec(), y.to_vec()))
            .collect(),
    )
    .unwrap()
}

fn boolean_predictor(seed: u64) -> PredictorKind {
    PredictorKind::Mlp(MlpNetwork::new(
        2,
        3,
        OutputTaskKind::Binary,
        MlpConfig {
            hidden_layers: vec![8],
            learning_rate: 0.5,
            batch_size: 4,
            ..MlpConfig::default()
        },
        seed,
    ))
}

#[test]
fn terminates_within_attempt_and_epoch_budget() {
    let config = TrainingConfig::default()
        .with_max_attempts(2)
        .with_max_epochs_per_attempt(50)
        .with_fine_tune(false)
        .with_seed(21);
    let controller = TrainingController::new(config).unwrap();
    let data = boolean_dataset();

    let mut updates = 0usize;
    let model = controller
        .train_with_progress("boolean", boolean_predictor(21), &data, None, |update| {
            updates += 1;
            assert!(update.epoch >= 1);
            assert!(update.attempt < 2);
        })
        .unwrap();

    assert!(updates <= 100, "controller ran {} epochs", updates);
    let (stat, _) = test(&model, &data).unwrap();
    assert!((0.0..=1.0).contains(&stat.binary_accuracy()));
}

#[test]
fn identical_seeds_give_identical_models() {
    let data = boolean_dataset();
    let run = || {
        let config = TrainingConfig::default()
            .with_max_attempts(2)
            .with_max_epochs_per_attempt(15)
            .with_seed(5);
        TrainingController::new(config)
            .unwrap()
            .train("run", boolean_predictor(5), &data, None)
            .unwrap()
    };
    let a = run();
    let b = run();

    for sample in data.iter() {
        assert_eq!(
            a.compute(sample.input.view()).unwrap(),
            b.compute(sample.input.view()).unwrap()
        );
    }
    assert_eq!(a.confidence().cost(), b.confidence().cost());
}

#[test]
fn validated_training_blends_both_pools() {
    let data = boolean_dataset();
    let config = TrainingConfig::default()
        .with_max_attempts(1)
        .with_max_epochs_per_attempt(10)
        .with_seed(9);
    let model = TrainingController::new(config)
        .unwrap()
        .train("validated", boolean_predictor(9), &data, Some(&data))
        .unwrap();
    assert_eq!(model.confidence().n_samples(), 2 * data.len());
}

#[test]
fn random_projection_trains_through_the_controller() {
    let samples = (0..20)
        .map(|i| {
            let x = i as f64 / 10.0;
            Sample::new(format!("lin{}", i), vec![x, 1.0 - x], vec![2.0 * x + 0.5])
        })
        .collect();
    let data = Dataset::from_samples(samples).unwrap();

    let config = TrainingConfig::default()
        .with_max_attempts(1)
        .with_max_epochs_per_attempt(30)
        .with_seed(7);
    let predictor = PredictorKind::RandomProjection(RandomProjectionNetwork::new(
        2,
        1,
        OutputTaskKind::Regression,
        RandomProjectionConfig {
            expansion: 32,
            learning_rate: 0.02,
        },
        7,
    ));
    let model = TrainingController::new(config)
        .unwrap()
        .train("projection", predictor, &data, None)
        .unwrap();

    let (stat, _) = test(&model, &data).unwrap();
    assert_eq!(stat.n_samples(), data.len());
    assert!(stat.total_rms().is_finite());
    let out = model.compute(arr1(&[0.5, 0.5]).view()).unwrap();
    assert_eq!(out.len(), 1);
}

#[test]
fn trained_model_survives_a_save_load_cycle() {
    let data = boolean_dataset();
    let config = TrainingConfig::default()
        .with_max_attempts(1)
        .with_max_epochs_per_attempt(10)
        .with_seed(33);
    let model = TrainingController::new(config)
        .unwrap()
        .train("persisted", boolean_predictor(33), &data, None)
        .unwrap();

    let dir = std::env::temp_dir().join("ensembra-integration");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("trained.json");
    model.save(&path).unwrap();
    let restored = Model::load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    let input = arr1(&[1.0, 0.0]);
    assert_eq!(
        restored.compute(input.view()).unwrap(),
        model.compute(input.view()).unwrap()
    );
    assert_eq!(restored.name(), "persisted");
}
