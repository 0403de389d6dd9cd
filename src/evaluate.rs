//! Parallel evaluation of predictors over datasets
//!
//! The two bulk numeric operations in the toolkit - error-statistic
//! accumulation and per-feature range fitting - split the sample range into
//! contiguous partitions sized to the available hardware threads minus one.
//! Each partition accumulates into private state and a single mutex-guarded
//! merge folds partition results into the shared accumulator. Correctness
//! rests on `ErrorStatistic::merge` being associative and order-independent.

use crate::data::{Dataset, Sample};
use crate::error::{EnsembraError, Result};
use crate::model::Model;
use crate::stats::{ErrorStatistic, OutputTaskKind};
use ndarray::{Array1, ArrayView1};
use parking_lot::Mutex;
use rayon::prelude::*;

/// Worker partitions to use: hardware threads minus one, at least one
pub(crate) fn worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
        .saturating_sub(1)
        .max(1)
}

fn partition_size(n_samples: usize) -> usize {
    let workers = worker_count();
    (n_samples + workers - 1) / workers
}

/// Accumulate an error statistic for a compute function over a full dataset
pub fn error_statistic<F>(
    compute: F,
    task: OutputTaskKind,
    data: &Dataset,
) -> Result<ErrorStatistic>
where
    F: Fn(ArrayView1<f64>) -> Result<Array1<f64>> + Sync,
{
    if data.is_empty() {
        return Err(EnsembraError::DataError(
            "cannot compute an error statistic over an empty dataset".to_string(),
        ));
    }

    let n_features = data.target_width();
    let shared = Mutex::new(ErrorStatistic::new(task, n_features));

    data.samples()
        .par_chunks(partition_size(data.len()))
        .try_for_each(|partition| {
            let mut local = ErrorStatistic::new(task, n_features);
            for sample in partition {
                let output = compute(sample.input.view())?;
                local.update(output.view(), sample.target.view())?;
            }
            shared.lock().merge(&local)
        })?;

    Ok(shared.into_inner())
}

/// Score a finished model against a testing dataset.
///
/// Returns the accumulated error statistic and a result dataset holding the
/// model's computed outputs in place of the ideal targets.
pub fn test(model: &Model, data: &Dataset) -> Result<(ErrorStatistic, Dataset)> {
    if data.is_empty() {
        return Err(EnsembraError::DataError(
            "cannot test a model against an empty dataset".to_string(),
        ));
    }
    if data.target_width() != model.output_names().len() {
        return Err(EnsembraError::ShapeError {
            expected: format!("{} output features", model.output_names().len()),
            actual: format!("{} output features", data.target_width()),
        });
    }

    let outputs: Vec<Array1<f64>> = data
        .samples()
        .par_iter()
        .map(|sample| model.compute(sample.input.view()))
        .collect::<Result<_>>()?;

    let n_features = data.target_width();
    let task = model.task_kind();
    let shared = Mutex::new(ErrorStatistic::new(task, n_features));
    let chunk = partition_size(data.len());

    data.samples()
        .par_chunks(chunk)
        .zip(outputs.par_chunks(chunk))
        .try_for_each(|(samples, computed)| {
            let mut local = ErrorStatistic::new(task, n_features);
            for (sample, output) in samples.iter().zip(computed) {
                local.update(output.view(), sample.target.view())?;
            }
            shared.lock().merge(&local)
        })?;

    let mut results = Dataset::new(data.input_width(), n_features);
    for (sample, output) in data.iter().zip(outputs) {
        results.push(Sample {
            id: sample.id.clone(),
            input: sample.input.clone(),
            target: output,
        })?;
    }

    Ok((shared.into_inner(), results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::arr1;

    fn toy_dataset(n: usize) -> Dataset {
        let samples = (0..n)
            .map(|i| {
                let x = i as f64;
                Sample::new(format!("s{}", i), vec![x], vec![2.0 * x])
            })
            .collect();
        Dataset::from_samples(samples).unwrap()
    }

    #[test]
    fn test_parallel_statistic_matches_sequential() {
        let data = toy_dataset(101);
        // Deliberately imperfect predictor so errors are non-zero.
        let predict = |input: ArrayView1<f64>| Ok(arr1(&[2.0 * input[0] + 1.0]));

        let parallel =
            error_statistic(predict, OutputTaskKind::Regression, &data).unwrap();

        let mut sequential = ErrorStatistic::new(OutputTaskKind::Regression, 1);
        for sample in data.iter() {
            let output = arr1(&[2.0 * sample.input[0] + 1.0]);
            sequential.update(output.view(), sample.target.view()).unwrap();
        }

        assert_eq!(parallel.n_samples(), sequential.n_samples());
        assert_abs_diff_eq!(
            parallel.total_rms(),
            sequential.total_rms(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_empty_dataset_is_rejected() {
        let data = Dataset::new(1, 1);
        let predict = |input: ArrayView1<f64>| Ok(input.to_owned());
        assert!(error_statistic(predict, OutputTaskKind::Regression, &data).is_err());
    }

    #[test]
    fn test_compute_errors_propagate() {
        let data = toy_dataset(10);
        let predict = |_: ArrayView1<f64>| -> Result<Array1<f64>> {
            Err(EnsembraError::TrainingError("broken predictor".to_string()))
        };
        assert!(error_statistic(predict, OutputTaskKind::Regression, &data).is_err());
    }
}
