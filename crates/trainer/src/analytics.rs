//! Post-training analytics: regression metrics, permutation feature
//! importance and feature/target correlation series.

use std::collections::BTreeMap;

use oilcast_core::correlation::{CorrelationData, CorrelationPoint, CorrelationSeries};
use oilcast_core::features::{FEATURE_COUNT, FEATURE_NAMES};
use oilcast_core::progress::{FeatureImportance, TrainingMetrics};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::dataset::Dataset;

/// Mean squared error.
pub fn mse(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let n = y_true.len().max(1) as f64;
    y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / n
}

/// Mean absolute error.
pub fn mae(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let n = y_true.len().max(1) as f64;
    y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p).abs())
        .sum::<f64>()
        / n
}

/// r2, MAE, MSE and RMSE of `y_pred` against `y_true`.
///
/// r2 is `0.0` when the targets have no variance.
pub fn regression_metrics(y_true: &[f64], y_pred: &[f64]) -> TrainingMetrics {
    let (mean, _) = mean_std(y_true);
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    let r2 = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };
    let mse = mse(y_true, y_pred);

    TrainingMetrics {
        r2,
        mae: mae(y_true, y_pred),
        mse,
        rmse: mse.sqrt(),
    }
}

/// Population mean and standard deviation.
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Pearson correlation coefficient; `0.0` if either side is constant.
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let (mx, sx) = mean_std(xs);
    let (my, sy) = mean_std(ys);
    if sx == 0.0 || sy == 0.0 {
        return 0.0;
    }
    let n = xs.len().min(ys.len()) as f64;
    let cov = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| (x - mx) * (y - my))
        .sum::<f64>()
        / n;
    (cov / (sx * sy)).clamp(-1.0, 1.0)
}

/// Permutation importance of every feature.
///
/// For each feature the column is shuffled `repeats` times and the increase
/// in MSE over the unshuffled baseline is recorded. `predict` receives raw
/// (unscaled) feature rows.
pub fn permutation_importance<F, R>(
    data: &Dataset,
    predict: F,
    repeats: usize,
    rng: &mut R,
) -> BTreeMap<String, FeatureImportance>
where
    F: Fn(&[f64; FEATURE_COUNT]) -> f64,
    R: Rng,
{
    let baseline_pred: Vec<f64> = data.features.iter().map(&predict).collect();
    let baseline = mse(&data.targets, &baseline_pred);

    let mut result = BTreeMap::new();
    for (col, name) in FEATURE_NAMES.iter().enumerate() {
        let mut increases = Vec::with_capacity(repeats);
        for _ in 0..repeats.max(1) {
            let mut column: Vec<f64> = data.features.iter().map(|row| row[col]).collect();
            column.shuffle(rng);
            let preds: Vec<f64> = data
                .features
                .iter()
                .zip(&column)
                .map(|(row, &v)| {
                    let mut permuted = *row;
                    permuted[col] = v;
                    predict(&permuted)
                })
                .collect();
            increases.push(mse(&data.targets, &preds) - baseline);
        }
        let (importance, std) = mean_std(&increases);
        result.insert(name.to_string(), FeatureImportance { importance, std });
    }
    result
}

/// Scatter series of every feature against the target, sampled down to at
/// most `max_points` points, with the Pearson coefficient over all rows.
pub fn correlation_data<R: Rng>(data: &Dataset, max_points: usize, rng: &mut R) -> CorrelationData {
    let mut sample: Vec<usize> = (0..data.len()).collect();
    if sample.len() > max_points {
        sample.shuffle(rng);
        sample.truncate(max_points);
        sample.sort_unstable();
    }

    let mut by_feature = BTreeMap::new();
    for (col, name) in FEATURE_NAMES.iter().enumerate() {
        let xs: Vec<f64> = data.features.iter().map(|row| row[col]).collect();
        let points = sample
            .iter()
            .map(|&i| CorrelationPoint(xs[i], data.targets[i]))
            .collect();
        by_feature.insert(
            name.to_string(),
            CorrelationSeries {
                points,
                correlation_coefficient: pearson(&xs, &data.targets),
            },
        );
    }
    CorrelationData::ByFeature(by_feature)
}
