/// ML модели

pub mod boosting;
pub mod evaluation;
pub mod linear;
pub mod training;
pub mod tuning;

use ndarray::{Array1, Array2};

use crate::error::Result;

pub use boosting::{BoostingParams, EvalHistory, EvalSet, GradientBoostedTrees};
pub use evaluation::{Comparison, Evaluation, Metric, Scores, WallProfile};
pub use linear::LinearBaseline;
pub use training::{TrainedModel, TrainingReport, TrainingSession};
pub use tuning::{tune_all, tune_parameter, Search, TunableParam, TuningConfig, TuningResult};

/// Регрессор, который обучается на таблице признаков и предсказывает `u_plus`
pub trait Regressor {
    fn name(&self) -> &'static str;

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;
}

pub fn mse(actual: &Array1<f64>, predicted: &Array1<f64>) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    (actual - predicted).mapv(|e| e * e).mean().unwrap_or(0.0)
}

pub fn rmse(actual: &Array1<f64>, predicted: &Array1<f64>) -> f64 {
    mse(actual, predicted).sqrt()
}

pub fn mae(actual: &Array1<f64>, predicted: &Array1<f64>) -> f64 {
    (actual - predicted).mapv(f64::abs).mean().unwrap_or(0.0)
}

/// Коэффициент детерминации
pub fn r2(actual: &Array1<f64>, predicted: &Array1<f64>) -> f64 {
    let mean = actual.mean().unwrap_or(0.0);
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else if ss_res == 0.0 {
        1.0
    } else {
        0.0
    }
}
