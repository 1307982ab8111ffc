//! Подбор гиперпараметров кросс-валидацией

#![allow(non_snake_case)]

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};
use crate::frame::Frame;
use crate::models::boosting::{BoostingParams, GradientBoostedTrees};
use crate::models::{rmse, Regressor};
use crate::preprocessing::split_features_target;

/// Параметр бустинга, доступный для подбора
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TunableParam {
    NEstimators,
    MaxDepth,
    LearningRate,
    Subsample,
    ColsampleBytree,
    RegAlpha,
    RegLambda,
    Gamma,
    MinChildSamples,
}

impl TunableParam {
    pub fn apply(self, params: &mut BoostingParams, value: f64) {
        match self {
            TunableParam::NEstimators => params.n_estimators = value.round().max(1.0) as usize,
            TunableParam::MaxDepth => params.max_depth = value.round().max(0.0) as usize,
            TunableParam::LearningRate => params.learning_rate = value,
            TunableParam::Subsample => params.subsample = value,
            TunableParam::ColsampleBytree => params.colsample_bytree = value,
            TunableParam::RegAlpha => params.reg_alpha = value,
            TunableParam::RegLambda => params.reg_lambda = value,
            TunableParam::Gamma => params.gamma = value,
            TunableParam::MinChildSamples => params.min_child_samples = value.round().max(1.0) as usize,
        }
    }
}

/// Способ перебора кандидатов
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Search {
    Grid,
    Random { n_iter: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningConfig {
    #[serde(default = "default_n_splits")]
    pub n_splits: usize,
    #[serde(default = "default_search")]
    pub search: Search,
    /// Доля строк, используемых для подбора
    #[serde(default)]
    pub data_fraction: Option<f64>,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_n_splits() -> usize { 5 }
fn default_search() -> Search { Search::Grid }
fn default_seed() -> u64 { 7 }

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            n_splits: default_n_splits(),
            search: default_search(),
            data_fraction: None,
            seed: default_seed(),
        }
    }
}

/// Результат одного кандидата
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub values: Vec<(TunableParam, f64)>,
    pub mean_rmse: f64,
    pub std_rmse: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningResult {
    pub candidates: Vec<Candidate>,
    pub best: Candidate,
    pub best_params: BoostingParams,
}

/// Подбор одного параметра по диапазону значений
pub fn tune_parameter(
    table: &Frame,
    base: &BoostingParams,
    param: TunableParam,
    range: &[f64],
    config: &TuningConfig,
) -> Result<TuningResult> {
    if range.is_empty() {
        return Err(FlowError::invalid("range", 0.0, "needs at least one value"));
    }
    let mut rng = StdRng::seed_from_u64(config.seed);
    let values: Vec<f64> = match config.search {
        Search::Grid => range.to_vec(),
        Search::Random { n_iter } => {
            let amount = n_iter.clamp(1, range.len());
            index::sample(&mut rng, range.len(), amount)
                .into_iter()
                .map(|i| range[i])
                .collect()
        }
    };
    let combos = values.into_iter().map(|v| vec![(param, v)]).collect();
    run_search(table, base, combos, config, &mut rng)
}

/// Случайный перебор комбинаций нескольких параметров
pub fn tune_all(
    table: &Frame,
    base: &BoostingParams,
    distribution: &[(TunableParam, Vec<f64>)],
    n_iter: usize,
    config: &TuningConfig,
) -> Result<TuningResult> {
    if distribution.iter().any(|(_, values)| values.is_empty()) || distribution.is_empty() {
        return Err(FlowError::invalid("distribution", 0.0, "every parameter needs values"));
    }
    let mut rng = StdRng::seed_from_u64(config.seed);
    let combos = (0..n_iter.max(1))
        .map(|_| {
            distribution
                .iter()
                .filter_map(|(param, values)| values.choose(&mut rng).map(|v| (*param, *v)))
                .collect()
        })
        .collect();
    run_search(table, base, combos, config, &mut rng)
}

fn run_search(
    table: &Frame,
    base: &BoostingParams,
    combos: Vec<Vec<(TunableParam, f64)>>,
    config: &TuningConfig,
    rng: &mut StdRng,
) -> Result<TuningResult> {
    let data = match config.data_fraction {
        Some(frac) if frac > 0.0 && frac <= 1.0 => {
            let amount = ((table.n_rows() as f64 * frac).round() as usize).max(1);
            table.sample_rows(amount, rng)
        }
        Some(frac) => return Err(FlowError::invalid("data_fraction", frac, "must lie in (0, 1]")),
        None => table.clone(),
    };
    let (features, y) = split_features_target(&data)?;
    let X = features.to_matrix();

    let mut candidates = Vec::with_capacity(combos.len());
    let mut best: Option<(Candidate, BoostingParams)> = None;
    for values in combos {
        let mut params = base.clone();
        for (param, value) in &values {
            param.apply(&mut params, *value);
        }
        params.validate()?;

        let (mean_rmse, std_rmse) = cross_validate(&X, &y, &params, config.n_splits)?;
        tracing::debug!("{:?}: RMSE {:.5} (+/- {:.5})", values, mean_rmse, std_rmse);

        let candidate = Candidate {
            values,
            mean_rmse,
            std_rmse,
        };
        if best.as_ref().map_or(true, |(b, _)| mean_rmse < b.mean_rmse) {
            best = Some((candidate.clone(), params));
        }
        candidates.push(candidate);
    }

    let (best, best_params) = best.ok_or_else(|| FlowError::Model("No candidates evaluated".to_string()))?;
    tracing::info!("Best: {:.5} using {:?}", best.mean_rmse, best.values);

    Ok(TuningResult {
        candidates,
        best,
        best_params,
    })
}

/// K-fold без перемешивания: среднее и стандартное отклонение RMSE
pub fn cross_validate(X: &Array2<f64>, y: &Array1<f64>, params: &BoostingParams, n_splits: usize) -> Result<(f64, f64)> {
    let n = X.nrows();
    if n_splits < 2 || n_splits > n {
        return Err(FlowError::invalid("n_splits", n_splits as f64, "must lie in [2, n_rows]"));
    }

    let mut scores = Vec::with_capacity(n_splits);
    let mut start = 0;
    for fold in 0..n_splits {
        // первые n % k фолдов на одну строку длиннее
        let size = n / n_splits + usize::from(fold < n % n_splits);
        let test: Vec<usize> = (start..start + size).collect();
        let train: Vec<usize> = (0..start).chain(start + size..n).collect();
        start += size;

        let mut model = GradientBoostedTrees::new(params.clone());
        model.fit(&X.select(Axis(0), &train), &y.select(Axis(0), &train))?;
        let pred = model.predict(&X.select(Axis(0), &test))?;
        scores.push(rmse(&y.select(Axis(0), &test), &pred));
    }

    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / scores.len() as f64;
    Ok((mean, variance.sqrt()))
}
