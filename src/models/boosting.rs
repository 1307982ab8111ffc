//! Градиентный бустинг регрессионных деревьев

#![allow(non_snake_case)]

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};
use crate::models::{rmse, Regressor};

/// Параметры бустинга в терминах XGBoost
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Доля строк на дерево
    #[serde(default = "default_fraction")]
    pub subsample: f64,
    /// Доля признаков на дерево
    #[serde(default = "default_fraction")]
    pub colsample_bytree: f64,
    /// L1 регуляризация весов листьев
    #[serde(default = "default_regularization")]
    pub reg_alpha: f64,
    /// L2 регуляризация весов листьев
    #[serde(default = "default_regularization")]
    pub reg_lambda: f64,
    /// Минимальный выигрыш для разбиения
    #[serde(default = "default_regularization")]
    pub gamma: f64,
    #[serde(default = "default_min_child_samples")]
    pub min_child_samples: usize,
    /// Число кандидатов порога на признак
    #[serde(default = "default_max_bins")]
    pub max_bins: usize,
    #[serde(default = "default_early_stopping")]
    pub early_stopping_rounds: Option<usize>,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_n_estimators() -> usize { 100 }
fn default_max_depth() -> usize { 7 }
fn default_learning_rate() -> f64 { 0.1 }
fn default_fraction() -> f64 { 0.9 }
fn default_regularization() -> f64 { 10.0 }
fn default_min_child_samples() -> usize { 1 }
fn default_max_bins() -> usize { 64 }
fn default_early_stopping() -> Option<usize> { Some(50) }
fn default_seed() -> u64 { 100 }

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: default_n_estimators(),
            max_depth: default_max_depth(),
            learning_rate: default_learning_rate(),
            subsample: default_fraction(),
            colsample_bytree: default_fraction(),
            reg_alpha: default_regularization(),
            reg_lambda: default_regularization(),
            gamma: default_regularization(),
            min_child_samples: default_min_child_samples(),
            max_bins: default_max_bins(),
            early_stopping_rounds: default_early_stopping(),
            seed: default_seed(),
        }
    }
}

impl BoostingParams {
    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(FlowError::invalid("n_estimators", 0.0, "must be at least 1"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(FlowError::invalid("learning_rate", self.learning_rate, "must be positive"));
        }
        for (name, value) in [("subsample", self.subsample), ("colsample_bytree", self.colsample_bytree)] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(FlowError::invalid(name, value, "must lie in (0, 1]"));
            }
        }
        for (name, value) in [
            ("reg_alpha", self.reg_alpha),
            ("reg_lambda", self.reg_lambda),
            ("gamma", self.gamma),
        ] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(FlowError::invalid(name, value, "must be non-negative"));
            }
        }
        if self.max_bins < 2 {
            return Err(FlowError::invalid("max_bins", self.max_bins as f64, "must be at least 2"));
        }
        Ok(())
    }
}

/// Оценочная выборка для истории обучения
pub struct EvalSet<'a> {
    pub name: String,
    pub X: &'a Array2<f64>,
    pub y: &'a Array1<f64>,
}

impl<'a> EvalSet<'a> {
    pub fn new(name: impl Into<String>, X: &'a Array2<f64>, y: &'a Array1<f64>) -> Self {
        Self {
            name: name.into(),
            X,
            y,
        }
    }
}

/// RMSE по раундам для каждой оценочной выборки
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalHistory {
    pub sets: Vec<(String, Vec<f64>)>,
    pub best_iteration: Option<usize>,
}

impl EvalHistory {
    pub fn rmse(&self, name: &str) -> Option<&[f64]> {
        self.sets
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values.as_slice())
    }
}

#[derive(Debug, Clone)]
enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn predict_row(&self, X: &Array2<f64>, row: usize) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if X[[row, *feature]] < *threshold { &**left } else { &**right };
                }
            }
        }
    }
}

/// Сумма с L1 порогом: sign(g) * max(|g| - alpha, 0)
fn soft_threshold(g: f64, alpha: f64) -> f64 {
    g.signum() * (g.abs() - alpha).max(0.0)
}

struct TreeBuilder<'a> {
    X: &'a Array2<f64>,
    residuals: &'a Array1<f64>,
    features: &'a [usize],
    thresholds: &'a [Vec<f64>],
    params: &'a BoostingParams,
    gains: &'a mut Vec<f64>,
}

impl TreeBuilder<'_> {
    fn score(&self, sum: f64, count: usize) -> f64 {
        let g = soft_threshold(sum, self.params.reg_alpha);
        g * g / (count as f64 + self.params.reg_lambda)
    }

    fn leaf(&self, indices: &[usize]) -> TreeNode {
        let sum: f64 = indices.iter().map(|&i| self.residuals[i]).sum();
        let value = soft_threshold(sum, self.params.reg_alpha)
            / (indices.len() as f64 + self.params.reg_lambda);
        TreeNode::Leaf { value }
    }

    fn build(&mut self, indices: Vec<usize>, depth: usize) -> TreeNode {
        if depth >= self.params.max_depth || indices.len() < 2 * self.params.min_child_samples.max(1) {
            return self.leaf(&indices);
        }

        let total: f64 = indices.iter().map(|&i| self.residuals[i]).sum();
        let parent_score = self.score(total, indices.len());

        // Поиск лучшего разделения
        let mut best: Option<(usize, f64, f64)> = None;
        for &feature in self.features {
            for &threshold in &self.thresholds[feature] {
                let (mut left_sum, mut left_count) = (0.0, 0usize);
                for &i in &indices {
                    if self.X[[i, feature]] < threshold {
                        left_sum += self.residuals[i];
                        left_count += 1;
                    }
                }
                let right_count = indices.len() - left_count;
                if left_count < self.params.min_child_samples.max(1)
                    || right_count < self.params.min_child_samples.max(1)
                {
                    continue;
                }

                let gain = 0.5
                    * (self.score(left_sum, left_count)
                        + self.score(total - left_sum, right_count)
                        - parent_score)
                    - self.params.gamma;
                if gain > 0.0 && best.map_or(true, |(_, _, g)| gain > g) {
                    best = Some((feature, threshold, gain));
                }
            }
        }

        let Some((feature, threshold, gain)) = best else {
            return self.leaf(&indices);
        };
        self.gains[feature] += gain;

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| self.X[[i, feature]] < threshold);

        TreeNode::Split {
            feature,
            threshold,
            left: Box::new(self.build(left, depth + 1)),
            right: Box::new(self.build(right, depth + 1)),
        }
    }
}

/// Пороги-кандидаты: середины между соседними квантилями
fn candidate_thresholds(X: &Array2<f64>, feature: usize, rows: &[usize], max_bins: usize) -> Vec<f64> {
    let mut values: Vec<f64> = rows
        .iter()
        .map(|&i| X[[i, feature]])
        .filter(|v| !v.is_nan())
        .collect();
    values.sort_by(|a, b| a.total_cmp(b));
    values.dedup();
    if values.len() < 2 {
        return Vec::new();
    }

    let step = ((values.len() - 1) as f64 / (max_bins - 1) as f64).max(1.0);
    let mut thresholds = Vec::with_capacity(max_bins);
    let mut pos = 0.0;
    while (pos as usize) + 1 < values.len() {
        let k = pos as usize;
        thresholds.push(0.5 * (values[k] + values[k + 1]));
        pos += step;
    }
    thresholds.dedup();
    thresholds
}

/// Бустинг деревьев с квадратичной функцией потерь
#[derive(Debug, Clone)]
pub struct GradientBoostedTrees {
    params: BoostingParams,
    base_score: f64,
    trees: Vec<TreeNode>,
    n_features: Option<usize>,
    importance: Vec<f64>,
    history: EvalHistory,
}

impl GradientBoostedTrees {
    pub fn new(params: BoostingParams) -> Self {
        Self {
            params,
            base_score: 0.0,
            trees: Vec::new(),
            n_features: None,
            importance: Vec::new(),
            history: EvalHistory::default(),
        }
    }

    pub fn params(&self) -> &BoostingParams {
        &self.params
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn history(&self) -> &EvalHistory {
        &self.history
    }

    /// Суммарный выигрыш разбиений по каждому признаку, нормированный к 1
    pub fn feature_importance(&self) -> Vec<f64> {
        let total: f64 = self.importance.iter().sum();
        if total > 0.0 {
            self.importance.iter().map(|g| g / total).collect()
        } else {
            self.importance.clone()
        }
    }

    /// Обучение с историей RMSE на оценочных выборках.
    ///
    /// Ранняя остановка следит за последней выборкой; модель обрезается до
    /// лучшей итерации.
    pub fn fit_with_eval(&mut self, X: &Array2<f64>, y: &Array1<f64>, evals: &[EvalSet<'_>]) -> Result<()> {
        self.params.validate()?;
        if X.nrows() == 0 || X.ncols() == 0 {
            return Err(FlowError::Model("Empty dataset".to_string()));
        }
        if X.nrows() != y.len() {
            return Err(FlowError::Model(format!(
                "Feature matrix has {} rows, target has {}",
                X.nrows(),
                y.len()
            )));
        }
        for eval in evals {
            if eval.X.ncols() != X.ncols() || eval.X.nrows() != eval.y.len() {
                return Err(FlowError::Model(format!("Eval set {} has wrong shape", eval.name)));
            }
        }

        let n_rows = X.nrows();
        let n_features = X.ncols();
        let mut rng = StdRng::seed_from_u64(self.params.seed);

        self.base_score = y.mean().unwrap_or(0.0);
        self.trees.clear();
        self.n_features = Some(n_features);
        self.importance = vec![0.0; n_features];

        let mut train_pred = Array1::from_elem(n_rows, self.base_score);
        let mut eval_preds: Vec<Array1<f64>> = evals
            .iter()
            .map(|e| Array1::from_elem(e.X.nrows(), self.base_score))
            .collect();
        let mut history: Vec<(String, Vec<f64>)> = evals.iter().map(|e| (e.name.clone(), Vec::new())).collect();

        let n_sub = ((n_rows as f64 * self.params.subsample).round() as usize).clamp(1, n_rows);
        let n_cols = ((n_features as f64 * self.params.colsample_bytree).round() as usize).clamp(1, n_features);

        let mut best: Option<(usize, f64)> = None;

        for round in 0..self.params.n_estimators {
            let residuals = y - &train_pred;

            let mut rows = index::sample(&mut rng, n_rows, n_sub).into_vec();
            rows.sort_unstable();
            let mut features = index::sample(&mut rng, n_features, n_cols).into_vec();
            features.sort_unstable();

            let thresholds: Vec<Vec<f64>> = (0..n_features)
                .map(|f| {
                    if features.contains(&f) {
                        candidate_thresholds(X, f, &rows, self.params.max_bins)
                    } else {
                        Vec::new()
                    }
                })
                .collect();

            let tree = TreeBuilder {
                X,
                residuals: &residuals,
                features: &features,
                thresholds: &thresholds,
                params: &self.params,
                gains: &mut self.importance,
            }
            .build(rows, 0);

            let lr = self.params.learning_rate;
            for i in 0..n_rows {
                train_pred[i] += lr * tree.predict_row(X, i);
            }
            for (eval, pred) in evals.iter().zip(eval_preds.iter_mut()) {
                for i in 0..eval.X.nrows() {
                    pred[i] += lr * tree.predict_row(eval.X, i);
                }
            }
            self.trees.push(tree);

            for ((eval, pred), (_, scores)) in evals.iter().zip(eval_preds.iter()).zip(history.iter_mut()) {
                scores.push(rmse(eval.y, pred));
            }

            if round % 5 == 0 {
                let line: Vec<String> = history
                    .iter()
                    .filter_map(|(name, scores)| scores.last().map(|s| format!("{}-rmse: {:.5}", name, s)))
                    .collect();
                tracing::debug!("[{}] {}", round, line.join("  "));
            }

            // Ранняя остановка по последней оценочной выборке
            if let Some((_, scores)) = history.last() {
                let current = scores[scores.len() - 1];
                if best.map_or(true, |(_, b)| current < b) {
                    best = Some((round, current));
                }
                if let (Some(patience), Some((best_round, _))) = (self.params.early_stopping_rounds, best) {
                    if round - best_round >= patience {
                        tracing::info!(
                            "Early stopping at round {}, best round {}",
                            round,
                            best_round
                        );
                        break;
                    }
                }
            }
        }

        // без ранней остановки модель сохраняет все деревья
        if let (Some(_), Some((best_round, _))) = (self.params.early_stopping_rounds, best) {
            self.trees.truncate(best_round + 1);
        }
        self.history = EvalHistory {
            sets: history,
            best_iteration: best.map(|(round, _)| round),
        };

        tracing::info!(
            "Boosted model trained: {} trees, {} rows, {} features",
            self.trees.len(),
            n_rows,
            n_features
        );
        Ok(())
    }
}

impl Regressor for GradientBoostedTrees {
    fn name(&self) -> &'static str {
        "gradient_boosted_trees"
    }

    fn fit(&mut self, X: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.fit_with_eval(X, y, &[])
    }

    fn predict(&self, X: &Array2<f64>) -> Result<Array1<f64>> {
        let n_features = self
            .n_features
            .ok_or_else(|| FlowError::Model("Model not trained".to_string()))?;
        if X.ncols() != n_features {
            return Err(FlowError::Model(format!(
                "Model trained on {} features, got {}",
                n_features,
                X.ncols()
            )));
        }

        let lr = self.params.learning_rate;
        Ok(Array1::from_shape_fn(X.nrows(), |i| {
            self.base_score + self.trees.iter().map(|t| lr * t.predict_row(X, i)).sum::<f64>()
        }))
    }
}
