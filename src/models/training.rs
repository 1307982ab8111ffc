//! Обучение модели бустинга на канонической таблице

#![allow(non_snake_case)]

use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};
use crate::frame::Frame;
use crate::models::boosting::{BoostingParams, EvalHistory, EvalSet, GradientBoostedTrees};
use crate::models::linear::LinearBaseline;
use crate::models::{rmse, Regressor};
use crate::preprocessing::{split_features_target, FeatureDeriver, SchemaMode};

/// Доля валидационной выборки
pub const VALIDATION_FRACTION: f64 = 0.3;
pub const SPLIT_SEED: u64 = 100;

/// Перемешивание строк и разделение на (train, test)
pub fn train_test_split(table: &Frame, test_fraction: f64, seed: u64) -> Result<(Frame, Frame)> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(FlowError::invalid("test_fraction", test_fraction, "must lie in (0, 1)"));
    }
    let mut indices: Vec<usize> = (0..table.n_rows()).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_test = (table.n_rows() as f64 * test_fraction).ceil() as usize;
    let (test, train) = indices.split_at(n_test.min(indices.len()));
    Ok((table.take_rows(train), table.take_rows(test)))
}

struct Matrices {
    X: Array2<f64>,
    y: Array1<f64>,
}

/// Признаки и цель канонической таблицы
fn matrices(table: &Frame) -> Result<(Vec<String>, Matrices)> {
    let (features, target) = split_features_target(table)?;
    Ok((
        features.names().to_vec(),
        Matrices {
            X: features.to_matrix(),
            y: target,
        },
    ))
}

/// Сводка обучения
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub n_train: usize,
    pub n_validation: usize,
    pub n_trees: usize,
    pub best_iteration: Option<usize>,
    pub train_rmse: f64,
    pub validation_rmse: f64,
    /// RMSE линейной модели на той же валидации
    pub baseline_rmse: Option<f64>,
    pub feature_importance: Vec<(String, f64)>,
    pub history: EvalHistory,
}

/// Обученная модель вместе с порядком признаков
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub model: GradientBoostedTrees,
    pub feature_names: Vec<String>,
    pub report: TrainingReport,
}

impl TrainedModel {
    /// Предсказание по таблице признаков с проверкой порядка столбцов
    pub fn predict_features(&self, features: &Frame) -> Result<Array1<f64>> {
        if features.names() != self.feature_names.as_slice() {
            return Err(FlowError::SchemaMismatch {
                expected: self.feature_names.clone(),
                actual: features.names().to_vec(),
            });
        }
        self.model.predict(&features.to_matrix())
    }
}

impl Regressor for TrainedModel {
    fn name(&self) -> &'static str {
        self.model.name()
    }

    fn fit(&mut self, X: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.model.fit(X, y)
    }

    fn predict(&self, X: &Array2<f64>) -> Result<Array1<f64>> {
        self.model.predict(X)
    }
}

/// Сессия обучения: разбиение 70/30 и дополнительные оценочные выборки
pub struct TrainingSession {
    params: BoostingParams,
    feature_names: Vec<String>,
    train: Matrices,
    validation: Matrices,
    extra: Vec<(String, Matrices)>,
}

impl TrainingSession {
    /// `table` должна быть в каноническом наборе столбцов
    pub fn new(params: BoostingParams, table: &Frame) -> Result<Self> {
        params.validate()?;
        if table.n_rows() < 2 {
            return Err(FlowError::Model("Need at least 2 rows for training".to_string()));
        }
        let (train, validation) = train_test_split(table, VALIDATION_FRACTION, SPLIT_SEED)?;
        let (feature_names, train) = matrices(&train)?;
        let (_, validation) = matrices(&validation)?;

        tracing::info!(
            "Training session: {} train rows, {} validation rows, features {:?}",
            train.y.len(),
            validation.y.len(),
            feature_names
        );

        Ok(Self {
            params,
            feature_names,
            train,
            validation,
            extra: Vec::new(),
        })
    }

    pub fn params(&self) -> &BoostingParams {
        &self.params
    }

    /// Параметры для следующего обучения
    pub fn set_params(&mut self, params: BoostingParams) -> Result<()> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    /// Дополнительная оценочная выборка из сырого снимка
    pub fn add_eval_set(&mut self, name: impl Into<String>, raw: &Frame, deriver: &FeatureDeriver) -> Result<()> {
        let table = deriver.derive(raw, SchemaMode::Required)?;
        let (names, matrices) = matrices(&table)?;
        if names != self.feature_names {
            return Err(FlowError::SchemaMismatch {
                expected: self.feature_names.clone(),
                actual: names,
            });
        }
        self.extra.push((name.into(), matrices));
        Ok(())
    }

    /// Обучение с историей на train, validation и дополнительных выборках
    pub fn fit(&self) -> Result<TrainedModel> {
        let started_at = Utc::now();

        let mut evals = vec![
            EvalSet::new("train", &self.train.X, &self.train.y),
            EvalSet::new("validation", &self.validation.X, &self.validation.y),
        ];
        for (name, m) in &self.extra {
            evals.push(EvalSet::new(name.clone(), &m.X, &m.y));
        }

        let mut model = GradientBoostedTrees::new(self.params.clone());
        model.fit_with_eval(&self.train.X, &self.train.y, &evals)?;

        let train_rmse = rmse(&self.train.y, &model.predict(&self.train.X)?);
        let validation_rmse = rmse(&self.validation.y, &model.predict(&self.validation.X)?);
        let feature_importance = self
            .feature_names
            .iter()
            .cloned()
            .zip(model.feature_importance())
            .collect();

        let baseline_rmse = self.baseline_rmse();

        let finished_at = Utc::now();
        tracing::info!(
            "Training completed in {} ms: train RMSE {:.4}, validation RMSE {:.4}",
            (finished_at - started_at).num_milliseconds(),
            train_rmse,
            validation_rmse
        );

        let report = TrainingReport {
            started_at,
            finished_at,
            n_train: self.train.y.len(),
            n_validation: self.validation.y.len(),
            n_trees: model.n_trees(),
            best_iteration: model.history().best_iteration,
            train_rmse,
            validation_rmse,
            baseline_rmse,
            feature_importance,
            history: model.history().clone(),
        };

        Ok(TrainedModel {
            model,
            feature_names: self.feature_names.clone(),
            report,
        })
    }

    fn baseline_rmse(&self) -> Option<f64> {
        let mut baseline = LinearBaseline::new();
        let result = baseline
            .fit(&self.train.X, &self.train.y)
            .and_then(|_| baseline.predict(&self.validation.X));
        match result {
            Ok(pred) => Some(rmse(&self.validation.y, &pred)),
            Err(e) => {
                tracing::warn!("Linear baseline skipped: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, REQUIRED_COLUMNS};

    /// Каноническая таблица с u_plus как функцией VELOC:0
    fn canonical(n: usize) -> Frame {
        let mut frame = Frame::new();
        for (k, column) in REQUIRED_COLUMNS.iter().enumerate() {
            let values: Vec<f64> = (0..n).map(|i| ((i * (k + 3)) % 17) as f64).collect();
            frame.set(*column, values.into()).unwrap();
        }
        let u_plus = frame.get(Column::VelocX).unwrap().mapv(|v| if v < 8.0 { 2.0 } else { 9.0 });
        frame.set(Column::UPlus, u_plus).unwrap();
        frame
    }

    fn fast_params() -> BoostingParams {
        BoostingParams {
            n_estimators: 40,
            max_depth: 3,
            learning_rate: 0.3,
            subsample: 1.0,
            colsample_bytree: 1.0,
            reg_alpha: 0.0,
            reg_lambda: 1.0,
            gamma: 0.0,
            ..BoostingParams::default()
        }
    }

    #[test]
    fn test_split_sizes_and_disjointness() {
        let table = canonical(100);
        let (train, test) = train_test_split(&table, 0.3, SPLIT_SEED).unwrap();
        assert_eq!(train.n_rows(), 70);
        assert_eq!(test.n_rows(), 30);
        assert!(train_test_split(&table, 1.0, 1).is_err());
    }

    #[test]
    fn test_session_trains_and_reports() {
        let session = TrainingSession::new(fast_params(), &canonical(200)).unwrap();
        let trained = session.fit().unwrap();

        assert_eq!(
            trained.feature_names,
            vec!["delta", "Points:1", "AVVEL:0", "VELOC:0", "Local_Re", "Local_u_tau", "Local_Re_log"]
        );
        assert_eq!(trained.report.n_train + trained.report.n_validation, 200);
        assert!(trained.report.validation_rmse < 1.0);
        assert!(trained.report.finished_at >= trained.report.started_at);
        assert!(trained.report.history.rmse("validation").is_some());

        let (velocity, _) = trained
            .report
            .feature_importance
            .iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap();
        assert_eq!(velocity, "VELOC:0");
    }

    #[test]
    fn test_predict_features_checks_columns() {
        let table = canonical(60);
        let trained = TrainingSession::new(fast_params(), &table).unwrap().fit().unwrap();
        let (features, _) = split_features_target(&table).unwrap();
        assert_eq!(trained.predict_features(&features).unwrap().len(), 60);

        let shuffled = features.drop_columns(&[Column::Delta]);
        assert!(matches!(
            trained.predict_features(&shuffled),
            Err(FlowError::SchemaMismatch { .. })
        ));
    }
}
