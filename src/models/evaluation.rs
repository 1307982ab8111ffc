//! Оценка обученной модели на новом снимке

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};
use crate::frame::Frame;
use crate::models::{mae, mse, r2, rmse, Regressor};
use crate::preprocessing::{split_features_target, FeatureDeriver, SchemaMode};
use crate::schema::Column;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Rmse,
    Mse,
    Mae,
    R2,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub rmse: f64,
    pub mse: f64,
    pub mae: f64,
    pub r2: f64,
}

/// Строка с ошибкой выше порога
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub actual: f64,
    pub predicted: f64,
}

/// Профиль у стенки: по одной точке на каждую высоту `Points:1`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WallProfile {
    pub y_plus: Vec<f64>,
    pub u_plus: Vec<f64>,
    pub predictions: Vec<f64>,
}

/// Каноническая таблица снимка вместе с предсказаниями модели
#[derive(Debug, Clone)]
pub struct Evaluation {
    table: Frame,
    actual: Array1<f64>,
    predicted: Array1<f64>,
}

impl Evaluation {
    /// Признаки сырого снимка, предсказание и столбец `predictions`
    pub fn run(model: &dyn Regressor, raw: &Frame, deriver: &FeatureDeriver) -> Result<Self> {
        let mut table = deriver.derive(raw, SchemaMode::Required)?;
        let (features, actual) = split_features_target(&table)?;
        let predicted = model.predict(&features.to_matrix())?;
        if predicted.len() != actual.len() {
            return Err(FlowError::Model(format!(
                "{} returned {} predictions for {} rows",
                model.name(),
                predicted.len(),
                actual.len()
            )));
        }
        table.set(Column::Predictions, predicted.clone())?;

        tracing::info!(
            "Evaluated {} on {} rows: RMSE {:.5}",
            model.name(),
            actual.len(),
            rmse(&actual, &predicted)
        );

        Ok(Self {
            table,
            actual,
            predicted,
        })
    }

    /// Каноническая таблица со столбцом `predictions`
    pub fn table(&self) -> &Frame {
        &self.table
    }

    pub fn predictions(&self) -> &Array1<f64> {
        &self.predicted
    }

    pub fn score(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Rmse => rmse(&self.actual, &self.predicted),
            Metric::Mse => mse(&self.actual, &self.predicted),
            Metric::Mae => mae(&self.actual, &self.predicted),
            Metric::R2 => r2(&self.actual, &self.predicted),
        }
    }

    pub fn scores(&self) -> Scores {
        Scores {
            rmse: self.score(Metric::Rmse),
            mse: self.score(Metric::Mse),
            mae: self.score(Metric::Mae),
            r2: self.score(Metric::R2),
        }
    }

    /// Строки, где `|actual - predicted| >= threshold`; нулевой порог
    /// оставляет все строки
    pub fn compare(&self, threshold: f64) -> Vec<Comparison> {
        self.actual
            .iter()
            .zip(self.predicted.iter())
            .filter(|(a, p)| (*a - *p).abs() >= threshold)
            .map(|(&actual, &predicted)| Comparison { actual, predicted })
            .collect()
    }

    /// Средние `y_plus`, `u_plus` и предсказаний по каждой высоте `Points:1`
    /// в порядке удаления от стенки.
    ///
    /// `limit` ограничивает число высот.
    pub fn wall_profile(&self, limit: Option<usize>) -> Result<WallProfile> {
        let y = self.table.get(Column::PointY)?;
        let y_plus = self.table.get(Column::YPlus)?;

        let mut order: Vec<usize> = (0..y.len()).filter(|&i| !y[i].is_nan()).collect();
        order.sort_by(|&a, &b| y[a].total_cmp(&y[b]));

        let mut groups: Vec<Vec<usize>> = Vec::new();
        for i in order {
            match groups.last_mut() {
                Some(group) if y[group[0]] == y[i] => group.push(i),
                _ => groups.push(vec![i]),
            }
        }
        if let Some(limit) = limit {
            groups.truncate(limit);
        }

        let mut profile = WallProfile::default();
        for group in &groups {
            let mean = |values: &Array1<f64>| group.iter().map(|&i| values[i]).sum::<f64>() / group.len() as f64;
            profile.y_plus.push(mean(y_plus));
            profile.u_plus.push(mean(&self.actual));
            profile.predictions.push(mean(&self.predicted));
        }
        Ok(profile)
    }
}
