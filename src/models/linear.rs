//! Линейная базовая модель

#![allow(non_snake_case)]

use linfa::traits::{Fit, Predict};
use linfa::Dataset;
use linfa_linear::{FittedLinearRegression, LinearRegression};
use ndarray::{Array1, Array2};

use crate::error::{FlowError, Result};
use crate::models::Regressor;
use crate::preprocessing::DataNormalizer;

/// Метод наименьших квадратов на нормализованных признаках.
///
/// Служит точкой отсчета для бустинга: насколько деревья лучше линейной
/// зависимости `u_plus` от признаков.
pub struct LinearBaseline {
    normalizer: DataNormalizer,
    model: Option<FittedLinearRegression<f64>>,
}

impl LinearBaseline {
    pub fn new() -> Self {
        Self {
            normalizer: DataNormalizer::new(),
            model: None,
        }
    }

    /// Коэффициенты при нормализованных признаках
    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.model.as_ref().map(|m| m.params())
    }
}

impl Default for LinearBaseline {
    fn default() -> Self {
        Self::new()
    }
}

impl Regressor for LinearBaseline {
    fn name(&self) -> &'static str {
        "linear_baseline"
    }

    fn fit(&mut self, X: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if X.nrows() != y.len() {
            return Err(FlowError::Model(format!(
                "Feature matrix has {} rows, target has {}",
                X.nrows(),
                y.len()
            )));
        }
        let X_scaled = self.normalizer.fit_transform(X)?;
        let dataset = Dataset::new(X_scaled, y.clone());
        let model = LinearRegression::new()
            .fit(&dataset)
            .map_err(|e| FlowError::Model(e.to_string()))?;
        self.model = Some(model);
        tracing::info!("Linear baseline trained on {} rows", X.nrows());
        Ok(())
    }

    fn predict(&self, X: &Array2<f64>) -> Result<Array1<f64>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| FlowError::Model("Model not trained".to_string()))?;
        let X_scaled = self.normalizer.transform(X)?;
        Ok(model.predict(&X_scaled))
    }
}
