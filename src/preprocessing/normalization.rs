//! Нормализация признаков

#![allow(non_snake_case)]

use ndarray::{Array1, Array2, Axis};

use crate::error::{FlowError, Result};

/// Z-score нормализация по столбцам матрицы признаков
#[derive(Debug, Clone)]
pub struct DataNormalizer {
    mean: Option<Array1<f64>>,
    std: Option<Array1<f64>>,
}

impl DataNormalizer {
    pub fn new() -> Self {
        Self {
            mean: None,
            std: None,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.mean.is_some() && self.std.is_some()
    }

    pub fn fit(&mut self, X: &Array2<f64>) -> Result<()> {
        if X.nrows() == 0 {
            return Err(FlowError::Model("Empty dataset".to_string()));
        }

        self.mean = X.mean_axis(Axis(0));
        let mut std = X.std_axis(Axis(0), 0.0);

        // Избегаем деления на ноль
        for val in std.iter_mut() {
            if *val < 1e-10 {
                *val = 1.0;
            }
        }
        self.std = Some(std);

        Ok(())
    }

    pub fn transform(&self, X: &Array2<f64>) -> Result<Array2<f64>> {
        let (mean, std) = match (&self.mean, &self.std) {
            (Some(mean), Some(std)) => (mean, std),
            _ => return Err(FlowError::Model("Normalizer not fitted".to_string())),
        };
        if X.ncols() != mean.len() {
            return Err(FlowError::Model(format!(
                "Normalizer fitted on {} features, got {}",
                mean.len(),
                X.ncols()
            )));
        }

        // (X - mean) / std
        Ok((X - mean) / std)
    }

    pub fn fit_transform(&mut self, X: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(X)?;
        self.transform(X)
    }
}

impl Default for DataNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_zero_mean_unit_std() {
        let X = array![[1.0, 10.0], [3.0, 10.0], [5.0, 10.0]];
        let mut normalizer = DataNormalizer::new();
        let scaled = normalizer.fit_transform(&X).unwrap();

        let mean = scaled.mean_axis(Axis(0)).unwrap();
        assert!(mean.iter().all(|m| m.abs() < 1e-12));
        // постоянный столбец не делится на ноль
        assert!(scaled.column(1).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_transform_requires_fit() {
        let normalizer = DataNormalizer::new();
        assert!(normalizer.transform(&array![[1.0]]).is_err());
    }
}
