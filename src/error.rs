//! Ошибки движка

use thiserror::Error;

/// Ошибки подготовки данных и обучения
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FlowError {
    /// Отсутствует обязательный столбец
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    /// Несколько значений там, где ожидается одна константа на снимок
    #[error("Column {column} must hold a single value, found {found:?}")]
    InconsistentValue { column: String, found: Vec<f64> },

    /// Набор столбцов не совпал с каноническим
    #[error("Column set mismatch: expected {expected:?}, got {actual:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    /// Параметр вне физически допустимой области
    #[error("Invalid parameter {name} = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    /// Снимок без строк
    #[error("Snapshot table has no rows")]
    EmptyTable,

    /// Столбец другой длины
    #[error("Column {column} has {actual} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    /// Ошибка обучения или предсказания
    #[error("Model error: {0}")]
    Model(String),
}

pub type Result<T> = std::result::Result<T, FlowError>;

impl FlowError {
    pub(crate) fn invalid(name: &'static str, value: f64, reason: &'static str) -> Self {
        FlowError::InvalidParameter {
            name,
            value,
            reason,
        }
    }
}

/// Проверка строго положительного конечного параметра
pub(crate) fn ensure_positive(name: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(FlowError::invalid(name, value, "must be positive and finite"))
    }
}
