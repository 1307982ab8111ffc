/// Типы данных для API

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};
use crate::frame::Frame;
use crate::models::boosting::BoostingParams;
use crate::models::evaluation::{Comparison, Scores, WallProfile};
use crate::models::training::TrainingReport;
use crate::models::tuning::{TunableParam, TuningConfig};
use crate::preprocessing::AugmentationPlan;
use crate::schema::Column;
use crate::snapshot::Snapshot;

/// Столбец таблицы; `null` соответствует NaN
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnData {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// Таблица в виде списка столбцов
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableData {
    pub columns: Vec<ColumnData>,
}

impl TryFrom<TableData> for Frame {
    type Error = FlowError;

    fn try_from(table: TableData) -> Result<Self> {
        Frame::from_columns(table.columns.into_iter().map(|column| {
            let values = column.values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
            (column.name, values)
        }))
    }
}

impl From<&Frame> for TableData {
    fn from(frame: &Frame) -> Self {
        TableData {
            columns: frame
                .iter()
                .map(|(name, values)| ColumnData {
                    name: name.to_string(),
                    values: values.iter().map(|v| (!v.is_nan()).then_some(*v)).collect(),
                })
                .collect(),
        }
    }
}

/// Снимок: таблица и вязкость, если в таблице нет столбца `viscosity`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotData {
    pub table: TableData,
    #[serde(default)]
    pub viscosity: Option<f64>,
}

impl SnapshotData {
    /// Вязкость из запроса; значение по умолчанию только если в таблице
    /// нет столбца `viscosity`
    pub fn into_snapshot(self, default_viscosity: Option<f64>) -> Result<Snapshot> {
        let frame = Frame::try_from(self.table)?;
        let viscosity = match self.viscosity {
            Some(v) => Some(v),
            None if frame.has(Column::Viscosity) => None,
            None => default_viscosity,
        };
        Snapshot::new(frame, viscosity)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeriveRequest {
    pub snapshot: SnapshotData,
    /// Вернуть только канонический набор столбцов
    #[serde(default)]
    pub required_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescaleRequest {
    pub snapshot: SnapshotData,
    #[serde(default)]
    pub new_delta: Option<f64>,
    #[serde(default)]
    pub new_viscosity: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescaleResponse {
    pub delta: f64,
    pub viscosity: f64,
    pub table: TableData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AugmentRequest {
    pub snapshots: Vec<SnapshotData>,
    #[serde(default)]
    pub plan: AugmentationPlan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AugmentResponse {
    pub n_rows: usize,
    pub table: TableData,
}

/// Дополнительная оценочная выборка (сырой снимок)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedSnapshot {
    pub name: String,
    pub snapshot: SnapshotData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainRequest {
    pub snapshots: Vec<SnapshotData>,
    #[serde(default)]
    pub plan: AugmentationPlan,
    /// Параметры бустинга; по умолчанию из конфигурации
    #[serde(default)]
    pub params: Option<BoostingParams>,
    #[serde(default)]
    pub eval_sets: Vec<NamedSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateRequest {
    pub snapshot: SnapshotData,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub profile_limit: Option<usize>,
}

fn default_threshold() -> f64 { 0.1 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateResponse {
    pub scores: Scores,
    pub comparisons: Vec<Comparison>,
    pub profile: WallProfile,
}

/// Подбор одного параметра (`param` + `range`) или случайный перебор
/// по `distribution`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuneRequest {
    pub snapshots: Vec<SnapshotData>,
    #[serde(default)]
    pub plan: AugmentationPlan,
    #[serde(default)]
    pub params: Option<BoostingParams>,
    #[serde(default)]
    pub param: Option<TunableParam>,
    #[serde(default)]
    pub range: Vec<f64>,
    #[serde(default)]
    pub distribution: Vec<(TunableParam, Vec<f64>)>,
    #[serde(default = "default_n_iter")]
    pub n_iter: usize,
    #[serde(default)]
    pub config: TuningConfig,
}

fn default_n_iter() -> usize { 10 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainResponse {
    pub feature_names: Vec<String>,
    pub report: TrainingReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_nan_maps_to_null() {
        let json = r#"{"columns": [{"name": "delta", "values": [1.0, null]}]}"#;
        let table: TableData = serde_json::from_str(json).unwrap();
        let frame = Frame::try_from(table).unwrap();
        assert_eq!(frame.n_rows(), 2);
        assert!(frame.has_nan());

        let back = TableData::from(&frame);
        assert_eq!(back.columns[0].values, vec![Some(1.0), None]);
    }

    #[test]
    fn test_ragged_table_rejected() {
        let table = TableData {
            columns: vec![
                ColumnData {
                    name: "a".to_string(),
                    values: vec![Some(1.0)],
                },
                ColumnData {
                    name: "b".to_string(),
                    values: vec![Some(1.0), Some(2.0)],
                },
            ],
        };
        assert!(matches!(
            Frame::try_from(table),
            Err(FlowError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_tune_request_defaults() {
        let json = r#"{"snapshots": [], "param": "max_depth", "range": [3, 5, 7]}"#;
        let request: TuneRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.param, Some(TunableParam::MaxDepth));
        assert_eq!(request.n_iter, 10);
        assert_eq!(request.config.n_splits, 5);
        assert!(request.plan.inclusive);
    }
}
