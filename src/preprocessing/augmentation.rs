//! Сборка обучающей выборки из одного снимка и его пересчетов

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};
use crate::frame::Frame;
use crate::preprocessing::feature_engineering::{add_off_wall_scaling, FeatureDeriver, SchemaMode};
use crate::preprocessing::similarity::{rescale_height, rescale_viscosity, with_wall_units};
use crate::snapshot::Snapshot;

/// Сколько строк брать из снимка перед пересчетом
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Sampling {
    All,
    Rows(usize),
    Fraction(f64),
}

impl Default for Sampling {
    fn default() -> Self {
        Sampling::Rows(10_000)
    }
}

impl Sampling {
    /// Число строк выборки; пустая выборка считается ошибкой плана
    fn amount(&self, n_rows: usize) -> Result<usize> {
        let amount = match *self {
            Sampling::All => n_rows,
            Sampling::Rows(rows) => rows.min(n_rows),
            Sampling::Fraction(frac) if frac > 0.0 && frac <= 1.0 => (n_rows as f64 * frac).round() as usize,
            Sampling::Fraction(frac) => {
                return Err(FlowError::invalid("sample_fraction", frac, "must lie in (0, 1]"))
            }
        };
        if amount > 0 {
            return Ok(amount);
        }
        Err(match *self {
            Sampling::Fraction(frac) => FlowError::invalid("sample_fraction", frac, "selects no rows"),
            Sampling::Rows(rows) => FlowError::invalid("sample_rows", rows as f64, "selects no rows"),
            Sampling::All => FlowError::EmptyTable,
        })
    }
}

/// План пересчетов одного снимка
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentationPlan {
    #[serde(default)]
    pub sampling: Sampling,
    #[serde(default)]
    pub new_deltas: Vec<f64>,
    #[serde(default)]
    pub new_viscosities: Vec<f64>,
    /// Добавить исходный снимок целиком
    #[serde(default)]
    pub keep_original: bool,
    /// Добавить саму выборку без пересчета
    #[serde(default = "default_inclusive")]
    pub inclusive: bool,
    /// Слой для `dim_*` признаков
    #[serde(default)]
    pub off_wall_layer: Option<usize>,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_inclusive() -> bool { true }
fn default_seed() -> u64 { 100 }

impl Default for AugmentationPlan {
    fn default() -> Self {
        Self {
            sampling: Sampling::default(),
            new_deltas: Vec::new(),
            new_viscosities: Vec::new(),
            keep_original: false,
            inclusive: default_inclusive(),
            off_wall_layer: None,
            seed: default_seed(),
        }
    }
}

/// Части выборки по плану, каждая с одной `delta` и одной вязкостью.
///
/// Порядок частей: исходный снимок, выборка, пересчеты по `delta`,
/// пересчеты по вязкости.
pub fn augment_parts(snapshot: &Snapshot, plan: &AugmentationPlan) -> Result<Vec<Frame>> {
    let base = with_wall_units(snapshot.frame())?;
    let amount = plan.sampling.amount(base.n_rows())?;
    let mut rng = StdRng::seed_from_u64(plan.seed);
    let sample = base.sample_rows(amount, &mut rng);

    let mut parts = Vec::with_capacity(2 + plan.new_deltas.len() + plan.new_viscosities.len());
    if plan.keep_original {
        parts.push(base.clone());
    }
    if plan.inclusive {
        parts.push(sample.clone());
    }
    for &delta in &plan.new_deltas {
        parts.push(rescale_height(&sample, snapshot.delta(), delta)?);
    }
    for &viscosity in &plan.new_viscosities {
        parts.push(rescale_viscosity(&sample, snapshot.viscosity(), viscosity)?);
    }

    if let Some(layer) = plan.off_wall_layer {
        parts = parts
            .iter()
            .map(|part| add_off_wall_scaling(part, layer))
            .collect::<Result<Vec<_>>>()?;
    }

    tracing::info!(
        "Augmented snapshot: {} parts, {} sampled rows each",
        parts.len(),
        sample.n_rows()
    );
    Ok(parts)
}

/// Выборка из снимка и ее пересчеты, построчно объединенные в одну таблицу
pub fn augment(snapshot: &Snapshot, plan: &AugmentationPlan) -> Result<Frame> {
    Frame::concat(&augment_parts(snapshot, plan)?)
}

/// Объединение нескольких снимков по общему плану
pub fn augment_all(snapshots: &[Snapshot], plan: &AugmentationPlan) -> Result<Frame> {
    let parts = snapshots
        .iter()
        .map(|snapshot| augment(snapshot, plan))
        .collect::<Result<Vec<_>>>()?;
    Frame::concat(&parts)
}

/// Каноническая обучающая таблица: признаки считаются по каждой части
/// отдельно, затем части объединяются.
pub fn training_table(snapshots: &[Snapshot], plan: &AugmentationPlan, deriver: &FeatureDeriver) -> Result<Frame> {
    let mut tables = Vec::new();
    for snapshot in snapshots {
        for part in augment_parts(snapshot, plan)? {
            tables.push(deriver.derive(&part, SchemaMode::Required)?);
        }
    }
    let table = Frame::concat(&tables)?;
    tracing::info!(
        "Training table: {} snapshots, {} rows",
        snapshots.len(),
        table.n_rows()
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, BASE_COLUMNS};

    fn snapshot(n: usize) -> Snapshot {
        let mut frame = Frame::new();
        for (k, column) in BASE_COLUMNS.iter().enumerate() {
            let values: Vec<f64> = (0..n).map(|i| 0.3 + 0.01 * ((i + k) % 17) as f64).collect();
            frame.set(*column, values.into()).unwrap();
        }
        let ys: Vec<f64> = (0..n).map(|i| 2.0 * i as f64 / n as f64).collect();
        frame.set(Column::PointY, ys.into()).unwrap();
        frame.fill(Column::Delta, 1.0).unwrap();
        Snapshot::new(frame, Some(5.3566e-5)).unwrap()
    }

    #[test]
    fn test_parts_are_concatenated_in_order() {
        let snap = snapshot(50);
        let plan = AugmentationPlan {
            sampling: Sampling::Rows(20),
            new_deltas: vec![0.5, 2.0],
            new_viscosities: vec![1e-3],
            keep_original: true,
            ..AugmentationPlan::default()
        };
        let out = augment(&snap, &plan).unwrap();
        assert_eq!(out.n_rows(), 50 + 20 * 4);

        let delta = out.get(Column::Delta).unwrap();
        assert!(delta.iter().take(70).all(|d| *d == 1.0));
        assert!(delta.iter().skip(70).take(20).all(|d| *d == 0.5));
        assert!(delta.iter().skip(90).take(20).all(|d| *d == 2.0));
        let viscosity = out.get(Column::Viscosity).unwrap();
        assert!(viscosity.iter().skip(110).all(|v| *v == 1e-3));
    }

    #[test]
    fn test_plan_is_reproducible() {
        let snap = snapshot(40);
        let plan = AugmentationPlan {
            sampling: Sampling::Fraction(0.25),
            new_deltas: vec![0.1],
            ..AugmentationPlan::default()
        };
        let a = augment(&snap, &plan).unwrap();
        let b = augment(&snap, &plan).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.n_rows(), 20);
    }

    #[test]
    fn test_invalid_fraction_and_target() {
        let snap = snapshot(10);
        let plan = AugmentationPlan {
            sampling: Sampling::Fraction(1.5),
            ..AugmentationPlan::default()
        };
        assert!(matches!(augment(&snap, &plan), Err(FlowError::InvalidParameter { .. })));

        let plan = AugmentationPlan {
            new_deltas: vec![0.0],
            ..AugmentationPlan::default()
        };
        assert!(matches!(augment(&snap, &plan), Err(FlowError::InvalidParameter { .. })));
    }

    #[test]
    fn test_sample_rounding_to_zero_rows_rejected() {
        let snap = snapshot(100);
        let plan = AugmentationPlan {
            sampling: Sampling::Fraction(0.004),
            ..AugmentationPlan::default()
        };
        assert!(matches!(
            training_table(&[snap.clone()], &plan, &FeatureDeriver::default()),
            Err(FlowError::InvalidParameter { name: "sample_fraction", .. })
        ));

        let plan = AugmentationPlan {
            sampling: Sampling::Rows(0),
            ..AugmentationPlan::default()
        };
        assert!(matches!(
            augment(&snap, &plan),
            Err(FlowError::InvalidParameter { name: "sample_rows", .. })
        ));
    }

    #[test]
    fn test_off_wall_columns_added_to_every_part() {
        let snap = snapshot(30);
        let plan = AugmentationPlan {
            sampling: Sampling::All,
            new_viscosities: vec![1e-2],
            off_wall_layer: Some(1),
            ..AugmentationPlan::default()
        };
        let out = augment(&snap, &plan).unwrap();
        assert_eq!(out.n_rows(), 60);
        assert!(out.has(Column::DimVeloc));
    }

    #[test]
    fn test_plan_from_json_defaults() {
        let plan: AugmentationPlan =
            serde_json::from_str(r#"{"new_deltas": [0.5], "sampling": {"kind": "fraction", "value": 0.1}}"#)
                .unwrap();
        assert!(plan.inclusive);
        assert_eq!(plan.seed, 100);
        assert_eq!(plan.sampling, Sampling::Fraction(0.1));
        assert!(plan.new_viscosities.is_empty());
    }

    #[test]
    fn test_training_table_derives_each_part() {
        let snap = snapshot(30);
        let plan = AugmentationPlan {
            sampling: Sampling::Rows(10),
            new_deltas: vec![0.5, 4.0],
            new_viscosities: vec![1e-4],
            ..AugmentationPlan::default()
        };
        let table = training_table(&[snap.clone(), snap], &plan, &FeatureDeriver::default()).unwrap();
        assert_eq!(table.n_rows(), 2 * 4 * 10);
        assert_eq!(table.n_cols(), 9);
        assert!(!table.has_nan());
    }
}
