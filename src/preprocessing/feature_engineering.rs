//! Безразмерные признаки для ML моделей

use ndarray::{Array1, Zip};

use crate::error::{FlowError, Result};
use crate::frame::Frame;
use crate::schema::{self, Column, BASE_COLUMNS, LEAKED, REQUIRED_COLUMNS, TARGET};
use crate::snapshot::Snapshot;

/// Натуральный логарифм, отрицательный результат заменяется нулем.
///
/// Неположительные аргументы не обрабатываются отдельно: `ln(0) = -inf`
/// превращается в 0, отрицательный аргумент дает NaN.
pub fn calc_log(x: f64) -> f64 {
    let result = x.ln();
    if result < 0.0 {
        0.0
    } else {
        result
    }
}

/// Набор столбцов на выходе
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemaMode {
    /// Все исходные и производные столбцы
    #[default]
    Full,
    /// Только канонический набор для обучения
    Required,
}

/// Расчет производных признаков снимка
#[derive(Debug, Clone)]
pub struct FeatureDeriver {
    default_viscosity: Option<f64>,
}

impl FeatureDeriver {
    pub fn new(default_viscosity: Option<f64>) -> Self {
        Self { default_viscosity }
    }

    pub fn default_viscosity(&self) -> Option<f64> {
        self.default_viscosity
    }

    /// Производные признаки для таблицы снимка.
    ///
    /// Вход не меняется; при ошибке ничего не возвращается.
    pub fn derive(&self, frame: &Frame, mode: SchemaMode) -> Result<Frame> {
        frame.require(&BASE_COLUMNS)?;
        // вязкость по умолчанию только для таблиц без столбца `viscosity`
        let viscosity = if frame.has(Column::Viscosity) {
            None
        } else {
            self.default_viscosity
        };
        let snapshot = Snapshot::new(frame.clone(), viscosity)?;
        self.derive_snapshot(&snapshot, mode)
    }

    pub fn derive_snapshot(&self, snapshot: &Snapshot, mode: SchemaMode) -> Result<Frame> {
        let mut data = snapshot.frame().clone();
        data.require(&BASE_COLUMNS)?;

        let veloc = data.get(Column::VelocX)?.clone();
        let avg_veloc = data.get(Column::AvgVelX)?.clone();
        let y = data.get(Column::PointY)?.clone();
        let delta = data.get(Column::Delta)?.clone();
        let viscosity = data.get(Column::Viscosity)?.clone();

        data.set(Column::DeltaSquared, delta.mapv(|d| d * d))?;

        let local_re = reynolds(&veloc, &delta, &viscosity);
        let local_u_tau = data.get(Column::WallShear)?.mapv(|tau| tau.abs().sqrt());

        // u_plus/y_plus после пересчета подобия уже есть и не перезаписываются
        let u_tau = match data.get(Column::UTau) {
            Ok(u_tau) => u_tau.clone(),
            Err(_) => local_u_tau.clone(),
        };
        if !data.has(Column::UPlus) {
            data.set(Column::UPlus, &veloc / &u_tau)?;
        }
        if !data.has(Column::YPlus) {
            data.set(Column::YPlus, reynolds(&u_tau, &delta, &viscosity))?;
        }

        data.set(Column::LocalUPlus, &veloc / &local_u_tau)?;
        data.set(Column::LocalUTau, local_u_tau)?;
        data.set(Column::LocalReAvg, reynolds(&avg_veloc, &delta, &viscosity))?;
        data.set(Column::LocalReY, reynolds(&veloc, &y, &viscosity))?;
        data.set(Column::LocalReLog, local_re.mapv(calc_log))?;
        data.set(Column::LocalRe, local_re)?;
        data.set(Column::LogDelta, delta.mapv(calc_log))?;
        data.set(Column::YDelta, &y / &delta)?;

        tracing::debug!(
            "Derived features for {} rows (delta = {}, viscosity = {:e})",
            data.n_rows(),
            snapshot.delta(),
            snapshot.viscosity()
        );

        match mode {
            SchemaMode::Full => Ok(data),
            SchemaMode::Required => restrict_to_schema(&data),
        }
    }
}

impl Default for FeatureDeriver {
    fn default() -> Self {
        Self::new(Some(crate::config::VISCOSITY_RE1000))
    }
}

/// `velocity * length / viscosity`
fn reynolds(velocity: &Array1<f64>, length: &Array1<f64>, viscosity: &Array1<f64>) -> Array1<f64> {
    let mut out = Array1::zeros(velocity.len());
    Zip::from(&mut out)
        .and(velocity)
        .and(length)
        .and(viscosity)
        .for_each(|o, &u, &l, &nu| *o = u * l / nu);
    out
}

/// Сужение до канонического набора с проверкой порядка
pub fn restrict_to_schema(data: &Frame) -> Result<Frame> {
    let restricted = data.select(&REQUIRED_COLUMNS)?;
    let expected = schema::names(&REQUIRED_COLUMNS);
    if restricted.names() != expected.as_slice() {
        return Err(FlowError::SchemaMismatch {
            expected,
            actual: restricted.names().to_vec(),
        });
    }
    Ok(restricted)
}

/// Разделение канонической таблицы на признаки и цель (`u_plus`).
///
/// `y_plus` из признаков исключается.
pub fn split_features_target(data: &Frame) -> Result<(Frame, Array1<f64>)> {
    let target = data.get(TARGET)?.clone();
    let mut dropped = vec![TARGET];
    dropped.extend_from_slice(&LEAKED);
    Ok((data.drop_columns(&dropped), target))
}

/// Масштабирование по точке вне стенки.
///
/// Берется `layer`-я по возрастанию различная координата `Points:1` как
/// опорная высота и средняя `VELOC:0` на этой высоте как опорная скорость.
pub fn add_off_wall_scaling(data: &Frame, layer: usize) -> Result<Frame> {
    let y = data.get(Column::PointY)?;
    let veloc = data.get(Column::VelocX)?;

    let mut heights: Vec<f64> = y.iter().copied().filter(|v| !v.is_nan()).collect();
    heights.sort_by(|a, b| a.total_cmp(b));
    heights.dedup();
    let off_h = *heights
        .get(layer)
        .ok_or_else(|| FlowError::invalid("off_wall_layer", layer as f64, "no such wall-normal layer"))?;

    let (sum, count) = y
        .iter()
        .zip(veloc.iter())
        .filter(|(yy, _)| **yy == off_h)
        .fold((0.0, 0usize), |(s, c), (_, u)| (s + u, c + 1));
    let off_vel = sum / count as f64;

    let mut out = data.clone();
    out.set(Column::DimY, y / off_h)?;
    out.set(Column::DimDelta, data.get(Column::Delta)? / off_h)?;
    out.set(Column::DimVeloc, veloc / off_vel)?;

    tracing::debug!(
        "Off-wall scaling at layer {}: height {}, velocity {}",
        layer,
        off_h,
        off_vel
    );
    Ok(out)
}
