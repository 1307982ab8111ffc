//! Пересчет снимка на другую вязкость или полутолщину канала
//!
//! Оба преобразования сохраняют динамическое подобие: скорость и скорость
//! трения масштабируются одним коэффициентом, после чего `u_plus` и `y_plus`
//! пересчитываются из новых значений. Число и порядок строк не меняются.

use ndarray::{Array1, Zip};

use crate::error::{ensure_positive, Result};
use crate::frame::Frame;
use crate::schema::{Column, VELOCITY_FAMILY};

/// Отражение точки относительно оси канала.
///
/// Канал симметричен, поэтому точка за новой осью (`y > delta`) заменяется
/// точкой на том же расстоянии от противоположной стенки.
pub fn fold(y: f64, delta: f64) -> f64 {
    if y > delta {
        2.0 * delta - y
    } else {
        y
    }
}

/// Гарантирует наличие `u_tau`, `u_plus` и `y_plus`.
///
/// Недостающие столбцы считаются из `wall_shear`, `VELOC:0`, `delta` и
/// `viscosity`; существующие не трогаются.
pub fn with_wall_units(frame: &Frame) -> Result<Frame> {
    let mut out = frame.clone();

    if !out.has(Column::UTau) {
        let u_tau = out.get(Column::WallShear)?.mapv(|tau| tau.abs().sqrt());
        out.set(Column::UTau, u_tau)?;
    }
    if !out.has(Column::UPlus) {
        let u_plus = out.get(Column::VelocX)? / out.get(Column::UTau)?;
        out.set(Column::UPlus, u_plus)?;
    }
    if !out.has(Column::YPlus) {
        let y_plus = wall_distance_plus(out.get(Column::Delta)?, &out)?;
        out.set(Column::YPlus, y_plus)?;
    }

    Ok(out)
}

/// `distance * u_tau / viscosity`
fn wall_distance_plus(distance: &Array1<f64>, frame: &Frame) -> Result<Array1<f64>> {
    let u_tau = frame.get(Column::UTau)?;
    let viscosity = frame.get(Column::Viscosity)?;
    let mut out = Array1::zeros(distance.len());
    Zip::from(&mut out)
        .and(distance)
        .and(u_tau)
        .and(viscosity)
        .for_each(|o, &d, &u, &nu| *o = d * u / nu);
    Ok(out)
}

fn scale_velocity(frame: &mut Frame, ratio: f64) -> Result<()> {
    for column in VELOCITY_FAMILY {
        frame.scale(column, ratio)?;
    }
    Ok(())
}

/// Пересчет на новую вязкость при неизменной геометрии
pub fn rescale_viscosity(frame: &Frame, old_viscosity: f64, new_viscosity: f64) -> Result<Frame> {
    ensure_positive("old_viscosity", old_viscosity)?;
    ensure_positive("new_viscosity", new_viscosity)?;
    frame.require(&VELOCITY_FAMILY)?;

    if new_viscosity == old_viscosity {
        return Ok(frame.clone());
    }

    let mut out = frame.clone();
    out.fill(Column::Viscosity, old_viscosity)?;
    let mut out = with_wall_units(&out)?;

    let ratio = new_viscosity / old_viscosity;
    scale_velocity(&mut out, ratio)?;
    out.scale(Column::UTau, ratio)?;
    out.fill(Column::Viscosity, new_viscosity)?;

    let u_plus = out.get(Column::VelocX)? / out.get(Column::UTau)?;
    out.set(Column::UPlus, u_plus)?;
    let y_plus = wall_distance_plus(out.get(Column::Delta)?, &out)?;
    out.set(Column::YPlus, y_plus)?;

    tracing::debug!(
        "Viscosity rescaled {:e} -> {:e} (ratio {:e}), {} rows",
        old_viscosity,
        new_viscosity,
        ratio,
        out.n_rows()
    );
    Ok(out)
}

/// Пересчет на новую полутолщину канала при неизменной вязкости
pub fn rescale_height(frame: &Frame, old_delta: f64, new_delta: f64) -> Result<Frame> {
    ensure_positive("old_delta", old_delta)?;
    ensure_positive("new_delta", new_delta)?;
    frame.require(&VELOCITY_FAMILY)?;
    frame.require(&[Column::PointY, Column::Viscosity])?;

    let mut out = with_wall_units(frame)?;

    // сжатие геометрии ускоряет поток обратно пропорционально
    let ratio = old_delta / new_delta;
    scale_velocity(&mut out, ratio)?;
    out.scale(Column::UTau, ratio)?;
    out.scale(Column::PointY, new_delta / old_delta)?;

    let u_plus = out.get(Column::VelocX)? / out.get(Column::UTau)?;
    out.set(Column::UPlus, u_plus)?;

    let folded = out.get(Column::PointY)?.mapv(|y| fold(y, new_delta));
    let n_folded = folded
        .iter()
        .zip(out.get(Column::PointY)?.iter())
        .filter(|(f, y)| f != y)
        .count();
    out.set(Column::PointY, folded)?;
    out.fill(Column::Delta, new_delta)?;

    let y_plus = wall_distance_plus(out.get(Column::PointY)?, &out)?;
    out.set(Column::YPlus, y_plus)?;

    tracing::debug!(
        "Height rescaled {} -> {} (ratio {}), {} of {} rows folded",
        old_delta,
        new_delta,
        ratio,
        n_folded,
        out.n_rows()
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlowError;
    use crate::schema::BASE_COLUMNS;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    /// Таблица со всеми базовыми столбцами и вязкостью
    fn channel(ys: &[f64], delta: f64, viscosity: f64) -> Frame {
        let n = ys.len();
        let mut frame = Frame::new();
        for (k, column) in BASE_COLUMNS.iter().enumerate() {
            let values: Vec<f64> = (0..n).map(|i| 0.1 + 0.01 * (i + k) as f64).collect();
            frame.set(*column, values.into()).unwrap();
        }
        frame.set(Column::PointY, ys.to_vec().into()).unwrap();
        frame.fill(Column::Delta, delta).unwrap();
        frame.fill(Column::Viscosity, viscosity).unwrap();
        frame
    }

    #[test]
    fn test_fold() {
        assert_eq!(fold(3.0, 2.0), 1.0);
        assert_eq!(fold(1.0, 2.0), 1.0);
        assert_eq!(fold(2.0, 2.0), 2.0);
    }

    #[test]
    fn test_wall_units_seeded_from_shear() {
        let mut frame = channel(&[0.2, 0.4], 1.0, 1e-3);
        frame.set(Column::WallShear, vec![-4.0, 9.0].into()).unwrap();
        let out = with_wall_units(&frame).unwrap();

        let u_tau = out.get(Column::UTau).unwrap();
        assert_eq!(u_tau.to_vec(), vec![2.0, 3.0]);
        let y_plus = out.get(Column::YPlus).unwrap();
        assert_relative_eq!(y_plus[0], 1.0 * 2.0 / 1e-3);
        let u_plus = out.get(Column::UPlus).unwrap();
        assert_relative_eq!(u_plus[1], out.get(Column::VelocX).unwrap()[1] / 3.0);
    }

    #[test]
    fn test_same_viscosity_is_identity() {
        let frame = channel(&[0.1, 0.5, 0.9], 1.0, 5.3566e-5);
        let out = rescale_viscosity(&frame, 5.3566e-5, 5.3566e-5).unwrap();
        assert_eq!(out, frame);
    }

    #[test]
    fn test_viscosity_rescale_recomputes_wall_units() {
        let frame = with_wall_units(&channel(&[0.1, 0.5], 1.0, 1e-4)).unwrap();
        let out = rescale_viscosity(&frame, 1e-4, 1e-2).unwrap();

        for column in VELOCITY_FAMILY {
            let before = frame.get(column).unwrap();
            let after = out.get(column).unwrap();
            assert_relative_eq!(after[1], before[1] * 100.0, max_relative = 1e-12);
        }
        let u_tau = out.get(Column::UTau).unwrap();
        assert_relative_eq!(u_tau[0], frame.get(Column::UTau).unwrap()[0] * 100.0, max_relative = 1e-12);
        assert!(out.get(Column::Viscosity).unwrap().iter().all(|v| *v == 1e-2));

        let u_plus = out.get(Column::UPlus).unwrap();
        assert_relative_eq!(u_plus[0], out.get(Column::VelocX).unwrap()[0] / u_tau[0]);
        let y_plus = out.get(Column::YPlus).unwrap();
        assert_relative_eq!(y_plus[0], 1.0 * u_tau[0] / 1e-2);
    }

    #[test]
    fn test_height_rescale_folds_past_centerline() {
        // вторая точка лежит в верхней половине канала
        let frame = channel(&[0.5, 3.0], 2.0, 1e-3);
        let out = rescale_height(&frame, 2.0, 0.6).unwrap();
        let y = out.get(Column::PointY).unwrap();
        assert_relative_eq!(y[0], 0.5 * 0.3, max_relative = 1e-12);
        assert_relative_eq!(y[1], 2.0 * 0.6 - 3.0 * 0.3, max_relative = 1e-12);
        assert!(out.get(Column::Delta).unwrap().iter().all(|d| *d == 0.6));

        let u_tau = out.get(Column::UTau).unwrap();
        let y_plus = out.get(Column::YPlus).unwrap();
        assert_relative_eq!(y_plus[1], y[1] * u_tau[1] / 1e-3, max_relative = 1e-12);
    }

    #[test]
    fn test_height_rescale_scales_velocity_inversely() {
        let frame = with_wall_units(&channel(&[0.1, 0.2], 1.0, 1e-3)).unwrap();
        let out = rescale_height(&frame, 1.0, 0.5).unwrap();
        let before = frame.get(Column::AvgVelZ).unwrap();
        let after = out.get(Column::AvgVelZ).unwrap();
        assert_relative_eq!(after[0], before[0] * 2.0);
        let u_tau = out.get(Column::UTau).unwrap();
        assert_relative_eq!(u_tau[1], frame.get(Column::UTau).unwrap()[1] * 2.0);
    }

    #[test]
    fn test_invalid_targets() {
        let frame = channel(&[0.1], 1.0, 1e-3);
        assert!(matches!(
            rescale_height(&frame, 1.0, 0.0),
            Err(FlowError::InvalidParameter { name: "new_delta", .. })
        ));
        assert!(matches!(
            rescale_height(&frame, 1.0, -2.0),
            Err(FlowError::InvalidParameter { .. })
        ));
        assert!(matches!(
            rescale_viscosity(&frame, 1e-3, 0.0),
            Err(FlowError::InvalidParameter { name: "new_viscosity", .. })
        ));
        assert!(matches!(
            rescale_viscosity(&frame, 1e-3, f64::NAN),
            Err(FlowError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_missing_velocity_component() {
        let frame = channel(&[0.1], 1.0, 1e-3).drop_columns(&[Column::AvgVelY]);
        assert_eq!(
            rescale_viscosity(&frame, 1e-3, 1e-2).unwrap_err(),
            FlowError::MissingColumn("AVVEL:1".to_string())
        );
    }

    proptest! {
        #[test]
        fn viscosity_round_trip(
            v0 in 1e-6..1e-1_f64,
            v1 in 1e-6..1e-1_f64,
            ys in prop::collection::vec(0.0..1.0_f64, 1..20),
        ) {
            let frame = with_wall_units(&channel(&ys, 1.0, v0)).unwrap();
            let back = rescale_viscosity(&rescale_viscosity(&frame, v0, v1).unwrap(), v1, v0).unwrap();
            for column in VELOCITY_FAMILY.iter().chain([Column::UTau].iter()) {
                let a = frame.get(*column).unwrap();
                let b = back.get(*column).unwrap();
                for (x, y) in a.iter().zip(b.iter()) {
                    prop_assert!((x - y).abs() <= 1e-9 * x.abs().max(1.0));
                }
            }
        }

        #[test]
        fn height_round_trip_without_fold(
            d0 in 0.01..10.0_f64,
            d1 in 0.01..10.0_f64,
            fractions in prop::collection::vec(0.0..1.0_f64, 1..20),
        ) {
            let ys: Vec<f64> = fractions.iter().map(|f| f * d0).collect();
            let frame = with_wall_units(&channel(&ys, d0, 1e-3)).unwrap();
            let back = rescale_height(&rescale_height(&frame, d0, d1).unwrap(), d1, d0).unwrap();
            for column in VELOCITY_FAMILY.iter().chain([Column::PointY, Column::UTau].iter()) {
                let a = frame.get(*column).unwrap();
                let b = back.get(*column).unwrap();
                for (x, y) in a.iter().zip(b.iter()) {
                    prop_assert!((x - y).abs() <= 1e-9 * x.abs().max(1.0));
                }
            }
        }
    }
}
