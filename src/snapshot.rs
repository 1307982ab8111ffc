//! Снимок течения: таблица + проверенные константы снимка

use crate::error::{ensure_positive, FlowError, Result};
use crate::frame::Frame;
use crate::preprocessing::similarity;
use crate::schema::Column;

/// Снимок канального течения с одной толщиной `delta` и одной вязкостью.
///
/// Создается только через [`Snapshot::new`], который проверяет инварианты
/// и при необходимости добавляет столбец вязкости.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    frame: Frame,
    viscosity: f64,
    delta: f64,
}

impl Snapshot {
    /// Проверка таблицы и сборка снимка.
    ///
    /// Если в таблице есть `viscosity`, все значения должны совпадать (и с
    /// `viscosity`, если она передана). Если столбца нет, переданная вязкость
    /// записывается во все строки.
    pub fn new(mut frame: Frame, viscosity: Option<f64>) -> Result<Self> {
        if frame.n_rows() == 0 {
            return Err(FlowError::EmptyTable);
        }
        let viscosity = if frame.has(Column::Viscosity) {
            let found = distinct_values(frame.get(Column::Viscosity)?.iter().copied());
            match (found.as_slice(), viscosity) {
                ([single], None) => *single,
                ([single], Some(given)) if *single == given => given,
                ([single], Some(given)) => {
                    return Err(FlowError::InconsistentValue {
                        column: Column::Viscosity.as_str().to_string(),
                        found: vec![*single, given],
                    })
                }
                _ => {
                    return Err(FlowError::InconsistentValue {
                        column: Column::Viscosity.as_str().to_string(),
                        found,
                    })
                }
            }
        } else {
            let value = viscosity
                .ok_or_else(|| FlowError::MissingColumn(Column::Viscosity.as_str().to_string()))?;
            frame.fill(Column::Viscosity, value)?;
            value
        };
        ensure_positive("viscosity", viscosity)?;

        let found = distinct_values(frame.get(Column::Delta)?.iter().copied());
        let delta = match found.as_slice() {
            [single] => *single,
            _ => {
                return Err(FlowError::InconsistentValue {
                    column: Column::Delta.as_str().to_string(),
                    found,
                })
            }
        };
        ensure_positive("delta", delta)?;

        Ok(Self {
            frame,
            viscosity,
            delta,
        })
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn into_frame(self) -> Frame {
        self.frame
    }

    pub fn viscosity(&self) -> f64 {
        self.viscosity
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn n_rows(&self) -> usize {
        self.frame.n_rows()
    }

    /// Тот же поток при другой вязкости
    pub fn with_viscosity(&self, new_viscosity: f64) -> Result<Snapshot> {
        let frame = similarity::rescale_viscosity(&self.frame, self.viscosity, new_viscosity)?;
        Ok(Snapshot {
            frame,
            viscosity: new_viscosity,
            delta: self.delta,
        })
    }

    /// Тот же поток при другой полутолщине канала
    pub fn with_delta(&self, new_delta: f64) -> Result<Snapshot> {
        let frame = similarity::rescale_height(&self.frame, self.delta, new_delta)?;
        Ok(Snapshot {
            frame,
            viscosity: self.viscosity,
            delta: new_delta,
        })
    }

    /// Изменение вязкости на месте
    pub fn set_viscosity(&mut self, new_viscosity: f64) -> Result<()> {
        *self = self.with_viscosity(new_viscosity)?;
        Ok(())
    }

    /// Изменение полутолщины на месте
    pub fn set_delta(&mut self, new_delta: f64) -> Result<()> {
        *self = self.with_delta(new_delta)?;
        Ok(())
    }
}

/// Различные значения без NaN, в порядке появления
fn distinct_values(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut found: Vec<f64> = Vec::new();
    for value in values.filter(|v| !v.is_nan()) {
        if !found.contains(&value) {
            found.push(value);
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(delta: Vec<f64>) -> Frame {
        let n = delta.len();
        Frame::from_columns([
            ("VELOC:0", vec![0.5; n]),
            ("delta", delta),
        ])
        .unwrap()
    }

    #[test]
    fn test_viscosity_is_broadcast() {
        let snapshot = Snapshot::new(frame(vec![1.0; 3]), Some(5.3566e-5)).unwrap();
        assert_eq!(snapshot.viscosity(), 5.3566e-5);
        assert_eq!(snapshot.delta(), 1.0);
        let column = snapshot.frame().get(Column::Viscosity).unwrap();
        assert!(column.iter().all(|v| *v == 5.3566e-5));
    }

    #[test]
    fn test_missing_viscosity_without_default() {
        let err = Snapshot::new(frame(vec![1.0; 3]), None).unwrap_err();
        assert_eq!(err, FlowError::MissingColumn("viscosity".to_string()));
    }

    #[test]
    fn test_two_viscosities_rejected() {
        let mut table = frame(vec![1.0; 3]);
        table
            .set_named("viscosity", vec![1e-4, 1e-4, 2e-4].into())
            .unwrap();
        let err = Snapshot::new(table, None).unwrap_err();
        assert_eq!(
            err,
            FlowError::InconsistentValue {
                column: "viscosity".to_string(),
                found: vec![1e-4, 2e-4],
            }
        );
    }

    #[test]
    fn test_viscosity_conflicts_with_given_value() {
        let mut table = frame(vec![1.0; 2]);
        table.fill(Column::Viscosity, 1e-4).unwrap();
        assert!(matches!(
            Snapshot::new(table, Some(3e-4)),
            Err(FlowError::InconsistentValue { .. })
        ));
    }

    #[test]
    fn test_delta_must_be_unique() {
        let err = Snapshot::new(frame(vec![1.0, 0.5]), Some(1e-4)).unwrap_err();
        assert!(matches!(err, FlowError::InconsistentValue { ref column, .. } if column == "delta"));
    }

    #[test]
    fn test_empty_table_rejected() {
        let table = frame(Vec::new());
        assert_eq!(Snapshot::new(table, Some(1e-4)).unwrap_err(), FlowError::EmptyTable);
    }

    #[test]
    fn test_missing_delta() {
        let table = Frame::from_columns([("VELOC:0", vec![1.0])]).unwrap();
        let err = Snapshot::new(table, Some(1e-4)).unwrap_err();
        assert_eq!(err, FlowError::MissingColumn("delta".to_string()));
    }
}
