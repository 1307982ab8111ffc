//! Схема столбцов снимка течения
//!
//! Все имена столбцов, которые читает или пишет движок, перечислены здесь.
//! Имена совпадают с заголовками выгрузки решателя (`VELOC:0`, `Points:1`, ...).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    // Мгновенная скорость
    VelocX,
    VelocY,
    VelocZ,
    // Осредненная по времени скорость
    AvgVelX,
    AvgVelY,
    AvgVelZ,
    // Координаты
    PointX,
    PointY,
    PointZ,
    Pressure,
    Gradient0,
    Gradient1,
    Gradient2,
    Gradient3,
    Gradient4,
    Gradient5,
    Gradient6,
    Gradient7,
    Gradient8,
    WallShear,
    Delta,
    Viscosity,
    // Пристеночные величины
    UTau,
    UPlus,
    YPlus,
    // Производные признаки
    LocalRe,
    LocalReAvg,
    LocalReY,
    LocalUTau,
    LocalUPlus,
    LocalReLog,
    LogDelta,
    YDelta,
    DeltaSquared,
    DimY,
    DimDelta,
    DimVeloc,
    Predictions,
}

impl Column {
    pub const fn as_str(self) -> &'static str {
        match self {
            Column::VelocX => "VELOC:0",
            Column::VelocY => "VELOC:1",
            Column::VelocZ => "VELOC:2",
            Column::AvgVelX => "AVVEL:0",
            Column::AvgVelY => "AVVEL:1",
            Column::AvgVelZ => "AVVEL:2",
            Column::PointX => "Points:0",
            Column::PointY => "Points:1",
            Column::PointZ => "Points:2",
            Column::Pressure => "PRESS",
            Column::Gradient0 => "Gradients:0",
            Column::Gradient1 => "Gradients:1",
            Column::Gradient2 => "Gradients:2",
            Column::Gradient3 => "Gradients:3",
            Column::Gradient4 => "Gradients:4",
            Column::Gradient5 => "Gradients:5",
            Column::Gradient6 => "Gradients:6",
            Column::Gradient7 => "Gradients:7",
            Column::Gradient8 => "Gradients:8",
            Column::WallShear => "wall_shear",
            Column::Delta => "delta",
            Column::Viscosity => "viscosity",
            Column::UTau => "u_tau",
            Column::UPlus => "u_plus",
            Column::YPlus => "y_plus",
            Column::LocalRe => "Local_Re",
            Column::LocalReAvg => "Local_Re_Avg",
            Column::LocalReY => "Local_Re_y",
            Column::LocalUTau => "Local_u_tau",
            Column::LocalUPlus => "Local_u_plus",
            Column::LocalReLog => "Local_Re_log",
            Column::LogDelta => "Log_delta",
            Column::YDelta => "y_delta",
            Column::DeltaSquared => "delta_squared",
            Column::DimY => "dim_y",
            Column::DimDelta => "dim_delta",
            Column::DimVeloc => "dim_veloc",
            Column::Predictions => "predictions",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Столбцы, которые масштабируются вместе со скоростью
pub const VELOCITY_FAMILY: [Column; 6] = [
    Column::VelocX,
    Column::VelocY,
    Column::VelocZ,
    Column::AvgVelX,
    Column::AvgVelY,
    Column::AvgVelZ,
];

pub const POSITIONS: [Column; 3] = [Column::PointX, Column::PointY, Column::PointZ];

pub const GRADIENTS: [Column; 9] = [
    Column::Gradient0,
    Column::Gradient1,
    Column::Gradient2,
    Column::Gradient3,
    Column::Gradient4,
    Column::Gradient5,
    Column::Gradient6,
    Column::Gradient7,
    Column::Gradient8,
];

/// Базовые столбцы выгрузки решателя (вязкость может отсутствовать)
pub const BASE_COLUMNS: [Column; 21] = [
    Column::VelocX,
    Column::VelocY,
    Column::VelocZ,
    Column::AvgVelX,
    Column::AvgVelY,
    Column::AvgVelZ,
    Column::PointX,
    Column::PointY,
    Column::PointZ,
    Column::Pressure,
    Column::Gradient0,
    Column::Gradient1,
    Column::Gradient2,
    Column::Gradient3,
    Column::Gradient4,
    Column::Gradient5,
    Column::Gradient6,
    Column::Gradient7,
    Column::Gradient8,
    Column::WallShear,
    Column::Delta,
];

/// Канонический набор столбцов для обучения, порядок значим
pub const REQUIRED_COLUMNS: [Column; 9] = [
    Column::UPlus,
    Column::YPlus,
    Column::Delta,
    Column::PointY,
    Column::AvgVelX,
    Column::VelocX,
    Column::LocalRe,
    Column::LocalUTau,
    Column::LocalReLog,
];

/// Целевая переменная
pub const TARGET: Column = Column::UPlus;

/// Исключается из признаков: почти детерминированная функция цели
pub const LEAKED: [Column; 1] = [Column::YPlus];

pub fn names(columns: &[Column]) -> Vec<String> {
    columns.iter().map(|c| c.as_str().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_required_columns_order() {
        assert_eq!(
            names(&REQUIRED_COLUMNS),
            vec![
                "u_plus",
                "y_plus",
                "delta",
                "Points:1",
                "AVVEL:0",
                "VELOC:0",
                "Local_Re",
                "Local_u_tau",
                "Local_Re_log"
            ]
        );
    }

    #[test]
    fn test_base_columns_are_distinct() {
        let unique: HashSet<&str> = BASE_COLUMNS.iter().map(|c| c.as_str()).collect();
        assert_eq!(unique.len(), BASE_COLUMNS.len());
        for col in VELOCITY_FAMILY.iter().chain(GRADIENTS.iter()).chain(POSITIONS.iter()) {
            assert!(BASE_COLUMNS.contains(col));
        }
    }
}
