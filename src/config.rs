//! Конфигурация движка

use serde::{Deserialize, Serialize};

use crate::models::boosting::BoostingParams;

/// Вязкость потока при Re_tau ≈ 180
pub const VISCOSITY_RE180: f64 = 3.547e-4;
/// Вязкость потока при Re_tau ≈ 1000
pub const VISCOSITY_RE1000: f64 = 5.3566e-5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
    /// Вязкость для снимков без столбца `viscosity`
    #[serde(default = "default_viscosity")]
    pub default_viscosity: Option<f64>,
    #[serde(default)]
    pub boosting: BoostingParams,
}

fn default_addr() -> String { "0.0.0.0:8000".to_string() }
fn default_viscosity() -> Option<f64> { Some(VISCOSITY_RE1000) }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            default_viscosity: default_viscosity(),
            boosting: BoostingParams::default(),
        }
    }
}

impl EngineConfig {
    /// Значения по умолчанию с переопределением из окружения
    /// (`WALL_LAW_ADDR`, `WALL_LAW_DEFAULT_VISCOSITY`).
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(addr) = lookup("WALL_LAW_ADDR") {
            config.addr = addr;
        }
        if let Some(raw) = lookup("WALL_LAW_DEFAULT_VISCOSITY") {
            match raw.trim() {
                "" | "none" => config.default_viscosity = None,
                value => match value.parse::<f64>() {
                    Ok(v) => config.default_viscosity = Some(v),
                    Err(e) => tracing::warn!("Ignoring WALL_LAW_DEFAULT_VISCOSITY={}: {}", raw, e),
                },
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_overrides() {
        let config = EngineConfig::from_lookup(|key| match key {
            "WALL_LAW_ADDR" => Some("127.0.0.1:9000".to_string()),
            "WALL_LAW_DEFAULT_VISCOSITY" => Some("3.547e-4".to_string()),
            _ => None,
        });
        assert_eq!(config.addr, "127.0.0.1:9000");
        assert_eq!(config.default_viscosity, Some(VISCOSITY_RE180));
    }

    #[test]
    fn test_viscosity_can_be_disabled() {
        let config = EngineConfig::from_lookup(|key| {
            (key == "WALL_LAW_DEFAULT_VISCOSITY").then(|| "none".to_string())
        });
        assert_eq!(config.default_viscosity, None);
        assert_eq!(config.addr, "0.0.0.0:8000");
    }

    #[test]
    fn test_json_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.default_viscosity, Some(VISCOSITY_RE1000));
        assert_eq!(config.boosting.max_depth, 7);
    }
}
