//! Wall-law ML - подготовка признаков канального течения и модели `u_plus`

pub mod config;
pub mod error;
pub mod frame;
pub mod models;
pub mod preprocessing;
pub mod schema;
pub mod snapshot;
pub mod types;

pub use config::EngineConfig;
pub use error::{FlowError, Result};
pub use frame::Frame;
pub use models::*;
pub use preprocessing::*;
pub use schema::Column;
pub use snapshot::Snapshot;
