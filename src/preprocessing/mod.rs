/// Модуль предобработки данных

pub mod augmentation;
pub mod feature_engineering;
pub mod normalization;
pub mod similarity;

pub use augmentation::{augment, augment_all, augment_parts, training_table, AugmentationPlan, Sampling};
pub use feature_engineering::{calc_log, split_features_target, FeatureDeriver, SchemaMode};
pub use normalization::DataNormalizer;
pub use similarity::{fold, rescale_height, rescale_viscosity};
