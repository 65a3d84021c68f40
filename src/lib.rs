//! Photo-based calorie estimation with an on-device model and a cloud
//! fallback.

pub mod config;
pub mod handlers;
pub mod models;
pub mod services;

pub use config::{Config, GenerationOptions};
pub use models::{Estimate, FoodImage, FoodRecord, ProgressEvent};
pub use services::{AnalyzerBackend, AnalyzerError, CloudBackend, FallbackAnalyzer, OnDeviceBackend};
