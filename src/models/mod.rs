use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Nutrition estimate for one photographed meal.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub food_name: String,
    pub calories: u32,
    pub protein_g: f32,
    pub carbs_g: f32,
    pub fat_g: f32,
}

impl Estimate {
    pub fn new(food_name: impl Into<String>, calories: u32, protein_g: f32, carbs_g: f32, fat_g: f32) -> Self {
        Self {
            food_name: food_name.into(),
            calories,
            protein_g,
            carbs_g,
            fat_g,
        }
    }

    /// Returned when the model reply could not be decoded.
    pub fn unidentified() -> Self {
        Self::new("Could not identify", 0, 0.0, 0.0, 0.0)
    }

    /// Substituted by callers when the backend call itself failed.
    pub fn analysis_failed() -> Self {
        Self::new("Analysis failed", 0, 0.0, 0.0, 0.0)
    }
}

/// One element of a provisioning stream.
///
/// `Started` comes first when present, and exactly one of `Completed` or
/// `Failed` ends the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Started { total_bytes: i64 },
    InProgress { bytes_downloaded: i64 },
    Completed,
    Failed { message: String },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Completed | ProgressEvent::Failed { .. })
    }
}

impl std::fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgressEvent::Started { total_bytes } => write!(f, "started ({} bytes)", total_bytes),
            ProgressEvent::InProgress { bytes_downloaded } => write!(f, "{} bytes downloaded", bytes_downloaded),
            ProgressEvent::Completed => write!(f, "completed"),
            ProgressEvent::Failed { message } => write!(f, "failed: {}", message),
        }
    }
}

/// Encoded photo handed over by the capture side.
#[derive(Debug, Clone)]
pub struct FoodImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl FoodImage {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("failed to read image {}", path.display()))?;
        log::debug!("📊 Image file size: {} bytes", bytes.len());
        Ok(Self::new(bytes, mime_type_for(path)))
    }

    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.bytes)
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

/// What the persistence side stores for a saved meal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodRecord {
    pub photo_path: String,
    pub food_name: String,
    pub calories: u32,
    pub protein_g: f32,
    pub carbs_g: f32,
    pub fat_g: f32,
    pub extras: String,
    pub recorded_at: DateTime<Utc>,
}

impl FoodRecord {
    pub fn from_estimate(estimate: &Estimate, photo_path: &str, extras: &[String]) -> Self {
        Self {
            photo_path: photo_path.to_string(),
            food_name: estimate.food_name.clone(),
            calories: estimate.calories,
            protein_g: estimate.protein_g,
            carbs_g: estimate.carbs_g,
            fat_g: estimate.fat_g,
            extras: extras.join(", "),
            recorded_at: Utc::now(),
        }
    }
}
