use anyhow::{bail, Context, Result};
use std::sync::Arc;

use super::setup::{ModelStatus, ProvisionTracker};
use crate::models::{Estimate, FoodImage, FoodRecord};
use crate::services::AnalyzerBackend;

/// One captured photo being analyzed, with the extras the user picked.
pub struct CaptureSession {
    analyzer: Arc<dyn AnalyzerBackend>,
    image: FoodImage,
    photo_path: String,
    extras: Vec<String>,
    estimate: Option<Estimate>,
}

impl CaptureSession {
    pub fn new(analyzer: Arc<dyn AnalyzerBackend>, image: FoodImage, photo_path: impl Into<String>) -> Self {
        Self {
            analyzer,
            image,
            photo_path: photo_path.into(),
            extras: Vec::new(),
            estimate: None,
        }
    }

    /// Preselects extras, dropping duplicates but keeping first-seen order.
    pub fn with_extras(mut self, extras: impl IntoIterator<Item = String>) -> Self {
        for extra in extras {
            if !self.extras.contains(&extra) {
                self.extras.push(extra);
            }
        }
        self
    }

    pub fn extras(&self) -> &[String] {
        &self.extras
    }

    pub fn estimate(&self) -> Option<&Estimate> {
        self.estimate.as_ref()
    }

    /// Runs an estimate with the current extras. A failing backend yields
    /// [`Estimate::analysis_failed`] instead of an error.
    pub async fn analyze(&mut self) -> &Estimate {
        log::debug!("📸 Analyzing {} with extras {:?}", self.photo_path, self.extras);

        let estimate = match self.analyzer.infer(&self.image, &self.extras).await {
            Ok(estimate) => estimate,
            Err(e) => {
                log::warn!("⚠️ Analysis of {} failed: {}", self.photo_path, e);
                Estimate::analysis_failed()
            }
        };

        self.estimate.insert(estimate)
    }

    /// Adds the extra if absent, removes it otherwise, then re-analyzes.
    pub async fn toggle_extra(&mut self, extra: &str) -> &Estimate {
        if let Some(pos) = self.extras.iter().position(|e| e == extra) {
            self.extras.remove(pos);
        } else {
            self.extras.push(extra.to_string());
        }
        self.analyze().await
    }

    /// Record for the persistence side, once an estimate exists.
    pub fn to_record(&self) -> Option<FoodRecord> {
        self.estimate
            .as_ref()
            .map(|estimate| FoodRecord::from_estimate(estimate, &self.photo_path, &self.extras))
    }
}

/// Provisions the analyzer, estimates one photo and releases the analyzer,
/// on the error path too.
pub async fn snap(
    analyzer: Arc<dyn AnalyzerBackend>,
    image: FoodImage,
    photo_path: &str,
    extras: Vec<String>,
) -> Result<FoodRecord> {
    let result = provision_and_analyze(analyzer.clone(), image, photo_path, extras).await;
    log::info!("🛑 Releasing {} backend", analyzer.name());
    analyzer.release();
    result
}

async fn provision_and_analyze(
    analyzer: Arc<dyn AnalyzerBackend>,
    image: FoodImage,
    photo_path: &str,
    extras: Vec<String>,
) -> Result<FoodRecord> {
    let mut tracker = ProvisionTracker::new();
    if tracker.run(analyzer.as_ref()).await != ModelStatus::Ready {
        bail!(
            "model setup failed: {}",
            tracker.error().unwrap_or("unknown error")
        );
    }
    log::info!("🎉 Analyzer ready ({} backend)", analyzer.name());

    let mut session = CaptureSession::new(analyzer, image, photo_path).with_extras(extras);
    session.analyze().await;
    session.to_record().context("no estimate was produced")
}
