use async_trait::async_trait;
use futures::stream::BoxStream;

use super::error::AnalyzerResult;
use crate::models::{Estimate, FoodImage, ProgressEvent};

/// Provisioning progress. Finite and not restartable; dropping it cancels
/// whatever upstream work feeds it.
pub type ProvisionStream<'a> = BoxStream<'a, AnalyzerResult<ProgressEvent>>;

/// A calorie-estimation backend that owns one model handle.
///
/// Callers must serialize access to an instance: `provision` and `infer`
/// are not meant to run concurrently on the same analyzer.
#[async_trait]
pub trait AnalyzerBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Starts whatever work makes the backend usable.
    fn provision(&self) -> ProvisionStream<'_>;

    /// Estimates nutrition for one photo. Malformed model output is not an
    /// error; only a failing backend call is.
    async fn infer(&self, image: &FoodImage, extras: &[String]) -> AnalyzerResult<Estimate>;

    /// Releases the model handle. Safe to call more than once.
    fn release(&self);
}
