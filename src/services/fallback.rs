use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::analyzer::{AnalyzerBackend, ProvisionStream};
use super::error::AnalyzerResult;
use crate::models::{Estimate, FoodImage, ProgressEvent};

/// Prefers the on-device backend and switches to the cloud backend for good
/// if on-device provisioning fails.
///
/// A failed provisioning is reported as a plain `Completed`, since a usable
/// backend is active afterwards. The failure message only reaches the log.
///
/// `infer` without a prior `provision` goes to the on-device backend.
pub struct FallbackAnalyzer {
    on_device: Arc<dyn AnalyzerBackend>,
    cloud: Arc<dyn AnalyzerBackend>,
    on_cloud: AtomicBool,
}

impl FallbackAnalyzer {
    pub fn new(on_device: Arc<dyn AnalyzerBackend>, cloud: Arc<dyn AnalyzerBackend>) -> Self {
        Self {
            on_device,
            cloud,
            on_cloud: AtomicBool::new(false),
        }
    }

    fn active(&self) -> &dyn AnalyzerBackend {
        if self.is_on_cloud() {
            self.cloud.as_ref()
        } else {
            self.on_device.as_ref()
        }
    }

    pub fn is_on_cloud(&self) -> bool {
        self.on_cloud.load(Ordering::Acquire)
    }

    /// One-way: nothing switches back to on-device.
    fn switch_to_cloud(&self, reason: &str) {
        log::warn!(
            "⚠️ {} provisioning failed: {}, switching to {}",
            self.on_device.name(),
            reason,
            self.cloud.name()
        );
        self.on_cloud.store(true, Ordering::Release);
    }
}

#[async_trait]
impl AnalyzerBackend for FallbackAnalyzer {
    fn name(&self) -> &str {
        self.active().name()
    }

    fn provision(&self) -> ProvisionStream<'_> {
        let upstream = self.on_device.provision();

        stream::unfold(Some(upstream), move |upstream| async move {
            let mut upstream = match upstream {
                Some(upstream) => upstream,
                None => return None,
            };
            let event = match upstream.next().await {
                None => return None,
                Some(Ok(ProgressEvent::Failed { message })) => {
                    self.switch_to_cloud(&message);
                    ProgressEvent::Completed
                }
                Some(Err(e)) => {
                    self.switch_to_cloud(&e.to_string());
                    ProgressEvent::Completed
                }
                Some(Ok(event)) => event,
            };

            // Dropping the upstream after a terminal event ends the subscription.
            let next = (!event.is_terminal()).then_some(upstream);
            Some((Ok(event), next))
        })
        .boxed()
    }

    async fn infer(&self, image: &FoodImage, extras: &[String]) -> AnalyzerResult<Estimate> {
        let backend = self.active();
        log::debug!("🔀 Routing estimate to {} backend", backend.name());
        backend.infer(image, extras).await
    }

    fn release(&self) {
        self.active().release();
    }
}
