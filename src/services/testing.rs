use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::analyzer::{AnalyzerBackend, ProvisionStream};
use super::error::{AnalyzerError, AnalyzerResult};
use crate::models::{Estimate, FoodImage, ProgressEvent};

/// Scripted backend for tests. `result: None` makes every `infer` fail.
pub struct FakeBackend {
    name: &'static str,
    events: Vec<Result<ProgressEvent, String>>,
    result: Option<Estimate>,
    released: AtomicUsize,
    seen_extras: Mutex<Vec<Vec<String>>>,
}

impl FakeBackend {
    pub fn new(
        name: &'static str,
        events: Vec<Result<ProgressEvent, String>>,
        result: Option<Estimate>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            events,
            result,
            released: AtomicUsize::new(0),
            seen_extras: Mutex::new(Vec::new()),
        })
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn seen_extras(&self) -> Vec<Vec<String>> {
        self.seen_extras.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalyzerBackend for FakeBackend {
    fn name(&self) -> &str {
        self.name
    }

    fn provision(&self) -> ProvisionStream<'_> {
        let events: Vec<AnalyzerResult<ProgressEvent>> = self
            .events
            .iter()
            .map(|e| match e {
                Ok(event) => Ok(event.clone()),
                Err(message) => Err(AnalyzerError::provisioning(self.name, message.clone())),
            })
            .collect();
        stream::iter(events).boxed()
    }

    async fn infer(&self, _image: &FoodImage, extras: &[String]) -> AnalyzerResult<Estimate> {
        self.seen_extras.lock().unwrap().push(extras.to_vec());
        self.result
            .clone()
            .ok_or_else(|| AnalyzerError::inference(self.name, "estimate failed"))
    }

    fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn image() -> FoodImage {
    FoodImage::new(vec![0], "image/jpeg")
}
