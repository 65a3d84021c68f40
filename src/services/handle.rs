use std::sync::Mutex;

use super::error::{AnalyzerError, AnalyzerResult};

enum Slot<T> {
    Empty,
    Ready(T),
    Released,
}

/// Lazily created model handle that can be released exactly once.
///
/// The handle type is expected to be a cheap clone over shared state
/// (e.g. `reqwest::Client`).
pub struct ModelHandle<T> {
    backend: String,
    slot: Mutex<Slot<T>>,
}

impl<T: Clone> ModelHandle<T> {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            slot: Mutex::new(Slot::Empty),
        }
    }

    pub fn get_or_init(&self, init: impl FnOnce() -> T) -> AnalyzerResult<T> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        match &*slot {
            Slot::Ready(handle) => Ok(handle.clone()),
            Slot::Released => Err(AnalyzerError::Released {
                backend: self.backend.clone(),
            }),
            Slot::Empty => {
                log::debug!("🔧 Creating model handle for {}", self.backend);
                let handle = init();
                *slot = Slot::Ready(handle.clone());
                Ok(handle)
            }
        }
    }

    /// Drops the handle. Later calls are no-ops.
    pub fn release(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if !matches!(*slot, Slot::Released) {
            *slot = Slot::Released;
            log::info!("🧹 Released model handle for {}", self.backend);
        }
    }
}
