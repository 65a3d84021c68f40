use futures::StreamExt;

use crate::models::ProgressEvent;
use crate::services::AnalyzerBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelStatus {
    NotReady,
    Downloading,
    Ready,
    Error,
}

impl std::fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ModelStatus::NotReady => "not ready",
            ModelStatus::Downloading => "downloading",
            ModelStatus::Ready => "ready",
            ModelStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Follows an analyzer's provisioning stream and keeps a displayable status.
#[derive(Debug)]
pub struct ProvisionTracker {
    status: ModelStatus,
    error: Option<String>,
    total_bytes: i64,
    progress: f32,
}

impl Default for ProvisionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProvisionTracker {
    pub fn new() -> Self {
        Self {
            status: ModelStatus::NotReady,
            error: None,
            total_bytes: 0,
            progress: 0.0,
        }
    }

    pub fn status(&self) -> ModelStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Download progress in `[0, 1]`.
    pub fn progress(&self) -> f32 {
        self.progress
    }

    /// Drives provisioning to its end and returns the final status.
    pub async fn run(&mut self, analyzer: &dyn AnalyzerBackend) -> ModelStatus {
        self.status = ModelStatus::Downloading;
        self.error = None;
        self.total_bytes = 0;
        self.progress = 0.0;

        let mut events = analyzer.provision();
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => self.apply(&event),
                Err(e) => {
                    log::error!("❌ Provisioning {} failed: {}", analyzer.name(), e);
                    self.fail(e.to_string());
                }
            }
            if self.status != ModelStatus::Downloading {
                break;
            }
        }

        log::info!("✅ {} model {}", analyzer.name(), self.status);
        self.status
    }

    pub fn apply(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started { total_bytes } => {
                self.total_bytes = *total_bytes;
                self.progress = 0.0;
            }
            ProgressEvent::InProgress { bytes_downloaded } => {
                if self.total_bytes > 0 {
                    self.progress = (*bytes_downloaded as f32 / self.total_bytes as f32).clamp(0.0, 1.0);
                    log::info!("⬇️ Model download {:.0}%", self.progress * 100.0);
                }
            }
            ProgressEvent::Completed => {
                self.progress = 1.0;
                self.status = ModelStatus::Ready;
            }
            ProgressEvent::Failed { message } => self.fail(message.clone()),
        }
    }

    fn fail(&mut self, message: String) {
        self.status = ModelStatus::Error;
        self.error = Some(if message.is_empty() {
            "Download failed".to_string()
        } else {
            message
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Estimate;
    use crate::services::testing::FakeBackend;

    fn backend(events: Vec<Result<ProgressEvent, String>>) -> std::sync::Arc<FakeBackend> {
        FakeBackend::new("fake", events, Some(Estimate::new("Test Food", 100, 10.0, 20.0, 5.0)))
    }

    #[tokio::test]
    async fn test_run_reaches_ready() {
        let analyzer = backend(vec![
            Ok(ProgressEvent::Started { total_bytes: 1000 }),
            Ok(ProgressEvent::InProgress { bytes_downloaded: 500 }),
            Ok(ProgressEvent::Completed),
        ]);
        let mut tracker = ProvisionTracker::new();

        assert_eq!(tracker.run(analyzer.as_ref()).await, ModelStatus::Ready);
        assert_eq!(tracker.progress(), 1.0);
        assert_eq!(tracker.error(), None);
    }

    #[tokio::test]
    async fn test_run_reports_failed_event() {
        let analyzer = backend(vec![Ok(ProgressEvent::Failed { message: "network error".to_string() })]);
        let mut tracker = ProvisionTracker::new();

        assert_eq!(tracker.run(analyzer.as_ref()).await, ModelStatus::Error);
        assert_eq!(tracker.error(), Some("network error"));
    }

    #[tokio::test]
    async fn test_run_reports_stream_error() {
        let analyzer = backend(vec![Err("connection refused".to_string())]);
        let mut tracker = ProvisionTracker::new();

        assert_eq!(tracker.run(analyzer.as_ref()).await, ModelStatus::Error);
        assert!(tracker.error().unwrap().contains("connection refused"));
    }

    #[test]
    fn test_progress_fraction() {
        let mut tracker = ProvisionTracker::new();
        assert_eq!(tracker.status(), ModelStatus::NotReady);

        tracker.apply(&ProgressEvent::InProgress { bytes_downloaded: 10 });
        assert_eq!(tracker.progress(), 0.0);

        tracker.apply(&ProgressEvent::Started { total_bytes: 200 });
        tracker.apply(&ProgressEvent::InProgress { bytes_downloaded: 50 });
        assert_eq!(tracker.progress(), 0.25);

        tracker.apply(&ProgressEvent::InProgress { bytes_downloaded: 400 });
        assert_eq!(tracker.progress(), 1.0);
    }

    #[test]
    fn test_empty_failure_message_gets_default() {
        let mut tracker = ProvisionTracker::new();
        tracker.apply(&ProgressEvent::Failed { message: String::new() });
        assert_eq!(tracker.error(), Some("Download failed"));
    }
}
