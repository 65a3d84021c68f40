use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use super::analyzer::{AnalyzerBackend, ProvisionStream};
use super::error::{AnalyzerError, AnalyzerResult};
use super::handle::ModelHandle;
use super::{parser, prompt};
use crate::config::GenerationOptions;
use crate::models::{Estimate, FoodImage, ProgressEvent};

const BACKEND_NAME: &str = "on-device";

#[derive(Debug, Serialize)]
struct PullRequest<'a> {
    model: &'a str,
    stream: bool,
}

/// One NDJSON line of a pull response.
#[derive(Debug, Deserialize)]
struct PullStatus {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    digest: Option<String>,
    #[serde(default)]
    total: Option<i64>,
    #[serde(default)]
    completed: Option<i64>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    images: Vec<String>,
    stream: bool,
    options: SamplingOptions,
}

#[derive(Debug, Serialize)]
struct SamplingOptions {
    temperature: f32,
    top_k: u32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Default, Clone, Copy)]
struct Layer {
    total: i64,
    completed: i64,
}

/// Maps pull status lines onto progress events.
///
/// Byte counts are summed over all layers (keyed by digest), so progress
/// never goes backwards when the next layer starts. `Started` is emitted
/// once, from the first line carrying a total, and no `InProgress` precedes
/// it. At most one terminal event is emitted.
#[derive(Debug, Default)]
struct PullTracker {
    layers: BTreeMap<String, Layer>,
    reported: i64,
    started: bool,
    finished: bool,
}

impl PullTracker {
    fn events(&mut self, status: PullStatus) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }

        if let Some(message) = status.error {
            self.finished = true;
            events.push(ProgressEvent::Failed { message });
            return events;
        }

        if status.total.is_some() || status.completed.is_some() {
            let layer = self.layers.entry(status.digest.unwrap_or_default()).or_default();
            if let Some(total) = status.total {
                layer.total = layer.total.max(total);
            }
            if let Some(completed) = status.completed {
                layer.completed = layer.completed.max(completed);
            }

            if !self.started && status.total.is_some() {
                self.started = true;
                events.push(ProgressEvent::Started { total_bytes: self.total_bytes() });
            }

            let downloaded = self.downloaded_bytes();
            if self.started && (status.completed.is_some() || downloaded > self.reported) {
                self.reported = downloaded;
                events.push(ProgressEvent::InProgress { bytes_downloaded: downloaded });
            }
        }

        if status.status.as_deref() == Some("success") {
            self.finished = true;
            events.push(ProgressEvent::Completed);
        }

        events
    }

    fn total_bytes(&self) -> i64 {
        self.layers.values().map(|l| l.total).sum()
    }

    fn downloaded_bytes(&self) -> i64 {
        self.layers.values().map(|l| l.completed).sum()
    }
}

/// Splits a chunked body into newline-delimited records.
#[derive(Debug, Default)]
struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line).trim().to_string());
        }
        lines.retain(|l| !l.is_empty());
        lines
    }

    fn finish(&mut self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.buffer).trim().to_string();
        self.buffer.clear();
        (!rest.is_empty()).then_some(rest)
    }
}

struct PullBody {
    chunks: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    lines: LineBuffer,
    tracker: PullTracker,
    pending: VecDeque<ProgressEvent>,
    exhausted: bool,
}

impl PullBody {
    fn new(chunks: BoxStream<'static, reqwest::Result<Vec<u8>>>) -> Self {
        Self {
            chunks,
            lines: LineBuffer::default(),
            tracker: PullTracker::default(),
            pending: VecDeque::new(),
            exhausted: false,
        }
    }

    fn feed_line(&mut self, line: &str) {
        match serde_json::from_str::<PullStatus>(line) {
            Ok(status) => self.pending.extend(self.tracker.events(status)),
            Err(e) => log::warn!("Skipping unreadable pull status line ({}): {}", e, line),
        }
    }
}

enum PullState {
    Connect,
    Streaming(Box<PullBody>),
    Done,
}

/// Local model served by an Ollama-compatible runtime.
pub struct OnDeviceBackend {
    base_url: String,
    model: String,
    options: GenerationOptions,
    client: ModelHandle<reqwest::Client>,
}

impl OnDeviceBackend {
    pub fn new(base_url: String, model: String, options: GenerationOptions) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            options,
            client: ModelHandle::new(BACKEND_NAME),
        }
    }

    async fn start_pull(&self) -> AnalyzerResult<BoxStream<'static, reqwest::Result<Vec<u8>>>> {
        let client = self.client.get_or_init(reqwest::Client::new)?;
        log::info!("⬇️ Pulling local model {} from {}", self.model, self.base_url);

        let response = client
            .post(format!("{}/api/pull", self.base_url))
            .json(&PullRequest {
                model: &self.model,
                stream: true,
            })
            .send()
            .await
            .map_err(|e| AnalyzerError::provisioning(BACKEND_NAME, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AnalyzerError::provisioning(
                BACKEND_NAME,
                format!("pull request failed ({}): {}", status, error_text),
            ));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed())
    }

    async fn next_event(&self, mut state: PullState) -> Option<(AnalyzerResult<ProgressEvent>, PullState)> {
        loop {
            state = match state {
                PullState::Done => return None,
                PullState::Connect => match self.start_pull().await {
                    Ok(chunks) => PullState::Streaming(Box::new(PullBody::new(chunks))),
                    Err(e) => return Some((Err(e), PullState::Done)),
                },
                PullState::Streaming(mut body) => {
                    if let Some(event) = body.pending.pop_front() {
                        log::debug!("📦 Local model pull: {}", event);
                        let next = if event.is_terminal() {
                            PullState::Done
                        } else {
                            PullState::Streaming(body)
                        };
                        return Some((Ok(event), next));
                    }

                    if body.exhausted {
                        let err = AnalyzerError::provisioning(BACKEND_NAME, "pull ended before completion");
                        return Some((Err(err), PullState::Done));
                    }

                    match body.chunks.next().await {
                        Some(Ok(chunk)) => {
                            for line in body.lines.push(&chunk) {
                                body.feed_line(&line);
                            }
                        }
                        Some(Err(e)) => {
                            let err = AnalyzerError::provisioning(BACKEND_NAME, e.to_string());
                            return Some((Err(err), PullState::Done));
                        }
                        None => {
                            if let Some(line) = body.lines.finish() {
                                body.feed_line(&line);
                            }
                            body.exhausted = true;
                        }
                    }
                    PullState::Streaming(body)
                }
            }
        }
    }
}

#[async_trait]
impl AnalyzerBackend for OnDeviceBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn provision(&self) -> ProvisionStream<'_> {
        stream::unfold(PullState::Connect, move |state| async move {
            self.next_event(state).await
        })
        .boxed()
    }

    async fn infer(&self, image: &FoodImage, extras: &[String]) -> AnalyzerResult<Estimate> {
        let client = self.client.get_or_init(reqwest::Client::new)?;
        let request = GenerateRequest {
            model: &self.model,
            prompt: prompt::build_prompt(extras),
            images: vec![image.to_base64()],
            stream: false,
            options: SamplingOptions {
                temperature: self.options.temperature,
                top_k: self.options.top_k,
                num_predict: self.options.max_tokens,
            },
        };

        log::info!("🤖 Sending request to local model: {}", self.model);

        let response = client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        log::debug!("📥 Local model response status: {}", status);

        if !status.is_success() {
            let error_text = response.text().await?;
            log::error!("❌ Local model error response: {}", error_text);
            return Err(AnalyzerError::inference(
                BACKEND_NAME,
                format!("generate failed ({}): {}", status, error_text),
            ));
        }

        let generated: GenerateResponse = response.json().await?;
        log::info!("💬 Local model response content: {}", generated.response);

        Ok(parser::parse_response(&generated.response))
    }

    fn release(&self) {
        self.client.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(line: &str) -> PullStatus {
        serde_json::from_str(line).unwrap()
    }

    #[test]
    fn test_tracker_maps_download_lifecycle() {
        let mut tracker = PullTracker::default();

        assert!(tracker.events(status(r#"{"status":"pulling manifest"}"#)).is_empty());
        assert_eq!(
            tracker.events(status(r#"{"status":"pulling a1","digest":"a1","total":1000,"completed":0}"#)),
            vec![
                ProgressEvent::Started { total_bytes: 1000 },
                ProgressEvent::InProgress { bytes_downloaded: 0 },
            ]
        );
        assert_eq!(
            tracker.events(status(r#"{"status":"pulling a1","digest":"a1","total":1000,"completed":500}"#)),
            vec![ProgressEvent::InProgress { bytes_downloaded: 500 }]
        );
        assert_eq!(
            tracker.events(status(r#"{"status":"success"}"#)),
            vec![ProgressEvent::Completed]
        );
        assert!(tracker.events(status(r#"{"status":"success"}"#)).is_empty());
    }

    #[test]
    fn test_tracker_maps_error_to_failed() {
        let mut tracker = PullTracker::default();
        assert_eq!(
            tracker.events(status(r#"{"error":"model not found"}"#)),
            vec![ProgressEvent::Failed { message: "model not found".to_string() }]
        );
        assert!(tracker.events(status(r#"{"status":"success"}"#)).is_empty());
    }

    #[test]
    fn test_line_buffer_handles_split_chunks() {
        let mut lines = LineBuffer::default();

        assert!(lines.push(br#"{"status":"pul"#).is_empty());
        assert_eq!(
            lines.push(b"ling\"}\n\n{\"status\":\"success\"}\n{\"tot"),
            vec![r#"{"status":"pulling"}"#.to_string(), r#"{"status":"success"}"#.to_string()]
        );
        assert_eq!(lines.finish(), Some(r#"{"tot"#.to_string()));
        assert_eq!(lines.finish(), None);
    }

    #[test]
    fn test_generate_request_shape() {
        let request = GenerateRequest {
            model: "gemma3:4b",
            prompt: "describe".to_string(),
            images: vec!["AQID".to_string()],
            stream: false,
            options: SamplingOptions {
                temperature: 0.2,
                top_k: 16,
                num_predict: 256,
            },
        };
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["stream"], false);
        assert_eq!(json["images"][0], "AQID");
        assert_eq!(json["options"]["top_k"], 16);
        assert_eq!(json["options"]["num_predict"], 256);
    }

    #[tokio::test]
    async fn test_provision_after_release_reports_error() {
        let backend = OnDeviceBackend::new(
            "http://localhost:1".to_string(),
            "test".to_string(),
            GenerationOptions::default(),
        );
        backend.release();

        let events: Vec<_> = backend.provision().collect().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(AnalyzerError::Released { .. })));
    }

    #[test]
    fn test_tracker_never_reports_progress_before_started() {
        let mut tracker = PullTracker::default();

        assert!(tracker.events(status(r#"{"status":"pulling","completed":100}"#)).is_empty());
        assert_eq!(
            tracker.events(status(r#"{"status":"pulling","total":1000,"completed":200}"#)),
            vec![
                ProgressEvent::Started { total_bytes: 1000 },
                ProgressEvent::InProgress { bytes_downloaded: 200 },
            ]
        );
    }

    #[test]
    fn test_tracker_sums_layers() {
        let mut tracker = PullTracker::default();
        let mut events = Vec::new();
        for line in [
            r#"{"status":"pulling a","digest":"a","total":1000,"completed":1000}"#,
            r#"{"status":"pulling b","digest":"b","total":20,"completed":10}"#,
            r#"{"status":"pulling b","digest":"b","total":20,"completed":20}"#,
            r#"{"status":"success"}"#,
        ] {
            events.extend(tracker.events(status(line)));
        }

        assert_eq!(
            events,
            vec![
                ProgressEvent::Started { total_bytes: 1000 },
                ProgressEvent::InProgress { bytes_downloaded: 1000 },
                ProgressEvent::InProgress { bytes_downloaded: 1010 },
                ProgressEvent::InProgress { bytes_downloaded: 1020 },
                ProgressEvent::Completed,
            ]
        );
    }

    fn backend() -> OnDeviceBackend {
        OnDeviceBackend::new(
            "http://localhost:1".to_string(),
            "test".to_string(),
            GenerationOptions::default(),
        )
    }

    fn chunk(text: &str) -> reqwest::Result<Vec<u8>> {
        Ok(text.as_bytes().to_vec())
    }

    fn transport_error() -> reqwest::Error {
        reqwest::Client::new().get("not a url").build().unwrap_err()
    }

    /// Runs the pull state machine over an in-memory body.
    async fn drive(chunks: Vec<reqwest::Result<Vec<u8>>>) -> Vec<Result<ProgressEvent, String>> {
        let backend = backend();
        let body = PullBody::new(stream::iter(chunks).boxed());
        stream::unfold(PullState::Streaming(Box::new(body)), |state| backend.next_event(state))
            .map(|event| event.map_err(|e| e.to_string()))
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_pull_stops_at_first_terminal_event() {
        let events = drive(vec![
            chunk("{\"status\":\"pulling a\",\"digest\":\"a\",\"total\":10,\"completed\":5}\n{\"stat"),
            chunk("us\":\"success\"}\n{\"error\":\"late\"}\n"),
            chunk("{\"status\":\"success\"}\n"),
        ])
        .await;

        assert_eq!(
            events,
            vec![
                Ok(ProgressEvent::Started { total_bytes: 10 }),
                Ok(ProgressEvent::InProgress { bytes_downloaded: 5 }),
                Ok(ProgressEvent::Completed),
            ]
        );
    }

    #[tokio::test]
    async fn test_pull_reads_unterminated_last_line() {
        let events = drive(vec![chunk("{\"status\":\"success\"}")]).await;
        assert_eq!(events, vec![Ok(ProgressEvent::Completed)]);
    }

    #[tokio::test]
    async fn test_truncated_pull_is_an_error() {
        let events = drive(vec![chunk(
            "{\"status\":\"pulling a\",\"digest\":\"a\",\"total\":10,\"completed\":5}\n",
        )])
        .await;

        assert_eq!(events.len(), 3);
        assert_eq!(events[0], Ok(ProgressEvent::Started { total_bytes: 10 }));
        assert_eq!(events[1], Ok(ProgressEvent::InProgress { bytes_downloaded: 5 }));
        assert!(events[2].as_ref().unwrap_err().contains("pull ended before completion"));
    }

    #[tokio::test]
    async fn test_transport_error_ends_pull() {
        let events = drive(vec![
            chunk("{\"status\":\"pulling a\",\"digest\":\"a\",\"total\":10,\"completed\":5}\n"),
            Err(transport_error()),
            chunk("{\"status\":\"success\"}\n"),
        ])
        .await;

        assert_eq!(events.len(), 3);
        assert!(events[2].as_ref().unwrap_err().contains("on-device provisioning failed"));
    }

    #[tokio::test]
    async fn test_unreadable_lines_are_skipped() {
        let events = drive(vec![chunk("garbage\n{\"status\":\"success\"}\n")]).await;
        assert_eq!(events, vec![Ok(ProgressEvent::Completed)]);
    }
}
