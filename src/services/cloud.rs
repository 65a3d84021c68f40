use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use super::analyzer::{AnalyzerBackend, ProvisionStream};
use super::error::{AnalyzerError, AnalyzerResult};
use super::handle::ModelHandle;
use super::{parser, prompt};
use crate::config::GenerationOptions;
use crate::models::{Estimate, FoodImage, ProgressEvent};

const BACKEND_NAME: &str = "cloud";

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ContentPart {
    Text {
        #[serde(rename = "type")]
        content_type: String,
        text: String,
    },
    ImageUrl {
        #[serde(rename = "type")]
        content_type: String,
        image_url: ImageData,
    },
}

#[derive(Debug, Serialize)]
struct ImageData {
    url: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    top_k: u32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    #[serde(default)]
    content: Option<String>,
}

/// Remote model behind the OpenRouter chat-completions API.
pub struct CloudBackend {
    api_key: String,
    model: String,
    base_url: String,
    options: GenerationOptions,
    client: ModelHandle<reqwest::Client>,
}

impl CloudBackend {
    pub fn new(api_key: String, model: String, base_url: String, options: GenerationOptions) -> Self {
        Self {
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            options,
            client: ModelHandle::new(BACKEND_NAME),
        }
    }

    fn build_request(&self, image: &FoodImage, prompt: String) -> ChatRequest {
        let messages = vec![ChatMessage {
            role: "user".to_string(),
            content: vec![
                ContentPart::Text {
                    content_type: "text".to_string(),
                    text: prompt,
                },
                ContentPart::ImageUrl {
                    content_type: "image_url".to_string(),
                    image_url: ImageData { url: image.data_url() },
                },
            ],
        }];

        ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: self.options.temperature,
            top_k: self.options.top_k,
            max_tokens: self.options.max_tokens,
        }
    }
}

#[async_trait]
impl AnalyzerBackend for CloudBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn provision(&self) -> ProvisionStream<'_> {
        stream::iter(vec![Ok(ProgressEvent::Completed)]).boxed()
    }

    async fn infer(&self, image: &FoodImage, extras: &[String]) -> AnalyzerResult<Estimate> {
        let client = self.client.get_or_init(reqwest::Client::new)?;
        let request = self.build_request(image, prompt::build_prompt(extras));

        log::info!("🤖 Sending request to OpenRouter with model: {}", self.model);
        log::debug!("📤 Request payload size: {} bytes", serde_json::to_string(&request)?.len());

        let response = client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("X-Title", "Calorie Snap")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        log::debug!("📥 OpenRouter response status: {}", status);

        if !status.is_success() {
            let error_text = response.text().await?;
            log::error!("❌ OpenRouter API error response: {}", error_text);
            return Err(AnalyzerError::inference(
                BACKEND_NAME,
                format!("OpenRouter API error ({}): {}", status, error_text),
            ));
        }

        let chat_response: ChatResponse = response.json().await?;
        let content = reply_text(chat_response);
        log::info!("💬 OpenRouter response content: {}", content);

        Ok(parser::parse_response(&content))
    }

    fn release(&self) {
        self.client.release();
    }
}

fn reply_text(response: ChatResponse) -> String {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default()
}
