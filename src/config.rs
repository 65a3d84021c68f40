use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

/// Sampling settings shared by both backends.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub top_k: u32,
    pub max_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            top_k: 16,
            max_tokens: 256,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub openrouter_api_key: String,
    pub openrouter_model: String,
    pub openrouter_base_url: String,
    pub local_model_url: String,
    pub local_model: String,
    pub generation: GenerationOptions,
}

impl Config {
    /// Reads settings from the environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let openrouter_api_key = env::var("OPENROUTER_API_KEY")
            .context("OPENROUTER_API_KEY must be set in .env file")?;

        let defaults = GenerationOptions::default();
        let generation = GenerationOptions {
            temperature: parse_var("GENERATION_TEMPERATURE", defaults.temperature)?,
            top_k: parse_var("GENERATION_TOP_K", defaults.top_k)?,
            max_tokens: parse_var("GENERATION_MAX_TOKENS", defaults.max_tokens)?,
        };

        Ok(Self {
            openrouter_api_key,
            openrouter_model: env::var("OPENROUTER_MODEL")
                .unwrap_or_else(|_| "google/gemini-2.5-flash".to_string()),
            openrouter_base_url: env::var("OPENROUTER_BASE_URL")
                .unwrap_or_else(|_| "https://openrouter.ai/api/v1".to_string()),
            local_model_url: env::var("LOCAL_MODEL_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            local_model: env::var("LOCAL_MODEL").unwrap_or_else(|_| "gemma3:4b".to_string()),
            generation,
        })
    }
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("{} has an invalid value: '{}'", key, raw))
}
