pub mod analyzer;
pub mod cloud; // OpenRouter chat completions
pub mod error;
pub mod fallback;
pub mod handle;
pub mod on_device; // Local Ollama-compatible runtime
pub mod parser;
pub mod prompt;

#[cfg(test)]
pub(crate) mod testing;

pub use analyzer::{AnalyzerBackend, ProvisionStream};
pub use cloud::CloudBackend;
pub use error::{AnalyzerError, AnalyzerResult};
pub use fallback::FallbackAnalyzer;
pub use on_device::OnDeviceBackend;
pub use parser::parse_response;
pub use prompt::{build_prompt, EXTRA_OPTIONS};
