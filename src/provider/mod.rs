use async_trait::async_trait;
use std::time::Duration;

use crate::cli::ProviderKind;
use crate::config::Config;
use crate::errors::{ForgeError, Result};
use crate::wire::{LlmReply, LlmRequest};

pub mod gemini;
pub mod ollama;
pub mod openai;

#[async_trait]
pub trait Provider: Send + Sync {
    async fn send(&self, req: &LlmRequest) -> Result<LlmReply>;

    fn name(&self) -> &'static str;
}

pub type DynProvider = Box<dyn Provider + Send + Sync>;

fn api_key(var: &str) -> Result<String> {
    std::env::var(var).map_err(|_| ForgeError::Config(format!("{var} env var is not set")))
}

pub fn make_provider(cfg: &Config) -> Result<DynProvider> {
    let timeout = Duration::from_secs(cfg.timeout_secs);
    match cfg.provider {
        ProviderKind::Gemini => Ok(Box::new(gemini::GeminiProvider::new(
            cfg.api_base.clone().unwrap_or_else(|| gemini::DEFAULT_API_BASE.into()),
            api_key("GEMINI_API_KEY")?,
            timeout,
        )?)),
        ProviderKind::OpenAI => Ok(Box::new(openai::OpenAIProvider::new(
            cfg.api_base.clone().unwrap_or_else(|| openai::DEFAULT_API_BASE.into()),
            api_key("OPENAI_API_KEY")?,
            timeout,
        )?)),
        ProviderKind::Ollama => Ok(Box::new(ollama::Ollama::new(
            cfg.api_base.clone().unwrap_or_else(|| ollama::DEFAULT_URL.into()),
            timeout,
        )?)),
    }
}

/// Shared status handling: non-2xx is a transport fault carrying the body.
pub(crate) async fn read_body(vendor: &str, resp: reqwest::Response) -> Result<String> {
    let status = resp.status();
    let text = resp.text().await?;
    tracing::debug!(vendor, %status, bytes = text.len(), "raw response received");
    if !status.is_success() {
        return Err(ForgeError::Transport(format!("{vendor} API error ({status}): {text}")));
    }
    Ok(text)
}

/// Lower-case JSON-schema type names, upper-cased for APIs that expect `OBJECT`/`STRING`.
pub(crate) fn upper_case_types(schema: &serde_json::Value) -> serde_json::Value {
    use serde_json::Value;
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let v = match (k.as_str(), v) {
                        ("type", Value::String(t)) => Value::String(t.to_ascii_uppercase()),
                        _ => upper_case_types(v),
                    };
                    (k.clone(), v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(upper_case_types).collect()),
        other => other.clone(),
    }
}
