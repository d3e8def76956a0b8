use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::{read_body, Provider};
use crate::errors::{ForgeError, Result};
use crate::wire::{LlmReply, LlmRequest, Part};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com";

/// OpenAI chat-completions provider. Structured calls force a JSON object
/// reply and carry the schema in the system message; web grounding is not
/// available here, so conversational answers come back without citations.
pub struct OpenAIProvider {
    api_base: String,
    api_key: String,
    client: Client,
}

impl OpenAIProvider {
    pub fn new(api_base: String, api_key: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ForgeError::Config(format!("http client: {e}")))?;
        Ok(Self { api_base, api_key, client })
    }
}

fn system_message(req: &LlmRequest) -> String {
    match &req.response_schema {
        Some(schema) => format!(
            "{}\n\nReply with exactly one JSON object (no markdown, no code fences) matching this JSON schema:\n{}",
            req.system, schema
        ),
        None => req.system.clone(),
    }
}

fn user_content(parts: &[Part]) -> Vec<Value> {
    parts
        .iter()
        .map(|p| match p {
            Part::Text { text } => json!({ "type": "text", "text": text }),
            Part::Image { image } => json!({
                "type": "image_url",
                "image_url": { "url": format!("data:{};base64,{}", image.mime_type, image.data) }
            }),
        })
        .collect()
}

#[async_trait]
impl Provider for OpenAIProvider {
    async fn send(&self, req: &LlmRequest) -> Result<LlmReply> {
        if req.grounding {
            tracing::debug!("openai: web grounding requested but not supported; answering without it");
        }

        let mut body = json!({
            "model": req.model,
            "messages": [
                { "role": "system", "content": system_message(req) },
                { "role": "user", "content": user_content(&req.parts) }
            ],
        });
        if req.response_schema.is_some() {
            body["temperature"] = json!(0.0);
            body["response_format"] = json!({ "type": "json_object" });
        }

        let url = format!("{}/v1/chat/completions", self.api_base.trim_end_matches('/'));
        tracing::debug!(%url, mode = req.mode.as_str(), "openai request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let text = read_body("openai", resp).await?;

        // Minimal structs to parse the chat response
        #[derive(Deserialize)]
        struct ChatMessage {
            #[serde(default)]
            content: Option<String>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChatMessage,
        }
        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| ForgeError::MalformedResponse(format!("openai response parse error: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        Ok(LlmReply { text: content, citations: Vec::new() })
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
