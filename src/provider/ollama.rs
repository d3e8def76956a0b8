use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::{read_body, Provider};
use crate::errors::{ForgeError, Result};
use crate::wire::{LlmReply, LlmRequest};

pub const DEFAULT_URL: &str = "http://localhost:11434";

pub struct Ollama {
    url: String,
    client: Client,
}

impl Ollama {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ForgeError::Config(format!("http client: {e}")))?;
        Ok(Self { url, client })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Msg>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a Value>,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Serialize)]
struct Msg {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: MsgOut,
}

#[derive(Deserialize)]
struct MsgOut {
    #[serde(default)]
    content: String,
}

fn to_messages(req: &LlmRequest) -> Vec<Msg> {
    vec![
        Msg { role: "system".into(), content: req.system.clone(), images: Vec::new() },
        Msg {
            role: "user".into(),
            content: req.text(),
            images: req.images().map(|i| i.data.clone()).collect(),
        },
    ]
}

#[async_trait]
impl Provider for Ollama {
    async fn send(&self, req: &LlmRequest) -> Result<LlmReply> {
        let url = format!("{}/api/chat", self.url.trim_end_matches('/'));
        let body = ChatRequest {
            model: &req.model,
            messages: to_messages(req),
            stream: false,
            format: req.response_schema.as_ref(),
            options: OllamaOptions { temperature: 0.1 },
        };

        tracing::debug!(%url, mode = req.mode.as_str(), "ollama request");

        let resp = self.client.post(&url).json(&body).send().await?;
        let text = read_body("ollama", resp).await?;

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| ForgeError::MalformedResponse(format!("ollama response parse error: {e}")))?;

        Ok(LlmReply { text: parsed.message.content, citations: Vec::new() })
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}
