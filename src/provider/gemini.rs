use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use super::{read_body, upper_case_types, Provider};
use crate::errors::{ForgeError, Result};
use crate::wire::{Citation, LlmReply, LlmRequest, Part};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Google Gemini `generateContent` adapter. Supports inline images,
/// response schemas and Google Search grounding.
pub struct GeminiProvider {
    api_base: String,
    api_key: String,
    client: Client,
}

impl GeminiProvider {
    pub fn new(api_base: String, api_key: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ForgeError::Config(format!("http client: {e}")))?;
        Ok(Self { api_base, api_key, client })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    system_instruction: Instruction<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<OutPart<'a>>,
}

#[derive(Serialize)]
struct Instruction<'a> {
    parts: Vec<OutPart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum OutPart<'a> {
    Text {
        text: &'a str,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<InPart>,
}

#[derive(Deserialize)]
struct InPart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Deserialize)]
struct GroundingChunk {
    #[serde(default)]
    web: Option<WebChunk>,
}

#[derive(Deserialize)]
struct WebChunk {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

fn to_parts(parts: &[Part]) -> Vec<OutPart<'_>> {
    parts
        .iter()
        .map(|p| match p {
            Part::Text { text } => OutPart::Text { text },
            Part::Image { image } => OutPart::Inline {
                inline_data: InlineData { mime_type: &image.mime_type, data: &image.data },
            },
        })
        .collect()
}

#[async_trait]
impl Provider for GeminiProvider {
    async fn send(&self, req: &LlmRequest) -> Result<LlmReply> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            req.model
        );
        let body = GenerateRequest {
            contents: vec![Content { role: "user", parts: to_parts(&req.parts) }],
            system_instruction: Instruction { parts: vec![OutPart::Text { text: &req.system }] },
            generation_config: req.response_schema.as_ref().map(|schema| GenerationConfig {
                response_mime_type: "application/json",
                response_schema: upper_case_types(schema),
            }),
            tools: if req.grounding { vec![json!({ "googleSearch": {} })] } else { Vec::new() },
        };

        tracing::debug!(%url, mode = req.mode.as_str(), "gemini request");

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let text = read_body("gemini", resp).await?;

        let parsed: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| ForgeError::MalformedResponse(format!("gemini response parse error: {e}")))?;
        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ForgeError::MalformedResponse("gemini returned no candidates".into()))?;

        let text = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter(|p| !p.thought)
                    .filter_map(|p| p.text)
                    .collect::<String>()
            })
            .unwrap_or_default();

        let citations = candidate
            .grounding_metadata
            .map(|g| {
                g.grounding_chunks
                    .into_iter()
                    .filter_map(|c| c.web)
                    .filter_map(|w| w.uri.map(|uri| Citation { title: w.title, uri }))
                    .collect()
            })
            .unwrap_or_default();

        Ok(LlmReply { text, citations })
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}
