//! Generative backend client: the three structured round trips
//! (generate, refine, converse) and the contracts their replies must meet.

use std::time::Instant;
use uuid::Uuid;

use crate::config::Config;
use crate::errors::{ForgeError, Result};
use crate::log::ExchangeLog;
use crate::project::{ExtensionFile, Source};
use crate::prompt;
use crate::provider::DynProvider;
use crate::wire::{self, InlineImage, LlmReply, LlmRequest, Mode, Part};

pub const EMPTY_ANSWER: &str = "Sorry, I can't answer that right now.";
pub const UNTITLED_SOURCE: &str = "Reference";

#[derive(Debug, Clone)]
pub struct GeneratedProject {
    pub name: String,
    pub description: String,
    pub files: Vec<ExtensionFile>,
}

#[derive(Debug, Clone)]
pub struct RefinedProject {
    pub name: String,
    pub description: String,
    pub files: Vec<ExtensionFile>,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatAnswer {
    pub text: String,
    /// `None` when the backend cited nothing.
    pub sources: Option<Vec<Source>>,
}

pub struct BackendClient {
    provider: DynProvider,
    build_model: String,
    chat_model: String,
    comment_language: String,
    exchanges: Option<ExchangeLog>,
}

impl BackendClient {
    pub fn new(provider: DynProvider, cfg: &Config) -> Self {
        Self {
            provider,
            build_model: cfg.build_model(),
            chat_model: cfg.chat_model(),
            comment_language: cfg.comment_language.clone(),
            exchanges: None,
        }
    }

    pub fn with_exchange_log(mut self, log: ExchangeLog) -> Self {
        self.exchanges = Some(log);
        self
    }

    async fn round_trip(&self, req: LlmRequest) -> Result<LlmReply> {
        let tx = Uuid::new_v4();
        let started = Instant::now();
        let result = self.provider.send(&req).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(reply) => tracing::info!(
                provider = self.provider.name(),
                mode = req.mode.as_str(),
                model = %req.model,
                parts = req.parts.len(),
                elapsed_ms,
                reply_bytes = reply.text.len(),
                "backend call finished"
            ),
            Err(e) => tracing::warn!(
                provider = self.provider.name(),
                mode = req.mode.as_str(),
                elapsed_ms,
                error = %e,
                "backend call failed"
            ),
        }
        if let Some(log) = self.exchanges.clone() {
            let reply = result.as_ref().ok().cloned();
            let saved = tokio::task::spawn_blocking(move || {
                log.record(req.mode.as_str(), tx, &req, reply.as_ref())
            })
            .await;
            if let Err(e) = saved {
                tracing::warn!(error = %e, "exchange writer task failed");
            }
        }
        result
    }

    fn parts(text: String, image: Option<&InlineImage>) -> Vec<Part> {
        let mut parts = vec![Part::Text { text }];
        if let Some(img) = image {
            parts.push(Part::Image { image: img.clone() });
        }
        parts
    }

    pub async fn generate(&self, idea: &str, image: Option<&InlineImage>) -> Result<GeneratedProject> {
        if idea.trim().is_empty() {
            return Err(ForgeError::InvalidInput("describe the extension first".into()));
        }
        let req = LlmRequest {
            mode: Mode::Generate,
            model: self.build_model.clone(),
            system: prompt::system_prompt_generate(&self.comment_language),
            parts: Self::parts(prompt::user_prompt_generate(idea), image),
            response_schema: Some(wire::project_schema(false)),
            grounding: false,
        };
        let reply = self.round_trip(req).await?;
        let parsed = wire::parse_project_reply(&reply.text, false)?;
        Ok(GeneratedProject {
            name: parsed.name,
            description: parsed.description,
            files: parsed.files,
        })
    }

    /// The returned files are the complete new file set.
    pub async fn refine(
        &self,
        current: &[ExtensionFile],
        instruction: &str,
        image: Option<&InlineImage>,
    ) -> Result<RefinedProject> {
        if instruction.trim().is_empty() {
            return Err(ForgeError::InvalidInput("describe the change first".into()));
        }
        if current.is_empty() {
            return Err(ForgeError::NoProject);
        }
        let req = LlmRequest {
            mode: Mode::Refine,
            model: self.build_model.clone(),
            system: prompt::system_prompt_refine(&self.comment_language),
            parts: Self::parts(prompt::user_prompt_refine(current, instruction), image),
            response_schema: Some(wire::project_schema(true)),
            grounding: false,
        };
        let reply = self.round_trip(req).await?;
        let parsed = wire::parse_project_reply(&reply.text, true)?;
        Ok(RefinedProject {
            name: parsed.name,
            description: parsed.description,
            files: parsed.files,
            explanation: parsed.explanation.unwrap_or_default(),
        })
    }

    pub async fn converse(&self, current: &[ExtensionFile], question: &str) -> Result<ChatAnswer> {
        if question.trim().is_empty() {
            return Err(ForgeError::InvalidInput("ask a question first".into()));
        }
        if current.is_empty() {
            return Err(ForgeError::NoProject);
        }
        let req = LlmRequest {
            mode: Mode::Converse,
            model: self.chat_model.clone(),
            system: prompt::system_prompt_converse(),
            parts: Self::parts(prompt::user_prompt_converse(current, question), None),
            response_schema: None,
            grounding: true,
        };
        let reply = self.round_trip(req).await?;

        let text = if reply.text.trim().is_empty() {
            EMPTY_ANSWER.to_string()
        } else {
            reply.text
        };
        let sources: Vec<Source> = reply
            .citations
            .into_iter()
            .map(|c| Source {
                title: c.title.filter(|t| !t.trim().is_empty()).unwrap_or_else(|| UNTITLED_SOURCE.into()),
                uri: c.uri,
            })
            .collect();

        Ok(ChatAnswer {
            text,
            sources: (!sources.is_empty()).then_some(sources),
        })
    }
}
