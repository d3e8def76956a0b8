//! Test helpers: a provider that replays canned replies and records requests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::{ForgeError, Result};
use crate::provider::Provider;
use crate::wire::{LlmReply, LlmRequest};

struct Step {
    result: Result<LlmReply>,
    delay: Option<Duration>,
}

#[derive(Default)]
struct Inner {
    script: VecDeque<Step>,
    requests: Vec<LlmRequest>,
}

#[derive(Clone, Default)]
pub struct ScriptedProvider {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, result: Result<LlmReply>, delay: Option<Duration>) {
        self.inner.lock().script.push_back(Step { result, delay });
    }

    pub fn push_reply(&self, reply: LlmReply) {
        self.push(Ok(reply), None);
    }

    pub fn push_text(&self, text: impl Into<String>) {
        self.push_reply(LlmReply { text: text.into(), citations: Vec::new() });
    }

    pub fn push_delayed_text(&self, text: impl Into<String>, delay: Duration) {
        self.push(Ok(LlmReply { text: text.into(), citations: Vec::new() }), Some(delay));
    }

    pub fn push_error(&self, err: ForgeError) {
        self.push(Err(err), None);
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.inner.lock().requests.clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn send(&self, req: &LlmRequest) -> Result<LlmReply> {
        let step = {
            let mut inner = self.inner.lock();
            inner.requests.push(req.clone());
            inner.script.pop_front()
        };
        let Some(step) = step else {
            return Err(ForgeError::Transport("scripted provider has no reply left".into()));
        };
        if let Some(d) = step.delay {
            tokio::time::sleep(d).await;
        }
        step.result
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Structured project reply text in the backend's wire shape.
pub fn project_json(name: &str, files: &[(&str, &str)], explanation: Option<&str>) -> String {
    let files: Vec<_> = files
        .iter()
        .map(|(path, content)| {
            json!({
                "path": path,
                "content": content,
                "language": crate::project::language_for_path(path)
            })
        })
        .collect();
    let mut v = json!({
        "extensionName": name,
        "extensionDescription": format!("{name} description"),
        "files": files
    });
    if let Some(e) = explanation {
        v["explanation"] = json!(e);
    }
    v.to_string()
}
