use fs_err as fs;
use serde_json::to_string_pretty;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::wire::{LlmReply, LlmRequest};

/// Initialize tracing on stderr; `RUST_LOG` wins over the `--debug` flag.
pub fn init_tracing(debug: bool) {
    let fallback = if debug { "addon_forge=debug" } else { "addon_forge=info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

pub struct SavedPaths {
    pub dir: PathBuf,
    pub request: PathBuf,
    pub response: PathBuf,
}

/// Writes request/reply JSON for one backend round trip.
#[derive(Debug, Clone)]
pub struct ExchangeLog {
    root: PathBuf,
}

impl ExchangeLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn tx_dir(&self, tx: Uuid) -> PathBuf {
        self.root.join("tx").join(tx.to_string())
    }

    pub fn save_stage(
        &self,
        stage: &str,
        tx: Uuid,
        req: &LlmRequest,
        reply: Option<&LlmReply>,
    ) -> anyhow::Result<SavedPaths> {
        let dir = self.tx_dir(tx);
        fs::create_dir_all(&dir)?;

        let request = dir.join(format!("{stage}.request.json"));
        fs::write(&request, to_string_pretty(&req.redacted())?)?;

        let response = dir.join(format!("{stage}.response.json"));
        if let Some(r) = reply {
            fs::write(&response, to_string_pretty(r)?)?;
        }

        Ok(SavedPaths { dir, request, response })
    }

    /// Saving is best effort; a failure is logged and otherwise ignored.
    pub fn record(&self, stage: &str, tx: Uuid, req: &LlmRequest, reply: Option<&LlmReply>) {
        match self.save_stage(stage, tx, req, reply) {
            Ok(saved) => tracing::debug!(
                dir = %saved.dir.display(),
                request = %saved.request.display(),
                response = %saved.response.display(),
                stage,
                "exchange saved"
            ),
            Err(e) => tracing::warn!(error = %e, stage, "could not save exchange"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
