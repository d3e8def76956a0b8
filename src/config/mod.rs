use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::cli::{Args, ProviderKind};
use crate::errors::{ForgeError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderKind,
    /// Generate/refine model; provider default when unset.
    pub model: Option<String>,
    /// Conversation model; provider default when unset.
    pub chat_model: Option<String>,
    pub api_base: Option<String>,
    pub timeout_secs: u64,
    pub comment_language: String,
    pub export_dir: String,
    pub artifacts_dir: String,
    pub save_exchanges: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Gemini,
            model: None,
            chat_model: None,
            api_base: None,
            timeout_secs: 600,
            comment_language: "English".into(),
            export_dir: ".".into(),
            artifacts_dir: ".addon_forge".into(),
            save_exchanges: false,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| ForgeError::Config(e.to_string()))?;
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        let parsed = match ext.as_str() {
            "toml" => toml::from_str(&text).map_err(|e| e.to_string()),
            "yaml" | "yml" => serde_yaml::from_str(&text).map_err(|e| e.to_string()),
            "json" => serde_json::from_str(&text).map_err(|e| e.to_string()),
            other => Err(format!("unsupported config format '{other}'")),
        };
        parsed.map_err(|e| ForgeError::Config(format!("{}: {e}", path.display())))
    }

    /// File (if any) first, then command-line flags on top.
    pub fn from_args(args: &Args) -> Result<Self> {
        let mut cfg = match &args.config {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };
        if let Some(p) = args.provider {
            cfg.provider = p;
        }
        if let Some(m) = &args.model {
            cfg.model = Some(m.clone());
        }
        if let Some(m) = &args.chat_model {
            cfg.chat_model = Some(m.clone());
        }
        if let Some(b) = &args.api_base {
            cfg.api_base = Some(b.clone());
        }
        if let Some(t) = args.timeout_secs {
            cfg.timeout_secs = t;
        }
        if let Some(d) = &args.export_dir {
            cfg.export_dir = d.clone();
        }
        cfg.save_exchanges |= args.save_exchanges;
        Ok(cfg)
    }

    pub fn build_model(&self) -> String {
        self.model.clone().unwrap_or_else(|| {
            match self.provider {
                ProviderKind::Gemini => "gemini-3-pro-preview",
                ProviderKind::OpenAI => "gpt-4.1-mini",
                ProviderKind::Ollama => "llama3.1",
            }
            .to_string()
        })
    }

    pub fn chat_model(&self) -> String {
        self.chat_model.clone().unwrap_or_else(|| {
            match self.provider {
                ProviderKind::Gemini => "gemini-3-flash-preview",
                ProviderKind::OpenAI => "gpt-4.1-mini",
                ProviderKind::Ollama => "llama3.1",
            }
            .to_string()
        })
    }
}
