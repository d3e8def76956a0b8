use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[value(alias = "google")]
    Gemini,
    #[value(name = "openai", alias = "open-ai")]
    #[serde(rename = "openai")]
    OpenAI,
    Ollama,
}

#[derive(Parser, Debug, Default)]
#[command(name = "addon_forge", version, about = "Describe a browser extension, let the AI build it, refine it and export it as a ZIP")]
pub struct Args {
    /// Config file (.toml, .yaml or .json)
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub provider: Option<ProviderKind>,

    /// Model used to generate and refine projects
    #[arg(long)]
    pub model: Option<String>,

    /// Model used for the Q&A conversation
    #[arg(long)]
    pub chat_model: Option<String>,

    #[arg(long)]
    pub api_base: Option<String>,

    #[arg(long)]
    pub timeout_secs: Option<u64>,

    #[arg(long)]
    pub export_dir: Option<String>,

    /// Save every request/response pair under the artifacts directory
    #[arg(long, default_value_t = false)]
    pub save_exchanges: bool,

    #[arg(long, default_value_t = false)]
    pub debug: bool,
}

/// One line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    New(String),
    Import(PathBuf),
    Image(PathBuf),
    RefineImage(PathBuf),
    ClearImage,
    Files,
    Open(String),
    Show,
    Refine(String),
    Ask(String),
    Chat,
    Export(Option<PathBuf>),
    Dismiss,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    if line.is_empty() {
        return Err("empty input".into());
    }
    // Bare text is a question once a conversation is the natural next step.
    if !line.starts_with('/') {
        return Ok(Command::Ask(line.to_string()));
    }

    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((h, r)) => (h, r.trim()),
        None => (line, ""),
    };
    let need = |what: &str| -> Result<String, String> {
        if rest.is_empty() {
            Err(format!("{head} needs {what}"))
        } else {
            Ok(rest.to_string())
        }
    };

    match head {
        "/new" => Ok(Command::New(need("an idea")?)),
        "/import" => Ok(Command::Import(PathBuf::from(need("a .zip path")?))),
        "/image" => Ok(Command::Image(PathBuf::from(need("an image path")?))),
        "/refine-image" => Ok(Command::RefineImage(PathBuf::from(need("an image path")?))),
        "/clear-image" => Ok(Command::ClearImage),
        "/files" => Ok(Command::Files),
        "/open" => Ok(Command::Open(need("a file path")?)),
        "/show" => Ok(Command::Show),
        "/refine" => Ok(Command::Refine(need("an instruction")?)),
        "/ask" => Ok(Command::Ask(need("a question")?)),
        "/chat" => Ok(Command::Chat),
        "/export" => Ok(Command::Export((!rest.is_empty()).then(|| PathBuf::from(rest)))),
        "/dismiss" => Ok(Command::Dismiss),
        "/help" => Ok(Command::Help),
        "/quit" | "/exit" => Ok(Command::Quit),
        other => Err(format!("unknown command {other}; try /help")),
    }
}
