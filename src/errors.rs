use std::fmt;

use thiserror::Error;

/// Operation classes that are gated by their own busy flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Generate,
    Import,
    Refine,
    Chat,
    Export,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Generate => "generate",
            Operation::Import => "import",
            Operation::Refine => "refine",
            Operation::Chat => "chat",
            Operation::Export => "export",
        };
        f.write_str(s)
    }
}

/// How a failure should be presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Backend,
    Archive,
    Local,
    Input,
}

#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("no usable files were found in the ZIP archive")]
    EmptyArchive,
    #[error("could not read the ZIP archive: {0}")]
    Archive(String),
    #[error("the AI backend returned an unexpected response: {0}")]
    MalformedResponse(String),
    #[error("could not reach the AI backend: {0}")]
    Transport(String),
    #[error("local I/O failure: {0}")]
    LocalIo(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("there is no project yet; create or import one first")]
    NoProject,
    #[error("file not found in project: {0}")]
    UnknownFile(String),
    #[error("a {0} operation is already running")]
    Busy(Operation),
    #[error("the project was replaced while the request was running; result discarded")]
    ProjectReplaced,
    #[error("configuration error: {0}")]
    Config(String),
}

impl ForgeError {
    pub fn notice_kind(&self) -> NoticeKind {
        match self {
            ForgeError::EmptyArchive | ForgeError::Archive(_) => NoticeKind::Archive,
            ForgeError::MalformedResponse(_)
            | ForgeError::Transport(_)
            | ForgeError::ProjectReplaced => NoticeKind::Backend,
            ForgeError::LocalIo(_) | ForgeError::Config(_) => NoticeKind::Local,
            ForgeError::InvalidInput(_)
            | ForgeError::NoProject
            | ForgeError::UnknownFile(_)
            | ForgeError::Busy(_) => NoticeKind::Input,
        }
    }
}

impl From<reqwest::Error> for ForgeError {
    fn from(e: reqwest::Error) -> Self {
        ForgeError::Transport(e.to_string())
    }
}

impl From<std::io::Error> for ForgeError {
    fn from(e: std::io::Error) -> Self {
        ForgeError::LocalIo(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ForgeError>;
