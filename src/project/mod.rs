use base64::Engine;
use chrono::{DateTime, Utc};
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::errors::{ForgeError, Result};
use crate::wire::InlineImage;

/// One source file of an extension project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionFile {
    pub path: String,
    pub content: String,
    pub language: String,
}

impl ExtensionFile {
    /// Builds a file and derives its language tag from the extension.
    pub fn from_path(path: &str, content: String) -> Self {
        let path = normalize_path(path);
        let language = language_for_path(&path).to_string();
        Self { path, content, language }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub files: Vec<ExtensionFile>,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: String, description: String, files: Vec<ExtensionFile>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            description,
            files,
            created_at: Utc::now(),
        }
    }

    pub fn file(&self, path: &str) -> Option<&ExtensionFile> {
        self.files.iter().find(|f| f.path == path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.file(path).is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A web citation attached to an assistant answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into(), sources: None }
    }

    pub fn assistant(text: impl Into<String>, sources: Option<Vec<Source>>) -> Self {
        Self { role: Role::Assistant, text: text.into(), sources }
    }
}

/// A pending image held until the request that consumes it succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Base64 of the raw bytes.
    pub data: String,
    pub mime_type: String,
    /// Short label shown next to the prompt (usually the file name).
    pub preview: String,
}

impl Attachment {
    pub fn from_bytes(bytes: &[u8], mime_type: &str, preview: &str) -> Self {
        Self {
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            mime_type: mime_type.to_string(),
            preview: preview.to_string(),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let mime = image_mime_for_path(path).ok_or_else(|| {
            ForgeError::InvalidInput(format!("unsupported image type: {}", path.display()))
        })?;
        let bytes = fs::read(path)?;
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::from_bytes(&bytes, mime, &label))
    }

    pub fn inline(&self) -> InlineImage {
        InlineImage {
            data: self.data.clone(),
            mime_type: self.mime_type.clone(),
        }
    }
}

fn image_mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

/// Language tag by extension; anything unrecognised is treated as script.
pub fn language_for_path(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("");
    match ext {
        "json" => "json",
        "html" => "html",
        "css" => "css",
        _ => "javascript",
    }
}

pub fn normalize_path(p: &str) -> String {
    p.replace('\\', "/")
}
