use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::{ForgeError, Result};
use crate::project::{normalize_path, ExtensionFile};

/// ========================================
/// Request/Response wire protocol
/// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Generate,
    Refine,
    Converse,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Generate => "generate",
            Mode::Refine => "refine",
            Mode::Converse => "converse",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineImage {
    pub mime_type: String,
    /// Base64 payload.
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Part {
    Text { text: String },
    Image { image: InlineImage },
}

/// Provider-neutral description of one round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    pub mode: Mode,
    pub model: String,
    pub system: String,
    pub parts: Vec<Part>,
    /// JSON schema the reply must follow; `None` means free text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<Value>,
    #[serde(default)]
    pub grounding: bool,
}

impl LlmRequest {
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                Part::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn images(&self) -> impl Iterator<Item = &InlineImage> {
        self.parts.iter().filter_map(|p| match p {
            Part::Image { image } => Some(image),
            Part::Text { .. } => None,
        })
    }

    /// Copy suitable for saving to disk: image payloads are replaced by their size.
    pub fn redacted(&self) -> LlmRequest {
        let mut out = self.clone();
        for p in out.parts.iter_mut() {
            if let Part::Image { image } = p {
                image.data = format!("<{} base64 chars>", image.data.len());
            }
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub uri: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmReply {
    pub text: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireFile {
    path: String,
    content: String,
    language: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireProject {
    extension_name: String,
    extension_description: String,
    files: Vec<WireFile>,
    #[serde(default)]
    explanation: Option<String>,
}

/// A structured project reply that passed validation.
#[derive(Debug, Clone)]
pub struct ProjectReply {
    pub name: String,
    pub description: String,
    pub files: Vec<ExtensionFile>,
    pub explanation: Option<String>,
}

fn file_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "path": { "type": "string" },
            "content": { "type": "string" },
            "language": { "type": "string" }
        },
        "required": ["path", "content", "language"]
    })
}

/// Schema for generate (and refine, with `explanation`).
pub fn project_schema(with_explanation: bool) -> Value {
    let mut properties = json!({
        "extensionName": { "type": "string" },
        "extensionDescription": { "type": "string" },
        "files": { "type": "array", "items": file_schema() }
    });
    let mut required = vec!["extensionName", "extensionDescription", "files"];
    if with_explanation {
        properties["explanation"] = json!({
            "type": "string",
            "description": "Plain-language summary of every change made in this revision."
        });
        required.push("explanation");
    }
    json!({ "type": "object", "properties": properties, "required": required })
}

/// Parses and validates a project reply. Anything that does not match the
/// contract is a `MalformedResponse`.
pub fn parse_project_reply(text: &str, require_explanation: bool) -> Result<ProjectReply> {
    let parsed: WireProject = match serde_json::from_str(text) {
        Ok(p) => p,
        Err(strict_err) => {
            let obj = extract_first_json_object(text).ok_or_else(|| {
                ForgeError::MalformedResponse(format!("reply is not JSON: {strict_err}"))
            })?;
            serde_json::from_str(&obj)
                .map_err(|e| ForgeError::MalformedResponse(format!("reply does not match schema: {e}")))?
        }
    };

    if parsed.files.is_empty() {
        return Err(ForgeError::MalformedResponse("reply contains no files".into()));
    }
    let mut files = Vec::with_capacity(parsed.files.len());
    for f in parsed.files {
        let path = normalize_path(f.path.trim());
        if path.is_empty() {
            return Err(ForgeError::MalformedResponse("reply contains a file with an empty path".into()));
        }
        files.push(ExtensionFile { path, content: f.content, language: f.language });
    }

    let explanation = parsed.explanation;
    if require_explanation && explanation.is_none() {
        return Err(ForgeError::MalformedResponse("reply is missing 'explanation'".into()));
    }

    Ok(ProjectReply {
        name: parsed.extension_name,
        description: parsed.extension_description,
        files,
        explanation,
    })
}

/// Extracts the first top-level JSON object substring from a string.
/// Handles nested braces and braces inside string literals; returns None if not found.
pub fn extract_first_json_object(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut start = None;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' if start.is_some() => in_string = true,
            b'{' => {
                if start.is_none() {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(st) = start {
                        return Some(s[st..=i].to_string());
                    }
                }
            }
            _ => {}
        }
    }
    None
}
