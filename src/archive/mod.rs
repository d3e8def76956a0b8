use bytes::Bytes;
use fs_err as fs;
use regex::Regex;
use serde_json::Value;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::errors::{ForgeError, Result};
use crate::project::{normalize_path, ExtensionFile, Project};

const JUNK_MARKERS: [&str; 2] = ["__MACOSX", ".DS_Store"];
const DEFAULT_NAME: &str = "Imported extension";
const DEFAULT_DESCRIPTION: &str = "Imported extension project";
const DEFAULT_EXPORT_STEM: &str = "chrome_extension";

/// Result of reading an uploaded archive.
#[derive(Debug, Clone)]
pub struct Unpacked {
    pub files: Vec<ExtensionFile>,
    pub name: String,
    pub description: String,
}

/// A packed project ready to be offered as a download.
#[derive(Debug, Clone)]
pub struct Export {
    pub file_name: String,
    pub bytes: Bytes,
}

impl Export {
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(&self.file_name);
        fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

fn is_junk(path: &str) -> bool {
    JUNK_MARKERS.iter().any(|m| path.contains(m))
}

/// Reads every non-directory, non-junk entry as text. Metadata comes from the
/// last `manifest.json` that parses; otherwise from the upload name.
pub fn unpack(bytes: &[u8], upload_name: Option<&str>) -> Result<Unpacked> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| ForgeError::Archive(e.to_string()))?;

    let mut name = upload_name
        .map(|n| n.strip_suffix(".zip").unwrap_or(n).to_string())
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_NAME.to_string());
    let mut description = DEFAULT_DESCRIPTION.to_string();
    let mut files = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ForgeError::Archive(e.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        let path = normalize_path(entry.name());
        if path.is_empty() || is_junk(&path) {
            continue;
        }

        let mut raw = Vec::new();
        entry
            .read_to_end(&mut raw)
            .map_err(|e| ForgeError::Archive(format!("{path}: {e}")))?;
        let content = String::from_utf8_lossy(&raw).into_owned();

        if path.ends_with("manifest.json") {
            if let Some((n, d)) = manifest_metadata(&content) {
                if let Some(n) = n {
                    name = n;
                }
                if let Some(d) = d {
                    description = d;
                }
            } else {
                tracing::debug!(%path, "manifest did not parse; keeping fallback metadata");
            }
        }

        files.push(ExtensionFile::from_path(&path, content));
    }

    if files.is_empty() {
        return Err(ForgeError::EmptyArchive);
    }

    tracing::info!(files = files.len(), %name, "archive unpacked");
    Ok(Unpacked { files, name, description })
}

fn manifest_metadata(content: &str) -> Option<(Option<String>, Option<String>)> {
    let v: Value = serde_json::from_str(content).ok()?;
    let field = |key: &str| {
        v.get(key)
            .and_then(|x| x.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
    };
    Some((field("name"), field("description")))
}

/// Writes every file verbatim under its path. A path listed twice keeps its
/// last content.
pub fn pack(project: &Project) -> Result<Bytes> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    let files = &project.files;
    for (idx, file) in files.iter().enumerate() {
        if files[idx + 1..].iter().any(|later| later.path == file.path) {
            continue;
        }
        writer
            .start_file(file.path.as_str(), options)
            .map_err(|e| ForgeError::LocalIo(e.to_string()))?;
        writer.write_all(file.content.as_bytes())?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| ForgeError::LocalIo(e.to_string()))?;
    Ok(Bytes::from(cursor.into_inner()))
}

fn whitespace_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

pub fn export_file_name(project_name: &str) -> String {
    let stem = whitespace_runs()
        .replace_all(project_name, "_")
        .replace(['/', '\\'], "_");
    if stem.is_empty() {
        format!("{DEFAULT_EXPORT_STEM}.zip")
    } else {
        format!("{stem}.zip")
    }
}

pub fn export(project: &Project) -> Result<Export> {
    let bytes = pack(project)?;
    Ok(Export {
        file_name: export_file_name(&project.name),
        bytes,
    })
}
