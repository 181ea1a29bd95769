use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::conversation::{Message, Role};

pub const CACHE_FILE: &str = ".sew_cache.json";

/// One file's desired state: a cached file, or one entry of an edit batch.
/// A record with `delete: true` carries no content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub delete: bool,
}

impl FileRecord {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: Some(content.into()),
            delete: false,
        }
    }

    pub fn deletion(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: None,
            delete: true,
        }
    }
}

/// Relative, non-empty, and not escaping the tree. Absolute and `../`
/// paths are rejected outright, never sanitized.
pub fn path_is_safe(path: &str) -> bool {
    !path.is_empty() && !path.starts_with('/') && !path.starts_with("../")
}

/// Merge an edit batch into an existing codebase. Never mutates its input.
///
/// Edits are applied in the given order: an unsafe path is skipped silently;
/// a matching path is replaced in place (or removed on delete); an unmatched
/// non-delete is appended; an unmatched delete is a no-op.
pub fn apply_edits(existing: &[FileRecord], edits: &[FileRecord]) -> Vec<FileRecord> {
    let mut updated = existing.to_vec();
    for edit in edits {
        if !path_is_safe(&edit.path) {
            continue;
        }
        match updated.iter().position(|f| f.path == edit.path) {
            Some(idx) if edit.delete => {
                updated.remove(idx);
            }
            Some(idx) => {
                updated[idx] = edit.clone();
            }
            None if edit.delete => {}
            None => {
                updated.push(edit.clone());
            }
        }
    }
    updated
}

/// Drop edits that touch protected paths (the brief file must never be
/// silently overwritten by model output).
pub fn filter_protected(edits: Vec<FileRecord>, protected: &HashSet<String>) -> Vec<FileRecord> {
    edits
        .into_iter()
        .filter(|f| {
            if protected.contains(&f.path) {
                tracing::warn!("dropping model edit to protected path {}", f.path);
                false
            } else {
                true
            }
        })
        .collect()
}

/// One seed instruction from a fold file. Tagged with `type` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instruction {
    #[serde(rename = "type")]
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Instruction {
    pub fn to_message(&self) -> Message {
        Message {
            role: self.role,
            content: self.content.clone(),
            name: self.name.clone(),
        }
    }
}

/// Initial/renew snapshot: `{"files": [...], "instructions": [...]}`.
/// A bare JSON array is accepted as `{"files": array, "instructions": []}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FoldFile {
    #[serde(default)]
    pub files: Vec<FileRecord>,
    #[serde(default)]
    pub instructions: Vec<Instruction>,
}

impl FoldFile {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(text).context("fold file is not valid JSON")?;
        match value {
            serde_json::Value::Array(files) => Ok(Self {
                files: serde_json::from_value(serde_json::Value::Array(files))
                    .context("fold file array is not a list of file records")?,
                instructions: Vec::new(),
            }),
            obj @ serde_json::Value::Object(_) => {
                serde_json::from_value(obj).context("fold file has an unexpected shape")
            }
            _ => anyhow::bail!("fold file must be a JSON object or array"),
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read fold file {}", path.display()))?;
        Self::parse(&text)
    }

    pub fn instruction_messages(&self) -> Vec<Message> {
        self.instructions.iter().map(Instruction::to_message).collect()
    }
}

/// Best-effort crash-recovery snapshot. The in-memory codebase stays
/// authoritative; a write failure is logged, never fatal.
pub fn save_cache(dir: &Path, codebase: &[FileRecord]) {
    let path = dir.join(CACHE_FILE);
    let body = match serde_json::to_string_pretty(codebase) {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!("failed to serialize codebase cache: {e}");
            return;
        }
    };
    if let Err(e) = std::fs::write(&path, body) {
        tracing::warn!("failed to save codebase cache to {}: {e}", path.display());
    }
}

pub fn load_cache(dir: &Path) -> Vec<FileRecord> {
    let path = dir.join(CACHE_FILE);
    let Ok(text) = std::fs::read_to_string(&path) else {
        return Vec::new();
    };
    match serde_json::from_str(&text) {
        Ok(codebase) => codebase,
        Err(e) => {
            tracing::warn!("cache file {} is corrupted, starting empty: {e}", path.display());
            Vec::new()
        }
    }
}
