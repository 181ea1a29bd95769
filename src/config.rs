use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::conversation::{Message, Role};

pub const CONFIG_FILE: &str = ".sewrc";

pub const DEFAULT_MODEL: &str = "grok-4";
pub const DEFAULT_ROLE: &str = "you are an expert engineer and developer";
pub const DEFAULT_OUTPUT: &str = "output.json";
pub const DEFAULT_TEMPERATURE: f64 = 0.25;

/// Whole `.sewrc`: named profiles plus an optional brief document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FullConfig {
    pub profiles: HashMap<String, ProfileConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brief: Option<Brief>,
}

/// One profile. Unset fields fall back to the built-in defaults at the
/// point of use, not at load time, so `.sewrc` stays sparse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_prepend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl ProfileConfig {
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn role(&self) -> &str {
        self.role.as_deref().unwrap_or(DEFAULT_ROLE)
    }

    pub fn output(&self) -> &str {
        self.output.as_deref().unwrap_or(DEFAULT_OUTPUT)
    }

    pub fn prompt_prepend(&self) -> &str {
        self.prompt_prepend.as_deref().unwrap_or("")
    }

    pub fn temperature(&self) -> f64 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }
}

/// A fixed document injected once into the conversation as context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Brief {
    pub file: String,
    #[serde(default = "default_brief_role")]
    pub role: Role,
}

fn default_brief_role() -> Role {
    Role::Assistant
}

impl Brief {
    /// Read the brief document relative to `dir`. Absence is tolerated with
    /// a warning so a renew never fails on a moved brief file.
    pub fn read_message(&self, dir: &Path) -> Option<Message> {
        match std::fs::read_to_string(dir.join(&self.file)) {
            Ok(content) => Some(Message {
                role: self.role,
                content,
                name: None,
            }),
            Err(e) => {
                tracing::warn!("brief file {} unavailable, continuing without it: {e}", self.file);
                None
            }
        }
    }
}

fn builtin_default_profile() -> ProfileConfig {
    ProfileConfig {
        model: Some(DEFAULT_MODEL.to_string()),
        role: Some(DEFAULT_ROLE.to_string()),
        output: Some(DEFAULT_OUTPUT.to_string()),
        prompt_prepend: Some(String::new()),
        temperature: Some(DEFAULT_TEMPERATURE),
    }
}

fn load_full(dir: &Path) -> Option<FullConfig> {
    let path = dir.join(CONFIG_FILE);
    let text = std::fs::read_to_string(&path).ok()?;
    match serde_yaml::from_str(&text) {
        Ok(full) => Some(full),
        Err(e) => {
            tracing::warn!("failed to parse {}: {e}", path.display());
            None
        }
    }
}

/// Resolve a named profile from `.sewrc` in `dir`.
///
/// Missing or malformed `.sewrc` falls back to the built-in defaults; a
/// present config without the requested profile yields an empty profile
/// (everything defaulted at the point of use).
pub fn load_config(dir: &Path, profile: &str) -> ProfileConfig {
    let Some(full) = load_full(dir) else {
        tracing::warn!("no usable {CONFIG_FILE}, using profile defaults for '{profile}'");
        return builtin_default_profile();
    };
    full.profiles.get(profile).cloned().unwrap_or_default()
}

pub fn load_brief(dir: &Path) -> Option<Brief> {
    load_full(dir)?.brief
}

const DEFAULT_CONFIG_TEXT: &str = "\
# sew profiles. Select one with `sew run -p <name>` or `sew session up -p <name>`.
profiles:
  default:
    model: grok-4
    role: you are an expert engineer and developer
    output: output.json
    temperature: 0.25
  rust:
    model: grok-3-mini-fast
    role: you are an expert rust programmer, writing clean idiomatic code
    output: output.json
    temperature: 0.0
  doc:
    model: grok-3
    role: you are a precise technical writer
    output: output.json
    temperature: 0.5
# Optional brief document, injected once per conversation and protected
# from model edits:
# brief:
#   file: design_brief.md
#   role: assistant
";

pub fn create_default_config(dir: &Path) -> anyhow::Result<()> {
    let path = dir.join(CONFIG_FILE);
    if path.exists() {
        anyhow::bail!("{} already exists, not overwriting", path.display());
    }
    std::fs::write(&path, DEFAULT_CONFIG_TEXT)?;
    println!("Default {CONFIG_FILE} with profiles created successfully");
    Ok(())
}

pub fn print_profiles(dir: &Path) {
    let Some(full) = load_full(dir) else {
        println!("No {CONFIG_FILE} found; `sew init` creates one.");
        return;
    };
    let mut names: Vec<&String> = full.profiles.keys().collect();
    names.sort();
    for name in names {
        let profile = &full.profiles[name];
        println!("\x1b[1m{name}\x1b[0m");
        println!("  model: {}", profile.model());
        println!("  role: {}", profile.role());
        println!("  output: {}", profile.output());
        println!("  temperature: {}", profile.temperature());
        if !profile.prompt_prepend().is_empty() {
            println!("  prompt_prepend: {}", profile.prompt_prepend());
        }
    }
    if let Some(brief) = &full.brief {
        println!("\x1b[1mbrief\x1b[0m");
        println!("  file: {}", brief.file);
    }
}
