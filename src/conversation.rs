use serde::{Deserialize, Serialize};

use crate::codebase::FileRecord;

/// Closed set of conversation roles. Fold files and the wire format use the
/// lowercase names; anything else is a deserialization error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Only meaningful on user messages: labels distinct user-submitted
    /// inputs in history displays.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            name: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            name: None,
        }
    }
}

/// One row of the `list` display: role, optional name, and a one-line
/// synopsis of the message content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSynopsis {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub synopsis: String,
}

const SYNOPSIS_MAX_CHARS: usize = 100;

/// First 100 characters of content, newlines flattened to spaces, with an
/// ellipsis when truncated.
pub fn synopsis(content: &str) -> String {
    let flat = content.replace(['\n', '\r'], " ");
    let flat = flat.trim();
    if flat.chars().count() <= SYNOPSIS_MAX_CHARS {
        flat.to_string()
    } else {
        let truncated: String = flat.chars().take(SYNOPSIS_MAX_CHARS).collect();
        format!("{truncated}...")
    }
}

/// The ordered message log the model sees. Append-only between renews; the
/// first element is always the system persona message.
#[derive(Debug, Clone)]
pub struct ConversationLog {
    persona: String,
    messages: Vec<Message>,
}

impl ConversationLog {
    pub fn initialize(
        persona: &str,
        brief: Option<Message>,
        instructions: &[Message],
        files: &[FileRecord],
    ) -> Self {
        let mut log = Self {
            persona: persona.to_string(),
            messages: Vec::new(),
        };
        log.seed(brief, instructions, files);
        log
    }

    /// Discard all prior turns and rebuild from scratch with the persona
    /// captured at startup. The caller re-reads the brief from its source.
    pub fn renew(&mut self, brief: Option<Message>, instructions: &[Message], files: &[FileRecord]) {
        self.messages.clear();
        self.seed(brief, instructions, files);
    }

    fn seed(&mut self, brief: Option<Message>, instructions: &[Message], files: &[FileRecord]) {
        self.messages.push(Message::system(self.persona.clone()));
        if let Some(brief) = brief {
            self.messages.push(brief);
        }
        self.messages.extend_from_slice(instructions);
        self.messages.push(Message::user(codebase_message(files)));
    }

    /// Append the turns for one query: the optional extra input first, then
    /// the prompt. The assistant reply is appended separately once received.
    pub fn append_query_turn(&mut self, prompt: &str, extra_input: Option<&str>) {
        if let Some(extra) = extra_input {
            self.messages
                .push(Message::user(format!("Additional input:\n```txt\n{extra}\n```")));
        }
        self.messages.push(Message::user(prompt));
    }

    pub fn append_assistant_reply(&mut self, reply: &str) {
        self.messages.push(Message::assistant(reply));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Display snapshot in model order, skipping whitespace-only messages.
    pub fn snapshot_for_display(&self) -> Vec<MessageSynopsis> {
        self.messages
            .iter()
            .filter(|m| !m.content.trim().is_empty())
            .map(|m| MessageSynopsis {
                role: m.role,
                name: m.name.clone(),
                synopsis: synopsis(&m.content),
            })
            .collect()
    }
}

fn codebase_message(files: &[FileRecord]) -> String {
    let files_json =
        serde_json::to_string_pretty(files).unwrap_or_else(|_| "[]".to_string());
    format!("Current codebase files:\n```json\n{files_json}\n```")
}
