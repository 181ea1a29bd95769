//! Recover a structured `{"files": [...]}` edit payload from raw model text.
//!
//! Model replies arrive as prose, fenced JSON, bare JSON, or any mix of the
//! three. Extraction is an ordered sequence of fallible parse attempts; the
//! first recognized payload wins and whatever text sat around it becomes the
//! human-readable message.

const FENCE_OPEN: &str = "```json";
const FENCE_CLOSE: &str = "```";

/// Extract an edit payload and leftover message from a raw reply.
///
/// Returns `(edit_payload, message)`. The payload is a serialized JSON
/// object with a `files` key, or empty when no payload was recognized (in
/// which case the message is the entire original reply).
pub fn extract(raw: &str) -> (String, String) {
    let trimmed = raw.trim();

    let (candidate, leftover) = split_fences(trimmed);

    match serde_json::from_str::<serde_json::Value>(&candidate) {
        Ok(value) => match recognize(value) {
            Some(payload) => (payload, leftover.trim().to_string()),
            None => (String::new(), raw.to_string()),
        },
        Err(_) => extract_substring(trimmed, raw),
    }
}

/// Fence handling: a reply wholly wrapped in a ```json fence yields its
/// interior with no leftover; a fence embedded in prose yields the interior
/// plus the surrounding text; otherwise the whole reply is the candidate.
fn split_fences(trimmed: &str) -> (String, String) {
    if trimmed.len() > FENCE_OPEN.len() + FENCE_CLOSE.len()
        && trimmed.starts_with(FENCE_OPEN)
        && trimmed.ends_with(FENCE_CLOSE)
    {
        let interior = &trimmed[FENCE_OPEN.len()..trimmed.len() - FENCE_CLOSE.len()];
        return (interior.trim().to_string(), String::new());
    }
    if let Some(open) = trimmed.find(FENCE_OPEN) {
        let content_start = open + FENCE_OPEN.len();
        if let Some(close) = trimmed[content_start..].find(FENCE_CLOSE) {
            let interior = &trimmed[content_start..content_start + close];
            let leftover = format!(
                "{}{}",
                &trimmed[..open],
                &trimmed[content_start + close + FENCE_CLOSE.len()..]
            );
            return (interior.trim().to_string(), leftover);
        }
    }
    (trimmed.to_string(), String::new())
}

/// An array is a files list; an object is a payload when it has a `files`
/// key. Any other valid JSON is not an edit payload.
fn recognize(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Array(files) => {
            Some(serde_json::json!({ "files": files }).to_string())
        }
        serde_json::Value::Object(obj) if obj.contains_key("files") => {
            Some(serde_json::Value::Object(obj).to_string())
        }
        _ => None,
    }
}

/// Last resort: retry on the first-to-last `{...}` or `[...]` span.
///
/// The span match is greedy and not nesting-aware, so braces inside string
/// content can mis-extract. That behavior is deliberate and pinned by tests.
fn extract_substring(trimmed: &str, raw: &str) -> (String, String) {
    let Some((start, end)) = greedy_span(trimmed) else {
        return (String::new(), raw.to_string());
    };
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&trimmed[start..=end]) {
        if let Some(payload) = recognize(value) {
            let outside = format!("{}{}", &trimmed[..start], &trimmed[end + 1..]);
            return (payload, outside.trim().to_string());
        }
    }
    (String::new(), raw.to_string())
}

/// Span from the earliest opening delimiter to the last matching closer.
fn greedy_span(text: &str) -> Option<(usize, usize)> {
    let candidates = [('{', '}'), ('[', ']')];
    let (open, close) = candidates
        .into_iter()
        .filter_map(|(o, c)| text.find(o).map(|i| (i, c)))
        .min_by_key(|(i, _)| *i)?;
    let end = text.rfind(close)?;
    (open < end).then_some((open, end))
}
