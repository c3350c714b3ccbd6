//! Tolerant parsing of JSON embedded in model completions.
//!
//! Completions arrive wrapped in prose, fenced in markdown, or cut off at the
//! token limit. [`parse_model_json`] recovers what it can and otherwise
//! reports [`ModelOutput::Unparseable`]; it never panics or errors.

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)(?:```|\z)").expect("valid regex")
});

/// Outcome of parsing a completion against an expected shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput<T> {
    Parsed(T),
    Unparseable { reason: String },
}

impl<T> ModelOutput<T> {
    #[must_use]
    pub fn ok(self) -> Option<T> {
        match self {
            ModelOutput::Parsed(value) => Some(value),
            ModelOutput::Unparseable { .. } => None,
        }
    }

    #[must_use]
    pub fn is_parsed(&self) -> bool {
        matches!(self, ModelOutput::Parsed(_))
    }
}

/// Contents of the first markdown code fence, or the trimmed input when there is none.
#[must_use]
pub fn strip_code_fences(raw: &str) -> &str {
    FENCE_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map_or(raw, |m| m.as_str())
        .trim()
}

/// Parse a completion as `T`, tolerating fences, surrounding prose and a
/// truncated top-level array (complete elements are kept).
pub fn parse_model_json<T: DeserializeOwned>(raw: &str) -> ModelOutput<T> {
    let text = strip_code_fences(raw);
    if text.is_empty() {
        return ModelOutput::Unparseable {
            reason: "empty completion".to_string(),
        };
    }

    let first_error = match serde_json::from_str::<T>(text) {
        Ok(value) => return ModelOutput::Parsed(value),
        Err(e) => e.to_string(),
    };

    let Some(start) = text.find(['{', '[']) else {
        return ModelOutput::Unparseable {
            reason: format!("no JSON value found: {first_error}"),
        };
    };
    let body = &text[start..];

    let close = if body.starts_with('[') { ']' } else { '}' };
    if let Some(end) = body.rfind(close) {
        if let Ok(value) = serde_json::from_str::<T>(&body[..=end]) {
            return ModelOutput::Parsed(value);
        }
    }

    if body.starts_with('[') {
        if let Some(repaired) = salvage_truncated_array(body) {
            if let Ok(value) = serde_json::from_str::<T>(&repaired) {
                tracing::debug!("recovered truncated JSON array from completion");
                return ModelOutput::Parsed(value);
            }
        }
    }

    ModelOutput::Unparseable {
        reason: first_error,
    }
}

/// Cut a truncated `[...` down to its last complete element and close it.
fn salvage_truncated_array(body: &str) -> Option<String> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut last_complete = None;

    for (idx, ch) in body.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.saturating_sub(1);
                if depth == 1 {
                    last_complete = Some(idx + ch.len_utf8());
                } else if depth == 0 {
                    return Some(body[..=idx].to_string());
                }
            }
            _ => {}
        }
    }

    last_complete.map(|end| format!("{}]", &body[..end]))
}
