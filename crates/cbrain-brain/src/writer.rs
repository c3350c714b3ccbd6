//! Drafting posts from a brief and polishing their hooks.

use std::sync::Arc;

use cbrain_ai::{parse_model_json, LanguageModel, ModelOutput};
use cbrain_core::is_stop_word;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::briefing::Brief;
use crate::BrainError;

pub const MIN_HOOK_SCORE: i16 = 1;
pub const MAX_HOOK_SCORE: i16 = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Draft {
    pub idea_id: Uuid,
    pub template_id: Option<Uuid>,
    pub content: String,
    pub dm_text: Option<String>,
    pub cta_keyword: Option<String>,
    pub variations: Vec<String>,
    /// `false` when the model ignored the requested format and its raw text
    /// became the content.
    pub structured: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Polished {
    pub text: String,
    pub hook_score: i16,
    pub changes: Vec<String>,
    /// `false` when the reply was unusable and the score is heuristic.
    pub structured: bool,
}

#[derive(Debug, Deserialize)]
struct RawDraft {
    #[serde(default, alias = "post", alias = "primary")]
    content: Option<String>,
    #[serde(default, alias = "dm")]
    dm_text: Option<String>,
    #[serde(default, alias = "cta")]
    cta_keyword: Option<String>,
    #[serde(default)]
    variations: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawPolish {
    #[serde(default)]
    hook_score: Option<Value>,
    #[serde(default, alias = "text", alias = "rewritten")]
    polished: Option<String>,
    #[serde(default)]
    changes: Option<Value>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Non-blank strings from an array, or a lone string, in the model's reply.
fn strings(value: Option<Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => non_blank(Some(s)),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => non_blank(Some(s)).into_iter().collect(),
        _ => Vec::new(),
    }
}

/// An uppercase keyword from the idea title, for replies like "comment PRICING".
#[must_use]
pub fn default_cta_keyword(title: &str) -> Option<String> {
    title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .find(|w| !is_stop_word(&w.to_lowercase()))
        .map(str::to_uppercase)
}

fn cta_keyword(raw: Option<String>, title: &str) -> Option<String> {
    non_blank(raw)
        .and_then(|k| {
            let word: String = k.chars().filter(|c| c.is_alphanumeric()).collect();
            (!word.is_empty()).then(|| word.to_uppercase())
        })
        .or_else(|| default_cta_keyword(title))
}

/// Score a hook `1..=10` from its first line when the model gives none.
#[must_use]
pub fn heuristic_hook_score(text: &str) -> i16 {
    let hook = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or_default();
    if hook.is_empty() {
        return MIN_HOOK_SCORE;
    }
    let words = hook.split_whitespace().count();
    let mut score: i16 = 5;
    if hook.chars().any(|c| c.is_ascii_digit()) {
        score += 2;
    }
    if hook.ends_with('?') {
        score += 1;
    }
    if words <= 12 {
        score += 1;
    } else if words > 25 {
        score -= 2;
    }
    if hook.to_lowercase().starts_with("i ") {
        score += 1;
    }
    score.clamp(MIN_HOOK_SCORE, MAX_HOOK_SCORE)
}

fn hook_score_from(value: Option<&Value>) -> Option<i16> {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    if !raw.is_finite() {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let score = raw.round().clamp(f64::from(MIN_HOOK_SCORE), f64::from(MAX_HOOK_SCORE)) as i16;
    Some(score)
}

fn polish_prompt(text: &str) -> String {
    format!(
        "Review this LinkedIn post. Score its opening hook from 1 to 10. If the post can be improved, \
         rewrite it keeping the author's voice and meaning; otherwise return it unchanged.\n\
         Respond with a JSON object: {{\"hook_score\": number, \"polished\": the full post, \
         \"changes\": short descriptions of each change}}.\n\nPost:\n{text}"
    )
}

pub struct PostWriter {
    llm: Arc<dyn LanguageModel>,
    model: String,
    max_tokens: u32,
}

impl PostWriter {
    #[must_use]
    pub fn new(llm: Arc<dyn LanguageModel>, model: String, max_tokens: u32) -> Self {
        Self {
            llm,
            model,
            max_tokens,
        }
    }

    /// Draft a post for the brief. A reply that is not the requested JSON
    /// becomes the content as-is, with derived defaults for the rest.
    ///
    /// # Errors
    ///
    /// Returns [`BrainError::ExternalService`] if the model call fails, or
    /// [`BrainError::Validation`] if the reply is blank.
    pub async fn write(&self, brief: &Brief) -> Result<Draft, BrainError> {
        let reply = self
            .llm
            .complete(&brief.to_prompt(), &self.model, self.max_tokens)
            .await?;

        let title = &brief.idea.title;
        let parsed = parse_model_json::<RawDraft>(&reply)
            .ok()
            .and_then(|raw| non_blank(raw.content.clone()).map(|content| (raw, content)));

        let draft = match parsed {
            Some((raw, content)) => Draft {
                idea_id: brief.idea.id,
                template_id: brief.template_id(),
                content,
                dm_text: non_blank(raw.dm_text),
                cta_keyword: cta_keyword(raw.cta_keyword, title),
                variations: strings(raw.variations),
                structured: true,
            },
            None => {
                let content = reply.trim().to_string();
                if content.is_empty() {
                    return Err(BrainError::Validation("writer returned no text".to_string()));
                }
                tracing::warn!(idea_id = %brief.idea.id, "draft reply was not structured, using raw text");
                Draft {
                    idea_id: brief.idea.id,
                    template_id: brief.template_id(),
                    content,
                    dm_text: None,
                    cta_keyword: default_cta_keyword(title),
                    variations: Vec::new(),
                    structured: false,
                }
            }
        };
        Ok(draft)
    }

    /// Score the hook and optionally rewrite. An unusable reply keeps the
    /// original text with a heuristic score and no changes.
    ///
    /// # Errors
    ///
    /// Returns [`BrainError::ExternalService`] if the model call fails.
    pub async fn polish(&self, text: &str) -> Result<Polished, BrainError> {
        let reply = self
            .llm
            .complete(&polish_prompt(text), &self.model, self.max_tokens)
            .await?;

        match parse_model_json::<RawPolish>(&reply) {
            ModelOutput::Parsed(raw) => {
                let polished = non_blank(raw.polished).unwrap_or_else(|| text.to_string());
                let hook_score = hook_score_from(raw.hook_score.as_ref())
                    .unwrap_or_else(|| heuristic_hook_score(&polished));
                Ok(Polished {
                    text: polished,
                    hook_score,
                    changes: strings(raw.changes),
                    structured: true,
                })
            }
            ModelOutput::Unparseable { reason } => {
                tracing::warn!(reason = %reason, "unparseable polish reply, keeping original");
                Ok(Polished {
                    text: text.to_string(),
                    hook_score: heuristic_hook_score(text),
                    changes: Vec::new(),
                    structured: false,
                })
            }
        }
    }
}
