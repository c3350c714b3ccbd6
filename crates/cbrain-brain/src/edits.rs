//! Labelling how a human edited an AI draft.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use cbrain_ai::{parse_model_json, LanguageModel, ModelOutput};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{BrainStore, EditRecord};
use crate::BrainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditPattern {
    MadeConversational,
    AddedSpecifics,
    Shortened,
    Expanded,
    RemovedJargon,
    ChangedHook,
    AddedStory,
    Restructured,
    ChangedCta,
    TonedDown,
    AddedEmoji,
    RemovedEmoji,
}

impl EditPattern {
    pub const ALL: [EditPattern; 12] = [
        EditPattern::MadeConversational,
        EditPattern::AddedSpecifics,
        EditPattern::Shortened,
        EditPattern::Expanded,
        EditPattern::RemovedJargon,
        EditPattern::ChangedHook,
        EditPattern::AddedStory,
        EditPattern::Restructured,
        EditPattern::ChangedCta,
        EditPattern::TonedDown,
        EditPattern::AddedEmoji,
        EditPattern::RemovedEmoji,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EditPattern::MadeConversational => "made_conversational",
            EditPattern::AddedSpecifics => "added_specifics",
            EditPattern::Shortened => "shortened",
            EditPattern::Expanded => "expanded",
            EditPattern::RemovedJargon => "removed_jargon",
            EditPattern::ChangedHook => "changed_hook",
            EditPattern::AddedStory => "added_story",
            EditPattern::Restructured => "restructured",
            EditPattern::ChangedCta => "changed_cta",
            EditPattern::TonedDown => "toned_down",
            EditPattern::AddedEmoji => "added_emoji",
            EditPattern::RemovedEmoji => "removed_emoji",
        }
    }
}

impl fmt::Display for EditPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EditPattern {
    type Err = BrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let canonical = s.trim().to_lowercase().replace(['-', ' '], "_");
        EditPattern::ALL
            .into_iter()
            .find(|p| p.as_str() == canonical)
            .ok_or_else(|| BrainError::Validation(format!("unknown edit pattern '{s}'")))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PatternsResponse {
    List(Vec<String>),
    Wrapped { patterns: Vec<String> },
}

/// Line-level summary of what changed, fed to the model alongside both texts.
fn diff_summary(ai_text: &str, edited_text: &str) -> String {
    let before: BTreeSet<&str> = ai_text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let after: BTreeSet<&str> = edited_text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();

    let mut summary = format!(
        "words: {} -> {}\n",
        ai_text.split_whitespace().count(),
        edited_text.split_whitespace().count()
    );
    for line in before.difference(&after) {
        summary.push_str(&format!("- {line}\n"));
    }
    for line in after.difference(&before) {
        summary.push_str(&format!("+ {line}\n"));
    }
    summary
}

fn classification_prompt(ai_text: &str, edited_text: &str) -> String {
    let labels = EditPattern::ALL
        .iter()
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "A writer edited an AI-generated post. Label the kinds of edits they made.\n\
         Allowed labels: {labels}.\n\
         Respond with a JSON array of labels only, most significant first.\n\n\
         AI draft:\n{ai_text}\n\nEdited version:\n{edited_text}\n\nChanged lines:\n{}",
        diff_summary(ai_text, edited_text)
    )
}

pub struct EditClassifier {
    store: Arc<dyn BrainStore>,
    llm: Arc<dyn LanguageModel>,
    model: String,
}

impl EditClassifier {
    #[must_use]
    pub fn new(store: Arc<dyn BrainStore>, llm: Arc<dyn LanguageModel>, model: String) -> Self {
        Self { store, llm, model }
    }

    /// Labels for the edits between the two texts. Any failure, including
    /// an unusable model reply, yields an empty list.
    pub async fn classify(&self, ai_text: &str, edited_text: &str) -> Vec<EditPattern> {
        if ai_text.trim() == edited_text.trim() {
            return Vec::new();
        }

        let reply = match self
            .llm
            .complete(&classification_prompt(ai_text, edited_text), &self.model, 300)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "edit classification failed");
                return Vec::new();
            }
        };

        let labels = match parse_model_json::<PatternsResponse>(&reply) {
            ModelOutput::Parsed(PatternsResponse::List(labels) | PatternsResponse::Wrapped { patterns: labels }) => labels,
            ModelOutput::Unparseable { reason } => {
                tracing::warn!(reason = %reason, "unparseable edit classification");
                return Vec::new();
            }
        };

        let mut seen = BTreeSet::new();
        labels
            .iter()
            .filter_map(|label| match label.parse::<EditPattern>() {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    tracing::debug!(error = %e, "ignoring edit label");
                    None
                }
            })
            .filter(|p| seen.insert(*p))
            .collect()
    }

    /// Classify and persist an edit. Returns the detected patterns and the
    /// stored record id.
    ///
    /// # Errors
    ///
    /// Returns [`BrainError::Store`] if the record cannot be written.
    pub async fn record(
        &self,
        owner_id: Uuid,
        idea_id: Option<Uuid>,
        ai_text: &str,
        edited_text: &str,
    ) -> Result<(Vec<EditPattern>, Uuid), BrainError> {
        let patterns = self.classify(ai_text, edited_text).await;
        let id = self
            .store
            .insert_edit_record(&EditRecord {
                owner_id,
                idea_id,
                ai_text: ai_text.to_string(),
                edited_text: edited_text.to_string(),
                patterns: patterns.iter().map(|p| p.as_str().to_string()).collect(),
            })
            .await?;
        tracing::info!(owner_id = %owner_id, patterns = patterns.len(), "edit recorded");
        Ok((patterns, id))
    }
}
