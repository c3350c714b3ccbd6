//! Knowledge-base domain types: entries, topics, templates, ideas, voices.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreError;

/// Canonicalise an enum label coming from an external source: trims,
/// lowercases and maps `-`/space separators to `_`.
fn canonical_label(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c })
        .collect()
}

/// Closed classification of what kind of knowledge an entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeType {
    HowTo,
    Insight,
    Story,
    Question,
    Objection,
    Mistake,
    Decision,
    MarketIntel,
}

impl KnowledgeType {
    pub const ALL: [KnowledgeType; 8] = [
        KnowledgeType::HowTo,
        KnowledgeType::Insight,
        KnowledgeType::Story,
        KnowledgeType::Question,
        KnowledgeType::Objection,
        KnowledgeType::Mistake,
        KnowledgeType::Decision,
        KnowledgeType::MarketIntel,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            KnowledgeType::HowTo => "how_to",
            KnowledgeType::Insight => "insight",
            KnowledgeType::Story => "story",
            KnowledgeType::Question => "question",
            KnowledgeType::Objection => "objection",
            KnowledgeType::Mistake => "mistake",
            KnowledgeType::Decision => "decision",
            KnowledgeType::MarketIntel => "market_intel",
        }
    }
}

impl fmt::Display for KnowledgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KnowledgeType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = canonical_label(s);
        KnowledgeType::ALL
            .into_iter()
            .find(|t| t.as_str() == label)
            .ok_or_else(|| CoreError::InvalidKnowledgeType(s.to_string()))
    }
}

/// How immediately an entry's insight can be acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actionability {
    ImmediatelyActionable,
    #[default]
    Contextual,
    Theoretical,
}

impl Actionability {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Actionability::ImmediatelyActionable => "immediately_actionable",
            Actionability::Contextual => "contextual",
            Actionability::Theoretical => "theoretical",
        }
    }

    /// Parse a label, falling back to [`Actionability::Contextual`] for
    /// anything missing or unrecognised.
    #[must_use]
    pub fn parse_or_default(raw: Option<&str>) -> Self {
        raw.and_then(|r| r.parse().ok()).unwrap_or_default()
    }
}

impl fmt::Display for Actionability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Actionability {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match canonical_label(s).as_str() {
            "immediately_actionable" => Ok(Actionability::ImmediatelyActionable),
            "contextual" => Ok(Actionability::Contextual),
            "theoretical" => Ok(Actionability::Theoretical),
            _ => Err(CoreError::InvalidActionability(s.to_string())),
        }
    }
}

/// Lifecycle of a content idea from extraction to publication.
///
/// ```text
/// extracted -> selected -> writing -> written -> scheduled -> published
///                                                   (any non-terminal) -> archived
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdeaStatus {
    Extracted,
    Selected,
    Writing,
    Written,
    Scheduled,
    Published,
    Archived,
}

impl IdeaStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            IdeaStatus::Extracted => "extracted",
            IdeaStatus::Selected => "selected",
            IdeaStatus::Writing => "writing",
            IdeaStatus::Written => "written",
            IdeaStatus::Scheduled => "scheduled",
            IdeaStatus::Published => "published",
            IdeaStatus::Archived => "archived",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, IdeaStatus::Published | IdeaStatus::Archived)
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// `writing` is entered only from `selected` and falls back to it, which is
    /// how a failed generation dispatch is reverted.
    #[must_use]
    pub fn can_transition_to(self, next: IdeaStatus) -> bool {
        use IdeaStatus::{Archived, Extracted, Published, Scheduled, Selected, Writing, Written};

        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (_, Archived)
                | (Extracted, Selected)
                | (Selected, Writing | Extracted)
                | (Writing, Written | Selected)
                | (Written, Scheduled)
                | (Scheduled, Published | Written)
        )
    }

    /// Validate a transition, returning the target status on success.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalTransition`] when the move is not allowed.
    pub fn transition(self, next: IdeaStatus) -> Result<IdeaStatus, CoreError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::IllegalTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for IdeaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdeaStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match canonical_label(s).as_str() {
            "extracted" => Ok(IdeaStatus::Extracted),
            "selected" => Ok(IdeaStatus::Selected),
            "writing" => Ok(IdeaStatus::Writing),
            "written" => Ok(IdeaStatus::Written),
            "scheduled" => Ok(IdeaStatus::Scheduled),
            "published" => Ok(IdeaStatus::Published),
            "archived" => Ok(IdeaStatus::Archived),
            _ => Err(CoreError::InvalidIdeaStatus(s.to_string())),
        }
    }
}

/// Which rows an operation may see: an owner, optionally widened to a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub owner_id: Uuid,
    pub team_id: Option<Uuid>,
}

impl Scope {
    #[must_use]
    pub fn owner(owner_id: Uuid) -> Self {
        Self {
            owner_id,
            team_id: None,
        }
    }

    #[must_use]
    pub fn team(owner_id: Uuid, team_id: Uuid) -> Self {
        Self {
            owner_id,
            team_id: Some(team_id),
        }
    }

    /// Whether a row owned by `owner_id` (and optionally shared with `team_id`)
    /// is visible in this scope.
    #[must_use]
    pub fn contains(&self, owner_id: Uuid, team_id: Option<Uuid>) -> bool {
        owner_id == self.owner_id || (self.team_id.is_some() && team_id == self.team_id)
    }
}

/// A single classified unit of extracted insight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub team_id: Option<Uuid>,
    pub source_document_id: Option<Uuid>,
    pub category: String,
    pub knowledge_type: KnowledgeType,
    pub speaker: Option<String>,
    pub content: String,
    pub context: Option<String>,
    pub tags: Vec<String>,
    pub topics: Vec<String>,
    /// Always within `1..=5`.
    pub quality_score: i16,
    pub specificity: bool,
    pub actionability: Actionability,
    #[serde(skip_serializing)]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeEntry {
    /// Text fed to the embedding provider: content plus context when present.
    #[must_use]
    pub fn embedding_text(&self) -> String {
        embedding_text(&self.content, self.context.as_deref())
    }
}

/// Text fed to the embedding provider for an entry's `content` and `context`.
#[must_use]
pub fn embedding_text(content: &str, context: Option<&str>) -> String {
    match context.map(str::trim).filter(|c| !c.is_empty()) {
        Some(ctx) => format!("{content}\n\nContext: {ctx}"),
        None => content.to_string(),
    }
}

/// A validated entry ready to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewKnowledgeEntry {
    pub owner_id: Uuid,
    pub team_id: Option<Uuid>,
    pub source_document_id: Option<Uuid>,
    pub category: String,
    pub knowledge_type: KnowledgeType,
    pub speaker: Option<String>,
    pub content: String,
    pub context: Option<String>,
    pub tags: Vec<String>,
    pub topics: Vec<String>,
    pub quality_score: i16,
    pub specificity: bool,
    pub actionability: Actionability,
    pub embedding: Option<Vec<f32>>,
}

/// Canonical entry in an owner's topic taxonomy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub owner_id: Uuid,
    pub slug: String,
    pub label: String,
    pub usage_count: i64,
    #[serde(skip_serializing)]
    pub embedding: Option<Vec<f32>>,
}

/// Reusable structural skeleton for generated posts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: Uuid,
    /// `None` for platform-shared templates.
    pub owner_id: Option<Uuid>,
    pub name: String,
    pub category: String,
    pub structure: String,
    pub examples: Vec<String>,
    pub tags: Vec<String>,
    pub usage_count: i64,
    pub avg_engagement_score: f64,
    #[serde(skip_serializing)]
    pub embedding: Option<Vec<f32>>,
}

impl Template {
    /// Text used to embed the template for matching.
    #[must_use]
    pub fn embedding_text(&self) -> String {
        let mut text = format!("{}\n{}\n{}", self.name, self.category, self.structure);
        if let Some(first) = self.examples.first() {
            text.push('\n');
            text.push_str(first);
        }
        text
    }

    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.owner_id.is_none()
    }
}

/// A transcript, already normalized to plain text by the ingest layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub team_id: Option<Uuid>,
    pub title: String,
    pub raw_text: String,
    pub speaker_hint: Option<String>,
    pub knowledge_extracted_at: Option<DateTime<Utc>>,
    pub ideas_extracted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A post idea derived from a source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentIdea {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub source_document_id: Option<Uuid>,
    pub title: String,
    pub core_insight: String,
    pub hook: Option<String>,
    pub content_pillar: Option<String>,
    pub speaker: Option<String>,
    pub status: IdeaStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Tone and style parameters for an author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub owner_id: Uuid,
    pub speaker: String,
    pub tone: String,
    pub style_notes: Vec<String>,
    pub signature_phrases: Vec<String>,
    pub banned_phrases: Vec<String>,
}

impl VoiceProfile {
    /// The voice used when no profile exists for an author.
    #[must_use]
    pub fn default_for(owner_id: Uuid, speaker: &str) -> Self {
        Self {
            owner_id,
            speaker: speaker.to_string(),
            tone: "conversational, confident, practical".to_string(),
            style_notes: vec![
                "short paragraphs".to_string(),
                "plain language over jargon".to_string(),
                "one idea per post".to_string(),
            ],
            signature_phrases: Vec::new(),
            banned_phrases: vec!["in today's fast-paced world".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn knowledge_type_parses_canonical_labels() {
        for t in KnowledgeType::ALL {
            assert_eq!(t.as_str().parse::<KnowledgeType>().unwrap(), t);
        }
    }

    #[test]
    fn knowledge_type_tolerates_case_and_separators() {
        assert_eq!(
            "How-To".parse::<KnowledgeType>().unwrap(),
            KnowledgeType::HowTo
        );
        assert_eq!(
            " market intel ".parse::<KnowledgeType>().unwrap(),
            KnowledgeType::MarketIntel
        );
    }

    #[test]
    fn knowledge_type_rejects_values_outside_the_closed_set() {
        assert!("advice".parse::<KnowledgeType>().is_err());
        assert!("".parse::<KnowledgeType>().is_err());
    }

    #[test]
    fn actionability_defaults_to_contextual() {
        assert_eq!(Actionability::parse_or_default(None), Actionability::Contextual);
        assert_eq!(
            Actionability::parse_or_default(Some("urgent")),
            Actionability::Contextual
        );
        assert_eq!(
            Actionability::parse_or_default(Some("immediately actionable")),
            Actionability::ImmediatelyActionable
        );
    }

    #[test]
    fn idea_status_forward_path_is_legal() {
        let path = [
            IdeaStatus::Extracted,
            IdeaStatus::Selected,
            IdeaStatus::Writing,
            IdeaStatus::Written,
            IdeaStatus::Scheduled,
            IdeaStatus::Published,
        ];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be legal",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn terminal_states_do_not_move() {
        for next in [IdeaStatus::Extracted, IdeaStatus::Archived, IdeaStatus::Writing] {
            assert!(!IdeaStatus::Published.can_transition_to(next));
            assert!(!IdeaStatus::Archived.can_transition_to(next));
        }
    }

    #[test]
    fn writing_is_entered_and_left_through_selected() {
        assert!(IdeaStatus::Selected.can_transition_to(IdeaStatus::Writing));
        assert!(IdeaStatus::Writing.can_transition_to(IdeaStatus::Selected));
        assert!(!IdeaStatus::Extracted.can_transition_to(IdeaStatus::Writing));
        assert!(!IdeaStatus::Writing.can_transition_to(IdeaStatus::Extracted));
        assert!(!IdeaStatus::Written.can_transition_to(IdeaStatus::Writing));
    }

    #[test]
    fn skipping_ahead_is_illegal() {
        let err = IdeaStatus::Extracted
            .transition(IdeaStatus::Published)
            .unwrap_err();
        assert!(err.to_string().contains("extracted -> published"));
    }

    #[test]
    fn scope_contains_team_rows_only_when_team_is_set() {
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        let team = Uuid::new_v4();

        assert!(Scope::owner(owner).contains(owner, None));
        assert!(!Scope::owner(owner).contains(other, Some(team)));
        assert!(Scope::team(owner, team).contains(other, Some(team)));
        assert!(!Scope::team(owner, team).contains(other, None));
    }

    #[test]
    fn embedding_text_includes_context_when_present() {
        assert_eq!(embedding_text("body", None), "body");
        assert_eq!(embedding_text("body", Some("  ")), "body");
        assert_eq!(
            embedding_text("body", Some("sales call")),
            "body\n\nContext: sales call"
        );
    }
}
