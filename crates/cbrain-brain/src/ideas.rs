//! Content ideas: extraction from transcripts and the status state machine.

use cbrain_ai::{parse_model_json, ModelOutput};
use cbrain_core::{ContentIdea, IdeaStatus, SourceDocument};
use serde::Deserialize;
use uuid::Uuid;

use crate::extractor::Extractor;
use crate::store::{BrainStore, NewIdea};
use crate::BrainError;

const MAX_IDEAS_PER_DOCUMENT: usize = 12;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdeasResponse {
    List(Vec<RawIdea>),
    Wrapped { ideas: Vec<RawIdea> },
}

#[derive(Debug, Default, Deserialize)]
struct RawIdea {
    #[serde(default)]
    title: Option<String>,
    #[serde(default, alias = "insight")]
    core_insight: Option<String>,
    #[serde(default)]
    hook: Option<String>,
    #[serde(default, alias = "pillar")]
    content_pillar: Option<String>,
    #[serde(default)]
    speaker: Option<String>,
}

fn clean(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn ideas_prompt(document: &SourceDocument) -> String {
    format!(
        "Read the transcript below and list up to {MAX_IDEAS_PER_DOCUMENT} distinct social post ideas \
         grounded in what was actually said.\n\
         Return a JSON array of objects with: title, core_insight (one sentence), hook (an opening line), \
         content_pillar (a short theme), speaker (who the idea came from, if known).\n\
         Respond with JSON only.\n\nTitle: {}\n\nTranscript:\n{}",
        document.title, document.raw_text
    )
}

impl Extractor {
    /// Ask the model for post ideas in a document, persist the valid ones in
    /// `extracted` status and stamp `ideas_extracted_at`.
    ///
    /// An already stamped document is skipped. An unparseable response stores
    /// nothing and still stamps the document.
    ///
    /// # Errors
    ///
    /// Returns [`BrainError::NotFound`] for an unknown document, or
    /// [`BrainError::ExternalService`] if the model call fails.
    pub async fn extract_ideas(&self, document_id: Uuid) -> Result<Vec<Uuid>, BrainError> {
        let document = self
            .store
            .get_document(document_id)
            .await?
            .ok_or_else(|| BrainError::not_found("document", document_id))?;

        if document.ideas_extracted_at.is_some() {
            tracing::info!(document_id = %document_id, "ideas already extracted, skipping");
            return Ok(Vec::new());
        }

        // A previous interrupted attempt may have stored some ideas.
        let stale = self.store.delete_ideas_for_document(document_id).await?;
        if stale > 0 {
            tracing::warn!(document_id = %document_id, stale, "removed ideas from an interrupted run");
        }

        let completion = self
            .llm
            .complete(&ideas_prompt(&document), &self.settings.model, self.settings.max_tokens)
            .await?;

        let raw_ideas = match parse_model_json::<IdeasResponse>(&completion) {
            ModelOutput::Parsed(IdeasResponse::List(ideas) | IdeasResponse::Wrapped { ideas }) => ideas,
            ModelOutput::Unparseable { reason } => {
                tracing::warn!(document_id = %document_id, reason = %reason, "unparseable idea response");
                Vec::new()
            }
        };

        let mut ids = Vec::new();
        for raw in raw_ideas.into_iter().take(MAX_IDEAS_PER_DOCUMENT) {
            let (Some(title), Some(core_insight)) = (clean(raw.title), clean(raw.core_insight)) else {
                tracing::warn!(document_id = %document_id, "dropping idea without title or insight");
                continue;
            };
            let idea = NewIdea {
                owner_id: document.owner_id,
                source_document_id: Some(document_id),
                title,
                core_insight,
                hook: clean(raw.hook),
                content_pillar: clean(raw.content_pillar).map(|p| p.to_lowercase()),
                speaker: clean(raw.speaker).or_else(|| document.speaker_hint.clone()),
            };
            ids.push(self.store.insert_idea(&idea).await?);
        }

        self.store.mark_ideas_extracted(document_id).await?;
        tracing::info!(document_id = %document_id, ideas = ids.len(), "idea extraction complete");
        Ok(ids)
    }
}

/// Move an idea to `to`, checking the state machine and applying the change
/// as a compare-and-set. Returns the idea as it was before the move.
///
/// # Errors
///
/// Returns [`BrainError::NotFound`] for an unknown idea,
/// [`BrainError::Core`] for an illegal transition, or
/// [`BrainError::Consistency`] if another writer changed the status first.
pub async fn transition_idea(
    store: &dyn BrainStore,
    id: Uuid,
    to: IdeaStatus,
) -> Result<ContentIdea, BrainError> {
    let idea = store
        .get_idea(id)
        .await?
        .ok_or_else(|| BrainError::not_found("content idea", id))?;
    idea.status.transition(to)?;
    if !store.transition_idea(id, idea.status, to).await? {
        return Err(BrainError::Consistency(format!(
            "idea {id} left status {} before it could move to {to}",
            idea.status
        )));
    }
    tracing::debug!(idea_id = %id, from = %idea.status, to = %to, "idea status changed");
    Ok(idea)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cbrain_core::Scope;

    use super::*;
    use crate::extractor::ExtractorSettings;
    use crate::store::{InMemoryStore, NewDocument};
    use crate::testing::ScriptedModel;

    async fn document(store: &InMemoryStore, owner: Uuid) -> Uuid {
        store
            .insert_document(&NewDocument {
                owner_id: owner,
                team_id: None,
                title: "Pricing call".to_string(),
                raw_text: "Dana: We raised prices twice last year and churn went down.".to_string(),
                speaker_hint: Some("Dana".to_string()),
            })
            .await
            .unwrap()
    }

    fn extractor(store: Arc<InMemoryStore>, reply: &'static str) -> Extractor {
        Extractor::new(
            store,
            Arc::new(ScriptedModel::replying(reply)),
            None,
            0.8,
            ExtractorSettings::default(),
        )
    }

    #[tokio::test]
    async fn valid_ideas_are_stored_as_extracted() {
        let store = Arc::new(InMemoryStore::new());
        let owner = Uuid::new_v4();
        let doc = document(&store, owner).await;
        let reply = r#"```json
[{"title": "Raise prices", "core_insight": "Higher prices cut churn.", "pillar": "Pricing"},
 {"title": "", "core_insight": "no title"}]
```"#;

        let ids = extractor(Arc::clone(&store), reply).extract_ideas(doc).await.unwrap();

        assert_eq!(ids.len(), 1);
        let idea = store.get_idea(ids[0]).await.unwrap().unwrap();
        assert_eq!(idea.status, IdeaStatus::Extracted);
        assert_eq!(idea.content_pillar.as_deref(), Some("pricing"));
        assert_eq!(idea.speaker.as_deref(), Some("Dana"));
        let stamped = store.get_document(doc).await.unwrap().unwrap();
        assert!(stamped.ideas_extracted_at.is_some());
    }

    #[tokio::test]
    async fn unparseable_reply_stores_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let doc = document(&store, Uuid::new_v4()).await;
        let ids = extractor(Arc::clone(&store), "I could not find ideas.")
            .extract_ideas(doc)
            .await
            .unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn missing_document_is_not_found() {
        let store = Arc::new(InMemoryStore::new());
        let err = extractor(store, "[]").extract_ideas(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, BrainError::NotFound { .. }));
    }

    #[tokio::test]
    async fn transitions_follow_the_state_machine() {
        let store = InMemoryStore::new();
        let scope = Scope::owner(Uuid::new_v4());
        let id = store
            .insert_idea(&NewIdea {
                owner_id: scope.owner_id,
                source_document_id: None,
                title: "t".to_string(),
                core_insight: "i".to_string(),
                hook: None,
                content_pillar: None,
                speaker: None,
            })
            .await
            .unwrap();

        let before = transition_idea(&store, id, IdeaStatus::Selected).await.unwrap();
        assert_eq!(before.status, IdeaStatus::Extracted);

        let err = transition_idea(&store, id, IdeaStatus::Published).await.unwrap_err();
        assert!(matches!(err, BrainError::Core(_)));

        transition_idea(&store, id, IdeaStatus::Archived).await.unwrap();
        let err = transition_idea(&store, id, IdeaStatus::Selected).await.unwrap_err();
        assert!(matches!(err, BrainError::Core(_)));
    }
}
