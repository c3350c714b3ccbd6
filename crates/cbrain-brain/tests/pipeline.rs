//! End-to-end pipeline tests over the in-memory store with scripted providers.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cbrain_ai::{AiError, EmbeddingProvider, LanguageModel};
use cbrain_brain::{
    BrainError, BrainSettings, BrainStore, ContentBrain, EntryPatch, InMemoryStore, NewDocument,
    SearchFilters,
};
use cbrain_core::{KnowledgeType, Scope};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Scripted providers
// ---------------------------------------------------------------------------

struct ScriptedModel {
    replies: Mutex<VecDeque<Option<String>>>,
}

impl ScriptedModel {
    fn new(replies: &[Option<&str>]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.map(str::to_string)).collect()),
        }
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, _prompt: &str, _model: &str, _max_tokens: u32) -> Result<String, AiError> {
        match self.replies.lock().unwrap().pop_front() {
            Some(Some(reply)) => Ok(reply),
            Some(None) => Err(AiError::Status {
                provider: "anthropic",
                status: 529,
                body: "overloaded".to_string(),
            }),
            None => Ok("[]".to_string()),
        }
    }
}

struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, AiError> {
        Err(AiError::Status {
            provider: "tei",
            status: 503,
            body: "down".to_string(),
        })
    }
}

fn settings(batch_size: usize) -> BrainSettings {
    let mut settings = BrainSettings::default();
    settings.extractor.batch_size = batch_size;
    settings.extractor.inter_batch_delay = Duration::ZERO;
    settings
}

fn brain(store: &Arc<InMemoryStore>, replies: &[Option<&str>], batch_size: usize) -> ContentBrain {
    ContentBrain::new(
        Arc::clone(store) as Arc<dyn BrainStore>,
        Arc::new(ScriptedModel::new(replies)),
        None,
        settings(batch_size),
    )
}

async fn document(store: &InMemoryStore, owner: Uuid, raw_text: &str) -> Uuid {
    store
        .insert_document(&NewDocument {
            owner_id: owner,
            team_id: None,
            title: "Coaching call".to_string(),
            raw_text: raw_text.to_string(),
            speaker_hint: None,
        })
        .await
        .unwrap()
}

const TRANSCRIPT: &str = "\
Host: So tell me about the worst launch you ever had.

Dana: We launched without talking to a single customer and burned three months building features nobody wanted.

Host: What do you do differently now?

Dana: First, list ten target buyers. Second, book fifteen minute calls with each of them. Third, only build what at least six of them ask for.
";

const MISTAKE_AND_HOW_TO: &str = r#"```json
[
  {"segment": 2, "content": "Launching without customer conversations wasted three months on unwanted features.",
   "category": "Product", "knowledge_type": "mistake", "quality_score": 3.7, "specificity": true,
   "actionability": "contextual", "tags": ["Validation", "launch"], "topics": ["Customer Discovery"]},
  {"segment": 4, "content": "List ten buyers, book short calls with each, and build only what six of them request.",
   "category": "product", "knowledge_type": "how_to", "quality_score": 7, "specificity": true,
   "actionability": "immediately_actionable", "tags": ["validation"], "topics": ["customer discovery", "Product Validation"]},
  {"segment": 1, "content": "Host asked about launches.", "knowledge_type": "chit_chat", "quality_score": 0}
]
```"#;

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transcript_yields_mistake_and_how_to_with_topics() {
    let store = Arc::new(InMemoryStore::new());
    let owner = Uuid::new_v4();
    let doc = document(&store, owner, TRANSCRIPT).await;
    let brain = brain(&store, &[Some(MISTAKE_AND_HOW_TO)], 10);

    let entries = brain.extractor().extract_document(doc).await.unwrap();

    assert!(entries.len() >= 2);
    let mistake = entries
        .iter()
        .find(|e| e.knowledge_type == KnowledgeType::Mistake)
        .expect("mistake entry");
    let how_to = entries
        .iter()
        .find(|e| e.knowledge_type == KnowledgeType::HowTo)
        .expect("how-to entry");
    assert!(!mistake.topics.is_empty());
    assert!(!how_to.topics.is_empty());
    assert_eq!(mistake.topics, vec!["customer-discovery"]);
    assert!(how_to.topics.contains(&"customer-discovery".to_string()));

    assert_eq!(mistake.quality_score, 4);
    assert_eq!(how_to.quality_score, 5);
    assert_eq!(mistake.category, "product");
    assert_eq!(mistake.speaker.as_deref(), Some("Dana"));
    assert!(entries.iter().all(|e| (1..=5).contains(&e.quality_score)));
    assert!(!entries.iter().any(|e| e.content.starts_with("Host asked")));

    assert_eq!(store.tag_usage(owner, "validation").await.unwrap(), Some(2));
    assert_eq!(store.tag_usage(owner, "launch").await.unwrap(), Some(1));
    let topic = store.topic(owner, "customer-discovery").await.unwrap();
    assert_eq!(topic.usage_count, 2);

    let stamped = store.get_document(doc).await.unwrap().unwrap();
    assert!(stamped.knowledge_extracted_at.is_some());
}

#[tokio::test]
async fn quality_zero_clamps_to_one() {
    let store = Arc::new(InMemoryStore::new());
    let owner = Uuid::new_v4();
    let brain = brain(
        &store,
        &[Some(r#"[{"content": "Weak but valid insight.", "knowledge_type": "insight", "quality_score": 0}]"#)],
        10,
    );
    let entries = brain
        .extractor()
        .extract("Someone said something mildly interesting about pricing today.", &Scope::owner(owner))
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].quality_score, 1);
}

#[tokio::test]
async fn unparseable_batch_does_not_affect_other_batches() {
    let store = Arc::new(InMemoryStore::new());
    let owner = Uuid::new_v4();
    let brain = brain(
        &store,
        &[
            Some("Sorry, I can't help with that."),
            Some(r#"[{"content": "Follow up within an hour.", "knowledge_type": "how_to"}]"#),
        ],
        1,
    );
    let text = "Dana: The first segment has plenty of words to count.\n\nDana: The second segment also has plenty of words.";

    let entries = brain.extractor().extract(text, &Scope::owner(owner)).await.unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].content, "Follow up within an hour.");
    assert_eq!(entries[0].quality_score, 3);
}

#[tokio::test]
async fn model_failure_keeps_earlier_batches_and_retry_starts_clean() {
    let store = Arc::new(InMemoryStore::new());
    let owner = Uuid::new_v4();
    let text = "Dana: The first segment has plenty of words to count.\n\nDana: The second segment also has plenty of words.";
    let doc = document(&store, owner, text).await;
    let first = r#"[{"content": "Partial entry.", "knowledge_type": "insight", "tags": ["partial"]}]"#;

    let failing = brain(&store, &[Some(first), None], 1);
    let err = failing.extractor().extract_document(doc).await.unwrap_err();
    assert!(err.is_retriable());
    assert!(store.get_document(doc).await.unwrap().unwrap().knowledge_extracted_at.is_none());
    assert_eq!(store.tag_usage(owner, "partial").await.unwrap(), Some(1));

    let retry = brain(
        &store,
        &[
            Some(first),
            Some(r#"[{"content": "Second entry.", "knowledge_type": "insight"}]"#),
        ],
        1,
    );
    let entries = retry.extractor().extract_document(doc).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(store.tag_usage(owner, "partial").await.unwrap(), Some(1));

    let again = retry.extractor().extract_document(doc).await.unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn embedding_outage_persists_entries_without_vectors() {
    let store = Arc::new(InMemoryStore::new());
    let owner = Uuid::new_v4();
    let brain = ContentBrain::new(
        Arc::clone(&store) as Arc<dyn BrainStore>,
        Arc::new(ScriptedModel::new(&[Some(
            r#"[{"content": "Price on value, not hours.", "knowledge_type": "insight", "topics": ["pricing"]}]"#,
        )])),
        Some(Arc::new(FailingEmbedder)),
        settings(10),
    );

    let entries = brain
        .extractor()
        .extract("Dana: Price on value, never on the hours you spend.", &Scope::owner(owner))
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].embedding.is_none());
    assert_eq!(entries[0].topics, vec!["pricing"]);

    let found = brain
        .retriever()
        .search("value", &SearchFilters::default(), &Scope::owner(owner))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert!(found[0].similarity.is_none());
}

// ---------------------------------------------------------------------------
// Reprocessing and manual edits
// ---------------------------------------------------------------------------

const FIVE_SEGMENTS: &str = "\
Dana: Always anchor with the premium package before showing the basic one.

Dana: When they push back on price, stay silent for at least five seconds.

Dana: Never discount without getting something back in the same conversation.

Dana: Put the price on the second slide, not the last one of the deck.

Dana: Send the written proposal within an hour after every single call.
";

const FIVE_ENTRIES: &str = r#"[
  {"segment": 1, "content": "Anchor with the premium package first.", "knowledge_type": "how_to", "tags": ["pricing"]},
  {"segment": 2, "content": "Stay silent after price objections.", "knowledge_type": "objection", "tags": ["negotiation"]},
  {"segment": 3, "content": "Trade every discount for something.", "knowledge_type": "insight", "tags": ["pricing"]},
  {"segment": 4, "content": "Show price on the second slide.", "knowledge_type": "how_to"},
  {"segment": 5, "content": "Send proposals within the hour.", "knowledge_type": "how_to"}
]"#;

#[tokio::test]
async fn reprocess_decrements_tags_by_multiplicity() {
    let store = Arc::new(InMemoryStore::new());
    let owner = Uuid::new_v4();
    let doc = document(&store, owner, FIVE_SEGMENTS).await;
    let brain = brain(
        &store,
        &[
            Some(FIVE_ENTRIES),
            Some(r#"[{"segment": 5, "content": "Follow up fast.", "knowledge_type": "how_to", "tags": ["followup"]}]"#),
        ],
        10,
    );

    let first = brain.extractor().extract_document(doc).await.unwrap();
    assert_eq!(first.len(), 5);
    assert_eq!(store.tag_usage(owner, "pricing").await.unwrap(), Some(2));
    assert_eq!(store.tag_usage(owner, "negotiation").await.unwrap(), Some(1));

    let report = brain.extractor().reprocess(doc).await.unwrap();

    assert_eq!(report.entries_removed, 5);
    let expected: BTreeMap<String, i64> =
        [("negotiation".to_string(), 1), ("pricing".to_string(), 2)].into_iter().collect();
    assert_eq!(report.tag_decrements, expected);
    assert_eq!(store.tag_usage(owner, "pricing").await.unwrap(), Some(0));
    assert_eq!(store.tag_usage(owner, "negotiation").await.unwrap(), Some(0));
    assert_eq!(store.tag_usage(owner, "followup").await.unwrap(), Some(1));

    let scope = Scope::owner(owner);
    let old = brain
        .retriever()
        .search("premium", &SearchFilters::default(), &scope)
        .await
        .unwrap();
    assert!(old.is_empty());
    for entry in &first {
        assert!(store.get_entry(entry.id).await.unwrap().is_none());
    }
    assert_eq!(report.entries.len(), 1);
}

#[tokio::test]
async fn reprocess_unknown_document_is_not_found() {
    let store = Arc::new(InMemoryStore::new());
    let brain = brain(&store, &[], 10);
    let err = brain.extractor().reprocess(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, BrainError::NotFound { entity: "document", .. }));
}

#[tokio::test]
async fn manual_edits_adjust_tag_counts() {
    let store = Arc::new(InMemoryStore::new());
    let owner = Uuid::new_v4();
    let brain = brain(
        &store,
        &[Some(r#"[{"content": "Anchor high.", "knowledge_type": "how_to", "tags": ["pricing", "sales"]}]"#)],
        10,
    );
    let entries = brain
        .extractor()
        .extract("Dana: Always anchor high when you quote a new client.", &Scope::owner(owner))
        .await
        .unwrap();
    let id = entries[0].id;

    let updated = brain
        .extractor()
        .update_entry(
            id,
            EntryPatch {
                content: Some("Anchor high on every first quote.".to_string()),
                tags: Some(vec!["Pricing".to_string(), "Negotiation".to_string()]),
                ..EntryPatch::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.tags, vec!["pricing", "negotiation"]);
    assert_eq!(store.tag_usage(owner, "pricing").await.unwrap(), Some(1));
    assert_eq!(store.tag_usage(owner, "sales").await.unwrap(), Some(0));
    assert_eq!(store.tag_usage(owner, "negotiation").await.unwrap(), Some(1));

    let blank = brain
        .extractor()
        .update_entry(
            id,
            EntryPatch {
                content: Some("   ".to_string()),
                ..EntryPatch::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(blank, BrainError::Validation(_)));

    brain.extractor().delete_entry(id).await.unwrap();
    assert_eq!(store.tag_usage(owner, "pricing").await.unwrap(), Some(0));
    assert!(store.get_entry(id).await.unwrap().is_none());
}
