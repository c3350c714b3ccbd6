//! Assembling everything the writer needs for one idea.

use std::sync::Arc;

use cbrain_core::{ContentIdea, PerformancePattern, Scope, VoiceProfile};
use serde::Serialize;
use uuid::Uuid;

use crate::analyzer::top_attributes;
use crate::cache::EmbeddingCache;
use crate::matcher::{TemplateMatch, TemplateMatcher};
use crate::retrieval::Retriever;
use crate::store::BrainStore;
use crate::BrainError;

/// Structure used when no template is available.
pub const GENERIC_STRUCTURE: &str = "Hook: one line that makes the reader stop.\n\
Setup: the situation or problem in two or three short lines.\n\
Insight: the lesson, stated plainly.\n\
Proof: a concrete example, number or story.\n\
Close: a question or call to action.";

#[derive(Debug, Clone)]
pub struct BriefingSettings {
    pub context_budget: usize,
    /// Zero disables the quality boost when ranking context.
    pub quality_boost: f32,
    pub template_min_similarity: f32,
    pub pattern_limit: usize,
    pub pattern_min_confidence: f64,
}

impl Default for BriefingSettings {
    fn default() -> Self {
        Self {
            context_budget: 6_000,
            quality_boost: 0.5,
            template_min_similarity: 0.35,
            pattern_limit: 5,
            pattern_min_confidence: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Brief {
    pub idea: ContentIdea,
    /// Compiled `[category] content` lines; empty when nothing matched.
    pub knowledge_context: String,
    pub template: Option<TemplateMatch>,
    /// The template's structure, or [`GENERIC_STRUCTURE`].
    pub structure: String,
    pub voice: VoiceProfile,
    pub patterns: Vec<PerformancePattern>,
    /// Inputs that could not be read and were replaced by their defaults.
    pub skipped_stages: Vec<String>,
}

impl Brief {
    #[must_use]
    pub fn template_id(&self) -> Option<Uuid> {
        self.template.as_ref().map(|m| m.template.id)
    }

    /// Render the brief as writer instructions.
    #[must_use]
    pub fn to_prompt(&self) -> String {
        let mut prompt = format!(
            "Write a LinkedIn post.\n\nIdea: {}\nCore insight: {}\n",
            self.idea.title, self.idea.core_insight
        );
        if let Some(hook) = &self.idea.hook {
            prompt.push_str(&format!("Suggested hook: {hook}\n"));
        }
        if let Some(pillar) = &self.idea.content_pillar {
            prompt.push_str(&format!("Content pillar: {pillar}\n"));
        }

        prompt.push_str(&format!("\nStructure to follow:\n{}\n", self.structure));
        if let Some(example) = self.template.as_ref().and_then(|m| m.template.examples.first()) {
            prompt.push_str(&format!("\nExample in this structure:\n{example}\n"));
        }

        prompt.push_str(&format!("\nVoice: {}\n", self.voice.tone));
        for note in &self.voice.style_notes {
            prompt.push_str(&format!("- {note}\n"));
        }
        if !self.voice.signature_phrases.is_empty() {
            prompt.push_str(&format!(
                "Phrases the author uses: {}\n",
                self.voice.signature_phrases.join("; ")
            ));
        }
        if !self.voice.banned_phrases.is_empty() {
            prompt.push_str(&format!("Never write: {}\n", self.voice.banned_phrases.join("; ")));
        }

        if !self.knowledge_context.is_empty() {
            prompt.push_str(&format!(
                "\nRelevant knowledge from the author's calls:\n{}\n",
                self.knowledge_context
            ));
        }
        if !self.patterns.is_empty() {
            prompt.push_str("\nWhat has performed well before:\n");
            for p in &self.patterns {
                prompt.push_str(&format!(
                    "- {} = {} (engagement {:.3}, {} posts)\n",
                    p.pattern_type, p.pattern_value, p.avg_engagement_rate, p.sample_count
                ));
            }
        }

        prompt.push_str(
            "\nRespond with a JSON object: {\"content\": the post, \"dm_text\": a two sentence direct message \
             version, \"cta_keyword\": one uppercase word readers comment to get a resource, \
             \"variations\": two alternative opening lines}.",
        );
        prompt
    }
}

pub struct BriefingAgent {
    store: Arc<dyn BrainStore>,
    retriever: Arc<Retriever>,
    matcher: Arc<TemplateMatcher>,
    cache: Arc<EmbeddingCache>,
    settings: BriefingSettings,
}

impl BriefingAgent {
    #[must_use]
    pub fn new(
        store: Arc<dyn BrainStore>,
        retriever: Arc<Retriever>,
        matcher: Arc<TemplateMatcher>,
        cache: Arc<EmbeddingCache>,
        settings: BriefingSettings,
    ) -> Self {
        Self {
            store,
            retriever,
            matcher,
            cache,
            settings,
        }
    }

    /// Build a brief for `idea`. Missing knowledge, templates, voice
    /// profiles or patterns fall back to defaults. So does any input whose
    /// read fails; its stage name is recorded in
    /// [`Brief::skipped_stages`] and generation goes ahead without it.
    pub async fn build_brief(&self, idea: &ContentIdea, scope: &Scope) -> Brief {
        let query = format!("{} {}", idea.title, idea.core_insight);
        let mut skipped_stages = Vec::new();

        let knowledge_context = self
            .retriever
            .compile_context(
                &query,
                scope,
                self.settings.context_budget,
                self.settings.quality_boost,
            )
            .await;
        let knowledge_context = or_skip(knowledge_context, "knowledge_context", &mut skipped_stages);

        let template = self
            .matcher
            .match_templates(
                &query,
                scope,
                1,
                self.settings.template_min_similarity,
                &self.cache,
            )
            .await
            .map(|matches| matches.into_iter().next());
        let template = or_skip(template, "template", &mut skipped_stages);
        let structure = template
            .as_ref()
            .map_or_else(|| GENERIC_STRUCTURE.to_string(), |m| m.template.structure.clone());

        let speaker = idea.speaker.as_deref().unwrap_or("default");
        let profile = self.store.get_voice_profile(scope.owner_id, speaker).await;
        let voice = match or_skip(profile, "voice_profile", &mut skipped_stages) {
            Some(profile) => profile,
            None => {
                tracing::debug!(speaker, "no voice profile, using default");
                VoiceProfile::default_for(scope.owner_id, speaker)
            }
        };

        let patterns = top_attributes(
            self.store.as_ref(),
            scope.owner_id,
            self.settings.pattern_limit,
            self.settings.pattern_min_confidence,
        )
        .await;
        let patterns = or_skip(patterns, "patterns", &mut skipped_stages);

        tracing::debug!(
            idea_id = %idea.id,
            context_chars = knowledge_context.chars().count(),
            template = template.as_ref().map(|m| m.template.name.as_str()),
            patterns = patterns.len(),
            skipped = skipped_stages.len(),
            "brief assembled"
        );

        Brief {
            idea: idea.clone(),
            knowledge_context,
            template,
            structure,
            voice,
            patterns,
            skipped_stages,
        }
    }
}

fn or_skip<T: Default>(result: Result<T, BrainError>, stage: &str, skipped: &mut Vec<String>) -> T {
    result.unwrap_or_else(|e| {
        tracing::warn!(stage, error = %e, "brief input unavailable, using default");
        skipped.push(stage.to_string());
        T::default()
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cbrain_core::{Actionability, IdeaStatus, KnowledgeType, NewKnowledgeEntry, Template};
    use chrono::Utc;

    use super::*;
    use crate::store::InMemoryStore;
    use crate::testing::BriefReadsFailStore;

    fn idea(owner: Uuid, speaker: Option<&str>) -> ContentIdea {
        ContentIdea {
            id: Uuid::new_v4(),
            owner_id: owner,
            source_document_id: None,
            title: "Pricing".to_string(),
            core_insight: "Quote high first".to_string(),
            hook: None,
            content_pillar: None,
            speaker: speaker.map(str::to_string),
            status: IdeaStatus::Selected,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn agent(store: Arc<dyn BrainStore>) -> BriefingAgent {
        let dyn_store = store;
        BriefingAgent::new(
            Arc::clone(&dyn_store),
            Arc::new(Retriever::new(Arc::clone(&dyn_store), None)),
            Arc::new(TemplateMatcher::new(Arc::clone(&dyn_store), None)),
            Arc::new(EmbeddingCache::new(Duration::from_secs(60), 8)),
            BriefingSettings::default(),
        )
    }

    #[tokio::test]
    async fn empty_store_gives_defaults() {
        let store = Arc::new(InMemoryStore::new());
        let owner = Uuid::new_v4();
        let brief = agent(store)
            .build_brief(&idea(owner, Some("Dana")), &Scope::owner(owner))
            .await;

        assert!(brief.knowledge_context.is_empty());
        assert!(brief.template.is_none());
        assert_eq!(brief.structure, GENERIC_STRUCTURE);
        assert_eq!(brief.voice, VoiceProfile::default_for(owner, "Dana"));
        assert!(brief.patterns.is_empty());
        assert!(brief.skipped_stages.is_empty());
        let prompt = brief.to_prompt();
        assert!(prompt.contains("Quote high first"));
        assert!(!prompt.contains("Relevant knowledge"));
    }

    #[tokio::test]
    async fn uses_stored_inputs_when_present() {
        let store = Arc::new(InMemoryStore::new());
        let owner = Uuid::new_v4();
        store
            .insert_entry(&NewKnowledgeEntry {
                owner_id: owner,
                team_id: None,
                source_document_id: None,
                category: "sales".to_string(),
                knowledge_type: KnowledgeType::HowTo,
                speaker: None,
                content: "Quote the highest pricing tier first".to_string(),
                context: None,
                tags: Vec::new(),
                topics: Vec::new(),
                quality_score: 4,
                specificity: true,
                actionability: Actionability::ImmediatelyActionable,
                embedding: None,
            })
            .await
            .unwrap();
        store
            .add_template(Template {
                id: Uuid::new_v4(),
                owner_id: None,
                name: "Contrarian".to_string(),
                category: "opinion".to_string(),
                structure: "Everyone says X. Here is why Y.".to_string(),
                examples: Vec::new(),
                tags: Vec::new(),
                usage_count: 3,
                avg_engagement_score: 0.0,
                embedding: None,
            })
            .await;
        store
            .add_voice_profile(VoiceProfile {
                tone: "blunt".to_string(),
                ..VoiceProfile::default_for(owner, "Dana")
            })
            .await;

        let brief = agent(store)
            .build_brief(&idea(owner, Some("dana")), &Scope::owner(owner))
            .await;

        assert_eq!(brief.knowledge_context, "[sales] Quote the highest pricing tier first");
        let template = brief.template.as_ref().unwrap();
        assert!(template.fallback);
        assert_eq!(brief.structure, "Everyone says X. Here is why Y.");
        assert_eq!(brief.voice.tone, "blunt");
    }

    #[tokio::test]
    async fn unreadable_inputs_fall_back_and_are_reported() {
        let store = Arc::new(BriefReadsFailStore::default());
        let owner = Uuid::new_v4();
        let brief = agent(store)
            .build_brief(&idea(owner, Some("Dana")), &Scope::owner(owner))
            .await;

        assert_eq!(
            brief.skipped_stages,
            vec!["knowledge_context", "template", "voice_profile", "patterns"]
        );
        assert!(brief.knowledge_context.is_empty());
        assert_eq!(brief.structure, GENERIC_STRUCTURE);
        assert_eq!(brief.voice, VoiceProfile::default_for(owner, "Dana"));
        assert!(brief.patterns.is_empty());
    }
}
