//! Fan-out/fan-in orchestration of the persona generation calls.
//!
//! One teacher prompt becomes one concurrent generation call per persona;
//! results are joined back into the catalog's canonical order so that the
//! aggregate response is deterministic regardless of which backing call
//! finished first.

use crate::context::{ConversationMessage, LessonContext};
use crate::error::CoreError;
use crate::llm_client::{LlmClient, extract_json};
use crate::persona::{Persona, PersonaCatalog};
use crate::prompts;
use anyhow::{Context, anyhow};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};

/// One persona's reaction to a teacher prompt.
///
/// `response` is always populated, even for personas that would not raise
/// their hand: a student always has something to say if called on. A
/// backing-call failure produces a structurally complete but degraded
/// entry rather than a missing one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaResponse {
    pub persona_id: String,
    pub persona_name: String,
    pub would_participate: bool,
    /// Confidence in [0, 1].
    pub confidence: f32,
    /// The persona's internal reasoning.
    pub thinking: String,
    /// What the persona would say if called on.
    pub response: String,
    /// Base64-encoded MP3, populated by the voice synthesizer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_base64: Option<String>,
}

/// The aggregate result of one coordinator invocation: exactly one entry
/// per catalog persona, in canonical order, plus the derived hand-count
/// summary.
#[derive(Debug, Clone, Serialize)]
pub struct ClassroomResponse {
    pub responses: Vec<PersonaResponse>,
    pub summary: String,
}

/// The JSON document each persona call is instructed to return.
#[derive(Debug, Deserialize)]
struct PersonaReply {
    #[serde(default)]
    would_participate: bool,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    thinking: String,
    #[serde(default)]
    response: String,
}

/// Dispatches persona generation calls concurrently and assembles the
/// ordered result set.
pub struct PersonaCoordinator {
    catalog: Arc<PersonaCatalog>,
    llm: Arc<dyn LlmClient>,
    persona_timeout: Duration,
}

impl PersonaCoordinator {
    pub fn new(
        catalog: Arc<PersonaCatalog>,
        llm: Arc<dyn LlmClient>,
        persona_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            llm,
            persona_timeout,
        }
    }

    /// Asks every persona in the catalog to react to `prompt`.
    ///
    /// All persona calls run concurrently; latency tracks the slowest
    /// single call. A failed or timed-out call degrades only that
    /// persona's entry. The call as a whole fails only when the prompt is
    /// empty or every persona failed.
    #[instrument(skip_all, fields(personas = self.catalog.len()))]
    pub async fn respond(
        &self,
        prompt: &str,
        context: Option<&LessonContext>,
        history: &[ConversationMessage],
    ) -> Result<ClassroomResponse, CoreError> {
        if prompt.trim().is_empty() {
            return Err(CoreError::InvalidInput(
                "prompt must not be empty".to_string(),
            ));
        }

        let mut in_flight = FuturesUnordered::new();
        for (slot, persona) in self.catalog.iter().enumerate() {
            let persona = Arc::clone(persona);
            let system_prompt = prompts::persona_system_prompt(&persona, context, history);
            let llm = Arc::clone(&self.llm);
            let prompt = prompt.to_string();
            let timeout = self.persona_timeout;
            in_flight.push(async move {
                let outcome =
                    tokio::time::timeout(timeout, ask_one(&*llm, &persona, system_prompt, prompt))
                        .await;
                let result = match outcome {
                    Ok(result) => result,
                    Err(_) => Err(anyhow!("timed out after {:?}", timeout)),
                };
                (slot, persona, result)
            });
        }

        // Pure join: each task fills its own slot, so completion order
        // never influences the returned order.
        let mut slots: Vec<Option<PersonaResponse>> = vec![None; self.catalog.len()];
        let mut failures = 0usize;
        while let Some((slot, persona, result)) = in_flight.next().await {
            let response = match result {
                Ok(response) => response,
                Err(source) => {
                    failures += 1;
                    let failure = CoreError::PersonaFailure {
                        persona: persona.id.clone(),
                        source,
                    };
                    warn!(persona = %persona.id, error = %failure, "Persona call degraded");
                    degraded_response(&persona, &failure)
                }
            };
            slots[slot] = Some(response);
        }

        if failures == self.catalog.len() {
            return Err(CoreError::AllPersonasFailed(failures));
        }

        let responses: Vec<PersonaResponse> = slots.into_iter().flatten().collect();
        let summary = participation_summary(&responses);
        Ok(ClassroomResponse { responses, summary })
    }
}

/// Derives the hand-count line from a response set. Always recomputed from
/// the exact set being returned, never tracked separately.
pub fn participation_summary(responses: &[PersonaResponse]) -> String {
    let raising = responses.iter().filter(|r| r.would_participate).count();
    format!(
        "{} out of {} students would raise their hand to answer this question.",
        raising,
        responses.len()
    )
}

async fn ask_one(
    llm: &dyn LlmClient,
    persona: &Persona,
    system_prompt: String,
    prompt: String,
) -> anyhow::Result<PersonaResponse> {
    let raw = llm.generate(system_prompt, prompt).await?;
    let reply: PersonaReply =
        serde_json::from_str(extract_json(&raw)).context("unparsable persona reply")?;

    // An empty spoken response breaks the "always has something to say"
    // contract; treat it like any other failed call.
    if reply.response.trim().is_empty() {
        return Err(anyhow!("persona reply had an empty spoken response"));
    }

    Ok(PersonaResponse {
        persona_id: persona.id.clone(),
        persona_name: persona.name.clone(),
        would_participate: reply.would_participate,
        confidence: reply.confidence.clamp(0.0, 1.0),
        thinking: reply.thinking,
        response: reply.response,
        audio_base64: None,
    })
}

fn degraded_response(persona: &Persona, failure: &CoreError) -> PersonaResponse {
    PersonaResponse {
        persona_id: persona.id.clone(),
        persona_name: persona.name.clone(),
        would_participate: false,
        confidence: 0.0,
        thinking: format!("Generation failed: {}", failure),
        response: format!(
            "{} is unavailable right now and can't share an answer.",
            persona.name
        ),
        audio_base64: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::{LlmStream, LlmStreamEvent};
    use crate::persona::test_persona;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// A scripted stand-in for the generation capability: per-persona
    /// behavior keyed by the persona name appearing in the system prompt.
    struct ScriptedLlm {
        scripts: HashMap<String, Script>,
    }

    #[derive(Clone)]
    enum Script {
        Reply {
            text: String,
            delay: Duration,
        },
        Fail,
        Hang,
    }

    impl ScriptedLlm {
        fn new() -> Self {
            Self {
                scripts: HashMap::new(),
            }
        }

        fn reply(mut self, name: &str, text: &str, delay_ms: u64) -> Self {
            self.scripts.insert(
                name.to_string(),
                Script::Reply {
                    text: text.to_string(),
                    delay: Duration::from_millis(delay_ms),
                },
            );
            self
        }

        fn fail(mut self, name: &str) -> Self {
            self.scripts.insert(name.to_string(), Script::Fail);
            self
        }

        fn hang(mut self, name: &str) -> Self {
            self.scripts.insert(name.to_string(), Script::Hang);
            self
        }

        fn script_for(&self, system_prompt: &str) -> Script {
            self.scripts
                .iter()
                .find(|(name, _)| system_prompt.contains(name.as_str()))
                .map(|(_, script)| script.clone())
                .unwrap_or(Script::Fail)
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn generate(
            &self,
            system_prompt: String,
            _user_content: String,
        ) -> anyhow::Result<String> {
            match self.script_for(&system_prompt) {
                Script::Reply { text, delay } => {
                    tokio::time::sleep(delay).await;
                    Ok(text)
                }
                Script::Fail => Err(anyhow!("scripted failure")),
                Script::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(String::new())
                }
            }
        }

        async fn generate_json(
            &self,
            system_prompt: String,
            user_content: String,
        ) -> anyhow::Result<String> {
            self.generate(system_prompt, user_content).await
        }

        async fn generate_stream(
            &self,
            _system_prompt: String,
            _user_content: String,
        ) -> anyhow::Result<LlmStream> {
            Ok(Box::pin(futures::stream::iter(vec![Ok(
                LlmStreamEvent::TextChunk(String::new()),
            )])))
        }
    }

    fn reply_json(would: bool, confidence: f32) -> String {
        format!(
            r#"{{"would_participate": {}, "confidence": {}, "thinking": "hmm", "response": "my answer"}}"#,
            would, confidence
        )
    }

    fn catalog() -> Arc<PersonaCatalog> {
        Arc::new(
            PersonaCatalog::new(vec![
                test_persona("a", "Ada"),
                test_persona("b", "Bea"),
                test_persona("c", "Cal"),
            ])
            .unwrap(),
        )
    }

    fn coordinator(llm: ScriptedLlm) -> PersonaCoordinator {
        PersonaCoordinator::new(catalog(), Arc::new(llm), Duration::from_secs(30))
    }

    #[tokio::test(start_paused = true)]
    async fn test_canonical_order_independent_of_completion_order() {
        // Ada finishes last, Cal first; output order must still be a, b, c.
        let llm = ScriptedLlm::new()
            .reply("Ada", &reply_json(true, 0.9), 300)
            .reply("Bea", &reply_json(false, 0.2), 150)
            .reply("Cal", &reply_json(true, 0.7), 0);

        let result = coordinator(llm).respond("Why?", None, &[]).await.unwrap();
        let ids: Vec<_> = result
            .responses
            .iter()
            .map(|r| r.persona_id.clone())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(result.responses.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_summary_counts_participating_responses() {
        let llm = ScriptedLlm::new()
            .reply("Ada", &reply_json(true, 0.9), 0)
            .reply("Bea", &reply_json(true, 0.6), 0)
            .reply("Cal", &reply_json(false, 0.3), 0);

        let result = coordinator(llm).respond("Why?", None, &[]).await.unwrap();
        assert_eq!(
            result.summary,
            "2 out of 3 students would raise their hand to answer this question."
        );
        let recount = result
            .responses
            .iter()
            .filter(|r| r.would_participate)
            .count();
        assert_eq!(recount, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_failure_degrades_only_that_persona() {
        let llm = ScriptedLlm::new()
            .reply("Ada", &reply_json(true, 0.9), 0)
            .reply("Bea", &reply_json(true, 0.8), 0)
            .fail("Cal");

        let result = coordinator(llm).respond("Why?", None, &[]).await.unwrap();
        assert_eq!(result.responses.len(), 3);

        let cal = &result.responses[2];
        assert_eq!(cal.persona_id, "c");
        assert!(!cal.would_participate);
        assert_eq!(cal.confidence, 0.0);
        assert!(cal.thinking.contains("failed"));
        assert!(!cal.response.is_empty());
        assert_eq!(
            result.summary,
            "2 out of 3 students would raise their hand to answer this question."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_failures_fail_the_call() {
        let llm = ScriptedLlm::new().fail("Ada").fail("Bea").fail("Cal");
        let err = coordinator(llm).respond("Why?", None, &[]).await.unwrap_err();
        assert!(matches!(err, CoreError::AllPersonasFailed(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_a_local_failure() {
        let llm = ScriptedLlm::new()
            .reply("Ada", &reply_json(true, 0.9), 0)
            .reply("Bea", &reply_json(true, 0.8), 0)
            .hang("Cal");

        let coordinator =
            PersonaCoordinator::new(catalog(), Arc::new(llm), Duration::from_millis(100));
        let result = coordinator.respond("Why?", None, &[]).await.unwrap();
        assert_eq!(result.responses.len(), 3);
        assert!(!result.responses[2].would_participate);
        assert!(result.responses[2].thinking.contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_reply_degrades() {
        let llm = ScriptedLlm::new()
            .reply("Ada", "not json at all", 0)
            .reply("Bea", &reply_json(true, 0.8), 0)
            .reply("Cal", &reply_json(false, 0.1), 0);

        let result = coordinator(llm).respond("Why?", None, &[]).await.unwrap();
        assert!(!result.responses[0].would_participate);
        assert!(result.responses[0].thinking.contains("failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_spoken_response_degrades() {
        let llm = ScriptedLlm::new()
            .reply(
                "Ada",
                r#"{"would_participate": true, "confidence": 0.9, "thinking": "x", "response": "  "}"#,
                0,
            )
            .reply("Bea", &reply_json(true, 0.8), 0)
            .reply("Cal", &reply_json(false, 0.1), 0);

        let result = coordinator(llm).respond("Why?", None, &[]).await.unwrap();
        assert!(!result.responses[0].would_participate);
        assert!(!result.responses[0].response.trim().is_empty());
    }

    #[tokio::test]
    async fn test_confidence_clamped() {
        let llm = ScriptedLlm::new()
            .reply("Ada", &reply_json(true, 3.5), 0)
            .reply("Bea", &reply_json(true, 0.8), 0)
            .reply("Cal", &reply_json(false, 0.1), 0);

        let result = coordinator(llm).respond("Why?", None, &[]).await.unwrap();
        assert_eq!(result.responses[0].confidence, 1.0);
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected() {
        let llm = ScriptedLlm::new();
        let err = coordinator(llm).respond("   ", None, &[]).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[test]
    fn test_fence_wrapped_reply_parses() {
        let raw = "```json\n{\"would_participate\": true, \"confidence\": 0.5, \"thinking\": \"t\", \"response\": \"r\"}\n```";
        let reply: PersonaReply = serde_json::from_str(extract_json(raw)).unwrap();
        assert!(reply.would_participate);
    }
}
