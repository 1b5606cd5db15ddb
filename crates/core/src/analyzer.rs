//! Lesson-plan analysis: one structured generation call that turns raw
//! lesson material into the shared [`LessonContext`], including a distinct
//! derived approach for every persona in the catalog.

use crate::context::{LessonContext, PersonaApproach};
use crate::error::CoreError;
use crate::llm_client::LlmClient;
use crate::persona::PersonaCatalog;
use crate::prompts;
use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Raw lesson material supplied by the caller.
///
/// Document extraction happens upstream; `document_text` arrives as
/// already-extracted text. At least one of the two fields must be
/// non-empty.
#[derive(Debug, Clone, Default)]
pub struct LessonMaterial {
    pub lesson_plan_text: String,
    pub document_text: Option<String>,
}

impl LessonMaterial {
    fn combined_text(&self) -> Option<String> {
        let mut parts = Vec::new();
        if !self.lesson_plan_text.trim().is_empty() {
            parts.push(self.lesson_plan_text.trim().to_string());
        }
        if let Some(doc) = &self.document_text {
            if !doc.trim().is_empty() {
                parts.push(doc.trim().to_string());
            }
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }
}

/// The JSON document the analysis call is instructed to return.
#[derive(Debug, Deserialize)]
struct AnalysisOutput {
    grade_level: String,
    subject: String,
    topic: String,
    #[serde(default)]
    learning_objectives: Vec<String>,
    #[serde(default)]
    key_concepts: Vec<String>,
    context_summary: String,
    #[serde(default)]
    mathematical_problem: Option<String>,
    #[serde(default)]
    persona_approaches: Vec<PersonaApproach>,
}

/// Builds the shared lesson context with a single generation round trip.
pub struct LessonAnalyzer {
    llm: Arc<dyn LlmClient>,
    catalog: Arc<PersonaCatalog>,
    /// Static system-prompt base loaded from the prompts directory.
    system_prompt: String,
}

impl LessonAnalyzer {
    pub fn new(llm: Arc<dyn LlmClient>, catalog: Arc<PersonaCatalog>, system_prompt: String) -> Self {
        Self {
            llm,
            catalog,
            system_prompt,
        }
    }

    /// Analyzes lesson material into a [`LessonContext`].
    ///
    /// Issues exactly one generation request covering both the lesson
    /// metadata and a per-persona approach for every catalog persona;
    /// requesting them together keeps this O(1) in persona count and lets
    /// the model differentiate the approaches against each other.
    #[instrument(skip_all)]
    pub async fn analyze(&self, material: &LessonMaterial) -> Result<LessonContext, CoreError> {
        let Some(lesson_text) = material.combined_text() else {
            return Err(CoreError::InvalidInput(
                "lesson material must include text or a document".to_string(),
            ));
        };

        let system_prompt = format!(
            "{}\n\nSTUDENT PROFILES TO ANALYZE:\n{}",
            self.system_prompt,
            prompts::catalog_profiles_block(&self.catalog)
        );
        let user_content = format!("Lesson Plan:\n\n{}", lesson_text);

        let raw = self
            .llm
            .generate_json(system_prompt, user_content)
            .await
            .map_err(CoreError::AnalysisFailure)?;

        let output: AnalysisOutput = serde_json::from_str(&raw)
            .context("lesson analysis output did not match the expected structure")
            .map_err(CoreError::AnalysisFailure)?;

        let mut approaches = HashMap::with_capacity(output.persona_approaches.len());
        for approach in output.persona_approaches {
            if !self.catalog.contains(&approach.persona_id) {
                warn!(persona = %approach.persona_id, "Dropping approach for unknown persona");
                continue;
            }
            approaches.insert(approach.persona_id.clone(), approach);
        }
        if approaches.len() < self.catalog.len() {
            // Personas without an approach fall back to trait-profile-only
            // prompting in the coordinator.
            warn!(
                derived = approaches.len(),
                personas = self.catalog.len(),
                "Analysis returned approaches for only part of the catalog"
            );
        }

        info!(topic = %output.topic, grade = %output.grade_level, "Lesson analyzed");

        Ok(LessonContext {
            grade_level: output.grade_level,
            subject: output.subject,
            topic: output.topic,
            learning_objectives: output.learning_objectives,
            key_concepts: output.key_concepts,
            context_summary: output.context_summary,
            mathematical_problem: output.mathematical_problem,
            persona_approaches: approaches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::MockLlmClient;
    use crate::persona::test_persona;

    fn catalog() -> Arc<PersonaCatalog> {
        Arc::new(
            PersonaCatalog::new(vec![test_persona("a", "Ada"), test_persona("b", "Bea")]).unwrap(),
        )
    }

    fn analyzer(mock: MockLlmClient) -> LessonAnalyzer {
        LessonAnalyzer::new(Arc::new(mock), catalog(), "Analyze the lesson.".to_string())
    }

    const ANALYSIS_JSON: &str = r#"{
        "grade_level": "3rd grade",
        "subject": "Mathematics",
        "topic": "Fractions",
        "learning_objectives": ["Compare unit fractions"],
        "key_concepts": ["numerator"],
        "context_summary": "Concrete reasoning dominates at this age.",
        "mathematical_problem": "Share 3 sandwiches among 4 friends.",
        "persona_approaches": [
            {"persona_id": "a", "persona_name": "Ada", "approach": "draws a picture",
             "strengths": ["visualizing"], "likely_misconceptions": ["unequal shares"]},
            {"persona_id": "b", "persona_name": "Bea", "approach": "reaches for division facts",
             "strengths": [], "likely_misconceptions": []},
            {"persona_id": "ghost", "persona_name": "Ghost", "approach": "should be dropped",
             "strengths": [], "likely_misconceptions": []}
        ]
    }"#;

    #[tokio::test]
    async fn test_analyze_builds_context_with_approaches() {
        let mut mock = MockLlmClient::new();
        mock.expect_generate_json()
            .times(1)
            .returning(|_, _| Ok(ANALYSIS_JSON.to_string()));

        let material = LessonMaterial {
            lesson_plan_text: "3rd grade fractions lesson".to_string(),
            document_text: None,
        };
        let ctx = analyzer(mock).analyze(&material).await.unwrap();

        assert_eq!(ctx.grade_level, "3rd grade");
        assert_eq!(ctx.persona_approaches.len(), 2);
        assert!(ctx.persona_approaches.contains_key("a"));
        assert!(!ctx.persona_approaches.contains_key("ghost"));
    }

    #[tokio::test]
    async fn test_analyze_includes_profiles_in_single_call() {
        let mut mock = MockLlmClient::new();
        mock.expect_generate_json()
            .times(1)
            .withf(|system, user| {
                system.contains("STUDENT PROFILE: Ada")
                    && system.contains("STUDENT PROFILE: Bea")
                    && user.contains("fractions lesson")
            })
            .returning(|_, _| Ok(ANALYSIS_JSON.to_string()));

        let material = LessonMaterial {
            lesson_plan_text: "fractions lesson".to_string(),
            document_text: None,
        };
        analyzer(mock).analyze(&material).await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_material_is_invalid_input() {
        let mock = MockLlmClient::new();
        let material = LessonMaterial {
            lesson_plan_text: "   ".to_string(),
            document_text: Some("".to_string()),
        };
        let err = analyzer(mock).analyze(&material).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_document_only_material_is_accepted() {
        let mut mock = MockLlmClient::new();
        mock.expect_generate_json()
            .returning(|_, _| Ok(ANALYSIS_JSON.to_string()));
        let material = LessonMaterial {
            lesson_plan_text: String::new(),
            document_text: Some("extracted pdf text".to_string()),
        };
        assert!(analyzer(mock).analyze(&material).await.is_ok());
    }

    #[tokio::test]
    async fn test_capability_error_is_analysis_failure() {
        let mut mock = MockLlmClient::new();
        mock.expect_generate_json()
            .returning(|_, _| Err(anyhow::anyhow!("upstream 500")));
        let material = LessonMaterial {
            lesson_plan_text: "lesson".to_string(),
            document_text: None,
        };
        let err = analyzer(mock).analyze(&material).await.unwrap_err();
        assert!(matches!(err, CoreError::AnalysisFailure(_)));
    }

    #[tokio::test]
    async fn test_unparsable_output_is_analysis_failure() {
        let mut mock = MockLlmClient::new();
        mock.expect_generate_json()
            .returning(|_, _| Ok("{\"unexpected\": true}".to_string()));
        let material = LessonMaterial {
            lesson_plan_text: "lesson".to_string(),
            document_text: None,
        };
        let err = analyzer(mock).analyze(&material).await.unwrap_err();
        assert!(matches!(err, CoreError::AnalysisFailure(_)));
    }
}
