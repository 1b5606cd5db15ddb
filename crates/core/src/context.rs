//! The shared lesson context derived once per session and round-tripped by
//! the caller on every subsequent request. The service itself keeps no
//! session state.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Grade level assumed when the caller supplies no lesson context.
///
/// Consumed by the same prompt-assembly path as a real context value; there
/// is no separate "no context" logic anywhere downstream.
pub const DEFAULT_GRADE_LEVEL: &str = "8th grade";

/// How one persona would approach the lesson's problem, derived by the
/// lesson analyzer so that personas genuinely reason differently about the
/// same material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaApproach {
    pub persona_id: String,
    pub persona_name: String,
    /// Free-text description of how this persona would attack the problem.
    pub approach: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub likely_misconceptions: Vec<String>,
}

/// Structured context extracted from a lesson plan.
///
/// Created once by [`crate::analyzer::LessonAnalyzer`], owned by the caller,
/// and treated as an immutable value by every component that reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonContext {
    pub grade_level: String,
    pub subject: String,
    pub topic: String,
    pub learning_objectives: Vec<String>,
    pub key_concepts: Vec<String>,
    /// How students at this grade level typically approach this topic.
    pub context_summary: String,
    /// The specific problem or scenario under discussion, if one exists.
    #[serde(default)]
    pub mathematical_problem: Option<String>,
    /// Per-persona approaches keyed by persona id.
    #[serde(default)]
    pub persona_approaches: HashMap<String, PersonaApproach>,
}

/// A single message in the conversation history. Append-only from the
/// caller's perspective; the service only ever reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// "teacher" or a persona name.
    pub speaker: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lesson_context_round_trip() {
        let json = r#"{
            "grade_level": "3rd grade",
            "subject": "Mathematics",
            "topic": "Fractions",
            "learning_objectives": ["Compare unit fractions"],
            "key_concepts": ["numerator", "denominator"],
            "context_summary": "Third graders reason concretely about fair shares.",
            "mathematical_problem": "Split 3 sandwiches among 4 friends.",
            "persona_approaches": {
                "chipper": {
                    "persona_id": "chipper",
                    "persona_name": "Chipper",
                    "approach": "Draws the sandwiches and starts cutting.",
                    "strengths": ["concrete modeling"],
                    "likely_misconceptions": ["bigger denominator means bigger piece"]
                }
            }
        }"#;

        let ctx: LessonContext = serde_json::from_str(json).unwrap();
        assert_eq!(ctx.grade_level, "3rd grade");
        assert_eq!(ctx.persona_approaches.len(), 1);
        let approach = &ctx.persona_approaches["chipper"];
        assert_eq!(approach.persona_name, "Chipper");

        let back = serde_json::to_string(&ctx).unwrap();
        let again: LessonContext = serde_json::from_str(&back).unwrap();
        assert_eq!(again.topic, "Fractions");
    }

    #[test]
    fn test_optional_fields_default() {
        let json = r#"{
            "grade_level": "9th grade",
            "subject": "Algebra",
            "topic": "Linear Equations",
            "learning_objectives": [],
            "key_concepts": [],
            "context_summary": ""
        }"#;
        let ctx: LessonContext = serde_json::from_str(json).unwrap();
        assert!(ctx.mathematical_problem.is_none());
        assert!(ctx.persona_approaches.is_empty());
    }
}
