//! API Models
//!
//! Request and response payloads for the REST surface. Domain types from
//! `rehearse-core` pass through unchanged; the structs here only add the
//! transport-level envelope and OpenAPI schema annotations.

use rehearse_core::context::{ConversationMessage, LessonContext};
use rehearse_core::coordinator::PersonaResponse;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Request to derive a lesson context from lesson material.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LessonSetupRequest {
    #[schema(example = "3rd Grade Math - comparing unit fractions ...")]
    pub lesson_plan_text: String,
    /// Pre-extracted text of an uploaded document, if any.
    #[serde(default)]
    pub document_text: Option<String>,
}

/// A teacher prompt plus the round-tripped session context.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AskRequest {
    #[schema(example = "Who can tell me what a fraction is?")]
    pub prompt: String,
    /// The context returned by `/lesson/setup`; optional.
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub lesson_context: Option<LessonContext>,
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub conversation_history: Vec<ConversationMessage>,
}

/// Query parameters for the ask endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct AskParams {
    /// When true, the response is an SSE stream that carries coaching
    /// feedback after the persona responses.
    #[serde(default)]
    pub stream_feedback: bool,
}

/// All persona reactions to one prompt, in canonical catalog order.
#[derive(Debug, Serialize, ToSchema)]
pub struct AskResponse {
    #[schema(value_type = Vec<Object>)]
    pub responses: Vec<PersonaResponse>,
    #[schema(example = "2 out of 3 students would raise their hand to answer this question.")]
    pub summary: String,
}

/// Request to close out a rehearsal session.
#[derive(Debug, Deserialize, ToSchema)]
pub struct EndSessionRequest {
    #[schema(value_type = Object)]
    pub lesson_context: LessonContext,
    #[schema(value_type = Vec<Object>)]
    pub transcript: Vec<ConversationMessage>,
}

/// One catalog entry as exposed by `/personas`.
#[derive(Debug, Serialize, ToSchema)]
pub struct PersonaSummary {
    pub id: String,
    pub name: String,
    pub learning_style: String,
    pub description: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PersonasResponse {
    pub personas: Vec<PersonaSummary>,
}

/// Health probe payload.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub personas_loaded: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}
