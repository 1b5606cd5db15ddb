//! Axum Handlers for the REST API
//!
//! This module contains the logic for translating the core boundary
//! surface into HTTP. It uses `utoipa` doc comments to generate OpenAPI
//! documentation.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use rehearse_core::{analyzer::LessonMaterial, context::LessonContext, error::CoreError, voice};
use std::sync::Arc;
use tracing::error;

use crate::{
    models::{
        AskParams, AskRequest, AskResponse, EndSessionRequest, ErrorResponse, HealthResponse,
        LessonSetupRequest, PersonaSummary, PersonasResponse,
    },
    state::AppState,
    stream,
};

pub enum ApiError {
    BadRequest(String),
    /// An upstream generation capability failed or returned garbage.
    BadGateway(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::BadGateway(message) => {
                error!("Upstream capability failure: {}", message);
                (StatusCode::BAD_GATEWAY, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidInput(_) => ApiError::BadRequest(err.to_string()),
            CoreError::AnalysisFailure(_) | CoreError::AllPersonasFailed(_) => {
                ApiError::BadGateway(err.to_string())
            }
            other => ApiError::InternalServerError(other.into()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalServerError(err)
    }
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service is running", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        personas_loaded: state.catalog.len(),
    })
}

/// List all personas in canonical order.
#[utoipa::path(
    get,
    path = "/personas",
    responses(
        (status = 200, description = "Ordered persona list", body = PersonasResponse)
    )
)]
pub async fn list_personas(State(state): State<Arc<AppState>>) -> Json<PersonasResponse> {
    let personas = state
        .catalog
        .iter()
        .map(|p| PersonaSummary {
            id: p.id.clone(),
            name: p.name.clone(),
            learning_style: p.learning_style.clone(),
            description: p.description.clone(),
        })
        .collect();
    Json(PersonasResponse { personas })
}

/// Analyze lesson material and derive the shared lesson context.
///
/// The caller stores the returned context and includes it in subsequent
/// `/ask` and `/lesson/end` requests; the service keeps no session state.
#[utoipa::path(
    post,
    path = "/lesson/setup",
    request_body = LessonSetupRequest,
    responses(
        (status = 200, description = "Derived lesson context", body = Object),
        (status = 400, description = "Empty lesson material", body = ErrorResponse),
        (status = 502, description = "Analysis capability failed", body = ErrorResponse)
    )
)]
pub async fn setup_lesson(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LessonSetupRequest>,
) -> Result<Json<LessonContext>, ApiError> {
    let material = LessonMaterial {
        lesson_plan_text: payload.lesson_plan_text,
        document_text: payload.document_text,
    };
    let context = state.analyzer.analyze(&material).await?;
    Ok(Json(context))
}

/// Ask all personas to react to a teacher prompt (text only).
///
/// With `stream_feedback=true`, responds with an SSE stream instead: one
/// `responses` event, zero-or-more `insight` events, a terminal `summary`
/// or `error` event, then `done`.
#[utoipa::path(
    post,
    path = "/ask",
    request_body = AskRequest,
    params(
        ("stream_feedback" = Option<bool>, Query, description = "Stream coaching feedback after the responses")
    ),
    responses(
        (status = 200, description = "Persona responses (JSON or SSE)", body = AskResponse),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 502, description = "Every persona call failed", body = ErrorResponse)
    )
)]
pub async fn ask(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AskParams>,
    Json(request): Json<AskRequest>,
) -> Result<Response, ApiError> {
    respond_to_prompt(state, params, request, false).await
}

/// Same as `/ask`, with synthesized audio attached to each response.
#[utoipa::path(
    post,
    path = "/ask/with-audio",
    request_body = AskRequest,
    params(
        ("stream_feedback" = Option<bool>, Query, description = "Stream coaching feedback after the responses")
    ),
    responses(
        (status = 200, description = "Persona responses with audio (JSON or SSE)", body = AskResponse),
        (status = 400, description = "Bad request or audio not configured", body = ErrorResponse),
        (status = 502, description = "Every persona call failed", body = ErrorResponse)
    )
)]
pub async fn ask_with_audio(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AskParams>,
    Json(request): Json<AskRequest>,
) -> Result<Response, ApiError> {
    respond_to_prompt(state, params, request, true).await
}

/// Shared flow for both ask endpoints: fan out to the personas, optionally
/// voice the responses, then either return JSON or hand off to the SSE
/// stream for coaching feedback.
async fn respond_to_prompt(
    state: Arc<AppState>,
    params: AskParams,
    request: AskRequest,
    with_audio: bool,
) -> Result<Response, ApiError> {
    let voice = if with_audio {
        Some(state.voice.clone().ok_or_else(|| {
            ApiError::BadRequest("audio support is not configured on this deployment".to_string())
        })?)
    } else {
        None
    };

    let classroom = state
        .coordinator
        .respond(
            &request.prompt,
            request.lesson_context.as_ref(),
            &request.conversation_history,
        )
        .await?;

    let (responses, summary) = match voice {
        Some(voice) => {
            let responses = voice.synthesize(classroom.responses).await;
            let summary = format!(
                "{} Audio generated for {} responses.",
                classroom.summary,
                voice::audio_count(&responses)
            );
            (responses, summary)
        }
        None => (classroom.responses, classroom.summary),
    };

    let payload = AskResponse { responses, summary };

    if params.stream_feedback {
        Ok(stream::feedback_sse(state, request, payload).into_response())
    } else {
        Ok(Json(payload).into_response())
    }
}

/// End a rehearsal session and receive the comprehensive report.
#[utoipa::path(
    post,
    path = "/lesson/end",
    request_body = EndSessionRequest,
    responses(
        (status = 200, description = "End-of-session report", body = Object),
        (status = 400, description = "Empty transcript", body = ErrorResponse),
        (status = 502, description = "Summary capability failed", body = ErrorResponse)
    )
)]
pub async fn end_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<EndSessionRequest>,
) -> Result<Response, ApiError> {
    let report = state
        .summarizer
        .summarize(&payload.lesson_context, &payload.transcript)
        .await?;
    Ok(Json(report).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_invalid_input_maps_to_400() {
        let err: ApiError = CoreError::InvalidInput("empty".to_string()).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_all_personas_failed_maps_to_502() {
        let err: ApiError = CoreError::AllPersonasFailed(5).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_analysis_failure_maps_to_502() {
        let err: ApiError = CoreError::AnalysisFailure(anyhow!("bad json")).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_opaque_errors_map_to_500() {
        let err: ApiError = anyhow!("boom").into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
