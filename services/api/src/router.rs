//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, the SSE ask mode, and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        AskRequest, AskResponse, EndSessionRequest, ErrorResponse, HealthResponse,
        LessonSetupRequest, PersonaSummary, PersonasResponse,
    },
    state::AppState,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::list_personas,
        handlers::setup_lesson,
        handlers::ask,
        handlers::ask_with_audio,
        handlers::end_session,
    ),
    components(
        schemas(
            HealthResponse,
            PersonasResponse,
            PersonaSummary,
            LessonSetupRequest,
            AskRequest,
            AskResponse,
            EndSessionRequest,
            ErrorResponse
        )
    ),
    tags(
        (name = "Rehearse API", description = "Parallel student-persona simulation for teacher rehearsal")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route("/", get(handlers::health))
        .route("/personas", get(handlers::list_personas))
        .route("/lesson/setup", post(handlers::setup_lesson))
        .route("/lesson/end", post(handlers::end_session))
        .route("/ask", post(handlers::ask))
        .route("/ask/with-audio", post(handlers::ask_with_audio))
        // Apply the state ONLY to this group of routes.
        .with_state(app_state);

    // Create the final router that merges the stateful routes
    // with the stateless routes (like Swagger UI).
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
