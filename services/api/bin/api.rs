//! Main Entrypoint for the Rehearse API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Loading the persona catalog and prompt templates.
//! 3. Initializing the generation and speech capability clients.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use rehearse_api::{
    config::{Config, Provider},
    router::create_router,
    state::AppState,
};
use rehearse_core::{
    analyzer::LessonAnalyzer,
    coaching::CoachingStreamer,
    coordinator::PersonaCoordinator,
    llm_client::{LlmClient, OpenAICompatibleClient},
    persona::PersonaCatalog,
    speech::{GoogleTtsClient, SpeechClient},
    summary::SessionSummarizer,
    voice::VoiceSynthesizer,
};
use std::{collections::HashMap, fs, net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Sampling temperature for the persona fan-out calls; personas should
/// vary between requests the way real students do.
const PERSONA_TEMPERATURE: f32 = 0.7;
/// Sampling temperature for the analysis calls, where consistency wins.
const ANALYSIS_TEMPERATURE: f32 = 0.4;

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// A helper function to load prompts from a directory.
fn load_prompts(prompts_path: &std::path::Path) -> anyhow::Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    for entry in std::fs::read_dir(prompts_path)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = fs::read_to_string(&path)?;
            prompts.insert(prompt_key, content);
        }
    }
    Ok(prompts)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Load Personas and Prompts ---
    let catalog = Arc::new(
        PersonaCatalog::load_from_dir(&config.personas_path)
            .context("Failed to load persona catalog")?,
    );
    info!(personas = catalog.len(), "Persona catalog loaded.");

    let prompts = load_prompts(&config.prompts_path)?;
    let analysis_prompt = prompts
        .get("lesson_analysis")
        .context("lesson_analysis.md not found in prompts directory")?
        .clone();
    let coaching_prompt = prompts
        .get("coaching")
        .context("coaching.md not found in prompts directory")?
        .clone();
    let summary_prompt = prompts
        .get("session_summary")
        .context("session_summary.md not found in prompts directory")?
        .clone();

    // --- 4. Initialize Capability Clients ---
    let openai_config = match &config.provider {
        Provider::OpenAI => {
            info!("Using OpenAI provider.");
            let api_key = config
                .openai_api_key
                .as_ref()
                .context("OPENAI_API_KEY missing after validation")?;
            OpenAIConfig::new()
                .with_api_key(api_key)
                .with_api_base("https://api.openai.com/v1/")
        }
        Provider::Gemini => {
            info!("Using Gemini provider.");
            let api_key = config
                .gemini_api_key
                .as_ref()
                .context("GEMINI_API_KEY missing after validation")?;
            OpenAIConfig::new()
                .with_api_key(api_key)
                .with_api_base("https://generativelanguage.googleapis.com/v1beta/openai")
        }
    };

    let persona_llm: Arc<dyn LlmClient> = Arc::new(OpenAICompatibleClient::new(
        openai_config.clone(),
        config.persona_model.clone(),
        PERSONA_TEMPERATURE,
    ));
    let analysis_llm: Arc<dyn LlmClient> = Arc::new(OpenAICompatibleClient::new(
        openai_config,
        config.analysis_model.clone(),
        ANALYSIS_TEMPERATURE,
    ));

    let voice = config.tts_api_key.as_ref().map(|key| {
        let speech: Arc<dyn SpeechClient> = Arc::new(GoogleTtsClient::new(key.clone()));
        Arc::new(VoiceSynthesizer::new(speech, Arc::clone(&catalog)))
    });
    if voice.is_none() {
        info!("No TTS_API_KEY configured; audio endpoints are disabled.");
    }

    // --- 5. Assemble Services ---
    let app_state = Arc::new(AppState {
        analyzer: Arc::new(LessonAnalyzer::new(
            Arc::clone(&analysis_llm),
            Arc::clone(&catalog),
            analysis_prompt,
        )),
        coordinator: Arc::new(PersonaCoordinator::new(
            Arc::clone(&catalog),
            persona_llm,
            config.persona_timeout,
        )),
        voice,
        coach: Arc::new(CoachingStreamer::new(
            Arc::clone(&analysis_llm),
            coaching_prompt,
        )),
        summarizer: Arc::new(SessionSummarizer::new(analysis_llm, summary_prompt)),
        catalog,
        config: Arc::new(config.clone()),
    });

    // --- 6. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 7. Start Server ---
    info!(
        provider = ?config.provider,
        persona_model = %config.persona_model,
        analysis_model = %config.analysis_model,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
