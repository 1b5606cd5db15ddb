//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources: the persona catalog and the rehearsal services
//! built on top of the generation and speech capabilities.

use crate::config::Config;
use rehearse_core::{
    analyzer::LessonAnalyzer, coaching::CoachingStreamer, coordinator::PersonaCoordinator,
    persona::PersonaCatalog, summary::SessionSummarizer, voice::VoiceSynthesizer,
};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<PersonaCatalog>,
    pub analyzer: Arc<LessonAnalyzer>,
    pub coordinator: Arc<PersonaCoordinator>,
    /// Absent when no TTS credentials are configured.
    pub voice: Option<Arc<VoiceSynthesizer>>,
    pub coach: Arc<CoachingStreamer>,
    pub summarizer: Arc<SessionSummarizer>,
    pub config: Arc<Config>,
}
