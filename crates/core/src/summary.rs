//! End-of-session analysis: one deliberate, single-shot structured call
//! over the full transcript, in contrast to the cheap per-prompt fan-out.

use crate::context::{ConversationMessage, LessonContext};
use crate::error::CoreError;
use crate::llm_client::LlmClient;
use crate::prompts;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

/// What occurred during the lesson, in aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipationSummary {
    pub total_exchanges: u32,
    pub personas_called_on: Vec<String>,
    pub participation_pattern: String,
    pub key_moments: Vec<String>,
}

/// Concrete strategies for the teacher's next rehearsal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextSteps {
    pub immediate_actions: Vec<String>,
    pub practice_focus: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<String>>,
}

/// The comprehensive end-of-session report. Produced whole or not at all;
/// there is no partial-report state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub participation: ParticipationSummary,
    pub overall_feedback: String,
    pub strengths: Vec<String>,
    pub growth_areas: Vec<String>,
    pub next_steps: NextSteps,
    pub closing_remarks: String,
}

/// Generates the end-of-session report from the full transcript.
pub struct SessionSummarizer {
    llm: Arc<dyn LlmClient>,
    /// Static system-prompt base loaded from the prompts directory.
    system_prompt: String,
}

impl SessionSummarizer {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: String) -> Self {
        Self { llm, system_prompt }
    }

    /// Summarizes a completed session.
    ///
    /// Requires a non-empty transcript; fails with `AnalysisFailure` if
    /// the capability errors or its output cannot be parsed into a full
    /// [`SessionReport`].
    #[instrument(skip_all, fields(transcript_len = transcript.len()))]
    pub async fn summarize(
        &self,
        context: &LessonContext,
        transcript: &[ConversationMessage],
    ) -> Result<SessionReport, CoreError> {
        if transcript.is_empty() {
            return Err(CoreError::InvalidInput(
                "transcript must not be empty".to_string(),
            ));
        }

        let user_content = prompts::transcript_block(context, transcript);
        let raw = self
            .llm
            .generate_json(self.system_prompt.clone(), user_content)
            .await
            .map_err(CoreError::AnalysisFailure)?;

        let report: SessionReport = serde_json::from_str(&raw)
            .context("session summary output did not match the expected structure")
            .map_err(CoreError::AnalysisFailure)?;

        info!(
            exchanges = report.participation.total_exchanges,
            "Session report generated"
        );
        Ok(report)
    }
}
