//! Incremental coaching feedback on the teacher's questioning technique.
//!
//! The underlying capability streams token output; this module re-packages
//! that stream into discrete, semantically complete insight events. The
//! model is instructed to emit NDJSON (one insight object per line and a
//! closing observation line), so event granularity is one coaching
//! observation, never one token.

use crate::context::{ConversationMessage, LessonContext};
use crate::coordinator::PersonaResponse;
use crate::llm_client::{LlmClient, LlmStream, LlmStreamEvent};
use crate::prompts;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

/// The fixed taxonomy of coaching categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedbackCategory {
    #[serde(rename = "Question Quality")]
    QuestionQuality,
    #[serde(rename = "Mathematical Reasoning")]
    MathematicalReasoning,
    #[serde(rename = "Connecting Ideas")]
    ConnectingIdeas,
    #[serde(rename = "Use of Representations")]
    UseOfRepresentations,
    #[serde(rename = "Precision of Language")]
    PrecisionOfLanguage,
    #[serde(rename = "Addressing Misconceptions")]
    AddressingMisconceptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackSeverity {
    Info,
    Suggestion,
    Concern,
}

/// One coaching observation, yielded in generation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackInsight {
    pub category: FeedbackCategory,
    pub message: String,
    pub severity: FeedbackSeverity,
}

/// Events on the coaching stream: zero or more insights followed by
/// exactly one terminal `Summary` or `Error`, never both.
#[derive(Debug, Clone)]
pub enum FeedbackEvent {
    Insight(FeedbackInsight),
    Summary { observation: String },
    Error { message: String },
}

/// A line of the model's NDJSON output.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CoachLine {
    Summary { overall_observation: String },
    Insight(FeedbackInsight),
}

/// Produces coaching feedback streams for completed exchanges.
pub struct CoachingStreamer {
    llm: Arc<dyn LlmClient>,
    /// Static system-prompt base loaded from the prompts directory.
    system_prompt: String,
}

impl CoachingStreamer {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: String) -> Self {
        Self { llm, system_prompt }
    }

    /// Starts a coaching analysis of the just-completed exchange.
    ///
    /// Returns immediately; the generation call runs in a background
    /// producer task that is aborted when the returned stream is dropped,
    /// so a consumer that stops reading mid-stream abandons the in-flight
    /// work without surfacing anything to the caller.
    pub fn stream(
        &self,
        prompt: &str,
        responses: &[PersonaResponse],
        context: Option<&LessonContext>,
        history: &[ConversationMessage],
    ) -> FeedbackStream {
        let user_content = prompts::interaction_block(prompt, responses, context, history);
        let system_prompt = self.system_prompt.clone();
        let llm = Arc::clone(&self.llm);

        let (tx, rx) = mpsc::channel(16);
        let handle = tokio::spawn(async move {
            produce(&*llm, system_prompt, user_content, tx).await;
        });

        FeedbackStream {
            inner: ReceiverStream::new(rx),
            handle,
        }
    }
}

/// A lazy, cancellable sequence of [`FeedbackEvent`]s.
///
/// Dropping the stream aborts the producer task; events already yielded
/// are unaffected.
pub struct FeedbackStream {
    inner: ReceiverStream<FeedbackEvent>,
    handle: JoinHandle<()>,
}

impl Stream for FeedbackStream {
    type Item = FeedbackEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for FeedbackStream {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn produce(
    llm: &dyn LlmClient,
    system_prompt: String,
    user_content: String,
    tx: mpsc::Sender<FeedbackEvent>,
) {
    let mut stream: LlmStream = match llm.generate_stream(system_prompt, user_content).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "Coaching stream failed to start");
            let _ = tx
                .send(FeedbackEvent::Error {
                    message: e.to_string(),
                })
                .await;
            return;
        }
    };

    let mut buffer = String::new();
    let mut observation: Option<String> = None;

    while let Some(event) = stream.next().await {
        let chunk = match event {
            Ok(LlmStreamEvent::TextChunk(chunk)) => chunk,
            Err(e) => {
                // Insights already flushed remain valid; the error event
                // takes the place of the terminal summary.
                warn!(error = %e, "Coaching stream failed mid-generation");
                let _ = tx
                    .send(FeedbackEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        buffer.push_str(&chunk);
        while let Some(pos) = buffer.find('\n') {
            let line: String = buffer.drain(..=pos).collect();
            match parse_line(line.trim()) {
                Some(CoachLine::Insight(insight)) => {
                    if tx.send(FeedbackEvent::Insight(insight)).await.is_err() {
                        // Consumer went away; abandon the rest.
                        return;
                    }
                }
                Some(CoachLine::Summary {
                    overall_observation,
                }) => observation = Some(overall_observation),
                None => {}
            }
        }
    }

    // Flush a final line the model did not terminate with a newline.
    match parse_line(buffer.trim()) {
        Some(CoachLine::Insight(insight)) => {
            if tx.send(FeedbackEvent::Insight(insight)).await.is_err() {
                return;
            }
            buffer.clear();
        }
        Some(CoachLine::Summary {
            overall_observation,
        }) => {
            observation = Some(overall_observation);
            buffer.clear();
        }
        None => {}
    }

    // The terminal event on the success path is always a summary; if the
    // model never produced an observation line, fall back to whatever
    // residual text it left, the way the original feedback parser did.
    let observation = observation.unwrap_or_else(|| {
        let residual = buffer.trim();
        if residual.is_empty() {
            "Coaching analysis complete.".to_string()
        } else {
            residual.chars().take(200).collect()
        }
    });
    let _ = tx.send(FeedbackEvent::Summary { observation }).await;
}

fn parse_line(line: &str) -> Option<CoachLine> {
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<CoachLine>(line) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            debug!(error = %e, line, "Skipping unparsable coaching line");
            None
        }
    }
}
