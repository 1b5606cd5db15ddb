//! Optional post-step that voices persona responses through the speech
//! capability, one concurrent call per persona.

use crate::coordinator::PersonaResponse;
use crate::error::CoreError;
use crate::persona::PersonaCatalog;
use crate::speech::SpeechClient;
use base64::Engine;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{instrument, warn};

/// Attaches synthesized audio to persona responses.
pub struct VoiceSynthesizer {
    speech: Arc<dyn SpeechClient>,
    catalog: Arc<PersonaCatalog>,
}

impl VoiceSynthesizer {
    pub fn new(speech: Arc<dyn SpeechClient>, catalog: Arc<PersonaCatalog>) -> Self {
        Self { speech, catalog }
    }

    /// Synthesizes audio for every response with non-empty text.
    ///
    /// Synthesis calls run concurrently across personas. A failure for one
    /// persona leaves only that persona's audio absent; the text responses
    /// already computed are never dropped and the batch never fails.
    #[instrument(skip_all, fields(responses = responses.len()))]
    pub async fn synthesize(&self, responses: Vec<PersonaResponse>) -> Vec<PersonaResponse> {
        let tasks = responses.into_iter().map(|mut response| async move {
            if response.response.trim().is_empty() {
                return response;
            }
            let Some(persona) = self.catalog.get(&response.persona_id) else {
                warn!(persona = %response.persona_id, "No catalog entry for response; skipping audio");
                return response;
            };
            match self.speech.synthesize(&response.response, &persona.voice).await {
                Ok(audio) => {
                    response.audio_base64 =
                        Some(base64::engine::general_purpose::STANDARD.encode(audio));
                }
                Err(source) => {
                    let failure = CoreError::AudioFailure(source);
                    warn!(persona = %response.persona_id, error = %failure, "Audio degraded");
                }
            }
            response
        });

        join_all(tasks).await
    }
}

/// Counts responses that carry audio, for the with-audio summary line.
pub fn audio_count(responses: &[PersonaResponse]) -> usize {
    responses
        .iter()
        .filter(|r| r.audio_base64.is_some())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::test_persona;
    use crate::speech::MockSpeechClient;

    fn catalog() -> Arc<PersonaCatalog> {
        Arc::new(
            PersonaCatalog::new(vec![test_persona("a", "Ada"), test_persona("b", "Bea")]).unwrap(),
        )
    }

    fn response(id: &str, name: &str, text: &str) -> PersonaResponse {
        PersonaResponse {
            persona_id: id.to_string(),
            persona_name: name.to_string(),
            would_participate: true,
            confidence: 0.8,
            thinking: "thinking".to_string(),
            response: text.to_string(),
            audio_base64: None,
        }
    }

    #[tokio::test]
    async fn test_audio_attached_to_all_responses() {
        let mut mock = MockSpeechClient::new();
        mock.expect_synthesize()
            .times(2)
            .returning(|_, _| Ok(vec![1, 2, 3]));

        let synthesizer = VoiceSynthesizer::new(Arc::new(mock), catalog());
        let out = synthesizer
            .synthesize(vec![response("a", "Ada", "hi"), response("b", "Bea", "yo")])
            .await;

        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| r.audio_base64.is_some()));
        assert_eq!(audio_count(&out), 2);
    }

    #[tokio::test]
    async fn test_one_failure_degrades_only_that_audio() {
        let mut mock = MockSpeechClient::new();
        mock.expect_synthesize().returning(|text, _| {
            if text.contains("fail") {
                Err(anyhow::anyhow!("tts unavailable"))
            } else {
                Ok(vec![0u8; 4])
            }
        });

        let synthesizer = VoiceSynthesizer::new(Arc::new(mock), catalog());
        let out = synthesizer
            .synthesize(vec![
                response("a", "Ada", "please fail"),
                response("b", "Bea", "fine"),
            ])
            .await;

        assert_eq!(out.len(), 2);
        assert!(out[0].audio_base64.is_none());
        assert!(out[1].audio_base64.is_some());
        // Text survives the audio failure.
        assert_eq!(out[0].response, "please fail");
        assert_eq!(audio_count(&out), 1);
    }

    #[tokio::test]
    async fn test_empty_text_skips_synthesis() {
        let mut mock = MockSpeechClient::new();
        mock.expect_synthesize()
            .times(1)
            .returning(|_, _| Ok(vec![9]));

        let synthesizer = VoiceSynthesizer::new(Arc::new(mock), catalog());
        let out = synthesizer
            .synthesize(vec![response("a", "Ada", "  "), response("b", "Bea", "hi")])
            .await;

        assert!(out[0].audio_base64.is_none());
        assert!(out[1].audio_base64.is_some());
    }

    #[tokio::test]
    async fn test_unknown_persona_skipped() {
        let mock = MockSpeechClient::new();
        let synthesizer = VoiceSynthesizer::new(Arc::new(mock), catalog());
        let out = synthesizer
            .synthesize(vec![response("zz", "Ghost", "boo")])
            .await;
        assert!(out[0].audio_base64.is_none());
    }
}
