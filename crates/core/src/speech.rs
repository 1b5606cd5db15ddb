//! Speech-synthesis capability: a trait seam plus the Google Cloud
//! Text-to-Speech REST implementation used in production.

use crate::persona::VoiceSettings;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

/// A client for a speech-synthesis capability. Stateless per call; returns
/// binary MP3 audio.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechClient: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &VoiceSettings) -> Result<Vec<u8>>;
}

/// Google Cloud Text-to-Speech over its JSON REST API.
pub struct GoogleTtsClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}

impl GoogleTtsClient {
    const DEFAULT_ENDPOINT: &'static str = "https://texttospeech.googleapis.com/v1/text:synthesize";

    pub fn new(api_key: String) -> Self {
        Self::with_endpoint(Self::DEFAULT_ENDPOINT.to_string(), api_key)
    }

    /// Overridable endpoint for pointing tests at a local stub.
    pub fn with_endpoint(endpoint: String, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }
}

#[async_trait]
impl SpeechClient for GoogleTtsClient {
    async fn synthesize(&self, text: &str, voice: &VoiceSettings) -> Result<Vec<u8>> {
        let body = json!({
            "input": { "text": text },
            "voice": {
                "languageCode": voice.language_code,
                "name": voice.voice_name,
            },
            "audioConfig": {
                "audioEncoding": "MP3",
                "pitch": voice.pitch,
                "speakingRate": voice.speaking_rate,
            },
        });

        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .context("TTS request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("TTS returned {}: {}", status, detail));
        }

        let parsed: SynthesizeResponse = response
            .json()
            .await
            .context("TTS response was not valid JSON")?;

        base64::engine::general_purpose::STANDARD
            .decode(parsed.audio_content)
            .context("TTS audio content was not valid base64")
    }
}
