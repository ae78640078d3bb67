//! OpenAI speech endpoints: Whisper transcription and TTS.

use async_trait::async_trait;
use scout_config::AppConfig;
use scout_core::error::VoiceError;
use scout_core::voice::{RecordedAudio, SpeechSynthesizer, Transcriber};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::playback::AudioPlayback;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Speech endpoints follow the chat endpoint only for an OpenAI provider
/// with an explicit URL; other providers have no speech API.
fn speech_base_url(config: &AppConfig) -> String {
    match (config.provider.as_str(), &config.api_url) {
        ("openai", Some(url)) => url.trim_end_matches('/').to_string(),
        _ => OPENAI_BASE_URL.to_string(),
    }
}

/// Remove markdown emphasis so it is not read aloud.
pub fn clean_for_speech(text: &str) -> String {
    text.replace("**", "")
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Speech-to-text via `/audio/transcriptions`.
pub struct OpenAiTranscriber {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiTranscriber {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: http_client(),
            base_url: OPENAI_BASE_URL.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, VoiceError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            VoiceError::TranscriptionFailed("no API key configured for speech-to-text".into())
        })?;
        Ok(Self::new(api_key, &config.voice.stt_model).with_base_url(speech_base_url(config)))
    }
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    fn name(&self) -> &str {
        "openai"
    }

    async fn transcribe(&self, audio: &RecordedAudio) -> Result<String, VoiceError> {
        if audio.is_empty() {
            return Ok(String::new());
        }

        let part = reqwest::multipart::Part::bytes(audio.to_wav())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| VoiceError::TranscriptionFailed(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .part("file", part);

        debug!(model = %self.model, secs = audio.duration_secs(), "Sending audio for transcription");
        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| VoiceError::TranscriptionFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::TranscriptionFailed(format!("HTTP {status}: {body}")));
        }

        let body: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::TranscriptionFailed(e.to_string()))?;
        Ok(body.text.trim().to_string())
    }
}

/// Text-to-speech via `/audio/speech`, played through an `AudioPlayback`.
pub struct OpenAiSpeech {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    voice: String,
    instructions: String,
    player: Arc<dyn AudioPlayback>,
}

impl OpenAiSpeech {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
        player: Arc<dyn AudioPlayback>,
    ) -> Self {
        Self {
            client: http_client(),
            base_url: OPENAI_BASE_URL.into(),
            api_key: api_key.into(),
            model: model.into(),
            voice: voice.into(),
            instructions: String::new(),
            player,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn from_config(config: &AppConfig, player: Arc<dyn AudioPlayback>) -> Result<Self, VoiceError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            VoiceError::SynthesisFailed("no API key configured for text-to-speech".into())
        })?;
        Ok(
            Self::new(api_key, &config.voice.tts_model, &config.voice.voice, player)
                .with_base_url(speech_base_url(config))
                .with_instructions(&config.voice.instructions),
        )
    }

    fn request_body(&self, input: &str) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "voice": self.voice,
            "input": input,
            "response_format": "pcm",
        });
        if !self.instructions.is_empty() {
            body["instructions"] = serde_json::Value::String(self.instructions.clone());
        }
        body
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeech {
    fn name(&self) -> &str {
        "openai"
    }

    async fn speak(&self, text: &str) -> Result<(), VoiceError> {
        let cleaned = clean_for_speech(text);
        if cleaned.trim().is_empty() {
            return Ok(());
        }

        debug!(model = %self.model, voice = %self.voice, chars = cleaned.len(), "Synthesizing speech");
        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.request_body(&cleaned))
            .send()
            .await
            .map_err(|e| VoiceError::SynthesisFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::SynthesisFailed(format!("HTTP {status}: {body}")));
        }

        let pcm = response
            .bytes()
            .await
            .map_err(|e| VoiceError::SynthesisFailed(e.to_string()))?;
        self.player.play(&pcm).await
    }
}
