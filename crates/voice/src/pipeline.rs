//! The push-to-talk voice loop: record, transcribe, run a turn, speak.

use scout_agent::{AgentError, ConversationEngine};
use scout_config::AppConfig;
use scout_core::error::VoiceError;
use scout_core::message::ThreadId;
use scout_core::voice::{RecordedAudio, SpeechSynthesizer, Transcriber};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::capture::{AudioCapture, CommandCapture};
use crate::openai::{OpenAiSpeech, OpenAiTranscriber};
use crate::playback::CommandPlayback;
use crate::stop::{StopListener, StopReason, StopSignal, is_exit_phrase};

#[derive(Debug, thiserror::Error)]
pub enum VoiceSessionError {
    #[error(transparent)]
    Voice(#[from] VoiceError),

    #[error(transparent)]
    Agent(#[from] AgentError),
}

/// What one pass through the voice loop produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceTurn {
    Replied { transcript: String, reply: String },
    /// Nothing was heard; no turn ran
    Skipped,
    /// The user asked to stop; the session has been ended
    Ended,
}

enum Recording {
    Captured(RecordedAudio),
    Exit,
}

pub struct VoicePipeline {
    engine: ConversationEngine,
    capture: Arc<dyn AudioCapture>,
    stop: Box<dyn StopListener>,
    transcriber: Arc<dyn Transcriber>,
    speaker: Arc<dyn SpeechSynthesizer>,
    exit_phrases: Vec<String>,
}

impl VoicePipeline {
    pub fn new(
        engine: ConversationEngine,
        capture: Arc<dyn AudioCapture>,
        stop: Box<dyn StopListener>,
        transcriber: Arc<dyn Transcriber>,
        speaker: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            engine,
            capture,
            stop,
            transcriber,
            speaker,
            exit_phrases: scout_config::AgentSettings::default().exit_phrases,
        }
    }

    pub fn with_exit_phrases(mut self, phrases: Vec<String>) -> Self {
        self.exit_phrases = phrases;
        self
    }

    /// Wire the pipeline to the configured recorder, player and OpenAI
    /// speech endpoints, with the terminal as the stop signal.
    pub fn from_config(config: &AppConfig, engine: ConversationEngine) -> Result<Self, VoiceError> {
        let capture = CommandCapture::from_config(&config.voice)?;
        let player = CommandPlayback::from_config(&config.voice)?;
        let transcriber = OpenAiTranscriber::from_config(config)?;
        let speaker = OpenAiSpeech::from_config(config, Arc::new(player))?;
        let phrases = config.agent.exit_phrases.clone();

        Ok(Self::new(
            engine,
            Arc::new(capture),
            Box::new(StopSignal::stdin(phrases.clone())),
            Arc::new(transcriber),
            Arc::new(speaker),
        )
        .with_exit_phrases(phrases))
    }

    /// Record, transcribe and answer one utterance on `thread_id`.
    pub async fn step(&mut self, thread_id: &ThreadId) -> Result<VoiceTurn, VoiceSessionError> {
        let audio = match self.record_until_stop().await? {
            Recording::Exit => return self.end(thread_id).await,
            Recording::Captured(audio) => audio,
        };
        if audio.is_empty() {
            debug!("No audio captured");
            return Ok(VoiceTurn::Skipped);
        }

        let transcript = self.transcriber.transcribe(&audio).await?;
        if transcript.is_empty() {
            debug!(secs = audio.duration_secs(), "Empty transcript");
            return Ok(VoiceTurn::Skipped);
        }
        info!(thread_id = %thread_id, chars = transcript.len(), "Transcribed utterance");

        if is_exit_phrase(&self.exit_phrases, &transcript) {
            return self.end(thread_id).await;
        }

        let outcome = self.engine.step_turn(thread_id, transcript.clone()).await?;
        if !outcome.reply.trim().is_empty() {
            self.speaker.speak(&outcome.reply).await?;
        }

        Ok(VoiceTurn::Replied {
            transcript,
            reply: outcome.reply,
        })
    }

    async fn end(&self, thread_id: &ThreadId) -> Result<VoiceTurn, VoiceSessionError> {
        match self.engine.end_session(thread_id).await {
            Ok(_) | Err(AgentError::UnknownSession(_)) => Ok(VoiceTurn::Ended),
            Err(e) => Err(e.into()),
        }
    }

    async fn record_until_stop(&mut self) -> Result<Recording, VoiceError> {
        let token = CancellationToken::new();
        let capture = self.capture.clone();
        let child = token.clone();
        let mut task = tokio::spawn(async move { capture.record(child).await });

        let reason = tokio::select! {
            reason = self.stop.wait() => reason,
            joined = &mut task => {
                // The recorder ended on its own.
                return joined
                    .map_err(|e| VoiceError::CaptureFailed(e.to_string()))?
                    .map(Recording::Captured);
            }
        };

        token.cancel();
        let audio = task
            .await
            .map_err(|e| VoiceError::CaptureFailed(e.to_string()))?;
        match reason {
            StopReason::Exit => Ok(Recording::Exit),
            StopReason::Stop => audio.map(Recording::Captured),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use scout_core::checkpoint::CheckpointStore;
    use scout_core::error::ProviderError;
    use scout_core::event::EventBus;
    use scout_core::message::Message;
    use scout_core::provider::{Provider, ProviderRequest, ProviderResponse};
    use scout_core::tool::ToolRegistry;
    use scout_store::InMemoryCheckpointStore;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct FixedCapture(Vec<i16>);

    #[async_trait]
    impl AudioCapture for FixedCapture {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn record(&self, stop: CancellationToken) -> Result<RecordedAudio, VoiceError> {
            stop.cancelled().await;
            Ok(RecordedAudio::new(self.0.clone(), 16_000))
        }
    }

    struct ScriptedStop(VecDeque<StopReason>);

    #[async_trait]
    impl StopListener for ScriptedStop {
        async fn wait(&mut self) -> StopReason {
            self.0.pop_front().unwrap_or(StopReason::Exit)
        }
    }

    struct ScriptedTranscriber(Mutex<VecDeque<String>>);

    #[async_trait]
    impl Transcriber for ScriptedTranscriber {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn transcribe(&self, _audio: &RecordedAudio) -> Result<String, VoiceError> {
            Ok(self.0.lock().unwrap().pop_front().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct RecordingSpeaker(Mutex<Vec<String>>);

    #[async_trait]
    impl SpeechSynthesizer for RecordingSpeaker {
        fn name(&self) -> &str {
            "recording"
        }
        async fn speak(&self, text: &str) -> Result<(), VoiceError> {
            self.0.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    struct EchoProvider;

    #[async_trait]
    impl Provider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }
        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            let heard = request
                .messages
                .last()
                .and_then(|m| m.text())
                .unwrap_or_default()
                .to_string();
            Ok(ProviderResponse {
                message: Message::assistant(format!("**Noted**: {heard}")),
                usage: None,
                model: "echo".into(),
                finish_reason: None,
            })
        }
    }

    struct Harness {
        pipeline: VoicePipeline,
        speaker: Arc<RecordingSpeaker>,
        checkpoints: Arc<InMemoryCheckpointStore>,
        thread: ThreadId,
    }

    async fn harness(samples: Vec<i16>, stops: Vec<StopReason>, transcripts: Vec<&str>) -> Harness {
        let checkpoints = Arc::new(InMemoryCheckpointStore::new());
        let engine = ConversationEngine::new(
            Arc::new(EchoProvider),
            "echo",
            Arc::new(ToolRegistry::new()),
            checkpoints.clone(),
            Arc::new(EventBus::default()),
        );
        let thread = ThreadId::from("voice-1");
        engine.open_session(&thread, "C1").await.unwrap();

        let speaker = Arc::new(RecordingSpeaker::default());
        let pipeline = VoicePipeline::new(
            engine,
            Arc::new(FixedCapture(samples)),
            Box::new(ScriptedStop(stops.into())),
            Arc::new(ScriptedTranscriber(Mutex::new(
                transcripts.into_iter().map(String::from).collect(),
            ))),
            speaker.clone(),
        )
        .with_exit_phrases(vec!["exit".into(), "goodbye".into()]);

        Harness {
            pipeline,
            speaker,
            checkpoints,
            thread,
        }
    }

    #[tokio::test]
    async fn utterance_runs_a_turn_and_is_spoken() {
        let mut h = harness(vec![1, 2, 3], vec![StopReason::Stop], vec!["I spent $20 on lunch"]).await;

        let turn = h.pipeline.step(&h.thread).await.unwrap();
        assert_eq!(
            turn,
            VoiceTurn::Replied {
                transcript: "I spent $20 on lunch".into(),
                reply: "**Noted**: I spent $20 on lunch".into(),
            }
        );
        assert_eq!(h.speaker.0.lock().unwrap().len(), 1);

        let state = h.checkpoints.get(&h.thread).await.unwrap().unwrap();
        assert_eq!(state.len(), 2);
    }

    #[tokio::test]
    async fn silence_is_skipped() {
        let mut h = harness(vec![], vec![StopReason::Stop], vec![]).await;
        assert_eq!(h.pipeline.step(&h.thread).await.unwrap(), VoiceTurn::Skipped);

        let mut h = harness(vec![5], vec![StopReason::Stop], vec![""]).await;
        assert_eq!(h.pipeline.step(&h.thread).await.unwrap(), VoiceTurn::Skipped);
        assert!(h.speaker.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn exit_signal_ends_session() {
        let mut h = harness(vec![1], vec![StopReason::Exit], vec![]).await;
        assert_eq!(h.pipeline.step(&h.thread).await.unwrap(), VoiceTurn::Ended);

        let state = h.checkpoints.get(&h.thread).await.unwrap().unwrap();
        assert!(state.is_terminal());
    }

    #[tokio::test]
    async fn spoken_exit_phrase_ends_session() {
        let mut h = harness(vec![1], vec![StopReason::Stop], vec!["Goodbye."]).await;
        assert_eq!(h.pipeline.step(&h.thread).await.unwrap(), VoiceTurn::Ended);
        assert!(h.speaker.0.lock().unwrap().is_empty());

        let state = h.checkpoints.get(&h.thread).await.unwrap().unwrap();
        assert!(state.is_terminal());
        assert_eq!(state.len(), 0);
    }
}
