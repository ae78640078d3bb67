//! Voice mode for Scout.
//!
//! Audio is captured and played through external commands (`arecord` and
//! `aplay` by default), transcribed and synthesized through OpenAI's speech
//! endpoints, and fed through the same conversation engine as text chat.

pub mod capture;
pub mod openai;
pub mod pipeline;
pub mod playback;
pub mod stop;

pub use capture::{AudioCapture, CommandCapture};
pub use openai::{OpenAiSpeech, OpenAiTranscriber, clean_for_speech};
pub use pipeline::{VoicePipeline, VoiceSessionError, VoiceTurn};
pub use playback::{AudioPlayback, CommandPlayback};
pub use stop::{StopListener, StopReason, StopSignal, is_exit_phrase};
