//! Speaker output through an external player process.

use async_trait::async_trait;
use scout_config::VoiceConfig;
use scout_core::error::VoiceError;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::capture::expand_command;

/// A sink for synthesized speech.
#[async_trait]
pub trait AudioPlayback: Send + Sync {
    fn name(&self) -> &str;

    /// Play raw signed 16-bit mono PCM, returning when playback ends.
    async fn play(&self, pcm: &[u8]) -> Result<(), VoiceError>;
}

/// Pipes PCM into a player command's stdin.
pub struct CommandPlayback {
    program: String,
    args: Vec<String>,
}

impl CommandPlayback {
    pub fn new(command: &[String], sample_rate: u32) -> Result<Self, VoiceError> {
        let (program, args) = expand_command(command, sample_rate)
            .ok_or_else(|| VoiceError::DeviceUnavailable("no player command configured".into()))?;
        Ok(Self { program, args })
    }

    pub fn from_config(config: &VoiceConfig) -> Result<Self, VoiceError> {
        Self::new(&config.play_command, config.playback_sample_rate)
    }
}

#[async_trait]
impl AudioPlayback for CommandPlayback {
    fn name(&self) -> &str {
        "command"
    }

    async fn play(&self, pcm: &[u8]) -> Result<(), VoiceError> {
        if pcm.is_empty() {
            return Ok(());
        }

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                VoiceError::DeviceUnavailable(format!("cannot start '{}': {e}", self.program))
            })?;

        debug!(program = %self.program, bytes = pcm.len(), "Playback started");
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(pcm)
                .await
                .map_err(|e| VoiceError::PlaybackFailed(e.to_string()))?;
            // Closing stdin lets the player drain and exit.
            drop(stdin);
        }

        let status = child
            .wait()
            .await
            .map_err(|e| VoiceError::PlaybackFailed(e.to_string()))?;
        if !status.success() {
            return Err(VoiceError::PlaybackFailed(format!(
                "'{}' exited with {status}",
                self.program
            )));
        }
        Ok(())
    }
}
