//! Microphone capture through an external recorder process.
//!
//! The recorder (by default `arecord`) writes raw signed 16-bit mono PCM
//! to stdout. Capture reads it in fixed-size buffers until the stop token
//! fires or the recorder exits.

use async_trait::async_trait;
use scout_config::VoiceConfig;
use scout_core::error::VoiceError;
use scout_core::voice::RecordedAudio;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Samples per read.
pub const CHUNK_SAMPLES: usize = 1024;

/// A source of recorded speech.
#[async_trait]
pub trait AudioCapture: Send + Sync {
    fn name(&self) -> &str;

    /// Record until `stop` is cancelled or the source ends on its own.
    async fn record(&self, stop: CancellationToken) -> Result<RecordedAudio, VoiceError>;
}

/// Split a command template into program and arguments, substituting
/// `{rate}`. Returns `None` for an empty template.
pub fn expand_command(template: &[String], rate: u32) -> Option<(String, Vec<String>)> {
    let rate = rate.to_string();
    let mut parts = template.iter().map(|p| p.replace("{rate}", &rate));
    let program = parts.next().filter(|p| !p.trim().is_empty())?;
    Some((program, parts.collect()))
}

/// Captures audio from a recorder command's stdout.
pub struct CommandCapture {
    program: String,
    args: Vec<String>,
    sample_rate: u32,
}

impl CommandCapture {
    pub fn new(command: &[String], sample_rate: u32) -> Result<Self, VoiceError> {
        let (program, args) = expand_command(command, sample_rate)
            .ok_or_else(|| VoiceError::DeviceUnavailable("no recorder command configured".into()))?;
        Ok(Self {
            program,
            args,
            sample_rate,
        })
    }

    pub fn from_config(config: &VoiceConfig) -> Result<Self, VoiceError> {
        Self::new(&config.record_command, config.sample_rate)
    }
}

#[async_trait]
impl AudioCapture for CommandCapture {
    fn name(&self) -> &str {
        "command"
    }

    async fn record(&self, stop: CancellationToken) -> Result<RecordedAudio, VoiceError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                VoiceError::DeviceUnavailable(format!("cannot start '{}': {e}", self.program))
            })?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| VoiceError::CaptureFailed("recorder stdout not captured".into()))?;

        debug!(program = %self.program, rate = self.sample_rate, "Recording started");

        let mut pcm = Vec::new();
        let mut buf = vec![0u8; CHUNK_SAMPLES * 2];
        let mut stopped = false;
        loop {
            tokio::select! {
                () = stop.cancelled() => {
                    stopped = true;
                    break;
                }
                read = stdout.read(&mut buf) => match read {
                    Ok(0) => break,
                    Ok(n) => pcm.extend_from_slice(&buf[..n]),
                    Err(e) => return Err(VoiceError::CaptureFailed(e.to_string())),
                },
            }
        }

        if stopped {
            let _ = child.kill().await;
        } else {
            let status = child
                .wait()
                .await
                .map_err(|e| VoiceError::CaptureFailed(e.to_string()))?;
            if !status.success() && pcm.is_empty() {
                return Err(VoiceError::DeviceUnavailable(format!(
                    "'{}' exited with {status}",
                    self.program
                )));
            }
        }

        let audio = RecordedAudio::from_le_bytes(&pcm, self.sample_rate);
        debug!(samples = audio.samples.len(), secs = audio.duration_secs(), "Recording stopped");
        Ok(audio)
    }
}
