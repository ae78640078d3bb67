//! The "stop recording" signal read from the terminal.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{debug, warn};

/// Why a recording phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Stop recording and process what was captured
    Stop,
    /// Stop recording and end the session
    Exit,
}

/// Waits for the user to end a recording phase.
#[async_trait]
pub trait StopListener: Send {
    async fn wait(&mut self) -> StopReason;
}

/// Whether `text` is one of `phrases`, ignoring case, surrounding
/// whitespace and trailing punctuation ("Exit." counts as "exit").
pub fn is_exit_phrase(phrases: &[String], text: &str) -> bool {
    let text = text.trim().trim_end_matches(['.', '!', '?', ',']).trim();
    phrases.iter().any(|p| p.eq_ignore_ascii_case(text))
}

/// Line-based stop signal: an empty line stops, an exit phrase (or EOF)
/// ends the session, anything else is ignored.
pub struct StopSignal<R> {
    lines: Lines<R>,
    exit_phrases: Vec<String>,
}

impl StopSignal<BufReader<Stdin>> {
    pub fn stdin(exit_phrases: Vec<String>) -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), exit_phrases)
    }
}

impl<R: AsyncBufRead + Unpin> StopSignal<R> {
    pub fn new(reader: R, exit_phrases: Vec<String>) -> Self {
        Self {
            lines: reader.lines(),
            exit_phrases,
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> StopListener for StopSignal<R> {
    async fn wait(&mut self) -> StopReason {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        return StopReason::Stop;
                    }
                    if is_exit_phrase(&self.exit_phrases, line) {
                        return StopReason::Exit;
                    }
                    debug!(input = %line, "Ignoring typed input while recording");
                }
                Ok(None) => return StopReason::Exit,
                Err(e) => {
                    warn!(error = %e, "Stop listener failed; ending session");
                    return StopReason::Exit;
                }
            }
        }
    }
}
