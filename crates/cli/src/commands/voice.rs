//! `scout voice`: push-to-talk conversation through the microphone.

use scout_agent::AgentError;
use scout_core::error::VoiceError;
use scout_core::message::ThreadId;
use scout_voice::{VoicePipeline, VoiceSessionError, VoiceTurn};

use super::Runtime;

pub async fn run(
    thread: Option<String>,
    customer: Option<String>,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::build(verbose).await?;
    let thread = thread.as_deref().map(ThreadId::from).unwrap_or_default();
    let customer = customer.unwrap_or_else(|| rt.config.agent.customer_id.clone());

    let session = rt.engine.open_session(&thread, &customer).await?;
    if session.is_terminal() {
        return Err(format!("Thread {thread} has ended; start a new one").into());
    }

    let mut pipeline = VoicePipeline::from_config(&rt.config, rt.engine.clone())?;

    println!();
    println!("  Scout voice mode");
    println!("  Customer:  {}", session.customer_id());
    println!("  Thread:    {thread}");
    println!();

    loop {
        println!("  Listening... press Enter to stop, or type 'exit' and Enter to quit.");

        match pipeline.step(&thread).await {
            Ok(VoiceTurn::Replied { transcript, reply }) => {
                println!("  You   > {transcript}");
                println!("  Scout > {reply}");
                println!();
            }
            Ok(VoiceTurn::Skipped) => println!("  (nothing heard)"),
            Ok(VoiceTurn::Ended) => break,
            Err(VoiceSessionError::Voice(VoiceError::DeviceUnavailable(e))) => {
                return Err(format!("Audio device unavailable: {e}").into());
            }
            Err(VoiceSessionError::Agent(AgentError::SessionTerminated(_))) => break,
            Err(e) => eprintln!("  Error: {e}"),
        }
    }

    println!("\n  Goodbye!");
    Ok(())
}
