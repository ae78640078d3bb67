//! `scout chat`: interactive or single-message text chat.

use std::io::Write;

use scout_agent::{AgentError, ConversationEngine};
use scout_core::message::ThreadId;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::StreamExt;

use super::Runtime;
use super::expenses::print_expenses;

pub struct ChatOptions {
    pub message: Option<String>,
    pub thread: Option<String>,
    pub customer: Option<String>,
    pub show_expenses: bool,
    pub verbose: bool,
}

pub async fn run(opts: ChatOptions) -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::build(opts.verbose).await?;
    let thread = opts
        .thread
        .as_deref()
        .map(ThreadId::from)
        .unwrap_or_default();
    let customer = opts
        .customer
        .unwrap_or_else(|| rt.config.agent.customer_id.clone());

    let session = rt.engine.open_session(&thread, &customer).await?;
    if session.is_terminal() {
        return Err(format!("Thread {thread} has ended; start a new one").into());
    }
    // A resumed thread keeps its original customer.
    let customer = session.customer_id().to_string();

    if let Some(msg) = opts.message {
        stream_reply(&rt.engine, &thread, &msg).await?;
        if opts.show_expenses {
            print_expenses(rt.expenses.as_ref(), &customer).await?;
        }
        return Ok(());
    }

    println!();
    println!("  Scout, your expense assistant");
    println!();
    println!("  Provider:  {}", rt.config.provider);
    println!("  Model:     {}", rt.config.model);
    println!("  Customer:  {customer}");
    println!("  Thread:    {thread}");
    if !session.is_empty() {
        println!("  History:   {} messages", session.len());
    }
    println!();
    println!("  Type your message and press Enter.");
    println!(
        "  Type '/retry' to retry a failed reply, or '{}' to quit.",
        rt.config.agent.exit_phrases.first().map_or("exit", String::as_str)
    );
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if rt.config.agent.is_exit_phrase(line) {
            break;
        }

        let result = if line == "/retry" {
            retry(&rt.engine, &thread).await
        } else {
            stream_reply(&rt.engine, &thread, line).await
        };

        match result {
            Ok(()) => {}
            Err(e) if e.is_recoverable() => {
                eprintln!("\n  Error: {e}");
                eprintln!("  Type '/retry' to try again.");
            }
            Err(e) => return Err(e.into()),
        }

        if opts.show_expenses {
            println!();
            print_expenses(rt.expenses.as_ref(), &customer).await?;
        }

        if let Some(state) = rt.engine.session(&thread).await?
            && state.is_terminal()
        {
            break;
        }
        println!();
    }

    rt.engine.end_session(&thread).await?;
    println!("\n  Goodbye!");
    Ok(())
}

/// Run one turn, printing text and tool markers as they arrive.
async fn stream_reply(
    engine: &ConversationEngine,
    thread: &ThreadId,
    message: &str,
) -> Result<(), AgentError> {
    let mut stream = engine.run_turn(thread.clone(), message);
    let mut stdout = std::io::stdout();

    print!("\n  Scout > ");
    while let Some(item) = stream.next().await {
        let text = item?;
        print!("{text}");
        let _ = stdout.flush();
    }
    println!();
    Ok(())
}

async fn retry(engine: &ConversationEngine, thread: &ThreadId) -> Result<(), AgentError> {
    match engine.resume_turn(thread).await {
        Ok(outcome) => {
            println!("\n  Scout > {}", outcome.reply);
            Ok(())
        }
        Err(AgentError::NothingToResume(_)) => {
            println!("\n  Nothing to retry.");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
