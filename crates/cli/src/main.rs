//! Scout CLI, the main entry point.
//!
//! Commands:
//! - `chat`      Text chat, interactive or single-message
//! - `voice`     Push-to-talk voice chat
//! - `expenses`  Print a customer's expenses
//! - `onboard`   Write a default config file
//! - `config`    Show the effective configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "scout",
    about = "Scout: a voice and text assistant for tracking expenses",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (also logs domain events)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with Scout in the terminal
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Continue an existing conversation thread
        #[arg(long)]
        thread: Option<String>,

        /// Customer whose expenses the session manages
        #[arg(long)]
        customer: Option<String>,

        /// Print the customer's expenses after every turn
        #[arg(long)]
        show_expenses: bool,
    },

    /// Talk to Scout: press Enter to stop recording, type an exit phrase to quit
    Voice {
        #[arg(long)]
        thread: Option<String>,

        #[arg(long)]
        customer: Option<String>,
    },

    /// List a customer's expenses
    Expenses {
        #[arg(long)]
        customer: Option<String>,
    },

    /// Write a default configuration file
    Onboard,

    /// Show the effective configuration (API key redacted)
    Config {
        /// Print only the config file path
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // Logs go to stderr so replies on stdout stay clean.
    let filter = if cli.verbose { "debug" } else { "info" };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Chat {
            message,
            thread,
            customer,
            show_expenses,
        } => {
            commands::chat::run(commands::chat::ChatOptions {
                message,
                thread,
                customer,
                show_expenses,
                verbose: cli.verbose,
            })
            .await?
        }
        Commands::Voice { thread, customer } => {
            commands::voice::run(thread, customer, cli.verbose).await?
        }
        Commands::Expenses { customer } => commands::expenses::run(customer).await?,
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Config { path } => commands::config_cmd::run(path).await?,
    }

    Ok(())
}
