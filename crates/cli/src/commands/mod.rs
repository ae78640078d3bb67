pub mod chat;
pub mod config_cmd;
pub mod expenses;
pub mod onboard;
pub mod voice;

use std::sync::Arc;

use scout_agent::ConversationEngine;
use scout_config::AppConfig;
use scout_core::event::EventBus;
use scout_core::expense::ExpenseStore;
use tokio::sync::broadcast::error::RecvError;

/// Everything a chat or voice session needs, built from configuration.
pub struct Runtime {
    pub config: AppConfig,
    pub engine: ConversationEngine,
    pub expenses: Arc<dyn ExpenseStore>,
}

impl Runtime {
    pub async fn build(verbose: bool) -> Result<Self, Box<dyn std::error::Error>> {
        let config = load_config()?;

        if !config.has_api_key() && config.provider != "ollama" {
            eprintln!();
            eprintln!("  ERROR: No API key configured!");
            eprintln!();
            eprintln!("  Set one of these environment variables (or put it in .env):");
            eprintln!("    SCOUT_API_KEY=sk-...");
            eprintln!("    OPENAI_API_KEY=sk-...");
            eprintln!();
            eprintln!("  Or add api_key to {}", AppConfig::config_path().display());
            eprintln!();
            return Err("No API key found. See above for setup instructions.".into());
        }

        let provider = scout_providers::build_from_config(&config)?;
        let expenses = scout_store::open_expense_store(&config.store).await?;
        let checkpoints = scout_store::open_checkpoint_store(&config.checkpoint).await?;
        let tools = Arc::new(scout_tools::expense_registry(expenses.clone()));

        let event_bus = Arc::new(EventBus::default());
        if verbose {
            log_events(&event_bus);
        }

        let engine =
            ConversationEngine::from_config(&config, provider, tools, checkpoints, event_bus);

        Ok(Self {
            config,
            engine,
            expenses,
        })
    }
}

pub fn load_config() -> Result<AppConfig, String> {
    AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))
}

/// Log every domain event at debug level until the bus closes.
fn log_events(bus: &EventBus) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => tracing::debug!(event = ?event, "Domain event"),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event logger fell behind")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}
