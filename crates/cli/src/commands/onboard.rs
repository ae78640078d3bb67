//! `scout onboard`: first-time setup.

use scout_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = AppConfig::config_path();

    println!("Scout first-time setup");
    println!("======================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("  Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if write_default_config(&config_path)? {
        println!("  Created {}", config_path.display());
    } else {
        println!("  Config file exists, left unchanged: {}", config_path.display());
    }

    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if config.has_api_key() {
        println!("\n  API key found.");
    } else {
        println!("\n  Next steps:");
        println!("   1. Set SCOUT_API_KEY or OPENAI_API_KEY (a .env file works too)");
        println!("      or add api_key to {}", config_path.display());
        println!("   2. Run: scout chat");
    }

    println!("\n  Setup complete. Run `scout chat` or `scout voice` to start.\n");
    Ok(())
}

/// Write the default config unless a file is already there.
fn write_default_config(path: &std::path::Path) -> std::io::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    std::fs::write(path, AppConfig::default_toml())?;
    Ok(true)
}
