//! `scout config`: show the effective configuration.

use scout_config::AppConfig;

use super::load_config;

pub async fn run(path_only: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_path();
    if path_only {
        println!("{}", config_path.display());
        return Ok(());
    }

    let config = load_config()?;
    println!("# {}", config_path.display());
    println!("{}", redacted_toml(&config)?);
    Ok(())
}

/// The config as TOML with the API key masked.
fn redacted_toml(config: &AppConfig) -> Result<String, toml::ser::Error> {
    let mut shown = config.clone();
    if shown.api_key.is_some() {
        shown.api_key = Some("***".into());
    }
    toml::to_string_pretty(&shown)
}
