//! `leadline config` — Configuration management commands.

use clap::Subcommand;
use leadline_config::AppConfig;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration (secrets removed)
    Show,
    /// Print the config file path
    Path,
    /// Load and validate the configuration
    Validate,
}

pub async fn run(action: Option<ConfigAction>) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        None => {
            print!("{}", AppConfig::default_toml());
            Ok(())
        }
        Some(ConfigAction::Show) => show(),
        Some(ConfigAction::Path) => {
            println!("{}", config_path().display());
            Ok(())
        }
        Some(ConfigAction::Validate) => validate(),
    }
}

fn config_path() -> std::path::PathBuf {
    AppConfig::config_dir().join("config.toml")
}

fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{}", toml::to_string_pretty(&without_secrets(config))?);
    Ok(())
}

fn without_secrets(mut config: AppConfig) -> AppConfig {
    config.api_key = None;
    for provider in config.providers.values_mut() {
        provider.api_key = None;
    }
    config
}

fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating {}", config_path().display());

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   Config parsed successfully");

    let mut warnings = Vec::new();
    if !config.has_api_key() {
        warnings.push("No API key set (set LEADLINE_API_KEY or OPENAI_API_KEY)");
    }
    if config.gateway.cors_origins.is_empty() {
        warnings.push("No CORS origins configured; browsers will be refused");
    }
    if config.embeddings.enabled && config.default_provider == "ollama" {
        warnings.push("Embeddings enabled on ollama; make sure the embedding model is pulled");
    }
    for w in &warnings {
        println!("   warning: {w}");
    }

    println!();
    println!("   Provider:   {}", config.default_provider);
    println!("   Model:      {}", config.default_model);
    println!("   Gateway:    {}:{}", config.gateway.host, config.gateway.port);
    println!("   Lookup:     {}", config.fetch.url);
    println!("   Profiles:   {}", config.profile.url);
    println!(
        "   Sessions:   max {}, idle ttl {}s",
        config.sessions.max_sessions, config.sessions.idle_ttl_secs
    );
    Ok(())
}
