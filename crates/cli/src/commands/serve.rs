//! `leadline serve` — Start the HTTP API server.

use leadline_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    if !config.has_api_key() {
        tracing::warn!("No API key configured; model calls will fail unless the provider needs none");
    }

    println!("Leadline Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Provider:  {} ({})", config.default_provider, config.default_model);
    println!("   Lookup:    {}", config.fetch.url);
    println!("   Streaming: {}", config.gateway.enable_streaming);

    leadline_gateway::start(config).await?;

    Ok(())
}
