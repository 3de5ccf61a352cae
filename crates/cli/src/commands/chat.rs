//! `leadline chat` — Interactive or single-message chat mode.

use futures::StreamExt;
use leadline_agent::{ChatEngine, StreamEvent};
use leadline_config::AppConfig;
use leadline_core::profile::{AgentProfile, ProfileProvider};
use leadline_lookup::HttpProfileProvider;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(
    agent_id: String,
    message: Option<String>,
    stream: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() && config.default_provider != "ollama" {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    LEADLINE_API_KEY = 'sk-...'");
        eprintln!("    OPENAI_API_KEY   = 'sk-...'");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let engine = leadline_gateway::build_engine(&config);
    let profile = resolve_profile(&HttpProfileProvider::from_config(&config.profile), &agent_id).await;

    if let Some(msg) = message {
        send(&engine, &agent_id, &profile, &msg, stream).await?;
        return Ok(());
    }

    println!();
    println!("  Leadline — Interactive Mode");
    println!();
    println!("  Agent:     {} ({})", profile.agent_name, agent_id);
    if !profile.location.is_empty() {
        println!("  Location:  {}", profile.location);
    }
    println!("  Listings:  {}", profile.listings.len());
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", config.default_model);
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
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
        if line == "exit" || line == "quit" {
            break;
        }

        if let Err(e) = send(&engine, &agent_id, &profile, line, stream).await {
            eprintln!("  [Error] {e}");
        }
        println!();
    }

    if let Some(session) = engine.sessions().get(&agent_id) {
        let usage = session.ledger();
        println!();
        println!(
            "  Session tokens: {} in, {} out, {} total",
            usage.input_tokens, usage.output_tokens, usage.total_tokens
        );
    }
    println!("  Goodbye!");
    Ok(())
}

async fn resolve_profile(profiles: &impl ProfileProvider, agent_id: &str) -> AgentProfile {
    match profiles.resolve(agent_id).await {
        Ok(profile) => profile,
        Err(e) => {
            tracing::warn!(agent_id = %agent_id, error = %e, "Profile lookup failed, using fallback");
            AgentProfile::fallback(agent_id)
        }
    }
}

async fn send(
    engine: &ChatEngine,
    agent_id: &str,
    profile: &AgentProfile,
    message: &str,
    stream: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !stream {
        eprint!("  Thinking...");
        let result = engine
            .process_message(agent_id, profile.clone(), message)
            .await;
        eprint!("\r              \r");
        let result = result?;
        println!("{}", result.final_text);
        eprintln!(
            "  [{} tokens: {} in, {} out]",
            result.total_tokens(),
            result.request_input_tokens,
            result.request_output_tokens
        );
        return Ok(());
    }

    let mut events = engine.stream_message(agent_id, profile.clone(), message);
    while let Some(event) = events.next().await {
        match event {
            StreamEvent::Fragment { content, .. } => {
                print!("{content}");
                std::io::stdout().flush()?;
            }
            StreamEvent::Fetching { query } => {
                println!();
                eprintln!("  [looking up: {query}]");
            }
            StreamEvent::Done {
                input_tokens,
                output_tokens,
                total_tokens,
                ..
            } => {
                println!();
                eprintln!("  [{total_tokens} tokens: {input_tokens} in, {output_tokens} out]");
            }
            StreamEvent::Error { message } => return Err(message.into()),
        }
    }
    Ok(())
}
