//! HTTP API gateway for Leadline.
//!
//! Exposes the chat engine over REST and Server-Sent Events, and runs the
//! background sweeper that evicts idle sessions.
//!
//! Built on Axum for high performance async HTTP.

pub mod api;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use leadline_agent::{ChatEngine, DispatchLoop, SessionStore};
use leadline_config::{AppConfig, GatewayConfig};
use leadline_core::event::EventBus;
use leadline_core::profile::ProfileProvider;
use leadline_lookup::{HttpFetchGateway, HttpProfileProvider};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub engine: Arc<ChatEngine>,
    pub profiles: Arc<dyn ProfileProvider>,
    pub enable_streaming: bool,
}

pub type SharedState = Arc<GatewayState>;

/// Build the full router.
///
/// Layers applied:
/// - CORS from the configured origins
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedState, gateway: &GatewayConfig) -> Router {
    api::api_router(state)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors_layer(&gateway.cors_origins))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// `*` mirrors the request origin; credentials rule out a literal wildcard.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o.trim() == "*") {
        AllowOrigin::mirror_request()
    } else {
        AllowOrigin::list(parse_origins(origins))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}

fn parse_origins(origins: &[String]) -> Vec<HeaderValue> {
    origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect()
}

/// Wire the chat engine from configuration: model factory, fetch gateway,
/// result processor, session store and event bus.
pub fn build_engine(config: &AppConfig) -> ChatEngine {
    let providers = leadline_providers::build_from_config(config);
    let processor = leadline_lookup::processor_from_config(config, providers.default());

    let dispatch = DispatchLoop::new(
        Arc::new(HttpFetchGateway::from_config(&config.fetch)),
        processor,
    );

    ChatEngine::new(
        Arc::new(SessionStore::from_config(&config.sessions)),
        leadline_providers::model_factory(config),
        dispatch,
        Arc::new(EventBus::default()),
    )
}

/// Periodically evict idle sessions.
pub fn spawn_sweeper(store: Arc<SessionStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = store.evict_idle(tokio::time::Instant::now());
            if evicted > 0 {
                info!(evicted, remaining = store.len(), "Session sweep");
            }
        }
    })
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let engine = Arc::new(build_engine(&config));
    let sweeper = spawn_sweeper(
        engine.sessions().clone(),
        Duration::from_secs(config.sessions.sweep_interval_secs),
    );

    let state = Arc::new(GatewayState {
        engine,
        profiles: Arc::new(HttpProfileProvider::from_config(&config.profile)),
        enable_streaming: config.gateway.enable_streaming,
    });
    let app = build_router(state, &config.gateway);

    info!(
        addr = %addr,
        provider = %config.default_provider,
        model = %config.default_model,
        streaming = config.gateway.enable_streaming,
        "Gateway starting"
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let served = axum::serve(listener, app).await;
    sweeper.abort();
    served?;

    Ok(())
}
