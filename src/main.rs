//! The Other Side - progressive conversation reveal engine
//!
//! Serves debate conversations over HTTP: user turns are sent to a chat
//! endpoint and the replies are revealed character by character.

mod api;
mod runtime;
mod state_machine;
mod submit;

use api::{create_router, AppState};
use runtime::{EngineConfig, RuntimeManager};
use std::net::SocketAddr;
use submit::SubmitConfig;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "other_side=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let port: u16 = std::env::var("OTHER_SIDE_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);

    let submit_config = SubmitConfig::from_env();
    let client = submit_config.build()?;
    if submit_config.endpoint.is_none() {
        tracing::warn!(
            "No chat endpoint configured. Set OTHER_SIDE_CHAT_ENDPOINT; replying with placeholders."
        );
    }

    let engine_config = EngineConfig::from_env();
    tracing::info!(
        endpoint = %client.endpoint(),
        reveal_interval_ms = %engine_config.reveal_interval.as_millis(),
        "Engine configured"
    );

    // Create application state
    let state = AppState::new(RuntimeManager::new(client, engine_config));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("The Other Side listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
