//! Voice onboarding server
//!
//! Hosts conversational onboarding sessions: a turn-taking controller per
//! session, driven over HTTP and streamed to the browser over SSE.

mod api;
mod config;
mod input;
mod presence;
mod runtime;
mod services;
mod state_machine;
mod transcript;

use api::{create_router, AppState};
use config::Config;
use runtime::SessionManager;
use std::net::SocketAddr;
use std::sync::Arc;
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
                .unwrap_or_else(|_| "voice_onboarding=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        voice_submit = ?config.session.voice_submit,
        speaking_fallback_ms = %config.session.speaking_fallback.as_millis(),
        generation_timeout_ms = %config.session.generation_timeout.as_millis(),
        idle_timeout_ms = %config.session.idle_timeout.as_millis(),
        "Configuration loaded"
    );

    let responder = services::responder_from_config(&config.responder)?;
    let sessions = Arc::new(SessionManager::new(config.session, responder));
    sessions.spawn_reaper();
    let state = AppState::new(sessions);

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Voice onboarding server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
