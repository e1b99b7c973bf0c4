//! # Telephony Voice Relay - Main Application Entry Point
//!
//! Bridges telephony media streams (8 kHz mu-law over WebSocket) to a
//! realtime voice service (16/24 kHz PCM16 over WebSocket) and back.
//!
//! ## Key Rust Concepts Used:
//! - **async/await**: every socket and request is served on the async runtime
//! - **actors**: each telephony connection is an actix actor that owns its call state
//! - **Result<T, E>**: startup failures propagate with `?` and end the process
//! - **Arc & RwLock**: configuration and metrics are shared across workers
//!
//! ## Application Architecture:
//! - **config**: Application configuration (TOML file + environment variables)
//! - **state**: Shared configuration and metrics
//! - **audio**: mu-law codec, resampling and transcoding
//! - **relay**: event protocols, commit batching, session pairs, upstream client
//! - **websocket**: one actor per telephony connection
//! - **health**, **handlers**: diagnostic and call-instruction endpoints
//! - **middleware**: request logging and metrics
//! - **error**: HTTP and relay error types

// Module declarations
mod audio;       // Codec, resampler and transcoder (audio/ directory)
mod config;      // Configuration management (config.rs)
mod error;       // HTTP and relay error types (error.rs)
mod handlers;    // Config and TwiML handlers (handlers/ directory)
mod health;      // Status, health and metrics endpoints (health.rs)
mod middleware;  // Request logging and metrics (middleware/ directory)
mod relay;       // Session pairs and the upstream client (relay/ directory)
mod state;       // Shared application state (state.rs)
mod websocket;   // Telephony WebSocket actor (websocket.rs)

use actix_cors::Cors;  // Cross-Origin Resource Sharing support
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use config::AppConfig;
use state::AppState;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;  // Span per HTTP request
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** from `.env`, `config.toml` and the environment
/// 2. **Sets up logging** with tracing
/// 3. **Creates shared state** for handlers, middleware and call actors
/// 4. **Configures the HTTP server** with middleware, the telephony
///    WebSocket route and the diagnostic routes
/// 5. **Handles graceful shutdown** on SIGTERM or SIGINT
///
/// ## Error Handling:
/// A missing credential or an invalid relay setting fails here, before the
/// listener is bound.
#[actix_web::main]
async fn main() -> Result<()> {
    // It's fine if there's no .env file
    dotenv::dotenv().ok();

    init_tracing()?;

    // Defaults, then config.toml, then APP_* and deployment variables
    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info!(
        host = %config.server.host,
        port = config.server.port,
        target_sample_rate = config.relay.target_sample_rate,
        commit_threshold_frames = config.relay.commit_threshold_frames,
        upstream_model = %config.upstream.model,
        "Configuration loaded"
    );

    // Shared by every worker; call actors read relay settings from it on connect
    let app_state = AppState::new(config.clone());
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let ws_path = config.relay.ws_path.clone();

    info!("Starting HTTP server on {} (telephony stream at {})", bind_addr, ws_path);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()    // Diagnostic endpoints are read from browsers
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);        // Cache preflight for 1 hour

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            // Middleware executes in reverse order for responses
            .wrap(cors)                                    // Handle CORS
            .wrap(TracingLogger::default())                // Request spans
            .wrap(middleware::MetricsMiddleware)           // Per-endpoint counters
            .wrap(middleware::RequestLogging)              // Custom request logging
            // Telephony media stream; upgraded to a WebSocket actor per call
            .route(&ws_path, web::get().to(websocket::telephony_websocket))
            .route("/", web::get().to(health::root_status))
            .route("/ws-test", web::get().to(health::ws_info))
            // Call instructions fetched by the telephony platform
            .route("/twiml", web::post().to(handlers::twiml))
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config))
                    .route("/config", web::put().to(handlers::update_config)),
            )
            // Also provide health check at root level for convenience
            .route("/health", web::get().to(health::health_check))
    })
    .bind(&bind_addr)?
    .run();

    // Keep a handle so the signal branch can stop the server
    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    // Whichever finishes first wins: the server exiting or a shutdown signal

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        signal = wait_for_shutdown() => {
            if let Err(e) = signal {
                warn!("Signal handling failed, shutting down: {}", e);
            }
            info!("Shutdown signal received, stopping server...");
            // Open calls are dropped with their connections
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize tracing. `RUST_LOG` overrides the default filter.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "telephony_voice_relay=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

/// Resolve on SIGTERM or SIGINT (Ctrl+C).
async fn wait_for_shutdown() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
    }

    Ok(())
}
