//! # Audio Relay Backend - Main Application Entry Point
//!
//! WebSocket relay that collects short audio chunks from connected clients and
//! plays them back to everyone according to a trigger strategy.
//!
//! ## Application Architecture:
//! - **config**: Layered configuration (defaults, `config.toml`, environment)
//! - **state**: Shared configuration, metrics and start time
//! - **audio**: Chunk decoding, loudness and buffering primitives
//! - **trigger**: When to broadcast (cyclic or energy-gated)
//! - **relay**: The hub actor, connection registry, cooldown and fan-out
//! - **protocol**: JSON frames exchanged over the socket
//! - **websocket**: One actor per client connection
//! - **health / handlers / middleware**: The HTTP surface around the relay

mod audio;
mod config;
mod error;
mod handlers;
mod health;
mod middleware;
mod protocol;
mod relay;
mod state;
mod trigger;
mod websocket;

use actix::Actor;
use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use crate::config::AppConfig;
use crate::relay::RelayHub;
use crate::state::AppState;
use std::io::ErrorKind;
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Set once SIGTERM or SIGINT arrives.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting audio-relay-backend v{}", env!("CARGO_PKG_VERSION"));
    info!(
        strategy = config.relay.strategy.as_str(),
        cooldown_ms = config.relay.cooldown_ms,
        "Configuration loaded: {}:{}",
        config.server.host,
        config.server.port
    );

    let app_state = AppState::new(config.clone());

    // One hub for the whole server: every connection feeds the same trigger.
    let engine = trigger::build(&config, Instant::now());
    let hub = RelayHub::new(
        engine,
        config.relay.cooldown(),
        config.relay.send_timeout(),
        app_state.clone(),
    )
    .start();

    setup_signal_handlers();

    let listener = bind_with_fallback(&config)?;
    info!("Starting HTTP server on {}", listener.local_addr()?);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::Data::new(hub.clone()))
            .wrap(cors)
            .wrap(middleware::RequestMetrics)
            .wrap(TracingLogger::default())
            .route("/ws", web::get().to(websocket::relay_websocket))
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config))
                    .route("/relay", web::get().to(handlers::relay_status))
                    .route("/relay/reset", web::post().to(handlers::reset_relay)),
            )
            .route("/health", web::get().to(health::health_check))
    })
    .listen(listener)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// `RUST_LOG` wins; otherwise debug for this crate and info for actix-web.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "audio_relay_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Bind the configured port, or the next free one within
/// `port_fallback_attempts`. Only "address in use" moves on to the next port;
/// any other bind error, or running out of ports, is fatal.
fn bind_with_fallback(config: &AppConfig) -> Result<TcpListener> {
    let host = config.server.host.as_str();
    let first = config.server.port;
    let last = first.saturating_add(config.server.port_fallback_attempts);

    let mut last_error = None;
    for port in first..=last {
        match TcpListener::bind((host, port)) {
            Ok(listener) => {
                if port != first {
                    warn!(requested = first, bound = port, "Configured port unavailable, using fallback");
                }
                return Ok(listener);
            }
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                warn!(port, error = %e, "Port in use");
                last_error = Some(e);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("could not bind {}:{}", host, port));
            }
        }
    }

    let err = last_error.map(anyhow::Error::from).unwrap_or_else(|| anyhow::anyhow!("no ports to try"));
    Err(err).with_context(|| format!("could not bind {} on ports {}..={}", host, first, last))
}

fn setup_signal_handlers() {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async {
        let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to install signal handlers: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_falls_back_to_next_port() {
        let taken = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let mut config = AppConfig::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = taken.local_addr().unwrap().port();
        config.server.port_fallback_attempts = 5;

        let listener = bind_with_fallback(&config).unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), config.server.port);
    }

    #[test]
    fn test_bind_fails_without_fallback() {
        let taken = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let mut config = AppConfig::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = taken.local_addr().unwrap().port();
        config.server.port_fallback_attempts = 0;

        let err = bind_with_fallback(&config).unwrap_err();
        let cause = err.downcast_ref::<std::io::Error>().unwrap();
        assert_eq!(cause.kind(), ErrorKind::AddrInUse);
    }

    #[test]
    fn test_bind_stops_on_non_retryable_error() {
        // TEST-NET-1 is never assigned to a local interface.
        let mut config = AppConfig::default();
        config.server.host = "192.0.2.1".to_string();
        config.server.port = 18000;
        config.server.port_fallback_attempts = 5;

        let err = bind_with_fallback(&config).unwrap_err();
        assert_eq!(err.to_string(), "could not bind 192.0.2.1:18000");
        let cause = err.downcast_ref::<std::io::Error>().unwrap();
        assert_ne!(cause.kind(), ErrorKind::AddrInUse);
    }
}
