use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Current effective configuration, after file and environment layering.
pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": {
            "server": {
                "host": config.server.host,
                "port": config.server.port,
                "port_fallback_attempts": config.server.port_fallback_attempts
            },
            "relay": {
                "strategy": config.relay.strategy.as_str(),
                "cooldown_ms": config.relay.cooldown_ms,
                "send_timeout_ms": config.relay.send_timeout_ms,
                "heartbeat_interval_secs": config.relay.heartbeat_interval_secs,
                "client_timeout_secs": config.relay.client_timeout_secs,
                "max_frame_bytes": config.relay.max_frame_bytes
            },
            "cyclic": {
                "accumulate_ms": config.cyclic.accumulate_ms,
                "hold_ms": config.cyclic.hold_ms
            },
            "energy": {
                "window_size": config.energy.window_size,
                "threshold": config.energy.threshold,
                "silence_ms": config.energy.silence_ms,
                "max_stored_chunks": config.energy.max_stored_chunks
            }
        }
    })))
}
