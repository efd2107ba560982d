use crate::error::AppResult;
use crate::relay::{GetStatus, RelayHub, ResetTrigger};
use actix::Addr;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Ask the hub for its live view: strategy and its phase or window fill,
/// connections, stored audio and whether a broadcast cooldown is running.
pub async fn relay_status(hub: web::Data<Addr<RelayHub>>) -> AppResult<HttpResponse> {
    let status = hub.send(GetStatus).await?;

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "relay": status
    })))
}

pub async fn reset_relay(hub: web::Data<Addr<RelayHub>>) -> AppResult<HttpResponse> {
    hub.send(ResetTrigger).await?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Trigger reset",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}
