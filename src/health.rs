use crate::relay::RelayHub;
use crate::state::{AppMetrics, AppState};
use actix::Addr;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>, hub: web::Data<Addr<RelayHub>>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();
    let hub_alive = hub.connected();

    HttpResponse::Ok().json(json!({
        "status": if hub_alive { "healthy" } else { "degraded" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": "audio-relay-backend",
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "relay": {
            "strategy": config.relay.strategy.as_str(),
            "hub_running": hub_alive,
            "active_connections": metrics.active_connections
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": ratio(metrics.error_count, metrics.request_count)
        }
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let endpoint_stats: Vec<_> = metrics
        .endpoint_metrics
        .iter()
        .map(|(endpoint, metric)| {
            json!({
                "endpoint": endpoint,
                "request_count": metric.request_count,
                "error_count": metric.error_count,
                "error_rate": metric.error_rate(),
                "average_duration_ms": metric.average_duration_ms(),
                "total_duration_ms": metric.total_duration_ms
            })
        })
        .collect();

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": ratio(metrics.error_count, metrics.request_count),
            "requests_per_second": ratio(metrics.request_count, uptime_seconds)
        },
        "relay": relay_metrics(&metrics),
        "endpoints": endpoint_stats
    }))
}

fn relay_metrics(metrics: &AppMetrics) -> serde_json::Value {
    json!({
        "active_connections": metrics.active_connections,
        "chunks_ingested": metrics.chunks_ingested,
        "chunks_stored": metrics.chunks_stored,
        "decode_failures": metrics.decode_failures,
        "protocol_errors": metrics.protocol_errors,
        "broadcasts_sent": metrics.broadcasts_sent,
        "broadcasts_throttled": metrics.broadcasts_throttled,
        "send_failures": metrics.send_failures
    })
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole > 0 {
        part as f64 / whole as f64
    } else {
        0.0
    }
}
