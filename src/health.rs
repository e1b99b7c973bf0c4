//! # Health and Status Endpoints
//!
//! Informational endpoints for operators and uptime checks. None of them
//! touch a live call.
//!
//! ## Endpoints:
//! - **GET /**: plain-text liveness line
//! - **GET /ws-test**: the WebSocket URL the telephony platform should use
//! - **GET /health**, **GET /api/v1/health**: status, uptime and relay summary
//! - **GET /api/v1/metrics**: per-endpoint timings and relay counters

use crate::error::AppError;
use crate::state::{AppState, RelayMetrics};
use actix_web::{http::header, web, HttpRequest, HttpResponse};
use serde_json::json;
use std::process;

pub async fn root_status() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body("Voice Agent Server Running")
}

/// Where the telephony platform should connect, derived from the Host header.
pub async fn ws_info(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("missing Host header".to_string()))?;
    let ws_path = state.get_config().relay.ws_path;

    Ok(HttpResponse::Ok().json(json!({
        "message": format!("WebSocket endpoint is at {}", ws_path),
        "url": format!("wss://{}{}", host, ws_path),
        "status": "ready"
    })))
}

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();
    let uptime_seconds = state.get_uptime_seconds();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": if metrics.request_count > 0 {
                metrics.error_count as f64 / metrics.request_count as f64
            } else {
                0.0
            },
            "active_pairs": metrics.relay.active_pairs
        },
        "memory": get_memory_info(),
        "upstream": {
            "url": config.upstream.url,
            "model": config.upstream.model,
            "credential_configured": !config.upstream.api_key.is_empty()
        },
        "relay": {
            "target_sample_rate": config.relay.target_sample_rate,
            "commit_threshold_frames": config.relay.commit_threshold_frames,
            "ws_path": config.relay.ws_path
        }
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoint_stats = Vec::new();
    for (endpoint, metric) in metrics.endpoint_metrics.iter() {
        endpoint_stats.push(json!({
            "endpoint": endpoint,
            "request_count": metric.request_count,
            "error_count": metric.error_count,
            "error_rate": metric.error_rate(),
            "average_duration_ms": metric.average_duration_ms(),
            "total_duration_ms": metric.total_duration_ms
        }));
    }

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": if metrics.request_count > 0 {
                metrics.error_count as f64 / metrics.request_count as f64
            } else {
                0.0
            },
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "endpoints": endpoint_stats,
        "relay": relay_metrics_json(&metrics.relay),
        "memory": get_memory_info()
    }))
}

fn relay_metrics_json(relay: &RelayMetrics) -> serde_json::Value {
    json!({
        "active_pairs": relay.active_pairs,
        "pairs_opened": relay.pairs_opened,
        "pairs_closed": relay.pairs_closed,
        "frames_to_upstream": relay.frames_to_upstream,
        "frames_to_telephony": relay.frames_to_telephony,
        "commits": relay.commits,
        "frames_dropped": relay.frames_dropped,
        "decode_errors": relay.decode_errors,
        "upstream_failures": relay.upstream_failures
    })
}

fn get_memory_info() -> serde_json::Value {
    #[cfg(target_os = "linux")]
    {
        let pid = process::id();
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", pid)) {
            let mut vm_rss = 0;
            let mut vm_size = 0;

            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        vm_rss = kb_str.parse::<u64>().unwrap_or(0) * 1024;
                    }
                } else if line.starts_with("VmSize:") {
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        vm_size = kb_str.parse::<u64>().unwrap_or(0) * 1024;
                    }
                }
            }

            return json!({
                "resident_memory_bytes": vm_rss,
                "virtual_memory_bytes": vm_size,
                "available": true
            });
        }
    }

    json!({
        "resident_memory_bytes": 0,
        "virtual_memory_bytes": 0,
        "available": false,
        "pid": process::id()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use actix_web::{test, App};

    fn app_state() -> web::Data<AppState> {
        let mut config = AppConfig::default();
        config.upstream.api_key = "sk-test".to_string();
        web::Data::new(AppState::new(config))
    }

    #[actix_web::test]
    async fn test_root_status() {
        let app = test::init_service(App::new().route("/", web::get().to(root_status))).await;
        let req = test::TestRequest::get().uri("/").to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, "Voice Agent Server Running");
    }

    #[actix_web::test]
    async fn test_ws_info_uses_host_header() {
        let app = test::init_service(
            App::new()
                .app_data(app_state())
                .route("/ws-test", web::get().to(ws_info)),
        )
        .await;
        let req = test::TestRequest::get()
            .uri("/ws-test")
            .insert_header((header::HOST, "relay.example.com"))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["url"], "wss://relay.example.com/ws");
        assert_eq!(body["status"], "ready");
    }

    #[actix_web::test]
    async fn test_detailed_metrics_reports_relay_counters() {
        let state = app_state();
        state.pair_opened();
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .route("/metrics", web::get().to(detailed_metrics)),
        )
        .await;
        let req = test::TestRequest::get().uri("/metrics").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["relay"]["active_pairs"], 1);
        assert_eq!(body["relay"]["pairs_opened"], 1);
    }
}
