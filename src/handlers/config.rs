use crate::{
    config::{AppConfig, REDACTED_CREDENTIAL},
    error::AppError,
    state::AppState,
};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Serialize the configuration with the upstream credential masked.
fn redacted(config: &AppConfig) -> Result<serde_json::Value, AppError> {
    let mut value = serde_json::to_value(config)?;
    if let Some(api_key) = value.pointer_mut("/upstream/api_key") {
        let masked = if config.upstream.api_key.is_empty() { "" } else { REDACTED_CREDENTIAL };
        *api_key = json!(masked);
    }
    Ok(value)
}

pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": redacted(&config)?
    })))
}

/// Partial update of the `upstream` and `relay` sections.
///
/// Calls already in progress keep the settings they started with.
pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse, AppError> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut current_config = state.get_config();
    current_config
        .update_from_json(&json_str)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    state
        .update_config(current_config.clone())
        .map_err(AppError::BadRequest)?;

    tracing::info!("Configuration updated at runtime");

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Configuration updated successfully",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "updated_config": redacted(&current_config)?
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};

    fn app_state() -> web::Data<AppState> {
        let mut config = AppConfig::default();
        config.upstream.api_key = "sk-secret".to_string();
        web::Data::new(AppState::new(config))
    }

    #[actix_web::test]
    async fn test_get_config_redacts_credential() {
        let app = test::init_service(
            App::new()
                .app_data(app_state())
                .route("/config", web::get().to(get_config)),
        )
        .await;
        let req = test::TestRequest::get().uri("/config").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["config"]["upstream"]["api_key"], "***");
        assert_eq!(body["config"]["relay"]["commit_threshold_frames"], 20);
        assert!(!body.to_string().contains("sk-secret"));
    }

    #[actix_web::test]
    async fn test_update_config() {
        let state = app_state();
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .route("/config", web::put().to(update_config)),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/config")
            .set_json(json!({"relay": {"commit_threshold_frames": 25}}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        assert_eq!(state.get_config().relay.commit_threshold_frames, 25);

        let req = test::TestRequest::put()
            .uri("/config")
            .set_json(json!({"server": {"port": 9000}}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
        assert_eq!(state.get_config().server.port, 8080);
    }

    #[actix_web::test]
    async fn test_echoed_upstream_section_keeps_credential() {
        let state = app_state();
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .route("/config", web::get().to(get_config))
                .route("/config", web::put().to(update_config)),
        )
        .await;

        let req = test::TestRequest::get().uri("/config").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        let mut upstream = body["config"]["upstream"].clone();
        upstream["voice"] = json!("verse");

        let req = test::TestRequest::put()
            .uri("/config")
            .set_json(json!({ "upstream": upstream }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let config = state.get_config();
        assert_eq!(config.upstream.api_key, "sk-secret");
        assert_eq!(config.upstream.voice, "verse");
    }
}
