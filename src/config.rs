//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Deployment variables (HOST, PORT, OPENAI_API_KEY)
//! 2. Environment variables (APP_RELAY__COMMIT_THRESHOLD_FRAMES, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! Relay settings are read when a telephony connection arrives, so a runtime
//! update only affects pairs opened after it.

use crate::audio::resampler::{DownsampleMode, UpsampleMode};
use crate::audio::transcoder::SUPPORTED_TARGET_RATES;
use crate::relay::pair::{OverflowPolicy, UpstreamErrorPolicy};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Placeholder shown instead of the upstream credential when the
/// configuration is served over HTTP.
pub const REDACTED_CREDENTIAL: &str = "***";

/// Main application configuration that contains all settings.
///
/// ## Sections:
/// - **server**: where the HTTP/WebSocket listener binds
/// - **upstream**: how to reach and configure the realtime voice service
/// - **relay**: per-pair audio and flow-control behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub relay: RelayConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Realtime voice service connection and session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// WebSocket endpoint without the model query parameter
    pub url: String,
    pub model: String,
    /// Bearer credential; usually supplied through OPENAI_API_KEY
    pub api_key: String,
    pub voice: String,
    pub instructions: String,
    pub transcription_model: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "wss://api.openai.com/v1/realtime".to_string(),
            model: "gpt-4o-mini-realtime-preview-2024-12-17".to_string(),
            api_key: String::new(),
            voice: "alloy".to_string(),
            instructions: "You are a helpful AI assistant answering phone calls. \
                Be concise, friendly, and professional. Ask how you can help them."
                .to_string(),
            transcription_model: "whisper-1".to_string(),
        }
    }
}

/// Per-pair relay behavior.
///
/// ## Flow control:
/// - `commit_threshold_frames`: 20 frames ≈ 400ms, 25 frames ≈ 500ms
/// - `upstream_queue_capacity`: 256 frames ≈ 5s of telephony audio
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Upstream sample rate: 16000 or 24000
    pub target_sample_rate: u32,
    pub commit_threshold_frames: u32,
    /// Flush residual frames with a final commit when the call stops
    pub commit_on_stop: bool,
    pub upstream_error_policy: UpstreamErrorPolicy,
    pub upstream_queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    pub upsample_mode: UpsampleMode,
    pub downsample_mode: DownsampleMode,
    /// Path of the telephony WebSocket endpoint
    pub ws_path: String,
    /// Spoken by the telephony platform before the stream connects
    pub twiml_greeting: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000,
            commit_threshold_frames: 20,
            commit_on_stop: false,
            upstream_error_policy: UpstreamErrorPolicy::Lenient,
            upstream_queue_capacity: 256,
            overflow_policy: OverflowPolicy::DropFrame,
            upsample_mode: UpsampleMode::Auto,
            downsample_mode: DownsampleMode::Auto,
            ws_path: "/ws".to_string(),
            twiml_greeting: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),  // Localhost only (safe for development)
                port: 8080,
            },
            upstream: UpstreamConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__HOST=0.0.0.0`: Override server host
    /// - `APP_RELAY__TARGET_SAMPLE_RATE=24000`: Switch the upstream rate
    /// - `APP_RELAY__OVERFLOW_POLICY=close_pair`: Close pairs on backpressure
    /// - `HOST`, `PORT`: Special cases for deployment platforms
    /// - `OPENAI_API_KEY`: Upstream credential
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            // Double underscore separates nesting so field names keep their single underscores
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Ok(api_key) = env::var("OPENAI_API_KEY") {
            settings = settings.set_override("upstream.api_key", api_key)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// Every failure here is fatal at startup; nothing is retried later.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.upstream.api_key.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "Upstream API key is missing (set OPENAI_API_KEY or upstream.api_key)"
            ));
        }

        if self.upstream.url.trim().is_empty() || self.upstream.model.trim().is_empty() {
            return Err(anyhow::anyhow!("Upstream url and model must be set"));
        }

        if !SUPPORTED_TARGET_RATES.contains(&self.relay.target_sample_rate) {
            return Err(anyhow::anyhow!(
                "Target sample rate {} is not supported (expected one of {:?})",
                self.relay.target_sample_rate,
                SUPPORTED_TARGET_RATES
            ));
        }

        if self.relay.commit_threshold_frames == 0 {
            return Err(anyhow::anyhow!("Commit threshold must be greater than 0"));
        }

        if self.relay.upstream_queue_capacity == 0 {
            return Err(anyhow::anyhow!("Upstream queue capacity must be greater than 0"));
        }

        if !self.relay.ws_path.starts_with('/') {
            return Err(anyhow::anyhow!("WebSocket path must start with '/'"));
        }

        Ok(())
    }

    /// Apply a partial JSON update to the `upstream` and `relay` sections.
    ///
    /// The patch is deep-merged into the current settings, so
    /// `{"relay": {"commit_threshold_frames": 25}}` changes only the threshold.
    /// The server section is fixed once the listener is bound. A credential
    /// equal to [`REDACTED_CREDENTIAL`] is the masked value echoed back from
    /// a GET and leaves the current credential in place.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let mut patch: serde_json::Value = serde_json::from_str(json_str)?;
        let patch_sections = patch
            .as_object_mut()
            .ok_or_else(|| anyhow::anyhow!("Configuration update must be a JSON object"))?;

        if let Some(upstream) = patch_sections.get_mut("upstream").and_then(|u| u.as_object_mut()) {
            if upstream.get("api_key").and_then(|k| k.as_str()) == Some(REDACTED_CREDENTIAL) {
                upstream.remove("api_key");
            }
        }

        if let Some(section) = patch_sections.keys().find(|k| k.as_str() != "upstream" && k.as_str() != "relay") {
            return Err(anyhow::anyhow!("Section '{}' cannot be updated at runtime", section));
        }

        let mut merged = serde_json::to_value(&*self)?;
        merge_json(&mut merged, &patch);
        let updated: AppConfig = serde_json::from_value(merged)?;

        updated.validate()?;
        if updated.relay.ws_path != self.relay.ws_path {
            return Err(anyhow::anyhow!("WebSocket path is routed at startup and cannot change"));
        }
        *self = updated;
        Ok(())
    }
}

/// Recursively overlay `patch` onto `target`; non-object values replace.
fn merge_json(target: &mut serde_json::Value, patch: &serde_json::Value) {
    match (target, patch) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                match target_map.get_mut(key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        target_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}
