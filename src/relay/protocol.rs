//! # Event Protocol Adapter
//!
//! Structural translation between the two JSON wire vocabularies and typed
//! relay actions. No audio is transformed here and no relay decisions are
//! made; payloads are only base64 decoded/encoded.
//!
//! ## Telephony Side (`event` field):
//! - **Inbound**: `start`, `media`, `stop` (everything else is ignored)
//! - **Outbound**: `media` tagged with the stream identifier
//!
//! ## Upstream Side (`type` field):
//! - **Outbound**: `session.update`, `input_audio_buffer.append`, `input_audio_buffer.commit`
//! - **Inbound**: `session.created`, `response.audio.delta`, `error` (everything else is ignored)
//!
//! ## Error Rules:
//! Unknown event types decode to an `Ignored` action. Text that is not JSON,
//! a known event with a broken shape, and undecodable base64 are returned as
//! `RelayError` decode errors.

use crate::error::RelayError;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Telephony vocabulary
// ---------------------------------------------------------------------------

/// Telephony events as they appear on the wire.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum TelephonyWireEvent {
    Start { start: StartMetadata },
    Media { media: MediaPayload },
    Stop,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartMetadata {
    stream_sid: String,
    #[serde(default)]
    call_sid: Option<String>,
    #[serde(default)]
    media_format: Option<MediaFormat>,
}

/// Audio format announced by the telephony side in its start event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFormat {
    pub encoding: String,
    pub sample_rate: u32,
    pub channels: u32,
}

#[derive(Debug, Deserialize)]
struct MediaPayload {
    payload: String,
    #[serde(default)]
    track: Option<String>,
}

/// Decoded telephony stream start.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamStart {
    pub stream_sid: String,
    pub call_sid: Option<String>,
    pub media_format: Option<MediaFormat>,
}

/// One inbound telephony frame with its mu-law bytes already base64 decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFrame {
    pub mulaw: Vec<u8>,
    pub track: Option<String>,
}

/// Typed action produced from an inbound telephony event.
#[derive(Debug, Clone, PartialEq)]
pub enum TelephonyAction {
    Start(StreamStart),
    Media(MediaFrame),
    Stop,
    /// `connected`, `mark`, `dtmf` and any unrecognized event
    Ignored,
}

/// Decode one inbound telephony text frame.
pub fn decode_telephony_event(text: &str) -> Result<TelephonyAction, RelayError> {
    let value: Value = serde_json::from_str(text)?;
    if !value.get("event").map_or(false, Value::is_string) {
        return Ok(TelephonyAction::Ignored);
    }

    let action = match serde_json::from_value::<TelephonyWireEvent>(value)? {
        TelephonyWireEvent::Start { start } => TelephonyAction::Start(StreamStart {
            stream_sid: start.stream_sid,
            call_sid: start.call_sid,
            media_format: start.media_format,
        }),
        TelephonyWireEvent::Media { media } => TelephonyAction::Media(MediaFrame {
            mulaw: STANDARD.decode(media.payload.as_bytes())?,
            track: media.track,
        }),
        TelephonyWireEvent::Stop => TelephonyAction::Stop,
        TelephonyWireEvent::Other => TelephonyAction::Ignored,
    };

    Ok(action)
}

/// Outbound telephony events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyOutbound {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMedia {
    pub payload: String,
}

impl TelephonyOutbound {
    /// Build a media event carrying mu-law bytes for the given stream.
    pub fn media(stream_sid: &str, mulaw: &[u8]) -> Self {
        TelephonyOutbound::Media {
            stream_sid: stream_sid.to_string(),
            media: OutboundMedia {
                payload: STANDARD.encode(mulaw),
            },
        }
    }

    pub fn to_json(&self) -> Result<String, RelayError> {
        Ok(serde_json::to_string(self)?)
    }
}

// ---------------------------------------------------------------------------
// Upstream vocabulary
// ---------------------------------------------------------------------------

/// Transcription settings sent inside `session.update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputTranscription {
    pub model: String,
}

/// Session configuration sent once, right after the upstream connection opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub modalities: Vec<String>,
    pub instructions: String,
    pub voice: String,
    pub input_audio_format: String,
    pub output_audio_format: String,
    pub input_audio_sample_rate: u32,
    pub output_audio_sample_rate: u32,
    pub input_audio_transcription: InputTranscription,
}

/// Commands sent to the upstream session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum UpstreamCommand {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },

    #[serde(rename = "input_audio_buffer.append")]
    AppendAudio { audio: String },

    #[serde(rename = "input_audio_buffer.commit")]
    CommitAudio,
}

impl UpstreamCommand {
    /// Build an append command carrying PCM bytes.
    pub fn append(pcm: &[u8]) -> Self {
        UpstreamCommand::AppendAudio {
            audio: STANDARD.encode(pcm),
        }
    }

    pub fn to_json(&self) -> Result<String, RelayError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Upstream events as they appear on the wire.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum UpstreamWireEvent {
    #[serde(rename = "session.created")]
    SessionCreated {
        #[serde(default)]
        session: Value,
    },

    #[serde(rename = "response.audio.delta")]
    AudioDelta { delta: String },

    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: Value,
    },

    #[serde(other)]
    Other,
}

/// Typed action produced from an inbound upstream event.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamAction {
    SessionCreated { session_id: Option<String> },
    /// Generated PCM audio at the target rate, base64 decoded
    AudioDelta(Vec<u8>),
    /// Human-readable description of an upstream error event
    Error(String),
    /// Any other event type, kept for logging
    Ignored(String),
}

/// Decode one inbound upstream text frame.
pub fn decode_upstream_event(text: &str) -> Result<UpstreamAction, RelayError> {
    let value: Value = serde_json::from_str(text)?;
    let event_type = match value.get("type").and_then(Value::as_str) {
        Some(event_type) => event_type.to_string(),
        None => return Ok(UpstreamAction::Ignored(String::new())),
    };

    let action = match serde_json::from_value::<UpstreamWireEvent>(value)? {
        UpstreamWireEvent::SessionCreated { session } => UpstreamAction::SessionCreated {
            session_id: session.get("id").and_then(Value::as_str).map(str::to_string),
        },
        UpstreamWireEvent::AudioDelta { delta } => {
            UpstreamAction::AudioDelta(STANDARD.decode(delta.as_bytes())?)
        }
        UpstreamWireEvent::Error { error } => UpstreamAction::Error(describe_error(&error)),
        UpstreamWireEvent::Other => UpstreamAction::Ignored(event_type),
    };

    Ok(action)
}

/// Prefer the error's `message` field; fall back to the raw JSON.
fn describe_error(error: &Value) -> String {
    match error.get("message").and_then(Value::as_str) {
        Some(message) => match error.get("code").and_then(Value::as_str) {
            Some(code) => format!("{} ({})", message, code),
            None => message.to_string(),
        },
        None => error.to_string(),
    }
}
