//! # TwiML Call Instructions
//!
//! The telephony platform fetches these instructions when a call arrives.
//! They optionally speak a greeting and then open a media stream to the
//! relay's WebSocket path on the same host.

use crate::{error::AppError, state::AppState};
use actix_web::{http::header, web, HttpRequest, HttpResponse};

/// Call instructions that point the telephony platform at the relay.
///
/// The stream carries only the caller's audio; the relay's own output must
/// not be fed back upstream.
pub async fn twiml(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("missing Host header".to_string()))?;
    let relay = state.get_config().relay;

    tracing::info!(host = %host, "TwiML requested");

    let greeting = relay
        .twiml_greeting
        .as_deref()
        .map(|text| format!("\n  <Say>{}</Say>", escape_xml(text)))
        .unwrap_or_default();
    let stream_url = escape_xml(&format!("wss://{}{}", host, relay.ws_path));

    let body = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response>{}\n  <Connect>\n    <Stream url=\"{}\" track=\"inbound_track\"/>\n  </Connect>\n</Response>",
        greeting, stream_url
    );

    Ok(HttpResponse::Ok().content_type("text/xml").body(body))
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
