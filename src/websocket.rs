//! # Telephony WebSocket Handler
//!
//! Accepts media-stream connections from the telephony platform and relays
//! them to the realtime voice service. Every connection is one actor owning
//! one `SessionPair`.
//!
//! ## WebSocket Protocol:
//! 1. **Connection**: the platform connects to the configured path (`/ws`)
//! 2. **start**: the pair records the stream id and opens the upstream session
//! 3. **media**: 20ms mu-law frames are transcoded and appended upstream
//! 4. **Upstream audio**: deltas are transcoded back and sent as `media` events
//! 5. **stop** or either side closing: both connections are closed
//!
//! ## Actor Model:
//! The actor consumes two streams, telephony frames and upstream frames, and
//! handles one message at a time, so the pair needs no locking and events on
//! one call are strictly ordered.

use crate::error::{AppError, RelayError};
use crate::relay::pair::{PairSettings, SessionPair};
use crate::relay::protocol::{decode_telephony_event, decode_upstream_event, TelephonyAction};
use crate::relay::upstream::{RealtimeClient, UpstreamFrame};
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use tracing::{debug, error, info, warn};

pub struct TelephonyWebSocket {
    pair: SessionPair,
    client: RealtimeClient,
    app_state: web::Data<AppState>,
}

impl TelephonyWebSocket {
    pub fn new(pair: SessionPair, client: RealtimeClient, app_state: web::Data<AppState>) -> Self {
        Self {
            pair,
            client,
            app_state,
        }
    }

    /// Open the upstream session without blocking the actor.
    fn open_upstream(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        let client = self.client.clone();
        let connect = async move { client.connect().await };

        ctx.spawn(connect.into_actor(self).map(|result, act, ctx| match result {
            Ok((handle, events)) => match act.pair.attach_upstream(handle) {
                Ok(true) => {
                    ctx.add_stream(events);
                }
                Ok(false) => {}
                Err(err) => act.handle_relay_error(err, ctx),
            },
            Err(err) => {
                error!(pair_id = %act.pair.id(), "Failed to open upstream session: {}", err);
                act.app_state.record_upstream_failure();
                act.pair.upstream_failed();
                act.shutdown(ctx);
            }
        }));
    }

    fn handle_telephony_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        match decode_telephony_event(text) {
            Ok(TelephonyAction::Start(start)) => {
                if self.pair.start(&start) {
                    self.open_upstream(ctx);
                }
            }
            Ok(TelephonyAction::Media(frame)) => {
                if let Err(err) = self.pair.relay_media(&frame) {
                    self.handle_relay_error(err, ctx);
                }
            }
            Ok(TelephonyAction::Stop) => self.pair.stop(),
            Ok(TelephonyAction::Ignored) => {
                debug!(pair_id = %self.pair.id(), "Ignoring telephony event");
            }
            Err(err) => self.handle_relay_error(err, ctx),
        }

        if self.pair.is_closed() {
            self.shutdown(ctx);
        }
    }

    fn handle_upstream_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let outbound = decode_upstream_event(text).and_then(|action| self.pair.relay_upstream(action));

        match outbound {
            Ok(Some(event)) => match event.to_json() {
                Ok(json) => ctx.text(json),
                Err(err) => self.handle_relay_error(err, ctx),
            },
            Ok(None) => {}
            Err(err) => self.handle_relay_error(err, ctx),
        }

        if self.pair.is_closed() {
            self.shutdown(ctx);
        }
    }

    /// Decode errors cost one frame; anything else ends the call.
    fn handle_relay_error(&mut self, err: RelayError, ctx: &mut ws::WebsocketContext<Self>) {
        if !err.is_fatal() {
            self.app_state.record_decode_error();
            warn!(pair_id = %self.pair.id(), "Dropping undecodable frame: {}", err);
            return;
        }

        if matches!(err, RelayError::UpstreamConnect(_) | RelayError::UpstreamClosed) {
            self.app_state.record_upstream_failure();
        }
        error!(pair_id = %self.pair.id(), "Relay error, closing call: {}", err);
        self.pair.close();
        self.shutdown(ctx);
    }

    fn shutdown(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        self.pair.close();
        ctx.close(Some(ws::CloseReason {
            code: ws::CloseCode::Normal,
            description: None,
        }));
        ctx.stop();
    }
}

impl Actor for TelephonyWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        self.app_state.pair_opened();
        info!(pair_id = %self.pair.id(), "Telephony connection started");
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.pair.close();
        self.app_state.pair_closed(self.pair.stats());
        info!(
            pair_id = %self.pair.id(),
            stream_sid = self.pair.stream_sid().unwrap_or("-"),
            state = ?self.pair.state(),
            "Telephony connection stopped"
        );
    }
}

/// Frames from the telephony platform.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for TelephonyWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => self.handle_telephony_text(&text, ctx),
            Ok(ws::Message::Binary(data)) => {
                debug!(pair_id = %self.pair.id(), bytes = data.len(), "Ignoring binary frame");
            }
            Ok(ws::Message::Ping(data)) => ctx.pong(&data),
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Close(reason)) => {
                info!(pair_id = %self.pair.id(), "Telephony closed: {:?}", reason);
                self.pair.close();
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!(pair_id = %self.pair.id(), "Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(pair_id = %self.pair.id(), "Telephony protocol error: {}", err);
                self.pair.close();
                ctx.stop();
            }
        }
    }
}

/// Frames from the realtime voice service.
impl StreamHandler<UpstreamFrame> for TelephonyWebSocket {
    fn handle(&mut self, frame: UpstreamFrame, ctx: &mut Self::Context) {
        match frame {
            UpstreamFrame::Text(text) => self.handle_upstream_text(&text, ctx),
            UpstreamFrame::Closed(reason) => {
                info!(
                    pair_id = %self.pair.id(),
                    reason = reason.as_deref().unwrap_or("-"),
                    "Upstream closed the session"
                );
                self.shutdown(ctx);
            }
            UpstreamFrame::Failed(err) => {
                error!(pair_id = %self.pair.id(), "Upstream transport error: {}", err);
                self.app_state.record_upstream_failure();
                self.shutdown(ctx);
            }
        }
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        debug!(pair_id = %self.pair.id(), "Upstream stream ended");
        self.shutdown(ctx);
    }
}

/// WebSocket endpoint handler.
///
/// Relay settings are captured here, so configuration updates only affect
/// calls that connect afterwards.
pub async fn telephony_websocket(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    info!("New telephony connection from: {:?}", req.connection_info().peer_addr());

    let config = app_state.get_config();
    let pair = SessionPair::new(PairSettings::from_config(&config))
        .map_err(|e| AppError::Internal(e.to_string()))?;
    let client = RealtimeClient::new(&config.upstream, config.relay.upstream_queue_capacity);

    ws::start(TelephonyWebSocket::new(pair, client, app_state), &req, stream)
}
