//! # Upstream Realtime Client
//!
//! Opens the WebSocket session to the realtime voice service and splits it
//! into the two halves the relay uses:
//! - **UpstreamHandle**: bounded send queue drained by a writer task
//! - **UpstreamEvents**: stream of inbound frames fed to the telephony actor
//!
//! Dropping or closing the handle ends the writer task, which sends a close
//! frame upstream. There is no reconnection.

use crate::config::UpstreamConfig;
use crate::error::RelayError;
use crate::relay::protocol::UpstreamCommand;

use futures_util::stream::BoxStream;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, Request};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One inbound upstream frame, already reduced to what the relay cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamFrame {
    Text(String),
    Closed(Option<String>),
    Failed(String),
}

pub type UpstreamEvents = BoxStream<'static, UpstreamFrame>;

/// Sending half of an upstream connection.
#[derive(Debug)]
pub struct UpstreamHandle {
    id: Uuid,
    sender: Option<mpsc::Sender<UpstreamCommand>>,
    capacity: usize,
}

impl UpstreamHandle {
    /// Create a handle and the receiving end of its queue.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<UpstreamCommand>) {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let handle = Self {
            id: Uuid::new_v4(),
            sender: Some(sender),
            capacity,
        };
        (handle, receiver)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue a command without waiting.
    ///
    /// ## Errors:
    /// - `UpstreamBackpressure` when the queue is full
    /// - `UpstreamClosed` when the handle was closed or the writer is gone
    pub fn send(&self, command: UpstreamCommand) -> Result<(), RelayError> {
        let sender = self.sender.as_ref().ok_or(RelayError::UpstreamClosed)?;
        sender.try_send(command).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => RelayError::UpstreamBackpressure {
                capacity: self.capacity,
            },
            mpsc::error::TrySendError::Closed(_) => RelayError::UpstreamClosed,
        })
    }

    /// Close the connection. Returns true only for the call that closed it.
    pub fn close(&mut self) -> bool {
        self.sender.take().is_some()
    }
}

/// Connection factory for the realtime voice service.
#[derive(Debug, Clone)]
pub struct RealtimeClient {
    url: String,
    model: String,
    api_key: String,
    queue_capacity: usize,
}

impl RealtimeClient {
    pub fn new(config: &UpstreamConfig, queue_capacity: usize) -> Self {
        Self {
            url: config.url.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            queue_capacity,
        }
    }

    /// Full session URL with the model query parameter.
    pub fn endpoint(&self) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}model={}", self.url, separator, self.model)
    }

    fn build_request(&self) -> Result<Request<()>, RelayError> {
        let mut request = self
            .endpoint()
            .into_client_request()
            .map_err(|e| RelayError::UpstreamConnect(e.to_string()))?;

        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| RelayError::UpstreamConnect(format!("invalid credential: {}", e)))?;
        request.headers_mut().insert("Authorization", bearer);
        request
            .headers_mut()
            .insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        Ok(request)
    }

    /// Open a session and start its writer task.
    pub async fn connect(&self) -> Result<(UpstreamHandle, UpstreamEvents), RelayError> {
        let request = self.build_request()?;
        let (ws_stream, response) = connect_async(request)
            .await
            .map_err(|e| RelayError::UpstreamConnect(e.to_string()))?;

        let (handle, receiver) = UpstreamHandle::channel(self.queue_capacity);
        info!(
            upstream_id = %handle.id(),
            status = %response.status(),
            "Upstream session connected"
        );

        let (sink, stream) = ws_stream.split();
        tokio::spawn(write_commands(handle.id(), receiver, sink));

        let events = stream
            .filter_map(|message| async move {
                match message {
                    Ok(Message::Text(text)) => Some(UpstreamFrame::Text(text)),
                    Ok(Message::Close(frame)) => {
                        Some(UpstreamFrame::Closed(frame.map(|f| f.reason.to_string())))
                    }
                    Ok(_) => None,
                    Err(err) => Some(UpstreamFrame::Failed(err.to_string())),
                }
            })
            .boxed();

        Ok((handle, events))
    }
}

/// Drain the command queue into the socket, then close it.
async fn write_commands<S>(id: Uuid, receiver: mpsc::Receiver<UpstreamCommand>, mut sink: S)
where
    S: futures_util::Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let mut commands = ReceiverStream::new(receiver);
    while let Some(command) = commands.next().await {
        let json = match command.to_json() {
            Ok(json) => json,
            Err(err) => {
                warn!(upstream_id = %id, "Failed to encode upstream command: {}", err);
                continue;
            }
        };

        if let Err(err) = sink.send(Message::Text(json)).await {
            warn!(upstream_id = %id, "Upstream write failed: {}", err);
            return;
        }
    }

    debug!(upstream_id = %id, "Upstream queue closed, sending close frame");
    if let Err(err) = sink.send(Message::Close(None)).await {
        debug!(upstream_id = %id, "Upstream close frame not sent: {}", err);
    }
    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn upstream_config(url: &str) -> UpstreamConfig {
        UpstreamConfig {
            url: url.to_string(),
            api_key: "sk-test".to_string(),
            ..UpstreamConfig::default()
        }
    }

    #[test]
    fn test_endpoint_appends_model() {
        let mut config = upstream_config("wss://api.openai.com/v1/realtime");
        config.model = "gpt-4o-realtime-preview".to_string();
        let client = RealtimeClient::new(&config, 8);
        assert_eq!(
            client.endpoint(),
            "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview"
        );

        config.url = "wss://proxy.local/realtime?region=eu".to_string();
        let client = RealtimeClient::new(&config, 8);
        assert!(client.endpoint().ends_with("?region=eu&model=gpt-4o-realtime-preview"));
    }

    #[test]
    fn test_request_headers() {
        let client = RealtimeClient::new(&upstream_config("wss://api.openai.com/v1/realtime"), 8);
        let request = client.build_request().unwrap();
        assert_eq!(request.headers()["Authorization"], "Bearer sk-test");
        assert_eq!(request.headers()["OpenAI-Beta"], "realtime=v1");
    }

    #[test]
    fn test_handle_send_and_close() {
        let (mut handle, mut receiver) = UpstreamHandle::channel(2);

        handle.send(UpstreamCommand::CommitAudio).unwrap();
        assert_eq!(receiver.try_recv().unwrap(), UpstreamCommand::CommitAudio);

        assert!(handle.close());
        assert!(!handle.close());
        assert!(matches!(handle.send(UpstreamCommand::CommitAudio), Err(RelayError::UpstreamClosed)));
    }

    #[test]
    fn test_handle_backpressure() {
        let (handle, _receiver) = UpstreamHandle::channel(1);
        handle.send(UpstreamCommand::CommitAudio).unwrap();
        assert!(matches!(
            handle.send(UpstreamCommand::CommitAudio),
            Err(RelayError::UpstreamBackpressure { capacity: 1 })
        ));
    }

    #[test]
    fn test_handle_reports_dropped_receiver() {
        let (handle, receiver) = UpstreamHandle::channel(4);
        drop(receiver);
        assert!(matches!(handle.send(UpstreamCommand::CommitAudio), Err(RelayError::UpstreamClosed)));
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = RealtimeClient::new(&upstream_config(&format!("ws://{}/v1/realtime", addr)), 8);
        let result = client.connect().await;
        assert!(matches!(result, Err(RelayError::UpstreamConnect(_))));
    }

    #[tokio::test]
    async fn test_commands_reach_server_and_close_follows() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.send(Message::Text(r#"{"type":"session.created"}"#.to_string()))
                .await
                .unwrap();

            let mut received = Vec::new();
            while let Some(Ok(message)) = ws.next().await {
                match message {
                    Message::Text(text) => received.push(text),
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            received
        });

        let client = RealtimeClient::new(&upstream_config(&format!("ws://{}/v1/realtime", addr)), 8);
        let (mut handle, mut events) = client.connect().await.unwrap();

        assert_eq!(
            events.next().await,
            Some(UpstreamFrame::Text(r#"{"type":"session.created"}"#.to_string()))
        );

        handle.send(UpstreamCommand::append(&[1, 0])).unwrap();
        handle.send(UpstreamCommand::CommitAudio).unwrap();
        assert!(handle.close());

        let received = server.await.unwrap();
        assert_eq!(received.len(), 2);
        assert!(received[0].contains("input_audio_buffer.append"));
        assert!(received[1].contains("input_audio_buffer.commit"));
    }
}
