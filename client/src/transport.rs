//! Frame transports.
//!
//! The lifecycle only needs to send and receive text frames, so the socket is
//! hidden behind [`Transport`] and opened through a [`Connector`]. Production
//! code uses [`WebSocketConnector`]; tests plug in channel-backed fakes.

use crate::error::TelemetryError;
use futures_util::{SinkExt, StreamExt};
use log::debug;
use std::future::Future;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// An open, bidirectional text-frame channel to one server
pub trait Transport: Send + 'static {
    fn send_text(&mut self, text: String) -> impl Future<Output = Result<(), TelemetryError>> + Send;

    /// Next inbound text frame; `None` once the peer has closed
    fn next_text(&mut self) -> impl Future<Output = Option<Result<String, TelemetryError>>> + Send;
}

pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    fn connect(
        &self,
        socket_url: &str,
    ) -> impl Future<Output = Result<Self::Transport, TelemetryError>> + Send;
}

#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    origin: Option<String>,
}

impl WebSocketConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Panel daemons reject upgrades whose `Origin` is not the panel URL
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    fn connect(
        &self,
        socket_url: &str,
    ) -> impl Future<Output = Result<WebSocketTransport, TelemetryError>> + Send {
        WebSocketTransport::open(socket_url.to_string(), self.origin.clone())
    }
}

pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WebSocketTransport {
    async fn open(socket_url: String, origin: Option<String>) -> Result<Self, TelemetryError> {
        let mut request = socket_url.as_str().into_client_request()?;
        if let Some(origin) = origin {
            request
                .headers_mut()
                .insert("Origin", HeaderValue::from_str(&origin)?);
        }

        let (stream, response) = connect_async(request).await?;
        debug!("WebSocket upgrade to {} answered {}", socket_url, response.status());

        Ok(Self { stream })
    }

    async fn send_message(&mut self, text: String) -> Result<(), TelemetryError> {
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn next_message(&mut self) -> Option<Result<String, TelemetryError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(frame)) => {
                    debug!("Peer closed WebSocket: {:?}", frame);
                    return None;
                }
                // Pings are answered by tungstenite itself
                Ok(_) => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

impl Transport for WebSocketTransport {
    fn send_text(&mut self, text: String) -> impl Future<Output = Result<(), TelemetryError>> + Send {
        self.send_message(text)
    }

    fn next_text(&mut self) -> impl Future<Output = Option<Result<String, TelemetryError>>> + Send {
        self.next_message()
    }
}
