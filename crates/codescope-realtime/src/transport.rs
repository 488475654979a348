//! Socket transport: raw frames in and out of one connection.
//!
//! The client loop talks to a [`Connection`] (a frame sink plus a frame
//! stream) produced by a [`Connector`]. [`WsConnector`] is the production
//! implementation over `tokio-tungstenite`; tests substitute
//! [`MockConnector`](crate::mock::MockConnector).

use std::pin::Pin;

use async_trait::async_trait;
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::debug;

use codescope_core::{FrameError, Message, TransportError};

use crate::config::Endpoint;

/// One frame on the wire, independent of the socket library.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    /// The peer closed the connection, with an optional reason.
    Close(Option<String>),
}

impl Frame {
    /// Encode an outbound message as a text frame.
    pub fn encode(message: &Message) -> Result<Self, FrameError> {
        message.to_frame().map(Frame::Text)
    }

    /// Decode a data frame. Close frames decode to `None`.
    ///
    /// Binary frames are accepted when their payload is UTF-8 JSON.
    pub fn decode(&self) -> Result<Option<Message>, FrameError> {
        match self {
            Self::Text(text) => Message::from_frame(text).map(Some),
            Self::Binary(bytes) => {
                let text = std::str::from_utf8(bytes).map_err(|_| FrameError::NotUtf8)?;
                Message::from_frame(text).map(Some)
            }
            Self::Close(_) => Ok(None),
        }
    }
}

/// Outbound half of a connection.
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;
/// Inbound half of a connection. Ends when the socket is gone.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// A live connection.
pub struct Connection {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Connection {
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Opens connections to an endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Connection, TransportError>;
}

/// WebSocket connector over `tokio-tungstenite`.
///
/// `wss` endpoints need the crate's `tls` feature.
#[derive(Clone, Copy, Debug)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        #[cfg(feature = "tls")]
        {
            // Fails only when a provider is already installed.
            let _ = rustls::crypto::ring::default_provider().install_default();
        }
        Self
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Connection, TransportError> {
        let (ws, response) =
            connect_async(endpoint.as_str())
                .await
                .map_err(|e| TransportError::Connect {
                    url: endpoint.to_string(),
                    reason: e.to_string(),
                })?;
        debug!(url = %endpoint, status = %response.status(), "websocket handshake complete");

        let (sink, stream) = ws.split();

        let sink = sink
            .sink_map_err(|e| TransportError::Send(e.to_string()))
            .with(|frame: Frame| future::ready(Ok::<_, TransportError>(to_ws(frame))));

        // The first receive error ends the stream; the socket is unusable after it.
        let stream = stream
            .scan(false, |failed, item| {
                if *failed {
                    return future::ready(None);
                }
                *failed = item.is_err();
                future::ready(Some(item))
            })
            .filter_map(|item| {
                future::ready(match item {
                    Ok(msg) => from_ws(msg).map(Ok),
                    Err(e) => Some(Err(TransportError::Receive(e.to_string()))),
                })
            });

        Ok(Connection::new(Box::pin(sink), Box::pin(stream)))
    }
}

fn to_ws(frame: Frame) -> WsMessage {
    match frame {
        Frame::Text(text) => WsMessage::text(text),
        Frame::Binary(bytes) => WsMessage::binary(bytes),
        Frame::Close(_) => WsMessage::Close(None),
    }
}

/// Control frames (ping/pong) are answered by tungstenite and never surface.
fn from_ws(msg: WsMessage) -> Option<Frame> {
    match msg {
        WsMessage::Text(text) => Some(Frame::Text(text.as_str().to_owned())),
        WsMessage::Binary(bytes) => Some(Frame::Binary(bytes.to_vec())),
        WsMessage::Close(frame) => Some(Frame::Close(frame.map(|f| f.reason.as_str().to_owned()))),
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => None,
    }
}
