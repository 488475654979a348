//! Scripted in-memory connector for tests.
//!
//! Each `connect` call consumes the next [`MockOutcome`]. An accepted
//! connection hands the test a [`MockServerEnd`] through the channel returned
//! by [`MockConnector::new`]; dropping that end closes the connection.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::UnboundedReceiverStream;

use codescope_core::{Message, TransportError};

use crate::config::Endpoint;
use crate::transport::{Connection, Connector, Frame};

/// Result of one scripted connection attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockOutcome {
    Accept,
    Refuse(String),
}

impl MockOutcome {
    pub fn refuse() -> Self {
        Self::Refuse("connection refused".into())
    }
}

/// Connector that follows a script. Attempts past the end of the script are refused.
pub struct MockConnector {
    script: Mutex<VecDeque<MockOutcome>>,
    attempts: Mutex<Vec<Instant>>,
    servers: mpsc::UnboundedSender<MockServerEnd>,
}

impl MockConnector {
    pub fn new(
        script: impl IntoIterator<Item = MockOutcome>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<MockServerEnd>) {
        let (servers, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            attempts: Mutex::new(Vec::new()),
            servers,
        });
        (connector, rx)
    }

    /// A connector that refuses every attempt.
    pub fn refusing() -> (Arc<Self>, mpsc::UnboundedReceiver<MockServerEnd>) {
        Self::new(Vec::<MockOutcome>::new())
    }

    /// Append an outcome to the script.
    pub fn push(&self, outcome: MockOutcome) {
        self.script.lock().push_back(outcome);
    }

    /// When each attempt was made, in order.
    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }
}

impl std::fmt::Debug for MockConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnector")
            .field("remaining", &self.script.lock().len())
            .field("attempts", &self.attempt_count())
            .finish()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Connection, TransportError> {
        self.attempts.lock().push(Instant::now());
        let outcome = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(MockOutcome::refuse);

        match outcome {
            MockOutcome::Refuse(reason) => Err(TransportError::Connect {
                url: endpoint.to_string(),
                reason,
            }),
            MockOutcome::Accept => {
                let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
                let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Frame>();

                let sink = futures::sink::unfold(outbound_tx, |tx, frame: Frame| async move {
                    tx.send(frame).map_err(|_| TransportError::Closed)?;
                    Ok::<_, TransportError>(tx)
                });
                let stream = UnboundedReceiverStream::new(inbound_rx);

                let server = MockServerEnd {
                    inbound: inbound_tx,
                    outbound: outbound_rx,
                };
                if self.servers.send(server).is_err() {
                    return Err(TransportError::Connect {
                        url: endpoint.to_string(),
                        reason: "mock server end dropped".into(),
                    });
                }
                Ok(Connection::new(Box::pin(sink), Box::pin(stream)))
            }
        }
    }
}

/// Server side of an accepted mock connection.
#[derive(Debug)]
pub struct MockServerEnd {
    inbound: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    outbound: mpsc::UnboundedReceiver<Frame>,
}

impl MockServerEnd {
    /// Deliver a raw text frame to the client. Returns `false` once the client hung up.
    pub fn push_text(&self, text: impl Into<String>) -> bool {
        self.inbound.send(Ok(Frame::Text(text.into()))).is_ok()
    }

    pub fn push_message(&self, message: &Message) -> bool {
        match message.to_frame() {
            Ok(text) => self.push_text(text),
            Err(_) => false,
        }
    }

    pub fn push_frame(&self, frame: Frame) -> bool {
        self.inbound.send(Ok(frame)).is_ok()
    }

    /// Surface a transport error without closing the connection.
    pub fn push_error(&self, reason: impl Into<String>) -> bool {
        self.inbound
            .send(Err(TransportError::Receive(reason.into())))
            .is_ok()
    }

    /// Send a close frame.
    pub fn push_close(&self) -> bool {
        self.inbound.send(Ok(Frame::Close(None))).is_ok()
    }

    /// Drop the connection.
    pub fn close(self) {}

    /// Next frame the client wrote. `None` once the client side is gone.
    pub async fn next_outbound(&mut self) -> Option<Frame> {
        self.outbound.recv().await
    }

    /// Next frame the client wrote, decoded.
    pub async fn next_message(&mut self) -> Option<Message> {
        loop {
            match self.outbound.recv().await? {
                Frame::Text(text) => return Message::from_frame(&text).ok(),
                Frame::Close(_) => return None,
                Frame::Binary(_) => {}
            }
        }
    }

    /// A frame the client already wrote, without waiting.
    pub fn try_outbound(&mut self) -> Option<Frame> {
        self.outbound.try_recv().ok()
    }

    /// Whether the client still holds the connection.
    pub fn is_client_connected(&self) -> bool {
        !self.inbound.is_closed()
    }
}
