//! # codescope-realtime
//!
//! Client side of the codescope realtime channel.
//!
//! - [`RealtimeClient`] drives one connection at a time: it connects, decodes
//!   inbound frames, dispatches them through its [`DispatchRegistry`], sends
//!   heartbeats while open, and reconnects with exponential backoff until
//!   [`ClientConfig::max_reconnect_attempts`] is reached.
//! - [`ClientSlot`] owns the process-wide client and creates it on first use.
//! - [`Connector`] abstracts the socket; [`WsConnector`] uses
//!   `tokio-tungstenite`, [`mock::MockConnector`] scripts outcomes for tests.

#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod heartbeat;
pub mod mock;
pub mod reconnect;
pub mod registry;
pub mod slot;
pub mod state;
pub mod transport;

pub use client::{MessageSender, RealtimeClient};
pub use config::{ClientConfig, Endpoint};
pub use heartbeat::{Heartbeat, DEFAULT_HEARTBEAT_INTERVAL};
pub use reconnect::{BackoffPolicy, ReconnectStep, Reconnector};
pub use registry::{DispatchRegistry, DispatchReport, MessageHandler, Subscription};
pub use slot::ClientSlot;
pub use state::ConnectionState;
pub use transport::{Connection, Connector, Frame, FrameSink, FrameStream, WsConnector};
