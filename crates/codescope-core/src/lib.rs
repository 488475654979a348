//! # codescope-core
//!
//! Shared vocabulary for the codescope realtime client:
//!
//! - **Messages**: [`Message`] with a typed [`MessageType`] tag and open fields,
//!   plus the dispatch [`Topic`]
//! - **Events**: [`RealtimeEvent`], the typed view of server notifications
//! - **Query keys**: [`QueryKey`] naming cached resources
//! - **Branded IDs**: [`ConnectionId`], [`ProjectId`]
//! - **Errors**: `thiserror` enums for frames, transport, handlers and config

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod ids;
pub mod message;
pub mod query;

pub use errors::{ConfigError, FrameError, HandlerError, TransportError};
pub use events::{AnalysisStatus, RealtimeEvent};
pub use ids::{ConnectionId, ProjectId};
pub use message::{Message, MessageType, Topic};
pub use query::QueryKey;
