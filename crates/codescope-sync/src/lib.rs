//! # codescope-sync
//!
//! Keeps local state in step with server-side changes announced over the
//! realtime channel.
//!
//! - [`UpdateConsumer`] maps realtime messages onto cache invalidations and
//!   user notifications, and attaches itself to a dispatch registry.
//! - [`QueryCache`] is the invalidation seam; [`MemoryQueryCache`] is a
//!   concurrent in-memory implementation.
//! - [`Notifier`] is the notification seam; [`LogNotifier`] writes to the log
//!   and [`RecordingNotifier`] keeps notifications in memory.

#![deny(unsafe_code)]

pub mod cache;
pub mod consumer;
pub mod notify;

pub use cache::{CacheEntry, Invalidation, MemoryQueryCache, QueryCache, DEFAULT_HISTORY_LIMIT};
pub use consumer::{ConsumerGuard, UpdateConsumer, CONSUMED_TYPES};
pub use notify::{LogNotifier, Notification, NotificationLevel, Notifier, RecordingNotifier};
