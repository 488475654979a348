//! Turns realtime messages into cache invalidations and notifications.
//!
//! | message | effect |
//! |---|---|
//! | `connected`, `disconnected`, `error` | log only |
//! | `maxReconnectAttemptsReached` | persistent warning |
//! | `analysis_update` completed | invalidate jobs, projects, search; success |
//! | `analysis_update` failed | error notification |
//! | `analysis_update` other | invalidate jobs |
//! | `project_update` | invalidate projects; info |
//! | `search_update` | invalidate search |
//! | `knowledge_graph_update` | invalidate that project's graph |

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info};

use codescope_core::{AnalysisStatus, HandlerError, Message, MessageType, QueryKey, RealtimeEvent};
use codescope_realtime::{DispatchRegistry, MessageHandler, Subscription};

use crate::cache::QueryCache;
use crate::notify::Notifier;

pub const CONNECTION_LOST_TITLE: &str = "Connection Lost";
pub const CONNECTION_LOST_DETAIL: &str = "Unable to connect to the server. Please refresh the page.";
pub const ANALYSIS_COMPLETE_TITLE: &str = "Analysis Complete";
pub const ANALYSIS_COMPLETE_DETAIL: &str = "Project analysis has finished successfully.";
pub const ANALYSIS_FAILED_TITLE: &str = "Analysis Failed";
pub const ANALYSIS_FAILED_DETAIL: &str = "Project analysis failed.";
pub const PROJECT_UPDATED_TITLE: &str = "Project Updated";

/// Message types the consumer subscribes to.
pub const CONSUMED_TYPES: [MessageType; 8] = [
    MessageType::Connected,
    MessageType::Disconnected,
    MessageType::Error,
    MessageType::MaxReconnectAttemptsReached,
    MessageType::AnalysisUpdate,
    MessageType::ProjectUpdate,
    MessageType::SearchUpdate,
    MessageType::KnowledgeGraphUpdate,
];

/// Applies realtime events to a [`QueryCache`] and a [`Notifier`].
pub struct UpdateConsumer {
    cache: Arc<dyn QueryCache>,
    notifier: Arc<dyn Notifier>,
}

impl UpdateConsumer {
    pub fn new(cache: Arc<dyn QueryCache>, notifier: Arc<dyn Notifier>) -> Self {
        Self { cache, notifier }
    }

    /// Decode and apply one message. Types without an effect are ignored;
    /// a consumed type with a bad payload is an error.
    pub fn handle(&self, message: &Message) -> Result<(), HandlerError> {
        if let Some(event) = RealtimeEvent::from_message(message)? {
            self.apply(&event);
        }
        Ok(())
    }

    pub fn apply(&self, event: &RealtimeEvent) {
        match event {
            RealtimeEvent::Connected => info!("realtime updates connected"),
            RealtimeEvent::Disconnected => info!("realtime updates disconnected"),
            RealtimeEvent::Error { error } => {
                error!(detail = %error_detail(error.as_ref()), "realtime connection error");
            }
            RealtimeEvent::MaxReconnectAttemptsReached => self
                .notifier
                .persistent_warning(CONNECTION_LOST_TITLE, Some(CONNECTION_LOST_DETAIL)),
            RealtimeEvent::AnalysisUpdate { status, error, .. } => match status {
                AnalysisStatus::Completed => {
                    self.invalidate(&QueryKey::jobs());
                    self.invalidate(&QueryKey::projects());
                    self.invalidate(&QueryKey::search());
                    self.notifier
                        .success(ANALYSIS_COMPLETE_TITLE, Some(ANALYSIS_COMPLETE_DETAIL));
                }
                AnalysisStatus::Failed => {
                    let detail = error
                        .as_deref()
                        .filter(|e| !e.is_empty())
                        .unwrap_or(ANALYSIS_FAILED_DETAIL);
                    self.notifier.error(ANALYSIS_FAILED_TITLE, Some(detail));
                }
                AnalysisStatus::Pending | AnalysisStatus::Running | AnalysisStatus::Other => {
                    self.invalidate(&QueryKey::jobs());
                }
            },
            RealtimeEvent::ProjectUpdate {
                project_name,
                project_id,
            } => {
                self.invalidate(&QueryKey::projects());
                let name = project_name
                    .as_deref()
                    .or(project_id.as_ref().map(|id| id.as_str()))
                    .unwrap_or("unknown");
                let detail = format!("Project {name} has been updated.");
                self.notifier.info(PROJECT_UPDATED_TITLE, Some(&detail));
            }
            RealtimeEvent::SearchUpdate => self.invalidate(&QueryKey::search()),
            RealtimeEvent::KnowledgeGraphUpdate { project_id } => {
                self.invalidate(&QueryKey::project_graph(project_id));
            }
        }
    }

    /// Register for every consumed type on `registry`.
    ///
    /// The registrations live until the returned guard is detached or dropped.
    pub fn attach(self: &Arc<Self>, registry: &DispatchRegistry) -> ConsumerGuard {
        let handler: Arc<dyn MessageHandler> = Arc::clone(self) as Arc<dyn MessageHandler>;
        let subscriptions = CONSUMED_TYPES
            .iter()
            .map(|ty| registry.subscribe_arc(ty.clone(), Arc::clone(&handler)))
            .collect();
        ConsumerGuard { subscriptions }
    }

    fn invalidate(&self, key: &QueryKey) {
        let matched = self.cache.invalidate(key);
        debug!(key = %key, matched, "invalidated");
    }
}

/// Text of an `error` payload; JSON strings lose their quotes.
fn error_detail(error: Option<&Value>) -> String {
    match error {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

impl MessageHandler for UpdateConsumer {
    fn handle(&self, message: &Message) -> Result<(), HandlerError> {
        UpdateConsumer::handle(self, message)
    }
}

impl std::fmt::Debug for UpdateConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateConsumer").finish_non_exhaustive()
    }
}

/// Registrations made by [`UpdateConsumer::attach`].
#[derive(Debug)]
pub struct ConsumerGuard {
    subscriptions: Vec<Subscription>,
}

impl ConsumerGuard {
    /// Remove every registration. Returns how many were still present.
    pub fn detach(mut self) -> usize {
        self.cancel_all()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    fn cancel_all(&mut self) -> usize {
        self.subscriptions
            .drain(..)
            .map(Subscription::cancel)
            .filter(|removed| *removed)
            .count()
    }
}

impl Drop for ConsumerGuard {
    fn drop(&mut self) {
        let _ = self.cancel_all();
    }
}
