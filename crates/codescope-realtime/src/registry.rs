//! Publish/subscribe table from message types to handlers.
//!
//! Each [`MessageType`] owns an ordered handler list; [`Topic::Any`] owns a
//! separate wildcard list that runs after the type-specific one. Dispatch works
//! on a snapshot, so handlers added or removed while a message is being
//! delivered only affect later messages.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use codescope_core::{HandlerError, Message, MessageType, Topic};
use parking_lot::Mutex;
use tracing::{debug, error, warn};

/// A subscriber callback.
///
/// Closures `Fn(&Message) -> Result<(), HandlerError>` implement this directly.
pub trait MessageHandler: Send + Sync {
    /// React to one dispatched message. An error is logged and does not stop
    /// delivery to other handlers.
    fn handle(&self, message: &Message) -> Result<(), HandlerError>;
}

impl<F> MessageHandler for F
where
    F: Fn(&Message) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, message: &Message) -> Result<(), HandlerError> {
        self(message)
    }
}

struct Entry {
    id: u64,
    handler: Arc<dyn MessageHandler>,
}

#[derive(Default)]
struct Table {
    next_id: u64,
    typed: HashMap<MessageType, Vec<Entry>>,
    wildcard: Vec<Entry>,
}

impl Table {
    fn list_mut(&mut self, topic: &Topic) -> Option<&mut Vec<Entry>> {
        match topic {
            Topic::Type(ty) => self.typed.get_mut(ty),
            Topic::Any => Some(&mut self.wildcard),
        }
    }

    fn remove_where(&mut self, topic: &Topic, pred: impl Fn(&Entry) -> bool) -> bool {
        let Some(list) = self.list_mut(topic) else {
            return false;
        };
        let Some(pos) = list.iter().position(pred) else {
            return false;
        };
        let _ = list.remove(pos);
        if list.is_empty() {
            if let Topic::Type(ty) = topic {
                let _ = self.typed.remove(ty);
            }
        }
        true
    }
}

/// Outcome of one [`DispatchRegistry::dispatch`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that returned `Ok`.
    pub delivered: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

impl DispatchReport {
    pub fn total(&self) -> usize {
        self.delivered + self.failed
    }
}

/// Registration handle returned by [`DispatchRegistry::subscribe`].
///
/// Cancelling removes exactly this registration, even when the same handler
/// was registered more than once. Dropping the handle leaves the registration
/// in place.
#[derive(Debug)]
#[must_use = "dropping a Subscription keeps the handler registered; call cancel() to remove it"]
pub struct Subscription {
    id: u64,
    topic: Topic,
    table: Weak<Mutex<Table>>,
}

impl Subscription {
    /// Remove the registration. Returns `false` if it was already gone.
    pub fn cancel(self) -> bool {
        let Some(table) = self.table.upgrade() else {
            return false;
        };
        let mut table = table.lock();
        table.remove_where(&self.topic, |e| e.id == self.id)
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("typed", &self.typed.len())
            .field("wildcard", &self.wildcard.len())
            .finish()
    }
}

/// Type-keyed handler table with a wildcard list.
#[derive(Clone, Default)]
pub struct DispatchRegistry {
    table: Arc<Mutex<Table>>,
}

impl DispatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` to the list for `topic`. Duplicates coexist.
    pub fn subscribe<F>(&self, topic: impl Into<Topic>, handler: F) -> Subscription
    where
        F: Fn(&Message) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.subscribe_arc(topic, Arc::new(handler))
    }

    /// Like [`subscribe`](Self::subscribe), keeping a shared handler reference
    /// usable with [`unsubscribe`](Self::unsubscribe).
    pub fn subscribe_arc(
        &self,
        topic: impl Into<Topic>,
        handler: Arc<dyn MessageHandler>,
    ) -> Subscription {
        let topic = topic.into();
        let mut table = self.table.lock();
        table.next_id += 1;
        let id = table.next_id;
        let entry = Entry { id, handler };
        match &topic {
            Topic::Type(ty) => table.typed.entry(ty.clone()).or_default().push(entry),
            Topic::Any => table.wildcard.push(entry),
        }
        debug!(topic = %topic, subscription_id = id, "handler subscribed");
        Subscription {
            id,
            topic,
            table: Arc::downgrade(&self.table),
        }
    }

    /// Remove the first registration of this exact handler under `topic`.
    /// Returns `false` when there was none.
    pub fn unsubscribe(&self, topic: &Topic, handler: &Arc<dyn MessageHandler>) -> bool {
        let target = Arc::as_ptr(handler).cast::<()>();
        let mut table = self.table.lock();
        table.remove_where(topic, |e| Arc::as_ptr(&e.handler).cast::<()>() == target)
    }

    /// Deliver `message` to its type's handlers, then to wildcard handlers.
    ///
    /// Each handler's error or panic is logged and isolated; delivery always
    /// continues with the next handler.
    pub fn dispatch(&self, message: &Message) -> DispatchReport {
        let handlers: Vec<Arc<dyn MessageHandler>> = {
            let table = self.table.lock();
            table
                .typed
                .get(message.message_type())
                .into_iter()
                .flatten()
                .chain(table.wildcard.iter())
                .map(|e| Arc::clone(&e.handler))
                .collect()
        };

        let mut report = DispatchReport::default();
        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler.handle(message))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(message_type = %message.message_type(), error = %e, "handler failed");
                }
                Err(panic) => {
                    report.failed += 1;
                    error!(
                        message_type = %message.message_type(),
                        panic = panic_message(panic.as_ref()),
                        "handler panicked"
                    );
                }
            }
        }
        report
    }

    /// Number of registrations under `topic`.
    pub fn handler_count(&self, topic: &Topic) -> usize {
        let table = self.table.lock();
        match topic {
            Topic::Type(ty) => table.typed.get(ty).map_or(0, Vec::len),
            Topic::Any => table.wildcard.len(),
        }
    }

    /// Number of registrations across all topics.
    pub fn len(&self) -> usize {
        let table = self.table.lock();
        table.typed.values().map(Vec::len).sum::<usize>() + table.wildcard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every registration.
    pub fn clear(&self) {
        let mut table = self.table.lock();
        table.typed.clear();
        table.wildcard.clear();
    }
}

impl std::fmt::Debug for DispatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchRegistry")
            .field("handlers", &self.len())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
