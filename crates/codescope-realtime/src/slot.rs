//! Process-scoped owner of the shared realtime client.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use codescope_core::ConfigError;

use crate::client::RealtimeClient;
use crate::config::ClientConfig;
use crate::transport::{Connector, WsConnector};

/// Holds at most one [`RealtimeClient`], created and connected on first use.
///
/// After [`close`](Self::close) the next `get_or_connect*` call builds a fresh
/// client; this is also the only way back from an exhausted client.
pub struct ClientSlot {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    client: Mutex<Option<Arc<RealtimeClient>>>,
}

impl ClientSlot {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, Arc::new(WsConnector::new()))
    }

    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            client: Mutex::new(None),
        }
    }

    /// The current client, creating and connecting one if the slot is empty.
    pub fn get_or_connect(&self) -> Result<Arc<RealtimeClient>, ConfigError> {
        self.get_or_connect_with(|_| {})
    }

    /// Like [`get_or_connect`](Self::get_or_connect); `setup` runs on a newly
    /// created client before it connects, so its subscriptions see the first
    /// `connected`. It does not run when a client already exists.
    ///
    /// `setup` runs without the slot locked. If another caller fills the slot
    /// meanwhile, that client wins and the one passed to `setup` is dropped
    /// unconnected.
    pub fn get_or_connect_with(
        &self,
        setup: impl FnOnce(&RealtimeClient),
    ) -> Result<Arc<RealtimeClient>, ConfigError> {
        if let Some(client) = self.current() {
            return Ok(client);
        }
        let client = Arc::new(RealtimeClient::with_connector(
            self.config.clone(),
            Arc::clone(&self.connector),
        )?);
        setup(&client);

        {
            let mut slot = self.client.lock();
            if let Some(existing) = slot.as_ref() {
                debug!(url = %client.endpoint(), "slot filled during setup, discarding new client");
                return Ok(Arc::clone(existing));
            }
            *slot = Some(Arc::clone(&client));
        }
        client.connect();
        info!(url = %client.endpoint(), "realtime client created");
        Ok(client)
    }

    /// The current client, if any. Never creates one.
    pub fn current(&self) -> Option<Arc<RealtimeClient>> {
        self.client.lock().clone()
    }

    /// Shut down and discard the current client. Idempotent.
    pub async fn close(&self) {
        let client = self.client.lock().take();
        if let Some(client) = client {
            client.shutdown().await;
            info!(url = %client.endpoint(), "realtime client closed");
        }
    }
}

impl std::fmt::Debug for ClientSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSlot")
            .field("origin", &self.config.origin)
            .field("client", &self.client.lock().as_ref().map(|c| c.state()))
            .finish()
    }
}
