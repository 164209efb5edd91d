//! Registry of open tabs controlled by the worker.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;

/// Unique identifier for a connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl ClientId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Client type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientKind {
    #[default]
    Window,
    Worker,
}

/// Message sent from the worker to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// A new worker version activated; the page should reload.
    ReloadPage,
    /// The host explicitly asked every tab to reload.
    ForceReload,
    /// The version poll saw a newer deployment.
    NewVersionAvailable { version: String },
}

/// Message sent from a client to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerCommand {
    /// Activate immediately instead of waiting for all tabs to close.
    SkipWaiting,
    /// Broadcast a force-reload to every controlled client.
    ReloadClients,
}

/// A connected tab.
#[derive(Debug)]
pub struct WorkerClient {
    pub id: ClientId,
    pub url: Url,
    pub kind: ClientKind,
    /// Whether this worker currently governs the client.
    pub controlled: bool,
    sender: mpsc::UnboundedSender<ClientMessage>,
}

impl WorkerClient {
    /// Deliver a message to this client. Returns false if the tab is gone.
    pub fn post_message(&self, message: ClientMessage) -> bool {
        self.sender.send(message).is_ok()
    }
}

/// The set of currently open tabs; queried on demand, never persisted.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<ClientId, WorkerClient>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly opened tab. The returned receiver yields worker
    /// messages for that tab.
    pub fn connect(
        &mut self,
        url: Url,
        kind: ClientKind,
    ) -> (ClientId, mpsc::UnboundedReceiver<ClientMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ClientId::next();
        debug!(client = id.raw(), url = %url, "Client connected");
        self.clients.insert(
            id,
            WorkerClient {
                id,
                url,
                kind,
                controlled: false,
                sender: tx,
            },
        );
        (id, rx)
    }

    /// Remove a closed tab.
    pub fn disconnect(&mut self, id: ClientId) -> bool {
        self.clients.remove(&id).is_some()
    }

    pub fn get(&self, id: ClientId) -> Option<&WorkerClient> {
        self.clients.get(&id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Take control of every open tab without requiring a reload.
    pub fn claim(&mut self) {
        for client in self.clients.values_mut() {
            client.controlled = true;
        }
    }

    /// Send a message to every window-type client. Returns the number of
    /// clients the message reached; dead channels are dropped.
    pub fn broadcast(&mut self, message: &ClientMessage) -> usize {
        let mut delivered = 0;
        let mut gone = Vec::new();

        for client in self.clients.values() {
            if client.kind != ClientKind::Window {
                continue;
            }
            if client.post_message(message.clone()) {
                delivered += 1;
            } else {
                gone.push(client.id);
            }
        }

        for id in gone {
            warn!(client = id.raw(), "Dropping closed client");
            self.clients.remove(&id);
        }

        delivered
    }
}
