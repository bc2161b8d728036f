use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::{
    collections::HashMap,
    io,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use wdims_core::events::{
    decode_event, encode_event, ClientEvent, DeliveryScope, ProfileRef, ServerEvent,
    MAX_EVENT_BYTES,
};
use wdims_storage::{ProfileStore, StoreError};

const OUTBOUND_QUEUE: usize = 256;

#[derive(Clone, Debug)]
pub struct HubConfig {
    pub write_timeout: Duration,
    pub debug: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_secs(2),
            debug: false,
        }
    }
}

/// One open socket. The hub never learns which profile the window behind it
/// is bound to; receivers filter by profile themselves.
pub struct Connection {
    pub conn_id: String,
    sender: mpsc::Sender<String>,
}

impl Connection {
    async fn send_text(&self, text: &str) -> bool {
        self.sender.send(text.to_string()).await.is_ok()
    }
}

pub struct HubState {
    config: HubConfig,
    store: ProfileStore,
    conn_counter: AtomicU64,
    connections: RwLock<HashMap<String, Arc<Connection>>>,
}

impl HubState {
    pub fn new(store: ProfileStore, config: HubConfig) -> Self {
        Self {
            config,
            store,
            conn_counter: AtomicU64::new(0),
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    /// Runs a store operation on the blocking pool.
    pub async fn with_store<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&ProfileStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = self.store.clone();
        match tokio::task::spawn_blocking(move || op(&store)).await {
            Ok(result) => result,
            Err(err) => Err(StoreError::Io {
                path: self.store.root().to_path_buf(),
                source: io::Error::other(err.to_string()),
            }),
        }
    }

    fn next_conn_id(&self) -> String {
        let id = self.conn_counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("conn-{id}")
    }

    /// Registers a connection whose outbound frames arrive on the returned receiver.
    pub async fn register(&self) -> (Arc<Connection>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        let conn = Arc::new(Connection {
            conn_id: self.next_conn_id(),
            sender: tx,
        });
        self.connections
            .write()
            .await
            .insert(conn.conn_id.clone(), conn.clone());
        info!(event = "client_connected", conn_id = %conn.conn_id);
        (conn, rx)
    }

    pub async fn remove(&self, conn_id: &str, reason: &str) {
        if self.connections.write().await.remove(conn_id).is_some() {
            info!(event = "client_disconnected", conn_id = conn_id, reason = reason);
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    async fn snapshot(&self, sender: &Connection, scope: DeliveryScope) -> Vec<Arc<Connection>> {
        let connections = self.connections.read().await;
        match scope {
            DeliveryScope::All => connections.values().cloned().collect(),
            DeliveryScope::AllExceptSender => connections
                .values()
                .filter(|conn| conn.conn_id != sender.conn_id)
                .cloned()
                .collect(),
            DeliveryScope::SenderOnly => connections
                .get(&sender.conn_id)
                .cloned()
                .into_iter()
                .collect(),
        }
    }

    /// Fire-and-forget delivery to the connections selected by the event's scope.
    pub async fn deliver(&self, sender: &Connection, event: ServerEvent) {
        let kind = event.kind();
        let scope = event.scope();
        let raw = match encode_event(event) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(event = "encode_error", kind = kind, error = %err);
                return;
            }
        };
        let targets = self.snapshot(sender, scope).await;
        debug!(event = "deliver", kind = kind, scope = ?scope, targets = targets.len());
        for target in targets {
            if !target.send_text(&raw).await {
                warn!(event = "send_error", conn_id = %target.conn_id, kind = kind);
                self.remove(&target.conn_id, "send_error").await;
            }
        }
    }

    pub async fn handle_text(&self, sender: &Connection, data: &[u8]) {
        if self.config.debug {
            debug!(event = "message_received", conn_id = %sender.conn_id, raw = %String::from_utf8_lossy(data));
        }
        match decode_event::<ClientEvent>(data, MAX_EVENT_BYTES) {
            Ok(event) => self.handle_event(sender, event).await,
            Err(err) => {
                warn!(event = "message_invalid", conn_id = %sender.conn_id, error = %err);
                self.deliver(
                    sender,
                    ServerEvent::error("Invalid message", err.to_string(), None),
                )
                .await;
            }
        }
    }

    /// Document updates are persisted before anything is relayed; a failed
    /// write is reported to the sender only and nobody else hears of it.
    pub async fn handle_event(&self, sender: &Connection, event: ClientEvent) {
        info!(
            event = "client_event",
            conn_id = %sender.conn_id,
            kind = event.kind(),
            profile = event.profile_name().unwrap_or("")
        );
        match event {
            ClientEvent::DisplaySettingsUpdate(payload) => {
                let name = payload.profile_name.clone();
                let settings = payload.settings.clone();
                let result = self
                    .with_store(move |store| store.update_display_settings(&name, &settings))
                    .await;
                match result {
                    Ok(()) => {
                        let ack = ProfileRef {
                            profile_name: payload.profile_name.clone(),
                        };
                        self.deliver(sender, ServerEvent::DisplaySettingsChanged(payload))
                            .await;
                        self.deliver(sender, ServerEvent::DisplaySettingsUpdateSuccess(ack))
                            .await;
                    }
                    Err(err) => {
                        warn!(event = "persist_failed", conn_id = %sender.conn_id, kind = "display-settings", error = %err);
                        self.deliver(
                            sender,
                            ServerEvent::error(
                                "Failed to update display settings",
                                err.to_string(),
                                Some(err.kind()),
                            ),
                        )
                        .await;
                    }
                }
            }
            ClientEvent::SearchEnginesUpdate(payload) => {
                let name = payload.profile_name.clone();
                let engines = payload.engines.clone();
                let result = self
                    .with_store(move |store| store.update_engine_config(&name, &engines))
                    .await;
                match result {
                    Ok(()) => {
                        let ack = ProfileRef {
                            profile_name: payload.profile_name.clone(),
                        };
                        self.deliver(sender, ServerEvent::SearchEnginesChanged(payload))
                            .await;
                        self.deliver(sender, ServerEvent::SearchEnginesUpdateSuccess(ack))
                            .await;
                    }
                    Err(err) => {
                        warn!(event = "persist_failed", conn_id = %sender.conn_id, kind = "search-engines", error = %err);
                        self.deliver(
                            sender,
                            ServerEvent::error(
                                "Failed to update search engines",
                                err.to_string(),
                                Some(err.kind()),
                            ),
                        )
                        .await;
                    }
                }
            }
            ClientEvent::ProfileSwitch(payload) => {
                self.deliver(sender, ServerEvent::ProfileSwitched(payload))
                    .await;
            }
            ClientEvent::ProfilesChanged => {
                self.deliver(sender, ServerEvent::ProfilesListChanged).await;
            }
        }
    }

    pub async fn handle_socket(self: Arc<Self>, socket: WebSocket, remote: SocketAddr) {
        let (mut ws_sender, mut ws_receiver) = socket.split();
        let (conn, mut outbound) = self.register().await;
        let write_timeout = self.config.write_timeout;
        let write_task = tokio::spawn(async move {
            while let Some(text) = outbound.recv().await {
                let send = ws_sender.send(Message::Text(text));
                if tokio::time::timeout(write_timeout, send).await.is_err() {
                    return;
                }
            }
        });
        debug!(event = "socket_open", conn_id = %conn.conn_id, remote = %remote);

        while let Some(result) = ws_receiver.next().await {
            let msg = match result {
                Ok(value) => value,
                Err(err) => {
                    warn!(event = "read_error", conn_id = %conn.conn_id, error = %err);
                    break;
                }
            };
            let data = match msg {
                Message::Text(text) => text.into_bytes(),
                Message::Binary(bytes) => bytes,
                Message::Close(_) => {
                    info!(event = "client_close", conn_id = %conn.conn_id);
                    break;
                }
                Message::Ping(_) | Message::Pong(_) => continue,
            };
            self.handle_text(&conn, &data).await;
        }

        self.remove(&conn.conn_id, "disconnect").await;
        drop(conn);
        let _ = write_task.await;
    }
}
