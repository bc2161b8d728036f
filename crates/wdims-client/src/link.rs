use futures_util::{SinkExt, StreamExt};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;
use wdims_core::events::{decode_event, encode_event, ClientEvent, ServerEvent, MAX_EVENT_BYTES};

const OUTBOUND_QUEUE: usize = 64;
const INBOUND_QUEUE: usize = 256;

/// Fire-and-forget sink for events bound for the hub.
pub trait HubLink: Send + Sync {
    fn send(&self, event: ClientEvent);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
    /// Consecutive failed connects before the link gives up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(5),
            max_attempts: 10,
        }
    }
}

pub fn next_backoff(current: Duration, max: Duration) -> Duration {
    let next = current + current;
    if next > max {
        max
    } else {
        next
    }
}

/// Background WebSocket connection to the hub.
pub struct HubConnection {
    outbound: mpsc::Sender<String>,
    connected: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl HubConnection {
    /// Starts the connect loop. Decoded hub events arrive on the returned
    /// receiver until the loop gives up or the connection is dropped.
    pub fn spawn(url: Url, policy: ReconnectPolicy) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let (events_tx, events_rx) = mpsc::channel(INBOUND_QUEUE);
        let connected = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(hub_loop(
            url,
            policy,
            outbound_rx,
            events_tx,
            connected.clone(),
        ));
        (
            Self {
                outbound: outbound_tx,
                connected,
                task,
            },
            events_rx,
        )
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl HubLink for HubConnection {
    fn send(&self, event: ClientEvent) {
        if !self.is_connected() {
            warn!(event = "hub_send_dropped", kind = event.kind(), reason = "disconnected");
            return;
        }
        let raw = match encode_event(&event) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(event = "hub_encode_error", kind = event.kind(), error = %err);
                return;
            }
        };
        if let Err(err) = self.outbound.try_send(raw) {
            warn!(event = "hub_send_dropped", kind = event.kind(), error = %err);
        }
    }
}

impl Drop for HubConnection {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn hub_loop(
    url: Url,
    policy: ReconnectPolicy,
    mut outbound: mpsc::Receiver<String>,
    events: mpsc::Sender<ServerEvent>,
    connected: Arc<AtomicBool>,
) {
    let mut backoff = policy.initial;
    let mut failures = 0u32;
    loop {
        let (mut ws, _) = match connect_async(url.as_str()).await {
            Ok(value) => value,
            Err(err) => {
                failures += 1;
                warn!(event = "hub_connect_error", attempt = failures, error = %err);
                if failures >= policy.max_attempts {
                    error!(event = "hub_reconnect_exhausted", attempts = failures);
                    return;
                }
                tokio::time::sleep(backoff).await;
                backoff = next_backoff(backoff, policy.max);
                continue;
            }
        };
        backoff = policy.initial;
        failures = 0;
        while outbound.try_recv().is_ok() {}
        connected.store(true, Ordering::SeqCst);
        info!(event = "hub_connected", url = %url);

        loop {
            tokio::select! {
                msg = ws.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match decode_event::<ServerEvent>(text.as_bytes(), MAX_EVENT_BYTES) {
                                Ok(event) => {
                                    if events.send(event).await.is_err() {
                                        connected.store(false, Ordering::SeqCst);
                                        let _ = ws.close(None).await;
                                        return;
                                    }
                                }
                                Err(err) => warn!(event = "hub_event_invalid", error = %err),
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            debug!(event = "hub_read_error", error = %err);
                            break;
                        }
                    }
                }
                Some(out) = outbound.recv() => {
                    if ws.send(Message::Text(out)).await.is_err() {
                        break;
                    }
                }
            }
        }
        connected.store(false, Ordering::SeqCst);
        let _ = ws.close(None).await;
        warn!(event = "hub_disconnected", url = %url);
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_cap() {
        let policy = ReconnectPolicy::default();
        let mut delay = policy.initial;
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(delay.as_secs());
            delay = next_backoff(delay, policy.max);
        }
        assert_eq!(seen, vec![1, 2, 4, 5, 5]);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts_and_drops_sends() {
        let policy = ReconnectPolicy {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(2),
            max_attempts: 2,
        };
        let url = Url::parse("ws://127.0.0.1:1/ws").expect("url");
        let (link, mut events) = HubConnection::spawn(url, policy);
        link.send(ClientEvent::ProfilesChanged);
        assert!(!link.is_connected());
        assert!(events.recv().await.is_none());
    }
}
