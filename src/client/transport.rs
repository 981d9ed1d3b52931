use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, RwLock};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{error, info, warn};

use crate::models::{ClientEvent, ServerEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Listener = mpsc::UnboundedSender<ServerEvent>;

/// Connection settings for the relay client.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub url: String,
    /// Consecutive failed connect attempts before giving up.
    pub reconnect_attempts: u32,
    /// Fixed backoff between attempts.
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
}

impl TransportConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_attempts: 5,
            reconnect_delay: Duration::from_millis(1000),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// One relay connection per client context.
///
/// Owns the reconnect loop. On every successful (re)connect it announces
/// `user:join` with its user id so the relay registry stays correct.
/// Events emitted while the connection is down are dropped with a log
/// line; the reconnect loop is the only recovery path.
pub struct SocketClient {
    outbound: mpsc::UnboundedSender<ClientEvent>,
    connected: watch::Receiver<bool>,
    listener: Arc<RwLock<Option<Listener>>>,
    task: tokio::task::JoinHandle<()>,
}

impl SocketClient {
    /// Start connecting in the background.
    pub fn spawn(config: TransportConfig, user_id: impl Into<String>) -> Self {
        let (outbound, out_rx) = mpsc::unbounded_channel();
        let (connected_tx, connected) = watch::channel(false);
        let listener: Arc<RwLock<Option<Listener>>> = Arc::new(RwLock::new(None));
        let task = tokio::spawn(run(
            config,
            user_id.into(),
            out_rx,
            connected_tx,
            listener.clone(),
        ));
        Self {
            outbound,
            connected,
            listener,
            task,
        }
    }

    /// Queue an event for delivery. Never errors; delivery failures are
    /// logged and the event is dropped.
    pub fn emit(&self, event: ClientEvent) {
        if self.outbound.send(event).is_err() {
            warn!("Socket task gone, dropping event");
        }
    }

    /// Sender end for collaborators that emit on their own schedule.
    pub fn sender(&self) -> mpsc::UnboundedSender<ClientEvent> {
        self.outbound.clone()
    }

    /// Install the inbound event sink, replacing any previous one so a
    /// remounted consumer never processes events twice.
    pub async fn subscribe(&self, sink: mpsc::UnboundedSender<ServerEvent>) {
        *self.listener.write().await = Some(sink);
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Wait until the background task has an open, joined connection.
    pub async fn wait_connected(&self) {
        let mut connected = self.connected.clone();
        let _ = connected.wait_for(|up| *up).await;
    }
}

impl Drop for SocketClient {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    config: TransportConfig,
    user_id: String,
    mut out_rx: mpsc::UnboundedReceiver<ClientEvent>,
    connected: watch::Sender<bool>,
    listener: Arc<RwLock<Option<Listener>>>,
) {
    let mut attempts: u32 = 0;
    loop {
        match connect(&config).await {
            Ok(stream) => {
                attempts = 0;
                let flow = session(stream, &user_id, &mut out_rx, &connected, &listener).await;
                if flow.is_break() {
                    return;
                }
            }
            Err(e) => {
                attempts += 1;
                if attempts > config.reconnect_attempts {
                    warn!(
                        "Giving up on {} after {} attempts: {}",
                        config.url, config.reconnect_attempts, e
                    );
                    return;
                }
                warn!(
                    "Connect to {} failed (attempt {}/{}): {}",
                    config.url, attempts, config.reconnect_attempts, e
                );
            }
        }

        // Fixed backoff. Anything emitted while down is dropped, with a
        // log line so the caller can see the delivery failure.
        let wait = tokio::time::sleep(config.reconnect_delay);
        tokio::pin!(wait);
        loop {
            tokio::select! {
                _ = &mut wait => break,
                event = out_rx.recv() => match event {
                    Some(event) => warn!("Socket not connected, dropping {:?}", event),
                    None => return,
                },
            }
        }
    }
}

async fn connect(config: &TransportConfig) -> Result<WsStream, String> {
    match tokio::time::timeout(config.connect_timeout, connect_async(config.url.as_str())).await {
        Ok(Ok((stream, _response))) => Ok(stream),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("connect timed out".to_string()),
    }
}

/// Drive one live connection until it drops (`Continue`: reconnect) or
/// the client handle is gone (`Break`: stop for good).
async fn session(
    stream: WsStream,
    user_id: &str,
    out_rx: &mut mpsc::UnboundedReceiver<ClientEvent>,
    connected: &watch::Sender<bool>,
    listener: &Arc<RwLock<Option<Listener>>>,
) -> ControlFlow<()> {
    let (mut sink, mut source) = stream.split();

    // Announce ourselves first so the relay registry is correct before
    // any edit event goes out.
    let join = ClientEvent::Join {
        user_id: user_id.to_string(),
    };
    let join_text = match serde_json::to_string(&join) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to serialize join event: {}", e);
            return ControlFlow::Break(());
        }
    };
    if sink.send(Message::text(join_text)).await.is_err() {
        warn!("Failed to announce join, reconnecting");
        return ControlFlow::Continue(());
    }
    connected.send_replace(true);
    info!("Socket connected, joined as {}", user_id);

    let flow = loop {
        tokio::select! {
            event = out_rx.recv() => match event {
                Some(event) => {
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            error!("Failed to serialize event, dropping it: {}", e);
                            continue;
                        }
                    };
                    if sink.send(Message::text(text)).await.is_err() {
                        warn!("Delivery failed, reconnecting");
                        break ControlFlow::Continue(());
                    }
                }
                None => break ControlFlow::Break(()),
            },
            msg = source.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ServerEvent>(text.as_str()) {
                        Ok(event) => {
                            if let Some(tx) = listener.read().await.as_ref() {
                                let _ = tx.send(event);
                            }
                        }
                        // Trusted relay; malformed frames are ignored
                        // rather than fatal
                        Err(e) => warn!("Ignoring malformed event: {}", e),
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Socket error: {}", e);
                    break ControlFlow::Continue(());
                }
                None => {
                    info!("Socket closed by server");
                    break ControlFlow::Continue(());
                }
            },
        }
    };

    connected.send_replace(false);
    flow
}
