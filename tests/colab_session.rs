use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use cardsync::client::store::StoreFuture;
use cardsync::client::{CardStore, EditorSession, SocketClient, TransportConfig};
use cardsync::models::{ClientEvent, FlashcardDraft, ServerEvent, TEMP_ID_PREFIX};
use cardsync::relay::{self, RelayState};

async fn start_relay() -> (SocketAddr, Arc<RelayState>, JoinHandle<()>) {
    let state = Arc::new(RelayState::new());
    let app = relay::router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state, server)
}

fn ws_url(addr: SocketAddr) -> String {
    format!("ws://{}/ws", addr)
}

/// The relay registers a user once its join frame is processed, which
/// also guarantees the connection is subscribed to the broadcast bus.
async fn wait_for_user(state: &RelayState, user_id: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while state.registry.connection_for(user_id).await.is_none() {
        assert!(Instant::now() < deadline, "user {} never joined", user_id);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn card(id: &str, term: &str, definition: &str) -> FlashcardDraft {
    FlashcardDraft {
        id: id.to_string(),
        term: Some(term.to_string()),
        definition: Some(definition.to_string()),
    }
}

/// Store double answering every call with a canned authoritative list.
struct CannedStore {
    respond_with: Vec<FlashcardDraft>,
}

impl CardStore for CannedStore {
    fn list_cards(&self, _set_id: &str) -> StoreFuture<Vec<FlashcardDraft>> {
        let canned = self.respond_with.clone();
        Box::pin(async move { Ok(canned) })
    }

    fn replace_cards(
        &self,
        _set_id: &str,
        _cards: Vec<FlashcardDraft>,
    ) -> StoreFuture<Vec<FlashcardDraft>> {
        let canned = self.respond_with.clone();
        Box::pin(async move { Ok(canned) })
    }
}

#[tokio::test]
async fn relay_fans_out_to_peers_but_never_echoes() {
    let (addr, state, _server) = start_relay().await;

    let a = SocketClient::spawn(TransportConfig::new(ws_url(addr)), "user-a");
    let b = SocketClient::spawn(TransportConfig::new(ws_url(addr)), "user-b");
    let (a_tx, mut a_rx) = mpsc::unbounded_channel();
    let (b_tx, mut b_rx) = mpsc::unbounded_channel();
    a.subscribe(a_tx).await;
    b.subscribe(b_tx).await;
    a.wait_connected().await;
    b.wait_connected().await;
    wait_for_user(&state, "user-a").await;
    wait_for_user(&state, "user-b").await;

    a.emit(ClientEvent::FlashcardLock {
        user_id: "user-a".to_string(),
        flashcard_id: "c1".to_string(),
    });

    let received = timeout(Duration::from_secs(5), b_rx.recv())
        .await
        .expect("peer never received the event")
        .unwrap();
    assert_eq!(
        received,
        ServerEvent::FlashcardLocked {
            user_id: "user-a".to_string(),
            flashcard_id: "c1".to_string(),
        }
    );

    // The sender must never see its own event come back
    assert!(timeout(Duration::from_millis(300), a_rx.recv())
        .await
        .is_err());
}

#[tokio::test]
async fn relay_tolerates_ping_and_binary_frames() {
    let (addr, state, _server) = start_relay().await;

    let b = SocketClient::spawn(TransportConfig::new(ws_url(addr)), "user-b");
    let (b_tx, mut b_rx) = mpsc::unbounded_channel();
    b.subscribe(b_tx).await;
    b.wait_connected().await;
    wait_for_user(&state, "user-b").await;

    // Raw connection so we control the frame types on the wire
    let (mut raw, _) = tokio_tungstenite::connect_async(ws_url(addr)).await.unwrap();
    raw.send(WsMessage::text(r#"{"type":"user:join","userId":"user-a"}"#))
        .await
        .unwrap();
    wait_for_user(&state, "user-a").await;

    // Control and binary frames must not tear the connection down
    raw.send(WsMessage::Ping(vec![1].into())).await.unwrap();
    raw.send(WsMessage::Binary(vec![2, 3].into())).await.unwrap();
    raw.send(WsMessage::text(
        r#"{"type":"flashcard:lock","userId":"user-a","flashcardId":"c1"}"#,
    ))
    .await
    .unwrap();

    let received = timeout(Duration::from_secs(5), b_rx.recv())
        .await
        .expect("relay dropped the connection on a non-text frame")
        .unwrap();
    assert_eq!(
        received,
        ServerEvent::FlashcardLocked {
            user_id: "user-a".to_string(),
            flashcard_id: "c1".to_string(),
        }
    );
}

#[tokio::test]
async fn a_fresh_join_for_the_same_user_wins() {
    let (addr, state, _server) = start_relay().await;

    let first = SocketClient::spawn(TransportConfig::new(ws_url(addr)), "user-x");
    first.wait_connected().await;
    wait_for_user(&state, "user-x").await;
    let first_conn = state.registry.connection_for("user-x").await.unwrap();

    let second = SocketClient::spawn(TransportConfig::new(ws_url(addr)), "user-x");
    second.wait_connected().await;
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let current = state.registry.connection_for("user-x").await;
        if current.is_some() && current != Some(first_conn) {
            break;
        }
        assert!(Instant::now() < deadline, "second join never registered");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let second_conn = state.registry.connection_for("user-x").await.unwrap();

    // The stale connection going away must not evict the fresh mapping
    drop(first);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(
        state.registry.connection_for("user-x").await,
        Some(second_conn)
    );

    drop(second);
    let deadline = Instant::now() + Duration::from_secs(5);
    while state.registry.connection_for("user-x").await.is_some() {
        assert!(Instant::now() < deadline, "user-x never left the registry");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn temp_card_converges_to_durable_id_for_peer() {
    let (addr, state, _server) = start_relay().await;
    let debounce = Duration::from_millis(100);

    let a = SocketClient::spawn(TransportConfig::new(ws_url(addr)), "user-a");
    let (a_remote_tx, a_remote_rx) = mpsc::unbounded_channel();
    a.subscribe(a_remote_tx).await;
    a.wait_connected().await;
    let session_a = EditorSession::spawn_with_debounce(
        "set-1",
        "user-a",
        vec![],
        Arc::new(CannedStore {
            respond_with: vec![card("abc", "x", "y")],
        }),
        a.sender(),
        a_remote_rx,
        debounce,
    );

    let b = SocketClient::spawn(TransportConfig::new(ws_url(addr)), "user-b");
    let (b_remote_tx, b_remote_rx) = mpsc::unbounded_channel();
    b.subscribe(b_remote_tx).await;
    b.wait_connected().await;
    let session_b = EditorSession::spawn_with_debounce(
        "set-1",
        "user-b",
        vec![],
        Arc::new(CannedStore { respond_with: vec![] }),
        b.sender(),
        b_remote_rx,
        debounce,
    );

    wait_for_user(&state, "user-a").await;
    wait_for_user(&state, "user-b").await;

    let temp_id = session_a.add_card();
    session_a.edit_term(&temp_id, "x");
    session_a.edit_definition(&temp_id, "y");

    // B converges on the durable identifier and never sees the temp id
    wait_until("peer convergence", || {
        let cards = session_b.cards();
        assert!(
            !cards.iter().any(|c| c.id.starts_with(TEMP_ID_PREFIX)),
            "peer saw a temporary identifier: {:?}",
            cards
        );
        cards == vec![card("abc", "x", "y")]
    })
    .await;

    // A's own snapshot carries the durable id as well
    wait_until("local reconciliation", || {
        session_a.cards() == vec![card("abc", "x", "y")]
    })
    .await;
}

#[tokio::test]
async fn focus_locks_the_card_for_the_peer_until_blur() {
    let (addr, state, _server) = start_relay().await;
    let initial = vec![card("c1", "a", "b")];

    let a = SocketClient::spawn(TransportConfig::new(ws_url(addr)), "user-a");
    let (a_remote_tx, a_remote_rx) = mpsc::unbounded_channel();
    a.subscribe(a_remote_tx).await;
    a.wait_connected().await;
    let session_a = EditorSession::spawn(
        "set-1",
        "user-a",
        initial.clone(),
        Arc::new(CannedStore {
            respond_with: initial.clone(),
        }),
        a.sender(),
        a_remote_rx,
    );

    let b = SocketClient::spawn(TransportConfig::new(ws_url(addr)), "user-b");
    let (b_remote_tx, b_remote_rx) = mpsc::unbounded_channel();
    b.subscribe(b_remote_tx).await;
    b.wait_connected().await;
    let session_b = EditorSession::spawn(
        "set-1",
        "user-b",
        initial.clone(),
        Arc::new(CannedStore {
            respond_with: initial,
        }),
        b.sender(),
        b_remote_rx,
    );

    wait_for_user(&state, "user-a").await;
    wait_for_user(&state, "user-b").await;

    session_a.focus("c1");
    wait_until("peer lock", || session_b.locked_cards().contains("c1")).await;
    // Advisory only, and never applied to the locking session itself
    assert!(session_a.locked_cards().is_empty());

    session_a.blur("c1");
    wait_until("peer unlock", || session_b.locked_cards().is_empty()).await;
}

#[tokio::test]
async fn emit_while_disconnected_is_a_silent_no_op() {
    let config = TransportConfig {
        url: "ws://127.0.0.1:9/ws".to_string(),
        reconnect_attempts: 1,
        reconnect_delay: Duration::from_millis(10),
        connect_timeout: Duration::from_millis(200),
    };
    let client = SocketClient::spawn(config, "user-x");

    // Dropped with a log line, never an error
    client.emit(ClientEvent::FlashcardLock {
        user_id: "user-x".to_string(),
        flashcard_id: "c1".to_string(),
    });
    assert!(!client.is_connected());
}

#[tokio::test]
async fn client_reconnects_and_rejoins_after_the_relay_restarts() {
    let (addr, state, server) = start_relay().await;

    let config = TransportConfig {
        url: ws_url(addr),
        reconnect_attempts: 20,
        reconnect_delay: Duration::from_millis(100),
        connect_timeout: Duration::from_secs(2),
    };
    let client = SocketClient::spawn(config, "user-a");
    client.wait_connected().await;
    wait_for_user(&state, "user-a").await;

    // Take the relay down; the old process state goes with it
    server.abort();
    drop(state);

    // Bring a fresh relay up on the same address
    let fresh_state = Arc::new(RelayState::new());
    let app = relay::router(fresh_state.clone());
    let deadline = Instant::now() + Duration::from_secs(5);
    let listener = loop {
        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => break listener,
            Err(_) => {
                assert!(Instant::now() < deadline, "could not rebind relay address");
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    };
    let _server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // The transport announces the join again by itself
    wait_for_user(&fresh_state, "user-a").await;
}

#[tokio::test]
async fn health_endpoints_respond() {
    let (addr, _state, _server) = start_relay().await;

    for path in ["/api/v1/health", "/api/v1/ready"] {
        let resp = reqwest::get(format!("http://{}{}", addr, path))
            .await
            .unwrap();
        assert!(resp.status().is_success());
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");
    }
}
