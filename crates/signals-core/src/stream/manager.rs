//! ============================================================================
//! Signal Stream Manager - Persistent feed connection with reconnection
//! ============================================================================
//! Connects to the pub/sub endpoint over WebSocket (long-polling fallback
//! when negotiation is rejected), addressed with the access token as a query
//! parameter. Frames are delivered to subscribers in arrival order from a
//! single task. Broker errors are logged and fold into the reconnect loop,
//! never surfaced to the caller. Frames missed while disconnected are lost —
//! this is a best-effort live feed, not a durable log.
//! ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, Mutex};
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite};
use tracing::{debug, info, warn};

use super::types::{ConnectionState, Signal, StreamEvent};
use crate::error::StreamError;

/// Stream manager configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Feed endpoint, `ws://` or `wss://`.
    pub url: String,
    /// Fixed back-off before a reconnect attempt.
    pub reconnect_delay: Duration,
    /// How long a delivered signal stays flagged as recent.
    pub recent_window: Duration,
    /// WebSocket keep-alive ping interval.
    pub ping_interval: Duration,
    /// Capacity of the subscriber event channel.
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8080/feed".to_string(),
            reconnect_delay: Duration::from_secs(3),
            recent_window: Duration::from_secs(3),
            ping_interval: Duration::from_secs(30),
            channel_capacity: 256,
        }
    }
}

impl StreamConfig {
    /// Create config from environment (`SIGNALS_STREAM_URL`,
    /// `SIGNALS_STREAM_RECONNECT_SECS`).
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("SIGNALS_STREAM_URL").unwrap_or(defaults.url),
            reconnect_delay: Duration::from_secs(
                std::env::var("SIGNALS_STREAM_RECONNECT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3),
            ),
            ..defaults
        }
    }
}

/// How a connection attempt ended.
enum ListenEnd {
    /// `stop()` was requested; the run loop terminates.
    Shutdown,
    /// The transport closed or errored; the run loop reconnects.
    Closed,
}

struct Inner {
    state: ConnectionState,
    token: Option<String>,
    /// Bumped on every start/stop. A run task only writes state while its
    /// epoch is current, so a superseded task cannot clobber its successor.
    epoch: u64,
    shutdown: Option<broadcast::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

/// Owns the stream connection exclusively. The presentation layer subscribes
/// to delivered events and never mutates manager state directly.
pub struct SignalStreamManager {
    config: StreamConfig,
    http: reqwest::Client,
    events_tx: broadcast::Sender<StreamEvent>,
    inner: Mutex<Inner>,
}

impl SignalStreamManager {
    pub fn new(config: StreamConfig) -> Self {
        let (events_tx, _) = broadcast::channel(config.channel_capacity.max(1));
        let http = reqwest::Client::builder()
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            config,
            http,
            events_tx,
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                token: None,
                epoch: 0,
                shutdown: None,
                task: None,
            }),
        }
    }

    /// Get a receiver for stream events. Subscribe before `start` to observe
    /// the initial state transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.events_tx.subscribe()
    }

    /// Current connection state.
    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    /// Open the feed connection with the given access token. No-op when
    /// already connecting or connected with the same token; a different
    /// token tears down the old connection first.
    pub async fn start(self: &Arc<Self>, access_token: &str) -> Result<(), StreamError> {
        if access_token.is_empty() {
            return Err(StreamError::EmptyToken);
        }
        self.feed_url(access_token)?;

        let mut inner = self.inner.lock().await;
        let active = matches!(
            inner.state,
            ConnectionState::Connecting | ConnectionState::Connected
        );
        if active && inner.token.as_deref() == Some(access_token) {
            debug!("stream already active for this token");
            return Ok(());
        }

        if let Some(tx) = inner.shutdown.take() {
            let _ = tx.send(());
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        inner.shutdown = Some(shutdown_tx);
        inner.token = Some(access_token.to_string());
        inner.epoch += 1;
        let epoch = inner.epoch;
        inner.state = ConnectionState::Connecting;
        let _ = self
            .events_tx
            .send(StreamEvent::State(ConnectionState::Connecting));

        let manager = Arc::clone(self);
        let token = access_token.to_string();
        inner.task = Some(tokio::spawn(async move {
            manager.run(token, epoch, shutdown_rx).await;
        }));

        Ok(())
    }

    /// Deactivate the connection without a final flush and cancel any
    /// pending reconnect timer. Idempotent.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(tx) = inner.shutdown.take() {
            info!("stream stop requested");
            let _ = tx.send(());
        }
        inner.token = None;
        inner.task = None;
        inner.epoch += 1;
        if inner.state != ConnectionState::Disconnected {
            inner.state = ConnectionState::Disconnected;
            let _ = self
                .events_tx
                .send(StreamEvent::State(ConnectionState::Disconnected));
        }
    }

    // ========================================================================
    // Connection loop
    // ========================================================================

    async fn run(
        self: Arc<Self>,
        token: String,
        epoch: u64,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }

            self.set_state(epoch, ConnectionState::Connecting).await;
            info!(url = %self.config.url, "connecting to signal feed");

            match self.connect_and_listen(&token, epoch, &mut shutdown_rx).await {
                Ok(ListenEnd::Shutdown) => break,
                Ok(ListenEnd::Closed) => {
                    self.set_state(epoch, ConnectionState::Disconnected).await;
                }
                Err(e) => {
                    warn!("signal feed connection failed: {}", e);
                    self.set_state(epoch, ConnectionState::Error).await;
                }
            }

            debug!("reconnecting in {:?}", self.config.reconnect_delay);
            tokio::select! {
                _ = sleep(self.config.reconnect_delay) => {}
                _ = shutdown_rx.recv() => break,
            }
        }

        self.set_state(epoch, ConnectionState::Disconnected).await;
        info!("signal stream stopped");
    }

    async fn connect_and_listen(
        &self,
        token: &str,
        epoch: u64,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<ListenEnd, String> {
        let url = self.feed_url(token).map_err(|e| e.to_string())?;

        let ws = match connect_async(url.as_str()).await {
            Ok((ws, _)) => ws,
            Err(tungstenite::Error::Http(resp)) => {
                warn!(
                    status = %resp.status(),
                    "websocket negotiation rejected, falling back to long polling"
                );
                return self.long_poll(token, epoch, shutdown_rx).await;
            }
            Err(e) => return Err(format!("websocket connect failed: {}", e)),
        };

        self.set_state(epoch, ConnectionState::Connected).await;
        info!("subscribed to signal feed");

        let (mut write, mut read) = ws.split();
        let mut ping_interval = tokio::time::interval(self.config.ping_interval);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    let _ = write.close().await;
                    return Ok(ListenEnd::Shutdown);
                }

                _ = ping_interval.tick() => {
                    if write.send(tungstenite::Message::Ping(vec![])).await.is_err() {
                        warn!("keep-alive ping failed, treating as disconnect");
                        return Ok(ListenEnd::Closed);
                    }
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(tungstenite::Message::Text(text))) => {
                            self.handle_frame(&text);
                        }
                        Some(Ok(tungstenite::Message::Binary(data))) => {
                            if let Ok(text) = std::str::from_utf8(&data) {
                                self.handle_frame(text);
                            }
                        }
                        Some(Ok(tungstenite::Message::Close(_))) => {
                            info!("feed closed the connection");
                            return Ok(ListenEnd::Closed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            // Protocol errors are a disconnect, never an
                            // error surfaced to the caller.
                            warn!("stream transport error: {}", e);
                            return Ok(ListenEnd::Closed);
                        }
                        None => return Ok(ListenEnd::Closed),
                    }
                }
            }
        }
    }

    /// Compatibility transport: repeated GETs against the poll endpoint,
    /// each returning a batch of frames.
    async fn long_poll(
        &self,
        token: &str,
        epoch: u64,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<ListenEnd, String> {
        let url = self.poll_url(token).map_err(|e| e.to_string())?;
        self.set_state(epoch, ConnectionState::Connected).await;
        info!("long-polling signal feed");

        loop {
            let request = self
                .http
                .get(url.clone())
                .timeout(Duration::from_secs(30))
                .send();

            tokio::select! {
                _ = shutdown_rx.recv() => return Ok(ListenEnd::Shutdown),

                resp = request => {
                    match resp {
                        Ok(resp) if resp.status().is_success() => {
                            let frames: Vec<Signal> = resp
                                .json()
                                .await
                                .map_err(|e| format!("poll decode failed: {}", e))?;
                            for signal in frames {
                                self.emit_signal(signal);
                            }
                        }
                        Ok(resp) => {
                            warn!(status = %resp.status(), "poll rejected");
                            return Ok(ListenEnd::Closed);
                        }
                        Err(e) => {
                            warn!("poll failed: {}", e);
                            return Ok(ListenEnd::Closed);
                        }
                    }
                }
            }
        }
    }

    // ========================================================================
    // Delivery
    // ========================================================================

    fn handle_frame(&self, text: &str) {
        match serde_json::from_str::<Signal>(text) {
            Ok(signal) => self.emit_signal(signal),
            Err(e) => debug!("ignoring unparseable frame: {}", e),
        }
    }

    fn emit_signal(&self, signal: Signal) {
        debug!(id = %signal.id, tier = ?signal.tier, "signal delivered");
        let id = signal.id.clone();
        let _ = self.events_tx.send(StreamEvent::Signal(signal));

        // Recency timer runs off to the side; delivery never waits on it.
        let events_tx = self.events_tx.clone();
        let window = self.config.recent_window;
        tokio::spawn(async move {
            sleep(window).await;
            let _ = events_tx.send(StreamEvent::RecencyElapsed { id });
        });
    }

    async fn set_state(&self, epoch: u64, state: ConnectionState) {
        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch {
            debug!(?state, "ignoring state write from superseded connection");
            return;
        }
        if inner.state != state {
            debug!(?state, "stream state changed");
            inner.state = state;
            let _ = self.events_tx.send(StreamEvent::State(state));
        }
    }

    // ========================================================================
    // URL construction
    // ========================================================================

    fn feed_url(&self, token: &str) -> Result<url::Url, StreamError> {
        let mut url = url::Url::parse(&self.config.url)
            .map_err(|e| StreamError::InvalidUrl(e.to_string()))?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }

    fn poll_url(&self, token: &str) -> Result<url::Url, StreamError> {
        let mut url = self.feed_url(token)?;
        let scheme = match url.scheme() {
            "ws" => "http",
            "wss" => "https",
            other => {
                return Err(StreamError::InvalidUrl(format!(
                    "unsupported scheme: {}",
                    other
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| StreamError::InvalidUrl("scheme change rejected".to_string()))?;
        let path = format!("{}/poll", url.path().trim_end_matches('/'));
        url.set_path(&path);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::SignalTier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    fn sample_frame(id: &str) -> String {
        serde_json::json!({
            "id": id,
            "campeonato": "Brasileirao Serie A",
            "nomeTimes": "Flamengo x Fluminense",
            "tempoPartida": "73'",
            "placar": "1-0",
            "acaoSinal": "Over 1.5 gols",
            "createdAt": "2026-08-24T19:30:00Z",
            "status": "ACTIVE",
            "tipoEvento": "PREMIUM"
        })
        .to_string()
    }

    /// WebSocket feed server: every accepted connection gets the frames,
    /// then either closes (simulating an unexpected disconnect) or holds
    /// the connection open.
    async fn spawn_feed_server(frames: Vec<String>, hold: bool) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind feed server");
        let addr = listener.local_addr().expect("feed server addr");
        let accepts = Arc::new(AtomicUsize::new(0));
        let counter = accepts.clone();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let frames = frames.clone();
                tokio::spawn(async move {
                    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };
                    for frame in frames {
                        if ws.send(tungstenite::Message::Text(frame)).await.is_err() {
                            return;
                        }
                    }
                    if hold {
                        while let Some(msg) = ws.next().await {
                            if msg.is_err() {
                                break;
                            }
                        }
                    } else {
                        let _ = ws.close(None).await;
                    }
                });
            }
        });

        (format!("ws://{}", addr), accepts)
    }

    /// Plain HTTP server that refuses the WebSocket upgrade with a 400 and
    /// serves the frames as a batch on the `/feed/poll` endpoint.
    fn spawn_poll_only_server(frames: Vec<String>) -> (String, Arc<AtomicUsize>) {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("bind poll server");
        let port = server
            .server_addr()
            .to_ip()
            .expect("poll server ip addr")
            .port();
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();

        std::thread::spawn(move || {
            for request in server.incoming_requests() {
                if request.url().starts_with("/feed/poll") {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let body = format!("[{}]", frames.join(","));
                    let _ = request
                        .respond(tiny_http::Response::from_string(body).with_status_code(200));
                } else {
                    let _ = request.respond(
                        tiny_http::Response::from_string("upgrade rejected")
                            .with_status_code(400),
                    );
                }
            }
        });

        (format!("ws://127.0.0.1:{}/feed", port), polls)
    }

    fn test_config(url: String) -> StreamConfig {
        StreamConfig {
            url,
            reconnect_delay: Duration::from_millis(150),
            recent_window: Duration::from_millis(40),
            ping_interval: Duration::from_secs(30),
            channel_capacity: 64,
        }
    }

    async fn next_event(
        events: &mut broadcast::Receiver<StreamEvent>,
    ) -> Option<StreamEvent> {
        tokio::time::timeout(Duration::from_secs(3), events.recv())
            .await
            .ok()
            .and_then(|r| r.ok())
    }

    #[tokio::test]
    async fn test_start_requires_non_empty_token() {
        let manager = Arc::new(SignalStreamManager::new(StreamConfig::default()));
        let err = manager.start("").await.unwrap_err();
        assert!(matches!(err, StreamError::EmptyToken));
    }

    #[tokio::test]
    async fn test_delivers_signals_and_recency_events() {
        let (url, _accepts) = spawn_feed_server(vec![sample_frame("sig-1")], true).await;
        let manager = Arc::new(SignalStreamManager::new(test_config(url)));
        let mut events = manager.subscribe();
        manager.start("tok-1").await.unwrap();

        let mut saw_signal = false;
        let mut saw_recency = false;
        while let Some(event) = next_event(&mut events).await {
            match event {
                StreamEvent::Signal(signal) => {
                    assert_eq!(signal.id, "sig-1");
                    assert_eq!(signal.tier, SignalTier::Premium);
                    saw_signal = true;
                }
                StreamEvent::RecencyElapsed { id } => {
                    assert_eq!(id, "sig-1");
                    saw_recency = true;
                    break;
                }
                StreamEvent::State(_) => {}
            }
        }
        assert!(saw_signal);
        assert!(saw_recency);

        manager.stop().await;
    }

    #[tokio::test]
    async fn test_reconnects_after_unexpected_disconnect() {
        // Server drops every connection after one frame.
        let (url, accepts) = spawn_feed_server(vec![sample_frame("sig-1")], false).await;
        let manager = Arc::new(SignalStreamManager::new(test_config(url)));
        let mut events = manager.subscribe();
        manager.start("tok-1").await.unwrap();

        let mut signals = 0;
        while let Some(event) = next_event(&mut events).await {
            if let StreamEvent::Signal(_) = event {
                signals += 1;
                if signals >= 2 {
                    break;
                }
            }
        }

        // A second signal means a second connection was established.
        assert!(signals >= 2);
        assert!(accepts.load(Ordering::SeqCst) >= 2);

        manager.stop().await;
    }

    #[tokio::test]
    async fn test_rejected_upgrade_falls_back_to_long_polling() {
        let (url, polls) = spawn_poll_only_server(vec![sample_frame("lp-1")]);
        let manager = Arc::new(SignalStreamManager::new(test_config(url)));
        let mut events = manager.subscribe();
        manager.start("tok-1").await.unwrap();

        let mut delivered = false;
        while let Some(event) = next_event(&mut events).await {
            if let StreamEvent::Signal(signal) = event {
                assert_eq!(signal.id, "lp-1");
                delivered = true;
                break;
            }
        }
        assert!(delivered);
        assert!(polls.load(Ordering::SeqCst) >= 1);
        assert_eq!(manager.state().await, ConnectionState::Connected);

        manager.stop().await;
    }

    #[tokio::test]
    async fn test_connect_failure_enters_error_and_retries() {
        // Reserve a port with nothing listening behind it.
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("reserve port");
        let addr = listener.local_addr().expect("reserved addr");
        drop(listener);

        let manager = Arc::new(SignalStreamManager::new(test_config(format!(
            "ws://{}",
            addr
        ))));
        let mut events = manager.subscribe();
        manager.start("tok-1").await.unwrap();

        // Two Error states with a Connecting in between prove the retry.
        let mut errors = 0;
        while let Some(event) = next_event(&mut events).await {
            if let StreamEvent::State(ConnectionState::Error) = event {
                errors += 1;
                if errors >= 2 {
                    break;
                }
            }
        }
        assert!(errors >= 2);

        manager.stop().await;
    }

    #[tokio::test]
    async fn test_start_with_new_token_replaces_connection() {
        let (url, accepts) = spawn_feed_server(vec![], true).await;
        let manager = Arc::new(SignalStreamManager::new(test_config(url)));
        manager.start("tok-1").await.unwrap();
        sleep(Duration::from_millis(200)).await;

        manager.start("tok-2").await.unwrap();
        sleep(Duration::from_millis(300)).await;

        // The superseded task must not clobber the live connection's state.
        assert_eq!(accepts.load(Ordering::SeqCst), 2);
        assert_eq!(manager.state().await, ConnectionState::Connected);

        manager.stop().await;
    }

    #[tokio::test]
    async fn test_stop_during_backoff_prevents_reconnect() {
        let (url, accepts) = spawn_feed_server(vec![sample_frame("sig-1")], false).await;
        let mut config = test_config(url);
        config.reconnect_delay = Duration::from_millis(400);
        let manager = Arc::new(SignalStreamManager::new(config));
        let mut events = manager.subscribe();
        manager.start("tok-1").await.unwrap();

        // Wait for the disconnect after the first connection drops, then
        // stop inside the back-off window.
        while let Some(event) = next_event(&mut events).await {
            if let StreamEvent::State(ConnectionState::Disconnected) = event {
                break;
            }
        }
        manager.stop().await;

        sleep(Duration::from_millis(900)).await;
        assert_eq!(accepts.load(Ordering::SeqCst), 1);
        assert_eq!(manager.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_start_is_noop_for_same_token() {
        let (url, accepts) = spawn_feed_server(vec![], true).await;
        let manager = Arc::new(SignalStreamManager::new(test_config(url)));
        manager.start("tok-1").await.unwrap();
        sleep(Duration::from_millis(200)).await;
        manager.start("tok-1").await.unwrap();
        sleep(Duration::from_millis(200)).await;

        assert_eq!(accepts.load(Ordering::SeqCst), 1);
        assert_eq!(manager.state().await, ConnectionState::Connected);

        manager.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let manager = Arc::new(SignalStreamManager::new(StreamConfig::default()));
        manager.stop().await;
        manager.stop().await;
        assert_eq!(manager.state().await, ConnectionState::Disconnected);
    }

    #[test]
    fn test_poll_url_derivation() {
        let manager = SignalStreamManager::new(StreamConfig {
            url: "wss://feed.example.com/feed".to_string(),
            ..StreamConfig::default()
        });
        let url = manager.poll_url("tok-1").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.path(), "/feed/poll");
        assert!(url.query().unwrap().contains("token=tok-1"));
    }

    #[test]
    fn test_feed_url_embeds_token() {
        let manager = SignalStreamManager::new(StreamConfig::default());
        let url = manager.feed_url("abc").unwrap();
        assert!(url.as_str().ends_with("/feed?token=abc"));
    }
}
