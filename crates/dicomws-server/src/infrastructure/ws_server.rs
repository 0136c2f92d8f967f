//! WebSocket listener: accept loop, per-connection tasks, and shutdown.
//!
//! [`Listener::start`] binds the socket on the caller's thread, so a port
//! conflict is reported synchronously, and then moves the accept loop onto a
//! dedicated OS thread running its own single-threaded tokio runtime.  The
//! caller gets a [`Listener`] handle back immediately.
//!
//! ```text
//!  caller thread                 listener thread (current_thread runtime)
//!  ─────────────                 ─────────────────────────────────────────
//!  Listener::start ── bind ──▶   accept loop ─┬─▶ connection task (one per client)
//!        │                                    ├─▶ connection task
//!        ▼                                    └─▶ ...
//!  Listener::stop ── watch(true) ─▶ stop accepting, drain, abort stragglers
//!        │
//!        └── join thread ◀──────── runtime shut down
//! ```
//!
//! # Ordering
//!
//! A connection task reads one frame, awaits the complete reply, sends it,
//! and only then reads the next frame.  Replies on one connection therefore
//! come back in request order, and the two frames of a pixel reply are never
//! interleaved with anything else.  Separate connections run concurrently.
//!
//! # Shutdown
//!
//! [`Listener::stop`] closes the listening socket, lets every connection
//! finish the request it is working on, sends a Close frame, and waits up to
//! `shutdown_grace` for the tasks to end before aborting them.  It returns
//! only once the listener thread has exited.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::application::{RequestService, SeriesSource};
use crate::domain::config::ServerConfig;
use crate::domain::messages::OutboundFrame;
use crate::infrastructure::session_registry::{SessionId, SessionRegistry};

/// Pause after a failed `accept` so a persistent error (e.g. out of file
/// descriptors) does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Failures that prevent the listener from starting.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to start listener thread: {0}")]
    Runtime(#[source] io::Error),
}

/// Handle to a running listener.
///
/// Dropping the handle stops the listener.
pub struct Listener {
    local_addr: SocketAddr,
    registry: Arc<SessionRegistry>,
    shutdown: watch::Sender<bool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Listener {
    /// Binds `config.host:config.port` and starts accepting connections.
    ///
    /// Returns as soon as the socket is listening.  Connections are tracked
    /// in `registry` for as long as they are open.
    ///
    /// # Errors
    ///
    /// - [`ListenerError::Bind`] if the address cannot be bound (port in use,
    ///   unresolvable host, missing permission).
    /// - [`ListenerError::Runtime`] if the runtime or thread cannot be created.
    pub fn start<S: SeriesSource>(
        config: &ServerConfig,
        service: RequestService<S>,
        registry: Arc<SessionRegistry>,
    ) -> Result<Self, ListenerError> {
        let addr = config.bind_address();
        let bind_error = |source: io::Error| ListenerError::Bind {
            addr: addr.clone(),
            source,
        };

        let std_listener =
            std::net::TcpListener::bind((config.host.as_str(), config.port)).map_err(bind_error)?;
        // Required by `TcpListener::from_std`.
        std_listener.set_nonblocking(true).map_err(bind_error)?;
        let local_addr = std_listener.local_addr().map_err(bind_error)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ListenerError::Runtime)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let service = Arc::new(service);
        let grace = config.shutdown_grace;
        let task_registry = Arc::clone(&registry);

        let thread = std::thread::Builder::new()
            .name("dicomws-listener".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    match TcpListener::from_std(std_listener) {
                        Ok(listener) => {
                            accept_loop(listener, service, task_registry, shutdown_rx, grace).await
                        }
                        Err(e) => error!("failed to register listener with the runtime: {e}"),
                    }
                });
                // Blocking scans still running past the grace period are
                // detached rather than waited for.
                runtime.shutdown_timeout(grace);
            })
            .map_err(ListenerError::Runtime)?;

        info!("listening on ws://{local_addr}");

        Ok(Self {
            local_addr,
            registry,
            shutdown: shutdown_tx,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// The address actually bound.  Differs from the configured one when
    /// port `0` was requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Stops accepting, drains open connections, and waits for the listener
    /// thread to exit.
    ///
    /// Safe to call any number of times from any number of threads.  Exactly
    /// one call performs the shutdown and returns `true`; every other call
    /// returns `false`, after the shutdown has completed.
    pub fn stop(&self) -> bool {
        // Held across the join so a concurrent caller waits for completion.
        let mut thread = self.thread.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(handle) = thread.take() else {
            return false;
        };

        info!("stopping listener on {}", self.local_addr);
        self.shutdown.send_replace(true);
        if handle.join().is_err() {
            error!("listener thread panicked");
        }
        info!("listener on {} stopped", self.local_addr);
        true
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Accept loop ───────────────────────────────────────────────────────────────

/// Resolves once shutdown has been requested or the handle is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    // An error means the sender was dropped, which also means "stop".
    let _ = shutdown.wait_for(|stopping| *stopping).await;
}

async fn accept_loop<S: SeriesSource>(
    listener: TcpListener,
    service: Arc<RequestService<S>>,
    registry: Arc<SessionRegistry>,
    mut shutdown: watch::Receiver<bool>,
    grace: Duration,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            _ = shutdown_requested(&mut shutdown) => {
                info!("shutdown requested; no longer accepting connections");
                break;
            }

            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("new connection from {peer}");
                    connections.spawn(handle_connection(
                        stream,
                        peer,
                        Arc::clone(&service),
                        Arc::clone(&registry),
                        shutdown.clone(),
                    ));
                }
                Err(e) => {
                    error!("accept error: {e}");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },

            Some(finished) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = finished {
                    error!("connection task failed: {e}");
                }
            }
        }
    }

    // Release the port before draining so new clients are refused at once.
    drop(listener);

    if connections.is_empty() {
        return;
    }
    info!(
        "waiting up to {}s for {} open connection(s)",
        grace.as_secs(),
        connections.len()
    );
    let drained = tokio::time::timeout(grace, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(
            "{} connection(s) still busy after the grace period; aborting",
            connections.len()
        );
        connections.abort_all();
        while connections.join_next().await.is_some() {}
    }
}

// ── Per-connection handler ────────────────────────────────────────────────────

/// Entry point of each connection task.  Keeps the connection registered
/// while it runs and logs how it ended.
async fn handle_connection<S: SeriesSource>(
    stream: TcpStream,
    peer: SocketAddr,
    service: Arc<RequestService<S>>,
    registry: Arc<SessionRegistry>,
    shutdown: watch::Receiver<bool>,
) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed with {peer}: {e}");
            return;
        }
    };

    // Only completed handshakes count as sessions.
    let guard = registry.enter(peer);
    let session = guard.id();
    info!("session {session}: connected from {peer}");

    match run_connection(ws, session, &service, shutdown).await {
        Ok(()) => info!("session {session} ({peer}) closed"),
        Err(e) => warn!("session {session} ({peer}) closed with error: {e:#}"),
    }
}

async fn run_connection<S: SeriesSource>(
    mut ws: WebSocketStream<TcpStream>,
    session: SessionId,
    service: &RequestService<S>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    loop {
        let next = tokio::select! {
            biased;

            _ = shutdown_requested(&mut shutdown) => {
                debug!("session {session}: closing for shutdown");
                // The peer may already be gone; nothing to do if so.
                let _ = ws.close(None).await;
                return Ok(());
            }

            next = ws.next() => next,
        };

        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) | None => {
                debug!("session {session}: stream ended");
                return Ok(());
            }
            Some(Err(e)) => return Err(e).context("WebSocket read failed"),
        };

        match message {
            WsMessage::Text(text) => {
                let Some(frames) = service.handle_text(&text).await else {
                    continue;
                };
                for frame in frames {
                    ws.send(WsMessage::from(frame))
                        .await
                        .context("WebSocket send failed")?;
                }
            }
            WsMessage::Binary(data) => {
                warn!(
                    "session {session}: unexpected binary frame ({} bytes, ignored)",
                    data.len()
                );
            }
            WsMessage::Ping(_) | WsMessage::Pong(_) => {
                // tungstenite queues the Pong reply itself.
            }
            WsMessage::Close(_) => {
                debug!("session {session}: Close frame received");
                // Keep polling so tungstenite can flush its Close reply; the
                // stream then ends.
            }
            WsMessage::Frame(_) => {}
        }
    }
}

impl From<OutboundFrame> for WsMessage {
    fn from(frame: OutboundFrame) -> Self {
        match frame {
            OutboundFrame::Text(text) => WsMessage::Text(text),
            OutboundFrame::Binary(bytes) => WsMessage::Binary(bytes),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::mock::MockSeriesSource;

    fn ephemeral_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            shutdown_grace: Duration::from_millis(500),
            ..ServerConfig::default()
        }
    }

    fn start_mock(config: &ServerConfig) -> Result<Listener, ListenerError> {
        let service = RequestService::new(MockSeriesSource::new(), config);
        Listener::start(config, service, Arc::new(SessionRegistry::new()))
    }

    #[test]
    fn test_start_reports_bound_port() {
        // Arrange / Act
        let listener = start_mock(&ephemeral_config()).unwrap();

        // Assert
        assert_ne!(listener.local_addr().port(), 0);
        assert!(listener.registry().is_empty());
        assert!(listener.stop());
    }

    #[test]
    fn test_bind_conflict_is_reported_synchronously() {
        // Arrange: occupy a port
        let first = start_mock(&ephemeral_config()).unwrap();
        let taken = ServerConfig {
            port: first.local_addr().port(),
            ..ephemeral_config()
        };

        // Act
        let second = start_mock(&taken);

        // Assert
        assert!(matches!(second, Err(ListenerError::Bind { .. })));
        first.stop();
    }

    #[test]
    fn test_stop_twice_returns_true_then_false() {
        let listener = start_mock(&ephemeral_config()).unwrap();

        assert!(listener.stop());
        assert!(!listener.stop());
    }

    #[test]
    fn test_stop_releases_the_port() {
        let listener = start_mock(&ephemeral_config()).unwrap();
        let port = listener.local_addr().port();

        listener.stop();

        let again = ServerConfig {
            port,
            ..ephemeral_config()
        };
        let relisten = start_mock(&again);
        assert!(relisten.is_ok(), "port {port} should be free after stop");
    }

    #[test]
    fn test_connection_without_handshake_is_not_registered() {
        // Arrange: a raw TCP client that never sends the upgrade request
        let listener = start_mock(&ephemeral_config()).unwrap();
        let raw = std::net::TcpStream::connect(listener.local_addr()).unwrap();

        // Act
        std::thread::sleep(Duration::from_millis(200));

        // Assert
        assert!(listener.registry().is_empty());
        drop(raw);
        assert!(listener.stop());
    }

    #[test]
    fn test_failed_handshake_leaves_registry_empty() {
        use std::io::{Read, Write};

        // Arrange
        let listener = start_mock(&ephemeral_config()).unwrap();
        let mut raw = std::net::TcpStream::connect(listener.local_addr()).unwrap();
        raw.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

        // Act: a request line that is not a WebSocket upgrade
        raw.write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
        let mut response = Vec::new();
        let _ = raw.read_to_end(&mut response);

        // Assert
        assert!(listener.registry().is_empty());
        assert!(listener.stop());
    }

    #[test]
    fn test_outbound_frames_map_to_ws_messages() {
        assert_eq!(
            WsMessage::from(OutboundFrame::Text("{}".to_string())),
            WsMessage::Text("{}".to_string())
        );
        assert_eq!(
            WsMessage::from(OutboundFrame::Binary(vec![0x90])),
            WsMessage::Binary(vec![0x90])
        );
    }
}
