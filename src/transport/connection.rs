//! Protocol client: WebSocket connection and receive loop.
//!
//! The [`Client`] owns the live connection to the browser process. It
//! assigns command ids, registers pending slots in the
//! [`CorrelationTable`], and drives a single receive loop that resolves
//! responses and hands events to the [`EventRouter`].
//!
//! # Receive Loop
//!
//! The connection spawns one tokio task per client that handles:
//!
//! - Incoming frames from the remote end (responses, events)
//! - Outgoing commands from the API
//! - Correlation by command id
//! - Event dispatch to subscribers
//!
//! The loop never awaits a pending slot itself, so a handler running on
//! the loop must not issue a blocking `send()` of its own.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::SubscriptionId;
use crate::protocol::{CommandEnvelope, EventEnvelope, IncomingMessage, ResponseEnvelope};

use super::correlation::CorrelationTable;
use super::router::{EventHandler, EventRouter};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for command execution.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for the WebSocket handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum pending commands before rejecting new ones.
const MAX_PENDING_COMMANDS: usize = 100;

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Internal commands for the receive loop.
enum LoopCommand {
    /// Serialize and write a command envelope.
    Send(CommandEnvelope),
    /// Close the socket and terminate the loop.
    Shutdown,
}

// ============================================================================
// Client
// ============================================================================

/// Protocol client for one WebSocket connection.
///
/// Exposes `send(method, params)` as the sole non-blocking primitive
/// used by every higher-level object, plus event subscription.
///
/// # Thread Safety
///
/// `Client` is `Send + Sync` and cheap to clone; clones share the same
/// connection, correlation table and event router.
#[derive(Clone)]
pub struct Client {
    /// Channel handing outgoing work to the receive loop.
    command_tx: mpsc::UnboundedSender<LoopCommand>,
    /// Pending-slot table (shared with the receive loop).
    correlation: Arc<CorrelationTable>,
    /// Event subscription registry (shared with the receive loop).
    router: Arc<EventRouter>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

impl Client {
    /// Connects to a browser-control endpoint.
    ///
    /// Establishes the WebSocket transport and spawns the receive loop.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if the URL is invalid or the handshake is
    ///   refused
    /// - [`Error::ConnectionTimeout`] if the handshake does not complete
    ///   within 30s
    pub async fn connect(url: &str) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|e| Error::connection(format!("invalid URL: {e}")))?;

        let (ws_stream, _) = timeout(HANDSHAKE_TIMEOUT, connect_async(parsed.as_str()))
            .await
            .map_err(|_| Error::connection_timeout(HANDSHAKE_TIMEOUT.as_millis() as u64))?
            .map_err(|e| Error::connection(e.to_string()))?;

        debug!(url = %parsed, "WebSocket connected");
        Ok(Self::from_stream(ws_stream))
    }

    /// Creates a client from an established WebSocket stream.
    ///
    /// Spawns the receive loop task internally.
    pub(crate) fn from_stream(ws_stream: WsStream) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let correlation = Arc::new(CorrelationTable::new());
        let router = Arc::new(EventRouter::new());

        tokio::spawn(Self::run_receive_loop(
            ws_stream,
            command_rx,
            Arc::clone(&correlation),
            Arc::clone(&router),
        ));

        Self {
            command_tx,
            correlation,
            router,
        }
    }

    /// Sends a command and waits for its response with the default
    /// timeout (30s).
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection is gone
    /// - [`Error::RequestTimeout`] if no response arrives in time
    /// - [`Error::Remote`] if the remote end answered with an error
    /// - [`Error::Protocol`] if too many commands are pending
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        self.send_with_timeout(method, params, DEFAULT_COMMAND_TIMEOUT)
            .await
    }

    /// Sends a command and waits for its response with a custom timeout.
    ///
    /// On timeout the pending slot is unregistered; a response arriving
    /// later is discarded by the receive loop.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub async fn send_with_timeout(
        &self,
        method: &str,
        params: Value,
        command_timeout: Duration,
    ) -> Result<Value> {
        if self.correlation.len() >= MAX_PENDING_COMMANDS {
            warn!(
                pending = self.correlation.len(),
                max = MAX_PENDING_COMMANDS,
                "Too many pending commands"
            );
            return Err(Error::protocol(format!(
                "Too many pending commands: {}/{}",
                self.correlation.len(),
                MAX_PENDING_COMMANDS
            )));
        }

        let envelope = CommandEnvelope::new(method, params);
        let id = envelope.id;

        // Register the slot before the envelope can reach the wire so the
        // response cannot race the registration.
        let response_rx = self.correlation.register(id);

        if self.command_tx.send(LoopCommand::Send(envelope)).is_err() {
            self.correlation.remove(id);
            return Err(Error::ConnectionClosed);
        }

        match timeout(command_timeout, response_rx).await {
            Ok(Ok(result)) => result?.into_result(),
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                self.correlation.remove(id);
                Err(Error::request_timeout(
                    id,
                    command_timeout.as_millis() as u64,
                ))
            }
        }
    }

    /// Registers an event handler.
    ///
    /// When `context` is given, only events for that browsing context
    /// match; otherwise any context matches.
    pub fn subscribe(
        &self,
        method: impl Into<String>,
        context: Option<String>,
        handler: EventHandler,
    ) -> SubscriptionId {
        self.router.subscribe(method, context, handler)
    }

    /// Removes an event subscription.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.router.unsubscribe(id)
    }

    /// Returns the number of active event subscriptions.
    #[inline]
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.router.subscription_count()
    }

    /// Returns the number of in-flight commands.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.correlation.len()
    }

    /// Returns `true` once the receive loop has terminated.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }

    /// Closes the connection.
    ///
    /// Stops the receive loop, which fails every pending command with
    /// [`Error::ConnectionClosed`]. Idempotent: closing an already
    /// closed client is a no-op.
    pub fn close(&self) {
        let _ = self.command_tx.send(LoopCommand::Shutdown);
    }

    // ========================================================================
    // Receive loop
    // ========================================================================

    /// Receive loop handling WebSocket I/O for one connection.
    async fn run_receive_loop(
        ws_stream: WsStream,
        mut command_rx: mpsc::UnboundedReceiver<LoopCommand>,
        correlation: Arc<CorrelationTable>,
        router: Arc<EventRouter>,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Incoming frames from the remote end
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_incoming(&text, &correlation, &router);
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Outgoing work from the API
                command = command_rx.recv() => {
                    match command {
                        Some(LoopCommand::Send(envelope)) => {
                            Self::write_command(envelope, &mut ws_write, &correlation).await;
                        }

                        Some(LoopCommand::Shutdown) => {
                            debug!("Shutdown requested");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!("Command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        // Connection is gone: every waiter gets ConnectionClosed.
        correlation.fail_all();

        debug!("Receive loop terminated");
    }

    /// Handles one incoming text frame.
    fn handle_incoming(text: &str, correlation: &CorrelationTable, router: &EventRouter) {
        match IncomingMessage::parse(text) {
            Ok(IncomingMessage::Response(response)) => {
                Self::handle_response(response, correlation);
            }
            Ok(IncomingMessage::Event(event)) => {
                Self::handle_event(&event, router);
            }
            Err(e) => {
                // Protocol anomaly: logged, never fatal.
                warn!(error = %e, text = %text, "Unparseable incoming frame");
            }
        }
    }

    fn handle_response(response: ResponseEnvelope, correlation: &CorrelationTable) {
        let id = response.id;
        if correlation.resolve(response) {
            trace!(%id, "Response correlated");
        } else {
            // Unknown id: either a late response whose slot timed out, or
            // an id this client never issued.
            warn!(%id, "Response for unknown command id");
        }
    }

    fn handle_event(event: &EventEnvelope, router: &EventRouter) {
        let delivered = router.dispatch(event);
        trace!(method = %event.method, delivered, "Event received");
    }

    /// Serializes and writes one command envelope.
    async fn write_command(
        envelope: CommandEnvelope,
        ws_write: &mut WsSink,
        correlation: &CorrelationTable,
    ) {
        let id = envelope.id;

        let json = match serde_json::to_string(&envelope) {
            Ok(j) => j,
            Err(e) => {
                correlation.fail(id, Error::Json(e));
                return;
            }
        };

        if let Err(e) = ws_write.send(Message::Text(json.into())).await {
            correlation.fail(id, Error::connection(e.to_string()));
            return;
        }

        trace!(%id, method = %envelope.method, "Command sent");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(DEFAULT_COMMAND_TIMEOUT.as_secs(), 30);
        assert_eq!(HANDSHAKE_TIMEOUT.as_secs(), 30);
        assert_eq!(MAX_PENDING_COMMANDS, 100);
    }

    #[test]
    fn test_client_is_clone_and_send() {
        fn assert_clone<T: Clone>() {}
        fn assert_send_sync<T: Send + Sync>() {}
        assert_clone::<Client>();
        assert_send_sync::<Client>();
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_url() {
        let err = Client::connect("not a url").await.expect_err("invalid");
        assert!(matches!(err, Error::Connection { .. }));
    }
}
