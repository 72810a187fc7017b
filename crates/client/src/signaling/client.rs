//! JSON-RPC signaling client
//!
//! Correlates requests with responses by id over one [`TransportLink`],
//! enforces per-request deadlines, keeps the connection alive with heartbeats
//! and hands unsolicited notifications to the handler registered for their
//! method, strictly in receipt order.

use super::protocol::{methods, IncomingFrame, JsonRpcRequest};
use super::transport::{Transport, TransportCommand, TransportEvent, TransportLink};
use crate::{Error, Result};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Handler invoked for one notification method
pub type NotificationHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Connectivity change observed on the underlying transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityEvent {
    /// Connection lost (includes missed heartbeat acknowledgements)
    Disconnected { reason: String },
    /// Reconnection attempt in progress
    Reconnecting { attempt: usize },
    /// Connection restored
    Reconnected,
    /// Reconnection window exhausted
    Failed { reason: String },
    /// Closed on request
    Closed,
}

/// Timing knobs for the signaling client
#[derive(Debug, Clone, Copy)]
pub struct SignalingOptions {
    /// Deadline for each request
    pub request_timeout: Duration,
    /// Heartbeat period
    pub heartbeat_interval: Duration,
}

impl Default for SignalingOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            heartbeat_interval: Duration::from_secs(5),
        }
    }
}

/// One in-flight request
struct PendingRequest {
    method: String,
    deadline: Instant,
    reply: oneshot::Sender<Result<Value>>,
}

/// State shared by the client handle, the dispatch task and the heartbeat
struct Inner {
    commands: mpsc::UnboundedSender<TransportCommand>,
    pending: Mutex<HashMap<u64, PendingRequest>>,
    handlers: RwLock<HashMap<String, NotificationHandler>>,
    next_id: AtomicU64,
    connected: AtomicBool,
    options: SignalingOptions,
}

/// JSON-RPC client over a persistent transport
pub struct SignalingClient {
    inner: Arc<Inner>,
    connectivity: Mutex<Option<mpsc::UnboundedReceiver<ConnectivityEvent>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SignalingClient {
    /// Open the transport to `uri` and start dispatch and heartbeat tasks
    pub async fn connect(
        transport: &dyn Transport,
        uri: &str,
        options: SignalingOptions,
    ) -> Result<Self> {
        let link = transport.open(uri).await?;
        Ok(Self::start(link, options))
    }

    /// Start the client on an already-open link
    ///
    /// # Example
    ///
    /// ```
    /// use openroom_client::signaling::{
    ///     SignalingClient, SignalingOptions, TransportCommand, TransportLink,
    /// };
    /// use serde_json::json;
    ///
    /// # tokio_test::block_on(async {
    /// let (link, mut commands, _events) = TransportLink::pair();
    /// let client = SignalingClient::start(link, SignalingOptions::default());
    /// client.send_detached("sendMessage", json!({ "message": "{}" })).unwrap();
    /// assert!(matches!(commands.recv().await, Some(TransportCommand::Send(_))));
    /// # });
    /// ```
    pub fn start(link: TransportLink, options: SignalingOptions) -> Self {
        let TransportLink { commands, events } = link;

        let inner = Arc::new(Inner {
            commands,
            pending: Mutex::new(HashMap::new()),
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            connected: AtomicBool::new(true),
            options,
        });

        let (connectivity_tx, connectivity_rx) = mpsc::unbounded_channel();

        let dispatch = tokio::spawn(dispatch_task(Arc::clone(&inner), events, connectivity_tx));
        let heartbeat = tokio::spawn(heartbeat_task(Arc::downgrade(&inner)));

        Self {
            inner,
            connectivity: Mutex::new(Some(connectivity_rx)),
            tasks: Mutex::new(vec![dispatch, heartbeat]),
        }
    }

    /// Send a request and wait for its result.
    ///
    /// Fails with [`Error::RequestTimeout`] once the deadline passes and with
    /// [`Error::TransportClosed`] if the connection drops first.
    pub async fn send_request(&self, method: &str, params: Value) -> Result<Value> {
        self.inner.request(method, params).await
    }

    /// Send a request whose outcome only matters for logging
    pub fn send_detached(&self, method: &str, params: Value) -> Result<()> {
        let (id, rx) = self.inner.register(method, params)?;
        let method = method.to_string();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if let Err(e) = inner.wait(id, &method, rx).await {
                warn!("Detached request '{}' failed: {}", method, e);
            }
        });
        Ok(())
    }

    /// Register the handler for a notification method, replacing any previous one
    pub fn register_notification_handler<F>(&self, method: &str, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        if self
            .inner
            .handlers
            .write()
            .insert(method.to_string(), Arc::new(handler))
            .is_some()
        {
            debug!("Replaced notification handler for {}", method);
        }
    }

    /// Take the connectivity event stream (only the first caller gets it)
    pub fn take_connectivity_events(&self) -> Option<mpsc::UnboundedReceiver<ConnectivityEvent>> {
        self.connectivity.lock().take()
    }

    /// Whether the transport is currently usable
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Number of requests still awaiting a response
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Close the transport and stop background tasks
    pub fn close(&self) {
        info!("Closing signaling client");
        let _ = self.inner.commands.send(TransportCommand::Close);
        self.inner.mark_disconnected();
    }
}

impl Drop for SignalingClient {
    fn drop(&mut self) {
        let _ = self.inner.commands.send(TransportCommand::Close);
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl Inner {
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let (id, rx) = self.register(method, params)?;
        self.wait(id, method, rx).await
    }

    /// Allocate an id, record the pending entry and transmit the frame.
    ///
    /// The connectivity check, the insert and the send happen under the
    /// `pending` lock so a concurrent disconnect either sees the entry or
    /// makes this call fail with `TransportClosed`.
    fn register(&self, method: &str, params: Value) -> Result<(u64, oneshot::Receiver<Result<Value>>)> {
        let mut pending = self.pending.lock();
        if !self.connected.load(Ordering::SeqCst) {
            return Err(Error::TransportClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let frame = JsonRpcRequest::new(id, method, params).to_json()?;
        let (tx, rx) = oneshot::channel();

        pending.insert(
            id,
            PendingRequest {
                method: method.to_string(),
                deadline: Instant::now() + self.options.request_timeout,
                reply: tx,
            },
        );

        debug!("Sending request {} '{}'", id, method);
        if self.commands.send(TransportCommand::Send(frame)).is_err() {
            pending.remove(&id);
            return Err(Error::TransportClosed);
        }

        Ok((id, rx))
    }

    async fn wait(&self, id: u64, method: &str, rx: oneshot::Receiver<Result<Value>>) -> Result<Value> {
        let deadline = match self.pending.lock().get(&id) {
            Some(entry) => entry.deadline,
            // Already resolved before we started waiting
            None => Instant::now() + self.options.request_timeout,
        };

        match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(Error::TransportClosed),
            Err(_) => {
                // Abandon locally; a late response for this id is ignored
                self.pending.lock().remove(&id);
                warn!("Request {} '{}' timed out", id, method);
                Err(Error::RequestTimeout {
                    method: method.to_string(),
                    id,
                    timeout_ms: self.options.request_timeout.as_millis() as u64,
                })
            }
        }
    }

    fn resolve(&self, id: u64, outcome: Result<Value>) {
        match self.pending.lock().remove(&id) {
            Some(entry) => {
                debug!("Response for request {} '{}'", id, entry.method);
                let _ = entry.reply.send(outcome);
            }
            None => debug!("Ignoring response for unknown or expired request {}", id),
        }
    }

    /// Clear `connected` and fail every in-flight request; returns whether
    /// the client was connected before
    fn mark_disconnected(&self) -> bool {
        let (was_connected, drained) = {
            let mut pending = self.pending.lock();
            let was_connected = self.connected.swap(false, Ordering::SeqCst);
            let drained: Vec<(u64, PendingRequest)> = pending.drain().collect();
            (was_connected, drained)
        };
        for (id, entry) in drained {
            debug!("Failing in-flight request {} '{}'", id, entry.method);
            let _ = entry.reply.send(Err(Error::TransportClosed));
        }
        was_connected
    }

    fn dispatch_frame(&self, text: &str) {
        match IncomingFrame::parse(text) {
            Ok(IncomingFrame::Response { id, outcome }) => {
                let outcome = outcome.map_err(|e| Error::Rpc {
                    code: e.code,
                    message: e.message,
                });
                self.resolve(id, outcome);
            }
            Ok(IncomingFrame::Notification { method, params }) => {
                let handler = self.handlers.read().get(&method).cloned();
                match handler {
                    Some(handler) => handler(params),
                    None => warn!("No handler for notification: {}", method),
                }
            }
            Err(e) => warn!("Dropping signaling frame: {}", e),
        }
    }
}

async fn dispatch_task(
    inner: Arc<Inner>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    connectivity: mpsc::UnboundedSender<ConnectivityEvent>,
) {
    while let Some(event) = events.recv().await {
        let terminal = event.is_terminal();
        match event {
            TransportEvent::Message(text) => inner.dispatch_frame(&text),
            TransportEvent::Disconnected { reason } => {
                inner.mark_disconnected();
                let _ = connectivity.send(ConnectivityEvent::Disconnected { reason });
            }
            TransportEvent::Reconnecting { attempt } => {
                let _ = connectivity.send(ConnectivityEvent::Reconnecting { attempt });
            }
            TransportEvent::Reconnected => {
                inner.connected.store(true, Ordering::SeqCst);
                let _ = connectivity.send(ConnectivityEvent::Reconnected);
            }
            TransportEvent::Failed { reason } => {
                inner.mark_disconnected();
                let _ = connectivity.send(ConnectivityEvent::Failed { reason });
            }
            TransportEvent::Closed => {
                inner.mark_disconnected();
                let _ = connectivity.send(ConnectivityEvent::Closed);
            }
        }
        if terminal {
            break;
        }
    }

    if inner.mark_disconnected() {
        // Transport vanished without a terminal event
        let _ = connectivity.send(ConnectivityEvent::Failed {
            reason: "transport event stream ended".to_string(),
        });
    }

    debug!("Signaling dispatch task terminated");
}

async fn heartbeat_task(inner: std::sync::Weak<Inner>) {
    let period = match inner.upgrade() {
        Some(inner) => inner.options.heartbeat_interval,
        None => return,
    };
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let Some(inner) = inner.upgrade() else { break };
        if !inner.connected.load(Ordering::SeqCst) {
            continue;
        }

        let params = json!({ "interval": period.as_millis() as u64 });
        match inner.request(methods::PING, params).await {
            Ok(_) => debug!("Heartbeat acknowledged"),
            Err(Error::RequestTimeout { .. }) => {
                // Same path as any other loss of connectivity
                warn!("Heartbeat not acknowledged, forcing reconnection");
                let _ = inner.commands.send(TransportCommand::Reconnect);
            }
            Err(e) if e.is_transport_level() => debug!("Heartbeat skipped: {}", e),
            // The server is alive even if it rejects the ping
            Err(e) => warn!("Heartbeat rejected: {}", e),
        }
    }
}
