// ── Stream connection manager ──
//
// Owns the live push-stream subscription for one device at a time. Signals
// from the reconnect loop are folded into an observable `StreamState`;
// message frames are normalized and applied to the `UpdateAggregator` in
// delivery order.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use silowatch_api::DeviceClient;
use silowatch_api::stream::{
    Connector, ReconnectConfig, SseConnector, StreamFrame, StreamSignal, UpdateStreamHandle,
    WebSocketConnector,
};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::{MonitorConfig, StreamTransport};
use crate::error::CoreError;
use crate::model::UpdateKind;
use crate::normalize::normalize_value;
use crate::store::UpdateAggregator;
use crate::stream::StateStream;

/// Builds the connector for a device's update stream.
pub type ConnectorFactory =
    Arc<dyn Fn(&str) -> Result<Arc<dyn Connector>, CoreError> + Send + Sync>;

/// Connector factory for the configured transport.
///
/// `client` supplies the endpoint URLs; the SSE transport gets its own HTTP
/// client without a total request timeout.
pub fn connector_factory(
    config: &MonitorConfig,
    client: DeviceClient,
) -> Result<ConnectorFactory, CoreError> {
    let transport = config.transport_config();
    let kind = config.transport;
    let stream_http = transport.build_stream_client()?;
    let authorization = transport.authorization_header();

    Ok(Arc::new(move |device_id: &str| -> Result<Arc<dyn Connector>, CoreError> {
        let connector: Arc<dyn Connector> = match kind {
            StreamTransport::Sse => Arc::new(SseConnector::with_client(
                client.updates_url(device_id)?,
                stream_http.clone(),
            )),
            StreamTransport::WebSocket => Arc::new(WebSocketConnector::new(
                client.websocket_url(device_id)?,
                authorization.clone(),
            )),
        };
        Ok(connector)
    }))
}

// ── Observable state ─────────────────────────────────────────────────

/// Connectivity of the live update stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "kebab-case", tag = "state")]
#[strum(serialize_all = "kebab-case")]
pub enum StreamStatus {
    /// Nothing opened yet.
    #[default]
    Idle,
    Connecting,
    Open,
    /// The connection failed; a retry is pending.
    ReconnectScheduled {
        #[serde(rename = "delayMs", serialize_with = "serialize_millis")]
        delay: std::time::Duration,
    },
    /// The stream could not be set up at all; no retry will follow.
    Error,
    Closed,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_millis<S: serde::Serializer>(
    delay: &std::time::Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX))
}

/// Counters for the current subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStats {
    pub attempts: u64,
    pub successes: u64,
    /// Consecutive-and-cumulative failure count driving the backoff.
    pub failures: u32,
    pub messages: u64,
    pub skipped: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamState {
    pub device_id: Option<String>,
    pub status: StreamStatus,
    pub stats: StreamStats,
    /// Last connectivity error. Cleared when a connection opens.
    pub error: Option<String>,
}

impl StreamState {
    pub fn is_streaming(&self) -> bool {
        self.status == StreamStatus::Open
    }
}

// ── StreamConnectionManager ──────────────────────────────────────────

struct Subscription {
    device_id: String,
    cancel: CancellationToken,
    stream: UpdateStreamHandle,
    pump: JoinHandle<()>,
}

impl Subscription {
    async fn shutdown(self) {
        self.cancel.cancel();
        self.stream.close().await;
        if let Err(e) = self.pump.await {
            warn!(device_id = %self.device_id, error = %e, "stream pump ended abnormally");
        }
    }
}

/// At most one live subscription, feeding one aggregator.
pub struct StreamConnectionManager {
    aggregator: Arc<UpdateAggregator>,
    factory: ConnectorFactory,
    reconnect: ReconnectConfig,
    state: Arc<watch::Sender<StreamState>>,
    subscription: Mutex<Option<Subscription>>,
    parent: CancellationToken,
}

impl StreamConnectionManager {
    pub fn new(
        aggregator: Arc<UpdateAggregator>,
        factory: ConnectorFactory,
        reconnect: ReconnectConfig,
    ) -> Self {
        let (state, _) = watch::channel(StreamState::default());
        Self {
            aggregator,
            factory,
            reconnect,
            state: Arc::new(state),
            subscription: Mutex::new(None),
            parent: CancellationToken::new(),
        }
    }

    /// Derive every subscription's token from `parent`, so cancelling it
    /// stops the stream without going through `close()`.
    pub fn with_parent(mut self, parent: CancellationToken) -> Self {
        self.parent = parent;
        self
    }

    pub fn aggregator(&self) -> &Arc<UpdateAggregator> {
        &self.aggregator
    }

    pub fn state(&self) -> StreamState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> StateStream<StreamState> {
        StateStream::new(self.state.subscribe())
    }

    pub fn is_streaming(&self) -> bool {
        self.state.borrow().is_streaming()
    }

    pub fn error(&self) -> Option<String> {
        self.state.borrow().error.clone()
    }

    /// Subscribe to `device_id`'s updates, replacing any open subscription.
    ///
    /// Returns once the reconnect loop is running; the connection itself is
    /// established in the background. Fails only if the stream cannot be
    /// set up at all (e.g. the endpoint URL cannot be built).
    pub async fn open(&self, device_id: &str) -> Result<(), CoreError> {
        let mut slot = self.subscription.lock().await;
        if let Some(previous) = slot.take() {
            debug!(device_id = %previous.device_id, "closing previous subscription");
            previous.shutdown().await;
        }

        let connector = match (self.factory)(device_id) {
            Ok(connector) => connector,
            Err(err) => {
                warn!(device_id, error = %err, "cannot open update stream");
                self.state.send_replace(StreamState {
                    device_id: Some(device_id.to_owned()),
                    status: StreamStatus::Error,
                    stats: StreamStats::default(),
                    error: Some(err.to_string()),
                });
                return Err(err);
            }
        };

        self.state.send_replace(StreamState {
            device_id: Some(device_id.to_owned()),
            status: StreamStatus::Connecting,
            ..StreamState::default()
        });

        let cancel = self.parent.child_token();
        let (stream, signals) =
            UpdateStreamHandle::spawn(connector, self.reconnect.clone(), cancel.clone());
        let pump = tokio::spawn(pump_signals(
            signals,
            device_id.to_owned(),
            Arc::clone(&self.state),
            Arc::clone(&self.aggregator),
            cancel.clone(),
        ));

        info!(device_id, "update stream opened");
        *slot = Some(Subscription {
            device_id: device_id.to_owned(),
            cancel,
            stream,
            pump,
        });
        Ok(())
    }

    /// Close the subscription and wait for its tasks to finish. Safe to
    /// call repeatedly; no update reaches the aggregator afterwards.
    pub async fn close(&self) {
        let subscription = self.subscription.lock().await.take();
        if let Some(subscription) = subscription {
            debug!(device_id = %subscription.device_id, "closing update stream");
            subscription.shutdown().await;
        }
        self.state.send_if_modified(|state| {
            if state.status == StreamStatus::Closed {
                return false;
            }
            state.status = StreamStatus::Closed;
            true
        });
    }
}

// ── Signal pump ──────────────────────────────────────────────────────

async fn pump_signals(
    mut signals: mpsc::Receiver<StreamSignal>,
    device_id: String,
    state: Arc<watch::Sender<StreamState>>,
    aggregator: Arc<UpdateAggregator>,
    cancel: CancellationToken,
) {
    loop {
        let signal = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            signal = signals.recv() => match signal {
                Some(signal) => signal,
                None => break,
            },
        };

        match signal {
            StreamSignal::Connecting { attempt } => state.send_modify(|s| {
                s.status = StreamStatus::Connecting;
                s.stats.attempts = attempt;
            }),
            StreamSignal::Connected => state.send_modify(|s| {
                s.status = StreamStatus::Open;
                s.stats.successes += 1;
                s.error = None;
            }),
            StreamSignal::Failed {
                error,
                failures,
                retry_in,
            } => state.send_modify(|s| {
                s.status = StreamStatus::ReconnectScheduled { delay: retry_in };
                s.stats.failures = failures;
                s.error = Some(error);
            }),
            StreamSignal::Frame(frame) => {
                let applied = ingest_frame(&frame, &device_id, &aggregator);
                state.send_modify(|s| {
                    if applied {
                        s.stats.messages += 1;
                    } else {
                        s.stats.skipped += 1;
                    }
                });
            }
        }
    }
    debug!(device_id, "stream pump exiting");
}

/// Normalize one frame and apply it. Returns `false` when the frame was
/// skipped.
fn ingest_frame(frame: &StreamFrame, device_id: &str, aggregator: &UpdateAggregator) -> bool {
    let body = frame.data.trim();
    if body.is_empty() {
        trace!(device_id, "empty frame skipped");
        return false;
    }
    let raw: Value = match serde_json::from_str(body) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(device_id, error = %e, "malformed stream message skipped");
            return false;
        }
    };

    let update = normalize_value(raw, Some(device_id), frame.event_id.as_deref(), Utc::now());
    if update.kind == UpdateKind::Unknown {
        debug!(device_id, update_id = %update.id, "unrecognized update kind");
    }
    aggregator.apply(update)
}
