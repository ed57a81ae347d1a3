//! Device update push stream with auto-reconnect.
//!
//! A [`Connector`] opens one connection to `GET /devices/{id}/updates` and
//! yields its text messages as [`StreamFrame`]s. [`UpdateStreamHandle`] wraps
//! a connector in a background loop that reconnects forever with a linear
//! backoff capped at 30s, reporting every life-cycle transition and message
//! through an ordered [`StreamSignal`] channel.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use silowatch_api::stream::{ReconnectConfig, SseConnector, StreamSignal, UpdateStreamHandle};
//! use tokio_util::sync::CancellationToken;
//!
//! let connector = Arc::new(SseConnector::new(url, &transport)?);
//! let (handle, mut rx) =
//!     UpdateStreamHandle::spawn(connector, ReconnectConfig::default(), CancellationToken::new());
//!
//! while let Some(signal) = rx.recv().await {
//!     if let StreamSignal::Frame(frame) = signal {
//!         println!("{}", frame.data);
//!     }
//! }
//!
//! handle.shutdown();
//! ```

mod sse;
mod websocket;

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Error;

pub use sse::{SseConnector, SseDecoder};
pub use websocket::WebSocketConnector;

// ── Signal channel capacity ──────────────────────────────────────────

const SIGNAL_CHANNEL_CAPACITY: usize = 256;

// ── Frames ───────────────────────────────────────────────────────────

/// One discrete message received from the push stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamFrame {
    /// Message body, usually a JSON document.
    pub data: String,
    /// Transport-level message id (SSE `id:` field), if any.
    pub event_id: Option<String>,
    /// Transport-level event name (SSE `event:` field), if any.
    pub event: Option<String>,
}

impl StreamFrame {
    pub fn text(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }
}

/// Frames from a single open connection. Ends when the server closes it.
pub type FrameStream = BoxStream<'static, Result<StreamFrame, Error>>;

/// Opens one push-stream connection.
///
/// The returned future resolves once the server has accepted the
/// subscription; its frames are then read until the stream ends or errors.
pub trait Connector: Send + Sync {
    fn connect(&self) -> BoxFuture<'_, Result<FrameStream, Error>>;
}

// ── Signals ──────────────────────────────────────────────────────────

/// Life-cycle and data notifications from the reconnect loop, delivered in
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSignal {
    /// A connection attempt is starting. `attempt` counts from 1.
    Connecting { attempt: u64 },
    /// The server accepted the subscription.
    Connected,
    /// A message arrived on the open connection.
    Frame(StreamFrame),
    /// The connection failed or ended; a reconnect follows after `retry_in`.
    Failed {
        error: String,
        failures: u32,
        retry_in: Duration,
    },
}

// ── Reconnect policy ─────────────────────────────────────────────────

/// Linear backoff: `base × failures`, never below `base` and never above
/// `max_delay`. The failure count is never reset, so once the cap is
/// reached every retry waits `max_delay`.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay unit per failure. Default: 2s.
    pub base_delay: Duration,
    /// Upper bound on the delay. Default: 30s.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectConfig {
    pub fn delay_for(&self, failures: u32) -> Duration {
        self.base_delay
            .saturating_mul(failures)
            .min(self.max_delay)
            .max(self.base_delay)
    }
}

// ── UpdateStreamHandle ───────────────────────────────────────────────

/// Handle to a running reconnect loop.
///
/// Cancelling the token (or calling [`shutdown`](Self::shutdown)) stops the
/// loop at whatever it is awaiting, including a pending backoff sleep. No
/// signal is sent after cancellation is observed.
pub struct UpdateStreamHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl UpdateStreamHandle {
    /// Spawn the reconnect loop. The first connection attempt starts
    /// immediately in the background.
    pub fn spawn(
        connector: Arc<dyn Connector>,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<StreamSignal>) {
        let (tx, rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);

        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            stream_loop(connector, tx, reconnect, task_cancel).await;
        });

        (Self { cancel, task }, rx)
    }

    /// Signal the background loop to stop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Stop the loop and wait for it to exit.
    pub async fn close(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "update stream task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → read → on error or end, backoff → reconnect.
async fn stream_loop(
    connector: Arc<dyn Connector>,
    tx: mpsc::Sender<StreamSignal>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u64 = 0;
    let mut failures: u32 = 0;

    loop {
        attempt += 1;
        if !emit(&tx, &cancel, StreamSignal::Connecting { attempt }).await {
            break;
        }

        let error = match run_connection(connector.as_ref(), &tx, &cancel).await {
            Ok(()) => break,
            Err(e) => e,
        };

        failures = failures.saturating_add(1);
        let delay = reconnect.delay_for(failures);
        warn!(
            error = %error,
            attempt,
            failures,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "update stream failed, reconnect scheduled"
        );

        let signal = StreamSignal::Failed {
            error: error.to_string(),
            failures,
            retry_in: delay,
        };
        if !emit(&tx, &cancel, signal).await {
            break;
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    debug!("update stream loop exiting");
}

/// Drive a single connection until it fails or ends.
///
/// `Ok(())` means the loop should stop (cancelled or nobody listening);
/// `Err` is a transport failure that triggers a reconnect.
async fn run_connection(
    connector: &dyn Connector,
    tx: &mpsc::Sender<StreamSignal>,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    let mut frames = tokio::select! {
        biased;
        () = cancel.cancelled() => return Ok(()),
        result = connector.connect() => result?,
    };

    info!("update stream connected");
    if !emit(tx, cancel, StreamSignal::Connected).await {
        return Ok(());
    }

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            next = frames.next() => next,
        };

        match next {
            Some(Ok(frame)) => {
                if !emit(tx, cancel, StreamSignal::Frame(frame)).await {
                    return Ok(());
                }
            }
            Some(Err(e)) => return Err(e),
            None => {
                return Err(Error::StreamClosed {
                    reason: "server ended the stream".into(),
                });
            }
        }
    }
}

/// Deliver a signal unless cancelled. Returns `false` when the loop should
/// stop.
async fn emit(
    tx: &mpsc::Sender<StreamSignal>,
    cancel: &CancellationToken,
    signal: StreamSignal,
) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        sent = tx.send(signal) => sent.is_ok(),
    }
}

// ── Tests ────────────────────────────────────────────────────────────
