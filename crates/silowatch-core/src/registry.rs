// ── Device registry ──
//
// Tracks which device is active and owns that device's session: the
// update aggregator, the stream connection, the alert service and the
// background tasks tying them together. Switching devices tears the old
// session down completely before the new one starts.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use silowatch_api::DeviceClient;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::alerts::CriticalAlertService;
use crate::config::MonitorConfig;
use crate::connection::{ConnectorFactory, StreamConnectionManager, connector_factory};
use crate::error::CoreError;
use crate::store::{AggregateState, LatestAlert, UpdateAggregator};
use crate::stream::StateStream;

// ── DeviceSession ────────────────────────────────────────────────────

/// Everything that exists for one active device.
///
/// A session is never reused: when the active device changes it is torn
/// down and replaced, so no state can leak from one device to the next.
pub struct DeviceSession {
    device_id: Option<String>,
    aggregator: Arc<UpdateAggregator>,
    connection: StreamConnectionManager,
    alerts: CriticalAlertService,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DeviceSession {
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn aggregator(&self) -> &Arc<UpdateAggregator> {
        &self.aggregator
    }

    pub fn connection(&self) -> &StreamConnectionManager {
        &self.connection
    }

    pub fn alerts(&self) -> &CriticalAlertService {
        &self.alerts
    }

    pub fn is_streaming(&self) -> bool {
        self.connection.is_streaming()
    }

    /// Last stream connectivity error, if any.
    pub fn error(&self) -> Option<String> {
        self.connection.error()
    }

    async fn start(parts: &SessionParts, device_id: Option<String>) -> Self {
        let config = &parts.config;
        let aggregator = Arc::new(UpdateAggregator::new(config.history_capacity));
        let cancel = parts.root.child_token();
        let connection = StreamConnectionManager::new(
            Arc::clone(&aggregator),
            Arc::clone(&parts.factory),
            config.reconnect.clone(),
        )
        .with_parent(cancel.clone());
        let alerts = CriticalAlertService::new(
            device_id.clone(),
            parts.client.clone(),
            config.feedback_ttl,
        );
        let mut tasks = Vec::new();

        if let Some(id) = device_id.as_deref() {
            if config.stream_enabled {
                // A stream that cannot be set up is reported through the
                // connection state; the session itself still starts.
                if let Err(e) = connection.open(id).await {
                    warn!(device_id = id, error = %e, "live updates unavailable");
                }
                tasks.push(tokio::spawn(live_alert_bridge(
                    aggregator.subscribe(),
                    alerts.clone(),
                    cancel.clone(),
                )));
            }

            if config.fetch_alerts_on_activate || config.alert_refresh_interval_secs > 0 {
                tasks.push(tokio::spawn(alert_refresh_task(
                    alerts.clone(),
                    config.fetch_alerts_on_activate,
                    config.alert_refresh_interval_secs,
                    cancel.clone(),
                )));
            }
            info!(device_id = id, "device session started");
        }

        Self {
            device_id,
            aggregator,
            connection,
            alerts,
            cancel,
            tasks: Mutex::new(tasks),
        }
    }

    /// Stop every task, timer and socket belonging to this session.
    async fn teardown(&self) {
        self.cancel.cancel();
        self.connection.close().await;
        self.alerts.shutdown();

        let mut handles = self.tasks.lock().await;
        for handle in handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "session task ended abnormally");
            }
        }
        drop(handles);

        self.aggregator.reset();
        if let Some(id) = self.device_id() {
            debug!(device_id = id, "device session torn down");
        }
    }
}

// ── DeviceRegistry ───────────────────────────────────────────────────

/// Owner of the active device and its session.
///
/// Cheaply cloneable; clones share the same state.
#[derive(Clone)]
pub struct DeviceRegistry {
    inner: Arc<RegistryInner>,
}

struct SessionParts {
    config: MonitorConfig,
    client: DeviceClient,
    factory: ConnectorFactory,
    /// Parent of every session's token.
    root: CancellationToken,
}

struct RegistryInner {
    parts: SessionParts,
    active: watch::Sender<Option<String>>,
    session: watch::Sender<Arc<DeviceSession>>,
    switch_lock: Mutex<()>,
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        // Background work must not outlive the last registry handle.
        self.parts.root.cancel();
    }
}

impl DeviceRegistry {
    /// Build a registry with no active device.
    pub async fn new(config: MonitorConfig) -> Result<Self, CoreError> {
        let client = DeviceClient::new(config.url.as_str(), &config.transport_config())?;
        let factory = connector_factory(&config, client.clone())?;
        Ok(Self::with_parts(config, client, factory).await)
    }

    /// Build a registry around an existing client and stream connector
    /// factory.
    pub async fn with_parts(
        config: MonitorConfig,
        client: DeviceClient,
        factory: ConnectorFactory,
    ) -> Self {
        let parts = SessionParts {
            config,
            client,
            factory,
            root: CancellationToken::new(),
        };
        let idle = DeviceSession::start(&parts, None).await;
        let (active, _) = watch::channel(None);
        let (session, _) = watch::channel(Arc::new(idle));
        Self {
            inner: Arc::new(RegistryInner {
                parts,
                active,
                session,
                switch_lock: Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.parts.config
    }

    pub fn client(&self) -> &DeviceClient {
        &self.inner.parts.client
    }

    pub fn active_device(&self) -> Option<String> {
        self.inner.active.borrow().clone()
    }

    pub fn subscribe_active(&self) -> StateStream<Option<String>> {
        StateStream::new(self.inner.active.subscribe())
    }

    /// The current session. Holders of an old session keep a torn-down,
    /// empty object after a switch.
    pub fn session(&self) -> Arc<DeviceSession> {
        self.inner.session.borrow().clone()
    }

    pub fn subscribe_session(&self) -> StateStream<Arc<DeviceSession>> {
        StateStream::new(self.inner.session.subscribe())
    }

    /// Make `device_id` the active device (`None` to go offline).
    ///
    /// Blank ids count as `None`. Returns `false` when the device is
    /// already active; otherwise the previous session is fully torn down
    /// before the new one is published.
    pub async fn set_active_device(&self, device_id: Option<String>) -> bool {
        let device_id = device_id
            .map(|id| id.trim().to_owned())
            .filter(|id| !id.is_empty());

        let _switch = self.inner.switch_lock.lock().await;
        let current = self.session();
        if current.device_id == device_id {
            return false;
        }

        current.teardown().await;
        let next = DeviceSession::start(&self.inner.parts, device_id.clone()).await;
        self.inner.session.send_replace(Arc::new(next));
        self.inner.active.send_replace(device_id);
        true
    }

    /// Tear down the active session and go offline.
    pub async fn shutdown(&self) {
        self.set_active_device(None).await;
    }

    /// Run `f` against a session for `device_id` with no background work:
    /// no live stream, no automatic alert fetches. The session is torn
    /// down afterwards.
    pub async fn oneshot<F, Fut, T>(config: MonitorConfig, device_id: &str, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Arc<DeviceSession>) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let mut cfg = config;
        cfg.stream_enabled = false;
        cfg.fetch_alerts_on_activate = false;
        cfg.alert_refresh_interval_secs = 0;

        let registry = Self::new(cfg).await?;
        if !registry.set_active_device(Some(device_id.to_owned())).await {
            return Err(CoreError::NoActiveDevice);
        }
        let result = f(registry.session()).await;
        registry.shutdown().await;
        result
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Feed every alert-bearing update into the alert service, oldest first.
///
/// Watch notifications coalesce, so each wake-up walks the history back to
/// the last update already seen instead of only looking at `latest_alert`.
async fn live_alert_bridge(
    mut updates: StateStream<Arc<AggregateState>>,
    alerts: CriticalAlertService,
    cancel: CancellationToken,
) {
    let mut last_seen = forward_alerts(updates.current(), None, &alerts);
    loop {
        let state = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            state = updates.changed() => match state {
                Some(state) => state,
                None => break,
            },
        };
        last_seen = forward_alerts(&state, last_seen.as_deref(), &alerts).or(last_seen);
    }
}

/// Ingest alerts from updates newer than `last_seen`. Returns the newest
/// update id in the history.
fn forward_alerts(
    state: &AggregateState,
    last_seen: Option<&str>,
    alerts: &CriticalAlertService,
) -> Option<String> {
    let mut pending: Vec<LatestAlert> = state
        .updates
        .iter()
        .take_while(|u| Some(u.id.as_str()) != last_seen)
        .filter_map(LatestAlert::from_update)
        .collect();
    pending.reverse();
    for latest in &pending {
        alerts.ingest_live_alert(latest);
    }
    state.updates.front().map(|u| u.id.clone())
}

async fn alert_refresh_task(
    alerts: CriticalAlertService,
    fetch_now: bool,
    interval_secs: u64,
    cancel: CancellationToken,
) {
    if fetch_now {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            result = alerts.refetch() => {
                if let Err(e) = result {
                    warn!(error = %e, "initial alert fetch failed");
                }
            }
        }
    }
    if interval_secs == 0 {
        return;
    }

    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = alerts.refetch().await {
                    warn!(error = %e, "periodic alert refresh failed");
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use silowatch_api::TransportConfig;

    use super::*;
    use crate::normalize::normalize_at;

    fn quiet_config() -> MonitorConfig {
        let mut config = MonitorConfig::from_url("http://127.0.0.1:1/").unwrap();
        config.stream_enabled = false;
        config.fetch_alerts_on_activate = false;
        config.alert_refresh_interval_secs = 0;
        config
    }

    fn alert_update(update_id: &str, alert_id: &str) -> crate::model::NormalizedDeviceUpdate {
        let raw = format!(r#"{{"type":"alert","alert":{{"id":"{alert_id}","severity":"critical"}}}}"#);
        normalize_at(&raw, Some("dev-1"), Some(update_id), Utc::now())
    }

    #[tokio::test]
    async fn dropping_registry_cancels_session() {
        let registry = DeviceRegistry::new(quiet_config()).await.unwrap();
        registry.set_active_device(Some("dev-1".into())).await;
        let session = registry.session();
        assert!(!session.cancel.is_cancelled());

        drop(registry);
        assert!(session.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn forward_alerts_resumes_after_last_seen() {
        let client = DeviceClient::new("http://127.0.0.1:1/", &TransportConfig::default()).unwrap();
        let alerts = CriticalAlertService::new(Some("dev-1".into()), client, Duration::from_secs(5));

        let mut state = AggregateState::default();
        state.apply(alert_update("u1", "a1"), 10);
        state.apply(alert_update("u2", "a2"), 10);
        let last = forward_alerts(&state, None, &alerts);
        assert_eq!(last.as_deref(), Some("u2"));

        state.apply(alert_update("u3", "a3"), 10);
        let last = forward_alerts(&state, last.as_deref(), &alerts);
        assert_eq!(last.as_deref(), Some("u3"));

        let ids: Vec<String> = alerts.alerts().iter().map(|a| a.id.clone()).collect();
        assert_eq!(ids, ["a3", "a2", "a1"]);
    }
}
