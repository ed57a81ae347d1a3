// ── Critical alert reconciliation ──
//
// One `CriticalAlertService` per active device. It owns the reconciled
// alert list (REST baseline + live pushes), the per-alert action state,
// and the timers that expire action feedback. Everything it owns dies with
// the device session.

mod merge;
mod timers;

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use silowatch_api::{AcknowledgeRequest, ApiCriticalAlert, DeviceClient, ResolveRequest};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::convert::{alert_from_api, alert_from_snapshot};
use crate::error::{ALERT_FETCH_FALLBACK, CoreError};
use crate::model::{ActionFeedback, AlertActionState, CriticalAlert};
use crate::store::LatestAlert;
use crate::stream::StateStream;

pub use merge::{AlertList, MergeOutcome, merge_alert};
use timers::FeedbackTimers;

/// Live-alert `(id, timestamp)` keys remembered for de-duplication.
const PROCESSED_KEY_CAPACITY: usize = 512;

pub type ActionStates = BTreeMap<String, AlertActionState>;

/// Progress of the REST baseline fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchStatus {
    pub loading: bool,
    /// User-facing message from the last failed fetch.
    pub error: Option<String>,
    pub last_fetched: Option<DateTime<Utc>>,
}

/// Which mutation an action performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum AlertAction {
    Acknowledge,
    Resolve,
}

impl AlertAction {
    fn success_message(self) -> &'static str {
        match self {
            Self::Acknowledge => "Alert acknowledged",
            Self::Resolve => "Alert resolved",
        }
    }

    fn failure_fallback(self) -> &'static str {
        match self {
            Self::Acknowledge => "Unable to acknowledge alert",
            Self::Resolve => "Unable to resolve alert",
        }
    }

    fn set_flag(self, state: &mut AlertActionState, value: bool) {
        match self {
            Self::Acknowledge => state.acknowledging = value,
            Self::Resolve => state.resolving = value,
        }
    }
}

enum ActionRequest {
    Acknowledge(AcknowledgeRequest),
    Resolve(ResolveRequest),
}

impl ActionRequest {
    fn action(&self) -> AlertAction {
        match self {
            Self::Acknowledge(_) => AlertAction::Acknowledge,
            Self::Resolve(_) => AlertAction::Resolve,
        }
    }
}

/// Bounded memory of live alerts already merged.
#[derive(Default)]
struct ProcessedKeys {
    order: VecDeque<(String, DateTime<Utc>)>,
    seen: HashSet<(String, DateTime<Utc>)>,
}

impl ProcessedKeys {
    /// Record `key`. Returns `false` if it was already present.
    fn insert(&mut self, key: (String, DateTime<Utc>)) -> bool {
        if !self.seen.insert(key.clone()) {
            return false;
        }
        self.order.push_back(key);
        while self.order.len() > PROCESSED_KEY_CAPACITY {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        true
    }
}

// ── CriticalAlertService ─────────────────────────────────────────────

/// Reconciled critical alerts for one device.
///
/// Cheaply cloneable. All failures stay inside the service: fetch errors
/// land in [`FetchStatus`], action errors in per-alert feedback.
#[derive(Clone)]
pub struct CriticalAlertService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    device_id: Option<String>,
    client: DeviceClient,
    alerts: watch::Sender<Arc<AlertList>>,
    actions: watch::Sender<Arc<ActionStates>>,
    fetch: watch::Sender<FetchStatus>,
    processed: Mutex<ProcessedKeys>,
    timers: FeedbackTimers,
    feedback_ttl: Duration,
    cancel: CancellationToken,
}

impl CriticalAlertService {
    /// `device_id = None` is the offline state: every operation reports
    /// [`CoreError::NoActiveDevice`] without touching the network.
    pub fn new(device_id: Option<String>, client: DeviceClient, feedback_ttl: Duration) -> Self {
        let (alerts, _) = watch::channel(Arc::new(AlertList::new()));
        let (actions, _) = watch::channel(Arc::new(ActionStates::new()));
        let (fetch, _) = watch::channel(FetchStatus::default());
        Self {
            inner: Arc::new(ServiceInner {
                device_id,
                client,
                alerts,
                actions,
                fetch,
                processed: Mutex::new(ProcessedKeys::default()),
                timers: FeedbackTimers::new(),
                feedback_ttl,
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn device_id(&self) -> Option<&str> {
        self.inner.device_id.as_deref()
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn alerts(&self) -> Arc<AlertList> {
        self.inner.alerts.borrow().clone()
    }

    pub fn subscribe_alerts(&self) -> StateStream<Arc<AlertList>> {
        StateStream::new(self.inner.alerts.subscribe())
    }

    pub fn action_states(&self) -> Arc<ActionStates> {
        self.inner.actions.borrow().clone()
    }

    pub fn action_state(&self, alert_id: &str) -> Option<AlertActionState> {
        self.inner.actions.borrow().get(alert_id).cloned()
    }

    pub fn subscribe_actions(&self) -> StateStream<Arc<ActionStates>> {
        StateStream::new(self.inner.actions.subscribe())
    }

    pub fn fetch_status(&self) -> FetchStatus {
        self.inner.fetch.borrow().clone()
    }

    pub fn subscribe_fetch(&self) -> StateStream<FetchStatus> {
        StateStream::new(self.inner.fetch.subscribe())
    }

    // ── Baseline ─────────────────────────────────────────────────────

    /// Replace the list with the server's authoritative baseline.
    ///
    /// On failure the cached list is left as it was and the fetch status
    /// carries a user-facing message.
    pub async fn refetch(&self) -> Result<(), CoreError> {
        let inner = &self.inner;
        let Some(device_id) = inner.device_id.as_deref() else {
            let err = CoreError::NoActiveDevice;
            inner.fetch.send_modify(|f| {
                f.loading = false;
                f.error = Some(err.user_message(ALERT_FETCH_FALLBACK));
            });
            return Err(err);
        };

        inner.fetch.send_modify(|f| f.loading = true);

        let result = tokio::select! {
            biased;
            () = inner.cancel.cancelled() => {
                debug!(device_id, "alert fetch abandoned");
                return Ok(());
            }
            result = inner.client.list_alerts(device_id) => result,
        };

        match result {
            Ok(api_alerts) => {
                let list: AlertList = api_alerts.into_iter().map(CriticalAlert::from).collect();
                debug!(device_id, count = list.len(), "alert baseline loaded");
                inner.alerts.send_replace(Arc::new(list));
                inner.fetch.send_replace(FetchStatus {
                    loading: false,
                    error: None,
                    last_fetched: Some(Utc::now()),
                });
                Ok(())
            }
            Err(e) => {
                let err = CoreError::from(e);
                warn!(device_id, error = %err, "alert fetch failed");
                inner.fetch.send_modify(|f| {
                    f.loading = false;
                    f.error = Some(err.user_message(ALERT_FETCH_FALLBACK));
                });
                Err(err)
            }
        }
    }

    // ── Live alerts ──────────────────────────────────────────────────

    /// Merge the aggregator's latest alert into the list.
    ///
    /// Each `(alert id, update timestamp)` pair is merged at most once. Returns
    /// whether the list changed.
    pub fn ingest_live_alert(&self, latest: &LatestAlert) -> bool {
        let inner = &self.inner;
        if inner.device_id.is_none() || inner.cancel.is_cancelled() {
            return false;
        }

        let alert_id = latest
            .alert
            .id
            .clone()
            .unwrap_or_else(|| latest.update_id.clone());
        // Devices re-push an alert with its original `detectedAt` when the
        // status changes, so the key is the carrying update's timestamp.
        let timestamp = latest.received_at;

        let fresh = inner
            .processed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((alert_id.clone(), timestamp));
        if !fresh {
            debug!(alert_id, "live alert already merged");
            return false;
        }

        inner.alerts.send_if_modified(|list| {
            let incoming = alert_from_snapshot(
                &latest.alert,
                &latest.update_id,
                latest.received_at,
                list.get(&alert_id),
            );
            let outcome = Arc::make_mut(list).merge(incoming);
            debug!(alert_id, ?outcome, "live alert merged");
            outcome.changed()
        })
    }

    // ── Actions ──────────────────────────────────────────────────────

    /// Acknowledge `alert`. The outcome is also recorded as the alert's
    /// feedback; failures never escape as errors.
    pub async fn acknowledge_alert(
        &self,
        alert: &CriticalAlert,
        request: AcknowledgeRequest,
    ) -> ActionFeedback {
        self.acknowledge_alert_id(&alert.id, request).await
    }

    pub async fn acknowledge_alert_id(
        &self,
        alert_id: &str,
        request: AcknowledgeRequest,
    ) -> ActionFeedback {
        self.run_action(alert_id, ActionRequest::Acknowledge(request))
            .await
    }

    /// Resolve `alert`. See [`acknowledge_alert`](Self::acknowledge_alert).
    pub async fn resolve_alert(
        &self,
        alert: &CriticalAlert,
        request: ResolveRequest,
    ) -> ActionFeedback {
        self.resolve_alert_id(&alert.id, request).await
    }

    pub async fn resolve_alert_id(&self, alert_id: &str, request: ResolveRequest) -> ActionFeedback {
        self.run_action(alert_id, ActionRequest::Resolve(request))
            .await
    }

    async fn run_action(&self, alert_id: &str, request: ActionRequest) -> ActionFeedback {
        let inner = &self.inner;
        let action = request.action();

        // A new action supersedes any pending feedback expiry.
        inner.timers.cancel(alert_id);
        inner.actions.send_modify(|states| {
            let state = Arc::make_mut(states).entry(alert_id.to_owned()).or_default();
            action.set_flag(state, true);
            state.feedback = None;
        });

        let result = self.send_action(alert_id, &request).await;

        let feedback = match result {
            Ok(updated) => {
                if let Some(api) = updated {
                    self.merge_action_result(api);
                }
                info!(alert_id, %action, "alert action succeeded");
                ActionFeedback::success(action.success_message())
            }
            Err(err) => {
                warn!(alert_id, %action, error = %err, "alert action failed");
                ActionFeedback::error(err.user_message(action.failure_fallback()))
            }
        };

        inner.actions.send_modify(|states| {
            let state = Arc::make_mut(states).entry(alert_id.to_owned()).or_default();
            action.set_flag(state, false);
            state.feedback = Some(feedback.clone());
        });
        self.schedule_feedback_clear(alert_id);

        feedback
    }

    async fn send_action(
        &self,
        alert_id: &str,
        request: &ActionRequest,
    ) -> Result<Option<ApiCriticalAlert>, CoreError> {
        let inner = &self.inner;
        let device_id = inner
            .device_id
            .as_deref()
            .ok_or(CoreError::NoActiveDevice)?;
        if inner.cancel.is_cancelled() {
            return Err(CoreError::NoActiveDevice);
        }

        let call = async {
            match request {
                ActionRequest::Acknowledge(body) => {
                    inner.client.acknowledge_alert(device_id, alert_id, body).await
                }
                ActionRequest::Resolve(body) => {
                    inner.client.resolve_alert(device_id, alert_id, body).await
                }
            }
        };

        tokio::select! {
            biased;
            () = inner.cancel.cancelled() => Err(CoreError::NoActiveDevice),
            result = call => result.map_err(CoreError::from),
        }
    }

    fn merge_action_result(&self, api: ApiCriticalAlert) {
        self.inner.alerts.send_if_modified(|list| {
            let existing = list.get(&api.id).cloned();
            let incoming = alert_from_api(api, existing.as_ref());
            Arc::make_mut(list).merge(incoming).changed()
        });
    }

    /// Expire the feedback after the TTL; drop the entry if nothing else
    /// remains in it.
    fn schedule_feedback_clear(&self, alert_id: &str) {
        let weak: Weak<ServiceInner> = Arc::downgrade(&self.inner);
        let key = alert_id.to_owned();
        self.inner
            .timers
            .schedule(alert_id, self.inner.feedback_ttl, move || {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                inner.actions.send_if_modified(|states| {
                    let Some(state) = states.get(&key) else {
                        return false;
                    };
                    let mut cleared = state.clone();
                    cleared.feedback = None;
                    let states = Arc::make_mut(states);
                    if cleared.is_empty() {
                        states.remove(&key);
                    } else {
                        states.insert(key.clone(), cleared);
                    }
                    true
                });
            });
    }

    // ── Teardown ─────────────────────────────────────────────────────

    /// Stop all work for this device: pending fetches and actions are
    /// abandoned and feedback timers are cancelled.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.timers.cancel_all();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }
}
