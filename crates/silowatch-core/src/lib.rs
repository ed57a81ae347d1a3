// silowatch-core: Live telemetry ingestion and critical-alert reconciliation between silowatch-api and the CLI.

pub mod alerts;
pub mod config;
pub mod connection;
pub mod convert;
pub mod error;
pub mod model;
pub mod normalize;
pub mod registry;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use alerts::{ActionStates, AlertAction, AlertList, CriticalAlertService, FetchStatus};
pub use config::{MonitorConfig, StreamTransport, TlsVerification};
pub use connection::{StreamConnectionManager, StreamState, StreamStats, StreamStatus};
pub use error::CoreError;
pub use normalize::{normalize, normalize_value};
pub use registry::{DeviceRegistry, DeviceSession};
pub use store::{AggregateState, LatestAlert, UpdateAggregator};
pub use stream::{AlertFilter, StateStream};

// Request bodies pass straight through to the API client.
pub use silowatch_api::{AcknowledgeRequest, ResolveRequest};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    // Updates
    DeviceAlertSnapshot, DeviceGatewaySnapshot, DeviceReadingSnapshot, DeviceSensorStatusSnapshot,
    GatewayStatus, NormalizedDeviceUpdate, UpdateKind,
    // Alerts
    ActionFeedback, AlertActionState, AlertSeverity, AlertStatus, CriticalAlert, FeedbackStatus,
};
