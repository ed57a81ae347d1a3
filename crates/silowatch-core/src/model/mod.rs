// ── Domain model ──
//
// Canonical types consumers depend on. Wire shapes from `silowatch-api`
// and raw push-stream payloads are converted into these before they reach
// any store.

pub mod alert;
pub mod update;

// ── Re-exports ──────────────────────────────────────────────────────

pub use alert::{
    ActionFeedback, AlertActionState, AlertSeverity, AlertStatus, CriticalAlert, FeedbackStatus,
};
pub use update::{
    DeviceAlertSnapshot, DeviceGatewaySnapshot, DeviceReadingSnapshot, DeviceSensorStatusSnapshot,
    GatewayStatus, NormalizedDeviceUpdate, UpdateKind,
};
