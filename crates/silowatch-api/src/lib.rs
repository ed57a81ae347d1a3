// silowatch-api: Async Rust client for the silo telemetry device API (REST + push stream)

pub mod client;
pub mod error;
pub mod models;
pub mod stream;
pub mod transport;

pub use client::DeviceClient;
pub use error::Error;
pub use models::{AcknowledgeRequest, ApiCriticalAlert, ResolveRequest};
pub use transport::{TlsMode, TransportConfig};
