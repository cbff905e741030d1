/// Realtime gateway
///
/// Maintains the process-local identity→connection registry, personal and
/// per-thread broadcast groups, and the push primitives used by the rest of
/// the engine. All delivery is fire-and-forget: no acknowledgments, no
/// retries, offline members are skipped without error. The registry is
/// rebuilt from scratch on restart.
pub mod events;
pub mod gateway;
pub mod registry;

pub use events::GatewayEvent;
pub use gateway::{DeliveryOutcome, Gateway};
pub use registry::{ConnectionHandle, ConnectionRegistry};
