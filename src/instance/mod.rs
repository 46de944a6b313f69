/// Instance Management Layer
///
/// Durable records of launched pipeline runs:
/// - Type definitions (Instance, InstanceStatus, InstanceSummary)
/// - Multi-process SQLite status store with sqlx

// Instance record and lifecycle state definitions
pub mod types;

// Status store shared by the launcher and every supervisor process
pub mod store;

pub use store::{StatusStore, StoreError};
pub use types::{Instance, InstanceStatus, InstanceSummary};
