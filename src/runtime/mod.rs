/// Runtime Process Supervision
///
/// This module runs pipelines as independently supervised OS processes.
/// It handles:
/// - Spawning one detached supervisor process per instance
/// - The supervisor routine: pid bookkeeping, output capture, status writes
/// - Signal-based termination of running instances

// Supervisor spawning and termination
pub mod invoker;

// Routine executed inside each supervisor process
pub mod supervisor;

// kill/killpg wrappers and shell command construction
pub mod process;

// Re-export main types
pub use invoker::Invoker;
pub use supervisor::{supervise, SuperviseRequest};
