/// Nextflow launcher: single-node pipeline launcher and supervisor
///
/// This library launches long-running Nextflow pipelines as independently
/// supervised processes, tracks each run as a durable instance record, and lets
/// callers query, inspect and terminate runs.

// Core configuration and setup
pub mod config;

// Instance records and the multi-process status store
pub mod instance;

// Workflow discovery, schema loading and parameter validation
pub mod workflow;

// Supervisor processes: spawning, supervision routine and termination
pub mod runtime;

// Orchestration of workflows, instances and the invoker
pub mod launcher;

// HTTP API layer - REST endpoints for workflows and instances
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use instance::{Instance, InstanceStatus, InstanceSummary, StatusStore};
pub use launcher::Launcher;
pub use server::start_server;
pub use workflow::Workflow;
