/// HTTP API Layer
///
/// This module provides the REST API endpoints consumed by the front end.
/// It handles:
/// - Workflow listing, lookup and parameter validation
/// - Instance launch, lookup and deletion
/// - Instance logs/params retrieval and host filesystem checks

// Workflow endpoints and shared application state
pub mod workflows;

// Instance, log, params and filesystem endpoints
pub mod instances;

// Re-export router builders
pub use instances::create_instance_routes;
pub use workflows::{create_workflow_routes, AppState};
