/// Workflow Management Layer
///
/// Discovers pipeline definitions on disk and keeps them in memory:
/// - Type definitions (Workflow)
/// - Schema loading and default extraction
/// - Lock-free registry cache using ArcSwap
/// - Parameter validation against workflow schemas

// Core workflow type definitions
pub mod types;

// Manifest and schema loading from workflow directories
pub mod schema;

// Directory-scanning registry with an ArcSwap cache
pub mod registry;

// Parameter validation seam and the jsonschema-backed validator
pub mod validate;

// Re-export commonly used types
pub use registry::WorkflowRegistry;
pub use types::Workflow;
pub use validate::{JsonSchemaValidator, SchemaValidator};
