/// Workflow type definitions
///
/// A workflow is a pipeline definition discovered on disk: a directory holding
/// the pipeline entry file and a parameter schema. Workflows are reconstructed
/// from disk and never mutated once loaded.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// A reusable pipeline definition
///
/// Serializes to the external projection `name, desc, path, schema, defaults`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique identifier, taken from the directory name
    pub name: String,
    /// Human readable description pulled from the schema
    pub desc: String,
    /// Directory containing the entry file and schema
    pub path: PathBuf,
    /// Parameter schema document (JSON Schema, nf-core layout)
    pub schema: Value,
    /// Default parameter values collected from the schema
    pub defaults: Map<String, Value>,
}

impl Workflow {
    /// Pipeline entry file passed to `nextflow run`
    pub fn entry_file(&self) -> PathBuf {
        self.path.join(crate::workflow::schema::MANIFEST_FILE)
    }
}
