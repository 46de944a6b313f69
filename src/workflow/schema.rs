/// Workflow loading from disk
///
/// A directory is a workflow when it contains `main.nf` and a
/// `nextflow_schema.json` that parses to a non-empty JSON object.

use crate::workflow::types::Workflow;
use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use std::path::Path;

/// Pipeline entry file that marks a directory as a workflow
pub const MANIFEST_FILE: &str = "main.nf";

/// Parameter schema file next to the entry file
pub const SCHEMA_FILE: &str = "nextflow_schema.json";

/// Load a workflow named `name` from `path`
pub fn load_workflow(name: &str, path: &Path) -> Result<Workflow> {
    if !path.join(MANIFEST_FILE).is_file() {
        bail!("Cannot load {}: missing {}", name, MANIFEST_FILE);
    }

    let schema = load_schema(path)?;
    let schema_is_empty = schema.as_object().map_or(true, |object| object.is_empty());
    if schema_is_empty {
        bail!("Cannot load {}: missing schema", name);
    }

    let desc = ["description", "title"]
        .iter()
        .find_map(|key| schema.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string();
    let defaults = schema_defaults(&schema);

    Ok(Workflow {
        name: name.to_string(),
        desc,
        path: path.to_path_buf(),
        schema,
        defaults,
    })
}

/// Read and parse the schema file of the workflow at `path`
pub fn load_schema(path: &Path) -> Result<Value> {
    let schema_path = path.join(SCHEMA_FILE);
    let raw = std::fs::read_to_string(&schema_path)
        .with_context(|| format!("Failed to read schema '{}'", schema_path.display()))?;
    let schema: Value = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid JSON in schema '{}'", schema_path.display()))?;
    Ok(schema)
}

/// Collect `default` values from top-level `properties` and from every
/// `definitions.<group>.properties` block
pub fn schema_defaults(schema: &Value) -> Map<String, Value> {
    let mut defaults = Map::new();

    let groups = schema
        .get("definitions")
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|definitions| definitions.values());

    for block in std::iter::once(schema).chain(groups) {
        let Some(properties) = block.get("properties").and_then(Value::as_object) else {
            continue;
        };
        for (param, definition) in properties {
            if let Some(default) = definition.get("default") {
                defaults.insert(param.clone(), default.clone());
            }
        }
    }

    defaults
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn nf_core_schema() -> Value {
        json!({
            "title": "demo pipeline parameters",
            "description": "Align reads against a reference",
            "type": "object",
            "definitions": {
                "input_output_options": {
                    "properties": {
                        "fastq": { "type": "string" },
                        "out_dir": { "type": "string", "default": "output" }
                    },
                    "required": ["fastq"]
                },
                "advanced": {
                    "properties": {
                        "threads": { "type": "integer", "default": 4 }
                    }
                }
            },
            "allOf": [
                { "$ref": "#/definitions/input_output_options" },
                { "$ref": "#/definitions/advanced" }
            ],
            "properties": {
                "help": { "type": "boolean", "default": false }
            }
        })
    }

    #[test]
    fn defaults_are_collected_from_all_groups() {
        let defaults = schema_defaults(&nf_core_schema());
        assert_eq!(defaults.get("out_dir"), Some(&json!("output")));
        assert_eq!(defaults.get("threads"), Some(&json!(4)));
        assert_eq!(defaults.get("help"), Some(&json!(false)));
        assert!(!defaults.contains_key("fastq"));
    }

    #[test]
    fn loads_workflow_with_manifest_and_schema() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "workflow {}").unwrap();
        std::fs::write(dir.path().join(SCHEMA_FILE), nf_core_schema().to_string()).unwrap();

        let workflow = load_workflow("demo", dir.path()).unwrap();
        assert_eq!(workflow.name, "demo");
        assert_eq!(workflow.desc, "Align reads against a reference");
        assert_eq!(workflow.entry_file(), dir.path().join("main.nf"));
        assert_eq!(workflow.defaults.len(), 3);
    }

    #[test]
    fn rejects_missing_manifest_or_empty_schema() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(SCHEMA_FILE), nf_core_schema().to_string()).unwrap();
        assert!(load_workflow("demo", dir.path()).is_err());

        std::fs::write(dir.path().join(MANIFEST_FILE), "workflow {}").unwrap();
        std::fs::write(dir.path().join(SCHEMA_FILE), "{}").unwrap();
        assert!(load_workflow("demo", dir.path()).is_err());

        std::fs::write(dir.path().join(SCHEMA_FILE), "not json").unwrap();
        assert!(load_workflow("demo", dir.path()).is_err());
    }
}
