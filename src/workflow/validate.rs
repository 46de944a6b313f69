/// Parameter validation against workflow schemas
///
/// [`SchemaValidator`] is the seam between the launcher and the JSON Schema
/// engine. [`JsonSchemaValidator`] checks the schema itself against its
/// metaschema, then reports every violation keyed by the top-level parameter it
/// concerns.

use jsonschema::error::ValidationErrorKind;
use jsonschema::{Draft, ValidationError};
use serde_json::Value;
use std::collections::BTreeMap;

/// Key used for errors that do not belong to a single parameter
pub const ROOT_ERROR_KEY: &str = "params";

/// Validates a parameters document against a schema
pub trait SchemaValidator: Send + Sync {
    /// Returns one message per offending parameter name; empty means valid
    fn validate(&self, params: &Value, schema: &Value) -> BTreeMap<String, String>;
}

/// Validator backed by the `jsonschema` crate
///
/// Schemas that declare `$schema` are validated under that draft; the rest
/// default to draft 7, the draft nf-core pipeline schemas are written for.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSchemaValidator;

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, params: &Value, schema: &Value) -> BTreeMap<String, String> {
        let mut errors = BTreeMap::new();

        // Building also checks the schema against its metaschema
        let validator = match jsonschema::options().with_draft(Draft::Draft7).build(schema) {
            Ok(validator) => validator,
            Err(e) => {
                tracing::warn!("Workflow schema is invalid: {}", e);
                errors.insert(ROOT_ERROR_KEY.to_string(), format!("Invalid schema: {}", e));
                return errors;
            }
        };

        for error in validator.iter_errors(params) {
            errors.entry(error_key(&error)).or_insert_with(|| error.to_string());
        }
        errors
    }
}

/// Parameter an error is reported under
///
/// Missing and unexpected properties name the property itself; everything
/// else uses the first segment of the instance path.
fn error_key(error: &ValidationError<'_>) -> String {
    let named = match &error.kind {
        ValidationErrorKind::Required { property } => property.as_str().map(str::to_string),
        ValidationErrorKind::AdditionalProperties { unexpected } => unexpected.first().cloned(),
        _ => None,
    };

    named
        .or_else(|| top_level_param(&error.instance_path.to_string()))
        .unwrap_or_else(|| ROOT_ERROR_KEY.to_string())
}

/// First token of a JSON pointer, unescaped
fn top_level_param(pointer: &str) -> Option<String> {
    pointer
        .strip_prefix('/')?
        .split('/')
        .next()
        .filter(|token| !token.is_empty())
        .map(|token| token.replace("~1", "/").replace("~0", "~"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "definitions": {
                "io": {
                    "properties": {
                        "fastq": { "type": "string", "pattern": "^\\S+\\.fastq$" },
                        "out_dir": { "type": "string" }
                    },
                    "required": ["fastq"]
                },
                "tuning": {
                    "properties": {
                        "threads": { "type": "integer", "minimum": 1, "maximum": 64 },
                        "mode": { "type": "string", "enum": ["fast", "accurate"] }
                    }
                }
            },
            "allOf": [
                { "$ref": "#/definitions/io" },
                { "$ref": "#/definitions/tuning" }
            ]
        })
    }

    #[test]
    fn valid_params_have_no_errors() {
        let params = json!({ "fastq": "reads.fastq", "threads": 8, "mode": "fast" });
        assert!(JsonSchemaValidator.validate(&params, &schema()).is_empty());
    }

    #[test]
    fn errors_are_keyed_by_parameter() {
        let params = json!({ "threads": "eight", "mode": "slow" });
        let errors = JsonSchemaValidator.validate(&params, &schema());

        assert_eq!(errors.len(), 3, "{:?}", errors);
        assert!(errors["fastq"].contains("required"));
        assert!(errors["threads"].contains("integer"));
        assert!(errors["mode"].contains("slow"));
    }

    #[test]
    fn range_and_pattern_checks() {
        let params = json!({ "fastq": "reads.bam", "threads": 0 });
        let errors = JsonSchemaValidator.validate(&params, &schema());
        assert!(errors["threads"].contains("minimum"));
        assert!(errors["fastq"].contains("reads.bam"));

        let params = json!({ "fastq": "reads.fastq", "threads": 65 });
        let errors = JsonSchemaValidator.validate(&params, &schema());
        assert!(errors["threads"].contains("maximum"));
    }

    #[test]
    fn full_keyword_set_is_enforced() {
        let schema = json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "minLength": 3 },
                "ratio": { "type": "number", "exclusiveMinimum": 0 },
                "samples": { "type": "array", "items": { "type": "string" } }
            },
            "additionalProperties": false
        });
        let params = json!({
            "name": "",
            "ratio": 0,
            "samples": [1, 2],
            "extra": { "x": 1 }
        });

        let errors = JsonSchemaValidator.validate(&params, &schema);

        let keys: Vec<&str> = errors.keys().map(String::as_str).collect();
        assert_eq!(keys, ["extra", "name", "ratio", "samples"]);
    }

    #[test]
    fn invalid_schema_is_reported_under_root_key() {
        let schema = json!({ "type": "object", "properties": { "threads": { "type": 5 } } });
        let errors = JsonSchemaValidator.validate(&json!({ "threads": 1 }), &schema);

        assert_eq!(errors.len(), 1);
        assert!(errors[ROOT_ERROR_KEY].starts_with("Invalid schema"));
    }

    #[test]
    fn root_type_mismatch_uses_root_key() {
        let errors = JsonSchemaValidator.validate(&json!([1, 2]), &schema());
        assert!(errors.contains_key(ROOT_ERROR_KEY));
    }

    #[test]
    fn pointer_tokens_are_unescaped() {
        assert_eq!(top_level_param("/a~1b/0"), Some("a/b".to_string()));
        assert_eq!(top_level_param("/t~0x"), Some("t~x".to_string()));
        assert_eq!(top_level_param(""), None);
    }
}
